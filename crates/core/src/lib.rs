pub mod conversation;
pub mod error;
pub mod guidance;
pub mod learning;
pub mod llm_client;
pub mod orchestrator;
pub mod pet;
pub mod question;
pub mod speech;

pub use conversation::{ConversationTurn, Speaker};
pub use error::{ChatError, SpeechError};
pub use learning::{Difficulty, LearningSnapshot, LearningState, Subject};
pub use orchestrator::{ConversationOrchestrator, OrchestratorConfig};
pub use pet::Pet;
pub use question::{LanguageQuestion, MathQuestion};
