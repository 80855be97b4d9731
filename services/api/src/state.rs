//! Shared Application State
//!
//! `AppState` holds the service clients built at startup and the registry of
//! live pet sessions. Sessions live in memory only.

use crate::{config::Config, models::SessionInfo};
use chrono::{DateTime, Utc};
use petpal_core::{
    ConversationOrchestrator, OrchestratorConfig, Pet, llm_client::LLMClient,
    speech::RemoteSynthesizer,
};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

/// One child's conversation with one pet, shared by REST calls and WebSocket connections.
pub struct PetSession {
    pub id: Uuid,
    pub pet: Pet,
    pub created_at: DateTime<Utc>,
    pub orchestrator: ConversationOrchestrator,
}

impl PetSession {
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            pet: self.pet,
            greeting: self.pet.personality().greeting.to_string(),
            created_at: self.created_at,
        }
    }
}

/// The shared application state, created once at startup and passed to all handlers.
pub struct AppState {
    pub config: Arc<Config>,
    /// `None` when no chat credential is configured.
    pub llm_client: Option<Arc<dyn LLMClient>>,
    pub synthesizer: Arc<RemoteSynthesizer>,
    sessions: RwLock<HashMap<Uuid, Arc<PetSession>>>,
}

impl AppState {
    pub fn new(
        config: Config,
        llm_client: Option<Arc<dyn LLMClient>>,
        synthesizer: Arc<RemoteSynthesizer>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            llm_client,
            synthesizer,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn create_session(&self, pet: Pet) -> Arc<PetSession> {
        let session = Arc::new(PetSession {
            id: Uuid::new_v4(),
            pet,
            created_at: Utc::now(),
            orchestrator: ConversationOrchestrator::new(
                self.llm_client.clone(),
                OrchestratorConfig::default(),
            ),
        });
        self.sessions
            .write()
            .await
            .insert(session.id, session.clone());
        info!(session_id = %session.id, %pet, "Created pet session");
        session
    }

    pub async fn session(&self, id: Uuid) -> Option<Arc<PetSession>> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Forgets a session. Connections already attached keep it until they close.
    pub async fn remove_session(&self, id: Uuid) -> Option<Arc<PetSession>> {
        let removed = self.sessions.write().await.remove(&id);
        if removed.is_some() {
            info!(session_id = %id, "Removed pet session");
        }
        removed
    }
}
