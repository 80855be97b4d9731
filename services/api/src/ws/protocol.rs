//! Defines the WebSocket message protocol between the browser client and the API server.

use crate::models::LearningStateResponse;
use petpal_core::{
    ConversationTurn, Pet,
    speech::{AudioEvent, Utterance},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messages sent from the client (browser) to the server.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Attaches the connection to a session. This must be the first message.
    Init {
        session_id: Uuid,
        /// Whether the browser can synthesize speech on its own.
        #[serde(default)]
        speech_synthesis: bool,
    },
    /// A line typed or dictated by the child.
    UserMessage {
        text: String,
        #[serde(default)]
        history: Vec<ConversationTurn>,
    },
    /// Speak arbitrary text with the pet's voice.
    Speak { text: String },
    StopSpeaking,
    /// Toggles spoken replies.
    SetVoiceEnabled { enabled: bool },
    /// Reports on the audio resource the server asked the browser to load.
    AudioEvent { event: AudioEvent },
    /// Reports the outcome of a `speak_locally` request.
    LocalSpeechEvent {
        ok: bool,
        #[serde(default)]
        message: Option<String>,
    },
}

/// Messages sent from the server to the client (browser).
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirms the connection is attached to a session.
    Initialized {
        session_id: Uuid,
        pet: Pet,
        greeting: String,
    },
    /// Signals the beginning of a streamed reply.
    ResponseStart,
    /// One increment of the reply and the text so far.
    ResponseChunk { delta: String, text: String },
    /// Signals the end of a streamed reply.
    ResponseEnd { text: String },
    LearningState { state: LearningStateResponse },
    /// Asks the browser to load an audio resource and report `audio_event`s.
    LoadAudio { url: String },
    PlayAudio,
    StopAudio,
    /// Asks the browser to speak with its own synthesizer and report a `local_speech_event`.
    SpeakLocally { utterance: Utterance },
    CancelLocalSpeech,
    SpeakingStart { speech_id: u64 },
    SpeakingEnd { speech_id: u64 },
    SpeechError { speech_id: u64, message: String },
    /// Reports a protocol or session error to the client.
    Error { message: String },
}
