//! Error taxonomy for the remote chat and speech collaborators.
//!
//! None of these ever reach the UI as a failure: the orchestrator degrades to a
//! canned reply and the speech pipeline degrades through its fallback chain.
//! They exist so that every recovery point can log *why* it recovered.

use async_openai::error::OpenAIError;

/// Failures of the chat-completion path.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("no chat credential configured")]
    CredentialMissing,
    #[error("network failure: {0}")]
    Network(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl From<OpenAIError> for ChatError {
    fn from(err: OpenAIError) -> Self {
        match err {
            OpenAIError::InvalidArgument(msg) => ChatError::MalformedResponse(msg),
            err @ OpenAIError::JSONDeserialize(..) => ChatError::MalformedResponse(err.to_string()),
            other => ChatError::Network(other.to_string()),
        }
    }
}

/// Failures of the speech playback path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpeechError {
    #[error("network failure: {0}")]
    Network(String),
    #[error("synthesis service reported failure: {0}")]
    BusinessFailure(String),
    #[error("malformed synthesis response: {0}")]
    MalformedResponse(String),
    #[error("audio resource did not become playable in time")]
    LoadTimeout,
    #[error("audio resource failed to load: {0}")]
    LoadError(String),
    #[error("audio playback failed: {0}")]
    PlaybackFailed(String),
    #[error("no speech synthesis capability available")]
    SynthesisUnavailable,
    #[error("on-device synthesis failed: {0}")]
    LocalSynthesis(String),
    #[error("playback interrupted")]
    Interrupted,
}

impl From<reqwest::Error> for SpeechError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SpeechError::MalformedResponse(err.to_string())
        } else {
            SpeechError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            ChatError::CredentialMissing.to_string(),
            "no chat credential configured"
        );
        assert_eq!(
            SpeechError::BusinessFailure("quota".into()).to_string(),
            "synthesis service reported failure: quota"
        );
        assert_eq!(
            SpeechError::LoadTimeout.to_string(),
            "audio resource did not become playable in time"
        );
    }

    #[test]
    fn test_openai_error_mapping() {
        let err: ChatError = OpenAIError::FileReadError("unreadable".into()).into();
        assert!(matches!(err, ChatError::Network(_)));

        let err: ChatError = OpenAIError::InvalidArgument("bad".into()).into();
        assert!(matches!(err, ChatError::MalformedResponse(_)));
    }
}
