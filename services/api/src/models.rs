//! API Models
//!
//! Request and response bodies of the REST API, documented with `utoipa`.
//! Core types are mirrored here so the OpenAPI schema stays in this crate.

use chrono::{DateTime, Utc};
use petpal_core::{
    ConversationTurn, Difficulty, LanguageQuestion, LearningSnapshot, MathQuestion, Pet, Subject,
    question::QuestionKind,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct SessionInfo {
    #[schema(value_type = String, format = Uuid)]
    pub id: Uuid,
    #[schema(value_type = String, example = "fox")]
    pub pet: Pet,
    /// Opening line of the pet.
    pub greeting: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateSessionPayload {
    /// Unknown identifiers fall back to the fox.
    #[serde(default)]
    #[schema(example = "dolphin")]
    pub pet: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct SendMessagePayload {
    #[schema(example = "1加1等于2")]
    pub text: String,
    /// Prior turns, oldest first.
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub history: Vec<ConversationTurn>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct MessageReply {
    pub reply: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct LearningStateResponse {
    #[schema(value_type = u8, example = 1)]
    pub language_difficulty: Difficulty,
    #[schema(value_type = u8, example = 1)]
    pub math_difficulty: Difficulty,
    pub correct_answers: u32,
    pub total_questions: u32,
    pub recent_answers: Vec<bool>,
    /// Percent, one decimal.
    pub accuracy: f64,
    /// Percent over the recent window, one decimal.
    pub recent_accuracy: f64,
}

impl From<LearningSnapshot> for LearningStateResponse {
    fn from(snapshot: LearningSnapshot) -> Self {
        Self {
            language_difficulty: snapshot.language_difficulty,
            math_difficulty: snapshot.math_difficulty,
            correct_answers: snapshot.correct_answers,
            total_questions: snapshot.total_questions,
            recent_answers: snapshot.recent_answers,
            accuracy: snapshot.accuracy,
            recent_accuracy: snapshot.recent_accuracy,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct QuestionResponse {
    #[schema(value_type = String, example = "math")]
    pub subject: Subject,
    #[schema(value_type = String, example = "carry_addition")]
    pub kind: QuestionKind,
    #[schema(value_type = u8, example = 2)]
    pub difficulty: Difficulty,
    #[schema(example = "7 + 5 = ?")]
    pub prompt: String,
    #[schema(example = "12")]
    pub answer: String,
}

impl From<LanguageQuestion> for QuestionResponse {
    fn from(question: LanguageQuestion) -> Self {
        Self {
            subject: Subject::Language,
            kind: question.kind,
            difficulty: question.difficulty,
            prompt: question.prompt,
            answer: question.answer,
        }
    }
}

impl From<MathQuestion> for QuestionResponse {
    fn from(question: MathQuestion) -> Self {
        Self {
            subject: Subject::Math,
            kind: question.kind,
            difficulty: question.difficulty,
            prompt: question.prompt,
            answer: question.answer.to_string(),
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct AdvicePayload {
    #[schema(example = "认识数字")]
    pub topic: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct TtsHealth {
    pub available: bool,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use petpal_core::question::Operator;

    #[test]
    fn test_create_session_payload_pet_is_optional() {
        let payload: CreateSessionPayload = serde_json::from_str(r#"{"pet": "owl"}"#).unwrap();
        assert_eq!(payload.pet.as_deref(), Some("owl"));

        let payload: CreateSessionPayload = serde_json::from_str("{}").unwrap();
        assert!(payload.pet.is_none());
    }

    #[test]
    fn test_send_message_payload_history_defaults_to_empty() {
        let payload: SendMessagePayload = serde_json::from_str(r#"{"text": "你好"}"#).unwrap();
        assert_eq!(payload.text, "你好");
        assert!(payload.history.is_empty());

        let json = r#"{"text": "好", "history": [{"speaker": "pet", "text": "你好呀"}]}"#;
        let payload: SendMessagePayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.history.len(), 1);
    }

    #[test]
    fn test_send_message_payload_requires_text() {
        let result: Result<SendMessagePayload, _> = serde_json::from_str("{}");
        assert!(result.is_err());
    }

    #[test]
    fn test_session_info_serialization() {
        let info = SessionInfo {
            id: Uuid::new_v4(),
            pet: Pet::Dolphin,
            greeting: "嗨！".to_string(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["pet"], "dolphin");
        assert_eq!(json["greeting"], "嗨！");
    }

    #[test]
    fn test_math_question_response_flattens_answer() {
        let question = MathQuestion {
            prompt: "7 + 5 = ?".to_string(),
            a: 7,
            op: Operator::Add,
            b: 5,
            answer: 12,
            kind: QuestionKind::CarryAddition,
            difficulty: Difficulty::clamped(2),
        };
        let response = QuestionResponse::from(question);
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["subject"], "math");
        assert_eq!(json["kind"], "carry_addition");
        assert_eq!(json["difficulty"], 2);
        assert_eq!(json["answer"], "12");
    }
}
