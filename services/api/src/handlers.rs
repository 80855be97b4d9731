//! Axum Handlers for the REST API
//!
//! Session management, learning state, exercises and a non-streaming chat
//! endpoint. Streaming chat and speech go through the WebSocket.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use petpal_core::Pet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    models::{
        AdvicePayload, CreateSessionPayload, ErrorResponse, LearningStateResponse, MessageReply,
        QuestionResponse, SendMessagePayload, SessionInfo, TtsHealth,
    },
    state::{AppState, PetSession},
};

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
        }
    }
}

async fn find_session(state: &AppState, id: Uuid) -> Result<Arc<PetSession>, ApiError> {
    state
        .session(id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Session with id '{}' not found", id)))
}

/// Start a conversation with a pet.
#[utoipa::path(
    post,
    path = "/sessions",
    request_body = CreateSessionPayload,
    responses(
        (status = 201, description = "Session created successfully", body = SessionInfo),
    )
)]
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateSessionPayload>,
) -> (StatusCode, Json<SessionInfo>) {
    let pet = payload.pet.as_deref().map(Pet::from_id).unwrap_or_default();
    let session = state.create_session(pet).await;
    (StatusCode::CREATED, Json(session.info()))
}

/// Get a specific session by its ID.
#[utoipa::path(
    get,
    path = "/sessions/{id}",
    responses(
        (status = 200, description = "Session details", body = SessionInfo),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Session ID")
    )
)]
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionInfo>, ApiError> {
    let session = find_session(&state, id).await?;
    Ok(Json(session.info()))
}

/// End a session and release its state.
#[utoipa::path(
    delete,
    path = "/sessions/{id}",
    responses(
        (status = 204, description = "Session removed"),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Session ID")
    )
)]
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .remove_session(id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Session with id '{}' not found", id)))?;
    Ok(StatusCode::NO_CONTENT)
}

/// Get the adaptive learning state of a session.
#[utoipa::path(
    get,
    path = "/sessions/{id}/learning-state",
    responses(
        (status = 200, description = "Current learning state", body = LearningStateResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Session ID")
    )
)]
pub async fn get_learning_state(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<LearningStateResponse>, ApiError> {
    let session = find_session(&state, id).await?;
    Ok(Json(session.orchestrator.learning_state().await.into()))
}

/// Reset the learning state of a session to its initial values.
#[utoipa::path(
    delete,
    path = "/sessions/{id}/learning-state",
    responses(
        (status = 200, description = "Learning state after reset", body = LearningStateResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Session ID")
    )
)]
pub async fn reset_learning_state(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<LearningStateResponse>, ApiError> {
    let session = find_session(&state, id).await?;
    session.orchestrator.reset_learning_state().await;
    info!(session_id = %id, "Learning state reset");
    Ok(Json(session.orchestrator.learning_state().await.into()))
}

/// Generate a reading exercise at the session's current language level.
#[utoipa::path(
    post,
    path = "/sessions/{id}/questions/language",
    responses(
        (status = 200, description = "A new exercise", body = QuestionResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Session ID")
    )
)]
pub async fn language_question(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<QuestionResponse>, ApiError> {
    let session = find_session(&state, id).await?;
    Ok(Json(session.orchestrator.generate_language_question().await.into()))
}

/// Generate an arithmetic exercise at the session's current math level.
#[utoipa::path(
    post,
    path = "/sessions/{id}/questions/math",
    responses(
        (status = 200, description = "A new exercise", body = QuestionResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Session ID")
    )
)]
pub async fn math_question(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<QuestionResponse>, ApiError> {
    let session = find_session(&state, id).await?;
    Ok(Json(session.orchestrator.generate_math_question().await.into()))
}

/// Send one utterance and receive the complete reply.
#[utoipa::path(
    post,
    path = "/sessions/{id}/messages",
    request_body = SendMessagePayload,
    responses(
        (status = 200, description = "The pet's reply", body = MessageReply),
        (status = 400, description = "Empty utterance", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Session ID")
    )
)]
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SendMessagePayload>,
) -> Result<Json<MessageReply>, ApiError> {
    let session = find_session(&state, id).await?;
    let text = payload.text.trim();
    if text.is_empty() {
        return Err(ApiError::BadRequest("text must not be empty".to_string()));
    }

    let reply = session
        .orchestrator
        .submit_utterance(text, session.pet, &payload.history, |_, _| {})
        .await;
    Ok(Json(MessageReply { reply }))
}

/// Ask the pet to propose a small game.
#[utoipa::path(
    post,
    path = "/sessions/{id}/game",
    responses(
        (status = 200, description = "A game suggestion", body = MessageReply),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Session ID")
    )
)]
pub async fn suggest_game(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageReply>, ApiError> {
    let session = find_session(&state, id).await?;
    let reply = session.orchestrator.suggest_game(session.pet).await;
    Ok(Json(MessageReply { reply }))
}

/// Ask the pet for learning advice on a topic.
#[utoipa::path(
    post,
    path = "/sessions/{id}/advice",
    request_body = AdvicePayload,
    responses(
        (status = 200, description = "Advice from the pet", body = MessageReply),
        (status = 400, description = "Empty topic", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Session ID")
    )
)]
pub async fn learning_advice(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdvicePayload>,
) -> Result<Json<MessageReply>, ApiError> {
    let session = find_session(&state, id).await?;
    let topic = payload.topic.trim();
    if topic.is_empty() {
        return Err(ApiError::BadRequest("topic must not be empty".to_string()));
    }
    let reply = session.orchestrator.learning_advice(topic, session.pet).await;
    Ok(Json(MessageReply { reply }))
}

/// Check whether the remote speech synthesis service is usable.
#[utoipa::path(
    get,
    path = "/health/tts",
    responses(
        (status = 200, description = "Synthesis availability", body = TtsHealth)
    )
)]
pub async fn tts_health(State(state): State<Arc<AppState>>) -> Json<TtsHealth> {
    let available = state.synthesizer.probe(Pet::default().voice()).await;
    if !available {
        warn!("Speech synthesis service is unavailable");
    }
    Json(TtsHealth { available })
}
