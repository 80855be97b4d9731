//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API, WebSocket endpoint, and OpenAPI documentation.

use crate::{
    handlers,
    models::{
        AdvicePayload, CreateSessionPayload, ErrorResponse, LearningStateResponse, MessageReply,
        QuestionResponse, SendMessagePayload, SessionInfo, TtsHealth,
    },
    state::AppState,
    ws::ws_handler,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::create_session,
        handlers::get_session,
        handlers::delete_session,
        handlers::get_learning_state,
        handlers::reset_learning_state,
        handlers::language_question,
        handlers::math_question,
        handlers::send_message,
        handlers::suggest_game,
        handlers::learning_advice,
        handlers::tts_health,
    ),
    components(
        schemas(SessionInfo, CreateSessionPayload, AdvicePayload, SendMessagePayload, MessageReply, LearningStateResponse, QuestionResponse, TtsHealth, ErrorResponse)
    ),
    tags(
        (name = "PetPal API", description = "Conversations, exercises and speech health for the pet companion")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/sessions", post(handlers::create_session))
        .route(
            "/sessions/{id}",
            get(handlers::get_session).delete(handlers::delete_session),
        )
        .route(
            "/sessions/{id}/learning-state",
            get(handlers::get_learning_state).delete(handlers::reset_learning_state),
        )
        .route(
            "/sessions/{id}/questions/language",
            post(handlers::language_question),
        )
        .route("/sessions/{id}/questions/math", post(handlers::math_question))
        .route("/sessions/{id}/messages", post(handlers::send_message))
        .route("/sessions/{id}/game", post(handlers::suggest_game))
        .route("/sessions/{id}/advice", post(handlers::learning_advice))
        .route("/health/tts", get(handlers::tts_health))
        .route("/ws", get(ws_handler))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
