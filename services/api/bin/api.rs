//! Main Entrypoint for the PetPal API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing the chat and speech synthesis clients.
//! 3. Constructing the Axum router and applying middleware.
//! 4. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use petpal_api::{config::Config, router::create_router, state::AppState};
use petpal_core::{
    llm_client::{LLMClient, OpenAICompatibleClient, SamplingParams},
    speech::{RemoteSynthesizer, SynthesisConfig},
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize Shared Services ---
    let llm_client: Option<Arc<dyn LLMClient>> = match &config.deepseek_api_key {
        Some(api_key) => {
            let openai_config = OpenAIConfig::new()
                .with_api_key(api_key)
                .with_api_base(&config.chat_api_base);
            let client: Arc<dyn LLMClient> = Arc::new(OpenAICompatibleClient::new(
                openai_config,
                config.chat_model.clone(),
                SamplingParams::default(),
            ));
            Some(client)
        }
        None => {
            warn!("DEEPSEEK_API_KEY is not set; pets will answer with canned replies.");
            None
        }
    };

    let synthesizer = RemoteSynthesizer::new(SynthesisConfig {
        endpoint: config.tts_api_url.clone(),
        base_url: config.tts_base_url.clone(),
        ..SynthesisConfig::default()
    })
    .context("Failed to build speech synthesis client")?;

    let bind_address = config.bind_address;
    info!(
        model = %config.chat_model,
        chat_api_base = %config.chat_api_base,
        tts_api_url = %config.tts_api_url,
        audio_load_timeout = ?config.audio_load_timeout,
        %bind_address,
        "Service configured. Starting server..."
    );
    let app_state = Arc::new(AppState::new(config, llm_client, Arc::new(synthesizer)));

    // --- 4. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 5. Start Server ---
    let listener = tokio::net::TcpListener::bind(bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
