//! Manages the WebSocket connection lifecycle for a pet session.

use super::{
    browser::{BrowserAudio, BrowserSpeech, Outbound},
    protocol::{ClientMessage, ServerMessage},
};
use crate::state::{AppState, PetSession};
use anyhow::{Context, Result, anyhow};
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use petpal_core::{
    ConversationTurn, SpeechError,
    speech::{LocalSynthesizer, PipelineConfig, PlaybackListener, SpeechPipeline},
};
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{Instrument, debug, error, info, instrument, warn};

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Main handler for an individual WebSocket connection.
///
/// Performs the `init` handshake, then runs the session loop until the client
/// goes away.
#[instrument(name = "ws_session", skip_all, fields(connection))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection: u32 = rand::random();
    tracing::Span::current().record("connection", connection);
    info!("New WebSocket connection. Awaiting initialization...");

    let (mut socket_tx, mut socket_rx) = socket.split();

    let init = match socket_rx.next().await {
        Some(Ok(Message::Text(text))) => initialize(&text, &state).await,
        Some(Ok(_)) => Err(anyhow!("First message was not a text `init` message.")),
        _ => {
            info!("Client disconnected before sending init message.");
            return;
        }
    };
    let (session, speech_synthesis) = match init {
        Ok(init) => init,
        Err(e) => {
            error!("Session initialization failed: {:?}", e);
            let _ = send_msg(
                &mut socket_tx,
                ServerMessage::Error {
                    message: e.to_string(),
                },
            )
            .await;
            return;
        }
    };

    let initialized = ServerMessage::Initialized {
        session_id: session.id,
        pet: session.pet,
        greeting: session.pet.personality().greeting.to_string(),
    };
    if send_msg(&mut socket_tx, initialized).await.is_err() {
        error!("Failed to send Initialized message to client.");
        return;
    }

    let session_span = tracing::info_span!("pet_session", session_id = %session.id, pet = %session.pet);
    async move {
        if let Err(e) = run_session(state, session, socket_tx, socket_rx, speech_synthesis).await {
            error!(error = ?e, "Pet session terminated with error.");
        }
        info!("Pet session finished.");
    }
    .instrument(session_span)
    .await;
}

/// Parses the `init` message and looks up the session it names.
async fn initialize(init_text: &str, state: &AppState) -> Result<(Arc<PetSession>, bool)> {
    let init_msg: ClientMessage =
        serde_json::from_str(init_text).context("Malformed `init` message")?;
    let ClientMessage::Init {
        session_id,
        speech_synthesis,
    } = init_msg
    else {
        return Err(anyhow!("First message must be `init`"));
    };

    let session = state
        .session(session_id)
        .await
        .with_context(|| format!("Session with id '{}' not found", session_id))?;
    info!(%session_id, speech_synthesis, "Attached to session");
    Ok((session, speech_synthesis))
}

/// Reports playback of one `speak` request to the client.
struct SpeechRelay {
    outbound: Outbound,
    speech_id: u64,
}

impl PlaybackListener for SpeechRelay {
    fn on_start(&mut self) {
        let _ = self.outbound.send(ServerMessage::SpeakingStart {
            speech_id: self.speech_id,
        });
    }

    fn on_end(&mut self) {
        let _ = self.outbound.send(ServerMessage::SpeakingEnd {
            speech_id: self.speech_id,
        });
    }

    fn on_error(&mut self, error: &SpeechError) {
        let _ = self.outbound.send(ServerMessage::SpeechError {
            speech_id: self.speech_id,
            message: error.to_string(),
        });
    }
}

/// Per-connection resources.
struct Connection {
    session: Arc<PetSession>,
    outbound: Outbound,
    audio: Arc<BrowserAudio>,
    speech: Option<Arc<BrowserSpeech>>,
    pipeline: Arc<SpeechPipeline>,
    voice_enabled: bool,
    next_speech_id: u64,
    /// Bumped before the pipeline is stopped for a new turn; a reply is only
    /// spoken while its turn is current.
    turn: Arc<AtomicU64>,
    turn_task: Option<JoinHandle<()>>,
}

impl Connection {
    fn relay(&mut self) -> SpeechRelay {
        self.next_speech_id += 1;
        SpeechRelay {
            outbound: self.outbound.clone(),
            speech_id: self.next_speech_id,
        }
    }

    fn handle(&mut self, msg: ClientMessage) {
        match msg {
            ClientMessage::UserMessage { text, history } => self.start_turn(text, history),
            ClientMessage::Speak { text } => {
                let relay = self.relay();
                let pipeline = self.pipeline.clone();
                let pet = self.session.pet;
                tokio::spawn(
                    async move { pipeline.speak(&text, pet, relay).await }.in_current_span(),
                );
            }
            ClientMessage::StopSpeaking => self.pipeline.stop(),
            ClientMessage::SetVoiceEnabled { enabled } => {
                info!(enabled, "Voice output toggled by client.");
                self.voice_enabled = enabled;
                if !enabled {
                    self.pipeline.stop();
                }
            }
            ClientMessage::AudioEvent { event } => self.audio.deliver(event),
            ClientMessage::LocalSpeechEvent { ok, message } => match &self.speech {
                Some(speech) => speech.deliver(ok, message),
                None => warn!("Local speech event from a client without speech synthesis."),
            },
            ClientMessage::Init { .. } => warn!("Ignoring repeated `init` message."),
        }
    }

    /// Streams a reply to the client, then speaks it when voice is enabled.
    ///
    /// A new turn replaces the one in flight, along with its speech. Only the
    /// streaming part is aborted; speech runs in its own task so an interrupted
    /// playback still reports its end.
    fn start_turn(&mut self, text: String, history: Vec<ConversationTurn>) {
        let turn = self.turn.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(previous) = self.turn_task.take() {
            previous.abort();
        }
        self.pipeline.stop();

        let session = self.session.clone();
        let outbound = self.outbound.clone();
        let pipeline = self.pipeline.clone();
        let current = self.turn.clone();
        let relay = self.voice_enabled.then(|| self.relay());

        let task = async move {
            let _ = outbound.send(ServerMessage::ResponseStart);
            let reply = session
                .orchestrator
                .submit_utterance(&text, session.pet, &history, |delta, text| {
                    let _ = outbound.send(ServerMessage::ResponseChunk {
                        delta: delta.to_string(),
                        text: text.to_string(),
                    });
                })
                .await;
            let _ = outbound.send(ServerMessage::ResponseEnd {
                text: reply.clone(),
            });
            let learning = session.orchestrator.learning_state().await;
            let _ = outbound.send(ServerMessage::LearningState {
                state: learning.into(),
            });

            if let Some(relay) = relay {
                let pet = session.pet;
                tokio::spawn(
                    async move {
                        pipeline
                            .speak_while(&reply, pet, relay, || {
                                current.load(Ordering::SeqCst) == turn
                            })
                            .await;
                    }
                    .in_current_span(),
                );
            }
        };
        self.turn_task = Some(tokio::spawn(task.in_current_span()));
    }

    fn shutdown(&mut self) {
        self.turn.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = self.turn_task.take() {
            task.abort();
        }
        self.pipeline.stop();
    }
}

/// The main event loop for an attached WebSocket connection.
async fn run_session(
    state: Arc<AppState>,
    session: Arc<PetSession>,
    mut socket_tx: SplitSink<WebSocket, Message>,
    mut socket_rx: SplitStream<WebSocket>,
    speech_synthesis: bool,
) -> Result<()> {
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<ServerMessage>();

    // All writes go through one task so spawned turns never contend for the sink.
    let writer = tokio::spawn(
        async move {
            while let Some(msg) = outbound_rx.recv().await {
                if let Err(e) = send_msg(&mut socket_tx, msg).await {
                    warn!(error = %e, "Failed to write to client WebSocket.");
                    break;
                }
            }
        }
        .in_current_span(),
    );

    let audio = Arc::new(BrowserAudio::new(outbound.clone()));
    let speech = speech_synthesis.then(|| Arc::new(BrowserSpeech::new(outbound.clone())));
    let pipeline = Arc::new(SpeechPipeline::new(
        state.synthesizer.clone(),
        audio.clone(),
        speech.clone().map(|s| s as Arc<dyn LocalSynthesizer>),
        PipelineConfig {
            load_timeout: state.config.audio_load_timeout,
        },
    ));

    let mut connection = Connection {
        session,
        outbound,
        audio,
        speech,
        pipeline,
        voice_enabled: true,
        next_speech_id: 0,
        turn: Arc::new(AtomicU64::new(0)),
        turn_task: None,
    };

    while let Some(msg_result) = socket_rx.next().await {
        match msg_result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(msg) => connection.handle(msg),
                Err(e) => {
                    warn!(error = %e, "Ignoring malformed client message.");
                    let _ = connection.outbound.send(ServerMessage::Error {
                        message: format!("malformed message: {}", e),
                    });
                }
            },
            Ok(Message::Close(_)) => {
                info!("Client sent close frame. Shutting down session.");
                break;
            }
            Ok(Message::Binary(_)) => debug!("Ignoring binary frame."),
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Err(e) => {
                error!("Error receiving from client WebSocket: {:?}", e);
                break;
            }
        }
    }

    connection.shutdown();
    drop(connection);
    writer.abort();
    info!("WebSocket connection closed.");
    Ok(())
}

/// A helper function to serialize and send a `ServerMessage` to the client.
pub(crate) async fn send_msg(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    msg: ServerMessage,
) -> Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::tests::test_state;
    use axum::{Json, Router, routing::post};
    use petpal_core::{
        Pet,
        speech::{RemoteSynthesizer, SpeechSynthesizer, SynthesisConfig},
    };
    use std::time::Duration;

    async fn connection(
        state: &AppState,
        voice_enabled: bool,
    ) -> (Connection, mpsc::UnboundedReceiver<ServerMessage>) {
        connection_with(state, voice_enabled, state.synthesizer.clone()).await
    }

    async fn connection_with(
        state: &AppState,
        voice_enabled: bool,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> (Connection, mpsc::UnboundedReceiver<ServerMessage>) {
        let session = state.create_session(Pet::Fox).await;
        let (outbound, rx) = mpsc::unbounded_channel();
        let audio = Arc::new(BrowserAudio::new(outbound.clone()));
        let pipeline = Arc::new(SpeechPipeline::new(
            synthesizer,
            audio.clone(),
            None,
            PipelineConfig::default(),
        ));
        let connection = Connection {
            session,
            outbound,
            audio,
            speech: None,
            pipeline,
            voice_enabled,
            next_speech_id: 0,
            turn: Arc::new(AtomicU64::new(0)),
            turn_task: None,
        };
        (connection, rx)
    }

    /// A synthesis service that always returns the same relative audio path.
    async fn synthesis_stub() -> Arc<dyn SpeechSynthesizer> {
        let router = Router::new().route(
            "/convert",
            post(|| async {
                Json(serde_json::json!({
                    "success": true,
                    "status": 0,
                    "result": {"audioUrl": "/audio/reply.mp3"}
                }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        Arc::new(
            RemoteSynthesizer::new(SynthesisConfig {
                endpoint: format!("{}/convert", base),
                base_url: base,
                request_timeout: Duration::from_secs(2),
            })
            .unwrap(),
        )
    }

    /// Collects outbound messages up to and including the first one matching `last`.
    async fn collect_until(
        rx: &mut mpsc::UnboundedReceiver<ServerMessage>,
        last: impl Fn(&ServerMessage) -> bool,
    ) -> Vec<ServerMessage> {
        let mut seen = Vec::new();
        loop {
            let message = tokio::time::timeout(Duration::from_secs(3), rx.recv())
                .await
                .expect("timed out waiting for the client message")
                .expect("outbound channel closed");
            let done = last(&message);
            seen.push(message);
            if done {
                return seen;
            }
        }
    }

    #[tokio::test]
    async fn test_initialize_requires_known_session() {
        let state = test_state();
        let session = state.create_session(Pet::Owl).await;

        let init = format!(
            r#"{{"type":"init","session_id":"{}","speech_synthesis":true}}"#,
            session.id
        );
        let (attached, speech_synthesis) = initialize(&init, &state).await.unwrap();
        assert_eq!(attached.id, session.id);
        assert!(speech_synthesis);

        let unknown = format!(r#"{{"type":"init","session_id":"{}"}}"#, uuid::Uuid::new_v4());
        assert!(initialize(&unknown, &state).await.is_err());
        assert!(initialize(r#"{"type":"stop_speaking"}"#, &state).await.is_err());
    }

    #[tokio::test]
    async fn test_turn_streams_reply_then_learning_state() {
        let state = test_state();
        let (mut connection, mut rx) = connection(&state, false).await;

        connection.handle(ClientMessage::UserMessage {
            text: "你好".to_string(),
            history: vec![],
        });
        connection.turn_task.take().unwrap().await.unwrap();

        let mut messages = Vec::new();
        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }
        assert_eq!(messages.first(), Some(&ServerMessage::ResponseStart));

        let streamed: String = messages
            .iter()
            .filter_map(|m| match m {
                ServerMessage::ResponseChunk { delta, .. } => Some(delta.as_str()),
                _ => None,
            })
            .collect();
        let end = messages
            .iter()
            .find_map(|m| match m {
                ServerMessage::ResponseEnd { text } => Some(text.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(streamed, end);
        assert!(end.contains("小狐狸"));
        assert!(matches!(messages.last(), Some(ServerMessage::LearningState { .. })));
        assert!(!messages.iter().any(|m| matches!(m, ServerMessage::SpeakingStart { .. })));
    }

    #[tokio::test]
    async fn test_speech_relay_numbers_each_request() {
        let state = test_state();
        let (mut connection, mut rx) = connection(&state, true).await;

        let mut first = connection.relay();
        let mut second = connection.relay();
        first.on_start();
        second.on_error(&SpeechError::SynthesisUnavailable);
        second.on_end();

        assert_eq!(rx.recv().await, Some(ServerMessage::SpeakingStart { speech_id: 1 }));
        assert!(matches!(
            rx.recv().await,
            Some(ServerMessage::SpeechError { speech_id: 2, .. })
        ));
        assert_eq!(rx.recv().await, Some(ServerMessage::SpeakingEnd { speech_id: 2 }));
    }

    #[tokio::test]
    async fn test_disabling_voice_is_remembered() {
        let state = test_state();
        let (mut connection, _rx) = connection(&state, true).await;

        connection.handle(ClientMessage::SetVoiceEnabled { enabled: false });
        assert!(!connection.voice_enabled);
        connection.handle(ClientMessage::StopSpeaking);
        assert!(!connection.pipeline.is_playing());
    }

    #[tokio::test]
    async fn test_new_turn_ends_speech_of_the_previous_turn() {
        let state = test_state();
        let (mut connection, mut rx) = connection_with(&state, true, synthesis_stub().await).await;
        let is_load = |m: &ServerMessage| matches!(m, ServerMessage::LoadAudio { .. });

        connection.handle(ClientMessage::UserMessage {
            text: "你好".to_string(),
            history: vec![],
        });
        let mut seen = collect_until(&mut rx, is_load).await;

        connection.handle(ClientMessage::UserMessage {
            text: "再见".to_string(),
            history: vec![],
        });
        seen.extend(collect_until(&mut rx, is_load).await);

        connection.shutdown();
        seen.extend(
            collect_until(&mut rx, |m| *m == ServerMessage::SpeakingEnd { speech_id: 2 }).await,
        );

        for speech_id in [1, 2] {
            let start = seen
                .iter()
                .position(|m| *m == ServerMessage::SpeakingStart { speech_id })
                .unwrap();
            let ends: Vec<usize> = seen
                .iter()
                .enumerate()
                .filter(|(_, m)| **m == ServerMessage::SpeakingEnd { speech_id })
                .map(|(i, _)| i)
                .collect();
            assert_eq!(ends.len(), 1, "speech {} must end exactly once", speech_id);
            assert!(ends[0] > start);
        }
        assert!(
            !seen
                .iter()
                .any(|m| matches!(m, ServerMessage::SpeechError { .. }))
        );
    }

    #[tokio::test]
    async fn test_closing_during_reply_never_starts_its_speech() {
        let state = test_state();
        let (mut connection, mut rx) = connection_with(&state, true, synthesis_stub().await).await;

        connection.handle(ClientMessage::UserMessage {
            text: "你好".to_string(),
            history: vec![],
        });
        connection.shutdown();
        tokio::time::sleep(Duration::from_millis(200)).await;

        while let Ok(message) = rx.try_recv() {
            assert!(!matches!(
                message,
                ServerMessage::SpeakingStart { .. } | ServerMessage::LoadAudio { .. }
            ));
        }
    }
}
