use super::synthesis::SpeechSynthesizer;
use crate::error::SpeechError;
use crate::pet::Pet;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

/// Notifications emitted by an audio element for the resource it loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message", rename_all = "snake_case")]
pub enum AudioEvent {
    CanPlay,
    Ended,
    Error(String),
}

/// A single-resource audio player.
///
/// Loading a new resource replaces the previous one; events for the new
/// resource arrive on the returned receiver.
pub trait AudioOutput: Send + Sync {
    fn load(&self, url: &str) -> mpsc::Receiver<AudioEvent>;
    fn play(&self) -> Result<(), SpeechError>;
    fn stop(&self);
    fn is_playing(&self) -> bool;
}

/// Text plus the prosody used for on-device synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub text: String,
    pub lang: String,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

impl Utterance {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            lang: "zh-CN".to_string(),
            rate: 0.9,
            pitch: 1.1,
            volume: 0.8,
        }
    }
}

/// Outcome of one on-device utterance. A dropped sender means it was cancelled.
pub type LocalCompletion = oneshot::Receiver<Result<(), SpeechError>>;

/// Speech synthesis running on the user's device.
///
/// Starting an utterance replaces the previous one; its outcome arrives on
/// the returned receiver.
pub trait LocalSynthesizer: Send + Sync {
    fn start(&self, utterance: Utterance) -> LocalCompletion;
    fn cancel(&self);
    fn is_speaking(&self) -> bool;
}

/// Receives lifecycle notifications for one `speak` call.
pub trait PlaybackListener: Send {
    fn on_start(&mut self) {}
    fn on_end(&mut self) {}
    fn on_error(&mut self, _error: &SpeechError) {}
}

impl PlaybackListener for () {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    Started,
    Ended,
    Failed(SpeechError),
}

impl PlaybackListener for mpsc::UnboundedSender<PlaybackEvent> {
    fn on_start(&mut self) {
        let _ = self.send(PlaybackEvent::Started);
    }

    fn on_end(&mut self) {
        let _ = self.send(PlaybackEvent::Ended);
    }

    fn on_error(&mut self, error: &SpeechError) {
        let _ = self.send(PlaybackEvent::Failed(error.clone()));
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// How long a loaded resource may take to become playable.
    pub load_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            load_timeout: Duration::from_secs(5),
        }
    }
}

struct ActiveSession {
    id: u64,
    cancel: watch::Sender<bool>,
}

/// Speaks text with the remote voice and falls back to on-device synthesis.
///
/// At most one session is active. Starting a new one, or calling [`stop`],
/// interrupts the current session; an interrupted session still reports
/// `on_end` exactly once but never `on_error`.
///
/// [`stop`]: SpeechPipeline::stop
pub struct SpeechPipeline {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    audio: Arc<dyn AudioOutput>,
    local: Option<Arc<dyn LocalSynthesizer>>,
    config: PipelineConfig,
    session: Mutex<Option<ActiveSession>>,
    next_id: AtomicU64,
}

impl SpeechPipeline {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        audio: Arc<dyn AudioOutput>,
        local: Option<Arc<dyn LocalSynthesizer>>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            synthesizer,
            audio,
            local,
            config,
            session: Mutex::new(None),
            next_id: AtomicU64::new(0),
        }
    }

    pub async fn speak<L: PlaybackListener>(&self, text: &str, pet: Pet, listener: L) {
        self.speak_while(text, pet, listener, || true).await
    }

    /// Like [`speak`], but only claims the pipeline while `current` holds.
    ///
    /// `current` is evaluated under the session lock, so a caller that flips it
    /// before calling [`stop`] never has a stale utterance start afterwards. A
    /// request refused this way only reports `on_end`.
    ///
    /// [`speak`]: SpeechPipeline::speak
    /// [`stop`]: SpeechPipeline::stop
    pub async fn speak_while<L: PlaybackListener>(
        &self,
        text: &str,
        pet: Pet,
        mut listener: L,
        current: impl FnOnce() -> bool,
    ) {
        if text.trim().is_empty() {
            debug!("Nothing to speak");
            listener.on_end();
            return;
        }

        let Some((id, mut cancelled)) = self.begin_session(current) else {
            debug!("Speech request is no longer current");
            listener.on_end();
            return;
        };
        info!(session = id, %pet, chars = text.chars().count(), "Starting playback");
        listener.on_start();

        let remote = tokio::select! {
            biased;
            _ = cancelled.wait_for(|c| *c) => Err(SpeechError::Interrupted),
            result = self.play_remote(id, text, pet) => result,
        };

        let outcome = match remote {
            Err(SpeechError::Interrupted) => Err(SpeechError::Interrupted),
            Err(e) => {
                warn!(session = id, error = %e, "Remote speech failed, using on-device synthesis");
                self.release_audio(id);
                tokio::select! {
                    biased;
                    _ = cancelled.wait_for(|c| *c) => Err(SpeechError::Interrupted),
                    result = self.speak_locally(id, text) => result,
                }
            }
            ok => ok,
        };

        match &outcome {
            Ok(()) => info!(session = id, "Playback finished"),
            Err(SpeechError::Interrupted) => info!(session = id, "Playback interrupted"),
            Err(e) => {
                warn!(session = id, error = %e, "Playback failed");
                listener.on_error(e);
            }
        }
        self.end_session(id);
        listener.on_end();
    }

    /// Interrupts the current session, if any. Safe to call repeatedly.
    pub fn stop(&self) {
        let mut session = self.session.lock();
        if let Some(active) = session.take() {
            info!(session = active.id, "Stopping playback");
            active.cancel.send_replace(true);
        }
        self.release_outputs();
    }

    pub fn is_playing(&self) -> bool {
        self.audio.is_playing() || self.local.as_ref().is_some_and(|l| l.is_speaking())
    }

    fn begin_session(
        &self,
        current: impl FnOnce() -> bool,
    ) -> Option<(u64, watch::Receiver<bool>)> {
        let mut session = self.session.lock();
        if !current() {
            return None;
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (cancel, cancelled) = watch::channel(false);

        if let Some(previous) = session.replace(ActiveSession { id, cancel }) {
            debug!(session = previous.id, "Interrupting previous playback");
            previous.cancel.send_replace(true);
        }
        self.release_outputs();
        Some((id, cancelled))
    }

    fn end_session(&self, id: u64) {
        let mut session = self.session.lock();
        if session.as_ref().is_some_and(|s| s.id == id) {
            session.take();
            self.audio.stop();
        }
    }

    fn release_outputs(&self) {
        self.audio.stop();
        if let Some(local) = &self.local {
            local.cancel();
        }
    }

    fn release_audio(&self, id: u64) {
        let _ = self.with_current(id, |audio| {
            audio.stop();
            Ok(())
        });
    }

    /// Runs `f` only while `id` is still the active session.
    fn with_current<T>(
        &self,
        id: u64,
        f: impl FnOnce(&dyn AudioOutput) -> Result<T, SpeechError>,
    ) -> Result<T, SpeechError> {
        let session = self.session.lock();
        match session.as_ref() {
            Some(active) if active.id == id => f(self.audio.as_ref()),
            _ => Err(SpeechError::Interrupted),
        }
    }

    async fn play_remote(&self, id: u64, text: &str, pet: Pet) -> Result<(), SpeechError> {
        let url = self.synthesizer.synthesize(text, pet.voice()).await?;
        debug!(session = id, %url, "Loading synthesized audio");
        let mut events = self.with_current(id, |audio| Ok(audio.load(&url)))?;

        let first = tokio::select! {
            event = events.recv() => event,
            _ = tokio::time::sleep(self.config.load_timeout) => return Err(SpeechError::LoadTimeout),
        };
        match first {
            Some(AudioEvent::CanPlay) => {}
            Some(AudioEvent::Ended) => return Ok(()),
            Some(AudioEvent::Error(message)) => return Err(SpeechError::LoadError(message)),
            None => return Err(SpeechError::LoadError("audio output closed".to_string())),
        }

        self.with_current(id, |audio| audio.play())?;
        loop {
            match events.recv().await {
                Some(AudioEvent::Ended) => return Ok(()),
                Some(AudioEvent::CanPlay) => continue,
                Some(AudioEvent::Error(message)) => return Err(SpeechError::PlaybackFailed(message)),
                None => {
                    return Err(SpeechError::PlaybackFailed("audio output closed".to_string()));
                }
            }
        }
    }

    async fn speak_locally(&self, id: u64, text: &str) -> Result<(), SpeechError> {
        let Some(local) = self.local.clone() else {
            return Err(SpeechError::SynthesisUnavailable);
        };
        let done = self.with_current(id, |_| Ok(local.start(Utterance::new(text))))?;
        done.await.unwrap_or(Err(SpeechError::Interrupted))
    }
}
