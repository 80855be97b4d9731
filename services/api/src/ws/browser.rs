//! Speech outputs living in the connected browser.
//!
//! The server drives the browser's audio element and speech synthesizer with
//! `ServerMessage`s and gets their progress back as client messages, which the
//! session loop hands to `deliver`.

use super::protocol::ServerMessage;
use parking_lot::Mutex;
use petpal_core::{
    SpeechError,
    speech::{AudioEvent, AudioOutput, LocalCompletion, LocalSynthesizer, Utterance},
};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

pub type Outbound = mpsc::UnboundedSender<ServerMessage>;

/// The browser's single audio element.
pub struct BrowserAudio {
    outbound: Outbound,
    events: Mutex<Option<mpsc::Sender<AudioEvent>>>,
    playing: AtomicBool,
}

impl BrowserAudio {
    pub fn new(outbound: Outbound) -> Self {
        Self {
            outbound,
            events: Mutex::new(None),
            playing: AtomicBool::new(false),
        }
    }

    /// Routes an event reported by the browser to the current resource, if any.
    pub fn deliver(&self, event: AudioEvent) {
        if matches!(event, AudioEvent::Ended | AudioEvent::Error(_)) {
            self.playing.store(false, Ordering::SeqCst);
        }
        match self.events.lock().as_ref() {
            Some(events) => {
                let _ = events.try_send(event);
            }
            None => debug!(?event, "Dropping audio event with no loaded resource"),
        }
    }
}

impl AudioOutput for BrowserAudio {
    fn load(&self, url: &str) -> mpsc::Receiver<AudioEvent> {
        let (tx, rx) = mpsc::channel(8);
        *self.events.lock() = Some(tx);
        let _ = self.outbound.send(ServerMessage::LoadAudio {
            url: url.to_string(),
        });
        rx
    }

    fn play(&self) -> Result<(), SpeechError> {
        self.outbound
            .send(ServerMessage::PlayAudio)
            .map_err(|_| SpeechError::PlaybackFailed("client disconnected".to_string()))?;
        self.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.playing.store(false, Ordering::SeqCst);
        if self.events.lock().take().is_some() {
            let _ = self.outbound.send(ServerMessage::StopAudio);
        }
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }
}

/// The browser's own speech synthesizer.
pub struct BrowserSpeech {
    outbound: Outbound,
    pending: Mutex<Option<oneshot::Sender<Result<(), SpeechError>>>>,
    speaking: AtomicBool,
}

impl BrowserSpeech {
    pub fn new(outbound: Outbound) -> Self {
        Self {
            outbound,
            pending: Mutex::new(None),
            speaking: AtomicBool::new(false),
        }
    }

    /// Completes the utterance in flight with the browser's verdict.
    pub fn deliver(&self, ok: bool, message: Option<String>) {
        let Some(pending) = self.pending.lock().take() else {
            debug!(ok, "Dropping local speech event with nothing in flight");
            return;
        };
        self.speaking.store(false, Ordering::SeqCst);
        let result = if ok {
            Ok(())
        } else {
            Err(SpeechError::LocalSynthesis(
                message.unwrap_or_else(|| "speech synthesis failed".to_string()),
            ))
        };
        let _ = pending.send(result);
    }
}

impl LocalSynthesizer for BrowserSpeech {
    fn start(&self, utterance: Utterance) -> LocalCompletion {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.pending.lock();
        if self
            .outbound
            .send(ServerMessage::SpeakLocally { utterance })
            .is_err()
        {
            let _ = tx.send(Err(SpeechError::LocalSynthesis(
                "client disconnected".to_string(),
            )));
            return rx;
        }
        // Dropping an older sender resolves its receiver as interrupted.
        *pending = Some(tx);
        self.speaking.store(true, Ordering::SeqCst);
        rx
    }

    fn cancel(&self) {
        self.speaking.store(false, Ordering::SeqCst);
        if self.pending.lock().take().is_some() {
            let _ = self.outbound.send(ServerMessage::CancelLocalSpeech);
        }
    }

    fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }
}
