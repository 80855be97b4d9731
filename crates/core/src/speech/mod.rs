//! Speech output: remote synthesis, audio playback and on-device fallback.

mod pipeline;
mod synthesis;

pub use pipeline::{
    AudioEvent, AudioOutput, LocalCompletion, LocalSynthesizer, PipelineConfig, PlaybackEvent,
    PlaybackListener, SpeechPipeline, Utterance,
};
pub use synthesis::{
    RemoteSynthesizer, SpeechSynthesizer, SynthesisConfig, SynthesisResult, resolve_audio_url,
};

#[cfg(test)]
pub use synthesis::MockSpeechSynthesizer;
