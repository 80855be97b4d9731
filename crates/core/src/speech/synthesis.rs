//! Remote speech synthesis client.

use crate::error::SpeechError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Turns text into a playable audio location.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Returns an absolute URL of the synthesized audio.
    async fn synthesize(&self, text: &str, voice: &str) -> Result<String, SpeechError>;
}

#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    /// Endpoint receiving `{text, voice}`.
    pub endpoint: String,
    /// Base location the returned relative audio paths are resolved against.
    pub base_url: String,
    pub request_timeout: Duration,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://xbpethd.gaodun.com/api/leftsite-tts/convert".to_string(),
            base_url: "https://xbpethd.gaodun.com".to_string(),
            request_timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    voice: &'a str,
}

#[derive(Debug, Deserialize)]
struct SynthesisResponse {
    #[serde(default)]
    success: bool,
    status: Option<i64>,
    message: Option<String>,
    result: Option<SynthesisResult>,
}

/// Metadata returned for a synthesized file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisResult {
    pub audio_url: Option<String>,
    pub file_name: Option<String>,
    pub size: Option<u64>,
    pub format: Option<String>,
    pub voice: Option<String>,
}

impl SynthesisResponse {
    fn into_result(self) -> Result<SynthesisResult, SpeechError> {
        if !self.success || self.status != Some(0) {
            return Err(SpeechError::BusinessFailure(
                self.message.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        match self.result {
            Some(result) if result.audio_url.as_deref().is_some_and(|u| !u.is_empty()) => Ok(result),
            _ => Err(SpeechError::MalformedResponse(
                "response is missing result.audioUrl".to_string(),
            )),
        }
    }
}

/// Joins a returned audio path onto the configured base location.
pub fn resolve_audio_url(base_url: &str, audio_path: &str) -> String {
    if audio_path.starts_with("http://") || audio_path.starts_with("https://") {
        return audio_path.to_string();
    }
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        audio_path.trim_start_matches('/')
    )
}

/// `SpeechSynthesizer` backed by the HTTP synthesis service.
pub struct RemoteSynthesizer {
    http: reqwest::Client,
    config: SynthesisConfig,
}

impl RemoteSynthesizer {
    pub fn new(config: SynthesisConfig) -> Result<Self, SpeechError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { http, config })
    }

    /// Checks that the service answers a short request with a usable payload.
    pub async fn probe(&self, voice: &str) -> bool {
        match self.synthesize("API测试音频", voice).await {
            Ok(url) => {
                debug!(%url, "Synthesis probe succeeded");
                true
            }
            Err(e) => {
                warn!(error = %e, "Synthesis probe failed");
                false
            }
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for RemoteSynthesizer {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<String, SpeechError> {
        debug!(endpoint = %self.config.endpoint, %voice, chars = text.chars().count(), "Requesting speech synthesis");
        let response = self
            .http
            .post(&self.config.endpoint)
            .json(&SynthesisRequest { text, voice })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SpeechError::Network(format!("HTTP {}: {}", status, body)));
        }

        let body: SynthesisResponse = response
            .json()
            .await
            .map_err(|e| SpeechError::MalformedResponse(e.to_string()))?;
        let result = body.into_result()?;
        let path = result.audio_url.as_deref().unwrap_or_default();
        debug!(
            file_name = ?result.file_name,
            size = ?result.size,
            format = ?result.format,
            voice = ?result.voice,
            "Speech synthesized"
        );
        Ok(resolve_audio_url(&self.config.base_url, path))
    }
}
