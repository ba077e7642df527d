//! Speech recognition against an OpenAI-compatible transcription backend

use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::audio::{AudioClip, AudioError};
use crate::config::{BACKEND_FAILURE_PREFIX, UNRECOGNIZED_TEXT};
use crate::settings::SttSettings;

#[derive(Error, Debug)]
pub enum TranscriptionError {
    #[error("HTTP request failed: {0}")]
    RequestError(String),
    #[error("API error: {0}")]
    ApiError(String),
    #[error("Failed to parse response: {0}")]
    ParseError(String),
}

/// Outcome of one recognition attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Recognition {
    Transcribed(String),
    /// Audio was processed but no speech could be made out.
    Unrecognized,
    /// The backend could not be reached or rejected the request.
    BackendFailed(String),
}

impl Recognition {
    pub fn status(&self) -> &'static str {
        match self {
            Recognition::Transcribed(_) => "transcribed",
            Recognition::Unrecognized => "unrecognized",
            Recognition::BackendFailed(_) => "backend-error",
        }
    }

    /// Wire text: failures are rendered as ordinary sentences.
    pub fn into_text(self) -> String {
        match self {
            Recognition::Transcribed(text) => text,
            Recognition::Unrecognized => UNRECOGNIZED_TEXT.to_string(),
            Recognition::BackendFailed(reason) => {
                format!("{}{}", BACKEND_FAILURE_PREFIX, reason)
            }
        }
    }
}

/// `verbose_json` reply; `segments` is absent on plain `json` backends.
#[derive(Debug, Deserialize)]
pub struct TranscriptionResponse {
    pub text: String,
    #[serde(default)]
    pub segments: Vec<Segment>,
}

#[derive(Debug, Deserialize)]
pub struct Segment {
    #[serde(default)]
    pub no_speech_prob: Option<f32>,
}

impl TranscriptionResponse {
    /// True when the backend itself reports that no segment holds speech.
    pub fn is_no_speech(&self, threshold: f32) -> bool {
        !self.segments.is_empty()
            && self
                .segments
                .iter()
                .all(|s| s.no_speech_prob.is_some_and(|p| p > threshold))
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[derive(Clone)]
pub struct Transcriber {
    client: reqwest::Client,
    settings: SttSettings,
}

impl Transcriber {
    pub fn new(settings: SttSettings) -> Result<Self, TranscriptionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| TranscriptionError::RequestError(e.to_string()))?;

        Ok(Self { client, settings })
    }

    /// Recognize a complete upload (WAV, FLAC or AIFF).
    ///
    /// Only undecodable audio is an error. Backend trouble and unintelligible
    /// speech are reported through [`Recognition`].
    pub async fn transcribe(&self, audio_data: &[u8]) -> Result<Recognition, AudioError> {
        let clip = AudioClip::from_bytes(audio_data)?;

        if clip.is_silent() {
            tracing::info!(
                duration_secs = clip.duration_secs(),
                "Upload is silent, skipping backend"
            );
            return Ok(Recognition::Unrecognized);
        }

        let wav = clip.to_wav_bytes()?;
        let started = Instant::now();

        let threshold = self.settings.no_speech_threshold;
        let recognition = match self.request_transcription(wav).await {
            Ok(reply) if reply.text.trim().is_empty() => Recognition::Unrecognized,
            Ok(reply) if reply.is_no_speech(threshold) => {
                tracing::debug!(threshold, "Backend flagged every segment as non-speech");
                Recognition::Unrecognized
            }
            Ok(reply) => Recognition::Transcribed(reply.text.trim().to_string()),
            Err(e) => {
                tracing::warn!(error = %e, "Recognition backend failed");
                Recognition::BackendFailed(e.to_string())
            }
        };

        tracing::info!(
            status = recognition.status(),
            duration_secs = clip.duration_secs(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Recognition finished"
        );

        Ok(recognition)
    }

    async fn request_transcription(
        &self,
        wav: Vec<u8>,
    ) -> Result<TranscriptionResponse, TranscriptionError> {
        tracing::debug!(
            bytes = wav.len(),
            url = %self.settings.api_url,
            "Sending audio to recognition backend"
        );

        let audio_part = Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| TranscriptionError::RequestError(e.to_string()))?;

        let mut form = Form::new()
            .part("file", audio_part)
            .text("model", self.settings.model.clone())
            .text("temperature", "0")
            .text("response_format", "verbose_json");

        if let Some(language) = &self.settings.language {
            form = form.text("language", language.clone());
        }

        let mut request = self.client.post(&self.settings.api_url).multipart(form);
        if let Some(api_key) = &self.settings.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TranscriptionError::RequestError(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TranscriptionError::RequestError(e.to_string()))?;

        if !status.is_success() {
            if let Ok(error_resp) = serde_json::from_str::<ApiErrorResponse>(&body) {
                return Err(TranscriptionError::ApiError(error_resp.error.message));
            }
            return Err(TranscriptionError::ApiError(format!("HTTP {}: {}", status, body)));
        }

        serde_json::from_str(&body)
            .map_err(|e| TranscriptionError::ParseError(format!("{}: {}", e, body)))
    }
}
