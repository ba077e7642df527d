//! HTTP routes and the error type they share.

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Json, Multipart, State},
    http::{HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use crate::audio::AudioError;
use crate::auth::{require_api_key, ApiCredentials};
use crate::config::RECOGNITION_STATUS_HEADER;
use crate::synthesizer::{synthesize_base64, SpeechSynthesizer, SynthesisError};
use crate::transcriber::Transcriber;

#[derive(Clone)]
pub struct AppState {
    pub credentials: Arc<ApiCredentials>,
    pub transcriber: Transcriber,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid API Key")]
    Unauthorized,
    #[error("Missing file field")]
    MissingFile,
    #[error("Invalid audio file: {0}")]
    InvalidAudio(AudioError),
    #[error("Audio processing failed: {0}")]
    AudioProcessing(AudioError),
    #[error("Malformed upload: {0}")]
    BadUpload(#[from] MultipartError),
    #[error("Synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),
}

impl From<AudioError> for ApiError {
    fn from(err: AudioError) -> Self {
        if err.is_client_error() {
            ApiError::InvalidAudio(err)
        } else {
            ApiError::AudioProcessing(err)
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::MissingFile | ApiError::InvalidAudio(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            ApiError::BadUpload(e) => (e.status(), self.to_string()),
            ApiError::AudioProcessing(e) => {
                tracing::error!(error = %e, "Speech-to-text failed");
                internal_error()
            }
            ApiError::Synthesis(e) => {
                tracing::error!(error = %e, "Text-to-speech failed");
                internal_error()
            }
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

fn internal_error() -> (StatusCode, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal Server Error".to_string(),
    )
}

#[derive(Debug, Deserialize)]
pub struct TextInput {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct SttResponse {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct TtsResponse {
    pub audio: String,
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    let protected = Router::new()
        .route("/stt", post(stt))
        .route("/tts", post(tts))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key))
        .layer(DefaultBodyLimit::max(max_upload_bytes));

    Router::new()
        .route("/health", get(health_check))
        .merge(protected)
        .with_state(state)
}

pub async fn health_check() -> &'static str {
    "ok"
}

async fn stt(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut audio = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            audio = Some(field.bytes().await?);
            break;
        }
    }
    let audio = audio.ok_or(ApiError::MissingFile)?;

    tracing::info!(bytes = audio.len(), "Received STT upload");
    let recognition = state.transcriber.transcribe(&audio).await?;

    let status = HeaderValue::from_static(recognition.status());
    let mut response = Json(SttResponse {
        text: recognition.into_text(),
    })
    .into_response();
    response.headers_mut().insert(RECOGNITION_STATUS_HEADER, status);
    Ok(response)
}

async fn tts(
    State(state): State<AppState>,
    Json(input): Json<TextInput>,
) -> Result<Json<TtsResponse>, ApiError> {
    tracing::info!(chars = input.text.chars().count(), "Received TTS request");
    let audio = synthesize_base64(state.synthesizer.as_ref(), &input.text).await?;
    Ok(Json(TtsResponse { audio }))
}
