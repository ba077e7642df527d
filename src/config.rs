//! Fixed values shared across the service.
//! Anything an operator may want to change lives in `settings` instead.

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

pub const GROQ_API_URL: &str = "https://api.groq.com/openai/v1/audio/transcriptions";
pub const WHISPER_MODEL: &str = "whisper-large-v3-turbo";
pub const DEFAULT_LANGUAGE: &str = "en";
pub const DEFAULT_STT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_NO_SPEECH_THRESHOLD: f32 = 0.6;

pub const DEFAULT_TTS_PROGRAM: &str = "espeak-ng";

/// Audio Configuration
pub const CHANNELS: u16 = 1;
pub const BITS_PER_SAMPLE: u16 = 16;
pub const TARGET_SAMPLE_RATE: u32 = 16000;

/// Credential headers
pub const APP_ID_HEADER: &str = "x-app-id";
pub const APP_KEY_HEADER: &str = "x-app-key";
pub const RECOGNITION_STATUS_HEADER: &str = "x-recognition-status";

/// Environment variables holding the accepted credential pair
pub const APP_ID_ENV: &str = "APP_ID";
pub const APP_KEY_ENV: &str = "APP_KEY";

pub const UNRECOGNIZED_TEXT: &str = "Speech recognition could not understand the audio";
pub const BACKEND_FAILURE_PREFIX: &str =
    "Could not request results from speech recognition service; ";
