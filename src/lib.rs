//! voxgate - speech-to-text and text-to-speech behind a static API key pair

pub mod audio;
pub mod auth;
pub mod config;
pub mod server;
pub mod settings;
pub mod synthesizer;
pub mod transcriber;

pub use auth::ApiCredentials;
pub use server::{router, ApiError, AppState};
pub use settings::ServerSettings;
pub use synthesizer::{EspeakSynthesizer, SpeechSynthesizer, SynthesisError};
pub use transcriber::{Recognition, Transcriber};
