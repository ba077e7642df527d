use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::{
    DEFAULT_BIND_ADDR, DEFAULT_LANGUAGE, DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_NO_SPEECH_THRESHOLD,
    DEFAULT_STT_TIMEOUT_SECS, DEFAULT_TTS_PROGRAM, GROQ_API_URL, WHISPER_MODEL,
};

pub const SETTINGS_PATH_ENV: &str = "VOXGATE_SETTINGS";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("Malformed settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ServerSettings {
    pub bind_addr: String,
    pub max_upload_bytes: usize,
    pub stt: SttSettings,
    pub tts: TtsSettings,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SttSettings {
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub language: Option<String>,
    pub timeout_secs: u64,
    /// Segments the backend scores above this `no_speech_prob` are not speech.
    pub no_speech_threshold: f32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct TtsSettings {
    pub program: String,
    pub voice: Option<String>,
    /// Words per minute, passed through to the engine.
    pub rate: Option<u32>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            stt: SttSettings::default(),
            tts: TtsSettings::default(),
        }
    }
}

impl Default for SttSettings {
    fn default() -> Self {
        Self {
            api_url: GROQ_API_URL.to_string(),
            api_key: None,
            model: WHISPER_MODEL.to_string(),
            language: Some(DEFAULT_LANGUAGE.to_string()),
            timeout_secs: DEFAULT_STT_TIMEOUT_SECS,
            no_speech_threshold: DEFAULT_NO_SPEECH_THRESHOLD,
        }
    }
}

impl Default for TtsSettings {
    fn default() -> Self {
        Self {
            program: DEFAULT_TTS_PROGRAM.to_string(),
            voice: None,
            rate: None,
        }
    }
}

impl ServerSettings {
    /// Load settings once at startup: file first (if any), then environment overrides.
    pub fn load() -> Result<Self, SettingsError> {
        let mut settings = match settings_path() {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        settings.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(settings)
    }

    /// A missing file is not an error; the defaults apply.
    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(SettingsError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("VOXGATE_BIND") {
            self.bind_addr = v;
        }
        if let Some(v) = get("STT_API_URL") {
            self.stt.api_url = v;
        }
        if let Some(v) = get("STT_API_KEY") {
            self.stt.api_key = Some(v);
        }
        if let Some(v) = get("STT_MODEL") {
            self.stt.model = v;
        }
        if let Some(v) = get("STT_LANGUAGE") {
            self.stt.language = Some(v);
        }
        if let Some(v) = get("STT_NO_SPEECH_THRESHOLD") {
            let threshold = v.trim().parse::<f32>().map_err(|_| SettingsError::InvalidEnv {
                name: "STT_NO_SPEECH_THRESHOLD",
                value: v.clone(),
            })?;
            self.stt.no_speech_threshold = threshold;
        }
        if let Some(v) = get("TTS_PROGRAM") {
            self.tts.program = v;
        }
        if let Some(v) = get("TTS_VOICE") {
            self.tts.voice = Some(v);
        }
        if let Some(v) = get("TTS_RATE") {
            let rate = v.trim().parse::<u32>().map_err(|_| SettingsError::InvalidEnv {
                name: "TTS_RATE",
                value: v.clone(),
            })?;
            self.tts.rate = Some(rate);
        }
        Ok(())
    }
}

fn settings_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(SETTINGS_PATH_ENV) {
        return Some(PathBuf::from(path));
    }
    ProjectDirs::from("com", "ashmil", "voxgate")
        .map(|dirs| dirs.config_dir().join("settings.json"))
}
