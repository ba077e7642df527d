//! Text-to-speech through a local synthesis engine

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::process::Stdio;
use std::time::Instant;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::settings::TtsSettings;

#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("Failed to start synthesis engine `{program}`: {source}")]
    SpawnError {
        program: String,
        source: std::io::Error,
    },
    #[error("Synthesis engine I/O failed: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Synthesis engine exited with {status}: {stderr}")]
    EngineFailed { status: String, stderr: String },
    #[error("Synthesis engine produced no audio")]
    EmptyOutput,
}

/// Renders a whole text to audio bytes in one job.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SynthesisError>;
}

/// Synthesize and encode the result as standard base64.
pub async fn synthesize_base64(
    synthesizer: &dyn SpeechSynthesizer,
    text: &str,
) -> Result<String, SynthesisError> {
    let audio = synthesizer.synthesize(text).await?;
    Ok(STANDARD.encode(audio))
}

/// eSpeak NG (or a compatible CLI), one process per request.
///
/// The text goes through stdin and the WAV comes back on stdout.
#[derive(Debug, Clone)]
pub struct EspeakSynthesizer {
    settings: TtsSettings,
}

impl EspeakSynthesizer {
    pub fn new(settings: TtsSettings) -> Self {
        Self { settings }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.settings.program);
        cmd.arg("--stdout").arg("--stdin");
        if let Some(voice) = &self.settings.voice {
            cmd.arg("-v").arg(voice);
        }
        if let Some(rate) = self.settings.rate {
            cmd.arg("-s").arg(rate.to_string());
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl SpeechSynthesizer for EspeakSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SynthesisError> {
        let started = Instant::now();
        let mut child = self
            .command()
            .spawn()
            .map_err(|source| SynthesisError::SpawnError {
                program: self.settings.program.clone(),
                source,
            })?;

        // Feed stdin while draining stdout so a long text cannot fill the pipe.
        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(text.as_bytes()).await?;
                stdin.shutdown().await?;
            }
            Ok::<_, std::io::Error>(())
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        fed?;
        let output = output?;
        if !output.status.success() {
            return Err(SynthesisError::EngineFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        if output.stdout.is_empty() {
            return Err(SynthesisError::EmptyOutput);
        }

        tracing::info!(
            chars = text.chars().count(),
            bytes = output.stdout.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Synthesis finished"
        );

        Ok(output.stdout)
    }
}
