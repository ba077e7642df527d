//! voxgate - HTTP speech gateway

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use voxgate::{router, ApiCredentials, AppState, EspeakSynthesizer, ServerSettings, Transcriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before anything reads the environment
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("voxgate=info")),
        )
        .init();

    let settings = ServerSettings::load().context("Failed to load settings")?;
    let credentials = ApiCredentials::from_env();
    if !credentials.is_configured() {
        tracing::warn!("APP_ID or APP_KEY is not set, every request will be rejected");
    }

    let state = AppState {
        credentials: Arc::new(credentials),
        transcriber: Transcriber::new(settings.stt.clone())
            .context("Failed to create recognition client")?,
        synthesizer: Arc::new(EspeakSynthesizer::new(settings.tts.clone())),
    };
    let app = router(state, settings.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", settings.bind_addr))?;

    tracing::info!(
        addr = %settings.bind_addr,
        stt_backend = %settings.stt.api_url,
        tts_engine = %settings.tts.program,
        "Listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
