use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hound::{SampleFormat, WavSpec, WavWriter};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::io::Cursor;
use std::sync::Arc;

use voxgate::settings::SttSettings;
use voxgate::{
    router, ApiCredentials, AppState, SpeechSynthesizer, SynthesisError, Transcriber,
};

const APP_ID: &str = "demo-app";
const APP_KEY: &str = "demo-key";

struct WavSynth;

#[async_trait]
impl SpeechSynthesizer for WavSynth {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SynthesisError> {
        // one sample per character keeps the output tied to the input
        let samples: Vec<i32> = text.bytes().map(|b| b as i32 * 100).collect();
        Ok(wav(16000, &samples))
    }
}

struct BrokenSynth;

#[async_trait]
impl SpeechSynthesizer for BrokenSynth {
    async fn synthesize(&self, _text: &str) -> Result<Vec<u8>, SynthesisError> {
        Err(SynthesisError::EngineFailed {
            status: "exit status: 1".to_string(),
            stderr: "no voices installed".to_string(),
        })
    }
}

fn wav(sample_rate: u32, samples: &[i32]) -> Vec<u8> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
        for &s in samples {
            writer.write_sample(s as i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

fn speech_wav() -> Vec<u8> {
    let samples: Vec<i32> = (0..3200).map(|i| ((i % 64) - 32) * 300).collect();
    wav(16000, &samples)
}

fn state_with(
    credentials: ApiCredentials,
    stt_url: String,
    synthesizer: Arc<dyn SpeechSynthesizer>,
) -> AppState {
    AppState {
        credentials: Arc::new(credentials),
        transcriber: Transcriber::new(SttSettings {
            api_url: stt_url,
            timeout_secs: 5,
            ..SttSettings::default()
        })
        .unwrap(),
        synthesizer,
    }
}

fn configured() -> ApiCredentials {
    ApiCredentials::new(Some(APP_ID.to_string()), Some(APP_KEY.to_string()))
}

async fn spawn(state: AppState) -> String {
    spawn_with_limit(state, 1024 * 1024).await
}

async fn spawn_with_limit(state: AppState, max_upload_bytes: usize) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state, max_upload_bytes))
            .await
            .unwrap();
    });
    format!("http://{}", addr)
}

async fn spawn_default(stt_url: String) -> String {
    spawn(state_with(configured(), stt_url, Arc::new(WavSynth))).await
}

fn upload(bytes: Vec<u8>) -> Form {
    Form::new().part("file", Part::bytes(bytes).file_name("clip.wav"))
}

#[tokio::test]
async fn health_needs_no_credentials() {
    let base = spawn_default("http://127.0.0.1:9".to_string()).await;
    let resp = reqwest::get(format!("{}/health", base)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn tts_returns_base64_audio() {
    let base = spawn_default("http://127.0.0.1:9".to_string()).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/tts", base))
        .header("X-App-ID", APP_ID)
        .header("X-App-Key", APP_KEY)
        .json(&json!({ "text": "hello world" }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    let audio = STANDARD.decode(body["audio"].as_str().unwrap()).unwrap();
    assert!(!audio.is_empty());
    assert_eq!(audio, WavSynth.synthesize("hello world").await.unwrap());
    assert_eq!(&audio[..4], b"RIFF");
}

#[tokio::test]
async fn tts_with_one_wrong_header_is_unauthorized() {
    let base = spawn_default("http://127.0.0.1:9".to_string()).await;
    let client = reqwest::Client::new();

    let ok = client
        .post(format!("{}/tts", base))
        .header("X-App-ID", APP_ID)
        .header("X-App-Key", APP_KEY)
        .json(&json!({ "text": "test" }))
        .send()
        .await
        .unwrap();
    assert_eq!(ok.status(), StatusCode::OK);

    let resp = client
        .post(format!("{}/tts", base))
        .header("X-App-ID", APP_ID)
        .header("X-App-Key", "not-the-key")
        .json(&json!({ "text": "test" }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({ "detail": "Invalid API Key" }));
}

#[tokio::test]
async fn missing_header_is_401_even_with_a_bad_body() {
    let base = spawn_default("http://127.0.0.1:9".to_string()).await;
    let client = reqwest::Client::new();

    let tts = client
        .post(format!("{}/tts", base))
        .header("X-App-ID", APP_ID)
        .header("content-type", "application/json")
        .body("{ definitely not json")
        .send()
        .await
        .unwrap();
    assert_eq!(tts.status(), StatusCode::UNAUTHORIZED);

    let stt = client
        .post(format!("{}/stt", base))
        .header("X-App-Key", APP_KEY)
        .body("no multipart here")
        .send()
        .await
        .unwrap();
    assert_eq!(stt.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unset_credentials_reject_everyone() {
    let base = spawn(state_with(
        ApiCredentials::new(Some(APP_ID.to_string()), None),
        "http://127.0.0.1:9".to_string(),
        Arc::new(WavSynth),
    ))
    .await;

    let resp = reqwest::Client::new()
        .post(format!("{}/tts", base))
        .header("X-App-ID", APP_ID)
        .header("X-App-Key", "")
        .json(&json!({ "text": "test" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn tts_schema_errors_come_after_auth() {
    let base = spawn_default("http://127.0.0.1:9".to_string()).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/tts", base))
        .header("X-App-ID", APP_ID)
        .header("X-App-Key", APP_KEY)
        .json(&json!({ "txt": "typo" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn tts_engine_failure_is_a_generic_500() {
    let base = spawn(state_with(
        configured(),
        "http://127.0.0.1:9".to_string(),
        Arc::new(BrokenSynth),
    ))
    .await;

    let resp = reqwest::Client::new()
        .post(format!("{}/tts", base))
        .header("X-App-ID", APP_ID)
        .header("X-App-Key", APP_KEY)
        .json(&json!({ "text": "test" }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = resp.text().await.unwrap();
    assert!(body.contains("Internal Server Error"));
    assert!(!body.contains("no voices installed"));
}

#[tokio::test]
async fn stt_returns_transcription() {
    let mut backend = mockito::Server::new_async().await;
    let mock = backend
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"text": "hello world"}"#)
        .create_async()
        .await;

    let base = spawn_default(backend.url()).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/stt", base))
        .header("X-App-ID", APP_ID)
        .header("X-App-Key", APP_KEY)
        .multipart(upload(speech_wav()))
        .send()
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["x-recognition-status"], "transcribed");
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({ "text": "hello world" }));
}

#[tokio::test]
async fn stt_silence_returns_the_sentinel_with_200() {
    let mut backend = mockito::Server::new_async().await;
    let mock = backend.mock("POST", "/").expect(0).create_async().await;

    let base = spawn_default(backend.url()).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/stt", base))
        .header("X-App-ID", APP_ID)
        .header("X-App-Key", APP_KEY)
        .multipart(upload(wav(16000, &[0; 8000])))
        .send()
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["x-recognition-status"], "unrecognized");
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body["text"],
        "Speech recognition could not understand the audio"
    );
}

#[tokio::test]
async fn stt_backend_outage_is_reported_as_text() {
    let mut backend = mockito::Server::new_async().await;
    let mock = backend
        .mock("POST", "/")
        .with_status(503)
        .with_body("upstream unavailable")
        .create_async()
        .await;

    let base = spawn_default(backend.url()).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/stt", base))
        .header("X-App-ID", APP_ID)
        .header("X-App-Key", APP_KEY)
        .multipart(upload(speech_wav()))
        .send()
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["x-recognition-status"], "backend-error");
    let body: Value = resp.json().await.unwrap();
    let text = body["text"].as_str().unwrap();
    assert!(text.starts_with("Could not request results from speech recognition service; "));
    assert!(text.contains("503"));
}

#[tokio::test]
async fn stt_rejects_undecodable_audio() {
    let base = spawn_default("http://127.0.0.1:9".to_string()).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/stt", base))
        .header("X-App-ID", APP_ID)
        .header("X-App-Key", APP_KEY)
        .multipart(upload(b"this is not audio".to_vec()))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .starts_with("Invalid audio file"));
}

#[tokio::test]
async fn stt_requires_a_file_field() {
    let base = spawn_default("http://127.0.0.1:9".to_string()).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/stt", base))
        .header("X-App-ID", APP_ID)
        .header("X-App-Key", APP_KEY)
        .multipart(Form::new().text("note", "forgot the upload"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({ "detail": "Missing file field" }));
}

#[tokio::test]
async fn stt_noise_flagged_by_backend_returns_the_sentinel() {
    let mut backend = mockito::Server::new_async().await;
    let mock = backend
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"text": " Thank you.", "segments": [{"no_speech_prob": 0.97}]}"#)
        .create_async()
        .await;

    let base = spawn_default(backend.url()).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/stt", base))
        .header("X-App-ID", APP_ID)
        .header("X-App-Key", APP_KEY)
        .multipart(upload(speech_wav()))
        .send()
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["x-recognition-status"], "unrecognized");
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body["text"],
        "Speech recognition could not understand the audio"
    );
}

#[tokio::test]
async fn oversized_bodies_are_rejected_with_413() {
    let mut backend = mockito::Server::new_async().await;
    let mock = backend.mock("POST", "/").expect(0).create_async().await;

    let state = state_with(configured(), backend.url(), Arc::new(WavSynth));
    let base = spawn_with_limit(state, 1024).await;
    let client = reqwest::Client::new();

    let stt = client
        .post(format!("{}/stt", base))
        .header("X-App-ID", APP_ID)
        .header("X-App-Key", APP_KEY)
        .multipart(upload(speech_wav()))
        .send()
        .await
        .unwrap();
    assert_eq!(stt.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let tts = client
        .post(format!("{}/tts", base))
        .header("X-App-ID", APP_ID)
        .header("X-App-Key", APP_KEY)
        .json(&json!({ "text": "a".repeat(4096) }))
        .send()
        .await
        .unwrap();
    assert_eq!(tts.status(), StatusCode::PAYLOAD_TOO_LARGE);

    mock.assert_async().await;
}

#[tokio::test]
async fn upload_limit_applies_after_auth() {
    let state = state_with(
        configured(),
        "http://127.0.0.1:9".to_string(),
        Arc::new(WavSynth),
    );
    let base = spawn_with_limit(state, 1024).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/stt", base))
        .header("X-App-ID", APP_ID)
        .header("X-App-Key", "wrong")
        .multipart(upload(speech_wav()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn small_bodies_pass_a_tight_limit() {
    let state = state_with(
        configured(),
        "http://127.0.0.1:9".to_string(),
        Arc::new(WavSynth),
    );
    let base = spawn_with_limit(state, 1024).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/tts", base))
        .header("X-App-ID", APP_ID)
        .header("X-App-Key", APP_KEY)
        .json(&json!({ "text": "short" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
