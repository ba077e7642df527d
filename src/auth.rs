//! API key pair verification.
//!
//! The accepted pair is read from the environment once at startup and shared
//! with the request path by reference. Every mismatch, including a missing
//! reference value, collapses to `false`.

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::fmt;

use crate::config::{APP_ID_ENV, APP_ID_HEADER, APP_KEY_ENV, APP_KEY_HEADER};
use crate::server::{ApiError, AppState};

#[derive(Clone, Default, PartialEq)]
pub struct ApiCredentials {
    app_id: Option<String>,
    app_key: Option<String>,
}

impl ApiCredentials {
    /// Empty values count as unset.
    pub fn new(app_id: Option<String>, app_key: Option<String>) -> Self {
        Self {
            app_id: app_id.filter(|v| !v.is_empty()),
            app_key: app_key.filter(|v| !v.is_empty()),
        }
    }

    pub fn from_env() -> Self {
        Self::new(std::env::var(APP_ID_ENV).ok(), std::env::var(APP_KEY_ENV).ok())
    }

    pub fn is_configured(&self) -> bool {
        self.app_id.is_some() && self.app_key.is_some()
    }

    pub fn verify(&self, app_id: &str, app_key: &str) -> bool {
        match (&self.app_id, &self.app_key) {
            (Some(id), Some(key)) => id == app_id && key == app_key,
            _ => false,
        }
    }

    fn verify_headers(&self, headers: &HeaderMap) -> bool {
        match (header_str(headers, APP_ID_HEADER), header_str(headers, APP_KEY_HEADER)) {
            (Some(id), Some(key)) => self.verify(id, key),
            _ => false,
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("app_id", &self.app_id)
            .field("app_key", &self.app_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Runs ahead of every body extractor on the protected routes, so a bad or
/// missing credential is always a 401 regardless of the payload.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if !state.credentials.verify_headers(request.headers()) {
        tracing::warn!(path = %request.uri().path(), "Rejected request with invalid API key");
        return ApiError::Unauthorized.into_response();
    }
    next.run(request).await
}
