use crate::config::ProxyConfig;
use crate::coordinator::Coordinator;
use crate::dedup::DedupCache;
use crate::upstream::{ApiVariant, HttpUpstream};
use crate::{Error, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header::CACHE_CONTROL;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::warn;

#[derive(Clone)]
pub struct AppState {
    coordinator: Arc<Coordinator>,
}

impl AppState {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self { coordinator }
    }

    /// Wire the production upstream and a fresh cache from configuration.
    pub fn from_config(config: &ProxyConfig) -> Result<Self> {
        let upstream = Arc::new(HttpUpstream::new(&config.upstream)?);
        let cache = Arc::new(DedupCache::from_config(&config.cache));
        let coordinator = Coordinator::new(cache, upstream, config.cache.publish_mode);
        Ok(Self::new(Arc::new(coordinator)))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GenerateBody {
    /// Serialized upstream request body, forwarded verbatim and used as the fingerprint.
    pub request: Option<String>,
    pub key: Option<IdempotencyKey>,
}

/// Clients send a string, a number (typically a timestamp), or a boolean.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum IdempotencyKey {
    Text(String),
    Number(serde_json::Number),
    Flag(bool),
}

// Largest magnitude below which every integral f64 is exact.
const MAX_EXACT_F64: f64 = 9_007_199_254_740_992.0;

impl IdempotencyKey {
    /// Token text for the key, or `None` when the key is falsy (`0`, `false`).
    ///
    /// Integral floats are written without a fraction, so `1` and `1.0` are
    /// the same token.
    pub fn into_token(self) -> Option<String> {
        match self {
            IdempotencyKey::Text(s) => Some(s),
            IdempotencyKey::Flag(false) => None,
            IdempotencyKey::Flag(true) => Some("true".to_string()),
            IdempotencyKey::Number(n) => {
                if let Some(i) = n.as_i64() {
                    return (i != 0).then(|| i.to_string());
                }
                if let Some(u) = n.as_u64() {
                    return Some(u.to_string());
                }
                match n.as_f64() {
                    Some(f) if f == 0.0 || f.is_nan() => None,
                    Some(f) if f.fract() == 0.0 && f.abs() < MAX_EXACT_F64 => {
                        Some((f as i64).to_string())
                    }
                    _ => Some(n.to_string()),
                }
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    kind: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
}

pub fn router(state: AppState, cors: bool) -> Router {
    let router = Router::new()
        .route("/chat", post(chat))
        .route("/image", post(image))
        .with_state(state);

    if cors {
        router.layer(CorsLayer::very_permissive())
    } else {
        router
    }
}

async fn chat(
    State(state): State<AppState>,
    body: std::result::Result<Json<GenerateBody>, JsonRejection>,
) -> Response {
    generate(&state, body, ApiVariant::Completions).await
}

async fn image(
    State(state): State<AppState>,
    body: std::result::Result<Json<GenerateBody>, JsonRejection>,
) -> Response {
    generate(&state, body, ApiVariant::Generations).await
}

async fn generate(
    state: &AppState,
    body: std::result::Result<Json<GenerateBody>, JsonRejection>,
    variant: ApiVariant,
) -> Response {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => {
            warn!(%variant, reason = %rejection.body_text(), "rejecting unreadable request body");
            return error_response(&Error::InvalidRequest {
                message: rejection.body_text(),
            });
        }
    };

    let token = body.key.and_then(IdempotencyKey::into_token);
    let has_token = token.as_deref().is_some_and(|t| !t.is_empty());
    let request = match body.request {
        Some(request) => request,
        None if has_token => {
            return error_response(&Error::InvalidRequest {
                message: "missing field `request`".to_string(),
            })
        }
        // The coordinator rejects the missing key before reading the fingerprint.
        None => String::new(),
    };

    match state
        .coordinator
        .handle(&request, token.as_deref(), variant)
        .await
    {
        Ok(text) => ([(CACHE_CONTROL, "no-cache")], text).into_response(),
        Err(e) => error_response(&e),
    }
}

fn error_response(e: &Error) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            kind: e.kind(),
            message: e.to_string(),
            status: e.upstream_status(),
        },
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(json: &str) -> Option<String> {
        let body: GenerateBody = serde_json::from_str(json).unwrap();
        body.key.and_then(IdempotencyKey::into_token)
    }

    #[test]
    fn string_and_numeric_keys_become_tokens() {
        assert_eq!(token(r#"{"request": "{}", "key": "abc"}"#).as_deref(), Some("abc"));
        assert_eq!(
            token(r#"{"request": "{}", "key": 1700000000123}"#).as_deref(),
            Some("1700000000123")
        );
    }

    #[test]
    fn integral_floats_match_integers() {
        assert_eq!(token(r#"{"key": 1.0}"#), token(r#"{"key": 1}"#));
        assert_eq!(token(r#"{"key": 1.0}"#).as_deref(), Some("1"));
        assert_eq!(token(r#"{"key": 1.5}"#).as_deref(), Some("1.5"));
    }

    #[test]
    fn falsy_keys_are_missing() {
        assert_eq!(token(r#"{"key": 0}"#), None);
        assert_eq!(token(r#"{"key": 0.0}"#), None);
        assert_eq!(token(r#"{"key": false}"#), None);
        assert_eq!(token(r#"{"key": true}"#).as_deref(), Some("true"));
        // A non-empty string is truthy, even "0".
        assert_eq!(token(r#"{"key": "0"}"#).as_deref(), Some("0"));
    }

    #[test]
    fn absent_fields_default_to_none() {
        let body: GenerateBody = serde_json::from_str("{}").unwrap();
        assert!(body.request.is_none());
        assert!(body.key.is_none());
        let body: GenerateBody =
            serde_json::from_str(r#"{"request": "{}", "key": null}"#).unwrap();
        assert!(body.key.is_none());
    }

    #[test]
    fn error_body_includes_upstream_status() {
        let resp = error_response(&Error::Upstream {
            status: 429,
            status_text: "Too Many Requests".into(),
        });
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
