use crate::upstream::TransportError;
use std::sync::Arc;
use thiserror::Error;

/// Structured error context for configuration and runtime failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "upstream.base_url")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected type, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "config_loader", "coordinator")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified error type for the proxy.
///
/// `Clone` so that a failed generation can be replayed verbatim to every
/// caller that joined it.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("Missing credential: request carried no idempotency key")]
    MissingCredential,

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Response not ok. Status {status}. Message {status_text}.")]
    Upstream { status: u16, status_text: String },

    #[error("Malformed upstream response (HTTP {status}): {detail}")]
    MalformedResponse { status: u16, detail: String },

    #[error("Network transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Runtime error: {message}{}", format_context(.context))]
    Runtime {
        message: String,
        context: ErrorContext,
    },

    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),
}

fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(Arc::new(e))
    }
}

impl Error {
    pub fn runtime_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Runtime {
            message: msg.into(),
            context,
        }
    }

    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Stable snake_case label, used in logs and in the inbound error body.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::MissingCredential => "missing_credential",
            Error::InvalidRequest { .. } => "invalid_request",
            Error::Upstream { .. } => "upstream_error",
            Error::MalformedResponse { .. } => "malformed_response",
            Error::Transport(_) => "transport_error",
            Error::Configuration { .. } => "configuration_error",
            Error::Runtime { .. } => "runtime_error",
            Error::Io(_) => "io_error",
        }
    }

    /// HTTP status reported by the upstream API, if the failure came from a response.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Error::Upstream { status, .. } | Error::MalformedResponse { status, .. } => {
                Some(*status)
            }
            Error::Transport(t) => t.status(),
            _ => None,
        }
    }

    /// True for every failure that originated on the way to or from the upstream API.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Error::Upstream { .. } | Error::MalformedResponse { .. } | Error::Transport(_)
        )
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. } | Error::Runtime { context, .. } => Some(context),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_error_message_carries_status_and_text() {
        let err = Error::Upstream {
            status: 503,
            status_text: "Service Unavailable".into(),
        };
        assert_eq!(
            err.to_string(),
            "Response not ok. Status 503. Message Service Unavailable."
        );
        assert_eq!(err.kind(), "upstream_error");
        assert_eq!(err.upstream_status(), Some(503));
        assert!(err.is_upstream());
    }

    #[test]
    fn malformed_response_is_classified_as_upstream() {
        let err = Error::MalformedResponse {
            status: 200,
            detail: "missing choices[0].message.content".into(),
        };
        assert!(err.is_upstream());
        assert_eq!(err.upstream_status(), Some(200));
    }

    #[test]
    fn missing_credential_has_no_status() {
        let err = Error::MissingCredential;
        assert_eq!(err.kind(), "missing_credential");
        assert_eq!(err.upstream_status(), None);
        assert!(!err.is_upstream());
    }

    #[test]
    fn configuration_error_formats_context() {
        let err = Error::configuration_with_context(
            "api key is empty",
            ErrorContext::new()
                .with_field_path("upstream.api_key")
                .with_source("config_loader"),
        );
        assert_eq!(
            err.to_string(),
            "Configuration error: api key is empty (field: upstream.api_key, source: config_loader)"
        );
        assert_eq!(
            err.context().and_then(|c| c.field_path.as_deref()),
            Some("upstream.api_key")
        );
    }

    #[test]
    fn invalid_request_is_not_upstream() {
        let err = Error::InvalidRequest {
            message: "missing field `request`".into(),
        };
        assert_eq!(err.kind(), "invalid_request");
        assert_eq!(err.upstream_status(), None);
        assert!(!err.is_upstream());
    }

    #[test]
    fn errors_clone_for_replay() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "proxy.yaml").into();
        let replay = err.clone();
        assert_eq!(err.to_string(), replay.to_string());
        assert_eq!(replay.kind(), "io_error");
    }
}
