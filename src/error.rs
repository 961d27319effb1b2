//! Error types for chatrelay.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Errors rejected as a JSON response before any stream is opened.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid request: {0}")]
    Validation(String),
}

impl Error {
    /// The HTTP status this error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    /// Error category reported in the `type` field of error payloads.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::ValidationError,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody::new(self.to_string(), status.as_u16(), self.kind());
        (status, axum::Json(body)).into_response()
    }
}

/// Category of a client-visible error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    /// Registry or environment problem detected before any upstream call.
    ConfigurationError,
    /// Unexpected fault while preparing the upstream call.
    SetupError,
    /// The provider failed, before or during the stream.
    UpstreamError,
    /// The request body did not match the expected shape.
    ValidationError,
}

/// Client-visible error details: `{"message", "code", "type"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDetail {
    pub message: String,
    pub code: u16,
    #[serde(rename = "type")]
    pub kind: ErrorKind,
}

/// Wire envelope `{"error": {...}}` shared by JSON responses and SSE error events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

impl From<ErrorDetail> for ErrorBody {
    fn from(error: ErrorDetail) -> Self {
        Self { error }
    }
}

impl ErrorBody {
    pub fn new(message: impl Into<String>, code: u16, kind: ErrorKind) -> Self {
        Self {
            error: ErrorDetail {
                message: message.into(),
                code,
                kind,
            },
        }
    }
}

/// Pre-flight failures while resolving a model key to a provider client.
///
/// Messages name environment variables, never their values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("Model '{model}' is not configured in the backend.")]
    UnknownModel { model: String },

    #[error(
        "API key for model '{model}' is not configured. Please set the '{var}' environment variable."
    )]
    MissingCredential { model: String, var: String },

    #[error(
        "API endpoint URL for model '{model}' could not be determined. Set '{var}' or configure a default base URL."
    )]
    MissingEndpoint { model: String, var: String },

    #[error("Failed to create API client for model '{model}': {reason}")]
    ClientInit { model: String, reason: String },
}

impl ResolveError {
    pub fn status(&self) -> StatusCode {
        match self {
            ResolveError::UnknownModel { .. } => StatusCode::BAD_REQUEST,
            ResolveError::MissingCredential { .. }
            | ResolveError::MissingEndpoint { .. }
            | ResolveError::ClientInit { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label for the failing check, used in logs.
    pub fn stage(&self) -> &'static str {
        match self {
            ResolveError::UnknownModel { .. } => "lookup",
            ResolveError::MissingCredential { .. } => "credential",
            ResolveError::MissingEndpoint { .. } => "endpoint",
            ResolveError::ClientInit { .. } => "client_init",
        }
    }

    pub fn to_detail(&self) -> ErrorDetail {
        ErrorDetail {
            message: self.to_string(),
            code: self.status().as_u16(),
            kind: ErrorKind::ConfigurationError,
        }
    }
}

/// Failures of the upstream provider call, at any stage of the stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    #[error("Failed to prepare the upstream request: {0}")]
    Setup(String),

    #[error("Failed to reach provider: {message}")]
    Transport { message: String, timed_out: bool },

    #[error("Provider returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Provider reported an error: {message}")]
    Provider { message: String, code: Option<u16> },
}

impl UpstreamError {
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        let timed_out = err.is_timeout();
        let err = err.without_url();
        UpstreamError::Transport {
            timed_out,
            message: error_chain(&err),
        }
    }

    /// HTTP-like status code reported to the client.
    pub fn code(&self) -> u16 {
        match self {
            UpstreamError::Setup(_) => 500,
            UpstreamError::Transport { timed_out: true, .. } => 504,
            UpstreamError::Transport { .. } => 502,
            UpstreamError::Status { status, .. } => *status,
            UpstreamError::Provider { code, .. } => code.unwrap_or(502),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            UpstreamError::Setup(_) => ErrorKind::SetupError,
            _ => ErrorKind::UpstreamError,
        }
    }

    pub fn to_detail(&self) -> ErrorDetail {
        ErrorDetail {
            message: self.to_string(),
            code: self.code(),
            kind: self.kind(),
        }
    }
}

/// `err` followed by each distinct cause, joined with `": "`.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}
