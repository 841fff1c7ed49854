use crate::config::ConfigError;
use crate::oauth::signing::parse_form;
use axum::response::{IntoResponse, Response};
use hyper::StatusCode;
use thiserror::Error;
use tracing::error;

/// Failures talking to the accounting API, classified by HTTP status the way
/// the upstream SDK reports them.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    InternalError(String),
    #[error("{0}")]
    NotImplemented(String),
    #[error("{0}")]
    RateLimitExceeded(String),
    #[error("{0}")]
    NotAvailable(String),
    #[error("HTTP {status}: {message}")]
    Unknown { status: StatusCode, message: String },
    #[error("Credentials haven't been verified")]
    NotVerified,
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Timeout after {0:?} waiting for upstream")]
    Timeout(std::time::Duration),
    #[error("Invalid upstream response: {0}")]
    InvalidResponse(String),
}

impl UpstreamError {
    /// Classify a non-success upstream response.
    ///
    /// OAuth endpoints answer with a form-encoded body carrying `oauth_problem`
    /// and optionally `oauth_problem_advice`; API endpoints may answer with JSON
    /// carrying a `Message`. Anything else is reported verbatim.
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        let message = problem_message(body);
        match status.as_u16() {
            400 => UpstreamError::BadRequest(message),
            401 => UpstreamError::Unauthorized(message),
            403 => UpstreamError::Forbidden(message),
            404 => UpstreamError::NotFound(message),
            500 => UpstreamError::InternalError(message),
            501 => UpstreamError::NotImplemented(message),
            503 if message.to_lowercase().contains("rate limit") => {
                UpstreamError::RateLimitExceeded(message)
            }
            503 => UpstreamError::NotAvailable(message),
            _ => UpstreamError::Unknown { status, message },
        }
    }

    /// Short class name shown to the operator in error pages.
    pub fn class_name(&self) -> &'static str {
        match self {
            UpstreamError::BadRequest(_) => "BadRequest",
            UpstreamError::Unauthorized(_) => "Unauthorized",
            UpstreamError::Forbidden(_) => "Forbidden",
            UpstreamError::NotFound(_) => "NotFound",
            UpstreamError::InternalError(_) => "InternalError",
            UpstreamError::NotImplemented(_) => "NotImplemented",
            UpstreamError::RateLimitExceeded(_) => "RateLimitExceeded",
            UpstreamError::NotAvailable(_) => "NotAvailable",
            UpstreamError::Unknown { .. } => "UnknownError",
            UpstreamError::NotVerified => "NotVerified",
            UpstreamError::Transport(_) => "TransportError",
            UpstreamError::Timeout(_) => "Timeout",
            UpstreamError::InvalidResponse(_) => "InvalidResponse",
        }
    }
}

fn problem_message(body: &str) -> String {
    let body = body.trim();
    let json_message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| json.get("Message")?.as_str().map(str::to_string));
    if let Some(message) = json_message {
        return message;
    }

    let form = parse_form(body);
    if let Some(problem) = form.get("oauth_problem") {
        return match form.get("oauth_problem_advice") {
            Some(advice) => format!("{problem}: {advice}"),
            None => problem.clone(),
        };
    }
    body.to_string()
}

/// A stored mapping that can't be turned back into credentials.
#[derive(Debug, Error, PartialEq)]
pub enum CredentialStateError {
    #[error("Stored credentials are missing `{0}`")]
    MissingField(&'static str),
    #[error("Stored credential field `{field}` is invalid: {value}")]
    InvalidField { field: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to serialize export: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result of the stage handlers. Every variant is reported as HTTP 500.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Missing parameters required.")]
    MissingParameters,
    #[error("{}: {}", .0.class_name(), .0)]
    Authorization(UpstreamError),
    #[error("{}: {}", .0.class_name(), .0)]
    Upstream(UpstreamError),
    #[error(transparent)]
    CredentialState(#[from] CredentialStateError),
    #[error(transparent)]
    Export(#[from] ExportError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        error!(error = ?self, "{message}");
        crate::api::page::error_page(status, &message)
    }
}
