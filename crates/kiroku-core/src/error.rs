use thiserror::Error;

use crate::types::BackendAttempt;

/// Errors from a single chat backend invocation.
///
/// Every variant is recovered locally by falling through to the next
/// configured backend; only an exhausted chain surfaces to the caller.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("backend error: {0}")]
    Other(String),
}

impl BackendError {
    /// Stable failure class for diagnostics and serialized attempt reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "unavailable",
            Self::Auth(_) => "auth",
            Self::RateLimited(_) => "rate_limited",
            Self::InvalidResponse(_) => "invalid_response",
            Self::Other(_) => "unknown",
        }
    }
}

/// Errors from the response parser.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no recoverable JSON in model output")]
    NoJson,
}

/// Errors from a full extraction run.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("all backends failed: {}", format_attempts(.0))]
    AllBackendsFailed(Vec<BackendAttempt>),

    #[error("unparseable response from {backend} ({model}): no JSON structure found")]
    UnparseableResponse { backend: String, model: String },
}

fn format_attempts(attempts: &[BackendAttempt]) -> String {
    attempts
        .iter()
        .map(|attempt| format!("{} ({}: {})", attempt.backend, attempt.kind, attempt.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors from calendar writer implementations.
#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("automation script failed: {0}")]
    Script(String),

    #[error("automation timed out after {0}s")]
    Timeout(u64),

    #[error("calendar io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the category store.
#[derive(Debug, Error)]
pub enum TagStoreError {
    #[error("tag store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("tag store parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors from prompt template loading.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("template file has no recognizable prompt sections")]
    NoSections,
}
