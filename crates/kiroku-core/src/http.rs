use std::time::Duration;
use ureq::{Agent, Error as UreqError};

use crate::error::BackendError;

const TIMEOUT_GLOBAL: Duration = Duration::from_secs(60);
const TIMEOUT_RESOLVE: Duration = Duration::from_secs(5);
const TIMEOUT_CONNECT: Duration = Duration::from_secs(5);

/// Agent shared by all chat backends. The global timeout bounds one backend
/// attempt; the fallback chain's overall ceiling is the sum over backends.
pub fn default_agent() -> Agent {
    let config = Agent::config_builder()
        .timeout_global(Some(TIMEOUT_GLOBAL))
        .timeout_resolve(Some(TIMEOUT_RESOLVE))
        .timeout_connect(Some(TIMEOUT_CONNECT))
        .build();
    config.into()
}

/// Map a transport-level failure onto the backend error taxonomy so the
/// fallback loop can report a classified reason per attempt.
pub fn classify(err: UreqError) -> BackendError {
    match err {
        UreqError::StatusCode(code @ (401 | 403)) => {
            BackendError::Auth(format!("http status {code}"))
        }
        UreqError::StatusCode(429) => BackendError::RateLimited("http status 429".to_string()),
        UreqError::StatusCode(code) if (500..=599).contains(&code) => {
            BackendError::Unavailable(format!("http status {code}"))
        }
        UreqError::Timeout(_)
        | UreqError::Io(_)
        | UreqError::HostNotFound
        | UreqError::ConnectionFailed
        | UreqError::TooManyRedirects
        | UreqError::RedirectFailed => BackendError::Unavailable(err.to_string()),
        other => BackendError::Other(other.to_string()),
    }
}
