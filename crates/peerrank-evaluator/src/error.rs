//! Mapping of HTTP outcomes onto [`EvaluatorError`].

use std::time::Duration;

use peerrank_core::EvaluatorError;

/// Longest response body kept in an error message.
const MAX_ERROR_BODY: usize = 500;

/// Classify a non-success HTTP status.
pub fn classify_status(status: u16, body: &str, retry_after: Option<Duration>) -> EvaluatorError {
    if status == 429 {
        return EvaluatorError::RateLimited { retry_after };
    }
    EvaluatorError::Status {
        status,
        body: body.chars().take(MAX_ERROR_BODY).collect(),
    }
}

/// Classify a transport-level failure.
pub fn transport_error(err: &reqwest::Error, timeout: Duration) -> EvaluatorError {
    if err.is_timeout() {
        EvaluatorError::Timeout(timeout)
    } else {
        EvaluatorError::Transport(err.to_string())
    }
}
