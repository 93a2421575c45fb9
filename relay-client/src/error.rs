//! Error types for the relay client

use thiserror::Error;

/// Longest response body kept in an error, in bytes
const MAX_ERROR_BODY: usize = 256;

/// Errors that can occur while talking to the relay
#[derive(Debug, Error)]
pub enum RelayError {
    /// The configured relay URL is not a usable http(s) base URL
    #[error("Invalid relay URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Connection, TLS, timeout or body transfer failure
    #[error("Relay transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The relay answered with something other than 200
    #[error("Relay returned HTTP {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// The relay answered 200 with a body that is not the expected JSON
    #[error("Malformed relay response: {0}")]
    MalformedResponse(String),
}

impl RelayError {
    pub(crate) fn unexpected_status(status: u16, body: &str) -> Self {
        let mut end = body.len().min(MAX_ERROR_BODY);
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        RelayError::UnexpectedStatus {
            status,
            body: body[..end].to_string(),
        }
    }

    /// Whether a later attempt with the same input may succeed
    ///
    /// Network failures and non-200 answers are transient; a malformed
    /// response or a bad URL will fail the same way again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RelayError::Transport(_) | RelayError::UnexpectedStatus { .. }
        )
    }

    /// Whether the failure was a connect or read timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, RelayError::Transport(e) if e.is_timeout())
    }
}

/// Result type for relay client operations
pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unexpected_status_truncates_body() {
        let body = "é".repeat(400);
        match RelayError::unexpected_status(500, &body) {
            RelayError::UnexpectedStatus { status, body } => {
                assert_eq!(status, 500);
                assert!(body.len() <= MAX_ERROR_BODY);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_transient_classification() {
        assert!(RelayError::unexpected_status(503, "down").is_transient());
        assert!(!RelayError::MalformedResponse("eof".to_string()).is_transient());
        assert!(!RelayError::InvalidUrl {
            url: "x".to_string(),
            reason: "no scheme".to_string()
        }
        .is_transient());
    }
}
