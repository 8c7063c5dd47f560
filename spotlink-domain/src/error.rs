//! Exchange error taxonomy.
//!
//! Setup and REST failures are reported through `ExchangeError`. Failures on a
//! running stream never reach this type: the background loop just ends.

use thiserror::Error;

/// Errors returned by `Exchange` operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExchangeError {
    /// Connection refused, DNS, TLS or WebSocket dial failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Request did not complete within the configured timeout
    #[error("Request timed out")]
    Timeout,

    /// Venue rejected the call (error envelope or non-success status)
    #[error("Remote API error (status {status}, code {code}): {body}")]
    RemoteApi {
        /// HTTP status of the response
        status: u16,
        /// Venue error code or label
        code: String,
        /// Raw response body
        body: String,
    },

    /// Venue answered for something other than what was asked; the message
    /// quotes the raw response body
    #[error("Protocol mismatch: {0}")]
    ProtocolMismatch(String),

    /// Response could not be decoded; the message quotes the raw body
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Signature could not be computed from the credentials
    #[error("Failed to build signature: {0}")]
    Signing(String),

    /// Pair identifier is not `base.quote`
    #[error("Invalid trading pair: {0}")]
    InvalidPair(String),

    /// Configuration value missing or malformed
    #[error("Configuration error: {0}")]
    Config(String),

    /// The adapter was closed; no new subscriptions are accepted
    #[error("Exchange session closed")]
    SessionClosed,
}

impl ExchangeError {
    /// Venue error code, when the venue supplied one.
    pub fn remote_code(&self) -> Option<&str> {
        match self {
            ExchangeError::RemoteApi { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }
}

/// Result type for exchange operations.
pub type ExchangeResult<T> = Result<T, ExchangeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_api_display_includes_body() {
        let err = ExchangeError::RemoteApi {
            status: 400,
            code: "INVALID_KEY".to_string(),
            body: r#"{"label":"INVALID_KEY"}"#.to_string(),
        };

        let text = err.to_string();
        assert!(text.contains("INVALID_KEY"));
        assert!(text.contains("400"));
        assert_eq!(err.remote_code(), Some("INVALID_KEY"));
    }

    #[test]
    fn test_remote_code_absent_for_transport() {
        assert_eq!(ExchangeError::Timeout.remote_code(), None);
    }
}
