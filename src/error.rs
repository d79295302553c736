//! Error types for bakong-khqr.

use std::time::Duration;
use thiserror::Error;

/// Result type alias using the crate error.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while encoding payloads or talking to the settlement API.
#[derive(Debug, Error)]
pub enum Error {
    /// Unsupported currency or malformed merchant configuration.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// A tracking hash that is not 32 lowercase hex characters.
    #[error("Invalid tracking hash: {0}")]
    InvalidHash(String),

    /// The settlement call did not complete within the per-call bound.
    #[error("Settlement request timed out after {0:?}")]
    Timeout(Duration),

    /// The settlement API answered 429.
    #[error("Settlement API rate limit exceeded")]
    RateLimited,

    /// Connection-level failure reaching the settlement API.
    #[error("Network error: {0}")]
    Network(String),

    /// Any other non-2xx answer from the settlement API.
    #[error("Settlement API returned HTTP {status}: {body}")]
    Upstream {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },

    /// A 2xx answer whose body could not be understood.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Credential rejected or caller IP not whitelisted (401/403).
    #[error("Settlement API rejected credentials (HTTP {status}): {message}")]
    Fatal {
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// The polling deadline passed while the payment was still pending.
    #[error("Deadline reached for {hash} while status was still pending")]
    AmbiguousState {
        /// Tracking hash of the payment.
        hash: String,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification used to decide retry and alerting behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad input; surfaced immediately, never retried.
    Encoding,
    /// Retried by the monitor with bounded exponential backoff.
    TransientNetwork,
    /// Never retried automatically; raises an operator alert.
    FatalConfig,
    /// Deadline reached while pending; resolved by forcing expiry.
    AmbiguousState,
    /// Local failures (config, I/O, serialization).
    Internal,
}

impl Error {
    /// Classify this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Encoding(_) | Self::InvalidHash(_) => ErrorCategory::Encoding,
            Self::Timeout(_)
            | Self::RateLimited
            | Self::Network(_)
            | Self::Upstream { .. }
            | Self::Protocol(_) => ErrorCategory::TransientNetwork,
            Self::Fatal { .. } => ErrorCategory::FatalConfig,
            Self::AmbiguousState { .. } => ErrorCategory::AmbiguousState,
            Self::Config(_) | Self::Io(_) | Self::Json(_) => ErrorCategory::Internal,
        }
    }

    /// Returns true for credential / whitelist failures.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.category() == ErrorCategory::FatalConfig
    }

    /// Returns true if the monitor may retry after this error.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.category() == ErrorCategory::TransientNetwork
    }

    /// Returns true for transient errors that count against the upstream
    /// error cap (unexpected status codes and unreadable bodies). Timeouts,
    /// 429s and connection failures only back off.
    #[must_use]
    pub fn counts_toward_cap(&self) -> bool {
        matches!(self, Self::Upstream { .. } | Self::Protocol(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(
            Error::Encoding("EUR".into()).category(),
            ErrorCategory::Encoding
        );
        assert!(Error::RateLimited.is_transient());
        assert!(Error::Timeout(Duration::from_secs(10)).is_transient());
        assert!(Error::Fatal {
            status: 403,
            message: String::new()
        }
        .is_fatal());
        assert_eq!(
            Error::AmbiguousState { hash: "h".into() }.category(),
            ErrorCategory::AmbiguousState
        );
    }

    #[test]
    fn test_retry_cap_applies_to_unexpected_statuses_only() {
        assert!(Error::Upstream {
            status: 502,
            body: String::new()
        }
        .counts_toward_cap());
        assert!(Error::Protocol("bad json".into()).counts_toward_cap());
        assert!(!Error::RateLimited.counts_toward_cap());
        assert!(!Error::Network("reset".into()).counts_toward_cap());
    }
}
