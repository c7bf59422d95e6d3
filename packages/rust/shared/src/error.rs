//! Error types for narrascript.
//!
//! Library crates use [`NarrascriptError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all narrascript operations.
#[derive(Debug, thiserror::Error)]
pub enum NarrascriptError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// The outline yielded no generation units.
    #[error("outline parse error: {message}")]
    OutlineParse { message: String },

    /// The generation backend failed for a unit.
    #[error("generation failed: {0}")]
    Gateway(#[from] GatewayError),

    /// The accumulated script is empty at finalize time; nothing to persist.
    #[error("the finalized script is empty, nothing to write")]
    EmptyFinalScript,

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad rule pattern, invalid value, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// JSON encoding error (run reports).
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, NarrascriptError>;

impl NarrascriptError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an outline parse error from any displayable message.
    pub fn outline(msg: impl Into<String>) -> Self {
        Self::OutlineParse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure reported by a generation backend.
///
/// The pipeline never retries on its own; every variant halts the run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// The request did not complete within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// Connection, TLS, or body-transfer failure.
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// The backend answered 2xx but the body was not the expected shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The backend answered with a non-2xx status.
    #[error("HTTP {code}: {body}")]
    NonSuccessStatus { code: u16, body: String },
}

impl GatewayError {
    /// Whether a retry decorator may try the request again.
    ///
    /// Only transient conditions qualify; a malformed body or an explicit
    /// rejection will not change on a second attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::TransportFailure(_))
    }

    /// Short machine-friendly name, used in run reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::TransportFailure(_) => "transport_failure",
            Self::MalformedResponse(_) => "malformed_response",
            Self::NonSuccessStatus { .. } => "non_success_status",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = NarrascriptError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = NarrascriptError::outline("no units found");
        assert!(err.to_string().contains("no units found"));

        let err = NarrascriptError::from(GatewayError::NonSuccessStatus {
            code: 429,
            body: "rate limited".into(),
        });
        assert_eq!(err.to_string(), "generation failed: HTTP 429: rate limited");
    }

    #[test]
    fn only_transient_gateway_errors_are_retryable() {
        assert!(GatewayError::Timeout.is_retryable());
        assert!(GatewayError::TransportFailure("reset".into()).is_retryable());
        assert!(!GatewayError::MalformedResponse("no choices".into()).is_retryable());
        assert!(
            !GatewayError::NonSuccessStatus {
                code: 500,
                body: String::new()
            }
            .is_retryable()
        );
    }

    #[test]
    fn gateway_error_kinds() {
        assert_eq!(GatewayError::Timeout.kind(), "timeout");
        assert_eq!(
            GatewayError::NonSuccessStatus {
                code: 503,
                body: String::new()
            }
            .kind(),
            "non_success_status"
        );
    }
}
