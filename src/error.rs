//! Error types for the depth-explorer crate.
//!
//! Nothing in this crate is fatal to the host. Every variant here is a
//! recoverable condition: a rejected message leaves the previous book state
//! untouched, and a rejected setting leaves the previous setting in place.
//!
//! Two abnormal conditions are deliberately *not* errors:
//!
//! - Querying an empty history returns `None`.
//! - A playback cursor that predates the retained window resolves to the
//!   oldest retained entry.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::types::Side;

/// The main error type for this crate
#[derive(Debug, Error)]
pub enum Error {
    /// A price or size token failed to parse, or parsed to a negative value.
    /// The whole message is rejected.
    #[error("Malformed {side} level: {reason} ({token:?})")]
    MalformedLevel {
        /// Side the offending tuple belonged to
        side: Side,
        /// The raw token
        token: String,
        /// Why it was rejected
        reason: String,
    },

    /// A delta arrived before any snapshot established the book
    #[error("Delta received before the initial snapshot")]
    MissingSnapshot,

    /// Wall threshold must be positive
    #[error("Invalid wall threshold: {0}")]
    InvalidThreshold(Decimal),

    /// Playback speed must be finite and positive
    #[error("Invalid playback speed: {0}")]
    InvalidSpeed(f64),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON deserialization error on an inbound frame
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether the error came from a rejected inbound message
    pub fn is_rejected_message(&self) -> bool {
        matches!(
            self,
            Error::MalformedLevel { .. } | Error::MissingSnapshot | Error::Json(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_malformed_level_display() {
        let err = Error::MalformedLevel {
            side: Side::Ask,
            token: "12.x".to_string(),
            reason: "invalid decimal".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("ask"));
        assert!(text.contains("12.x"));
        assert!(err.is_rejected_message());
    }

    #[test]
    fn test_threshold_display() {
        let err = Error::InvalidThreshold(dec!(-1.5));
        assert!(err.to_string().contains("-1.5"));
        assert!(!err.is_rejected_message());
    }

    #[test]
    fn test_json_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
