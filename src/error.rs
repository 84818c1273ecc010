//! Error types for the feed engine.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FeedError>;

/// Substrings that mark an error message as a transient network failure.
const TRANSIENT_MARKERS: &[&str] = &[
    "network",
    "timeout",
    "timed out",
    "offline",
    "failed to fetch",
    "fetch failed",
    "unavailable",
    "connection reset",
    "econnreset",
];

/// Substrings that mark an error message as a missing or unconfigured backend.
const CONFIGURATION_MARKERS: &[&str] = &["not configured", "not initialized", "no backend"];

/// Errors surfaced by the feed engine.
///
/// Cloneable so the same error can live in the feed state, the diagnostics
/// buffer and a caller's `Result` at once.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// Backing store is absent or unconfigured. Never retried.
    #[error("Backend not configured: {0}")]
    Configuration(String),

    /// Network-level failure that may succeed on retry.
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    /// A stored record could not be normalized.
    #[error("Malformed record: {0}")]
    MalformedData(String),

    /// Profile or document does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A live source ended with an error that is not otherwise classified.
    #[error("Source error: {0}")]
    Source(String),

    /// A new log failed write-time validation.
    #[error("Invalid log: {0}")]
    Validation(String),

    /// Encoding or decoding failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The subscription set was torn down.
    #[error("Subscription cancelled")]
    Cancelled,
}

impl FeedError {
    /// Classify a raw backend error message.
    ///
    /// Transient network signals are detected heuristically from the text;
    /// anything unrecognised becomes [`FeedError::Source`].
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        if CONFIGURATION_MARKERS.iter().any(|m| lower.contains(m)) {
            FeedError::Configuration(message)
        } else if TRANSIENT_MARKERS.iter().any(|m| lower.contains(m)) {
            FeedError::TransientNetwork(message)
        } else {
            FeedError::Source(message)
        }
    }

    /// Whether a one-shot operation failing with this error may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, FeedError::TransientNetwork(_))
    }

    /// Whether the error means "nothing there" rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FeedError::NotFound(_))
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(e: serde_json::Error) -> Self {
        FeedError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_transient() {
        assert!(FeedError::classify("Network request failed").is_transient());
        assert!(FeedError::classify("deadline exceeded: timeout").is_transient());
        assert!(FeedError::classify("client is offline").is_transient());
        assert!(FeedError::classify("TypeError: Failed to fetch").is_transient());
    }

    #[test]
    fn test_classify_configuration() {
        let err = FeedError::classify("Firestore not configured");
        assert!(matches!(err, FeedError::Configuration(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_classify_fallback() {
        let err = FeedError::classify("permission-denied");
        assert_eq!(err, FeedError::Source("permission-denied".to_string()));
    }

    #[test]
    fn test_display() {
        let err = FeedError::NotFound("profile u1".into());
        assert_eq!(err.to_string(), "Not found: profile u1");
        assert!(err.is_not_found());
    }
}
