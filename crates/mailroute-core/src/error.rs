//! Error types for MailRoute Core

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Routing errors
    #[error("No usable backend options for flow '{0}'")]
    EmptyPolicy(String),

    #[error("Backend not found: {0}")]
    BackendNotFound(String),

    #[error("Backend already registered: {0}")]
    DuplicateBackend(String),

    #[error("All backends failed for flow '{flow}' (attempted: {attempted:?})")]
    AllBackendsFailed { flow: String, attempted: Vec<String> },

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Delivery attempt timed out after {0}ms")]
    Timeout(u64),

    // Policy store errors
    #[error("Policy not found: {0}")]
    PolicyNotFound(u64),

    #[error("Flow '{flow}' already has an active policy ({active})")]
    PolicyConflict { flow: String, active: u64 },

    // Weight errors
    #[error("Active ratios sum to {0}, expected 100")]
    UnnormalizedWeights(u32),

    #[error("Ratio for '{name}' must be between 0 and 100, got {ratio}")]
    InvalidRatio { name: String, ratio: u32 },

    #[error("Active ratios would sum to {0}, exceeding 100")]
    WeightOverAllocated(u32),

    #[error("Change would move active ratios from 100 to {0}; rebalance with a batch update")]
    WeightRebalanceRequired(u32),

    #[error("Provider weight not found: {0}")]
    WeightNotFound(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration not found")]
    ConfigNotFound,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether an external retry driver may reasonably try again.
    ///
    /// Only exhaustion of every backend is transient; the other kinds are
    /// misconfigurations that another attempt cannot fix.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::AllBackendsFailed { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_exhaustion_is_retryable() {
        let exhausted = Error::AllBackendsFailed {
            flow: "MAIL_SERVICE".to_string(),
            attempted: vec!["a".to_string(), "b".to_string()],
        };
        assert!(exhausted.is_retryable());

        assert!(!Error::EmptyPolicy("MAIL_SERVICE".to_string()).is_retryable());
        assert!(!Error::BackendNotFound("gone".to_string()).is_retryable());
        assert!(!Error::UnnormalizedWeights(90).is_retryable());
    }

    #[test]
    fn test_all_backends_failed_message_lists_attempts() {
        let err = Error::AllBackendsFailed {
            flow: "MAIL_SERVICE".to_string(),
            attempted: vec!["sendgrid".to_string(), "mailgun".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("MAIL_SERVICE"));
        assert!(msg.contains("sendgrid"));
        assert!(msg.contains("mailgun"));
    }
}
