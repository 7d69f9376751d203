//! Error types for billpull
//!
//! Run-scoped failures live here. Per-organization failures are recorded as
//! [`crate::report::DownloadOutcome`] values and never reach this type.
//! Uses thiserror for ergonomic error handling.

use thiserror::Error;

/// Result type alias for billpull operations
pub type Result<T> = std::result::Result<T, BillsError>;

/// Errors that terminate a whole run
#[derive(Error, Debug)]
pub enum BillsError {
    /// Missing or duplicate input file, missing credentials, bad arguments
    #[error("Configuration error: {0}")]
    Config(String),

    /// Signing in to the billing application failed
    #[error("Session error: {0}")]
    Session(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Organization list could not be parsed
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization errors (run report)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),

    /// Local failures wrapped with `anyhow::Context` in the CLI
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
}

impl BillsError {
    /// True for errors that are reported before any browser interaction
    pub fn is_config(&self) -> bool {
        matches!(self, BillsError::Config(_))
    }
}

impl crate::retry::RetryableError for webdriver::Error {
    fn retry_decision(&self) -> crate::retry::RetryDecision {
        use crate::retry::RetryDecision;

        // chromedriver may still be binding its port
        if self.is_connect() {
            RetryDecision::Retry
        } else {
            match self.code() {
                Some("session not created") => RetryDecision::Retry,
                _ => RetryDecision::NoRetry,
            }
        }
    }
}
