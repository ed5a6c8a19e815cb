//! Custom error types for the collector
//!
//! Provides a unified error handling system across all modules.

use thiserror::Error;

/// Main error type for collector operations
#[derive(Error, Debug)]
pub enum ColetorError {
    /// Configuration errors (missing input files, bad config values)
    #[error("configuration error: {0}")]
    Config(String),

    /// A page element could not be located within its bounded wait
    #[error("element not found: {0}")]
    ElementNotFound(String),

    /// A previously located element was detached by a page mutation
    #[error("stale element reference: {0}")]
    StaleElement(String),

    /// Search results never appeared within the bounded wait
    #[error("search timed out: {0}")]
    SearchTimeout(String),

    /// Challenge acceptance or token retrieval exceeded its wait budget
    #[error("challenge timed out: {0}")]
    ChallengeTimeout(String),

    /// A dependency service answered outside its contract
    #[error("{service} error: {detail}")]
    ExternalService { service: String, detail: String },

    /// Browser driver errors other than the classified kinds above
    #[error("driver error: {0}")]
    Driver(String),

    /// The run was cancelled from outside
    #[error("run cancelled")]
    Cancelled,

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL construction errors
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV read/write errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Convenience Result type for collector operations
pub type Result<T> = std::result::Result<T, ColetorError>;

impl ColetorError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an element-not-found error
    pub fn element_not_found(msg: impl Into<String>) -> Self {
        Self::ElementNotFound(msg.into())
    }

    /// Create a stale-element error
    pub fn stale(msg: impl Into<String>) -> Self {
        Self::StaleElement(msg.into())
    }

    /// Create a search timeout error
    pub fn search_timeout(msg: impl Into<String>) -> Self {
        Self::SearchTimeout(msg.into())
    }

    /// Create a challenge timeout error
    pub fn challenge_timeout(msg: impl Into<String>) -> Self {
        Self::ChallengeTimeout(msg.into())
    }

    /// Create an external-service error
    pub fn external(service: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::ExternalService {
            service: service.into(),
            detail: detail.into(),
        }
    }

    /// Create a driver error
    pub fn driver(msg: impl Into<String>) -> Self {
        Self::Driver(msg.into())
    }

    /// Whether a failed target may be skipped and the run continued.
    ///
    /// Configuration problems and cancellation abort the run; everything
    /// else is contained at the per-target boundary.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::Config(_) | Self::Cancelled | Self::Io(_) | Self::Url(_) | Self::Csv(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverability() {
        assert!(!ColetorError::config("missing file").is_recoverable());
        assert!(!ColetorError::Cancelled.is_recoverable());
        assert!(ColetorError::element_not_found(".preco").is_recoverable());
        assert!(ColetorError::search_timeout("results").is_recoverable());
        assert!(ColetorError::challenge_timeout("acceptance").is_recoverable());
        assert!(ColetorError::external("registry", "status 500").is_recoverable());
    }

    #[test]
    fn test_external_display() {
        let err = ColetorError::external("registry", "unexpected status 503");
        assert_eq!(err.to_string(), "registry error: unexpected status 503");
    }
}
