//! Error types for conformance checks.
//!
//! Defines the crate error with classification helpers so callers can decide
//! whether a failure is worth retrying or should fail the test outright.

use std::time::Duration;
use thiserror::Error;

use crate::poll::FailureKind;

/// Error type for conformance operations
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Lookup matched no object
    #[error("No {0} found")]
    NotFound(String),

    /// Lookup matched more than one object where exactly one was expected
    #[error("Expected exactly one {description}, found {count}")]
    MultipleFound { description: String, count: usize },

    /// Command execution inside a pod failed
    #[error("Exec error: {0}")]
    Exec(String),

    /// Command or API output could not be interpreted
    #[error("Parse error: {0}")]
    Parse(String),

    /// Observed cluster state violates an expectation
    #[error("Check failed: {0}")]
    Check(String),

    /// Invalid suite configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid polling policy
    #[error("Invalid poll policy: {0}")]
    Policy(#[from] crate::poll::PolicyError),

    /// A polling assertion did not hold
    #[error("{message}")]
    Poll { kind: FailureKind, message: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML configuration could not be decoded
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Local I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this error indicates a not-found condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
            || matches!(self, Error::Kube(kube::Error::Api(e)) if e.code == 404)
    }

    /// Check if this error should be retried
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube(e) => {
                // Retry on network errors, rate limiting, and server errors
                matches!(
                    e,
                    kube::Error::Api(api_err) if api_err.code >= 500 || api_err.code == 429
                ) || matches!(e, kube::Error::Service(_))
            }
            // Cluster state may still be converging
            Error::NotFound(_) | Error::MultipleFound { .. } | Error::Exec(_) => true,
            Error::Poll { kind, .. } => *kind == FailureKind::Timeout,
            Error::Parse(_)
            | Error::Check(_)
            | Error::Config(_)
            | Error::Policy(_)
            | Error::Serialization(_)
            | Error::Yaml(_)
            | Error::Io(_) => false,
        }
    }

    /// Get the recommended delay before retrying the failed operation
    pub fn retry_after(&self) -> Option<Duration> {
        self.is_retryable().then(|| Duration::from_secs(5))
    }
}

/// Result type alias for conformance operations
pub type Result<T> = std::result::Result<T, Error>;
