//! Error types for the reconciler.
//!
//! Defines the error taxonomy with classification for retry behavior. Every
//! error is expected to be retried by the external scheduler on a later pass.

use std::time::Duration;
use thiserror::Error;

use crate::client::ValkeyError;

/// Error type for reconciliation operations
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid replica count, concurrency level or missing credential
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Not enough ready nodes, or a slot owner that cannot be resolved
    #[error("Topology error: {0}")]
    Topology(String),

    /// A remote call to the store failed
    #[error("Protocol error: {0}")]
    Protocol(#[from] ValkeyError),

    /// Node discovery lags a scale change (duplicate or out-of-range sequence index)
    #[error("Race detected: {0}")]
    Race(String),

    /// A migration worker stopped before reporting its result
    #[error("Migration worker failed: {0}")]
    Worker(String),

    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
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
            Error::Topology(_) | Error::Protocol(_) | Error::Race(_) | Error::Worker(_) => true,
            Error::Configuration(_) | Error::Serialization(_) => false,
        }
    }

    /// Get the recommended requeue duration for this error
    pub fn requeue_after(&self) -> Duration {
        if self.is_retryable() {
            Duration::from_secs(30)
        } else {
            Duration::from_secs(3600)
        }
    }
}

/// Result type alias for reconciliation operations
pub type Result<T> = std::result::Result<T, Error>;
