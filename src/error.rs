//! Error types for the Velero Annotations Controller

use std::time::Duration;

use thiserror::Error;

/// Result type alias using the controller's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Controller error types
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A cluster request did not complete in time
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// The pod watch stream failed
    #[error("Watch stream error: {0}")]
    WatchStream(String),

    /// A task running next to the controller stopped
    #[error("{task} exited: {reason}")]
    TaskExited { task: &'static str, reason: String },
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a watch stream error
    pub fn watch_stream(msg: impl Into<String>) -> Self {
        Error::WatchStream(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(operation: &'static str, after: Duration) -> Self {
        Error::Timeout { operation, after }
    }
}
