//! Error types for topic reconciliation.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while reconciling a topic.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Desired state failed validation. Nothing was sent to the remote
    /// operator.
    #[error("invalid desired state: {0}")]
    Validation(String),

    /// The remote operator reported a definitive failure.
    #[error("remote operation failed: {detail}")]
    RemoteOperation { detail: String },

    /// The poll deadline passed before the remote side settled.
    #[error("timed out after {elapsed:?} waiting for {target}; last response: {last_seen}")]
    Timeout {
        elapsed: Duration,
        target: String,
        last_seen: String,
    },

    /// The caller cancelled the operation. The remote side effect may or
    /// may not have happened, so the topic's final state is unknown.
    #[error("operation cancelled; remote topic state is unknown")]
    Cancelled,

    /// The topic does not exist on the remote side.
    #[error("topic not found: {0}")]
    NotFound(String),

    /// Transport-level failure reaching the remote operator.
    #[error("invoke failed: {0}")]
    Invoke(#[from] anyhow::Error),
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;
