//! Error types for satchel-core

use std::time::Duration;

use thiserror::Error;

/// Result type alias using satchel-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in satchel-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Remote transport failure (subscription or one-shot fetch)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Connectivity is down and the operation does not wait for it
    #[error("Offline: {0}")]
    Offline(String),

    /// Bounded operation did not finish in time
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// A row could not be mapped to a task
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// Task not found
    #[error("Task not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Write attributed to an owner other than the active session's
    #[error("Owner mismatch: requested {requested}, session owner is {session}")]
    OwnerMismatch { requested: String, session: String },

    /// Local store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
