use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] satchel_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Snapshot {path} did not parse as a JSON array of tasks: {reason}")]
    InvalidSnapshot { path: String, reason: String },
    #[error("Simulation timed out waiting for sync state '{0}'")]
    SimulationTimeout(String),
}
