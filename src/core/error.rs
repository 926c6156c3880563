//! Error taxonomy for the crowd simulation.

use std::path::PathBuf;
use thiserror::Error;

use super::agent::AgentId;

/// Errors raised while configuring, loading or stepping a simulation.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Scenario parse error (record {line}): {message}")]
    Parse { line: usize, message: String },

    #[error("Position stream error: {0}")]
    Stream(String),

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(String),

    #[error("Position ({x}, {y}) lies outside the {dim_x}x{dim_y} grid")]
    OutOfBounds {
        x: i32,
        y: i32,
        dim_x: i32,
        dim_y: i32,
    },

    #[error("Unknown agent: {0}")]
    UnknownAgent(AgentId),

    #[error("Spatial index consistency defect: {0}")]
    IndexConsistency(String),
}

pub type Result<T> = std::result::Result<T, SimError>;

impl SimError {
    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        SimError::Parse {
            line,
            message: message.into(),
        }
    }
}
