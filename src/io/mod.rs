//! Configuration loading and path-state checkpointing.

mod checkpoint;
mod config;

use thiserror::Error;

pub use checkpoint::{
    read_checkpoint, restore, snapshot, write_checkpoint, BeadRecord, PathCheckpoint, WormRecord,
};
pub use config::{read_params, ExternalKind, InteractionKind, SimParams};

#[derive(Debug, Error)]
pub enum IoError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("dimension mismatch: compiled for {expected}, file has {found}")]
    Dimension { expected: usize, found: usize },
    #[error("corrupt checkpoint: {0}")]
    Corrupt(String),
}
