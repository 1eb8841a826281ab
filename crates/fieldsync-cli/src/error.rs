use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] fieldsync_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Checklist items must be a JSON array: {0}")]
    InvalidChecklist(String),
    #[error("Invalid inspection id: {0}")]
    InvalidInspectionId(String),
    #[error("Limit must be greater than zero")]
    ZeroLimit,
}
