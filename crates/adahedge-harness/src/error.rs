//! Harness error type.

use adahedge_core::InvalidShape;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid shape: {0}")]
    Shape(#[from] InvalidShape),
    #[error("{gate}: {failed} of {total} checks failed")]
    Failed {
        gate: &'static str,
        failed: usize,
        total: usize,
    },
}
