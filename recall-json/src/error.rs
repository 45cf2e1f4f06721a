use recall_core::{CardId, SrsError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("card not found: {0}")]
    NotFound(CardId),
    #[error(transparent)]
    Schedule(#[from] SrsError),
    #[error("unsupported store file version {0}")]
    Version(u32),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed store file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
