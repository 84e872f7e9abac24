use context_export_sdk::SdkError;
use context_export_storage::CheckpointError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("API error: {0}")]
    Sdk(#[from] SdkError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Render error: {0}")]
    Render(String),
}

pub type WorkflowResult<T> = std::result::Result<T, WorkflowError>;
