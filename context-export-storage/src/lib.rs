//! Persistence for export runs.
//!
//! Checkpoints are plain JSON files in a configurable directory; see
//! [`checkpoint`] for the file layout and write policy.

pub mod checkpoint;

pub use checkpoint::{
    CheckpointError, CheckpointManager, CheckpointSummary, CompletionSummary, ResumePosition,
};
