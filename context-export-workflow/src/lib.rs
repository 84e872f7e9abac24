//! Export orchestration on top of the resilient client and the checkpoint
//! manager.
//!
//! A [`ContentSource`] discovers labeled content and renders single items, a
//! [`DocumentSink`] stores rendered sections, and the [`ExportOrchestrator`]
//! walks the sources while recording progress so an interrupted run can be
//! resumed without repeating finished work.

pub mod error;
pub mod orchestrator;
pub mod sink;
pub mod sources;

pub use error::{WorkflowError, WorkflowResult};
pub use orchestrator::{ExportOrchestrator, ExportReport};
pub use sink::{DocumentSink, MarkdownSink};
pub use sources::{ContentSource, DiscoveryProgress, TrackerSource, WikiSource};
