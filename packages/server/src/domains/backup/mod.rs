//! Backup job orchestration.
//!
//! A job starts through [`JobController`], which registers one worker per
//! active site and launches the crawler fleet. Workers push status messages
//! that [`StatusIngest`] decodes and applies; the message that completes the
//! job runs the [`FinalizationPipeline`].

pub mod completion;
pub mod controller;
pub mod error;
pub mod finalize;
pub mod ingest;
pub mod models;
pub mod protocol;
pub mod registry;
pub mod service;
pub mod state_machine;

pub use completion::{ActiveJob, Completion, JobSlot};
pub use controller::{JobController, StartedJob};
pub use error::BackupError;
pub use finalize::{compose_report, FinalizationPipeline, FinalizationSummary};
pub use ingest::{IngestOutcome, StatusIngest};
pub use registry::{WorkerCell, WorkerRegistry};
pub use service::{BackupDeps, BackupService};
pub use state_machine::Effect;
