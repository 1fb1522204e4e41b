//! Pipeline orchestration for FightSync.
//!
//! This crate ties together fetching, reconciliation, the error ledger,
//! and loading into repeatable, partially-failable runs driven by a typed
//! run command.

pub mod command;
pub mod pipeline;
pub mod snapshots;

pub use command::{RunCommand, RunMode};
pub use pipeline::{
    Extractors, PipelineConfig, ProgressReporter, RunSummary, SilentProgress, StageOutcome,
    StageStatus, run,
};
pub use snapshots::SnapshotStore;
