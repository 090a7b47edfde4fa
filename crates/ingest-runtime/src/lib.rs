//! Runtime orchestration layer for the batch ingestion pipeline.
//!
//! Sequences a batch run over the data layer and reconciles the running
//! statistics against the store afterwards.

pub mod orchestrator;
pub mod reconciliation;

pub use orchestrator::{
    process_files_and_validate, PipelineOrchestrator, PipelineStage, RunOutcome,
};
pub use reconciliation::{reconcile, ReconciliationReport};
