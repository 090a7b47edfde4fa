//! Pipeline orchestrator.
//!
//! Runs one batch end to end: discover inputs, load every regular file, load
//! the validation file, then recompute the authoritative statistics from the
//! store. The stages run strictly in order and the first error ends the run.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ingest_core::error::Result;
use ingest_core::models::{AuthoritativeStats, PipelineOptions};
use ingest_core::BatchToken;
use ingest_data::aggregator::RunningStats;
use ingest_data::loader::load_file;
use ingest_data::reader::{ensure_validation_file, find_input_files};
use ingest_data::store::Store;
use serde::Serialize;

use crate::reconciliation::recompute;

// ── Public types ──────────────────────────────────────────────────────────────

/// Where a run currently is. Transitions are linear; any failure jumps to
/// [`PipelineStage::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Idle,
    Discovering,
    LoadingRegularFiles,
    LoadingValidationFile,
    Reconciling,
    Done,
    Failed,
}

/// Everything a successful run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    /// Token stamped onto every row of this run.
    pub batch: BatchToken,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Regular files loaded, in load order (the validation file excluded).
    pub files_loaded: Vec<PathBuf>,
    /// Running statistics after the regular files.
    pub before_validation: RunningStats,
    /// Running statistics after the validation file as well.
    pub after_validation: RunningStats,
    /// Statistics recomputed over the whole store.
    pub authoritative: AuthoritativeStats,
}

impl RunOutcome {
    /// `(stats_before_validation, stats_after_validation, authoritative_stats)`.
    pub fn into_triple(self) -> (RunningStats, RunningStats, AuthoritativeStats) {
        (
            self.before_validation,
            self.after_validation,
            self.authoritative,
        )
    }
}

// ── PipelineOrchestrator ──────────────────────────────────────────────────────

/// Sequences one batch run against a caller-provided store.
///
/// The orchestrator never compares the running and authoritative statistics;
/// see [`crate::reconciliation::reconcile`] for that.
pub struct PipelineOrchestrator {
    options: PipelineOptions,
    stage: PipelineStage,
}

impl PipelineOrchestrator {
    pub fn new(options: PipelineOptions) -> Self {
        Self {
            options,
            stage: PipelineStage::Idle,
        }
    }

    /// Stage reached by the most recent run.
    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    /// Run one batch under a freshly generated token.
    pub fn run<S: Store + ?Sized>(
        &mut self,
        store: &mut S,
        directory: &Path,
        validation_file: &Path,
    ) -> Result<RunOutcome> {
        self.run_with_batch(store, directory, validation_file, BatchToken::generate())
    }

    /// Run one batch under `batch`.
    ///
    /// With `atomic` set, the whole run is one store transaction that is
    /// committed after reconciling and rolled back on any failure. Otherwise
    /// rows appended before a failure stay in the store.
    pub fn run_with_batch<S: Store + ?Sized>(
        &mut self,
        store: &mut S,
        directory: &Path,
        validation_file: &Path,
        batch: BatchToken,
    ) -> Result<RunOutcome> {
        self.stage = PipelineStage::Idle;
        let atomic = self.options.atomic;

        if atomic {
            if let Err(e) = store.begin() {
                self.transition(PipelineStage::Failed);
                return Err(e);
            }
        }

        let result = self
            .execute(store, directory, validation_file, batch)
            .and_then(|outcome| {
                if atomic {
                    store.commit()?;
                }
                Ok(outcome)
            });

        match result {
            Ok(outcome) => {
                self.transition(PipelineStage::Done);
                Ok(outcome)
            }
            Err(e) => {
                let failed_in = self.stage;
                self.transition(PipelineStage::Failed);
                tracing::error!(stage = ?failed_in, error = %e, "pipeline run failed");
                if atomic {
                    if let Err(rb) = store.rollback() {
                        tracing::warn!(error = %rb, "rollback after failed run also failed");
                    }
                }
                Err(e)
            }
        }
    }

    // ── Private implementation ────────────────────────────────────────────

    fn execute<S: Store + ?Sized>(
        &mut self,
        store: &mut S,
        directory: &Path,
        validation_file: &Path,
        batch: BatchToken,
    ) -> Result<RunOutcome> {
        let started_at = Utc::now();
        let table = self.options.table.clone();
        tracing::info!(batch = %batch, "Starting batch run over {}", directory.display());

        self.transition(PipelineStage::Discovering);
        let mut files = find_input_files(directory, &self.options.discovery)?;
        ensure_validation_file(validation_file)?;
        // The validation file is loaded once, last, even if the exclude
        // pattern does not match its name.
        files.retain(|f| !same_file(f, validation_file));

        self.transition(PipelineStage::LoadingRegularFiles);
        let mut stats = RunningStats::new();
        for file in &files {
            stats = load_file(file, store, &table, stats, &batch)?;
            tracing::debug!(?stats, "running stats after {}", file.display());
        }
        let before_validation = stats;
        tracing::info!(
            files = files.len(),
            rows = before_validation.count,
            "Regular files loaded"
        );

        self.transition(PipelineStage::LoadingValidationFile);
        let after_validation = load_file(validation_file, store, &table, stats, &batch)?;
        tracing::info!(stats = ?after_validation, "Validation file loaded");

        self.transition(PipelineStage::Reconciling);
        let authoritative = recompute(&*store, &table)?;
        tracing::info!(stats = ?authoritative, "Authoritative statistics recomputed");

        Ok(RunOutcome {
            batch,
            started_at,
            finished_at: Utc::now(),
            files_loaded: files,
            before_validation,
            after_validation,
            authoritative,
        })
    }

    fn transition(&mut self, next: PipelineStage) {
        tracing::debug!(from = ?self.stage, to = ?next, "pipeline stage");
        self.stage = next;
    }
}

/// Run one batch with default options.
///
/// Returns the outcome whose [`RunOutcome::into_triple`] is
/// `(stats_before_validation, stats_after_validation, authoritative_stats)`.
pub fn process_files_and_validate<S: Store + ?Sized>(
    store: &mut S,
    directory: &Path,
    validation_file: &Path,
) -> Result<RunOutcome> {
    PipelineOrchestrator::new(PipelineOptions::default()).run(store, directory, validation_file)
}

// ── Private helpers ───────────────────────────────────────────────────────────

/// Path equality that sees through `.`/`..` and symlinks when both exist.
fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(ca), Ok(cb)) => ca == cb,
        _ => a == b,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
