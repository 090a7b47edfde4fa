//! Per-file load: parse, stamp provenance, append, fold into running stats.

use std::path::Path;

use ingest_core::error::{IngestError, Result};
use ingest_core::formatting::format_bytes;
use ingest_core::models::{Provenance, StampedRow};
use ingest_core::BatchToken;
use tracing::info;

use crate::aggregator::RunningStats;
use crate::reader::read_rows;
use crate::store::Store;

/// Load one CSV file into `table` and return `stats` with its rows folded in.
///
/// Every row is stamped with the file's base name, its size in bytes and
/// `batch`. The append happens before the fold, so a failed append leaves
/// `stats` untouched (the caller gets only the error).
pub fn load_file<S: Store + ?Sized>(
    path: &Path,
    store: &mut S,
    table: &str,
    stats: RunningStats,
    batch: &BatchToken,
) -> Result<RunningStats> {
    let file_size = std::fs::metadata(path)
        .map_err(|e| IngestError::parse(path, e))?
        .len();
    let source_file = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| IngestError::parse(path, "path has no file name"))?;

    let rows = read_rows(path)?;
    let partial = RunningStats::from_rows(&rows);
    let row_count = rows.len();

    let provenance = Provenance::new(source_file, batch, file_size);
    let stamped: Vec<StampedRow> = rows
        .into_iter()
        .map(|row| StampedRow {
            row,
            provenance: provenance.clone(),
        })
        .collect();

    store.append(table, &stamped)?;

    info!(
        file = %path.display(),
        rows = row_count,
        file_size,
        batch = %batch,
        "Loaded {} ({}) with batch {}",
        provenance.source_file,
        format_bytes(file_size),
        batch
    );

    Ok(stats.merge(partial))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
