//! Input discovery and CSV parsing.
//!
//! Lists the regular input files of a batch directory and turns a CSV file
//! into typed [`Row`]s.

use std::io::Read;
use std::path::{Path, PathBuf};

use ingest_core::error::{IngestError, Result};
use ingest_core::models::{DiscoveryOptions, Row, PRICE_FIELD};
use regex::Regex;
use tracing::debug;

// ── Discovery ─────────────────────────────────────────────────────────────────

/// List the regular input files directly under `directory`, sorted by path.
///
/// Only regular files whose extension equals `options.extension` are kept.
/// Files whose name matches `options.exclude_pattern` are skipped; this is how
/// the validation file stays out of the regular set. Sub-directories are not
/// descended into.
pub fn find_input_files(directory: &Path, options: &DiscoveryOptions) -> Result<Vec<PathBuf>> {
    let exclude = Regex::new(&options.exclude_pattern).map_err(|e| {
        IngestError::Config(format!(
            "invalid exclude pattern {:?}: {}",
            options.exclude_pattern, e
        ))
    })?;

    if !directory.is_dir() {
        return Err(IngestError::discovery(directory, "not a readable directory"));
    }

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in walkdir::WalkDir::new(directory)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
    {
        let entry = entry.map_err(|e| IngestError::discovery(directory, e))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy();
        let has_extension = entry
            .path()
            .extension()
            .map(|ext| ext == options.extension.as_str())
            .unwrap_or(false);
        if !has_extension {
            continue;
        }
        if exclude.is_match(&name) {
            debug!("Skipping excluded input {}", entry.path().display());
            continue;
        }

        files.push(entry.into_path());
    }

    files.sort();
    debug!(
        "Discovered {} input files in {}",
        files.len(),
        directory.display()
    );
    Ok(files)
}

/// Check that the validation file exists and is a regular file.
pub fn ensure_validation_file(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(IngestError::discovery(path, "validation file not found"))
    }
}

// ── CSV parsing ───────────────────────────────────────────────────────────────

/// Read every row of the CSV file at `path`.
pub fn read_rows(path: &Path) -> Result<Vec<Row>> {
    let file = std::fs::File::open(path).map_err(|e| IngestError::parse(path, e))?;
    parse_rows(file, path)
}

/// Parse CSV from `input`. `path` only labels errors.
///
/// The header row must contain a `price` column. Every record must have as
/// many cells as the header and a finite numeric price; any other column is
/// carried through verbatim.
pub fn parse_rows<R: Read>(input: R, path: &Path) -> Result<Vec<Row>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(input);

    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| IngestError::parse(path, e))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let price_idx = headers
        .iter()
        .position(|h| h == PRICE_FIELD)
        .ok_or_else(|| IngestError::parse(path, format!("missing column `{}`", PRICE_FIELD)))?;

    let mut rows = Vec::new();
    for (n, record) in rdr.records().enumerate() {
        let record = record.map_err(|e| IngestError::parse(path, e))?;
        // Header is line 1.
        let line = n + 2;

        let cell = record.get(price_idx).unwrap_or("").trim();
        let price: f64 = cell.parse().map_err(|_| {
            IngestError::parse(path, format!("line {}: invalid price {:?}", line, cell))
        })?;
        if !price.is_finite() {
            return Err(IngestError::parse(
                path,
                format!("line {}: price must be finite, got {:?}", line, cell),
            ));
        }

        let fields = headers
            .iter()
            .zip(record.iter())
            .enumerate()
            .filter(|(i, _)| *i != price_idx)
            .map(|(_, (h, v))| (h.clone(), v.to_string()))
            .collect();

        rows.push(Row { price, fields });
    }

    debug!("Parsed {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
