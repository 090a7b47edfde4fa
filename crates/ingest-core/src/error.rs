use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the ingestion pipeline.
///
/// `Parse`, `StoreWrite`, `Query` and `Discovery` are the pipeline's own
/// failure modes. Each is fatal to the run that raised it and reaches the
/// caller unmodified.
#[derive(Error, Debug)]
pub enum IngestError {
    /// An input file is malformed or lacks the numeric column.
    #[error("Failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    /// Appending rows to the store failed.
    #[error("Failed to append to table {table}: {reason}")]
    StoreWrite { table: String, reason: String },

    /// The aggregate query against the store could not execute.
    #[error("Aggregate query on table {table} failed: {reason}")]
    Query { table: String, reason: String },

    /// The store could not be opened or prepared.
    #[error("Failed to open store {location}: {reason}")]
    StoreOpen { location: String, reason: String },

    /// The input directory is unreadable or the validation file is missing.
    #[error("Discovery failed for {path}: {reason}")]
    Discovery { path: PathBuf, reason: String },

    /// A JSON document (config file) could not be parsed.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors from third-party crates via `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl IngestError {
    pub fn parse(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        IngestError::Parse {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn store_write(table: impl Into<String>, reason: impl ToString) -> Self {
        IngestError::StoreWrite {
            table: table.into(),
            reason: reason.to_string(),
        }
    }

    pub fn query(table: impl Into<String>, reason: impl ToString) -> Self {
        IngestError::Query {
            table: table.into(),
            reason: reason.to_string(),
        }
    }

    pub fn store_open(location: impl Into<String>, reason: impl ToString) -> Self {
        IngestError::StoreOpen {
            location: location.into(),
            reason: reason.to_string(),
        }
    }

    pub fn discovery(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        IngestError::Discovery {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Convenience alias used throughout the ingest crates.
pub type Result<T> = std::result::Result<T, IngestError>;
