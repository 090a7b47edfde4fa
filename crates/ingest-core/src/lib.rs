//! Core types for the batch ingestion pipeline.
//!
//! Holds the row and statistics models, the error taxonomy, batch token
//! generation, CLI settings and the formatting helpers shared by the other
//! crates.

pub mod batch;
pub mod error;
pub mod formatting;
pub mod models;
pub mod settings;

pub use batch::BatchToken;
pub use error::{IngestError, Result};
