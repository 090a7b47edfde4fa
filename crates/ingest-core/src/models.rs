use serde::{Deserialize, Serialize};

use crate::batch::BatchToken;

/// Name of the numeric column every input file must carry.
pub const PRICE_FIELD: &str = "price";

/// Default table the loader appends to.
pub const DEFAULT_TABLE: &str = "transaction_data";

/// A single tabular record read from an input file.
///
/// `price` is typed so that a file without a usable price column fails at
/// load time. Every other column is kept verbatim, in file order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// The aggregated numeric column.
    pub price: f64,
    /// Remaining `(column, value)` pairs, passed through unmodified.
    #[serde(default)]
    pub fields: Vec<(String, String)>,
}

impl Row {
    /// Row with only a price and no pass-through columns.
    pub fn with_price(price: f64) -> Self {
        Self {
            price,
            fields: Vec::new(),
        }
    }

    /// Look up a pass-through column by name.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Pass-through columns as a JSON object, preserving column order.
    pub fn fields_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        serde_json::Value::Object(map)
    }
}

/// Metadata stamped onto every row at load time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Base name of the originating file.
    pub source_file: String,
    /// Token of the run that loaded the row.
    pub batch_uuid: String,
    /// Size of the originating file in bytes.
    pub file_size: u64,
}

impl Provenance {
    pub fn new(source_file: impl Into<String>, batch: &BatchToken, file_size: u64) -> Self {
        Self {
            source_file: source_file.into(),
            batch_uuid: batch.as_str().to_string(),
            file_size,
        }
    }
}

/// A row paired with its provenance; the unit the store appends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StampedRow {
    pub row: Row,
    pub provenance: Provenance,
}

/// Aggregate statistics recomputed from the persisted store.
///
/// An empty scope reports `total_count = 0`, `avg_price = 0` and infinite
/// extremes, the same identity values an empty running aggregate carries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AuthoritativeStats {
    pub total_count: u64,
    pub avg_price: f64,
    pub min_price: f64,
    pub max_price: f64,
}

impl AuthoritativeStats {
    /// Statistics of a scope with no rows.
    pub fn empty() -> Self {
        Self {
            total_count: 0,
            avg_price: 0.0,
            min_price: f64::INFINITY,
            max_price: f64::NEG_INFINITY,
        }
    }

    /// Sum of prices implied by `avg_price * total_count`.
    pub fn implied_sum(&self) -> f64 {
        self.avg_price * self.total_count as f64
    }
}

impl Default for AuthoritativeStats {
    fn default() -> Self {
        Self::empty()
    }
}

/// How the directory collaborator selects input files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryOptions {
    /// File extension (without the dot) of eligible inputs.
    pub extension: String,
    /// Regular expression; file names matching it are skipped.
    pub exclude_pattern: String,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            extension: "csv".to_string(),
            exclude_pattern: "validation".to_string(),
        }
    }
}

/// Options for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// Table rows are appended to and aggregated from.
    pub table: String,
    /// Wrap the whole run in one store transaction.
    pub atomic: bool,
    pub discovery: DiscoveryOptions,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            table: DEFAULT_TABLE.to_string(),
            atomic: false,
            discovery: DiscoveryOptions::default(),
        }
    }
}
