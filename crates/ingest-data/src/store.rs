//! Append-only persistence for stamped rows.
//!
//! [`Store`] is the narrow interface the pipeline consumes; [`SqliteStore`]
//! is the shipped implementation.

use std::collections::HashSet;
use std::path::Path;

use ingest_core::error::{IngestError, Result};
use ingest_core::models::{AuthoritativeStats, Provenance, Row, StampedRow, PRICE_FIELD};
use ingest_core::BatchToken;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

// ── Store trait ───────────────────────────────────────────────────────────────

/// Append-only tabular store.
///
/// `append` is not idempotent: appending the same rows twice stores them twice.
pub trait Store {
    /// Append `rows` to `table`; all or none of them become visible.
    fn append(&mut self, table: &str, rows: &[StampedRow]) -> Result<usize>;

    /// Count, mean and extremes of `field` over every row of `table`.
    fn query_aggregate(&self, table: &str, field: &str) -> Result<AuthoritativeStats>;

    /// Same as [`Store::query_aggregate`], restricted to one batch.
    fn query_aggregate_for_batch(
        &self,
        table: &str,
        field: &str,
        batch: &BatchToken,
    ) -> Result<AuthoritativeStats>;

    /// Open a transaction spanning subsequent appends.
    fn begin(&mut self) -> Result<()>;

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;
}

// ── SqliteStore ───────────────────────────────────────────────────────────────

/// [`Store`] backed by a single SQLite connection.
///
/// Tables are created on first append. Pass-through columns are kept as a
/// JSON object in `fields`.
pub struct SqliteStore {
    conn: Connection,
    ensured: HashSet<String>,
    in_transaction: bool,
}

impl SqliteStore {
    /// Open (or create) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let location = path.display().to_string();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| IngestError::store_open(&location, e))?;
            }
        }

        let conn = Connection::open(path).map_err(|e| IngestError::store_open(&location, e))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| IngestError::store_open(&location, e))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|e| IngestError::store_open(&location, e))?;

        debug!("Opened store at {}", location);
        Ok(Self::from_connection(conn))
    }

    /// Private in-memory database, discarded on drop.
    pub fn open_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| IngestError::store_open(":memory:", e))?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            ensured: HashSet::new(),
            in_transaction: false,
        }
    }

    /// Every row of `batch` in insertion order.
    pub fn fetch_batch(&self, table: &str, batch: &BatchToken) -> Result<Vec<StampedRow>> {
        let sql = format!(
            "SELECT price, fields, source_file, batch_uuid, file_size FROM {} \
             WHERE batch_uuid = ?1 ORDER BY id",
            quote_ident(table)
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| IngestError::query(table, e))?;

        let raw = stmt
            .query_map(params![batch.as_str()], |row| {
                Ok((
                    row.get::<_, f64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })
            .map_err(|e| IngestError::query(table, e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| IngestError::query(table, e))?;

        raw.into_iter()
            .map(|(price, fields, source_file, batch_uuid, file_size)| -> Result<StampedRow> {
                Ok(StampedRow {
                    row: Row {
                        price,
                        fields: decode_fields(&fields).map_err(|e| IngestError::query(table, e))?,
                    },
                    provenance: Provenance {
                        source_file,
                        batch_uuid,
                        file_size: file_size.max(0) as u64,
                    },
                })
            })
            .collect()
    }

    /// Number of rows in `table`, or zero when it does not exist yet.
    pub fn row_count(&self, table: &str) -> Result<u64> {
        let exists: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![table],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| IngestError::query(table, e))?;
        if exists.is_none() {
            return Ok(0);
        }

        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        let count: i64 = self
            .conn
            .query_row(&sql, [], |row| row.get(0))
            .map_err(|e| IngestError::query(table, e))?;
        Ok(count as u64)
    }

    fn ensure_table(&mut self, table: &str) -> Result<()> {
        if self.ensured.contains(table) {
            return Ok(());
        }

        let ident = quote_ident(table);
        let index = quote_ident(&format!("idx_{}_batch_uuid", table));
        self.conn
            .execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {ident} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    price REAL NOT NULL,
                    fields TEXT NOT NULL,
                    source_file TEXT NOT NULL,
                    batch_uuid TEXT NOT NULL,
                    file_size INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS {index} ON {ident}(batch_uuid);"
            ))
            .map_err(|e| IngestError::store_write(table, e))?;

        self.ensured.insert(table.to_string());
        Ok(())
    }

    fn aggregate(
        &self,
        table: &str,
        field: &str,
        batch: Option<&BatchToken>,
    ) -> Result<AuthoritativeStats> {
        if !NUMERIC_COLUMNS.contains(&field) {
            return Err(IngestError::query(
                table,
                format!("no numeric column named {:?}", field),
            ));
        }
        let column = quote_ident(field);
        let mut sql = format!(
            "SELECT COUNT(*), AVG({column}), MIN({column}), MAX({column}) FROM {}",
            quote_ident(table)
        );
        if batch.is_some() {
            sql.push_str(" WHERE batch_uuid = ?1");
        }

        type AggRow = (i64, Option<f64>, Option<f64>, Option<f64>);
        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<AggRow> {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, Option<f64>>(1)?,
                row.get::<_, Option<f64>>(2)?,
                row.get::<_, Option<f64>>(3)?,
            ))
        };
        let (count, avg, min, max) = match batch {
            Some(b) => self.conn.query_row(&sql, params![b.as_str()], map_row),
            None => self.conn.query_row(&sql, [], map_row),
        }
        .map_err(|e| IngestError::query(table, e))?;

        if count == 0 {
            return Ok(AuthoritativeStats::empty());
        }
        Ok(AuthoritativeStats {
            total_count: count as u64,
            avg_price: avg.unwrap_or(0.0),
            min_price: min.unwrap_or(f64::INFINITY),
            max_price: max.unwrap_or(f64::NEG_INFINITY),
        })
    }
}

impl Store for SqliteStore {
    fn append(&mut self, table: &str, rows: &[StampedRow]) -> Result<usize> {
        self.ensure_table(table)?;

        // A savepoint nests inside an outer `begin` and acts as its own
        // transaction otherwise.
        let sp = self
            .conn
            .savepoint()
            .map_err(|e| IngestError::store_write(table, e))?;
        {
            let sql = format!(
                "INSERT INTO {} (price, fields, source_file, batch_uuid, file_size) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                quote_ident(table)
            );
            let mut stmt = sp
                .prepare(&sql)
                .map_err(|e| IngestError::store_write(table, e))?;
            for stamped in rows {
                let file_size = i64::try_from(stamped.provenance.file_size)
                    .map_err(|e| IngestError::store_write(table, e))?;
                stmt.execute(params![
                    stamped.row.price,
                    stamped.row.fields_json().to_string(),
                    stamped.provenance.source_file,
                    stamped.provenance.batch_uuid,
                    file_size,
                ])
                .map_err(|e| IngestError::store_write(table, e))?;
            }
        }
        sp.commit().map_err(|e| IngestError::store_write(table, e))?;

        debug!("Appended {} rows to {}", rows.len(), table);
        Ok(rows.len())
    }

    fn query_aggregate(&self, table: &str, field: &str) -> Result<AuthoritativeStats> {
        self.aggregate(table, field, None)
    }

    fn query_aggregate_for_batch(
        &self,
        table: &str,
        field: &str,
        batch: &BatchToken,
    ) -> Result<AuthoritativeStats> {
        self.aggregate(table, field, Some(batch))
    }

    fn begin(&mut self) -> Result<()> {
        self.conn
            .execute_batch("BEGIN")
            .map_err(|e| IngestError::store_write("<transaction>", e))?;
        self.in_transaction = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.conn
            .execute_batch("COMMIT")
            .map_err(|e| IngestError::store_write("<transaction>", e))?;
        self.in_transaction = false;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.in_transaction = false;
        // Tables created inside the rolled-back transaction are gone too.
        self.ensured.clear();
        self.conn
            .execute_batch("ROLLBACK")
            .map_err(|e| IngestError::store_write("<transaction>", e))
    }
}

impl Drop for SqliteStore {
    fn drop(&mut self) {
        if self.in_transaction {
            let _ = self.conn.execute_batch("ROLLBACK");
        }
    }
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Columns an aggregate may be computed over.
const NUMERIC_COLUMNS: [&str; 1] = [PRICE_FIELD];

/// Quote an SQL identifier, doubling any embedded quotes.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn decode_fields(json: &str) -> std::result::Result<Vec<(String, String)>, serde_json::Error> {
    let map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json)?;
    Ok(map
        .into_iter()
        .map(|(k, v)| {
            let v = match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (k, v)
        })
        .collect())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
