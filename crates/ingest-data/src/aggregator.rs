//! Running price statistics over incrementally supplied row sets.

use ingest_core::models::Row;
use serde::Serialize;

// ── RunningStats ──────────────────────────────────────────────────────────────

/// Count, sum, extremes and mean of `price` over every row folded in so far.
///
/// Raw rows are never retained. An empty aggregate has `min_price = +∞`,
/// `max_price = -∞` and `avg_price = 0`; otherwise
/// `avg_price == sum_price / count` exactly.
///
/// `sum_price` is a compensated (Neumaier) sum, so cancelling magnitudes such
/// as `1e16, 1, -1e16` keep their small terms, matching what SQLite's `AVG`
/// computes over the same rows.
///
/// Exactness of the mean takes priority over ordering: after rounding,
/// `avg_price` may land one ulp outside `[min_price, max_price]` (three rows
/// of `0.1` give a mean of `0.10000000000000002`). It is never clamped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunningStats {
    pub count: u64,
    pub sum_price: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub avg_price: f64,
    #[serde(skip)]
    partial_sum: f64,
    #[serde(skip)]
    compensation: f64,
}

impl RunningStats {
    /// The empty aggregate, identity of [`RunningStats::merge`].
    pub fn new() -> Self {
        Self {
            count: 0,
            sum_price: 0.0,
            min_price: f64::INFINITY,
            max_price: f64::NEG_INFINITY,
            avg_price: 0.0,
            partial_sum: 0.0,
            compensation: 0.0,
        }
    }

    /// Partial aggregate of a single row set.
    pub fn from_rows(rows: &[Row]) -> Self {
        let mut partial = Self::new();
        partial.count = rows.len() as u64;
        for row in rows {
            partial.add_to_sum(row.price);
            partial.min_price = partial.min_price.min(row.price);
            partial.max_price = partial.max_price.max(row.price);
        }
        partial.refresh();
        partial
    }

    /// Fold a freshly loaded row set into the aggregate.
    pub fn update(self, rows: &[Row]) -> Self {
        self.merge(Self::from_rows(rows))
    }

    /// Combine two independently computed aggregates.
    ///
    /// This is the reduction the loader uses: each file yields a partial via
    /// [`RunningStats::from_rows`] that is merged into the run's aggregate.
    /// Count and extremes combine associatively and commutatively, so
    /// per-file partials can be merged in any grouping.
    pub fn merge(self, other: Self) -> Self {
        let mut merged = Self {
            count: self.count + other.count,
            min_price: self.min_price.min(other.min_price),
            max_price: self.max_price.max(other.max_price),
            ..self
        };
        merged.add_to_sum(other.partial_sum);
        merged.compensation += other.compensation;
        merged.refresh();
        merged
    }

    fn add_to_sum(&mut self, value: f64) {
        let total = self.partial_sum + value;
        if self.partial_sum.abs() >= value.abs() {
            self.compensation += (self.partial_sum - total) + value;
        } else {
            self.compensation += (value - total) + self.partial_sum;
        }
        self.partial_sum = total;
    }

    fn refresh(&mut self) {
        self.sum_price = self.partial_sum + self.compensation;
        self.avg_price = if self.count > 0 {
            self.sum_price / self.count as f64
        } else {
            0.0
        };
    }
}

impl Default for RunningStats {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
