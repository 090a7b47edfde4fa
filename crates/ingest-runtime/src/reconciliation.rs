//! Authoritative recomputation and the reconciliation check.
//!
//! The running statistics are built in memory while files load; the
//! authoritative ones are recomputed from the store. The two are scoped
//! differently (one run vs. the whole store), so the check compares the
//! running statistics with the store restricted to the run's batch, and
//! reports the remainder of the store as foreign rows.

use ingest_core::error::Result;
use ingest_core::models::{AuthoritativeStats, PRICE_FIELD};
use ingest_core::BatchToken;
use ingest_data::aggregator::RunningStats;
use ingest_data::store::Store;
use serde::Serialize;

use crate::orchestrator::RunOutcome;

/// Default absolute tolerance for mean and sum comparisons.
pub const DEFAULT_TOLERANCE: f64 = 1e-9;

// ── Recomputation ─────────────────────────────────────────────────────────────

/// Recompute price statistics over every row of `table`, all batches included.
pub fn recompute<S: Store + ?Sized>(store: &S, table: &str) -> Result<AuthoritativeStats> {
    store.query_aggregate(table, PRICE_FIELD)
}

/// Recompute price statistics over the rows of one batch.
pub fn recompute_batch<S: Store + ?Sized>(
    store: &S,
    table: &str,
    batch: &BatchToken,
) -> Result<AuthoritativeStats> {
    store.query_aggregate_for_batch(table, PRICE_FIELD, batch)
}

// ── Report types ──────────────────────────────────────────────────────────────

/// Statistic a discrepancy was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

/// One statistic on which the running and stored values disagree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Discrepancy {
    pub metric: Metric,
    pub running: f64,
    pub stored: f64,
}

/// Outcome of comparing a run's running statistics with the store.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub batch: BatchToken,
    pub running: RunningStats,
    /// Store statistics restricted to `batch`.
    pub batch_scope: AuthoritativeStats,
    /// Store statistics over every batch.
    pub whole_store: AuthoritativeStats,
    /// Rows in the store that this run did not load.
    pub foreign_rows: u64,
    pub discrepancies: Vec<Discrepancy>,
}

impl ReconciliationReport {
    pub fn is_consistent(&self) -> bool {
        self.discrepancies.is_empty()
    }
}

// ── Check ─────────────────────────────────────────────────────────────────────

/// Compare `outcome` with what the store holds now.
///
/// Divergence never fails the call; it is recorded in the report. Only a
/// failing store query is an error.
pub fn reconcile<S: Store + ?Sized>(
    store: &S,
    table: &str,
    outcome: &RunOutcome,
    tolerance: f64,
) -> Result<ReconciliationReport> {
    let running = outcome.after_validation;
    let batch_scope = recompute_batch(store, table, &outcome.batch)?;
    let whole_store = outcome.authoritative;

    let discrepancies = compare(&running, &batch_scope, tolerance);
    let foreign_rows = whole_store.total_count.saturating_sub(running.count);

    if discrepancies.is_empty() {
        tracing::debug!(batch = %outcome.batch, foreign_rows, "reconciliation consistent");
    } else {
        for d in &discrepancies {
            tracing::warn!(
                batch = %outcome.batch,
                metric = ?d.metric,
                running = d.running,
                stored = d.stored,
                "running statistics diverge from the store"
            );
        }
    }

    Ok(ReconciliationReport {
        batch: outcome.batch.clone(),
        running,
        batch_scope,
        whole_store,
        foreign_rows,
        discrepancies,
    })
}

/// Metrics on which `running` and `stored` disagree.
///
/// Count and extremes must match exactly. Mean and sum may differ by
/// `tolerance`, scaled by the magnitude of the values once they exceed 1.
pub fn compare(
    running: &RunningStats,
    stored: &AuthoritativeStats,
    tolerance: f64,
) -> Vec<Discrepancy> {
    let mut out = Vec::new();

    if running.count != stored.total_count {
        out.push(Discrepancy {
            metric: Metric::Count,
            running: running.count as f64,
            stored: stored.total_count as f64,
        });
    }
    // Extremes of two empty scopes are both infinite and compare equal.
    if running.min_price != stored.min_price {
        out.push(Discrepancy {
            metric: Metric::Min,
            running: running.min_price,
            stored: stored.min_price,
        });
    }
    if running.max_price != stored.max_price {
        out.push(Discrepancy {
            metric: Metric::Max,
            running: running.max_price,
            stored: stored.max_price,
        });
    }
    if !approx_eq(running.avg_price, stored.avg_price, tolerance) {
        out.push(Discrepancy {
            metric: Metric::Avg,
            running: running.avg_price,
            stored: stored.avg_price,
        });
    }
    if !approx_eq(running.sum_price, stored.implied_sum(), tolerance) {
        out.push(Discrepancy {
            metric: Metric::Sum,
            running: running.sum_price,
            stored: stored.implied_sum(),
        });
    }

    out
}

fn approx_eq(a: f64, b: f64, tolerance: f64) -> bool {
    let scale = a.abs().max(b.abs()).max(1.0);
    (a - b).abs() <= tolerance * scale
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use ingest_core::models::Row;

    fn running(prices: &[f64]) -> RunningStats {
        let rows: Vec<Row> = prices.iter().copied().map(Row::with_price).collect();
        RunningStats::new().update(&rows)
    }

    fn stored(count: u64, avg: f64, min: f64, max: f64) -> AuthoritativeStats {
        AuthoritativeStats {
            total_count: count,
            avg_price: avg,
            min_price: min,
            max_price: max,
        }
    }

    // ── compare ───────────────────────────────────────────────────────────

    #[test]
    fn test_compare_matching() {
        let r = running(&[10.0, 20.0, 30.0, 40.0]);
        assert!(compare(&r, &stored(4, 25.0, 10.0, 40.0), DEFAULT_TOLERANCE).is_empty());
    }

    #[test]
    fn test_compare_both_empty() {
        let r = RunningStats::new();
        assert!(compare(&r, &AuthoritativeStats::empty(), DEFAULT_TOLERANCE).is_empty());
    }

    #[test]
    fn test_compare_count_mismatch() {
        let r = running(&[10.0, 20.0]);
        let d = compare(&r, &stored(3, 15.0, 10.0, 20.0), DEFAULT_TOLERANCE);
        let metrics: Vec<Metric> = d.iter().map(|x| x.metric).collect();
        assert!(metrics.contains(&Metric::Count));
        // 3 * 15 = 45 vs running sum 30.
        assert!(metrics.contains(&Metric::Sum));
        assert!(!metrics.contains(&Metric::Avg));
    }

    #[test]
    fn test_compare_extreme_mismatch() {
        let r = running(&[10.0, 20.0]);
        let d = compare(&r, &stored(2, 15.0, 5.0, 25.0), DEFAULT_TOLERANCE);
        let metrics: Vec<Metric> = d.iter().map(|x| x.metric).collect();
        assert_eq!(metrics, vec![Metric::Min, Metric::Max]);
    }

    #[test]
    fn test_compare_avg_within_tolerance() {
        let r = running(&[0.1, 0.2, 0.3]);
        let nudged = r.avg_price + 1e-15;
        let s = stored(3, nudged, r.min_price, r.max_price);
        assert!(compare(&r, &s, DEFAULT_TOLERANCE).is_empty());

        let far = stored(3, r.avg_price + 1e-3, r.min_price, r.max_price);
        let d = compare(&r, &far, DEFAULT_TOLERANCE);
        assert!(d.iter().any(|x| x.metric == Metric::Avg));
    }

    #[test]
    fn test_approx_eq_scales_with_magnitude() {
        assert!(approx_eq(1e12, 1e12 + 1.0, 1e-9));
        assert!(!approx_eq(1.0, 1.0 + 1e-6, 1e-9));
        assert!(approx_eq(0.0, 0.0, 0.0));
    }

    #[test]
    fn test_report_is_consistent() {
        let report = ReconciliationReport {
            batch: BatchToken::from_string("b"),
            running: RunningStats::new(),
            batch_scope: AuthoritativeStats::empty(),
            whole_store: AuthoritativeStats::empty(),
            foreign_rows: 0,
            discrepancies: vec![],
        };
        assert!(report.is_consistent());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["batch"], "b");
        assert!(json["discrepancies"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_metric_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Metric::Avg).unwrap(), r#""avg""#);
    }
}
