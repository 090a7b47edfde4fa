use ingest_core::formatting::{format_count, format_price};
use ingest_core::models::AuthoritativeStats;
use ingest_data::aggregator::RunningStats;
use ingest_runtime::reconciliation::{Metric, ReconciliationReport};
use ingest_runtime::RunOutcome;
use serde::Serialize;

/// Run outcome and reconciliation, as emitted by `--format json`.
#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub outcome: &'a RunOutcome,
    pub reconciliation: &'a ReconciliationReport,
}

/// Render the report as pretty-printed JSON. Infinite extremes become `null`.
pub fn render_json(
    outcome: &RunOutcome,
    report: &ReconciliationReport,
) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&RunReport {
        outcome,
        reconciliation: report,
    })
}

/// Render the report as a multi-line human-readable summary.
pub fn render_text(outcome: &RunOutcome, report: &ReconciliationReport) -> String {
    let mut lines = vec![
        format!("{:<20}{}", "Batch:", outcome.batch),
        format!("{:<20}{}", "Files loaded:", outcome.files_loaded.len()),
        format!(
            "{:<20}{:.3}s",
            "Elapsed:",
            (outcome.finished_at - outcome.started_at).num_milliseconds() as f64 / 1000.0
        ),
        String::new(),
        running_line("Before validation:", &outcome.before_validation),
        running_line("After validation:", &outcome.after_validation),
        stored_line("Store (this batch):", &report.batch_scope),
        stored_line("Store (all rows):", &report.whole_store),
        format!("{:<20}{}", "Foreign rows:", format_count(report.foreign_rows)),
        String::new(),
    ];

    if report.is_consistent() {
        lines.push(format!("{:<20}consistent", "Reconciliation:"));
    } else {
        lines.push(format!(
            "{:<20}{} discrepancies",
            "Reconciliation:",
            report.discrepancies.len()
        ));
        for d in &report.discrepancies {
            let (running, stored) = match d.metric {
                Metric::Count => (
                    format_count(d.running as u64),
                    format_count(d.stored as u64),
                ),
                _ => (format_price(d.running), format_price(d.stored)),
            };
            lines.push(format!(
                "  {:<6}running {}, stored {}",
                metric_name(d.metric),
                running,
                stored
            ));
        }
    }

    lines.join("\n")
}

fn running_line(label: &str, s: &RunningStats) -> String {
    format!(
        "{:<20}count {}, sum {}, min {}, max {}, avg {}",
        label,
        format_count(s.count),
        format_price(s.sum_price),
        format_price(s.min_price),
        format_price(s.max_price),
        format_price(s.avg_price)
    )
}

fn stored_line(label: &str, s: &AuthoritativeStats) -> String {
    format!(
        "{:<20}count {}, min {}, max {}, avg {}",
        label,
        format_count(s.total_count),
        format_price(s.min_price),
        format_price(s.max_price),
        format_price(s.avg_price)
    )
}

fn metric_name(metric: Metric) -> &'static str {
    match metric {
        Metric::Count => "count",
        Metric::Sum => "sum",
        Metric::Min => "min",
        Metric::Max => "max",
        Metric::Avg => "avg",
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
