mod bootstrap;
mod report;

use anyhow::Result;
use ingest_core::settings::Settings;
use ingest_data::store::SqliteStore;
use ingest_runtime::orchestrator::PipelineOrchestrator;
use ingest_runtime::reconciliation::reconcile;

fn main() -> Result<()> {
    let settings = Settings::load()?;

    bootstrap::ensure_directories()?;
    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_deref())?;

    tracing::info!("Batch Ingest v{} starting", env!("CARGO_PKG_VERSION"));

    let database = settings.database_path();
    tracing::info!(
        "Directory: {}, validation file: {}, store: {} (table {})",
        settings.directory.display(),
        settings.validation_file.display(),
        database.display(),
        settings.table
    );

    let mut store = SqliteStore::open(&database)?;
    let mut orchestrator = PipelineOrchestrator::new(settings.pipeline_options());
    let outcome = orchestrator.run(&mut store, &settings.directory, &settings.validation_file)?;

    let reconciliation = reconcile(&store, &settings.table, &outcome, settings.tolerance)?;

    match settings.format.as_str() {
        "json" => println!("{}", report::render_json(&outcome, &reconciliation)?),
        _ => println!("{}", report::render_text(&outcome, &reconciliation)),
    }

    if settings.strict && !reconciliation.is_consistent() {
        anyhow::bail!(
            "reconciliation found {} discrepancies for batch {}",
            reconciliation.discrepancies.len(),
            reconciliation.batch
        );
    }

    Ok(())
}
