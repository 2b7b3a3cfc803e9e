//! Apply pending migrations and print the run report.

use perftrack_core::{MigrateSettings, LEDGER_TABLE};
use perftrack_storage::{LedgerBackend, MigrationRunner, RunOptions};

pub(crate) async fn run(settings: &MigrateSettings) -> anyhow::Result<()> {
    let store = LedgerBackend::connect(&settings.database).await?;
    let runner = MigrationRunner::new(super::builtin_source(settings), store)
        .with_options(RunOptions { fail_on_missing: settings.fail_on_missing });

    tracing::info!("running database migrations");
    let report = runner.run().await.inspect_err(|e| {
        if e.is_ambiguous() {
            tracing::error!("commit outcome unknown; check {LEDGER_TABLE} before re-running");
        }
    })?;
    tracing::info!("database migrations completed successfully");

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
