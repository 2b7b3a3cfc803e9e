use perftrack_core::MigrateSettings;
use perftrack_storage::{LedgerBackend, MigrationRunner};

pub(crate) async fn run(settings: &MigrateSettings) -> anyhow::Result<()> {
    let store = LedgerBackend::connect(&settings.database).await?;
    let runner = MigrationRunner::new(super::builtin_source(settings), store);
    let statuses = runner.status().await?;
    println!("{}", serde_json::to_string_pretty(&statuses)?);
    Ok(())
}
