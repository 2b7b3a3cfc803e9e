//! Ledger bootstrap: make sure the ledger table exists before anything reads it.

use crate::error::MigrationError;
use crate::traits::LedgerStore;

/// Create or verify the ledger table. Idempotent; failure blocks startup.
pub async fn bootstrap_ledger<L: LedgerStore + ?Sized>(store: &L) -> Result<(), MigrationError> {
    store.ensure_table().await.map_err(MigrationError::Bootstrap)?;
    tracing::info!("ledger table created/verified");
    Ok(())
}
