//! Ledger store trait abstraction.
//!
//! One implementation per database backend. The store owns the single
//! connection a run uses; nothing else writes the ledger table.

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::error::{ApplyFailure, StoreError};
use crate::types::{LedgerEntry, MigrationDefinition};

/// Ledger and transactional apply operations.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Create the ledger table if absent. Safe on every start.
    async fn ensure_table(&self) -> Result<(), StoreError>;

    /// Ids of every migration recorded in the ledger.
    async fn load_applied_ids(&self) -> Result<BTreeSet<String>, StoreError>;

    /// All ledger rows ordered by id.
    async fn entries(&self) -> Result<Vec<LedgerEntry>, StoreError>;

    /// Execute the body and insert its ledger row in one transaction.
    ///
    /// On `Begin`, `Execute` or `Record` failure the transaction has been
    /// rolled back. A `Commit` failure leaves the outcome to the database.
    async fn apply(&self, migration: &MigrationDefinition) -> Result<(), ApplyFailure>;

    /// Serialize runs across processes. Held from before the ledger read
    /// until the last migration is processed.
    async fn lock(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn unlock(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
