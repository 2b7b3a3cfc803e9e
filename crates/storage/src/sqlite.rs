//! `SQLite` ledger store.
//!
//! rusqlite is synchronous, so every operation runs on the tokio blocking
//! pool against the one connection this store owns.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{params, Connection, Transaction, TransactionBehavior};

use crate::error::{ApplyFailure, ApplyPhase, StoreError};
use crate::ledger::{
    parse_applied_at, CREATE_LEDGER_SQL, INSERT_ENTRY_SQLITE, SELECT_APPLIED_IDS_SQL,
    SELECT_ENTRIES_SQL,
};
use crate::traits::LedgerStore;
use crate::types::{LedgerEntry, MigrationDefinition};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Ledger store over a single `SQLite` connection.
#[derive(Clone, Debug)]
pub struct SqliteLedger {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLedger {
    /// Open (creating if needed) the database file at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        tracing::info!("opening sqlite database at {}", path.display());
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Self::from_connection(conn))
    }

    /// Private in-memory database, gone when the store is dropped.
    pub fn in_memory() -> Result<Self, StoreError> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self { conn: Arc::new(Mutex::new(conn)) }
    }

    /// Run `f` against the underlying connection, e.g. to inspect the schema.
    pub fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, StoreError> {
        let conn = lock_conn(&self.conn)?;
        Ok(f(&conn)?)
    }

    async fn blocking<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = lock_conn(&conn)?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
    }
}

fn lock_conn(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>, StoreError> {
    conn.lock().map_err(|_| StoreError::LockPoisoned)
}

/// Insert the ledger row for `id` inside `tx`.
pub(crate) fn record_application(
    tx: &Transaction<'_>,
    id: &str,
    description: &str,
) -> Result<(), StoreError> {
    tx.execute(INSERT_ENTRY_SQLITE, params![id, description])?;
    Ok(())
}

fn rollback(tx: Transaction<'_>, id: &str) {
    if let Err(e) = tx.rollback() {
        tracing::warn!(id, "rollback failed: {}", e);
    }
}

fn apply_blocking(conn: &mut Connection, migration: &MigrationDefinition) -> Result<(), ApplyFailure> {
    // IMMEDIATE takes the write lock up front so a concurrent writer fails at begin.
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| ApplyFailure::new(ApplyPhase::Begin, e))?;

    if let Err(e) = tx.execute_batch(&migration.body) {
        rollback(tx, &migration.id);
        return Err(ApplyFailure::new(ApplyPhase::Execute, e));
    }

    if let Err(e) = record_application(&tx, &migration.id, &migration.description) {
        rollback(tx, &migration.id);
        return Err(ApplyFailure::new(ApplyPhase::Record, e));
    }

    tx.commit().map_err(|e| ApplyFailure::new(ApplyPhase::Commit, e))
}

#[async_trait]
impl LedgerStore for SqliteLedger {
    async fn ensure_table(&self) -> Result<(), StoreError> {
        self.blocking(|conn| {
            conn.execute_batch(CREATE_LEDGER_SQL)?;
            Ok(())
        })
        .await
    }

    async fn load_applied_ids(&self) -> Result<BTreeSet<String>, StoreError> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare(SELECT_APPLIED_IDS_SQL)?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<BTreeSet<String>>>()?;
            Ok(ids)
        })
        .await
    }

    async fn entries(&self) -> Result<Vec<LedgerEntry>, StoreError> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare(SELECT_ENTRIES_SQL)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            rows.into_iter()
                .map(|(id, description, raw)| -> Result<LedgerEntry, StoreError> {
                    let raw = raw.ok_or_else(|| StoreError::Corrupt {
                        id: id.clone(),
                        detail: "applied_at is NULL".to_owned(),
                    })?;
                    let applied_at = parse_applied_at(&id, &raw)?;
                    Ok(LedgerEntry { id, description, applied_at })
                })
                .collect()
        })
        .await
    }

    async fn apply(&self, migration: &MigrationDefinition) -> Result<(), ApplyFailure> {
        let conn = Arc::clone(&self.conn);
        let migration = migration.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard =
                lock_conn(&conn).map_err(|e| ApplyFailure::new(ApplyPhase::Begin, e))?;
            apply_blocking(&mut guard, &migration)
        })
        .await
        .map_err(|e| ApplyFailure::new(ApplyPhase::Execute, StoreError::Join(e.to_string())))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(ledger: &SqliteLedger, name: &str) -> bool {
        ledger
            .with_connection(|conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    params![name],
                    |row| row.get::<_, i64>(0),
                )
            })
            .unwrap()
            > 0
    }

    #[tokio::test]
    async fn ensure_table_is_repeatable_and_keeps_rows() {
        let ledger = SqliteLedger::in_memory().unwrap();
        ledger.ensure_table().await.unwrap();
        ledger
            .apply(&MigrationDefinition::new("001_a", "first", "CREATE TABLE a(id INTEGER);"))
            .await
            .unwrap();

        ledger.ensure_table().await.unwrap();
        ledger.ensure_table().await.unwrap();

        let entries = ledger.entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "001_a");
        assert_eq!(entries[0].description, "first");
    }

    #[tokio::test]
    async fn apply_executes_body_and_records_row() {
        let ledger = SqliteLedger::in_memory().unwrap();
        ledger.ensure_table().await.unwrap();

        ledger
            .apply(&MigrationDefinition::new(
                "001_initial_setup",
                "setup",
                "CREATE TABLE foo(id int); INSERT INTO foo VALUES (1);",
            ))
            .await
            .unwrap();

        assert!(table_exists(&ledger, "foo"));
        let ids = ledger.load_applied_ids().await.unwrap();
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec!["001_initial_setup".to_owned()]);
    }

    #[tokio::test]
    async fn failing_body_rolls_back_partial_ddl() {
        let ledger = SqliteLedger::in_memory().unwrap();
        ledger.ensure_table().await.unwrap();

        let failure = ledger
            .apply(&MigrationDefinition::new(
                "002_b",
                "half broken",
                "CREATE TABLE partial(id int); INSERT INTO no_such_table VALUES (1);",
            ))
            .await
            .unwrap_err();

        assert_eq!(failure.phase, ApplyPhase::Execute);
        assert!(!table_exists(&ledger, "partial"));
        assert!(ledger.load_applied_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn body_constraint_failure_is_not_a_duplicate() {
        let ledger = SqliteLedger::in_memory().unwrap();
        ledger.ensure_table().await.unwrap();

        let failure = ledger
            .apply(&MigrationDefinition::new(
                "001_a",
                "not null",
                "CREATE TABLE a(id int NOT NULL); INSERT INTO a VALUES (NULL);",
            ))
            .await
            .unwrap_err();

        assert_eq!(failure.phase, ApplyPhase::Execute);
        assert!(!failure.source.is_duplicate());
        assert!(matches!(failure.source, StoreError::Sqlite(_)));
        assert!(!table_exists(&ledger, "a"));
    }

    #[tokio::test]
    async fn ledger_write_failure_undoes_body() {
        let ledger = SqliteLedger::in_memory().unwrap();
        ledger.ensure_table().await.unwrap();
        ledger
            .with_connection(|conn| {
                conn.execute(
                    "INSERT INTO schema_migrations (id, description) VALUES ('003_c', 'other')",
                    [],
                )
            })
            .unwrap();

        let failure = ledger
            .apply(&MigrationDefinition::new("003_c", "dup", "CREATE TABLE racing(id int);"))
            .await
            .unwrap_err();

        assert_eq!(failure.phase, ApplyPhase::Record);
        assert!(failure.source.is_duplicate());
        assert!(!table_exists(&ledger, "racing"));
        let entries = ledger.entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].description, "other");
    }

    #[tokio::test]
    async fn load_applied_ids_without_table_is_an_error() {
        let ledger = SqliteLedger::in_memory().unwrap();
        assert!(ledger.load_applied_ids().await.is_err());
    }
}
