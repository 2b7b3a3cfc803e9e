//! PostgreSQL ledger store using sqlx.
//!
//! The store owns exactly one connection for the whole run so the
//! session-scoped advisory lock and every migration transaction share a
//! backend session.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use perftrack_core::{
    env_parse_with_default, ENV_PG_CONNECT_TIMEOUT, MIGRATION_LOCK_KEY, PG_CONNECT_TIMEOUT_SECS,
};
use sqlx::{Connection, Executor, PgConnection, Postgres, Transaction};
use tokio::sync::Mutex;

use crate::error::{ApplyFailure, ApplyPhase, StoreError};
use crate::ledger::{CREATE_LEDGER_SQL, INSERT_ENTRY_PG, SELECT_APPLIED_IDS_SQL, SELECT_ENTRIES_SQL};
use crate::traits::LedgerStore;
use crate::types::{LedgerEntry, MigrationDefinition};

#[derive(Debug)]
pub struct PgLedger {
    conn: Mutex<PgConnection>,
}

impl PgLedger {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let secs = env_parse_with_default(ENV_PG_CONNECT_TIMEOUT, PG_CONNECT_TIMEOUT_SECS);
        let conn =
            tokio::time::timeout(Duration::from_secs(secs), PgConnection::connect(database_url))
                .await
                .map_err(|_| StoreError::Timeout(secs))??;
        tracing::info!("PgLedger connected");
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: PgConnection) -> Self {
        Self { conn: Mutex::new(conn) }
    }

    /// Close the owned connection gracefully.
    pub async fn close(self) -> Result<(), StoreError> {
        self.conn.into_inner().close().await?;
        Ok(())
    }
}

/// Insert the ledger row for `id` inside `tx`.
pub(crate) async fn record_application(
    tx: &mut Transaction<'_, Postgres>,
    id: &str,
    description: &str,
) -> Result<(), StoreError> {
    sqlx::query(INSERT_ENTRY_PG).bind(id).bind(description).execute(&mut **tx).await?;
    Ok(())
}

async fn rollback(tx: Transaction<'_, Postgres>, id: &str) {
    if let Err(e) = tx.rollback().await {
        tracing::warn!(id, "rollback failed: {}", e);
    }
}

#[async_trait]
impl LedgerStore for PgLedger {
    async fn ensure_table(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().await;
        sqlx::query(CREATE_LEDGER_SQL).execute(&mut *conn).await?;
        Ok(())
    }

    async fn load_applied_ids(&self) -> Result<BTreeSet<String>, StoreError> {
        let mut conn = self.conn.lock().await;
        let ids: Vec<String> =
            sqlx::query_scalar(SELECT_APPLIED_IDS_SQL).fetch_all(&mut *conn).await?;
        Ok(ids.into_iter().collect())
    }

    async fn entries(&self) -> Result<Vec<LedgerEntry>, StoreError> {
        let mut conn = self.conn.lock().await;
        let rows: Vec<(String, String, Option<NaiveDateTime>)> =
            sqlx::query_as(SELECT_ENTRIES_SQL).fetch_all(&mut *conn).await?;
        rows.into_iter()
            .map(|(id, description, applied_at)| -> Result<LedgerEntry, StoreError> {
                let applied_at = applied_at.ok_or_else(|| StoreError::Corrupt {
                    id: id.clone(),
                    detail: "applied_at is NULL".to_owned(),
                })?;
                Ok(LedgerEntry { id, description, applied_at: applied_at.and_utc() })
            })
            .collect()
    }

    async fn apply(&self, migration: &MigrationDefinition) -> Result<(), ApplyFailure> {
        let mut conn = self.conn.lock().await;
        let mut tx = conn.begin().await.map_err(|e| ApplyFailure::new(ApplyPhase::Begin, e))?;

        // raw_sql: bodies may hold several statements and are not prepared.
        if let Err(e) = (&mut *tx).execute(sqlx::raw_sql(&migration.body)).await {
            rollback(tx, &migration.id).await;
            return Err(ApplyFailure::new(ApplyPhase::Execute, e));
        }

        if let Err(e) = record_application(&mut tx, &migration.id, &migration.description).await {
            rollback(tx, &migration.id).await;
            return Err(ApplyFailure::new(ApplyPhase::Record, e));
        }

        tx.commit().await.map_err(|e| ApplyFailure::new(ApplyPhase::Commit, e))
    }

    async fn lock(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().await;
        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(&mut *conn)
            .await?;
        tracing::debug!(key = MIGRATION_LOCK_KEY, "advisory lock acquired");
        Ok(())
    }

    async fn unlock(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().await;
        sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(&mut *conn)
            .await?;
        tracing::debug!(key = MIGRATION_LOCK_KEY, "advisory lock released");
        Ok(())
    }
}
