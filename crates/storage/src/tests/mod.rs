//! Test utilities and module declarations for engine tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{ApplyFailure, ApplyPhase, StoreError};
use crate::traits::LedgerStore;
use crate::types::{LedgerEntry, MigrationDefinition};
use crate::{Catalog, CatalogEntry, EmbeddedResolver, FileSource, SqliteLedger};


#[expect(clippy::unwrap_used, reason = "test code")]
pub fn create_test_ledger() -> SqliteLedger {
    SqliteLedger::in_memory().unwrap()
}

pub fn def(id: &str, body: &str) -> MigrationDefinition {
    MigrationDefinition::new(id, format!("migration {id}"), body)
}

#[expect(clippy::unwrap_used, reason = "test code")]
pub fn table_exists(ledger: &SqliteLedger, name: &str) -> bool {
    ledger
        .with_connection(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [name],
                |row| row.get::<_, i64>(0),
            )
        })
        .unwrap()
        > 0
}

/// File source over an embedded resolver holding only `files`.
#[expect(clippy::unwrap_used, reason = "test code")]
pub fn embedded_source(ids: &[&str], files: &[(&str, &str)]) -> FileSource {
    let catalog = Catalog::new(
        ids.iter()
            .map(|id| CatalogEntry::new(*id, format!("migration {id}"), format!("{id}.sql")))
            .collect(),
    )
    .unwrap();
    let resolver = files
        .iter()
        .fold(EmbeddedResolver::new(), |r, (name, sql)| r.with_file(*name, *sql));
    FileSource::with_resolvers(catalog, vec![Box::new(resolver)])
}

/// In-memory store recording every call, with injectable failures.
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<FakeState>,
}

#[derive(Default)]
pub struct FakeState {
    pub ledger: BTreeMap<String, String>,
    pub events: Vec<String>,
    pub fail_ensure: bool,
    pub fail_load: bool,
    pub fail_commit_for: Option<String>,
    pub fail_execute_for: Option<String>,
}

impl FakeStore {
    pub fn with_state(state: FakeState) -> Self {
        Self { state: Mutex::new(state) }
    }

    #[expect(clippy::unwrap_used, reason = "test code")]
    pub fn events(&self) -> Vec<String> {
        self.state.lock().unwrap().events.clone()
    }

    #[expect(clippy::unwrap_used, reason = "test code")]
    pub fn ledger_ids(&self) -> Vec<String> {
        self.state.lock().unwrap().ledger.keys().cloned().collect()
    }

    fn with<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut state)
    }
}

#[async_trait]
impl LedgerStore for FakeStore {
    async fn ensure_table(&self) -> Result<(), StoreError> {
        self.with(|s| {
            s.events.push("ensure".into());
            if s.fail_ensure {
                return Err(StoreError::Join("permission denied".into()));
            }
            Ok(())
        })
    }

    async fn load_applied_ids(&self) -> Result<BTreeSet<String>, StoreError> {
        self.with(|s| {
            s.events.push("load".into());
            if s.fail_load {
                return Err(StoreError::Join("connection reset".into()));
            }
            Ok(s.ledger.keys().cloned().collect())
        })
    }

    async fn entries(&self) -> Result<Vec<LedgerEntry>, StoreError> {
        self.with(|s| {
            Ok(s.ledger
                .iter()
                .map(|(id, description)| LedgerEntry {
                    id: id.clone(),
                    description: description.clone(),
                    applied_at: Utc::now(),
                })
                .collect())
        })
    }

    async fn apply(&self, migration: &MigrationDefinition) -> Result<(), ApplyFailure> {
        self.with(|s| {
            s.events.push(format!("apply:{}", migration.id));
            if s.fail_execute_for.as_deref() == Some(migration.id.as_str()) {
                return Err(ApplyFailure::new(
                    ApplyPhase::Execute,
                    StoreError::Join("syntax error".into()),
                ));
            }
            if s.fail_commit_for.as_deref() == Some(migration.id.as_str()) {
                // commit outcome unknown: the fake pretends it landed
                s.ledger.insert(migration.id.clone(), migration.description.clone());
                return Err(ApplyFailure::new(
                    ApplyPhase::Commit,
                    StoreError::Join("connection lost during commit".into()),
                ));
            }
            if s.ledger.contains_key(&migration.id) {
                return Err(ApplyFailure::new(
                    ApplyPhase::Record,
                    StoreError::Duplicate(migration.id.clone()),
                ));
            }
            s.ledger.insert(migration.id.clone(), migration.description.clone());
            Ok(())
        })
    }

    async fn lock(&self) -> Result<(), StoreError> {
        self.with(|s| s.events.push("lock".into()));
        Ok(())
    }

    async fn unlock(&self) -> Result<(), StoreError> {
        self.with(|s| s.events.push("unlock".into()));
        Ok(())
    }
}
