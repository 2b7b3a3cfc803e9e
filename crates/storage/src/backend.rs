//! Unified ledger backend with enum dispatch.

use std::collections::BTreeSet;

use async_trait::async_trait;
use perftrack_core::DatabaseTarget;

use crate::error::{ApplyFailure, StoreError};
use crate::traits::LedgerStore;
use crate::types::{LedgerEntry, MigrationDefinition};

macro_rules! dispatch {
    ($self:expr, $method:ident ( $($arg:expr),* $(,)? )) => {
        match $self {
            #[cfg(feature = "sqlite")]
            LedgerBackend::Sqlite(s) => <crate::SqliteLedger as LedgerStore>::$method(s, $($arg),*).await,
            #[cfg(feature = "postgres")]
            LedgerBackend::Postgres(s) => <crate::PgLedger as LedgerStore>::$method(s, $($arg),*).await,
        }
    };
}

/// Backend-selected error when a target needs a feature this build lacks.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("{0} support not compiled in (enable the `{0}` feature)")]
    Unsupported(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug)]
pub enum LedgerBackend {
    #[cfg(feature = "sqlite")]
    Sqlite(crate::SqliteLedger),
    #[cfg(feature = "postgres")]
    Postgres(crate::PgLedger),
}

impl LedgerBackend {
    /// Open the store `target` points at.
    pub async fn connect(target: &DatabaseTarget) -> Result<Self, ConnectError> {
        tracing::info!(backend = target.backend_name(), "connecting to {}", target);
        match target {
            #[cfg(feature = "sqlite")]
            DatabaseTarget::Sqlite { path } => Ok(Self::Sqlite(crate::SqliteLedger::open(path)?)),
            #[cfg(feature = "sqlite")]
            DatabaseTarget::SqliteMemory => Ok(Self::Sqlite(crate::SqliteLedger::in_memory()?)),
            #[cfg(feature = "postgres")]
            DatabaseTarget::Postgres { url } => Ok(Self::Postgres(crate::PgLedger::connect(url).await?)),
            #[allow(unreachable_patterns, reason = "reachable only when a backend feature is off")]
            other => Err(ConnectError::Unsupported(other.backend_name())),
        }
    }
}

#[async_trait]
impl LedgerStore for LedgerBackend {
    async fn ensure_table(&self) -> Result<(), StoreError> {
        dispatch!(self, ensure_table())
    }

    async fn load_applied_ids(&self) -> Result<BTreeSet<String>, StoreError> {
        dispatch!(self, load_applied_ids())
    }

    async fn entries(&self) -> Result<Vec<LedgerEntry>, StoreError> {
        dispatch!(self, entries())
    }

    async fn apply(&self, migration: &MigrationDefinition) -> Result<(), ApplyFailure> {
        dispatch!(self, apply(migration))
    }

    async fn lock(&self) -> Result<(), StoreError> {
        dispatch!(self, lock())
    }

    async fn unlock(&self) -> Result<(), StoreError> {
        dispatch!(self, unlock())
    }
}
