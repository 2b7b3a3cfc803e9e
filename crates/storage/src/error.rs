//! Typed errors for the migration engine.
//!
//! `StoreError` covers backend failures (one variant per driver plus the
//! conditions callers match on). `MigrationError` is what a run returns: each
//! variant names the stage that failed and, for apply failures, the migration id.

use std::fmt;

use thiserror::Error;

/// Ledger-store error with variants covering every expected failure mode.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite driver failure.
    #[cfg(feature = "sqlite")]
    #[error("sqlite error: {0}")]
    Sqlite(#[source] rusqlite::Error),

    /// PostgreSQL driver / connection failure.
    #[cfg(feature = "postgres")]
    #[error("postgres error: {0}")]
    Postgres(#[source] sqlx::Error),

    /// Primary-key violation on the ledger.
    #[error("duplicate: {0}")]
    Duplicate(String),

    /// Ledger row could not be decoded.
    #[error("corrupt ledger row {id}: {detail}")]
    Corrupt { id: String, detail: String },

    /// Blocking task panicked or was cancelled.
    #[error("blocking task failed: {0}")]
    Join(String),

    /// Connection mutex poisoned by a panic in another task.
    #[error("connection lock poisoned")]
    LockPoisoned,

    /// Connecting did not finish in time.
    #[error("timed out after {0}s")]
    Timeout(u64),
}

impl StoreError {
    /// Whether this error is a unique-constraint violation.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}

/// Custom `From<rusqlite::Error>`: primary-key and unique violations become
/// `Duplicate`. Other constraint failures stay driver errors.
#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ffi::{SQLITE_CONSTRAINT_PRIMARYKEY, SQLITE_CONSTRAINT_UNIQUE};

        match &err {
            rusqlite::Error::SqliteFailure(code, msg)
                if matches!(
                    code.extended_code,
                    SQLITE_CONSTRAINT_PRIMARYKEY | SQLITE_CONSTRAINT_UNIQUE
                ) =>
            {
                Self::Duplicate(msg.clone().unwrap_or_else(|| err.to_string()))
            },
            _ => Self::Sqlite(err),
        }
    }
}

/// Custom `From<sqlx::Error>`: SQLSTATE 23505 becomes `Duplicate`.
#[cfg(feature = "postgres")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.code().is_some_and(|c| c == "23505") => {
                Self::Duplicate(db_err.message().to_owned())
            },
            _ => Self::Postgres(err),
        }
    }
}

/// Step of the per-migration transaction that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyPhase {
    Begin,
    Execute,
    Record,
    Commit,
}

impl fmt::Display for ApplyPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Begin => "begin",
            Self::Execute => "execute",
            Self::Record => "record",
            Self::Commit => "commit",
        })
    }
}

/// Failure returned by [`crate::LedgerStore::apply`]. Everything but a
/// `Commit` failure has been rolled back when this is returned.
#[derive(Debug, Error)]
#[error("{phase} failed: {source}")]
pub struct ApplyFailure {
    pub phase: ApplyPhase,
    #[source]
    pub source: StoreError,
}

impl ApplyFailure {
    pub fn new(phase: ApplyPhase, source: impl Into<StoreError>) -> Self {
        Self { phase, source: source.into() }
    }
}

/// Error returned by a migration run. Every variant is fatal to the run.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Ledger table could not be created or verified.
    #[error("failed to create or verify ledger table: {0}")]
    Bootstrap(#[source] StoreError),

    /// Applied ids could not be read from the ledger.
    #[error("failed to read applied migrations: {0}")]
    LedgerRead(#[source] StoreError),

    /// Advisory lock could not be taken.
    #[error("failed to acquire migration lock: {0}")]
    Lock(#[source] StoreError),

    /// The catalog lists the same id twice.
    #[error("duplicate migration id in catalog: {0}")]
    DuplicateId(String),

    /// Strict mode: catalog entries without SQL content.
    #[error("SQL not found for migrations: {}", .0.join(", "))]
    MissingSql(Vec<String>),

    #[error("failed to begin transaction for migration {id}: {source}")]
    Begin {
        id: String,
        #[source]
        source: StoreError,
    },

    /// Body failed; transaction rolled back.
    #[error("failed to execute migration {id}: {source}")]
    Execution {
        id: String,
        #[source]
        source: StoreError,
    },

    /// Ledger insert failed; transaction (body included) rolled back.
    #[error("failed to record migration {id}: {source}")]
    Record {
        id: String,
        #[source]
        source: StoreError,
    },

    /// Commit failed; the migration may or may not be durable.
    #[error("failed to commit migration {id} (outcome unknown, inspect ledger): {source}")]
    Commit {
        id: String,
        #[source]
        source: StoreError,
    },
}

impl MigrationError {
    pub(crate) fn from_apply(id: &str, failure: ApplyFailure) -> Self {
        let id = id.to_owned();
        let source = failure.source;
        match failure.phase {
            ApplyPhase::Begin => Self::Begin { id, source },
            ApplyPhase::Execute => Self::Execution { id, source },
            ApplyPhase::Record => Self::Record { id, source },
            ApplyPhase::Commit => Self::Commit { id, source },
        }
    }

    /// Id of the migration that failed, for apply-stage errors.
    pub fn migration_id(&self) -> Option<&str> {
        match self {
            Self::Begin { id, .. }
            | Self::Execution { id, .. }
            | Self::Record { id, .. }
            | Self::Commit { id, .. } => Some(id),
            Self::DuplicateId(id) => Some(id),
            _ => None,
        }
    }

    /// Whether the durable outcome is unknown and needs an operator.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Commit { .. })
    }
}
