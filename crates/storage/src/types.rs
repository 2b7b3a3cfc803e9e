//! Domain types for migrations and the ledger.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One migration: identity, audit text and the SQL executed verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationDefinition {
    /// Sort key and ledger primary key, e.g. `"001_initial_setup"`.
    pub id: String,
    pub description: String,
    pub body: String,
}

impl MigrationDefinition {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self { id: id.into(), description: description.into(), body: body.into() }
    }
}

/// Static catalog triple: the SQL body is resolved later from `file_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub id: String,
    pub description: String,
    pub file_name: String,
}

impl CatalogEntry {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Self {
        Self { id: id.into(), description: description.into(), file_name: file_name.into() }
    }
}

/// A row of the ledger table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub id: String,
    pub description: String,
    pub applied_at: DateTime<Utc>,
}

/// Where a migration is within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    Discovered,
    Pending,
    Applying,
    Applied,
    Failed,
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Discovered => "discovered",
            Self::Pending => "pending",
            Self::Applying => "applying",
            Self::Applied => "applied",
            Self::Failed => "failed",
        })
    }
}

/// State of a catalog entry as reported by `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StatusState {
    Applied { applied_at: DateTime<Utc> },
    Pending,
    /// No SQL content could be resolved for the entry.
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    pub id: String,
    pub description: String,
    #[serde(flatten)]
    pub state: StatusState,
}
