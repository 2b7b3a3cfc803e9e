//! Ledger table layout shared by every backend.
//!
//! `schema_migrations(id, description, applied_at)` is an operational
//! contract: external tooling reads it to audit what has been applied.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::StoreError;

/// Portable DDL: valid on both SQLite and PostgreSQL.
pub(crate) const CREATE_LEDGER_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS schema_migrations (
        id VARCHAR(255) PRIMARY KEY,
        description TEXT NOT NULL,
        applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    )
"#;

pub(crate) const SELECT_APPLIED_IDS_SQL: &str = "SELECT id FROM schema_migrations";

pub(crate) const SELECT_ENTRIES_SQL: &str =
    "SELECT id, description, applied_at FROM schema_migrations ORDER BY id";

#[cfg(feature = "sqlite")]
pub(crate) const INSERT_ENTRY_SQLITE: &str =
    "INSERT INTO schema_migrations (id, description) VALUES (?1, ?2)";

#[cfg(feature = "postgres")]
pub(crate) const INSERT_ENTRY_PG: &str =
    "INSERT INTO schema_migrations (id, description) VALUES ($1, $2)";

/// Parse a stored `applied_at`. SQLite's `CURRENT_TIMESTAMP` yields
/// `YYYY-MM-DD HH:MM:SS` in UTC; RFC 3339 is accepted for rows written by
/// other tools.
#[cfg_attr(not(feature = "sqlite"), allow(dead_code))]
pub(crate) fn parse_applied_at(id: &str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| StoreError::Corrupt {
            id: id.to_owned(),
            detail: format!("unparseable applied_at {raw:?}"),
        })
}
