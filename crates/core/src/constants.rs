//! Shared constants for perftrack.
//!
//! Names that form part of the operational contract (ledger table, lock key)
//! live here so the CLI and the storage backends agree on them.

/// Ledger table recording applied migrations. External tooling audits it.
pub const LEDGER_TABLE: &str = "schema_migrations";

/// Key for the PostgreSQL session advisory lock held during a run.
/// ASCII "perftrak" as a big-endian i64.
pub const MIGRATION_LOCK_KEY: i64 = 0x7065_7266_7472_616b;

/// Directory probed first among the default SQL file locations.
pub const DEFAULT_MIGRATIONS_DIR: &str = "migrations";

/// Default PostgreSQL connect timeout in seconds.
pub const PG_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Environment variable overriding [`PG_CONNECT_TIMEOUT_SECS`].
pub const ENV_PG_CONNECT_TIMEOUT: &str = "PERFTRACK_PG_CONNECT_TIMEOUT_SECS";

/// Environment variable holding a full database URL.
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";

/// Environment variable naming an extra SQL directory probed before the defaults.
pub const ENV_MIGRATIONS_DIR: &str = "PERFTRACK_MIGRATIONS_DIR";

/// Environment variable enabling fail-on-missing-SQL runs.
pub const ENV_MIGRATIONS_STRICT: &str = "PERFTRACK_MIGRATIONS_STRICT";
