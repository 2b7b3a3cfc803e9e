//! Environment-driven configuration for the migration entry point.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Serialize;

use crate::constants::{ENV_DATABASE_URL, ENV_MIGRATIONS_DIR, ENV_MIGRATIONS_STRICT};
use crate::env_config::parse_with_default;
use crate::error::CoreError;

/// Where the ledger and the schema live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DatabaseTarget {
    /// SQLite database file.
    Sqlite { path: PathBuf },
    /// Private in-memory SQLite database.
    SqliteMemory,
    /// PostgreSQL connection URL.
    Postgres { url: String },
}

impl DatabaseTarget {
    /// Short backend name for logs.
    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::Sqlite { .. } | Self::SqliteMemory => "sqlite",
            Self::Postgres { .. } => "postgres",
        }
    }
}

impl FromStr for DatabaseTarget {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(CoreError::InvalidInput("database URL is empty".to_owned()));
        }
        if s == "sqlite::memory:" || s == "sqlite://:memory:" {
            return Ok(Self::SqliteMemory);
        }
        if let Some(path) = s.strip_prefix("sqlite://").or_else(|| s.strip_prefix("sqlite:")) {
            if path.is_empty() {
                return Err(CoreError::InvalidInput(format!("missing SQLite path in {s}")));
            }
            return Ok(Self::Sqlite { path: PathBuf::from(path) });
        }
        if s.starts_with("postgres://") || s.starts_with("postgresql://") {
            return Ok(Self::Postgres { url: s.to_owned() });
        }
        let scheme = s.split_once("://").map_or(s, |(scheme, _)| scheme);
        Err(CoreError::UnsupportedScheme(scheme.to_owned()))
    }
}

/// Hides the PostgreSQL password when printed.
impl fmt::Display for DatabaseTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite { path } => write!(f, "sqlite://{}", path.display()),
            Self::SqliteMemory => f.write_str("sqlite::memory:"),
            Self::Postgres { url } => f.write_str(&redact_password(url)),
        }
    }
}

fn redact_password(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_owned();
    };
    let Some((userinfo, host)) = rest.rsplit_once('@') else {
        return url.to_owned();
    };
    match userinfo.split_once(':') {
        Some((user, _)) => format!("{scheme}://{user}:***@{host}"),
        None => url.to_owned(),
    }
}

/// Settings for one migration run, assembled from the environment.
#[derive(Debug, Clone, Serialize)]
pub struct MigrateSettings {
    pub database: DatabaseTarget,
    /// Extra directories probed, in order, before the default SQL locations.
    pub migrations_dirs: Vec<PathBuf>,
    /// Abort before applying anything when a catalog entry has no SQL file.
    pub fail_on_missing: bool,
}

impl MigrateSettings {
    /// Read settings from the process environment.
    pub fn from_env() -> crate::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`, which returns a variable's value if set.
    ///
    /// `DATABASE_URL` wins when present; otherwise a PostgreSQL URL is built
    /// from the `DB_*` variables with the service's historical defaults.
    pub fn from_lookup<F>(lookup: F) -> crate::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database = match get(ENV_DATABASE_URL) {
            Some(url) => url.parse()?,
            None => {
                let host = get("DB_HOST").unwrap_or_else(|| "localhost".to_owned());
                let port: u16 = parse_with_default("DB_PORT", get("DB_PORT"), 5432);
                let user = get("DB_USER").unwrap_or_else(|| "postgres".to_owned());
                let password = get("DB_PASSWORD").unwrap_or_else(|| "postgres".to_owned());
                let name = get("DB_NAME").unwrap_or_else(|| "tivix_performance_tracker".to_owned());
                let sslmode = get("DB_SSLMODE").unwrap_or_else(|| "disable".to_owned());
                DatabaseTarget::Postgres {
                    url: format!(
                        "postgres://{user}:{password}@{host}:{port}/{name}?sslmode={sslmode}"
                    ),
                }
            },
        };

        let migrations_dirs = get(ENV_MIGRATIONS_DIR).map(PathBuf::from).into_iter().collect();
        let fail_on_missing =
            parse_with_default(ENV_MIGRATIONS_STRICT, get(ENV_MIGRATIONS_STRICT), false);

        Ok(Self { database, migrations_dirs, fail_on_missing })
    }
}
