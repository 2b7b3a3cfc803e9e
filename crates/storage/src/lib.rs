//! Schema migration engine for perftrack
//!
//! Applies a static catalog of SQL migrations in id order, exactly once
//! each, recording every application in the `schema_migrations` ledger
//! inside the same transaction as the migration body.
//!
//! ```no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use perftrack_storage::{Catalog, FileSource, MigrationRunner, SqliteLedger};
//!
//! let store = SqliteLedger::open(std::path::Path::new("app.db"))?;
//! let runner = MigrationRunner::new(FileSource::new(Catalog::builtin()), store);
//! let report = runner.run().await?;
//! println!("{} migration(s) applied", report.applied_count());
//! # Ok(())
//! # }
//! ```

mod backend;
mod bootstrap;
mod catalog;
mod error;
mod ledger;
#[cfg(feature = "postgres")]
mod pg_ledger;
mod runner;
mod source;
#[cfg(feature = "sqlite")]
mod sqlite;
#[cfg(all(test, feature = "sqlite"))]
mod tests;
pub mod traits;
mod types;

pub use backend::{ConnectError, LedgerBackend};
pub use bootstrap::bootstrap_ledger;
pub use catalog::Catalog;
pub use error::{ApplyFailure, ApplyPhase, MigrationError, StoreError};
#[cfg(feature = "postgres")]
pub use pg_ledger::PgLedger;
pub use runner::{plan, MigrationRunner, Plan, RunOptions, RunReport};
pub use source::{
    default_resolvers, BarePathResolver, DirectoryResolver, EmbeddedResolver, FileSource,
    MigrationSource, MissingMigration, SourceListing, SqlResolver, StaticSource,
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteLedger;
pub use traits::LedgerStore;
pub use types::{
    CatalogEntry, LedgerEntry, MigrationDefinition, MigrationState, MigrationStatus, StatusState,
};
