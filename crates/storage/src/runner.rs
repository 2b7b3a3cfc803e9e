//! Migration runner: the lock → bootstrap → read → plan → apply sequence.
//!
//! Migrations are applied strictly one at a time in ascending id order. Each
//! one shares a transaction with its ledger row, and the first failure aborts
//! the run while leaving earlier commits in place. Re-running is the retry.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Serialize;

use crate::bootstrap::bootstrap_ledger;
use crate::catalog::ensure_unique_ids;
use crate::error::MigrationError;
use crate::source::{MigrationSource, MissingMigration, SourceListing};
use crate::traits::LedgerStore;
use crate::types::{MigrationDefinition, MigrationState, MigrationStatus, StatusState};

/// Knobs for a run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Abort before applying anything if any catalog entry lacks SQL.
    pub fail_on_missing: bool,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    /// Ids applied by this run, in application order.
    pub applied: Vec<String>,
    /// Entries skipped because the ledger already had them.
    pub skipped: usize,
    /// Catalog entries excluded because their SQL was not found.
    pub missing: Vec<MissingMigration>,
    /// Ledger ids the catalog does not know about.
    pub unknown_applied: Vec<String>,
}

impl RunReport {
    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }
}

/// Pending work for a run.
#[derive(Debug)]
pub struct Plan<'a> {
    /// Not yet applied, sorted by id.
    pub pending: Vec<&'a MigrationDefinition>,
    pub skipped: usize,
}

/// Sort `migrations` by id (plain string order) and drop the applied ones.
///
/// Ids must be zero-padded for string order to match numeric order.
pub fn plan<'a>(migrations: &'a [MigrationDefinition], applied: &BTreeSet<String>) -> Plan<'a> {
    let mut sorted: Vec<&MigrationDefinition> = migrations.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    let (done, pending): (Vec<_>, Vec<_>) =
        sorted.into_iter().partition(|m| applied.contains(&m.id));
    Plan { pending, skipped: done.len() }
}

fn unknown_applied(listing: &SourceListing, applied: &BTreeSet<String>) -> Vec<String> {
    let known: HashSet<&str> = listing
        .migrations
        .iter()
        .map(|m| m.id.as_str())
        .chain(listing.missing.iter().map(|m| m.id.as_str()))
        .collect();
    applied.iter().filter(|id| !known.contains(id.as_str())).cloned().collect()
}

/// Drives a [`MigrationSource`] against a [`LedgerStore`].
pub struct MigrationRunner<S, L> {
    source: S,
    store: L,
    options: RunOptions,
}

impl<S, L> MigrationRunner<S, L>
where
    S: MigrationSource,
    L: LedgerStore,
{
    pub fn new(source: S, store: L) -> Self {
        Self { source, store, options: RunOptions::default() }
    }

    #[must_use]
    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn store(&self) -> &L {
        &self.store
    }

    pub fn into_store(self) -> L {
        self.store
    }

    /// Apply every pending migration.
    ///
    /// The lock is taken before the ledger table is created so concurrent
    /// first runs do not race on the DDL.
    pub async fn run(&self) -> Result<RunReport, MigrationError> {
        self.store.lock().await.map_err(MigrationError::Lock)?;
        let result = self.run_locked().await;
        if let Err(e) = self.store.unlock().await {
            tracing::warn!("failed to release migration lock: {}", e);
        }
        result
    }

    async fn run_locked(&self) -> Result<RunReport, MigrationError> {
        bootstrap_ledger(&self.store).await?;
        let applied = self.store.load_applied_ids().await.map_err(MigrationError::LedgerRead)?;

        let listing = self.source.list_migrations();
        ensure_unique_ids(listing.migrations.iter().map(|m| m.id.as_str()))?;
        for m in &listing.migrations {
            tracing::debug!(id = %m.id, state = %MigrationState::Discovered, "migration state");
        }

        if self.options.fail_on_missing && !listing.missing.is_empty() {
            let ids = listing.missing.iter().map(|m| m.id.clone()).collect();
            return Err(MigrationError::MissingSql(ids));
        }

        let unknown = unknown_applied(&listing, &applied);
        for id in &unknown {
            tracing::warn!(id = %id, "ledger contains a migration missing from the catalog");
        }

        let plan = plan(&listing.migrations, &applied);
        let mut report = RunReport {
            skipped: plan.skipped,
            unknown_applied: unknown,
            ..RunReport::default()
        };

        for migration in &plan.pending {
            tracing::debug!(id = %migration.id, state = %MigrationState::Pending, "migration state");
        }

        for migration in plan.pending {
            tracing::info!("applying migration {}: {}", migration.id, migration.description);
            tracing::debug!(id = %migration.id, state = %MigrationState::Applying, "migration state");

            if let Err(failure) = self.store.apply(migration).await {
                tracing::error!(
                    id = %migration.id,
                    state = %MigrationState::Failed,
                    phase = %failure.phase,
                    "migration failed: {}",
                    failure.source
                );
                return Err(MigrationError::from_apply(&migration.id, failure));
            }

            tracing::info!(id = %migration.id, state = %MigrationState::Applied, "migration applied");
            report.applied.push(migration.id.clone());
        }

        report.missing = listing.missing;
        if report.applied.is_empty() {
            tracing::info!("no pending migrations");
        } else {
            tracing::info!("{} migration(s) applied", report.applied_count());
        }
        if !report.missing.is_empty() {
            tracing::warn!(
                count = report.missing.len(),
                "catalog entries skipped for missing SQL; review required"
            );
        }

        Ok(report)
    }

    /// Catalog entries with their ledger state, sorted by id. Applies nothing.
    pub async fn status(&self) -> Result<Vec<MigrationStatus>, MigrationError> {
        bootstrap_ledger(&self.store).await?;
        let entries = self.store.entries().await.map_err(MigrationError::LedgerRead)?;
        let applied: HashMap<&str, _> =
            entries.iter().map(|e| (e.id.as_str(), e.applied_at)).collect();

        let listing = self.source.list_migrations();
        let state_of = |id: &str, missing: bool| match applied.get(id) {
            Some(applied_at) => StatusState::Applied { applied_at: *applied_at },
            None if missing => StatusState::Missing,
            None => StatusState::Pending,
        };

        let mut statuses: Vec<MigrationStatus> = listing
            .migrations
            .iter()
            .map(|m| MigrationStatus {
                id: m.id.clone(),
                description: m.description.clone(),
                state: state_of(&m.id, false),
            })
            .chain(listing.missing.iter().map(|m| MigrationStatus {
                id: m.id.clone(),
                description: m.description.clone(),
                state: state_of(&m.id, true),
            }))
            .collect();
        statuses.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(statuses)
    }
}
