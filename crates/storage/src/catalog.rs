//! Static migration catalog.
//!
//! The catalog is the authoritative, deployment-ordered list of migrations a
//! release knows about, independent of which SQL files exist on disk. It is a
//! value handed to the source, never process-global state.

use std::collections::HashSet;

use crate::error::MigrationError;
use crate::types::CatalogEntry;

/// Migrations shipped with this backend, in deployment order.
const BUILTIN: &[(&str, &str, &str)] = &[
    ("001_initial_setup", "Initial PostgreSQL setup", "001_initial_setup.sql"),
    ("002_create_tables", "Create core tables", "002_create_tables.sql"),
    ("003_create_indexes", "Create performance indexes", "003_create_indexes.sql"),
    ("004_create_triggers", "Timestamp maintenance triggers", "004_create_triggers.sql"),
    (
        "005_multitenant_implementation",
        "Multi-tenant schema implementation",
        "005_multitenant_implementation.sql",
    ),
    (
        "006_data_migration_multitenant",
        "Backfill data for multi-tenancy",
        "006_data_migration_multitenant.sql",
    ),
];

/// Immutable list of catalog entries with unique ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    /// Build a catalog, rejecting duplicate ids.
    pub fn new(entries: Vec<CatalogEntry>) -> Result<Self, MigrationError> {
        ensure_unique_ids(entries.iter().map(|e| e.id.as_str()))?;
        Ok(Self { entries })
    }

    /// The catalog this backend deploys.
    pub fn builtin() -> Self {
        Self {
            entries: BUILTIN
                .iter()
                .map(|(id, description, file)| CatalogEntry::new(*id, *description, *file))
                .collect(),
        }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a CatalogEntry;
    type IntoIter = std::slice::Iter<'a, CatalogEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// First repeated id wins the error.
pub(crate) fn ensure_unique_ids<'a>(
    ids: impl IntoIterator<Item = &'a str>,
) -> Result<(), MigrationError> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(MigrationError::DuplicateId(id.to_owned()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_has_unique_sorted_ids() {
        let builtin = Catalog::builtin();
        assert_eq!(builtin.len(), 6);
        assert!(Catalog::new(builtin.entries().to_vec()).is_ok());

        let ids: Vec<&str> = builtin.entries().iter().map(|e| e.id.as_str()).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted, "deployment order must match id order");
    }

    #[test]
    fn duplicate_ids_rejected_at_construction() {
        let err = Catalog::new(vec![
            CatalogEntry::new("001_a", "first", "001_a.sql"),
            CatalogEntry::new("002_b", "second", "002_b.sql"),
            CatalogEntry::new("001_a", "typo'd copy", "001_a_copy.sql"),
        ])
        .unwrap_err();
        assert!(matches!(err, MigrationError::DuplicateId(ref id) if id == "001_a"));
    }

    #[test]
    fn empty_catalog_is_valid() {
        let catalog = Catalog::new(Vec::new()).unwrap();
        assert!(catalog.is_empty());
    }
}
