//! Migration sources: where SQL bodies come from.
//!
//! A [`FileSource`] walks the static [`Catalog`] and asks a ranked list of
//! [`SqlResolver`]s for each entry's file, keeping the first hit. An entry no
//! resolver can produce is dropped from the listing and reported as a
//! [`MissingMigration`]; listing itself never fails.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use perftrack_core::DEFAULT_MIGRATIONS_DIR;
use serde::Serialize;

use crate::catalog::Catalog;
use crate::types::{CatalogEntry, MigrationDefinition};

/// Supplies the migrations a run should consider.
pub trait MigrationSource: Send + Sync {
    fn list_migrations(&self) -> SourceListing;
}

/// Resolved migrations plus warnings for entries that could not be resolved.
#[derive(Debug, Clone, Default)]
pub struct SourceListing {
    pub migrations: Vec<MigrationDefinition>,
    pub missing: Vec<MissingMigration>,
}

impl SourceListing {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// A catalog entry whose SQL body was not found in any candidate location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingMigration {
    pub id: String,
    pub description: String,
    pub file_name: String,
    /// `(location, error)` for every resolver tried, in order.
    pub attempts: Vec<(String, String)>,
}

/// One candidate location for SQL files.
pub trait SqlResolver: Send + Sync {
    /// Human-readable location of `file_name` under this resolver.
    fn location(&self, file_name: &str) -> String {
        file_name.to_owned()
    }

    fn resolve(&self, file_name: &str) -> io::Result<String>;
}

impl<F> SqlResolver for F
where
    F: Fn(&str) -> io::Result<String> + Send + Sync,
{
    fn resolve(&self, file_name: &str) -> io::Result<String> {
        self(file_name)
    }
}

/// Reads `<dir>/<file_name>` from the filesystem.
#[derive(Debug, Clone)]
pub struct DirectoryResolver {
    dir: PathBuf,
}

impl DirectoryResolver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl SqlResolver for DirectoryResolver {
    fn location(&self, file_name: &str) -> String {
        self.dir.join(file_name).display().to_string()
    }

    fn resolve(&self, file_name: &str) -> io::Result<String> {
        fs::read_to_string(self.dir.join(file_name))
    }
}

/// Reads the file name as a path relative to the working directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct BarePathResolver;

impl SqlResolver for BarePathResolver {
    fn resolve(&self, file_name: &str) -> io::Result<String> {
        fs::read_to_string(file_name)
    }
}

/// SQL held in memory, e.g. bodies embedded with `include_str!`.
#[derive(Debug, Clone, Default)]
pub struct EmbeddedResolver {
    files: HashMap<String, String>,
}

impl EmbeddedResolver {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_file(mut self, file_name: impl Into<String>, sql: impl Into<String>) -> Self {
        self.files.insert(file_name.into(), sql.into());
        self
    }
}

impl SqlResolver for EmbeddedResolver {
    fn location(&self, file_name: &str) -> String {
        format!("embedded:{file_name}")
    }

    fn resolve(&self, file_name: &str) -> io::Result<String> {
        self.files.get(file_name).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("{file_name} is not embedded"))
        })
    }
}

/// Default probe order: `migrations/<file>`, `./<file>`, then the bare name.
pub fn default_resolvers() -> Vec<Box<dyn SqlResolver>> {
    vec![
        Box::new(DirectoryResolver::new(DEFAULT_MIGRATIONS_DIR)),
        Box::new(DirectoryResolver::new(".")),
        Box::new(BarePathResolver),
    ]
}

/// Catalog-driven source resolving bodies through ranked resolvers.
pub struct FileSource {
    catalog: Catalog,
    resolvers: Vec<Box<dyn SqlResolver>>,
}

impl FileSource {
    /// Probe the default locations only.
    pub fn new(catalog: Catalog) -> Self {
        Self::with_resolvers(catalog, default_resolvers())
    }

    /// Probe `dirs` in order, then the default locations.
    pub fn with_dirs<I, P>(catalog: Catalog, dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut resolvers: Vec<Box<dyn SqlResolver>> = dirs
            .into_iter()
            .map(|d| Box::new(DirectoryResolver::new(d)) as Box<dyn SqlResolver>)
            .collect();
        resolvers.extend(default_resolvers());
        Self::with_resolvers(catalog, resolvers)
    }

    pub fn with_resolvers(catalog: Catalog, resolvers: Vec<Box<dyn SqlResolver>>) -> Self {
        Self { catalog, resolvers }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn resolve(&self, entry: &CatalogEntry) -> Result<String, MissingMigration> {
        let mut attempts = Vec::with_capacity(self.resolvers.len());
        for resolver in &self.resolvers {
            match resolver.resolve(&entry.file_name) {
                Ok(sql) => {
                    tracing::debug!(
                        id = %entry.id,
                        location = %resolver.location(&entry.file_name),
                        "resolved migration SQL"
                    );
                    return Ok(sql);
                },
                Err(e) => attempts.push((resolver.location(&entry.file_name), e.to_string())),
            }
        }
        Err(MissingMigration {
            id: entry.id.clone(),
            description: entry.description.clone(),
            file_name: entry.file_name.clone(),
            attempts,
        })
    }
}

impl MigrationSource for FileSource {
    fn list_migrations(&self) -> SourceListing {
        let mut listing = SourceListing::default();
        for entry in &self.catalog {
            match self.resolve(entry) {
                Ok(body) => listing.migrations.push(MigrationDefinition::new(
                    entry.id.clone(),
                    entry.description.clone(),
                    body,
                )),
                Err(missing) => {
                    let tried: Vec<&str> =
                        missing.attempts.iter().map(|(loc, _)| loc.as_str()).collect();
                    tracing::warn!(
                        id = %missing.id,
                        file = %missing.file_name,
                        tried = ?tried,
                        "migration SQL not found, entry excluded from this run"
                    );
                    listing.missing.push(missing);
                },
            }
        }
        listing
    }
}

/// Source over already-built definitions.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    migrations: Vec<MigrationDefinition>,
}

impl StaticSource {
    pub fn new(migrations: Vec<MigrationDefinition>) -> Self {
        Self { migrations }
    }
}

impl MigrationSource for StaticSource {
    fn list_migrations(&self) -> SourceListing {
        SourceListing { migrations: self.migrations.clone(), missing: Vec::new() }
    }
}
