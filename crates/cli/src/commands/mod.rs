pub(crate) mod catalog;
pub(crate) mod migrate;
pub(crate) mod status;

use perftrack_core::MigrateSettings;
use perftrack_storage::{Catalog, FileSource};

/// Built-in catalog resolved through the configured directories.
pub(crate) fn builtin_source(settings: &MigrateSettings) -> FileSource {
    FileSource::with_dirs(Catalog::builtin(), settings.migrations_dirs.iter().cloned())
}
