//! Migration utilities for converting between storage backends

use anyhow::{Context, Result};
use std::path::Path;

use super::traits::DatabaseBackend;
use super::{SqliteBackend, YamlBackend};

/// Copies the whole library from one backend to another
///
/// # Returns
/// The number of rules copied
pub fn copy_library(from: &dyn DatabaseBackend, to: &dyn DatabaseBackend) -> Result<usize> {
    let library = from
        .load()
        .with_context(|| format!("Failed to load {} database", from.backend_type()))?;

    let rule_count = library.rules.len();

    to.save(&library)
        .with_context(|| format!("Failed to save to {} database", to.backend_type()))?;

    log::info!(
        "Copied {} groups and {} rules from {:?} to {:?}",
        library.groups.len(),
        rule_count,
        from.path(),
        to.path()
    );
    Ok(rule_count)
}

/// Copies a YAML library into a SQLite database, returning the rule count
pub fn migrate_yaml_to_sqlite<P1: AsRef<Path>, P2: AsRef<Path>>(
    yaml_path: P1,
    sqlite_path: P2,
) -> Result<usize> {
    let yaml_backend = YamlBackend::new(yaml_path);
    let sqlite_backend = SqliteBackend::new(sqlite_path)?;
    copy_library(&yaml_backend, &sqlite_backend)
}

/// Copies a SQLite library into a YAML file, returning the rule count
pub fn migrate_sqlite_to_yaml<P1: AsRef<Path>, P2: AsRef<Path>>(
    sqlite_path: P1,
    yaml_path: P2,
) -> Result<usize> {
    let sqlite_backend = SqliteBackend::new(sqlite_path)?;
    let yaml_backend = YamlBackend::new(yaml_path);
    copy_library(&sqlite_backend, &yaml_backend)
}
