//! Record store abstraction for shelf
//!
//! This module provides a trait-based abstraction for storage backends,
//! allowing the system to use different databases (YAML files, SQLite,
//! memory) while maintaining a consistent interface.

mod memory_backend;
mod migration;
mod records;
mod sqlite_backend;
mod traits;
mod yaml_backend;

pub use memory_backend::MemoryBackend;
pub use migration::{copy_library, migrate_sqlite_to_yaml, migrate_yaml_to_sqlite};
pub use records::{GroupRecords, RuleRecords};
pub use sqlite_backend::SqliteBackend;
pub use traits::{BackendType, DatabaseBackend, DatabaseStats};
pub use yaml_backend::YamlBackend;

use anyhow::Result;
use std::path::Path;

use crate::error::ShelfError;
use crate::models::Library;

/// Infers the backend type from a file extension
pub fn backend_type_for(path: &Path) -> BackendType {
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => BackendType::Yaml,
        Some("db") | Some("sqlite") | Some("sqlite3") => BackendType::Sqlite,
        _ => BackendType::Yaml, // Default to YAML
    }
}

/// Creates a database backend based on the file extension or explicit type
pub fn create_backend(path: &Path, backend_type: Option<BackendType>) -> Result<Box<dyn DatabaseBackend>> {
    let bt = backend_type.unwrap_or_else(|| backend_type_for(path));

    log::debug!("Opening {} backend at {:?}", bt, path);
    match bt {
        BackendType::Yaml => Ok(Box::new(YamlBackend::new(path))),
        BackendType::Sqlite => Ok(Box::new(SqliteBackend::new(path)?)),
        BackendType::Memory => Ok(Box::new(MemoryBackend::new())),
    }
}

/// Opens an existing database or creates a new one
pub fn open_or_create(path: &Path, backend_type: Option<BackendType>) -> Result<Box<dyn DatabaseBackend>> {
    let backend = create_backend(path, backend_type)?;
    backend.create_if_not_exists()?;
    Ok(backend)
}

/// Runs `op` as one atomic read-modify-write and returns what it produced
pub(crate) fn transact<T>(
    store: &dyn DatabaseBackend,
    mut op: impl FnMut(&mut Library) -> crate::error::Result<T>,
) -> crate::error::Result<T> {
    let mut output = None;
    store.update_atomically(&mut |library| {
        output = Some(op(library)?);
        Ok(())
    })?;
    output.ok_or_else(|| ShelfError::Store(anyhow::anyhow!("Update finished without a result")))
}
