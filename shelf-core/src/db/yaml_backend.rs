//! YAML file storage backend
//!
//! This backend stores the whole library in a single YAML file, using
//! `Storage` for file locking.

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::models::Library;
use crate::storage::Storage;
use super::traits::{BackendType, DatabaseBackend};

/// YAML file backend implementation
pub struct YamlBackend {
    storage: Storage,
    path: PathBuf,
}

impl YamlBackend {
    /// Creates a new YAML backend for the given file path
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            storage: Storage::new(&path),
            path,
        }
    }
}

impl DatabaseBackend for YamlBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Yaml
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Library> {
        self.storage.load()
    }

    fn save(&self, library: &Library) -> Result<()> {
        self.storage.save(library)
    }

    fn update_atomically(
        &self,
        update_fn: &mut dyn FnMut(&mut Library) -> Result<()>,
    ) -> Result<Library> {
        self.storage.update_atomically(update_fn)
    }
}
