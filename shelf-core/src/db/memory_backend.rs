//! In-process backend
//!
//! Keeps the library behind a mutex. Useful for embedding and as a test
//! double: `fail_next_write` makes the next atomic update fail after the
//! closure has run, which is how a store-level write failure looks to callers.

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::models::Library;
use super::traits::{BackendType, DatabaseBackend};

pub struct MemoryBackend {
    path: PathBuf,
    library: Mutex<Library>,
    fail_next_write: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_library(Library::new())
    }

    pub fn with_library(library: Library) -> Self {
        Self {
            path: PathBuf::from(":memory:"),
            library: Mutex::new(library),
            fail_next_write: AtomicBool::new(false),
        }
    }

    /// Makes the next write fail with a store error
    pub fn fail_next_write(&self) {
        self.fail_next_write.store(true, Ordering::SeqCst);
    }

    fn check_write(&self) -> Result<()> {
        if self.fail_next_write.swap(false, Ordering::SeqCst) {
            anyhow::bail!("Simulated write failure");
        }
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Library>> {
        self.library
            .lock()
            .map_err(|_| anyhow!("Memory backend lock poisoned"))
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DatabaseBackend for MemoryBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Memory
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn exists(&self) -> bool {
        true
    }

    fn load(&self) -> Result<Library> {
        Ok(self.lock()?.clone())
    }

    fn save(&self, library: &Library) -> Result<()> {
        let mut current = self.lock()?;
        self.check_write()?;
        library.validate_group_ids()?;
        *current = library.clone();
        Ok(())
    }

    fn update_atomically(
        &self,
        update_fn: &mut dyn FnMut(&mut Library) -> Result<()>,
    ) -> Result<Library> {
        let mut current = self.lock()?;
        // Work on a copy so a failure leaves the stored library untouched
        let mut working = current.clone();
        update_fn(&mut working)?;
        self.check_write()?;
        working.validate_group_ids()?;
        *current = working.clone();
        Ok(working)
    }
}
