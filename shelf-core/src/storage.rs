use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::Library;

/// How long to wait for another process to release the lock file
const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Handles saving and loading the library from disk with file locking
/// for rudimentary multi-user support
pub struct Storage {
    file_path: PathBuf,
    lock_file_path: PathBuf,
}

impl Storage {
    /// Creates a new Storage instance
    pub fn new<P: AsRef<Path>>(file_path: P) -> Self {
        let file_path = file_path.as_ref().to_path_buf();
        let lock_file_path = file_path.with_extension("yaml.lock");
        Self {
            file_path,
            lock_file_path,
        }
    }

    /// Returns the path to the storage file
    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Acquire an exclusive lock on the file for writing
    /// Returns the lock file handle which must be held during the operation
    fn acquire_write_lock(&self) -> Result<File> {
        if let Some(parent) = self.lock_file_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_file_path)
            .with_context(|| format!("Failed to create lock file: {:?}", self.lock_file_path))?;

        self.wait_for_lock(&lock_file, <File as FileExt>::try_lock_exclusive)?;

        // Lock holder info, for whoever is stuck waiting
        lock_file.set_len(0)?;
        let _ = writeln!(
            lock_file,
            "Locked by PID {} at {}",
            std::process::id(),
            chrono::Utc::now().to_rfc3339()
        );

        Ok(lock_file)
    }

    /// Acquire a shared lock on the file for reading
    fn acquire_read_lock(&self) -> Result<Option<File>> {
        if !self.lock_file_path.exists() {
            return Ok(None);
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .open(&self.lock_file_path)
            .with_context(|| format!("Failed to open lock file: {:?}", self.lock_file_path))?;

        self.wait_for_lock(&lock_file, <File as FileExt>::try_lock_shared)?;
        Ok(Some(lock_file))
    }

    fn wait_for_lock(
        &self,
        lock_file: &File,
        try_lock: fn(&File) -> std::io::Result<()>,
    ) -> Result<()> {
        let start = std::time::Instant::now();

        loop {
            match try_lock(lock_file) {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if start.elapsed() > LOCK_TIMEOUT {
                        anyhow::bail!(
                            "Timeout waiting for file lock - another user may be editing: {:?}",
                            self.file_path
                        );
                    }
                    std::thread::sleep(Duration::from_millis(100));
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to acquire lock on {:?}", self.lock_file_path)
                    })
                }
            }
        }
    }

    /// Loads the library from the YAML file with file locking
    pub fn load(&self) -> Result<Library> {
        if !self.file_path.exists() {
            let default_library = Library::new();
            self.save(&default_library)?;
            return Ok(default_library);
        }

        let _lock = self.acquire_read_lock()?;
        self.read_file()
    }

    /// Saves the library to the YAML file with file locking
    pub fn save(&self, library: &Library) -> Result<()> {
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let _lock = self.acquire_write_lock()?;
        self.write_file(library)
    }

    /// Perform an atomic update operation with proper locking
    /// This reloads the file, applies changes, and saves atomically.
    /// The file is left untouched if `update_fn` fails.
    pub fn update_atomically(
        &self,
        update_fn: &mut dyn FnMut(&mut Library) -> Result<()>,
    ) -> Result<Library> {
        let _lock = self.acquire_write_lock()?;

        let mut library = if self.file_path.exists() {
            self.read_file()?
        } else {
            Library::new()
        };

        update_fn(&mut library)?;
        library.validate_group_ids()?;

        self.write_file(&library)?;
        Ok(library)
    }

    fn read_file(&self) -> Result<Library> {
        let file = File::open(&self.file_path)
            .with_context(|| format!("Failed to open file: {:?}", self.file_path))?;
        let reader = BufReader::new(file);

        let library: Library = serde_yaml::from_reader(reader)
            .with_context(|| format!("Failed to parse YAML from {:?}", self.file_path))?;

        library
            .validate_group_ids()
            .with_context(|| format!("Invalid group ids in {:?}", self.file_path))?;

        Ok(library)
    }

    /// Writes to a sibling temp file and renames it over the target, so
    /// readers never see a partially written library
    fn write_file(&self, library: &Library) -> Result<()> {
        let yaml = serde_yaml::to_string(library).context("Failed to serialize library")?;
        let tmp_path = self.file_path.with_extension("yaml.tmp");
        fs::write(&tmp_path, yaml)
            .with_context(|| format!("Failed to write {:?}", tmp_path))?;
        fs::rename(&tmp_path, &self.file_path)
            .with_context(|| format!("Failed to replace {:?}", self.file_path))?;
        log::debug!("Wrote library to {:?}", self.file_path);
        Ok(())
    }
}
