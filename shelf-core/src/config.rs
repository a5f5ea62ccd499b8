use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::db::BackendType;

/// Environment variable overriding the config file location
pub const CONFIG_PATH_ENV: &str = "SHELF_CONFIG_PATH";

/// Environment variable naming the library file directly
pub const LIBRARY_PATH_ENV: &str = "SHELF_LIBRARY";

/// Library file picked up from the working directory when present
pub const LOCAL_LIBRARY_FILE: &str = "shelf.yaml";

/// User configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Library used when nothing more specific is given
    pub library_path: PathBuf,
    /// Backend to use instead of inferring from the file extension
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendType>,
}

impl Default for Config {
    fn default() -> Self {
        let library_path = dirs::data_dir()
            .map(|dir| dir.join("shelf").join("library.yaml"))
            .unwrap_or_else(|| PathBuf::from(LOCAL_LIBRARY_FILE));
        Self {
            library_path,
            backend: None,
        }
    }
}

impl Config {
    /// Loads the config from the provided path
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))
    }

    /// Save the config to the specified path
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(&self)?;

        // Ensure parent directories exist
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&path, content)
            .with_context(|| format!("Failed to write config to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Loads the config, writing a default one first if the file is missing
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        if !path.as_ref().exists() {
            log::info!("Creating default config at {:?}", path.as_ref());
            Config::default().save(&path)?;
        }
        Config::load(path)
    }
}

/// Gets the path to the config file
pub fn get_config_path() -> Result<PathBuf> {
    if let Ok(path) = env::var(CONFIG_PATH_ENV) {
        return Ok(PathBuf::from(path));
    }

    // Default to ~/.shelf.config
    let home_dir = dirs::home_dir().context("Failed to determine home directory")?;

    Ok(home_dir.join(".shelf.config"))
}

/// Where the library lives and which backend opens it
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryLocation {
    pub path: PathBuf,
    pub backend: Option<BackendType>,
}

/// Determines the library to use based on the available information
pub fn determine_library_location(explicit: Option<&Path>) -> Result<LibraryLocation> {
    // Priority 1: explicit path from the command line
    if let Some(path) = explicit {
        return Ok(LibraryLocation {
            path: path.to_path_buf(),
            backend: None,
        });
    }

    // Priority 2: environment variable
    if let Ok(path) = env::var(LIBRARY_PATH_ENV) {
        return Ok(LibraryLocation {
            path: PathBuf::from(path),
            backend: None,
        });
    }

    // Priority 3: a library in the current directory
    let local = PathBuf::from(LOCAL_LIBRARY_FILE);
    if local.exists() {
        return Ok(LibraryLocation {
            path: local,
            backend: None,
        });
    }

    // Priority 4: the config file
    let config = Config::load_or_create(get_config_path()?)?;
    Ok(LibraryLocation {
        path: config.library_path,
        backend: config.backend,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("conf").join("shelf.config");

        let config = Config {
            library_path: PathBuf::from("/data/shelf.db"),
            backend: Some(BackendType::Sqlite),
        };
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert!(fs::read_to_string(&path).unwrap().contains("backend: sqlite"));
    }

    #[test]
    fn test_load_or_create_writes_default() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("shelf.config");

        let config = Config::load_or_create(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.backend, None);
    }

    #[test]
    fn test_explicit_path_wins() {
        let location = determine_library_location(Some(Path::new("/tmp/x.db"))).unwrap();
        assert_eq!(location.path, PathBuf::from("/tmp/x.db"));
        assert_eq!(location.backend, None);
    }
}
