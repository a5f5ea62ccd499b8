//! Database abstraction traits
//!
//! This module defines the core trait that all storage backends must implement.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::models::{Group, Library, Rule};
use super::records::{GroupRecords, RuleRecords};

/// Types of database backends available
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// YAML file storage (single file)
    Yaml,
    /// SQLite database storage
    Sqlite,
    /// Process-local storage, nothing written to disk
    Memory,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendType::Yaml => write!(f, "YAML"),
            BackendType::Sqlite => write!(f, "SQLite"),
            BackendType::Memory => write!(f, "memory"),
        }
    }
}

impl std::str::FromStr for BackendType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "yaml" | "yml" => Ok(BackendType::Yaml),
            "sqlite" | "db" => Ok(BackendType::Sqlite),
            "memory" | "mem" => Ok(BackendType::Memory),
            other => anyhow::bail!("Unknown backend type: {}", other),
        }
    }
}

/// Core trait for database backends
///
/// Every mutation goes through `update_atomically`: the backend loads the
/// current library, hands it to the closure, and persists the result as one
/// batch while holding its write lock. If the closure or the write fails,
/// nothing is persisted.
pub trait DatabaseBackend: Send + Sync {
    /// Returns the backend type
    fn backend_type(&self) -> BackendType;

    /// Returns the path to the database file
    fn path(&self) -> &std::path::Path;

    /// Loads the entire library
    fn load(&self) -> Result<Library>;

    /// Replaces the entire library
    fn save(&self, library: &Library) -> Result<()>;

    /// Performs an atomic read-modify-write of the library
    fn update_atomically(
        &self,
        update_fn: &mut dyn FnMut(&mut Library) -> Result<()>,
    ) -> Result<Library>;

    // =========================================================================
    // Read helpers
    // =========================================================================

    /// Lists groups in display order
    fn list_groups(&self) -> Result<Vec<Group>> {
        Ok(self.load()?.groups_ordered())
    }

    /// Lists rules in display order
    fn list_rules(&self) -> Result<Vec<Rule>> {
        Ok(self.load()?.rules_ordered())
    }

    // =========================================================================
    // Utility Operations
    // =========================================================================

    /// Returns true if the database file exists
    fn exists(&self) -> bool {
        self.path().exists()
    }

    /// Creates the database with empty data if it doesn't exist
    fn create_if_not_exists(&self) -> Result<()> {
        if !self.exists() {
            self.save(&Library::new())?;
        }
        Ok(())
    }

    /// Returns statistics about the database
    fn stats(&self) -> Result<DatabaseStats> {
        let library = self.load()?;
        Ok(DatabaseStats {
            group_count: library.groups.len(),
            rule_count: library.rules.len(),
            ungrouped_rule_count: library.rules_without_group().len(),
            backend_type: self.backend_type(),
        })
    }
}

/// Statistics about a database
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    pub group_count: usize,
    pub rule_count: usize,
    pub ungrouped_rule_count: usize,
    pub backend_type: BackendType,
}
