//! SQLite database storage backend
//!
//! This backend stores the library in a SQLite database file, providing
//! better concurrent access than the YAML file.

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::models::{Group, GroupId, Library, Rule};
use crate::tags::GroupTags;

use super::traits::{BackendType, DatabaseBackend};

/// Current schema version
const SCHEMA_VERSION: i32 = 1;

const GROUP_COLUMNS: &str = "id, name, sort_order";

const RULE_COLUMNS: &str =
    "id, name, pattern, replacement, group_tags, is_regex, is_enabled, sort_order";

/// SQLite backend implementation
pub struct SqliteBackend {
    path: PathBuf,
    conn: Mutex<Connection>,
}

/// Raw rule row before ids and tags are interpreted
type RuleRow = (String, String, String, String, Option<String>, bool, bool, i64);

impl SqliteBackend {
    /// Creates a new SQLite backend
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open SQLite database {:?}", path))?;

        // Enable WAL mode for better concurrent access
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        let backend = Self {
            path,
            conn: Mutex::new(conn),
        };

        backend.init_schema()?;
        Ok(backend)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("SQLite connection lock poisoned"))
    }

    /// Initialize the database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;

        // Check current schema version
        let current_version: i32 = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .unwrap_or(0);

        if current_version == 0 {
            log::debug!("Creating schema version {} in {:?}", SCHEMA_VERSION, self.path);
            conn.execute_batch(include_str!("schema.sql"))?;
        } else if current_version < SCHEMA_VERSION {
            anyhow::bail!(
                "Database schema version {} is outdated, expected {}",
                current_version,
                SCHEMA_VERSION
            );
        }

        Ok(())
    }

    fn group_from_row(raw_id: i64, name: String, order: i64) -> Result<Group> {
        let id = u64::try_from(raw_id)
            .ok()
            .and_then(GroupId::new)
            .with_context(|| format!("Group '{}' has invalid id {}", name, raw_id))?;
        Ok(Group { id, name, order })
    }

    fn rule_from_row(row: RuleRow) -> Result<Rule> {
        let (id_str, name, pattern, replacement, group_tags, is_regex, is_enabled, order) = row;
        let id = Uuid::parse_str(&id_str)
            .with_context(|| format!("Rule '{}' has invalid id {:?}", name, id_str))?;

        Ok(Rule {
            id,
            name,
            pattern,
            replacement,
            is_regex,
            is_enabled,
            groups: GroupTags::parse(group_tags.as_deref()),
            order,
        })
    }

    /// Load groups from database
    fn load_groups(conn: &Connection, order_by: &str) -> Result<Vec<Group>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM book_groups ORDER BY {}",
            GROUP_COLUMNS, order_by
        ))?;

        let rows = stmt.query_map([], |row| {
            let id: i64 = row.get(0)?;
            let name: String = row.get(1)?;
            let order: i64 = row.get(2)?;
            Ok((id, name, order))
        })?;

        let mut groups = Vec::new();
        for row_result in rows {
            let (id, name, order) = row_result?;
            groups.push(Self::group_from_row(id, name, order)?);
        }
        Ok(groups)
    }

    /// Load rules from database
    fn load_rules(conn: &Connection, order_by: &str) -> Result<Vec<Rule>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM replace_rules ORDER BY {}",
            RULE_COLUMNS, order_by
        ))?;

        let rows = stmt.query_map([], |row| -> rusqlite::Result<RuleRow> {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
            ))
        })?;

        let mut rules = Vec::new();
        for row_result in rows {
            rules.push(Self::rule_from_row(row_result?)?);
        }
        Ok(rules)
    }

    /// Load the library name
    fn load_name(conn: &Connection) -> Result<String> {
        let name: Option<String> = conn
            .query_row("SELECT name FROM metadata WHERE id = 1", [], |row| row.get(0))
            .optional()?;
        Ok(name.unwrap_or_default())
    }

    /// Reads the whole library in stored (insertion) sequence
    fn read_library(conn: &Connection) -> Result<Library> {
        Ok(Library {
            name: Self::load_name(conn)?,
            groups: Self::load_groups(conn, "rowid")?,
            rules: Self::load_rules(conn, "rowid")?,
        })
    }

    /// Save a group to the database
    fn save_group(conn: &Connection, group: &Group) -> Result<()> {
        conn.execute(
            "INSERT OR REPLACE INTO book_groups (id, name, sort_order) VALUES (?1, ?2, ?3)",
            params![group.id.get() as i64, group.name, group.order],
        )
        .with_context(|| format!("Failed to save group '{}'", group.name))?;
        Ok(())
    }

    /// Save a rule to the database
    fn save_rule(conn: &Connection, rule: &Rule) -> Result<()> {
        conn.execute(
            "INSERT OR REPLACE INTO replace_rules
             (id, name, pattern, replacement, group_tags, is_regex, is_enabled, sort_order)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                rule.id.to_string(),
                rule.name,
                rule.pattern,
                rule.replacement,
                rule.groups.to_field(),
                rule.is_regex,
                rule.is_enabled,
                rule.order,
            ],
        )
        .with_context(|| format!("Failed to save rule '{}' ({})", rule.name, rule.id))?;
        Ok(())
    }

    /// Replaces every row with the library contents.
    /// Callers run this inside a transaction.
    fn write_library(conn: &Connection, library: &Library) -> Result<()> {
        conn.execute("DELETE FROM book_groups", [])?;
        conn.execute("DELETE FROM replace_rules", [])?;

        for group in &library.groups {
            Self::save_group(conn, group)?;
        }

        for rule in &library.rules {
            Self::save_rule(conn, rule)?;
        }

        conn.execute(
            "INSERT OR REPLACE INTO metadata (id, name) VALUES (1, ?1)",
            params![library.name],
        )?;
        Ok(())
    }
}

impl DatabaseBackend for SqliteBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Sqlite
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Library> {
        let conn = self.lock()?;
        Self::read_library(&conn)
    }

    fn save(&self, library: &Library) -> Result<()> {
        library.validate_group_ids()?;

        let mut conn = self.lock()?;
        // Dropping the transaction without commit rolls it back
        let tx = conn.transaction()?;
        Self::write_library(&tx, library)?;
        tx.commit()?;
        Ok(())
    }

    fn update_atomically(
        &self,
        update_fn: &mut dyn FnMut(&mut Library) -> Result<()>,
    ) -> Result<Library> {
        let mut conn = self.lock()?;

        // IMMEDIATE takes the write lock before reading, so another process
        // cannot commit between our read and our write
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut library = Self::read_library(&tx)?;
        update_fn(&mut library)?;
        library.validate_group_ids()?;

        Self::write_library(&tx, &library)?;
        tx.commit()?;
        Ok(library)
    }

    // Ordered reads straight from the indexes

    fn list_groups(&self) -> Result<Vec<Group>> {
        let conn = self.lock()?;
        Self::load_groups(&conn, "sort_order, rowid")
    }

    fn list_rules(&self) -> Result<Vec<Rule>> {
        let conn = self.lock()?;
        Self::load_rules(&conn, "sort_order, rowid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::records::{GroupRecords, RuleRecords};
    use tempfile::NamedTempFile;

    #[test]
    fn test_sqlite_backend_create_and_load() {
        let temp_file = NamedTempFile::with_suffix(".db").unwrap();
        let backend = SqliteBackend::new(temp_file.path()).unwrap();

        backend.create_if_not_exists().unwrap();

        let library = backend.load().unwrap();
        assert!(library.groups.is_empty());
        assert!(library.rules.is_empty());
    }

    #[test]
    fn test_sqlite_backend_save_and_load() {
        let temp_file = NamedTempFile::with_suffix(".db").unwrap();
        let backend = SqliteBackend::new(temp_file.path()).unwrap();

        let mut library = Library::new();
        library.name = "Test DB".to_string();
        library.insert_group(Group::new(GroupId::new(1 << 62).unwrap(), "Top bit", 3));
        library.insert_rule(Rule::new("r1", "foo", "bar").with_groups("a,b"));
        library.insert_rule(Rule::new("r2", "baz", "qux"));

        backend.save(&library).unwrap();

        let loaded = backend.load().unwrap();
        assert_eq!(loaded.name, "Test DB");
        assert_eq!(loaded.groups, library.groups);
        assert_eq!(loaded.rules, library.rules);
    }

    #[test]
    fn test_sqlite_list_rules_orders_by_order_then_insertion() {
        let temp_file = NamedTempFile::with_suffix(".db").unwrap();
        let backend = SqliteBackend::new(temp_file.path()).unwrap();

        let mut library = Library::new();
        library.insert_rule(Rule::new("late", "x", "y").with_order(1000));
        library.insert_rule(Rule::new("tie-a", "x", "y").with_order(10));
        library.insert_rule(Rule::new("tie-b", "x", "y").with_order(10));
        library.insert_rule(Rule::new("early", "x", "y").with_order(-3));
        backend.save(&library).unwrap();

        let names: Vec<String> = backend.list_rules().unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["early", "tie-a", "tie-b", "late"]);
        assert_eq!(names, library.rules_ordered().into_iter().map(|r| r.name).collect::<Vec<_>>());
    }

    #[test]
    fn test_sqlite_failed_batch_rolls_back() {
        let temp_file = NamedTempFile::with_suffix(".db").unwrap();
        let backend = SqliteBackend::new(temp_file.path()).unwrap();

        let mut library = Library::new();
        library.insert_rule(Rule::new("first", "x", "y").with_groups("a"));
        library.insert_rule(Rule::new("second", "x", "y").with_groups("a"));
        backend.save(&library).unwrap();

        // The first rule is rewritten fine; the second violates the schema
        let result = backend.update_atomically(&mut |lib| {
            for rule in lib.rules.iter_mut() {
                rule.groups = GroupTags::parse(Some("c"));
            }
            lib.rules[1].name = String::new();
            Ok(())
        });
        assert!(result.is_err());

        let loaded = backend.load().unwrap();
        assert_eq!(loaded.rules_in_group("a").len(), 2);
        assert!(loaded.rules_in_group("c").is_empty());
    }
}
