//! Rule ordering, selection batches and group tag rewriting
//!
//! Each public operation is a single read-modify-write against the record
//! store. The free functions work on any `RuleRecords`; `RuleManager` wraps
//! each of them in one atomic update.

use std::sync::Arc;
use uuid::Uuid;

use crate::db::{transact, DatabaseBackend, RuleRecords};
use crate::error::{Result, ShelfError};
use crate::models::Rule;
use crate::tags::normalize_group_name;

/// Gives a rule an order below every other rule
pub fn move_to_top<R: RuleRecords + ?Sized>(records: &mut R, id: &Uuid) -> Result<Rule> {
    let mut rule = records.get_rule(id).ok_or(ShelfError::RuleNotFound(*id))?;
    let min = records.min_rule_order().unwrap_or(0);
    rule.order = min.checked_sub(1).ok_or(ShelfError::OrderOverflow)?;
    records.update_rules(std::slice::from_ref(&rule));
    Ok(rule)
}

/// Renumbers every rule 1..=n keeping the current relative sequence
pub fn renumber<R: RuleRecords + ?Sized>(records: &mut R) -> usize {
    let mut rules = records.rules_ordered();
    for (index, rule) in rules.iter_mut().enumerate() {
        rule.order = index as i64 + 1;
    }
    records.update_rules(&rules)
}

/// Tags every rule that has no group with `group`
pub fn adopt_ungrouped<R: RuleRecords + ?Sized>(records: &mut R, group: &str) -> Result<usize> {
    let group = normalize_group_name(group)?;
    let mut rules = records.rules_without_group();
    for rule in rules.iter_mut() {
        rule.groups.insert(&group)?;
    }
    Ok(records.update_rules(&rules))
}

/// Replaces `old` with `new` in every rule tagged `old`.
///
/// A missing or blank `new` removes the tag. Rules already tagged `new`
/// keep a single copy of it.
pub fn rename_group<R: RuleRecords + ?Sized>(
    records: &mut R,
    old: &str,
    new: Option<&str>,
) -> Result<usize> {
    let new = match new.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => Some(normalize_group_name(name)?),
        None => None,
    };

    let mut rules = records.rules_in_group(old);
    for rule in rules.iter_mut() {
        rule.groups.remove(old);
        if let Some(new) = &new {
            rule.groups.insert(new)?;
        }
    }
    Ok(records.update_rules(&rules))
}

/// Removes `group` from every rule tagged with it
pub fn remove_group<R: RuleRecords + ?Sized>(records: &mut R, group: &str) -> Result<usize> {
    rename_group(records, group, None)
}

/// Applies rule operations against an injected record store
#[derive(Clone)]
pub struct RuleManager {
    store: Arc<dyn DatabaseBackend>,
}

impl RuleManager {
    pub fn new(store: Arc<dyn DatabaseBackend>) -> Self {
        Self { store }
    }

    /// Stores a new rule after every existing one
    pub fn add_rule(&self, rule: Rule) -> Result<Rule> {
        transact(self.store.as_ref(), |library| {
            if library.get_rule(&rule.id).is_some() {
                return Err(ShelfError::DuplicateRule(rule.id));
            }
            let mut rule = rule.clone();
            rule.order = library
                .max_rule_order()
                .unwrap_or(0)
                .checked_add(1)
                .ok_or(ShelfError::OrderOverflow)?;
            library.insert_rule(rule.clone());
            Ok(rule)
        })
    }

    /// Writes the given rules back as one batch
    pub fn update_rules(&self, rules: &[Rule]) -> Result<usize> {
        let updated = transact(self.store.as_ref(), |library| Ok(library.update_rules(rules)))?;
        log::info!("Updated {} of {} rules", updated, rules.len());
        Ok(updated)
    }

    pub fn delete_rules(&self, ids: &[Uuid]) -> Result<usize> {
        let deleted = transact(self.store.as_ref(), |library| Ok(library.delete_rules(ids)))?;
        log::info!("Deleted {} rules", deleted);
        Ok(deleted)
    }

    pub fn enable_selection(&self, ids: &[Uuid]) -> Result<usize> {
        self.set_enabled(ids, true)
    }

    pub fn disable_selection(&self, ids: &[Uuid]) -> Result<usize> {
        self.set_enabled(ids, false)
    }

    fn set_enabled(&self, ids: &[Uuid], enabled: bool) -> Result<usize> {
        let changed = transact(self.store.as_ref(), |library| {
            let selection: Vec<Rule> = ids
                .iter()
                .filter_map(|id| library.get_rule(id))
                .map(|mut rule| {
                    rule.is_enabled = enabled;
                    rule
                })
                .collect();
            Ok(library.update_rules(&selection))
        })?;
        log::info!(
            "{} {} rules",
            if enabled { "Enabled" } else { "Disabled" },
            changed
        );
        Ok(changed)
    }

    pub fn move_to_top(&self, id: &Uuid) -> Result<Rule> {
        let rule = transact(self.store.as_ref(), |library| move_to_top(library, id))?;
        log::info!("Moved rule '{}' to top (order {})", rule.name, rule.order);
        Ok(rule)
    }

    pub fn renumber(&self) -> Result<usize> {
        let count = transact(self.store.as_ref(), |library| Ok(renumber(library)))?;
        log::info!("Renumbered {} rules", count);
        Ok(count)
    }

    /// Tags every ungrouped rule with `group`
    pub fn add_group_to_ungrouped(&self, group: &str) -> Result<usize> {
        let count = transact(self.store.as_ref(), |library| adopt_ungrouped(library, group))?;
        log::info!("Added group '{}' to {} ungrouped rules", group.trim(), count);
        Ok(count)
    }

    /// Renames, or with `new` absent removes, a group across all rules
    pub fn rename_group(&self, old: &str, new: Option<&str>) -> Result<usize> {
        let count = transact(self.store.as_ref(), |library| rename_group(library, old, new))?;
        log::info!(
            "Renamed group '{}' to {:?} on {} rules",
            old.trim(),
            new.map(str::trim),
            count
        );
        Ok(count)
    }

    pub fn delete_group(&self, group: &str) -> Result<usize> {
        let count = transact(self.store.as_ref(), |library| remove_group(library, group))?;
        log::info!("Removed group '{}' from {} rules", group.trim(), count);
        Ok(count)
    }

    /// Rules in display order
    pub fn list_rules(&self) -> Result<Vec<Rule>> {
        Ok(self.store.list_rules()?)
    }

    pub fn get_rule(&self, id: &Uuid) -> Result<Rule> {
        self.store
            .load()?
            .get_rule(id)
            .ok_or(ShelfError::RuleNotFound(*id))
    }

    /// Distinct group names in use
    pub fn group_names(&self) -> Result<Vec<String>> {
        Ok(self.store.load()?.group_names())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryBackend, SqliteBackend, YamlBackend};
    use crate::models::Library;
    use crate::tags::GroupTags;
    use std::thread;
    use tempfile::{NamedTempFile, TempDir};

    fn tags(field: &str) -> GroupTags {
        GroupTags::parse(Some(field))
    }

    fn groups_of(library: &Library, name: &str) -> GroupTags {
        library
            .rules
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.groups.clone())
            .unwrap()
    }

    #[test]
    fn test_move_to_top_goes_below_everything() {
        let mut library = Library::new();
        let r = Rule::new("r", "x", "y").with_order(5);
        let id = r.id;
        library.insert_rule(Rule::new("a", "x", "y").with_order(-2));
        library.insert_rule(r);
        library.insert_rule(Rule::new("b", "x", "y").with_order(3));

        let first = move_to_top(&mut library, &id).unwrap();
        assert_eq!(first.order, -3);
        assert!(library.rules.iter().filter(|r| r.id != id).all(|r| r.order > first.order));

        let second = move_to_top(&mut library, &id).unwrap();
        assert!(second.order < first.order);
        assert_eq!(library.rules_ordered()[0].id, id);
    }

    #[test]
    fn test_move_to_top_unknown_rule() {
        let mut library = Library::new();
        let err = move_to_top(&mut library, &Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, ShelfError::RuleNotFound(_)));
    }

    #[test]
    fn test_move_to_top_checks_order_range() {
        let mut library = Library::new();
        let r = Rule::new("r", "x", "y").with_order(i64::MIN);
        let id = r.id;
        library.insert_rule(r);
        assert!(matches!(
            move_to_top(&mut library, &id),
            Err(ShelfError::OrderOverflow)
        ));
    }

    #[test]
    fn test_renumber_compacts_keeping_sequence() {
        let mut library = Library::new();
        for (name, order) in [("d", 1000), ("b", 10), ("a", -3), ("c", 10)] {
            library.insert_rule(Rule::new(name, "x", "y").with_order(order));
        }

        assert_eq!(renumber(&mut library), 4);

        let ordered: Vec<(String, i64)> = library
            .rules_ordered()
            .into_iter()
            .map(|r| (r.name, r.order))
            .collect();
        assert_eq!(
            ordered,
            vec![
                ("a".to_string(), 1),
                ("b".to_string(), 2),
                ("c".to_string(), 3),
                ("d".to_string(), 4)
            ]
        );
    }

    #[test]
    fn test_rename_is_token_substitution() {
        let mut library = Library::new();
        library.insert_rule(Rule::new("ab", "x", "y").with_groups("a,b"));
        library.insert_rule(Rule::new("only-a", "x", "y").with_groups("a"));
        library.insert_rule(Rule::new("only-b", "x", "y").with_groups("b"));

        assert_eq!(rename_group(&mut library, "a", Some("c")).unwrap(), 2);
        assert_eq!(groups_of(&library, "ab"), tags("c,b"));
        assert_eq!(groups_of(&library, "only-a"), tags("c"));
        assert_eq!(groups_of(&library, "only-b"), tags("b"));
    }

    #[test]
    fn test_rename_to_empty_removes() {
        let mut library = Library::new();
        library.insert_rule(Rule::new("only-a", "x", "y").with_groups("a"));

        assert_eq!(rename_group(&mut library, "a", Some("")).unwrap(), 1);
        assert!(groups_of(&library, "only-a").is_empty());
        assert_eq!(library.rules_without_group().len(), 1);
    }

    #[test]
    fn test_rename_merges_without_duplicates() {
        let mut library = Library::new();
        library.insert_rule(Rule::new("ac", "x", "y").with_groups("a,c"));

        rename_group(&mut library, "a", Some("c")).unwrap();
        assert_eq!(groups_of(&library, "ac"), tags("c"));
        assert_eq!(library.rules[0].groups.to_field().as_deref(), Some("c"));
    }

    #[test]
    fn test_rename_ignores_prefix_names() {
        let mut library = Library::new();
        library.insert_rule(Rule::new("sci", "x", "y").with_groups("science"));

        assert_eq!(rename_group(&mut library, "sci", Some("x")).unwrap(), 0);
        assert_eq!(groups_of(&library, "sci"), tags("science"));
    }

    #[test]
    fn test_rename_rejects_delimiter_in_target() {
        let mut library = Library::new();
        library.insert_rule(Rule::new("r", "x", "y").with_groups("a"));

        let err = rename_group(&mut library, "a", Some("b,c")).unwrap_err();
        assert!(matches!(err, ShelfError::InvalidGroupName(_)));
        assert_eq!(groups_of(&library, "r"), tags("a"));
    }

    #[test]
    fn test_remove_group() {
        let mut library = Library::new();
        library.insert_rule(Rule::new("ab", "x", "y").with_groups("a,b"));
        library.insert_rule(Rule::new("b", "x", "y").with_groups("b"));

        assert_eq!(remove_group(&mut library, "a").unwrap(), 1);
        assert_eq!(groups_of(&library, "ab"), tags("b"));
        assert_eq!(groups_of(&library, "b"), tags("b"));
    }

    #[test]
    fn test_adopt_ungrouped() {
        let mut library = Library::new();
        library.insert_rule(Rule::new("none", "x", "y"));
        library.insert_rule(Rule::new("blank", "x", "y").with_groups(" , "));
        library.insert_rule(Rule::new("tagged", "x", "y").with_groups("a"));

        assert_eq!(adopt_ungrouped(&mut library, "x").unwrap(), 2);
        assert_eq!(groups_of(&library, "none"), tags("x"));
        assert_eq!(groups_of(&library, "blank"), tags("x"));
        assert_eq!(groups_of(&library, "tagged"), tags("a"));

        assert!(matches!(
            adopt_ungrouped(&mut library, "  "),
            Err(ShelfError::InvalidGroupName(_))
        ));
    }

    #[test]
    fn test_manager_selection_batches() {
        let manager = RuleManager::new(Arc::new(MemoryBackend::new()));
        let a = manager.add_rule(Rule::new("a", "x", "y")).unwrap();
        let b = manager.add_rule(Rule::new("b", "x", "y")).unwrap();
        let c = manager.add_rule(Rule::new("c", "x", "y")).unwrap();
        assert_eq!([a.order, b.order, c.order], [1, 2, 3]);

        assert_eq!(manager.disable_selection(&[a.id, b.id]).unwrap(), 2);
        assert!(!manager.get_rule(&a.id).unwrap().is_enabled);
        assert!(manager.get_rule(&c.id).unwrap().is_enabled);

        assert_eq!(manager.enable_selection(&[a.id, Uuid::new_v4()]).unwrap(), 1);
        assert!(manager.get_rule(&a.id).unwrap().is_enabled);

        assert_eq!(manager.delete_rules(&[b.id, c.id]).unwrap(), 2);
        let remaining: Vec<Uuid> = manager.list_rules().unwrap().iter().map(|r| r.id).collect();
        assert_eq!(remaining, vec![a.id]);

        let mut edited = manager.get_rule(&a.id).unwrap();
        edited.replacement = "z".to_string();
        assert_eq!(manager.update_rules(&[edited]).unwrap(), 1);
        assert_eq!(manager.get_rule(&a.id).unwrap().replacement, "z");
    }

    #[test]
    fn test_failed_write_applies_nothing() {
        let backend = Arc::new(MemoryBackend::new());
        let manager = RuleManager::new(backend.clone());
        for name in ["one", "two", "three"] {
            manager.add_rule(Rule::new(name, "x", "y").with_groups("a")).unwrap();
        }

        backend.fail_next_write();
        let err = manager.rename_group("a", Some("b")).unwrap_err();
        assert!(err.is_store_error());

        assert_eq!(manager.group_names().unwrap(), vec!["a"]);
    }

    #[test]
    fn test_yaml_and_sqlite_backends_agree() {
        let temp_dir = TempDir::new().unwrap();
        let sqlite_file = NamedTempFile::with_suffix(".db").unwrap();
        let backends: Vec<Arc<dyn DatabaseBackend>> = vec![
            Arc::new(YamlBackend::new(temp_dir.path().join("shelf.yaml"))),
            Arc::new(SqliteBackend::new(sqlite_file.path()).unwrap()),
            Arc::new(MemoryBackend::new()),
        ];

        for backend in backends {
            let manager = RuleManager::new(backend.clone());
            let tagged = manager.add_rule(Rule::new("tagged", "x", "y").with_groups("a,b")).unwrap();
            manager.add_rule(Rule::new("loose", "x", "y")).unwrap();

            assert_eq!(manager.add_group_to_ungrouped("misc").unwrap(), 1);
            assert_eq!(manager.rename_group("a", Some("b")).unwrap(), 1);
            assert_eq!(manager.delete_group("misc").unwrap(), 1);
            manager.move_to_top(&tagged.id).unwrap();
            manager.renumber().unwrap();

            let rules = manager.list_rules().unwrap();
            assert_eq!(rules[0].id, tagged.id, "{} backend", backend.backend_type());
            assert_eq!(rules[0].order, 1);
            assert_eq!(rules[0].groups, tags("b"));
            assert!(rules[1].groups.is_empty());
            assert_eq!(manager.group_names().unwrap(), vec!["b"]);
        }
    }

    #[test]
    fn test_add_rule_rejects_existing_id() {
        let temp_dir = TempDir::new().unwrap();
        let sqlite_file = NamedTempFile::with_suffix(".db").unwrap();
        let backends: Vec<Arc<dyn DatabaseBackend>> = vec![
            Arc::new(YamlBackend::new(temp_dir.path().join("shelf.yaml"))),
            Arc::new(SqliteBackend::new(sqlite_file.path()).unwrap()),
            Arc::new(MemoryBackend::new()),
        ];

        for backend in backends {
            let manager = RuleManager::new(backend.clone());
            let rule = Rule::new("original", "x", "y").with_groups("a");
            manager.add_rule(rule.clone()).unwrap();

            let mut copy = rule.clone();
            copy.name = "copy".to_string();
            let err = manager.add_rule(copy).unwrap_err();
            assert!(
                matches!(err, ShelfError::DuplicateRule(id) if id == rule.id),
                "{} backend",
                backend.backend_type()
            );
            assert!(!err.is_store_error());

            let rules = manager.list_rules().unwrap();
            assert_eq!(rules.len(), 1);
            assert_eq!(rules[0].name, "original");
        }
    }

    #[test]
    fn test_concurrent_renames_do_not_lose_updates() {
        let temp_dir = TempDir::new().unwrap();
        let sqlite_file = NamedTempFile::with_suffix(".db").unwrap();
        let backends: Vec<Arc<dyn DatabaseBackend>> = vec![
            Arc::new(YamlBackend::new(temp_dir.path().join("shelf.yaml"))),
            Arc::new(SqliteBackend::new(sqlite_file.path()).unwrap()),
            Arc::new(MemoryBackend::new()),
        ];

        for backend in backends {
            let manager = RuleManager::new(backend);
            for i in 0..20 {
                manager
                    .add_rule(Rule::new(format!("r{}", i), "x", "y").with_groups("a,b"))
                    .unwrap();
            }

            let first = manager.clone();
            let second = manager.clone();
            let t1 = thread::spawn(move || first.rename_group("a", Some("x")));
            let t2 = thread::spawn(move || second.rename_group("b", Some("y")));
            assert_eq!(t1.join().unwrap().unwrap(), 20);
            assert_eq!(t2.join().unwrap().unwrap(), 20);

            for rule in manager.list_rules().unwrap() {
                assert_eq!(rule.groups, tags("x,y"));
            }
        }
    }
}
