//! Record capabilities the allocator and the tag rewriter need from a store
//!
//! `Library` implements both traits; backends hand one out inside
//! `DatabaseBackend::update_atomically`, so every read and write an
//! operation makes through these traits lands in a single transaction.

use uuid::Uuid;

use crate::models::{Group, GroupId, GroupMask, Library, Rule};

/// Group capabilities
pub trait GroupRecords {
    fn insert_group(&mut self, group: Group);

    /// Replaces stored groups with the same id; returns how many matched
    fn update_groups(&mut self, groups: &[Group]) -> usize;

    /// Removes groups by id; returns how many were removed
    fn delete_groups(&mut self, ids: &[GroupId]) -> usize;

    /// Bitwise OR of every group id
    fn used_ids(&self) -> GroupMask;

    /// Highest group order, `None` when there are no groups
    fn max_group_order(&self) -> Option<i64>;

    /// All groups sorted by display order
    fn groups_ordered(&self) -> Vec<Group>;
}

/// Rule capabilities
pub trait RuleRecords {
    fn insert_rule(&mut self, rule: Rule);

    /// Replaces stored rules with the same id; returns how many matched
    fn update_rules(&mut self, rules: &[Rule]) -> usize;

    /// Removes rules by id; returns how many were removed
    fn delete_rules(&mut self, ids: &[Uuid]) -> usize;

    fn get_rule(&self, id: &Uuid) -> Option<Rule>;

    /// All rules sorted by order; equal orders keep their stored sequence
    fn rules_ordered(&self) -> Vec<Rule>;

    fn min_rule_order(&self) -> Option<i64>;

    fn max_rule_order(&self) -> Option<i64>;

    /// Rules carrying no group at all
    fn rules_without_group(&self) -> Vec<Rule>;

    /// Rules whose tag set contains `name` as a whole token
    fn rules_in_group(&self, name: &str) -> Vec<Rule>;

    /// Distinct group names used by any rule, sorted
    fn group_names(&self) -> Vec<String>;
}

impl GroupRecords for Library {
    fn insert_group(&mut self, group: Group) {
        self.groups.push(group);
    }

    fn update_groups(&mut self, groups: &[Group]) -> usize {
        let mut matched = 0;
        for group in groups {
            if let Some(existing) = self.groups.iter_mut().find(|g| g.id == group.id) {
                *existing = group.clone();
                matched += 1;
            }
        }
        matched
    }

    fn delete_groups(&mut self, ids: &[GroupId]) -> usize {
        let before = self.groups.len();
        self.groups.retain(|g| !ids.contains(&g.id));
        before - self.groups.len()
    }

    fn used_ids(&self) -> GroupMask {
        GroupMask::from_ids(self.groups.iter().map(|g| g.id))
    }

    fn max_group_order(&self) -> Option<i64> {
        self.groups.iter().map(|g| g.order).max()
    }

    fn groups_ordered(&self) -> Vec<Group> {
        let mut groups = self.groups.clone();
        groups.sort_by_key(|g| g.order);
        groups
    }
}

impl RuleRecords for Library {
    fn insert_rule(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    fn update_rules(&mut self, rules: &[Rule]) -> usize {
        let mut matched = 0;
        for rule in rules {
            if let Some(existing) = self.rules.iter_mut().find(|r| r.id == rule.id) {
                *existing = rule.clone();
                matched += 1;
            }
        }
        matched
    }

    fn delete_rules(&mut self, ids: &[Uuid]) -> usize {
        let before = self.rules.len();
        self.rules.retain(|r| !ids.contains(&r.id));
        before - self.rules.len()
    }

    fn get_rule(&self, id: &Uuid) -> Option<Rule> {
        self.rules.iter().find(|r| &r.id == id).cloned()
    }

    fn rules_ordered(&self) -> Vec<Rule> {
        let mut rules = self.rules.clone();
        // sort_by_key is stable, which keeps ties in stored sequence
        rules.sort_by_key(|r| r.order);
        rules
    }

    fn min_rule_order(&self) -> Option<i64> {
        self.rules.iter().map(|r| r.order).min()
    }

    fn max_rule_order(&self) -> Option<i64> {
        self.rules.iter().map(|r| r.order).max()
    }

    fn rules_without_group(&self) -> Vec<Rule> {
        self.rules
            .iter()
            .filter(|r| r.groups.is_empty())
            .cloned()
            .collect()
    }

    fn rules_in_group(&self, name: &str) -> Vec<Rule> {
        self.rules
            .iter()
            .filter(|r| r.groups.contains(name))
            .cloned()
            .collect()
    }

    fn group_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .rules
            .iter()
            .flat_map(|r| r.groups.iter().map(str::to_string))
            .collect();
        names.sort();
        names.dedup();
        names
    }
}
