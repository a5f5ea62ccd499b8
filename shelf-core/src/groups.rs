//! Group identity allocation
//!
//! Every group gets its own bit so that membership in several groups can be
//! stored on a book as one OR-ed `GroupMask`.
//!
//! Deleting a group frees its bit for the next allocation but does not touch
//! masks stored elsewhere. `delete_groups` returns the freed bits; owners of
//! stored masks prune them with `GroupMask::retain` against `used_ids()`,
//! otherwise a later group that reuses the bit would inherit the stale
//! membership.

use std::sync::Arc;

use crate::db::{transact, DatabaseBackend, GroupRecords};
use crate::error::{Result, ShelfError};
use crate::models::{Group, GroupId, GroupMask, MAX_GROUPS};

/// Builds and inserts a new group with the lowest free id, appended after
/// every existing group in display order
pub fn allocate_group<R: GroupRecords + ?Sized>(records: &mut R, name: &str) -> Result<Group> {
    let used = records.used_ids();
    let id = used
        .lowest_free()
        .ok_or(ShelfError::CapacityExhausted { max: MAX_GROUPS })?;

    let order = records
        .max_group_order()
        .unwrap_or(0)
        .checked_add(1)
        .ok_or(ShelfError::OrderOverflow)?;

    let group = Group::new(id, name, order);
    records.insert_group(group.clone());
    Ok(group)
}

/// Creates, updates and deletes groups against an injected record store
#[derive(Clone)]
pub struct GroupAllocator {
    store: Arc<dyn DatabaseBackend>,
}

impl GroupAllocator {
    pub fn new(store: Arc<dyn DatabaseBackend>) -> Self {
        Self { store }
    }

    /// Allocates a bit-disjoint id for `name` and stores the new group
    pub fn add_group(&self, name: &str) -> Result<Group> {
        let group = transact(self.store.as_ref(), |library| allocate_group(library, name))?;
        log::info!("Created group '{}' with id {} (order {})", group.name, group.id, group.order);
        Ok(group)
    }

    /// Stores changed names and orders; ids must already exist
    pub fn update_groups(&self, groups: &[Group]) -> Result<usize> {
        let updated = transact(self.store.as_ref(), |library| Ok(library.update_groups(groups)))?;
        log::info!("Updated {} of {} groups", updated, groups.len());
        Ok(updated)
    }

    /// Renames a single group
    pub fn rename_group(&self, id: GroupId, name: &str) -> Result<Group> {
        self.modify_group(id, |group| group.name = name.to_string())
    }

    /// Moves a single group to a new display order
    pub fn reorder_group(&self, id: GroupId, order: i64) -> Result<Group> {
        self.modify_group(id, |group| group.order = order)
    }

    fn modify_group(&self, id: GroupId, change: impl Fn(&mut Group)) -> Result<Group> {
        transact(self.store.as_ref(), |library| {
            let mut group = library
                .groups_ordered()
                .into_iter()
                .find(|g| g.id == id)
                .ok_or(ShelfError::GroupNotFound(id.get()))?;
            change(&mut group);
            library.update_groups(std::slice::from_ref(&group));
            Ok(group)
        })
    }

    /// Deletes groups and returns the bits that were freed
    pub fn delete_groups(&self, ids: &[GroupId]) -> Result<GroupMask> {
        let freed = transact(self.store.as_ref(), |library| {
            let before = library.used_ids();
            library.delete_groups(ids);
            Ok(GroupMask::from_bits(before.bits() & !library.used_ids().bits()))
        })?;
        log::info!("Deleted {} groups (freed bits {:#x})", freed.len(), freed.bits());
        Ok(freed)
    }

    /// Groups in display order
    pub fn list_groups(&self) -> Result<Vec<Group>> {
        Ok(self.store.list_groups()?)
    }

    /// Combined mask of every live group id
    pub fn used_ids(&self) -> Result<GroupMask> {
        Ok(self.store.load()?.used_ids())
    }
}
