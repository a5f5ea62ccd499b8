use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::tags::GroupTags;

/// Number of bits available for group ids.
///
/// Capped one below the width of `u64` so every id stays a positive
/// SQLite `INTEGER`.
pub const MAX_GROUPS: u32 = 63;

/// Identifier of a group: always exactly one set bit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct GroupId(u64);

impl GroupId {
    /// Creates an id from a raw value, which must be a power of two
    pub fn new(raw: u64) -> Option<Self> {
        if raw.is_power_of_two() && raw.trailing_zeros() < MAX_GROUPS {
            Some(Self(raw))
        } else {
            None
        }
    }

    /// Id for the given bit position
    pub fn from_bit(bit: u32) -> Option<Self> {
        if bit < MAX_GROUPS {
            Some(Self(1 << bit))
        } else {
            None
        }
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn bit(self) -> u32 {
        self.0.trailing_zeros()
    }
}

impl TryFrom<u64> for GroupId {
    type Error = String;

    fn try_from(raw: u64) -> Result<Self, Self::Error> {
        GroupId::new(raw).ok_or_else(|| format!("{} is not a valid group id", raw))
    }
}

impl From<GroupId> for u64 {
    fn from(id: GroupId) -> Self {
        id.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Combined membership of several groups, as stored on an owning record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupMask(u64);

impl GroupMask {
    pub const EMPTY: GroupMask = GroupMask(0);

    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub fn from_ids<I: IntoIterator<Item = GroupId>>(ids: I) -> Self {
        ids.into_iter().fold(Self::EMPTY, |mask, id| mask.with(id))
    }

    pub fn bits(self) -> u64 {
        self.0
    }

    pub fn contains(self, id: GroupId) -> bool {
        self.0 & id.0 != 0
    }

    pub fn insert(&mut self, id: GroupId) {
        self.0 |= id.0;
    }

    pub fn remove(&mut self, id: GroupId) {
        self.0 &= !id.0;
    }

    pub fn with(mut self, id: GroupId) -> Self {
        self.insert(id);
        self
    }

    /// Drops every bit not present in `live`, e.g. bits of deleted groups
    pub fn retain(self, live: GroupMask) -> Self {
        Self(self.0 & live.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> u32 {
        self.0.count_ones()
    }

    /// Iterates the group ids set in this mask, lowest bit first
    pub fn ids(self) -> impl Iterator<Item = GroupId> {
        (0..MAX_GROUPS).filter_map(move |bit| {
            let id = GroupId(1 << bit);
            self.contains(id).then_some(id)
        })
    }

    /// Lowest id not present in the mask, if any slot is left
    pub fn lowest_free(self) -> Option<GroupId> {
        GroupId::from_bit((!self.0).trailing_zeros())
    }
}

/// A named group with a bit-disjoint id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    /// Relative display position; not required to be contiguous
    pub order: i64,
}

impl Group {
    pub fn new(id: GroupId, name: impl Into<String>, order: i64) -> Self {
        Self {
            id,
            name: name.into(),
            order,
        }
    }
}

/// A text replacement rule that can be tagged with any number of groups
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Unique identifier, assigned on creation
    pub id: Uuid,
    pub name: String,
    pub pattern: String,
    pub replacement: String,
    #[serde(default)]
    pub is_regex: bool,
    #[serde(default = "default_enabled")]
    pub is_enabled: bool,
    /// Persisted as a single comma-delimited `group` field
    #[serde(rename = "group", default, skip_serializing_if = "GroupTags::is_empty")]
    pub groups: GroupTags,
    #[serde(default)]
    pub order: i64,
}

fn default_enabled() -> bool {
    true
}

impl Rule {
    pub fn new(name: impl Into<String>, pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            pattern: pattern.into(),
            replacement: replacement.into(),
            is_regex: false,
            is_enabled: true,
            groups: GroupTags::new(),
            order: 0,
        }
    }

    pub fn with_groups(mut self, field: &str) -> Self {
        self.groups = GroupTags::parse(Some(field));
        self
    }

    pub fn with_order(mut self, order: i64) -> Self {
        self.order = order;
        self
    }
}

/// Everything the record store persists
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Library {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl Library {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks that group ids are pairwise bit-disjoint
    pub fn validate_group_ids(&self) -> Result<()> {
        let mut seen = GroupMask::EMPTY;
        for group in &self.groups {
            if seen.contains(group.id) {
                anyhow::bail!(
                    "Group '{}' reuses id {} which belongs to another group",
                    group.name,
                    group.id
                );
            }
            seen.insert(group.id);
        }
        Ok(())
    }
}
