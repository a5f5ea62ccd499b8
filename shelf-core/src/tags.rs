//! Multi-group tag set carried by a rule
//!
//! In memory a rule's groups are a real set of names. The comma-delimited
//! scalar form only exists at the store boundary (`parse` / `to_field`).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::ShelfError;

/// Delimiter used by the persisted group field
pub const TAG_DELIMITER: char = ',';

/// Set of group names a rule belongs to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupTags(BTreeSet<String>);

impl GroupTags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the persisted group field.
    ///
    /// Tokens are trimmed and blank tokens dropped, so a field holding only
    /// delimiters or whitespace yields an empty set.
    pub fn parse(field: Option<&str>) -> Self {
        let field = field.unwrap_or_default();
        let raw: Vec<&str> = field.split(TAG_DELIMITER).map(str::trim).collect();
        if !field.is_empty() && raw.iter().any(|t| t.is_empty()) {
            log::warn!("Ignoring blank group names in field {:?}", field);
        }

        let tokens = raw
            .into_iter()
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        Self(tokens)
    }

    /// Serializes back to the persisted form; an empty set has no field
    pub fn to_field(&self) -> Option<String> {
        if self.0.is_empty() {
            None
        } else {
            let joined: Vec<&str> = self.0.iter().map(String::as_str).collect();
            Some(joined.join(&TAG_DELIMITER.to_string()))
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name.trim())
    }

    /// Adds a group name; returns false if it was already present
    pub fn insert(&mut self, name: &str) -> Result<bool, ShelfError> {
        let name = normalize_group_name(name)?;
        Ok(self.0.insert(name))
    }

    /// Removes a group name; returns false if it was not present
    pub fn remove(&mut self, name: &str) -> bool {
        self.0.remove(name.trim())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// Trims a group name and checks it can be stored as a single token
pub fn normalize_group_name(name: &str) -> Result<String, ShelfError> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.contains(TAG_DELIMITER) {
        return Err(ShelfError::InvalidGroupName(name.to_string()));
    }
    Ok(trimmed.to_string())
}

impl fmt::Display for GroupTags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_field().unwrap_or_default())
    }
}

impl<'a> FromIterator<&'a str> for GroupTags {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut tags = GroupTags::new();
        for name in iter {
            if let Err(e) = tags.insert(name) {
                log::warn!("Skipping group name: {}", e);
            }
        }
        tags
    }
}

impl Serialize for GroupTags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_field().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for GroupTags {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let field: Option<String> = Option::deserialize(deserializer)?;
        Ok(GroupTags::parse(field.as_deref()))
    }
}
