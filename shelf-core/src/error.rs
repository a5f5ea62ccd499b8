//! Error types shared by the group allocator and the rule tag rewriter

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during shelf operations
#[derive(Error, Debug)]
pub enum ShelfError {
    #[error("No free group id: all {max} group slots are in use")]
    CapacityExhausted { max: u32 },

    #[error("Rule not found: {0}")]
    RuleNotFound(Uuid),

    #[error("A rule with id {0} already exists")]
    DuplicateRule(Uuid),

    #[error("Group not found: {0}")]
    GroupNotFound(u64),

    #[error("Invalid group name: {0:?}")]
    InvalidGroupName(String),

    #[error("Order value out of range - renumber the list first")]
    OrderOverflow,

    #[error("Background task failed: {0}")]
    WorkerFailed(String),

    #[error("Store error: {0:#}")]
    Store(#[source] anyhow::Error),
}

impl ShelfError {
    /// Short message suitable for showing to a user
    pub fn user_message(&self) -> String {
        match self {
            ShelfError::Store(e) => e.root_cause().to_string(),
            other => other.to_string(),
        }
    }

    /// Returns true for failures reported by the record store
    pub fn is_store_error(&self) -> bool {
        matches!(self, ShelfError::Store(_))
    }
}

/// Domain errors raised inside an atomic update travel through `anyhow`;
/// recover them here so they are not misreported as store failures.
impl From<anyhow::Error> for ShelfError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<ShelfError>() {
            Ok(shelf_err) => shelf_err,
            Err(other) => ShelfError::Store(other),
        }
    }
}

pub type Result<T, E = ShelfError> = std::result::Result<T, E>;
