pub mod config;
pub mod db;
pub mod error;
pub mod executor;
pub mod groups;
pub mod models;
pub mod rules;
pub mod storage;
pub mod tags;

// Re-export commonly used types
pub use config::{
    determine_library_location, get_config_path, Config, LibraryLocation, CONFIG_PATH_ENV,
    LIBRARY_PATH_ENV,
};
pub use db::{
    create_backend, open_or_create, BackendType, DatabaseBackend, DatabaseStats, GroupRecords,
    MemoryBackend, RuleRecords, SqliteBackend, YamlBackend,
};
pub use error::ShelfError;
pub use executor::{execute, Task};
pub use groups::{allocate_group, GroupAllocator};
pub use models::{Group, GroupId, GroupMask, Library, Rule, MAX_GROUPS};
pub use rules::RuleManager;
pub use storage::Storage;
pub use tags::{GroupTags, TAG_DELIMITER};
