use clap::{Parser, Subcommand};
use std::path::PathBuf;

use shelf_core::BackendType;

#[derive(Parser, Debug)]
#[command(author, version, about = "Manage book groups and replacement rule groups")]
pub struct Cli {
    /// Path to the library file (.yaml or .db)
    #[arg(long, short = 'l', global = true)]
    pub library: Option<PathBuf>,

    /// Storage backend, inferred from the file extension when omitted
    #[arg(long, global = true)]
    pub backend: Option<BackendType>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage book groups
    #[command(subcommand)]
    Group(GroupCommand),

    /// Manage replacement rules
    #[command(subcommand)]
    Rule(RuleCommand),

    /// Manage the group tags carried by rules
    #[command(subcommand)]
    Tag(TagCommand),

    /// Library file operations
    #[command(subcommand)]
    Db(DbCommand),
}

#[derive(Subcommand, Debug)]
pub enum GroupCommand {
    /// Create a group with the next free id
    Add {
        /// Display name of the group
        name: String,
    },

    /// List groups in display order
    List,

    /// Rename a group
    Rename {
        /// Group id
        id: u64,
        /// New display name
        name: String,
    },

    /// Set the display order of a group
    Order {
        /// Group id
        id: u64,
        /// New order value
        #[arg(allow_hyphen_values = true)]
        order: i64,
    },

    /// Delete groups
    Del {
        /// Group ids
        #[arg(required = true)]
        ids: Vec<u64>,

        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum RuleCommand {
    /// Add a rule after all existing rules
    Add {
        /// Name of the rule
        #[arg(long)]
        name: String,

        /// Text or regular expression to find
        #[arg(long)]
        pattern: String,

        /// Replacement text
        #[arg(long, default_value = "")]
        replacement: String,

        /// Comma-separated group names
        #[arg(long)]
        group: Option<String>,

        /// Treat the pattern as a regular expression
        #[arg(long)]
        regex: bool,

        /// Create the rule disabled
        #[arg(long)]
        disabled: bool,
    },

    /// List rules in order
    List {
        /// Only rules tagged with this group
        #[arg(long)]
        group: Option<String>,

        /// Only rules without any group
        #[arg(long, conflicts_with = "group")]
        ungrouped: bool,
    },

    /// Show a rule
    Show {
        /// Rule id or unique id prefix
        id: String,
    },

    /// Enable rules
    Enable {
        /// Rule ids or unique id prefixes
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Disable rules
    Disable {
        /// Rule ids or unique id prefixes
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Delete rules
    Del {
        /// Rule ids or unique id prefixes
        #[arg(required = true)]
        ids: Vec<String>,

        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Move a rule before every other rule
    Top {
        /// Rule id or unique id prefix
        id: String,
    },

    /// Renumber all rules 1..n in their current order
    Renumber,
}

#[derive(Subcommand, Debug)]
pub enum TagCommand {
    /// List group names used by rules
    List,

    /// Tag every ungrouped rule with a group
    Adopt {
        /// Group name
        group: String,
    },

    /// Rename a group on every rule; merges into NEW if already present
    Rename {
        /// Current group name
        old: String,
        /// New group name; omit to remove the group
        new: Option<String>,
    },

    /// Remove a group from every rule
    Del {
        /// Group name
        group: String,

        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum DbCommand {
    /// Print the path to the library file
    Path,

    /// Show counts for the library
    Stats,

    /// Copy the library into another file, converting the backend
    Migrate {
        /// Destination file (.yaml or .db)
        #[arg(long)]
        to: PathBuf,

        /// Destination backend, inferred from the extension when omitted
        #[arg(long)]
        to_backend: Option<BackendType>,
    },
}
