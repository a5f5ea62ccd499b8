mod cli;
mod prompts;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::sync::Arc;
use uuid::Uuid;

use shelf_core::db::copy_library;
use shelf_core::error::Result as ShelfResult;
use shelf_core::{
    create_backend, determine_library_location, execute, open_or_create, DatabaseBackend,
    GroupAllocator, GroupId, GroupTags, Rule, RuleManager,
};

use crate::cli::{Cli, Command, DbCommand, GroupCommand, RuleCommand, TagCommand};
use crate::prompts::confirm_or_skip;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    // Determine which library file to use
    let location = determine_library_location(cli.library.as_deref())?;
    let backend_type = cli.backend.or(location.backend);
    let backend: Arc<dyn DatabaseBackend> = Arc::from(
        open_or_create(&location.path, backend_type)
            .with_context(|| format!("Failed to open library {:?}", location.path))?,
    );

    match cli.command {
        Command::Group(group_cmd) => handle_group_command(group_cmd, GroupAllocator::new(backend)),
        Command::Rule(rule_cmd) => handle_rule_command(rule_cmd, RuleManager::new(backend)),
        Command::Tag(tag_cmd) => handle_tag_command(tag_cmd, RuleManager::new(backend)),
        Command::Db(db_cmd) => handle_db_command(db_cmd, backend),
    }
}

/// Runs a mutating operation in the background and prints its outcome
fn run<T, F, D>(label: &str, op: F, describe: D) -> Result<()>
where
    T: Send + 'static,
    F: FnOnce() -> ShelfResult<T> + Send + 'static,
    D: FnOnce(T) -> String,
{
    // The CLI has nothing else to do meanwhile, so block on the report
    match execute(label, op).wait() {
        Ok(value) => {
            println!("{}", describe(value).green());
            Ok(())
        }
        Err(err) => {
            log::debug!("{} failed: {:?}", label, err);
            Err(anyhow::anyhow!(err.user_message()))
        }
    }
}

fn parse_group_id(raw: u64) -> Result<GroupId> {
    GroupId::new(raw).with_context(|| format!("{} is not a group id (must be a power of two)", raw))
}

fn handle_group_command(cmd: GroupCommand, groups: GroupAllocator) -> Result<()> {
    match cmd {
        GroupCommand::Add { name } => run(
            "add group",
            move || groups.add_group(&name),
            |group| format!("Group '{}' created with id {}", group.name, group.id),
        ),
        GroupCommand::List => {
            let list = groups.list_groups()?;
            if list.is_empty() {
                println!("{}", "No groups found.".yellow());
                return Ok(());
            }

            println!("{:<20} | {:<4} | {:<8} | {}", "ID", "Bit", "Order", "Name");
            println!("{}", "-".repeat(60));
            for group in list {
                println!(
                    "{:<20} | {:<4} | {:<8} | {}",
                    group.id,
                    group.id.bit(),
                    group.order,
                    group.name.bold()
                );
            }
            Ok(())
        }
        GroupCommand::Rename { id, name } => {
            let id = parse_group_id(id)?;
            run(
                "rename group",
                move || groups.rename_group(id, &name),
                |group| format!("Group {} renamed to '{}'", group.id, group.name),
            )
        }
        GroupCommand::Order { id, order } => {
            let id = parse_group_id(id)?;
            run(
                "reorder group",
                move || groups.reorder_group(id, order),
                |group| format!("Group '{}' now at order {}", group.name, group.order),
            )
        }
        GroupCommand::Del { ids, yes } => {
            let ids = ids
                .into_iter()
                .map(parse_group_id)
                .collect::<Result<Vec<_>>>()?;

            let question = format!("Delete {} group(s)?", ids.len());
            if !confirm_or_skip(&question, yes)? {
                return Ok(());
            }

            run(
                "delete groups",
                move || groups.delete_groups(&ids),
                |freed| format!("Deleted {} group(s), freed bits {:#x}", freed.len(), freed.bits()),
            )
        }
    }
}

/// Resolves full ids or unique prefixes against the stored rules
fn resolve_rule_ids(rules: &[Rule], inputs: &[String]) -> Result<Vec<Uuid>> {
    inputs
        .iter()
        .map(|input| {
            if let Ok(id) = Uuid::parse_str(input) {
                return Ok(id);
            }

            let prefix = input.to_lowercase();
            let matches: Vec<&Rule> = rules
                .iter()
                .filter(|r| r.id.to_string().starts_with(&prefix))
                .collect();

            match matches.as_slice() {
                [rule] => Ok(rule.id),
                [] => anyhow::bail!("No rule matches id '{}'", input),
                _ => anyhow::bail!("Id prefix '{}' matches {} rules", input, matches.len()),
            }
        })
        .collect()
}

fn print_rules(rules: &[Rule]) {
    if rules.is_empty() {
        println!("{}", "No rules found.".yellow());
        return;
    }

    println!(
        "{:<8} | {:>6} | {:<3} | {:<24} | {:<20} | {}",
        "ID", "Order", "On", "Name", "Groups", "Pattern"
    );
    println!("{}", "-".repeat(100));

    for rule in rules {
        let id = rule.id.to_string();
        let enabled = if rule.is_enabled {
            "yes".green()
        } else {
            "no".red()
        };
        println!(
            "{:<8} | {:>6} | {:<3} | {:<24} | {:<20} | {} -> {}",
            &id[..8],
            rule.order,
            enabled,
            rule.name,
            rule.groups.to_string(),
            rule.pattern,
            rule.replacement
        );
    }
}

fn handle_rule_command(cmd: RuleCommand, rules: RuleManager) -> Result<()> {
    match cmd {
        RuleCommand::Add {
            name,
            pattern,
            replacement,
            group,
            regex,
            disabled,
        } => {
            let mut rule = Rule::new(name, pattern, replacement);
            rule.groups = GroupTags::parse(group.as_deref());
            rule.is_regex = regex;
            rule.is_enabled = !disabled;
            run(
                "add rule",
                move || rules.add_rule(rule),
                |rule| format!("Rule '{}' added with id {}", rule.name, rule.id),
            )
        }
        RuleCommand::List { group, ungrouped } => {
            let mut list = rules.list_rules()?;
            if let Some(group) = group {
                list.retain(|r| r.groups.contains(&group));
            } else if ungrouped {
                list.retain(|r| r.groups.is_empty());
            }
            print_rules(&list);
            Ok(())
        }
        RuleCommand::Show { id } => {
            let ids = resolve_rule_ids(&rules.list_rules()?, &[id])?;
            let rule = rules.get_rule(&ids[0])?;
            println!("{}", rule.name.bold());
            println!("  ID:          {}", rule.id);
            println!("  Order:       {}", rule.order);
            println!("  Enabled:     {}", rule.is_enabled);
            println!("  Regex:       {}", rule.is_regex);
            println!("  Groups:      {}", rule.groups);
            println!("  Pattern:     {}", rule.pattern);
            println!("  Replacement: {}", rule.replacement);
            Ok(())
        }
        RuleCommand::Enable { ids } => {
            let ids = resolve_rule_ids(&rules.list_rules()?, &ids)?;
            run(
                "enable rules",
                move || rules.enable_selection(&ids),
                |count| format!("Enabled {} rule(s)", count),
            )
        }
        RuleCommand::Disable { ids } => {
            let ids = resolve_rule_ids(&rules.list_rules()?, &ids)?;
            run(
                "disable rules",
                move || rules.disable_selection(&ids),
                |count| format!("Disabled {} rule(s)", count),
            )
        }
        RuleCommand::Del { ids, yes } => {
            let ids = resolve_rule_ids(&rules.list_rules()?, &ids)?;

            let question = format!("Delete {} rule(s)?", ids.len());
            if !confirm_or_skip(&question, yes)? {
                return Ok(());
            }

            run(
                "delete rules",
                move || rules.delete_rules(&ids),
                |count| format!("Deleted {} rule(s)", count),
            )
        }
        RuleCommand::Top { id } => {
            let ids = resolve_rule_ids(&rules.list_rules()?, &[id])?;
            let id = ids[0];
            run(
                "move rule to top",
                move || rules.move_to_top(&id),
                |rule| format!("Rule '{}' moved to top", rule.name),
            )
        }
        RuleCommand::Renumber => run(
            "renumber rules",
            move || rules.renumber(),
            |count| format!("Renumbered {} rule(s)", count),
        ),
    }
}

fn handle_tag_command(cmd: TagCommand, rules: RuleManager) -> Result<()> {
    match cmd {
        TagCommand::List => {
            let names = rules.group_names()?;
            if names.is_empty() {
                println!("{}", "No rule groups found.".yellow());
            }
            for name in names {
                println!("{}", name);
            }
            Ok(())
        }
        TagCommand::Adopt { group } => run(
            "add group to ungrouped rules",
            move || {
                let count = rules.add_group_to_ungrouped(&group)?;
                Ok((group, count))
            },
            |(group, count)| format!("Tagged {} ungrouped rule(s) with '{}'", count, group),
        ),
        TagCommand::Rename { old, new } => run(
            "rename rule group",
            move || rules.rename_group(&old, new.as_deref()),
            |count| format!("Updated {} rule(s)", count),
        ),
        TagCommand::Del { group, yes } => {
            let question = format!("Remove group '{}' from every rule?", group);
            if !confirm_or_skip(&question, yes)? {
                return Ok(());
            }

            run(
                "remove rule group",
                move || rules.delete_group(&group),
                |count| format!("Removed group from {} rule(s)", count),
            )
        }
    }
}

fn handle_db_command(cmd: DbCommand, backend: Arc<dyn DatabaseBackend>) -> Result<()> {
    match cmd {
        DbCommand::Path => {
            println!("{}", backend.path().display());
        }
        DbCommand::Stats => {
            let stats = backend.stats()?;
            println!("Backend:         {}", stats.backend_type);
            println!("Groups:          {}", stats.group_count);
            println!("Rules:           {}", stats.rule_count);
            println!("Ungrouped rules: {}", stats.ungrouped_rule_count);
        }
        DbCommand::Migrate { to, to_backend } => {
            let target = create_backend(&to, to_backend)?;
            let count = copy_library(backend.as_ref(), target.as_ref())?;
            println!(
                "{}",
                format!(
                    "Copied {} rule(s) from {} to {} ({})",
                    count,
                    backend.path().display(),
                    to.display(),
                    target.backend_type()
                )
                .green()
            );
        }
    }
    Ok(())
}
