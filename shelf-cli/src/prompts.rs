use anyhow::Result;
use colored::Colorize;
use inquire::Confirm;

/// Asks before a destructive command; `--yes` skips the prompt
pub fn confirm_or_skip(question: &str, skip_confirm: bool) -> Result<bool> {
    if skip_confirm {
        return Ok(true);
    }

    let confirm = Confirm::new(question).with_default(false).prompt()?;
    if !confirm {
        println!("{}", "Cancelled.".yellow());
    }
    Ok(confirm)
}
