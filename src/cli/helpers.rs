//! Shared helper functions for CLI commands.

use console::{style, StyledObject};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::config::Settings;
use crate::repository::DbContext;
use crate::services::SaveStatus;

/// Open the database, failing with a hint when it has not been created.
pub fn open_db(settings: &Settings) -> anyhow::Result<DbContext> {
    if !settings.database_exists() {
        anyhow::bail!(
            "No database at {}. Run `seointel init` first.",
            settings.database_path().display()
        );
    }
    Ok(settings.create_db_context()?)
}

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Progress bar for a crawl over `len` URLs.
pub fn crawl_progress(len: u64) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {wide_msg}")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

/// Colored marker for a save status.
pub fn status_mark(status: SaveStatus) -> StyledObject<&'static str> {
    match status {
        SaveStatus::Saved => style("✓").green(),
        SaveStatus::DedupSkipped | SaveStatus::Http304 => style("=").cyan(),
        SaveStatus::DomainCooldown => style("…").yellow(),
        SaveStatus::GateFailed => style("!").yellow(),
    }
}

/// Shorten a string for table output.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("https://example.com/long", 10), "https://e…");
    }
}
