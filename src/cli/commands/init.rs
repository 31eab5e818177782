//! Initialize command.

use console::style;

use crate::config::Settings;

/// Initialize the data directory and database.
pub async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    settings.ensure_directories()?;

    let ctx = settings.create_db_context()?;
    let applied = ctx.init_db().await?;

    for name in &applied {
        println!("  {} Applied migration: {}", style("✓").green(), name);
    }
    if applied.is_empty() {
        println!("  {} Schema already up to date", style("=").cyan());
    }

    println!(
        "{} Initialized seointel in {}",
        style("✓").green(),
        settings.data_dir.display()
    );

    Ok(())
}
