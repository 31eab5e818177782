//! Frontier queue commands.

use console::style;

use crate::cli::helpers::{open_db, print_json};
use crate::config::Settings;

/// Queue URLs for crawling.
pub async fn cmd_frontier_add(
    settings: &Settings,
    urls: &[String],
    priority: i32,
    source: Option<&str>,
) -> anyhow::Result<()> {
    let frontier = open_db(settings)?.frontier();

    let mut added = 0;
    for url in urls {
        match frontier.add(url, priority, source).await? {
            Some(id) => {
                added += 1;
                println!("  {} #{} {}", style("+").green(), id, url);
            }
            None => println!("  {} Not a crawlable URL: {}", style("!").yellow(), url),
        }
    }

    println!(
        "{} Queued {} URL(s) at priority {}",
        style("✓").green(),
        added,
        priority
    );
    Ok(())
}

/// Show queue counts per status.
pub async fn cmd_frontier_status(settings: &Settings, json: bool) -> anyhow::Result<()> {
    let counts = open_db(settings)?.frontier().counts().await?;

    if json {
        return print_json(&counts);
    }

    if counts.is_empty() {
        println!("{} Frontier is empty", style("!").yellow());
        return Ok(());
    }
    for (status, count) in &counts {
        println!("  {:<10} {}", status, count);
    }
    println!("  {:<10} {}", "TOTAL", counts.values().sum::<i64>());
    Ok(())
}

/// Return stuck RUNNING items to PENDING.
pub async fn cmd_frontier_recover(settings: &Settings, minutes: i64) -> anyhow::Result<()> {
    let recovered = open_db(settings)?.frontier().recover_stale(minutes).await?;
    println!(
        "{} Recovered {} item(s) stuck for over {} minute(s)",
        style("✓").green(),
        recovered,
        minutes
    );
    Ok(())
}
