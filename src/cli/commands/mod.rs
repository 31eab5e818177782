//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod crawl;
mod frontier;
mod init;
mod report;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{load_settings_with_options, LoadOptions};

#[derive(Parser)]
#[command(name = "seointel")]
#[command(about = "SEO competitor crawler with page audits and snapshot history")]
#[command(version)]
pub struct Cli {
    /// Target directory or database file (overrides config file).
    /// Can be a directory containing competitor_intelligence.db or a .db file directly.
    #[arg(long, short = 't', global = true)]
    target: Option<PathBuf>,

    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and database
    Init,

    /// Analyze URLs, or crawl ready items from the frontier
    Crawl {
        /// URLs to analyze (one URL prints a full JSON report)
        urls: Vec<String>,
        /// Crawl up to N ready frontier items instead of explicit URLs
        #[arg(long, value_name = "N", conflicts_with = "urls")]
        frontier: Option<i64>,
        /// Delay between requests in milliseconds (defaults to request_delay_ms)
        #[arg(long)]
        delay_ms: Option<u64>,
        /// Show a progress bar
        #[arg(short = 'P', long)]
        progress: bool,
    },

    /// Manage the crawl frontier
    Frontier {
        #[command(subcommand)]
        command: FrontierCommands,
    },

    /// Reports over stored history
    Report {
        #[command(subcommand)]
        command: ReportCommands,
    },
}

#[derive(Subcommand)]
enum FrontierCommands {
    /// Queue URLs for crawling
    Add {
        /// URLs to queue
        #[arg(required = true)]
        urls: Vec<String>,
        /// Higher priorities are crawled first
        #[arg(short, long, default_value = "0")]
        priority: i32,
        /// Where the URLs came from
        #[arg(short, long)]
        source: Option<String>,
    },

    /// Show queue counts per status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Return stuck RUNNING items to PENDING
    Recover {
        /// Minutes without progress before an item counts as stuck
        #[arg(short, long, default_value = "30")]
        minutes: i64,
    },
}

#[derive(Subcommand)]
enum ReportCommands {
    /// Recent crawl jobs with their KPIs
    Jobs {
        /// Number of jobs to show
        #[arg(short, long, default_value = "10")]
        limit: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Snapshot history and stability of one page
    Page {
        /// Page URL
        url: String,
        /// Number of snapshots to include
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Known domains with today's health
    Domains {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Recent alerts
    Alerts {
        /// Number of alerts to show
        #[arg(short, long, default_value = "20")]
        limit: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        target: cli.target,
    };
    let (settings, _config) = load_settings_with_options(options).await?;

    match cli.command {
        Commands::Init => init::cmd_init(&settings).await,
        Commands::Crawl {
            urls,
            frontier,
            delay_ms,
            progress,
        } => match frontier {
            Some(limit) => crawl::cmd_crawl_frontier(&settings, limit, delay_ms, progress).await,
            None => crawl::cmd_crawl(&settings, &urls, delay_ms, progress).await,
        },
        Commands::Frontier { command } => match command {
            FrontierCommands::Add {
                urls,
                priority,
                source,
            } => frontier::cmd_frontier_add(&settings, &urls, priority, source.as_deref()).await,
            FrontierCommands::Status { json } => {
                frontier::cmd_frontier_status(&settings, json).await
            }
            FrontierCommands::Recover { minutes } => {
                frontier::cmd_frontier_recover(&settings, minutes).await
            }
        },
        Commands::Report { command } => match command {
            ReportCommands::Jobs { limit, json } => {
                report::cmd_report_jobs(&settings, limit, json).await
            }
            ReportCommands::Page { url, limit } => {
                report::cmd_report_page(&settings, &url, limit).await
            }
            ReportCommands::Domains { json } => report::cmd_report_domains(&settings, json).await,
            ReportCommands::Alerts { limit, json } => {
                report::cmd_report_alerts(&settings, limit, json).await
            }
        },
    }
}
