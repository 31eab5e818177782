//! Crawl commands.

use std::time::Duration;

use console::style;
use indicatif::ProgressBar;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::cli::helpers::{crawl_progress, open_db, print_json, status_mark};
use crate::config::Settings;
use crate::services::{Analyzer, CrawlEvent, CrawlService, CrawlSummary};

fn build_service(
    settings: &Settings,
) -> anyhow::Result<(CrawlService, mpsc::Receiver<CrawlEvent>)> {
    let db = open_db(settings)?;
    let analyzer = Analyzer::new(db, settings)?;
    let (event_tx, event_rx) = mpsc::channel::<CrawlEvent>(100);
    Ok((CrawlService::new(analyzer).with_events(event_tx), event_rx))
}

/// Print one line per finished URL, advancing the progress bar if any.
fn spawn_event_printer(
    mut event_rx: mpsc::Receiver<CrawlEvent>,
    progress: Option<ProgressBar>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let print = |line: String| match &progress {
            Some(pb) => pb.println(line),
            None => println!("{}", line),
        };

        while let Some(event) = event_rx.recv().await {
            match event {
                CrawlEvent::Started { url } => {
                    if let Some(pb) = &progress {
                        pb.set_message(url);
                    }
                }
                CrawlEvent::Finished { url, status, score } => {
                    let score = score.map(|s| format!(" score {}", s)).unwrap_or_default();
                    print(format!("{} {} {}{}", status_mark(status), status, url, score));
                    if let Some(pb) = &progress {
                        pb.inc(1);
                    }
                }
                CrawlEvent::Failed {
                    url,
                    error,
                    transient,
                } => {
                    let kind = if transient { "transient" } else { "permanent" };
                    print(format!(
                        "{} ERROR {} ({}): {}",
                        style("✗").red(),
                        url,
                        kind,
                        error
                    ));
                    if let Some(pb) = &progress {
                        pb.inc(1);
                    }
                }
                CrawlEvent::Requeued { url, delay_secs } => {
                    print(format!(
                        "  {} requeued {} in {}s",
                        style("→").cyan(),
                        url,
                        delay_secs
                    ));
                }
            }
        }

        if let Some(pb) = progress {
            pb.finish_and_clear();
        }
    })
}

fn print_summary(summary: &CrawlSummary) {
    let Some(job_id) = summary.job_id else {
        return;
    };
    let m = &summary.metrics;
    println!(
        "{} Job {}: {} saved, {} skipped, {} not modified, {} failed, {} retried",
        style("✓").green(),
        job_id,
        m.success,
        m.skipped,
        m.http_304,
        m.failed,
        m.retried
    );
    if let Some(kpis) = &summary.kpis {
        println!(
            "  avg score {:.1}, issue rate {:.0}%, critical rate {:.0}%, avg fetch {:.0} ms",
            kpis.avg_score,
            kpis.issue_rate * 100.0,
            kpis.critical_rate * 100.0,
            kpis.avg_fetch_ms
        );
    }
}

/// Analyze one URL (full JSON report) or several as a batch.
pub async fn cmd_crawl(
    settings: &Settings,
    urls: &[String],
    delay_ms: Option<u64>,
    show_progress: bool,
) -> anyhow::Result<()> {
    if urls.is_empty() {
        anyhow::bail!("Give at least one URL, or use --frontier N");
    }

    if let [url] = urls {
        let db = open_db(settings)?;
        let service = CrawlService::new(Analyzer::new(db, settings)?);
        let summary = service.crawl_single(url).await?;
        if let Some(result) = summary.results.first() {
            print_json(result)?;
        }
        return Ok(());
    }

    let (service, event_rx) = build_service(settings)?;
    let progress = if show_progress {
        Some(crawl_progress(urls.len() as u64)?)
    } else {
        None
    };
    let printer = spawn_event_printer(event_rx, progress);

    let delay = Duration::from_millis(delay_ms.unwrap_or(settings.request_delay_ms));
    let summary = service.batch_crawl(urls, delay).await;
    drop(service);
    let _ = printer.await;

    print_summary(&summary?);
    Ok(())
}

/// Crawl up to `limit` ready items from the frontier.
pub async fn cmd_crawl_frontier(
    settings: &Settings,
    limit: i64,
    delay_ms: Option<u64>,
    show_progress: bool,
) -> anyhow::Result<()> {
    let (service, event_rx) = build_service(settings)?;
    let progress = if show_progress {
        Some(crawl_progress(limit.max(0) as u64)?)
    } else {
        None
    };
    let printer = spawn_event_printer(event_rx, progress);

    let delay = Duration::from_millis(delay_ms.unwrap_or(settings.request_delay_ms));
    let summary = service.frontier_crawl(limit, delay).await;
    drop(service);
    let _ = printer.await;

    let summary = summary?;
    if summary.job_id.is_none() {
        println!("{} No frontier items ready", style("!").yellow());
    }
    print_summary(&summary);
    Ok(())
}
