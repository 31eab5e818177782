//! Report commands.

use std::collections::HashMap;

use chrono::Utc;
use console::style;
use serde::Serialize;

use crate::cli::helpers::{open_db, print_json, truncate};
use crate::config::Settings;
use crate::models::{CrawlJob, Domain, DomainHealth, JobKpis, Severity};
use crate::services::page_report;
use crate::utils::{db_timestamp, utc_day};

#[derive(Serialize)]
struct JobRow {
    #[serde(flatten)]
    job: CrawlJob,
    kpis: Option<JobKpis>,
}

/// Recent crawl jobs with their KPIs.
pub async fn cmd_report_jobs(settings: &Settings, limit: i64, json: bool) -> anyhow::Result<()> {
    let jobs = open_db(settings)?.jobs();

    let mut rows = Vec::new();
    for job in jobs.recent(limit).await? {
        let kpis = jobs.kpis(job.id).await?;
        rows.push(JobRow { job, kpis });
    }

    if json {
        return print_json(&rows);
    }
    if rows.is_empty() {
        println!("{} No crawl jobs yet", style("!").yellow());
        return Ok(());
    }

    println!(
        "{:>5}  {:<10} {:<9} {:>6} {:>6} {:>6} {:>9}  {}",
        "ID", "MODE", "STATUS", "SAVED", "FAILED", "SPENT", "AVG SCORE", "STARTED"
    );
    for row in &rows {
        let metrics = row.job.metrics.clone().unwrap_or_default();
        let avg_score = row
            .kpis
            .as_ref()
            .map(|k| format!("{:.1}", k.avg_score))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>5}  {:<10} {:<9} {:>6} {:>6} {:>6} {:>9}  {}",
            row.job.id,
            row.job.mode.as_str(),
            row.job.status.as_str(),
            metrics.success,
            metrics.failed,
            row.job.pages_spent,
            avg_score,
            db_timestamp(row.job.started_at)
        );
    }
    Ok(())
}

/// Snapshot history and stability of one page, as JSON.
pub async fn cmd_report_page(settings: &Settings, url: &str, limit: i64) -> anyhow::Result<()> {
    let db = open_db(settings)?;
    match page_report(&db, url, limit).await? {
        Some(report) => print_json(&report),
        None => anyhow::bail!("No page recorded for {}", url),
    }
}

#[derive(Serialize)]
struct DomainRow {
    #[serde(flatten)]
    domain: Domain,
    in_cooldown: bool,
    health_today: Option<DomainHealth>,
}

/// Known domains with today's health.
pub async fn cmd_report_domains(settings: &Settings, json: bool) -> anyhow::Result<()> {
    let db = open_db(settings)?;
    let now = Utc::now();

    let mut health: HashMap<String, DomainHealth> = db
        .analytics()
        .health_for_day(&utc_day(now))
        .await?
        .into_iter()
        .map(|h| (h.host.clone(), h))
        .collect();

    let rows: Vec<DomainRow> = db
        .domains()
        .list()
        .await?
        .into_iter()
        .map(|domain| DomainRow {
            in_cooldown: domain.in_cooldown(now),
            health_today: health.remove(&domain.host),
            domain,
        })
        .collect();

    if json {
        return print_json(&rows);
    }
    if rows.is_empty() {
        println!("{} No domains crawled yet", style("!").yellow());
        return Ok(());
    }

    println!(
        "{:<32} {:<4} {:<9} {:>8} {:>7}  {}",
        "HOST", "COST", "HEALTH", "FETCHES", "BUDGET", "STATE"
    );
    for row in &rows {
        let (tier, fetches) = match &row.health_today {
            Some(h) => (h.tier.as_str(), h.fetches),
            None => ("-", 0),
        };
        let state = if row.in_cooldown {
            style("cooldown").yellow().to_string()
        } else {
            style("active").green().to_string()
        };
        println!(
            "{:<32} {:<4} {:<9} {:>8} {:>7}  {}",
            truncate(&row.domain.host, 32),
            row.domain.cost_tier.as_str(),
            tier,
            fetches,
            row.domain.daily_budget,
            state
        );
    }
    Ok(())
}

/// Recent alerts, newest first.
pub async fn cmd_report_alerts(settings: &Settings, limit: i64, json: bool) -> anyhow::Result<()> {
    let alerts = open_db(settings)?.analytics().recent_alerts(limit).await?;

    if json {
        return print_json(&alerts);
    }
    if alerts.is_empty() {
        println!("{} No alerts", style("✓").green());
        return Ok(());
    }

    for alert in &alerts {
        let severity = match alert.severity {
            Severity::Critical => style(alert.severity.as_str()).red(),
            Severity::Warning => style(alert.severity.as_str()).yellow(),
            Severity::Notice => style(alert.severity.as_str()).dim(),
        };
        let ticket = alert
            .ticket_id
            .map(|id| format!(" [ticket #{}]", id))
            .unwrap_or_default();
        println!(
            "{} {:<8} {:<14} {}{}",
            db_timestamp(alert.created_at),
            severity,
            alert.kind.as_str(),
            alert.message,
            ticket
        );
    }
    Ok(())
}
