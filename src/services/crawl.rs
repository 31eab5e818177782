//! Crawl drivers.
//!
//! Both drivers run URLs one at a time with a fixed delay between requests,
//! tally [`JobMetrics`] and close their job with KPIs. Progress is reported
//! through an optional event channel.

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::analyzer::{AnalyzeResult, Analyzer};
use super::persist::SaveStatus;
use crate::models::{FrontierItem, HttpHints, JobKpis, JobMetrics, JobMode, RetryOutcome};
use crate::repository::analytics::lineage;
use crate::repository::{DbError, LineageEdge};
use crate::utils::now_timestamp;

/// Events emitted while a crawl runs.
#[derive(Debug, Clone)]
pub enum CrawlEvent {
    /// Fetch started for a URL.
    Started { url: String },
    /// URL analyzed and persisted.
    Finished {
        url: String,
        status: SaveStatus,
        score: Option<i32>,
    },
    /// Fetch failed.
    Failed {
        url: String,
        error: String,
        transient: bool,
    },
    /// Frontier item put back for a later attempt.
    Requeued { url: String, delay_secs: u64 },
}

/// Result of a crawl run.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlSummary {
    /// `None` when there was nothing to crawl.
    pub job_id: Option<i64>,
    pub metrics: JobMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kpis: Option<JobKpis>,
    pub results: Vec<AnalyzeResult>,
}

impl CrawlSummary {
    fn empty() -> Self {
        Self {
            job_id: None,
            metrics: JobMetrics::default(),
            kpis: None,
            results: Vec::new(),
        }
    }
}

/// Count one analysis result into the job metrics.
///
/// Fetch errors count as failures here; the frontier driver handles
/// transient ones itself.
pub fn tally(metrics: &mut JobMetrics, result: &AnalyzeResult) {
    let AnalyzeResult::Done(report) = result else {
        metrics.failed += 1;
        return;
    };

    match report.outcome.status {
        SaveStatus::Saved => metrics.success += 1,
        SaveStatus::DedupSkipped | SaveStatus::DomainCooldown => metrics.skipped += 1,
        SaveStatus::Http304 => metrics.http_304 += 1,
        SaveStatus::GateFailed => metrics.failed += 1,
    }

    if let Some(timings) = report.timings {
        metrics.record_fetch_ms(timings.fetch_ms);
        if matches!(
            report.outcome.status,
            SaveStatus::Saved | SaveStatus::DedupSkipped
        ) {
            metrics.record_parse_ms(timings.parse_ms);
        }
    }
}

/// A result that cost a fetch.
fn spent_fetch(result: &AnalyzeResult) -> bool {
    match result {
        AnalyzeResult::Done(report) => report.outcome.status != SaveStatus::DomainCooldown,
        AnalyzeResult::Error { .. } => true,
    }
}

/// Drives batch and frontier crawls over an [`Analyzer`].
pub struct CrawlService {
    analyzer: Analyzer,
    events: Option<mpsc::Sender<CrawlEvent>>,
}

impl CrawlService {
    pub fn new(analyzer: Analyzer) -> Self {
        Self {
            analyzer,
            events: None,
        }
    }

    /// Send progress events to `tx`.
    pub fn with_events(mut self, tx: mpsc::Sender<CrawlEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    async fn emit(&self, event: CrawlEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }

    async fn emit_result(&self, result: &AnalyzeResult) {
        let event = match result {
            AnalyzeResult::Done(report) => CrawlEvent::Finished {
                url: report.url.clone(),
                status: report.outcome.status,
                score: report.outcome.score,
            },
            AnalyzeResult::Error {
                url,
                message,
                transient,
            } => CrawlEvent::Failed {
                url: url.clone(),
                error: message.clone(),
                transient: *transient,
            },
        };
        self.emit(event).await;
    }

    /// Analyze one URL as its own `SINGLE` job.
    pub async fn crawl_single(&self, url: &str) -> Result<CrawlSummary, DbError> {
        let jobs = self.analyzer.db().jobs();
        let job_id = jobs
            .start(JobMode::Single, Some(url), &json!({ "urls": 1 }))
            .await?;

        self.emit(CrawlEvent::Started {
            url: url.to_string(),
        })
        .await;
        let result = self.analyze(url, None, job_id).await.0;
        self.emit_result(&result).await;

        let mut metrics = JobMetrics::default();
        tally(&mut metrics, &result);
        let pages_spent = spent_fetch(&result) as i64;
        let kpis = self.finish_job(job_id, &metrics, pages_spent).await?;

        Ok(CrawlSummary {
            job_id: Some(job_id),
            metrics,
            kpis: Some(kpis),
            results: vec![result],
        })
    }

    /// Analyze an explicit URL list as a `SEED_ONLY` job.
    pub async fn batch_crawl(
        &self,
        urls: &[String],
        rate_limit: Duration,
    ) -> Result<CrawlSummary, DbError> {
        if urls.is_empty() {
            return Ok(CrawlSummary::empty());
        }

        let settings = json!({
            "urls": urls.len(),
            "rate_limit_ms": rate_limit.as_millis() as u64,
        });
        let seed = urls.first().map(String::as_str);
        let job_id = self
            .analyzer
            .db()
            .jobs()
            .start(JobMode::SeedOnly, seed, &settings)
            .await?;
        info!("Job {}: batch crawl of {} URL(s)", job_id, urls.len());

        let mut metrics = JobMetrics::default();
        let mut results = Vec::with_capacity(urls.len());
        let mut pages_spent = 0i64;

        for (i, url) in urls.iter().enumerate() {
            if i > 0 && !rate_limit.is_zero() {
                tokio::time::sleep(rate_limit).await;
            }
            self.emit(CrawlEvent::Started { url: url.clone() }).await;
            let result = self.analyze(url, None, job_id).await.0;
            self.emit_result(&result).await;

            tally(&mut metrics, &result);
            pages_spent += spent_fetch(&result) as i64;
            results.push(result);
        }

        let kpis = self.finish_job(job_id, &metrics, pages_spent).await?;
        Ok(CrawlSummary {
            job_id: Some(job_id),
            metrics,
            kpis: Some(kpis),
            results,
        })
    }

    /// Crawl up to `limit` ready frontier items as a `FRONTIER` job.
    ///
    /// Transient and storage failures go back to the queue with a backoff.
    /// Items whose domain is paused wait for the pause to end. Every other
    /// outcome marks the item done. No job is opened when nothing is ready.
    pub async fn frontier_crawl(
        &self,
        limit: i64,
        rate_limit: Duration,
    ) -> Result<CrawlSummary, DbError> {
        let db = self.analyzer.db();
        let frontier = db.frontier();
        let items = frontier.next(limit).await?;
        if items.is_empty() {
            info!("Frontier has no ready items");
            return Ok(CrawlSummary::empty());
        }

        let settings = json!({
            "limit": limit,
            "claimed": items.len(),
            "rate_limit_ms": rate_limit.as_millis() as u64,
        });
        let job_id = db.jobs().start(JobMode::Frontier, None, &settings).await?;
        info!("Job {}: frontier crawl of {} item(s)", job_id, items.len());

        let mut metrics = JobMetrics::default();
        let mut results = Vec::with_capacity(items.len());
        let mut pages_spent = 0i64;

        for (i, item) in items.iter().enumerate() {
            if i > 0 && !rate_limit.is_zero() {
                tokio::time::sleep(rate_limit).await;
            }
            self.emit(CrawlEvent::Started {
                url: item.url.clone(),
            })
            .await;
            let (result, stored) = self.analyze(&item.url, Some(&item.hints), job_id).await;
            self.emit_result(&result).await;
            pages_spent += spent_fetch(&result) as i64;

            if let Err(e) = self.settle(item, &result, stored, &mut metrics).await {
                warn!("Could not update frontier item {}: {}", item.id, e);
                metrics.failed += 1;
            }
            results.push(result);
        }

        let kpis = self.finish_job(job_id, &metrics, pages_spent).await?;
        Ok(CrawlSummary {
            job_id: Some(job_id),
            metrics,
            kpis: Some(kpis),
            results,
        })
    }

    /// Analyze a URL, turning a storage failure into a failed result so the
    /// run can go on. The flag is false when the result was not stored.
    async fn analyze(
        &self,
        url: &str,
        hints: Option<&HttpHints>,
        job_id: i64,
    ) -> (AnalyzeResult, bool) {
        match self.analyzer.analyze_url(url, hints, Some(job_id)).await {
            Ok(result) => (result, true),
            Err(e) => {
                warn!("Could not store analysis of {}: {}", url, e);
                let failed = AnalyzeResult::Error {
                    url: url.to_string(),
                    message: format!("storage error: {}", e),
                    transient: false,
                };
                (failed, false)
            }
        }
    }

    /// Move a claimed frontier item on according to its result.
    async fn settle(
        &self,
        item: &FrontierItem,
        result: &AnalyzeResult,
        stored: bool,
        metrics: &mut JobMetrics,
    ) -> Result<(), DbError> {
        let frontier = self.analyzer.db().frontier();
        match result {
            AnalyzeResult::Error {
                message, transient, ..
            } if *transient || !stored => {
                match frontier
                    .retry(item.id, message, self.analyzer.policy())
                    .await?
                {
                    RetryOutcome::Requeued { delay_secs } => {
                        metrics.retried += 1;
                        self.emit(CrawlEvent::Requeued {
                            url: item.url.clone(),
                            delay_secs,
                        })
                        .await;
                    }
                    RetryOutcome::Failed => metrics.failed += 1,
                }
            }
            AnalyzeResult::Done(report) if report.outcome.status == SaveStatus::DomainCooldown => {
                let now = Utc::now();
                let until = report.resume_at.unwrap_or(now);
                frontier.defer(item.id, until).await?;
                tally(metrics, result);
                self.emit(CrawlEvent::Requeued {
                    url: item.url.clone(),
                    delay_secs: (until - now).num_seconds().max(0) as u64,
                })
                .await;
            }
            _ => {
                frontier.done(item.id).await?;
                tally(metrics, result);
            }
        }
        Ok(())
    }

    /// Close a job and store its KPIs.
    pub async fn finish_job(
        &self,
        job_id: i64,
        metrics: &JobMetrics,
        pages_spent: i64,
    ) -> Result<JobKpis, DbError> {
        let db = self.analyzer.db();
        let jobs = db.jobs();
        jobs.finish(job_id, metrics, pages_spent).await?;

        let kpis = jobs.compute_kpis(job_id, metrics).await?;
        jobs.save_kpis(job_id, &kpis).await?;
        db.analytics()
            .add_lineage(
                &[LineageEdge::new(lineage::CRAWL, job_id, lineage::KPI, job_id)],
                &now_timestamp(),
            )
            .await?;

        debug!(
            "Job {} finished: {} saved, avg score {:.1}",
            job_id, kpis.pages_saved, kpis.avg_score
        );
        Ok(kpis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Timings;
    use crate::services::analyzer::AnalyzeReport;
    use crate::services::persist::SaveOutcome;

    fn done(status: SaveStatus, fetch_ms: u64, parse_ms: u64) -> AnalyzeResult {
        AnalyzeResult::Done(AnalyzeReport {
            url: "https://example.com".to_string(),
            url_norm: "https://example.com".to_string(),
            final_url: Some("https://example.com".to_string()),
            status_code: Some(200),
            redirects: 0,
            title: None,
            timings: Some(Timings {
                fetch_ms,
                parse_ms,
                audit_ms: 0,
            }),
            page: None,
            resume_at: None,
            outcome: SaveOutcome {
                status,
                page_id: Some(1),
                snapshot_id: None,
                score: None,
                issues: Vec::new(),
            },
        })
    }

    #[test]
    fn test_tally_counts_by_status() {
        let mut metrics = JobMetrics::default();
        tally(&mut metrics, &done(SaveStatus::Saved, 100, 10));
        tally(&mut metrics, &done(SaveStatus::DedupSkipped, 300, 30));
        tally(&mut metrics, &done(SaveStatus::Http304, 50, 0));
        tally(&mut metrics, &done(SaveStatus::GateFailed, 50, 0));
        tally(
            &mut metrics,
            &AnalyzeResult::Error {
                url: "https://example.com".to_string(),
                message: "refused".to_string(),
                transient: true,
            },
        );

        assert_eq!(metrics.success, 1);
        assert_eq!(metrics.skipped, 1);
        assert_eq!(metrics.http_304, 1);
        assert_eq!(metrics.failed, 2);
        assert_eq!(metrics.avg_fetch_ms, 125.0);
        assert_eq!(metrics.avg_parse_ms, 20.0);
    }

    #[test]
    fn test_cooldown_skip_spends_nothing() {
        let skipped = AnalyzeResult::Done(AnalyzeReport {
            url: "https://example.com".to_string(),
            url_norm: "https://example.com".to_string(),
            final_url: None,
            status_code: None,
            redirects: 0,
            title: None,
            timings: None,
            page: None,
            resume_at: None,
            outcome: SaveOutcome::cooldown(None),
        });
        assert!(!spent_fetch(&skipped));
        assert!(spent_fetch(&done(SaveStatus::Saved, 1, 1)));
    }
}
