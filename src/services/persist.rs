//! Persistence pipeline for analyzed pages.
//!
//! `save_analysis` takes one immutable [`AnalysisRecord`] through:
//! domain and page upserts, the conditional-fetch cache, daily domain
//! health, the 304 and gate short-circuits, scoring, the dedup gate, the
//! snapshot insert, and finally the post-snapshot [`SnapshotStage`]s.
//!
//! Database errors propagate to the caller. Each statement is atomic on its
//! own; a failure part-way leaves earlier writes in place.

use std::time::Instant;

use chrono::Duration;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use super::stages::{default_stages, raise_alert, SnapshotStage, StageContext};
use crate::audit::{compute_issues, compute_score, content_hash, gate_hash, issues_sha256};
use crate::config::CrawlPolicy;
use crate::models::{
    AlertKind, AnalysisRecord, CostTier, Domain, HealthTier, IssueCode, NewAlert, PageBody,
    Severity, Timings,
};
use crate::repository::util::{to_diesel_error, to_json_text};
use crate::repository::{DbContext, DbError, FetchCacheUpdate, HealthSample, NewSnapshot};
use crate::utils::{db_timestamp, host_of, utc_day};

/// What `save_analysis` did with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SaveStatus {
    /// A new snapshot was written.
    Saved,
    /// Content matched the previous snapshot within the domain TTL.
    DedupSkipped,
    /// The server answered `304 Not Modified`.
    #[serde(rename = "HTTP_304")]
    Http304,
    /// The response failed a gate; a minimal snapshot was written.
    GateFailed,
    /// The domain is paused; nothing was fetched.
    DomainCooldown,
}

impl SaveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Saved => "SAVED",
            Self::DedupSkipped => "DEDUP_SKIPPED",
            Self::Http304 => "HTTP_304",
            Self::GateFailed => "GATE_FAILED",
            Self::DomainCooldown => "DOMAIN_COOLDOWN",
        }
    }
}

impl std::fmt::Display for SaveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of persisting one record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveOutcome {
    pub status: SaveStatus,
    pub page_id: Option<i64>,
    /// The new snapshot, or the existing one a skip refers to.
    pub snapshot_id: Option<i64>,
    pub score: Option<i32>,
    pub issues: Vec<IssueCode>,
}

impl SaveOutcome {
    fn bare(status: SaveStatus, page_id: Option<i64>, snapshot_id: Option<i64>) -> Self {
        Self {
            status,
            page_id,
            snapshot_id,
            score: None,
            issues: Vec::new(),
        }
    }

    /// Outcome for a URL whose domain is paused.
    pub fn cooldown(page_id: Option<i64>) -> Self {
        Self::bare(SaveStatus::DomainCooldown, page_id, None)
    }
}

/// Runs `save_analysis` with a fixed list of post-snapshot stages.
pub struct SnapshotPipeline {
    db: DbContext,
    policy: CrawlPolicy,
    stages: Vec<Box<dyn SnapshotStage>>,
}

impl SnapshotPipeline {
    pub fn new(db: DbContext, policy: CrawlPolicy) -> Self {
        Self::with_stages(db, policy, default_stages())
    }

    pub fn with_stages(
        db: DbContext,
        policy: CrawlPolicy,
        stages: Vec<Box<dyn SnapshotStage>>,
    ) -> Self {
        Self { db, policy, stages }
    }

    pub fn policy(&self) -> &CrawlPolicy {
        &self.policy
    }

    /// Persist one analyzed URL.
    pub async fn save_analysis(&self, record: &AnalysisRecord) -> Result<SaveOutcome, DbError> {
        let now = record.fetched_at;
        let stamp = db_timestamp(now);
        let host = host_of(&record.url_norm)
            .or_else(|| host_of(&record.final_url))
            .ok_or_else(|| to_diesel_error(format!("no host in {}", record.url)))?;

        let domain = self
            .db
            .domains()
            .upsert(&host, self.policy.domain_defaults())
            .await?;
        let page = self
            .db
            .pages()
            .upsert(&record.url, &record.url_norm, domain.id)
            .await?;

        self.db
            .pages()
            .update_fetch_cache(
                page.id,
                FetchCacheUpdate {
                    etag: record.etag.as_deref(),
                    last_modified: record.last_modified.as_deref(),
                    status: record.status_code as i32,
                    fetched_at: &stamp,
                },
            )
            .await?;
        self.db.domains().touch_crawled(domain.id, &stamp).await?;

        self.record_domain_health(&domain, record).await?;

        let audit_started = Instant::now();
        let (issues, score, hash) = match &record.body {
            PageBody::NotModified => {
                debug!("{} not modified", record.url_norm);
                return Ok(SaveOutcome::bare(
                    SaveStatus::Http304,
                    Some(page.id),
                    page.last_snapshot_id,
                ));
            }
            PageBody::Gated { code } => (vec![*code], 0, gate_hash(*code, record.status_code)),
            PageBody::Parsed { audit } => {
                let issues = compute_issues(audit, record.redirect_chain.len());
                let score = compute_score(&issues);
                (issues, score, content_hash(audit, record.status_code))
            }
        };
        let gated = record.gate_code().is_some();

        let previous = self.db.snapshots().latest_for_page(page.id).await?;
        if !gated {
            if let Some(prev) = &previous {
                let ttl = Duration::try_hours(domain.ttl_hours).unwrap_or(Duration::MAX);
                let fresh = now - prev.fetched_at < ttl;
                if prev.content_hash == hash && fresh {
                    debug!("{} unchanged since snapshot {}", record.url_norm, prev.id);
                    return Ok(SaveOutcome {
                        status: SaveStatus::DedupSkipped,
                        page_id: Some(page.id),
                        snapshot_id: Some(prev.id),
                        score: Some(score),
                        issues,
                    });
                }
            }
        }
        let previous_issues = match &previous {
            Some(prev) => self.db.snapshots().issues_for(prev.id).await?,
            None => Vec::new(),
        };

        let timings = Timings {
            audit_ms: audit_started.elapsed().as_millis() as u64,
            ..record.timings
        };
        let snapshot_id = self
            .insert_snapshot(record, page.id, &issues, score, &hash, timings, &stamp)
            .await?;

        let cx = StageContext {
            db: &self.db,
            policy: &self.policy,
            record,
            domain: &domain,
            page: &page,
            snapshot_id,
            issues: &issues,
            score,
            previous: previous.as_ref(),
            previous_issues: &previous_issues,
            now,
        };
        for stage in &self.stages {
            debug!("Stage {} for snapshot {}", stage.name(), snapshot_id);
            stage.run(&cx).await?;
        }

        let status = if gated {
            SaveStatus::GateFailed
        } else {
            SaveStatus::Saved
        };
        info!(
            "{} {} snapshot {} score {}",
            record.url_norm, status, snapshot_id, score
        );

        Ok(SaveOutcome {
            status,
            page_id: Some(page.id),
            snapshot_id: Some(snapshot_id),
            score: Some(score),
            issues,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert_snapshot(
        &self,
        record: &AnalysisRecord,
        page_id: i64,
        issues: &[IssueCode],
        score: i32,
        hash: &str,
        timings: Timings,
        stamp: &str,
    ) -> Result<i64, DbError> {
        let audit = record.audit();
        let redirect_chain = to_json_text(&record.redirect_chain)?;
        let fingerprint = to_json_text(&record.fingerprint)?;
        let analysis = audit.map(to_json_text).transpose()?;
        let issues_hash = issues_sha256(issues);

        let new = NewSnapshot {
            page_id,
            job_id: record.job_id,
            fetched_at: stamp,
            status_code: record.status_code as i32,
            final_url: &record.final_url,
            redirect_chain: &redirect_chain,
            title: audit.and_then(|a| a.title.as_deref()),
            meta_description: audit.and_then(|a| a.meta_description.as_deref()),
            canonical: audit.and_then(|a| a.canonical.as_deref()),
            robots_meta: audit.and_then(|a| a.robots_meta.as_deref()),
            lang: audit.and_then(|a| a.lang.as_deref()),
            h1_count: audit.map_or(0, |a| a.h1.len() as i32),
            h2_count: audit.map_or(0, |a| a.h2_count as i32),
            word_count: audit.map_or(0, |a| a.word_count as i64),
            internal_links: audit.map_or(0, |a| a.internal_links as i32),
            external_links: audit.map_or(0, |a| a.external_links as i32),
            images_count: audit.map_or(0, |a| a.images as i32),
            alt_coverage_pct: audit.map_or(0.0, |a| a.alt_coverage_pct),
            broken_jsonld: audit.is_some_and(|a| a.jsonld_broken),
            sha256_text: audit.map(|a| a.sha256_text.as_str()),
            sha256_dom: audit.map(|a| a.sha256_dom.as_str()),
            content_hash: hash,
            issues_sha256: &issues_hash,
            score,
            gate_code: record.gate_code().map(|c| c.as_str()),
            fetch_ms: timings.fetch_ms as i64,
            parse_ms: timings.parse_ms as i64,
            audit_ms: timings.audit_ms as i64,
            fingerprint: &fingerprint,
            analysis: analysis.as_deref(),
        };

        self.db.snapshots().insert(&new, issues).await
    }

    /// Fold the fetch into the domain's daily health, alert on a bad tier,
    /// and re-derive the cost tier from average fetch time.
    async fn record_domain_health(
        &self,
        domain: &Domain,
        record: &AnalysisRecord,
    ) -> Result<(), DbError> {
        let analytics = self.db.analytics();
        let error = record.gate_code() == Some(IssueCode::HttpError);
        let sample = HealthSample {
            fetch_ms: record.timings.fetch_ms as i64,
            success: !error,
            not_modified: record.is_not_modified(),
            error,
        };
        let day = utc_day(record.fetched_at);
        let health = analytics.record_health(domain.id, &day, sample).await?;

        if health.tier == HealthTier::Bad {
            let alert = NewAlert {
                kind: AlertKind::DomainHealth,
                severity: Severity::Warning,
                domain_id: domain.id,
                page_id: None,
                snapshot_id: None,
                message: format!(
                    "{} health is {}: {}/{} fetches succeeded today",
                    domain.host,
                    health.tier.as_str(),
                    health.successes,
                    health.fetches
                ),
                details: json!({
                    "day": health.day,
                    "fetches": health.fetches,
                    "successes": health.successes,
                    "errors": health.errors,
                    "total_fetch_ms": health.total_fetch_ms,
                }),
            };
            raise_alert(&self.db, &self.policy, &alert, record.fetched_at).await?;
        }

        if let Some(avg) = analytics.avg_fetch_ms(domain.id).await? {
            let tier = CostTier::from_avg_fetch_ms(avg);
            if tier != domain.cost_tier {
                debug!(
                    "{} cost tier {} -> {} (avg {:.0} ms)",
                    domain.host,
                    domain.cost_tier.as_str(),
                    tier.as_str(),
                    avg
                );
                self.db.domains().set_cost_tier(domain.id, tier).await?;
            }
        }
        Ok(())
    }
}
