//! Post-snapshot stages.
//!
//! Each stage reads the freshly stored snapshot through a [`StageContext`]
//! and writes its own derived rows. Stages run in order and do not depend on
//! each other's output.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::CrawlPolicy;
use crate::models::{
    AlertKind, AnalysisRecord, Domain, IssueCode, NewAlert, Page, Segment, Severity, Snapshot,
};
use crate::repository::analytics::{lineage, link};
use crate::repository::{CostEntry, DbContext, DbError, LineageEdge, LinkEdge};
use crate::utils::{db_timestamp, next_utc_midnight, normalize_url, parse_timestamp, resolve, utc_day};

/// What a stage sees of the snapshot just written.
pub struct StageContext<'a> {
    pub db: &'a DbContext,
    pub policy: &'a CrawlPolicy,
    pub record: &'a AnalysisRecord,
    pub domain: &'a Domain,
    pub page: &'a Page,
    pub snapshot_id: i64,
    pub issues: &'a [IssueCode],
    pub score: i32,
    /// Snapshot the page had before this one.
    pub previous: Option<&'a Snapshot>,
    pub previous_issues: &'a [IssueCode],
    pub now: DateTime<Utc>,
}

impl StageContext<'_> {
    pub fn stamp(&self) -> String {
        db_timestamp(self.now)
    }
}

/// One step run after a snapshot has been inserted.
#[async_trait]
pub trait SnapshotStage: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    async fn run(&self, cx: &StageContext<'_>) -> Result<(), DbError>;
}

/// The stages `save_analysis` runs, in order.
pub fn default_stages() -> Vec<Box<dyn SnapshotStage>> {
    vec![
        Box::new(ClusterStage),
        Box::new(AlertStage),
        Box::new(CostStage),
        Box::new(BudgetStage),
        Box::new(SegmentStage),
        Box::new(EdgeStage),
        Box::new(LineageStage),
    ]
}

/// Record an alert unless one of the same kind was raised for the same
/// target within the cooldown window. Critical alerts open a ticket.
///
/// Returns the alert id, or `None` when suppressed.
pub async fn raise_alert(
    db: &DbContext,
    policy: &CrawlPolicy,
    alert: &NewAlert,
    now: DateTime<Utc>,
) -> Result<Option<i64>, DbError> {
    let analytics = db.analytics();

    if let Some(last) = analytics
        .last_alert_at(alert.domain_id, alert.page_id, alert.kind)
        .await?
    {
        if now - parse_timestamp(&last) < Duration::hours(policy.alert_cooldown_hours) {
            debug!(
                "Suppressed {} alert (last raised {}): {}",
                alert.kind.as_str(),
                last,
                alert.message
            );
            return Ok(None);
        }
    }

    let stamp = db_timestamp(now);
    let alert_id = analytics.insert_alert(alert, &stamp).await?;
    match alert.severity {
        Severity::Critical => warn!("{} alert: {}", alert.kind.as_str(), alert.message),
        _ => info!("{} alert: {}", alert.kind.as_str(), alert.message),
    }

    if alert.severity == Severity::Critical {
        let title = format!("[{}] {}", alert.kind.as_str(), alert.message);
        let ticket_id = analytics.open_ticket(alert_id, &title, &stamp).await?;
        debug!("Opened ticket {} for alert {}", ticket_id, alert_id);
    }

    if let Some(snapshot_id) = alert.snapshot_id {
        analytics
            .add_lineage(
                &[LineageEdge::new(
                    lineage::SNAPSHOT,
                    snapshot_id,
                    lineage::ALERT,
                    alert_id,
                )],
                &stamp,
            )
            .await?;
    }

    Ok(Some(alert_id))
}

/// Groups pages whose visible text hashes the same.
pub struct ClusterStage;

#[async_trait]
impl SnapshotStage for ClusterStage {
    fn name(&self) -> &str {
        "cluster"
    }

    async fn run(&self, cx: &StageContext<'_>) -> Result<(), DbError> {
        let Some(audit) = cx.record.audit() else {
            return Ok(());
        };
        if audit.text_len == 0 {
            return Ok(());
        }

        let membership = cx
            .db
            .analytics()
            .join_cluster(&audit.sha256_text, cx.page.id, cx.snapshot_id, &cx.stamp())
            .await?;
        if membership.joined && membership.member_count > 1 {
            info!(
                "{} duplicates content of {} other page(s) (cluster {})",
                cx.page.url_norm,
                membership.member_count - 1,
                membership.cluster_id
            );
        }
        Ok(())
    }
}

/// An alert before it is bound to a domain, page and snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertDraft {
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
    pub details: serde_json::Value,
}

/// Compare a new snapshot with the page's previous one.
///
/// Nothing is raised for a page's first snapshot. A page failing a gate
/// raises only the gate alert; a page recovering from a gate raises nothing.
pub fn detect_alerts(
    previous: Option<&Snapshot>,
    previous_issues: &[IssueCode],
    issues: &[IssueCode],
    score: i32,
    gate: Option<IssueCode>,
    policy: &CrawlPolicy,
) -> Vec<AlertDraft> {
    let Some(prev) = previous else {
        return Vec::new();
    };

    if let Some(code) = gate {
        if prev.is_gated() {
            return Vec::new();
        }
        return vec![AlertDraft {
            kind: AlertKind::GateFailed,
            severity: Severity::Critical,
            message: format!("page now fails with {} (previous score {})", code, prev.score),
            details: json!({ "gate_code": code, "previous_score": prev.score }),
        }];
    }
    if prev.is_gated() {
        return Vec::new();
    }

    let mut drafts = Vec::new();

    let drop = prev.score - score;
    let drop_severity = if drop >= policy.score_drop_critical {
        Some(Severity::Critical)
    } else if drop >= policy.score_drop_warning {
        Some(Severity::Warning)
    } else {
        None
    };
    if let Some(severity) = drop_severity {
        drafts.push(AlertDraft {
            kind: AlertKind::ScoreDrop,
            severity,
            message: format!("score dropped {} -> {}", prev.score, score),
            details: json!({ "previous_score": prev.score, "score": score, "drop": drop }),
        });
    }

    let new_critical: Vec<IssueCode> = issues
        .iter()
        .copied()
        .filter(|c| c.severity() == Severity::Critical && !c.is_gate())
        .filter(|c| !previous_issues.contains(c))
        .collect();
    if !new_critical.is_empty() {
        let codes: Vec<&str> = new_critical.iter().map(|c| c.as_str()).collect();
        drafts.push(AlertDraft {
            kind: AlertKind::CriticalIssue,
            severity: Severity::Critical,
            message: format!("new critical issue(s): {}", codes.join(", ")),
            details: json!({ "issues": codes }),
        });
    }

    drafts
}

/// Raises score-drop, critical-issue and gate-failure alerts.
pub struct AlertStage;

#[async_trait]
impl SnapshotStage for AlertStage {
    fn name(&self) -> &str {
        "alert"
    }

    async fn run(&self, cx: &StageContext<'_>) -> Result<(), DbError> {
        let drafts = detect_alerts(
            cx.previous,
            cx.previous_issues,
            cx.issues,
            cx.score,
            cx.record.gate_code(),
            cx.policy,
        );
        for draft in drafts {
            let alert = NewAlert {
                kind: draft.kind,
                severity: draft.severity,
                domain_id: cx.domain.id,
                page_id: Some(cx.page.id),
                snapshot_id: Some(cx.snapshot_id),
                message: format!("{}: {}", cx.page.url_norm, draft.message),
                details: draft.details,
            };
            raise_alert(cx.db, cx.policy, &alert, cx.now).await?;
        }
        Ok(())
    }
}

/// Writes fetch, parse and audit costs to the ledger.
pub struct CostStage;

#[async_trait]
impl SnapshotStage for CostStage {
    fn name(&self) -> &str {
        "cost"
    }

    async fn run(&self, cx: &StageContext<'_>) -> Result<(), DbError> {
        let timings = cx.record.timings;
        let entries = [
            CostEntry {
                stage: "FETCH",
                ms: timings.fetch_ms as i64,
                bytes: cx.record.body_bytes as i64,
            },
            CostEntry {
                stage: "PARSE",
                ms: timings.parse_ms as i64,
                bytes: 0,
            },
            CostEntry {
                stage: "AUDIT",
                ms: timings.audit_ms as i64,
                bytes: 0,
            },
        ];
        cx.db
            .analytics()
            .record_costs(cx.snapshot_id, cx.record.job_id, &entries, &cx.stamp())
            .await
    }
}

/// Counts pages against the domain's daily budget.
///
/// Crossing the soft ratio raises a warning; reaching the budget raises a
/// critical alert and pauses the domain until the next UTC midnight.
pub struct BudgetStage;

#[async_trait]
impl SnapshotStage for BudgetStage {
    fn name(&self) -> &str {
        "budget"
    }

    async fn run(&self, cx: &StageContext<'_>) -> Result<(), DbError> {
        let budget = cx.domain.daily_budget;
        if budget <= 0 {
            return Ok(());
        }

        let analytics = cx.db.analytics();
        let day = utc_day(cx.now);
        let usage = analytics.increment_budget(cx.domain.id, &day).await?;
        let soft_limit = (budget as f64 * cx.policy.budget_soft_ratio).ceil() as i64;

        if usage.pages >= budget && !usage.hard_alerted {
            let until = next_utc_midnight(cx.now);
            cx.db.domains().set_cooldown(cx.domain.id, until).await?;
            let alert = NewAlert {
                kind: AlertKind::BudgetHard,
                severity: Severity::Critical,
                domain_id: cx.domain.id,
                page_id: None,
                snapshot_id: Some(cx.snapshot_id),
                message: format!(
                    "{} reached its daily budget of {} pages; paused until {}",
                    cx.domain.host,
                    budget,
                    db_timestamp(until)
                ),
                details: json!({ "day": day, "pages": usage.pages, "budget": budget }),
            };
            raise_alert(cx.db, cx.policy, &alert, cx.now).await?;
            analytics.mark_budget_alerted(cx.domain.id, &day, true).await?;
        } else if usage.pages >= soft_limit && !usage.soft_alerted && !usage.hard_alerted {
            let alert = NewAlert {
                kind: AlertKind::BudgetSoft,
                severity: Severity::Warning,
                domain_id: cx.domain.id,
                page_id: None,
                snapshot_id: Some(cx.snapshot_id),
                message: format!(
                    "{} used {} of {} daily pages",
                    cx.domain.host, usage.pages, budget
                ),
                details: json!({ "day": day, "pages": usage.pages, "budget": budget }),
            };
            raise_alert(cx.db, cx.policy, &alert, cx.now).await?;
            analytics.mark_budget_alerted(cx.domain.id, &day, false).await?;
        }
        Ok(())
    }
}

/// Classifies the page by its URL path.
pub struct SegmentStage;

#[async_trait]
impl SnapshotStage for SegmentStage {
    fn name(&self) -> &str {
        "segment"
    }

    async fn run(&self, cx: &StageContext<'_>) -> Result<(), DbError> {
        let segment = Segment::from_url(&cx.page.url_norm);
        if cx.page.segment != Some(segment) {
            cx.db.pages().set_segment(cx.page.id, segment).await?;
        }
        Ok(())
    }
}

/// Links, canonical and hreflang targets found on the page.
pub fn collect_link_edges(record: &AnalysisRecord) -> Vec<LinkEdge> {
    let Some(audit) = record.audit() else {
        return Vec::new();
    };

    let mut edges = Vec::new();
    for href in &audit.internal_samples {
        edges.push(LinkEdge {
            dst_url_norm: normalize_url(href),
            kind: link::INTERNAL,
            attr: None,
        });
    }
    for href in &audit.external_samples {
        edges.push(LinkEdge {
            dst_url_norm: normalize_url(href),
            kind: link::EXTERNAL,
            attr: None,
        });
    }
    if let Some(target) = audit
        .canonical
        .as_deref()
        .and_then(|c| resolve(&record.final_url, c))
    {
        edges.push(LinkEdge {
            dst_url_norm: normalize_url(&target),
            kind: link::CANONICAL,
            attr: None,
        });
    }
    for alt in &audit.hreflang {
        if let Some(target) = resolve(&record.final_url, &alt.href) {
            edges.push(LinkEdge {
                dst_url_norm: normalize_url(&target),
                kind: link::HREFLANG,
                attr: Some(alt.lang.clone()),
            });
        }
    }
    edges
}

/// Stores the page's outgoing references.
pub struct EdgeStage;

#[async_trait]
impl SnapshotStage for EdgeStage {
    fn name(&self) -> &str {
        "edges"
    }

    async fn run(&self, cx: &StageContext<'_>) -> Result<(), DbError> {
        let edges = collect_link_edges(cx.record);
        cx.db
            .analytics()
            .add_link_edges(cx.snapshot_id, &cx.page.url_norm, &edges, &cx.stamp())
            .await
    }
}

/// Records where the snapshot came from and what it found.
pub struct LineageStage;

#[async_trait]
impl SnapshotStage for LineageStage {
    fn name(&self) -> &str {
        "lineage"
    }

    async fn run(&self, cx: &StageContext<'_>) -> Result<(), DbError> {
        let mut edges = Vec::with_capacity(cx.issues.len() + 1);
        if let Some(job_id) = cx.record.job_id {
            edges.push(LineageEdge::new(
                lineage::CRAWL,
                job_id,
                lineage::SNAPSHOT,
                cx.snapshot_id,
            ));
        }
        for code in cx.issues {
            edges.push(LineageEdge::new(
                lineage::SNAPSHOT,
                cx.snapshot_id,
                lineage::ISSUE,
                code.as_str(),
            ));
        }
        cx.db.analytics().add_lineage(&edges, &cx.stamp()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Timings;

    fn snapshot(score: i32, gate_code: Option<IssueCode>) -> Snapshot {
        Snapshot {
            id: 1,
            page_id: 1,
            job_id: None,
            fetched_at: Utc::now(),
            status_code: 200,
            final_url: "https://example.com".to_string(),
            title: None,
            word_count: 0,
            score,
            content_hash: String::new(),
            issues_sha256: String::new(),
            gate_code,
            sha256_text: None,
            timings: Timings::default(),
        }
    }

    #[test]
    fn test_first_snapshot_raises_nothing() {
        let policy = CrawlPolicy::default();
        let drafts = detect_alerts(None, &[], &[IssueCode::TitleMissing], 60, None, &policy);
        assert!(drafts.is_empty());
    }

    #[test]
    fn test_score_drop_thresholds() {
        let policy = CrawlPolicy::default();
        let prev = snapshot(100, None);

        let drafts = detect_alerts(Some(&prev), &[], &[], 90, None, &policy);
        assert!(drafts.is_empty());

        let drafts = detect_alerts(Some(&prev), &[], &[IssueCode::CanonicalMissing], 85, None, &policy);
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].kind, AlertKind::ScoreDrop);
        assert_eq!(drafts[0].severity, Severity::Warning);

        let drafts = detect_alerts(Some(&prev), &[], &[], 70, None, &policy);
        assert_eq!(drafts[0].severity, Severity::Critical);
    }

    #[test]
    fn test_new_critical_issue() {
        let policy = CrawlPolicy::default();
        let prev = snapshot(80, None);
        let drafts = detect_alerts(
            Some(&prev),
            &[IssueCode::NoH1],
            &[IssueCode::NoH1, IssueCode::Noindex],
            50,
            None,
            &policy,
        );
        let kinds: Vec<_> = drafts.iter().map(|d| d.kind).collect();
        assert_eq!(kinds, [AlertKind::ScoreDrop, AlertKind::CriticalIssue]);
        assert_eq!(drafts[1].details["issues"], json!(["NOINDEX"]));
    }

    #[test]
    fn test_gate_transition_only() {
        let policy = CrawlPolicy::default();
        let healthy = snapshot(90, None);
        let gated = snapshot(0, Some(IssueCode::HttpError));

        let drafts = detect_alerts(
            Some(&healthy),
            &[],
            &[IssueCode::HttpError],
            0,
            Some(IssueCode::HttpError),
            &policy,
        );
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].kind, AlertKind::GateFailed);

        // Still failing, or recovering: no repeat.
        let still = detect_alerts(
            Some(&gated),
            &[IssueCode::HttpError],
            &[IssueCode::HttpError],
            0,
            Some(IssueCode::HttpError),
            &policy,
        );
        assert!(still.is_empty());
        let recovered = detect_alerts(Some(&gated), &[IssueCode::HttpError], &[], 100, None, &policy);
        assert!(recovered.is_empty());
    }

    #[test]
    fn test_default_stage_order() {
        let names: Vec<String> = default_stages().iter().map(|s| s.name().to_string()).collect();
        assert_eq!(
            names,
            ["cluster", "alert", "cost", "budget", "segment", "edges", "lineage"]
        );
    }
}
