//! Diesel row types and their conversions into domain models.

use diesel::prelude::*;

use super::util::from_json_text;
use crate::models::{
    Alert, AlertKind, CostTier, CrawlJob, Domain, DomainHealth, FrontierItem, FrontierStatus,
    HealthTier, HttpHints, IssueCode, JobKpis, JobMode, JobStatus, Page, Segment, Severity,
    Snapshot, Timings,
};
use crate::schema;
use crate::utils::{parse_timestamp, parse_timestamp_opt};

/// Domain record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::domains)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct DomainRecord {
    pub id: i64,
    pub host: String,
    pub cost_tier: String,
    pub ttl_hours: i64,
    pub daily_budget: i64,
    pub cooldown_until: Option<String>,
    pub first_seen: String,
    pub last_crawled: Option<String>,
}

impl From<DomainRecord> for Domain {
    fn from(r: DomainRecord) -> Self {
        Self {
            id: r.id,
            host: r.host,
            cost_tier: CostTier::from_str(&r.cost_tier).unwrap_or(CostTier::B),
            ttl_hours: r.ttl_hours,
            daily_budget: r.daily_budget,
            cooldown_until: parse_timestamp_opt(r.cooldown_until.as_deref()),
            first_seen: parse_timestamp(&r.first_seen),
            last_crawled: parse_timestamp_opt(r.last_crawled.as_deref()),
        }
    }
}

/// Page record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::pages)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PageRecord {
    pub id: i64,
    pub url_norm: String,
    pub url: String,
    pub domain_id: i64,
    pub segment: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub last_status: Option<i32>,
    pub last_fetched: Option<String>,
    pub last_snapshot_id: Option<i64>,
    pub created_at: String,
}

impl From<PageRecord> for Page {
    fn from(r: PageRecord) -> Self {
        Self {
            id: r.id,
            url_norm: r.url_norm,
            url: r.url,
            domain_id: r.domain_id,
            segment: r.segment.as_deref().and_then(Segment::from_str),
            hints: HttpHints {
                etag: r.etag,
                last_modified: r.last_modified,
            },
            last_status: r.last_status,
            last_fetched: parse_timestamp_opt(r.last_fetched.as_deref()),
            last_snapshot_id: r.last_snapshot_id,
        }
    }
}

/// The snapshot columns needed for comparisons and reports.
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = schema::snapshots)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SnapshotRecord {
    pub id: i64,
    pub page_id: i64,
    pub job_id: Option<i64>,
    pub fetched_at: String,
    pub status_code: i32,
    pub final_url: String,
    pub title: Option<String>,
    pub word_count: i64,
    pub score: i32,
    pub content_hash: String,
    pub issues_sha256: String,
    pub gate_code: Option<String>,
    pub sha256_text: Option<String>,
    pub fetch_ms: i64,
    pub parse_ms: i64,
    pub audit_ms: i64,
}

impl From<SnapshotRecord> for Snapshot {
    fn from(r: SnapshotRecord) -> Self {
        Self {
            id: r.id,
            page_id: r.page_id,
            job_id: r.job_id,
            fetched_at: parse_timestamp(&r.fetched_at),
            status_code: r.status_code,
            final_url: r.final_url,
            title: r.title,
            word_count: r.word_count,
            score: r.score,
            content_hash: r.content_hash,
            issues_sha256: r.issues_sha256,
            gate_code: r.gate_code.as_deref().and_then(IssueCode::from_str),
            sha256_text: r.sha256_text,
            timings: Timings {
                fetch_ms: r.fetch_ms.max(0) as u64,
                parse_ms: r.parse_ms.max(0) as u64,
                audit_ms: r.audit_ms.max(0) as u64,
            },
        }
    }
}

/// New snapshot for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::snapshots)]
pub struct NewSnapshot<'a> {
    pub page_id: i64,
    pub job_id: Option<i64>,
    pub fetched_at: &'a str,
    pub status_code: i32,
    pub final_url: &'a str,
    pub redirect_chain: &'a str,
    pub title: Option<&'a str>,
    pub meta_description: Option<&'a str>,
    pub canonical: Option<&'a str>,
    pub robots_meta: Option<&'a str>,
    pub lang: Option<&'a str>,
    pub h1_count: i32,
    pub h2_count: i32,
    pub word_count: i64,
    pub internal_links: i32,
    pub external_links: i32,
    pub images_count: i32,
    pub alt_coverage_pct: f64,
    pub broken_jsonld: bool,
    pub sha256_text: Option<&'a str>,
    pub sha256_dom: Option<&'a str>,
    pub content_hash: &'a str,
    pub issues_sha256: &'a str,
    pub score: i32,
    pub gate_code: Option<&'a str>,
    pub fetch_ms: i64,
    pub parse_ms: i64,
    pub audit_ms: i64,
    pub fingerprint: &'a str,
    pub analysis: Option<&'a str>,
}

/// Crawl job record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::crawl_jobs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CrawlJobRecord {
    pub id: i64,
    pub seed: Option<String>,
    pub mode: String,
    pub settings: String,
    pub status: String,
    pub metrics: Option<String>,
    pub pages_spent: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
}

impl From<CrawlJobRecord> for CrawlJob {
    fn from(r: CrawlJobRecord) -> Self {
        Self {
            id: r.id,
            seed: r.seed,
            mode: JobMode::from_str(&r.mode).unwrap_or(JobMode::Single),
            settings: serde_json::from_str(&r.settings).unwrap_or(serde_json::Value::Null),
            status: JobStatus::from_str(&r.status).unwrap_or(JobStatus::Running),
            metrics: r.metrics.as_deref().and_then(|m| serde_json::from_str(m).ok()),
            pages_spent: r.pages_spent,
            started_at: parse_timestamp(&r.started_at),
            finished_at: parse_timestamp_opt(r.finished_at.as_deref()),
        }
    }
}

/// Job KPI record from the database.
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = schema::job_kpis)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct JobKpiRecord {
    pub job_id: i64,
    pub pages_saved: i64,
    pub avg_score: f64,
    pub issue_rate: f64,
    pub critical_rate: f64,
    pub not_modified_ratio: f64,
    pub avg_fetch_ms: f64,
    pub computed_at: String,
}

impl From<JobKpiRecord> for JobKpis {
    fn from(r: JobKpiRecord) -> Self {
        Self {
            pages_saved: r.pages_saved,
            avg_score: r.avg_score,
            issue_rate: r.issue_rate,
            critical_rate: r.critical_rate,
            not_modified_ratio: r.not_modified_ratio,
            avg_fetch_ms: r.avg_fetch_ms,
        }
    }
}

/// Frontier record from the database.
#[derive(Queryable, Selectable, Identifiable, QueryableByName, Debug, Clone)]
#[diesel(table_name = schema::frontier)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct FrontierRecord {
    pub id: i64,
    pub url: String,
    pub url_norm: String,
    pub host: String,
    pub priority: i32,
    pub source: Option<String>,
    pub status: String,
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub next_attempt_at: String,
    pub created_at: String,
    pub updated_at: String,
}

impl FrontierRecord {
    pub fn into_item(self, hints: HttpHints) -> FrontierItem {
        FrontierItem {
            id: self.id,
            url: self.url,
            url_norm: self.url_norm,
            priority: self.priority,
            source: self.source,
            status: FrontierStatus::from_str(&self.status).unwrap_or(FrontierStatus::Pending),
            retry_count: self.retry_count,
            last_error: self.last_error,
            next_attempt_at: parse_timestamp(&self.next_attempt_at),
            hints,
        }
    }
}

/// Alert record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::alert_events)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AlertRecord {
    pub id: i64,
    pub kind: String,
    pub severity: String,
    pub domain_id: i64,
    pub page_id: Option<i64>,
    pub snapshot_id: Option<i64>,
    pub message: String,
    pub details: String,
    pub created_at: String,
}

impl AlertRecord {
    pub fn into_alert(self, ticket_id: Option<i64>) -> Alert {
        Alert {
            id: self.id,
            kind: AlertKind::from_str(&self.kind).unwrap_or(AlertKind::ScoreDrop),
            severity: Severity::from_str(&self.severity).unwrap_or(Severity::Notice),
            domain_id: self.domain_id,
            page_id: self.page_id,
            snapshot_id: self.snapshot_id,
            message: self.message,
            details: from_json_text::<serde_json::Value>(Some(&self.details)),
            created_at: parse_timestamp(&self.created_at),
            ticket_id,
        }
    }
}

/// Domain health record from the database.
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = schema::domain_health_daily)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct DomainHealthRecord {
    pub domain_id: i64,
    pub day: String,
    pub fetches: i64,
    pub successes: i64,
    pub not_modified: i64,
    pub errors: i64,
    pub total_fetch_ms: i64,
    pub tier: String,
}

impl DomainHealthRecord {
    pub fn into_health(self, host: String) -> DomainHealth {
        DomainHealth {
            host,
            day: self.day,
            fetches: self.fetches,
            successes: self.successes,
            not_modified: self.not_modified,
            errors: self.errors,
            total_fetch_ms: self.total_fetch_ms,
            tier: HealthTier::from_str(&self.tier).unwrap_or(HealthTier::Good),
        }
    }
}
