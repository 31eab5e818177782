//! Single-URL analysis: fetch, gate, audit, persist.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::persist::{SaveOutcome, SnapshotPipeline};
use super::PipelineError;
use crate::audit::{classify_response, PageAudit, ResponseClass};
use crate::config::{CrawlPolicy, Settings};
use crate::http_client::{FetchedPage, HeaderFingerprint, HttpClient};
use crate::models::{AnalysisRecord, HttpHints, PageBody, Timings};
use crate::repository::{DbContext, DbError};
use crate::utils::{db_timestamp, host_of, normalize_url};

/// Summary of one analyzed URL.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeReport {
    pub url: String,
    pub url_norm: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub redirects: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timings: Option<Timings>,
    /// On-page counts; present when the HTML was parsed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<PageSummary>,
    /// End of the domain pause for a `DOMAIN_COOLDOWN` skip.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub outcome: SaveOutcome,
}

impl AnalyzeReport {
    fn from_record(record: &AnalysisRecord, outcome: SaveOutcome) -> Self {
        Self {
            url: record.url.clone(),
            url_norm: record.url_norm.clone(),
            final_url: Some(record.final_url.clone()),
            status_code: Some(record.status_code),
            redirects: record.redirect_chain.len(),
            title: record.audit().and_then(|a| a.title.clone()),
            timings: Some(record.timings),
            page: record.audit().map(PageSummary::from_audit),
            resume_at: None,
            outcome,
        }
    }
}

/// Structure and link counts of an audited page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageSummary {
    pub h1_count: usize,
    pub h2_count: usize,
    pub word_count: usize,
    pub jsonld_types: Vec<String>,
    pub og_keys: Vec<String>,
    pub internal_links: usize,
    pub external_links: usize,
    pub internal_samples: usize,
    pub external_samples: usize,
    pub images: usize,
    pub alt_coverage_pct: f64,
}

impl PageSummary {
    pub fn from_audit(audit: &PageAudit) -> Self {
        Self {
            h1_count: audit.h1.len(),
            h2_count: audit.h2_count,
            word_count: audit.word_count,
            jsonld_types: audit.jsonld_types.clone(),
            og_keys: audit.open_graph.keys().cloned().collect(),
            internal_links: audit.internal_links,
            external_links: audit.external_links,
            internal_samples: audit.internal_samples.len(),
            external_samples: audit.external_samples.len(),
            images: audit.images,
            alt_coverage_pct: audit.alt_coverage_pct,
        }
    }
}

/// Result of `analyze_url`. Fetch failures are values, not errors.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AnalyzeResult {
    Done(AnalyzeReport),
    Error {
        url: String,
        message: String,
        /// Timeouts and connection failures; worth retrying later.
        transient: bool,
    },
}

impl AnalyzeResult {
    pub fn outcome(&self) -> Option<&SaveOutcome> {
        match self {
            Self::Done(report) => Some(&report.outcome),
            Self::Error { .. } => None,
        }
    }

    pub fn is_transient_error(&self) -> bool {
        matches!(self, Self::Error { transient: true, .. })
    }
}

/// Turn a fetched response into the record the persistence pipeline reads.
pub fn build_record(
    url: &str,
    url_norm: String,
    page: FetchedPage,
    min_html_bytes: usize,
    job_id: Option<i64>,
    fetched_at: DateTime<Utc>,
) -> AnalysisRecord {
    let status_code = page.status.as_u16();
    let content_type = page.content_type().map(str::to_string);
    let mut timings = Timings {
        fetch_ms: page.fetch_ms,
        ..Timings::default()
    };

    let body = match classify_response(
        status_code,
        content_type.as_deref(),
        page.body.len(),
        min_html_bytes,
    ) {
        ResponseClass::NotModified => PageBody::NotModified,
        ResponseClass::Gated(code) => PageBody::Gated { code },
        ResponseClass::Html => {
            let audit = PageAudit::from_html(&page.text(), &page.final_url);
            timings.parse_ms = audit.parse_ms;
            PageBody::Parsed {
                audit: Box::new(audit),
            }
        }
    };

    AnalysisRecord {
        url: url.to_string(),
        url_norm,
        fingerprint: HeaderFingerprint::from_headers(&page.headers),
        etag: page.etag().map(str::to_string),
        last_modified: page.last_modified().map(str::to_string),
        content_type,
        body_bytes: page.body.len() as u64,
        status_code,
        final_url: page.final_url,
        redirect_chain: page.redirect_chain,
        fetched_at,
        timings,
        body,
        job_id,
    }
}

/// Fetches and audits URLs, persisting each through a [`SnapshotPipeline`].
pub struct Analyzer {
    db: DbContext,
    client: HttpClient,
    pipeline: SnapshotPipeline,
}

impl Analyzer {
    pub fn new(db: DbContext, settings: &Settings) -> Result<Self, PipelineError> {
        let client = HttpClient::new(
            settings.user_agent.as_deref(),
            Duration::from_secs(settings.request_timeout),
            settings.policy.max_redirects,
        )?;
        Ok(Self::with_client(db, client, settings.policy.clone()))
    }

    pub fn with_client(db: DbContext, client: HttpClient, policy: CrawlPolicy) -> Self {
        let pipeline = SnapshotPipeline::new(db.clone(), policy);
        Self {
            db,
            client,
            pipeline,
        }
    }

    pub fn db(&self) -> &DbContext {
        &self.db
    }

    pub fn policy(&self) -> &CrawlPolicy {
        self.pipeline.policy()
    }

    /// Analyze one URL and persist the result.
    ///
    /// Cached validators for the page are used unless `hints` is given.
    pub async fn analyze_url(
        &self,
        url: &str,
        hints: Option<&HttpHints>,
        job_id: Option<i64>,
    ) -> Result<AnalyzeResult, DbError> {
        let url_norm = normalize_url(url);

        if let Some(host) = host_of(&url_norm) {
            if let Some(domain) = self.db.domains().get_by_host(&host).await? {
                if domain.in_cooldown(Utc::now()) {
                    let until = domain.cooldown_until.map(db_timestamp).unwrap_or_default();
                    info!("Skipping {}: {} paused until {}", url_norm, host, until);
                    let page_id = self
                        .db
                        .pages()
                        .get_by_url_norm(&url_norm)
                        .await?
                        .map(|p| p.id);
                    return Ok(AnalyzeResult::Done(AnalyzeReport {
                        url: url.to_string(),
                        url_norm,
                        final_url: None,
                        status_code: None,
                        redirects: 0,
                        title: None,
                        timings: None,
                        page: None,
                        resume_at: domain.cooldown_until,
                        outcome: SaveOutcome::cooldown(page_id),
                    }));
                }
            }
        }

        let hints = match hints {
            Some(h) => h.clone(),
            None => self.db.pages().hints_for(&url_norm).await?,
        };

        let page = match self.client.fetch(url, &hints).await {
            Ok(page) => page,
            Err(e) => {
                warn!("Fetch failed for {}: {}", url, e);
                return Ok(AnalyzeResult::Error {
                    url: url.to_string(),
                    message: e.to_string(),
                    transient: e.is_transient(),
                });
            }
        };

        let record = build_record(
            url,
            url_norm,
            page,
            self.policy().min_html_bytes,
            job_id,
            Utc::now(),
        );
        let outcome = self.pipeline.save_analysis(&record).await?;
        Ok(AnalyzeResult::Done(AnalyzeReport::from_record(
            &record, outcome,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use reqwest::StatusCode;

    fn fetched(status: u16, content_type: &str, body: &str) -> FetchedPage {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), content_type.to_string());
        headers.insert("etag".to_string(), "\"v1\"".to_string());
        headers.insert("server".to_string(), "cloudflare".to_string());
        FetchedPage {
            status: StatusCode::from_u16(status).unwrap(),
            headers,
            final_url: "https://example.com/".to_string(),
            redirect_chain: Vec::new(),
            body: body.as_bytes().to_vec(),
            fetch_ms: 42,
        }
    }

    fn page_html() -> String {
        format!(
            "<html><head><title>Home</title></head><body><h1>Hi</h1><p>{}</p></body></html>",
            "words ".repeat(100)
        )
    }

    #[test]
    fn test_build_record_parses_html() {
        let record = build_record(
            "https://example.com/",
            "https://example.com".to_string(),
            fetched(200, "text/html; charset=utf-8", &page_html()),
            256,
            Some(7),
            Utc::now(),
        );
        let audit = record.audit().expect("parsed");
        assert_eq!(audit.title.as_deref(), Some("Home"));
        assert_eq!(record.etag.as_deref(), Some("\"v1\""));
        assert_eq!(record.fingerprint.cdn.as_deref(), Some("cloudflare"));
        assert_eq!(record.timings.fetch_ms, 42);
        assert_eq!(record.job_id, Some(7));
    }

    #[test]
    fn test_report_summarizes_page() {
        let html = format!(
            "<html><head><title>Home</title>\
             <meta property=\"og:title\" content=\"Home\">\
             <script type=\"application/ld+json\">{{\"@type\":\"WebSite\"}}</script></head>\
             <body><h1>Hi</h1><h2>A</h2><h2>B</h2><p>{}</p>\
             <a href=\"/about\">About</a><a href=\"https://other.test/\">Out</a>\
             <img src=\"a.png\" alt=\"A\"><img src=\"b.png\"></body></html>",
            "words ".repeat(100)
        );
        let record = build_record(
            "https://example.com/",
            "https://example.com".to_string(),
            fetched(200, "text/html", &html),
            256,
            None,
            Utc::now(),
        );
        let outcome = SaveOutcome {
            status: crate::services::SaveStatus::Saved,
            page_id: Some(1),
            snapshot_id: Some(1),
            score: Some(90),
            issues: Vec::new(),
        };
        let report = AnalyzeReport::from_record(&record, outcome);
        let page = report.page.as_ref().expect("summary");
        assert_eq!(page.h1_count, 1);
        assert_eq!(page.h2_count, 2);
        assert_eq!(page.internal_links, 1);
        assert_eq!(page.external_links, 1);
        assert_eq!(page.images, 2);
        assert_eq!(page.alt_coverage_pct, 50.0);
        assert_eq!(page.og_keys, vec!["title".to_string()]);
        assert_eq!(page.jsonld_types, vec!["WebSite".to_string()]);

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["page"]["word_count"], page.word_count);
        assert_eq!(value["status"], "SAVED");
        assert!(value.get("resume_at").is_none());
    }

    #[test]
    fn test_build_record_gates() {
        let small = build_record(
            "https://example.com/",
            "https://example.com".to_string(),
            fetched(200, "text/html", "<html></html>"),
            256,
            None,
            Utc::now(),
        );
        assert_eq!(small.gate_code(), Some(crate::models::IssueCode::HtmlTooSmall));

        let pdf = build_record(
            "https://example.com/",
            "https://example.com".to_string(),
            fetched(200, "application/pdf", &page_html()),
            256,
            None,
            Utc::now(),
        );
        assert_eq!(pdf.gate_code(), Some(crate::models::IssueCode::NotHtml));

        let not_modified = build_record(
            "https://example.com/",
            "https://example.com".to_string(),
            fetched(304, "text/html", ""),
            256,
            None,
            Utc::now(),
        );
        assert!(not_modified.is_not_modified());
    }

    #[test]
    fn test_error_result_serializes_transient_flag() {
        let result = AnalyzeResult::Error {
            url: "https://example.com".to_string(),
            message: "timeout".to_string(),
            transient: true,
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["result"], "error");
        assert_eq!(value["transient"], true);
        assert!(result.is_transient_error());
    }
}
