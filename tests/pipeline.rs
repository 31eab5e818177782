//! End-to-end tests for the snapshot pipeline and crawl drivers.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use reqwest::StatusCode;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use seointel::config::CrawlPolicy;
use seointel::http_client::{FetchedPage, HttpClient};
use seointel::models::{
    AlertKind, AnalysisRecord, FrontierStatus, IssueCode, JobStatus, Severity,
};
use seointel::repository::DbContext;
use seointel::services::{
    build_record, AnalyzeResult, Analyzer, CrawlService, SaveStatus, SnapshotPipeline,
};
use seointel::utils::normalize_url;

async fn setup() -> (DbContext, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db = DbContext::from_path(&dir.path().join("test.db"));
    db.init_db().await.unwrap();
    (db, dir)
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

fn page_html(title: Option<&str>) -> String {
    let title = title
        .map(|t| format!("<title>{}</title>", t))
        .unwrap_or_default();
    format!(
        "<html lang=\"en\"><head>{}<link rel=\"canonical\" href=\"https://acme.test/pricing\"></head>\
         <body><h1>Pricing</h1><p>{}</p></body></html>",
        title,
        "plans and prices for every team ".repeat(20)
    )
}

fn fetched(status: u16, content_type: &str, body: &str, url: &str) -> FetchedPage {
    let mut headers = HashMap::new();
    headers.insert("content-type".to_string(), content_type.to_string());
    headers.insert("etag".to_string(), "\"abc\"".to_string());
    FetchedPage {
        status: StatusCode::from_u16(status).unwrap(),
        headers,
        final_url: url.to_string(),
        redirect_chain: Vec::new(),
        body: body.as_bytes().to_vec(),
        fetch_ms: 120,
    }
}

fn record_at(url: &str, page: FetchedPage, at: DateTime<Utc>) -> AnalysisRecord {
    build_record(url, normalize_url(url), page, 256, None, at)
}

fn html_record(url: &str, title: Option<&str>, at: DateTime<Utc>) -> AnalysisRecord {
    record_at(url, fetched(200, "text/html", &page_html(title), url), at)
}

#[tokio::test]
async fn test_missing_title_scores_sixty() {
    let (db, _dir) = setup().await;
    let pipeline = SnapshotPipeline::new(db.clone(), CrawlPolicy::default());

    let outcome = pipeline
        .save_analysis(&html_record("https://acme.test/pricing", None, t0()))
        .await
        .unwrap();

    assert_eq!(outcome.status, SaveStatus::Saved);
    assert_eq!(outcome.issues, vec![IssueCode::TitleMissing]);
    assert_eq!(outcome.score, Some(60));

    let snapshot_id = outcome.snapshot_id.unwrap();
    assert_eq!(
        db.snapshots().issues_for(snapshot_id).await.unwrap(),
        vec![IssueCode::TitleMissing]
    );
    // First snapshot of a page never alerts.
    assert!(db.analytics().recent_alerts(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unchanged_page_within_ttl_is_skipped() {
    let (db, _dir) = setup().await;
    let pipeline = SnapshotPipeline::new(db.clone(), CrawlPolicy::default());
    let url = "https://acme.test/pricing?utm_source=newsletter";

    let first = pipeline
        .save_analysis(&html_record(url, Some("Pricing"), t0()))
        .await
        .unwrap();
    assert_eq!(first.status, SaveStatus::Saved);

    let second = pipeline
        .save_analysis(&html_record(url, Some("Pricing"), t0() + ChronoDuration::hours(1)))
        .await
        .unwrap();
    assert_eq!(second.status, SaveStatus::DedupSkipped);
    assert_eq!(second.snapshot_id, first.snapshot_id);

    let page_id = first.page_id.unwrap();
    assert_eq!(db.snapshots().count_for_page(page_id).await.unwrap(), 1);

    // Past the 24h TTL the same content is stored again.
    let third = pipeline
        .save_analysis(&html_record(url, Some("Pricing"), t0() + ChronoDuration::hours(25)))
        .await
        .unwrap();
    assert_eq!(third.status, SaveStatus::Saved);
    assert_eq!(db.snapshots().count_for_page(page_id).await.unwrap(), 2);
}

#[tokio::test]
async fn test_not_modified_keeps_previous_snapshot() {
    let (db, _dir) = setup().await;
    let pipeline = SnapshotPipeline::new(db.clone(), CrawlPolicy::default());
    let url = "https://acme.test/pricing";

    let first = pipeline
        .save_analysis(&html_record(url, Some("Pricing"), t0()))
        .await
        .unwrap();

    let mut not_modified = fetched(304, "text/html", "", url);
    not_modified.headers.remove("etag");
    let outcome = pipeline
        .save_analysis(&record_at(url, not_modified, t0() + ChronoDuration::hours(2)))
        .await
        .unwrap();

    assert_eq!(outcome.status, SaveStatus::Http304);
    assert_eq!(outcome.snapshot_id, first.snapshot_id);
    assert_eq!(db.snapshots().count().await.unwrap(), 1);

    // Validators from the earlier 200 survive a 304 without an ETag.
    let hints = db.pages().hints_for(&normalize_url(url)).await.unwrap();
    assert_eq!(hints.etag.as_deref(), Some("\"abc\""));
}

#[tokio::test]
async fn test_gate_failure_writes_minimal_snapshot_and_alerts_on_transition() {
    let (db, _dir) = setup().await;
    let pipeline = SnapshotPipeline::new(db.clone(), CrawlPolicy::default());
    let url = "https://acme.test/pricing";

    pipeline
        .save_analysis(&html_record(url, Some("Pricing"), t0()))
        .await
        .unwrap();

    let broken = fetched(503, "text/html", "<html>down</html>", url);
    let outcome = pipeline
        .save_analysis(&record_at(url, broken.clone(), t0() + ChronoDuration::hours(1)))
        .await
        .unwrap();
    assert_eq!(outcome.status, SaveStatus::GateFailed);
    assert_eq!(outcome.score, Some(0));
    assert_eq!(outcome.issues, vec![IssueCode::HttpError]);

    let snapshot = db
        .snapshots()
        .get(outcome.snapshot_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.gate_code, Some(IssueCode::HttpError));
    assert_eq!(snapshot.status_code, 503);

    // Gated snapshots are never deduplicated, but only the first one alerts.
    let again = pipeline
        .save_analysis(&record_at(url, broken, t0() + ChronoDuration::hours(2)))
        .await
        .unwrap();
    assert_eq!(again.status, SaveStatus::GateFailed);
    assert_ne!(again.snapshot_id, outcome.snapshot_id);

    let alerts = db.analytics().recent_alerts(10).await.unwrap();
    let gate_alerts: Vec<_> = alerts
        .iter()
        .filter(|a| a.kind == AlertKind::GateFailed)
        .collect();
    assert_eq!(gate_alerts.len(), 1);
    assert_eq!(gate_alerts[0].severity, Severity::Critical);
    assert!(gate_alerts[0].ticket_id.is_some());
}

#[tokio::test]
async fn test_score_drop_raises_alerts_once() {
    let (db, _dir) = setup().await;
    let pipeline = SnapshotPipeline::new(db.clone(), CrawlPolicy::default());
    let url = "https://acme.test/pricing";

    pipeline
        .save_analysis(&html_record(url, Some("Pricing"), t0()))
        .await
        .unwrap();
    let dropped = pipeline
        .save_analysis(&html_record(url, None, t0() + ChronoDuration::hours(1)))
        .await
        .unwrap();
    assert_eq!(dropped.score, Some(60));

    let alerts = db.analytics().recent_alerts(10).await.unwrap();
    let kinds: Vec<AlertKind> = alerts.iter().map(|a| a.kind).collect();
    assert!(kinds.contains(&AlertKind::ScoreDrop));
    assert!(kinds.contains(&AlertKind::CriticalIssue));
    assert_eq!(db.analytics().ticket_count().await.unwrap(), 2);

    // Recovering and dropping again inside the cooldown stays quiet.
    pipeline
        .save_analysis(&html_record(url, Some("Pricing"), t0() + ChronoDuration::hours(2)))
        .await
        .unwrap();
    pipeline
        .save_analysis(&html_record(url, None, t0() + ChronoDuration::hours(3)))
        .await
        .unwrap();
    assert_eq!(db.analytics().recent_alerts(10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_daily_budget_pauses_domain_until_midnight() {
    let (db, _dir) = setup().await;
    let policy = CrawlPolicy {
        daily_budget: 5,
        ..CrawlPolicy::default()
    };
    let pipeline = SnapshotPipeline::new(db.clone(), policy);

    for i in 0..5 {
        let url = format!("https://acme.test/page-{}", i);
        let outcome = pipeline
            .save_analysis(&html_record(&url, Some("Page"), t0()))
            .await
            .unwrap();
        assert_eq!(outcome.status, SaveStatus::Saved);
    }

    let domain = db.domains().get_by_host("acme.test").await.unwrap().unwrap();
    let until = domain.cooldown_until.expect("paused");
    assert_eq!(until, Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap());
    assert!(domain.in_cooldown(t0()));

    let kinds: Vec<AlertKind> = db
        .analytics()
        .recent_alerts(10)
        .await
        .unwrap()
        .iter()
        .map(|a| a.kind)
        .collect();
    assert!(kinds.contains(&AlertKind::BudgetSoft));
    assert!(kinds.contains(&AlertKind::BudgetHard));
}

/// Serve a fixed page, answering 304 once the client sends our ETag.
async fn spawn_site() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let body = page_html(Some("Pricing"));

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let body = body.clone();
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let request = String::from_utf8_lossy(&request).to_ascii_lowercase();

                let response = if request.contains("if-none-match: \"v1\"") {
                    "HTTP/1.1 304 Not Modified\r\nETag: \"v1\"\r\nConnection: close\r\n\r\n"
                        .to_string()
                } else {
                    format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\n\
                         ETag: \"v1\"\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    )
                };
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{}/pricing", addr)
}

fn analyzer(db: &DbContext) -> Analyzer {
    analyzer_with(db, CrawlPolicy::default())
}

fn analyzer_with(db: &DbContext, policy: CrawlPolicy) -> Analyzer {
    let client = HttpClient::new(None, Duration::from_secs(5), 10).unwrap();
    Analyzer::with_client(db.clone(), client, policy)
}

/// A URL on a local port nothing listens on.
async fn refused_url(path: &str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}{}", addr, path)
}

#[tokio::test]
async fn test_analyze_url_uses_cached_etag() {
    let (db, _dir) = setup().await;
    let url = spawn_site().await;
    let analyzer = analyzer(&db);

    let first = analyzer.analyze_url(&url, None, None).await.unwrap();
    let first = first.outcome().expect("fetched").clone();
    assert_eq!(first.status, SaveStatus::Saved);
    assert_eq!(first.score, Some(100));

    let second = analyzer.analyze_url(&url, None, None).await.unwrap();
    let second = second.outcome().expect("fetched");
    assert_eq!(second.status, SaveStatus::Http304);
    assert_eq!(second.snapshot_id, first.snapshot_id);
}

#[tokio::test]
async fn test_batch_crawl_records_job_and_kpis() {
    let (db, _dir) = setup().await;
    let url = spawn_site().await;
    let service = CrawlService::new(analyzer(&db));

    let summary = service
        .batch_crawl(&[url.clone(), url], Duration::ZERO)
        .await
        .unwrap();

    let job_id = summary.job_id.expect("job started");
    assert_eq!(summary.metrics.success, 1);
    assert_eq!(summary.metrics.http_304, 1);

    let kpis = db.jobs().kpis(job_id).await.unwrap().expect("kpis saved");
    assert_eq!(kpis.pages_saved, 1);
    assert_eq!(kpis.avg_score, 100.0);
    assert_eq!(kpis.not_modified_ratio, 0.5);

    let job = db.jobs().get(job_id).await.unwrap().unwrap();
    assert_eq!(job.pages_spent, 2);
    assert!(job.finished_at.is_some());
}

#[tokio::test]
async fn test_frontier_crawl_requeues_transient_failures() {
    let (db, _dir) = setup().await;

    let url = refused_url("/gone").await;

    let id = db.frontier().add(&url, 5, Some("test")).await.unwrap().unwrap();
    let service = CrawlService::new(analyzer(&db));

    let summary = service.frontier_crawl(10, Duration::ZERO).await.unwrap();
    assert!(summary.job_id.is_some());
    assert_eq!(summary.metrics.retried, 1);
    assert!(matches!(
        summary.results.as_slice(),
        [AnalyzeResult::Error {
            transient: true,
            ..
        }]
    ));

    let item = db.frontier().get(id).await.unwrap().unwrap();
    assert_eq!(item.status, FrontierStatus::Pending);
    assert_eq!(item.retry_count, 1);
    assert!(item.next_attempt_at > Utc::now());

    // Nothing is ready until the backoff passes.
    let empty = service.frontier_crawl(10, Duration::ZERO).await.unwrap();
    assert!(empty.job_id.is_none());
}

#[tokio::test]
async fn test_frontier_crawl_defers_items_on_paused_domain() {
    let (db, _dir) = setup().await;
    let first = refused_url("/a").await;
    let second = first.replace("/a", "/b");

    let first_id = db.frontier().add(&first, 0, None).await.unwrap().unwrap();
    let second_id = db.frontier().add(&second, 0, None).await.unwrap().unwrap();

    // One failed attempt exhausts the retries and pauses the host.
    let policy = CrawlPolicy {
        max_retries: 0,
        ..CrawlPolicy::default()
    };
    let service = CrawlService::new(analyzer_with(&db, policy));
    let summary = service.frontier_crawl(10, Duration::ZERO).await.unwrap();

    assert_eq!(summary.results.len(), 2);
    assert_eq!(summary.metrics.failed, 1);
    assert_eq!(summary.metrics.skipped, 1);
    let status = summary.results[1].outcome().map(|o| o.status);
    assert_eq!(status, Some(SaveStatus::DomainCooldown));

    let failed = db.frontier().get(first_id).await.unwrap().unwrap();
    assert_eq!(failed.status, FrontierStatus::Failed);

    let domain = db.domains().get_by_host("127.0.0.1").await.unwrap().unwrap();
    let until = domain.cooldown_until.expect("host paused");
    let deferred = db.frontier().get(second_id).await.unwrap().unwrap();
    assert_eq!(deferred.status, FrontierStatus::Pending);
    assert_eq!(deferred.retry_count, 0);
    assert_eq!(deferred.next_attempt_at, until);

    let job = db.jobs().get(summary.job_id.unwrap()).await.unwrap().unwrap();
    assert_eq!(job.pages_spent, 1);

    // The deferred item waits for the pause to end.
    let empty = service.frontier_crawl(10, Duration::ZERO).await.unwrap();
    assert!(empty.job_id.is_none());
}

#[tokio::test]
async fn test_storage_failure_does_not_abort_run() {
    let (db, dir) = setup().await;
    let pricing = spawn_site().await;
    let faq = pricing.replace("/pricing", "/faq");

    // Every saved page has a canonical link, so the link stage now fails.
    rusqlite::Connection::open(dir.path().join("test.db"))
        .unwrap()
        .execute_batch("DROP TABLE link_edges")
        .unwrap();

    let service = CrawlService::new(analyzer(&db));
    let summary = service
        .batch_crawl(&[pricing.clone(), faq], Duration::ZERO)
        .await
        .unwrap();

    assert_eq!(summary.results.len(), 2);
    assert_eq!(summary.metrics.failed, 2);
    for result in &summary.results {
        match result {
            AnalyzeResult::Error {
                message, transient, ..
            } => {
                assert!(message.starts_with("storage error"), "{}", message);
                assert!(!transient);
            }
            other => panic!("expected a failed result, got {:?}", other),
        }
    }

    let job_id = summary.job_id.expect("job started");
    let job = db.jobs().get(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Finished);
    assert!(db.jobs().kpis(job_id).await.unwrap().is_some());

    // Queued items that hit the same failure go back with a backoff.
    let id = db
        .frontier()
        .add(&pricing.replace("/pricing", "/plans"), 0, None)
        .await
        .unwrap()
        .unwrap();
    let summary = service.frontier_crawl(10, Duration::ZERO).await.unwrap();
    assert_eq!(summary.metrics.retried, 1);

    let item = db.frontier().get(id).await.unwrap().unwrap();
    assert_eq!(item.status, FrontierStatus::Pending);
    assert_eq!(item.retry_count, 1);
    assert!(item.last_error.unwrap().starts_with("storage error"));

    let job = db.jobs().get(summary.job_id.unwrap()).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Finished);
}
