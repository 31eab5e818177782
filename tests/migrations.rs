//! Schema tests
//!
//! Runs the cetane migrations into a fresh SQLite file and inspects the
//! result with a plain rusqlite connection.

use std::collections::BTreeSet;

use rusqlite::{Connection, Result as SqliteResult};

use seointel::models::IssueCode;
use seointel::repository::DbContext;

fn table_names(conn: &Connection) -> SqliteResult<BTreeSet<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
    )?;
    let names = stmt
        .query_map([], |row| row.get(0))?
        .collect::<SqliteResult<BTreeSet<String>>>()?;
    Ok(names)
}

fn column_names(conn: &Connection, table: &str) -> SqliteResult<BTreeSet<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info(\"{}\")", table))?;
    let names = stmt
        .query_map([], |row| row.get(1))?
        .collect::<SqliteResult<BTreeSet<String>>>()?;
    Ok(names)
}

fn index_names(conn: &Connection) -> SqliteResult<BTreeSet<String>> {
    let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type='index'")?;
    let names = stmt
        .query_map([], |row| row.get(0))?
        .collect::<SqliteResult<BTreeSet<String>>>()?;
    Ok(names)
}

async fn migrated() -> (tempfile::TempDir, Connection, Vec<String>) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("seointel.db");
    let applied = DbContext::from_path(&path).init_db().await.unwrap();
    let conn = Connection::open(&path).unwrap();
    (dir, conn, applied)
}

#[tokio::test]
async fn test_creates_all_tables() {
    let (_dir, conn, applied) = migrated().await;
    assert_eq!(applied.len(), 2);

    let tables = table_names(&conn).unwrap();
    for expected in [
        "domains",
        "pages",
        "snapshots",
        "issues",
        "snapshot_issues",
        "crawl_jobs",
        "frontier",
        "content_clusters",
        "cluster_members",
        "alert_events",
        "tickets",
        "cost_ledger",
        "budget_usage",
        "domain_health_daily",
        "job_kpis",
        "lineage_edges",
        "link_edges",
        "__cetane_migrations",
    ] {
        assert!(tables.contains(expected), "missing table {}", expected);
    }
}

#[tokio::test]
async fn test_cache_and_dedup_columns() {
    let (_dir, conn, _) = migrated().await;

    let pages = column_names(&conn, "pages").unwrap();
    for col in ["url_norm", "etag", "last_modified", "last_snapshot_id"] {
        assert!(pages.contains(col), "pages.{} missing", col);
    }

    let snapshots = column_names(&conn, "snapshots").unwrap();
    for col in ["content_hash", "issues_sha256", "gate_code", "score", "fetch_ms"] {
        assert!(snapshots.contains(col), "snapshots.{} missing", col);
    }

    let frontier = column_names(&conn, "frontier").unwrap();
    for col in ["retry_count", "next_attempt_at", "priority", "status"] {
        assert!(frontier.contains(col), "frontier.{} missing", col);
    }

    let indexes = index_names(&conn).unwrap();
    assert!(indexes.contains("idx_frontier_ready"));
    assert!(indexes.contains("idx_alert_events_gate"));
}

#[tokio::test]
async fn test_issue_catalog_matches_penalty_table() {
    let (_dir, conn, _) = migrated().await;

    let mut stmt = conn
        .prepare("SELECT code, severity, penalty FROM issues")
        .unwrap();
    let rows: Vec<(String, String, u32)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        .unwrap()
        .collect::<SqliteResult<_>>()
        .unwrap();
    assert_eq!(rows.len(), IssueCode::ALL.len());

    for (code, severity, penalty) in rows {
        let issue = IssueCode::from_str(&code).expect("known code");
        assert_eq!(issue.severity().as_str(), severity);
        assert_eq!(issue.penalty(), penalty);
    }
}

#[tokio::test]
async fn test_url_norm_is_unique() {
    let (_dir, conn, _) = migrated().await;

    conn.execute(
        "INSERT INTO domains (host, cost_tier, ttl_hours, daily_budget, first_seen) \
         VALUES ('acme.test', 'B', 24, 500, '2024-01-01T00:00:00.000Z')",
        [],
    )
    .unwrap();
    let insert = "INSERT INTO pages (url_norm, url, domain_id, created_at) VALUES ('https://acme.test', 'https://acme.test/', 1, '2024-01-01T00:00:00.000Z')";
    conn.execute(insert, []).unwrap();
    assert!(conn.execute(insert, []).is_err());
}

#[tokio::test]
async fn test_init_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let db = DbContext::from_path(&dir.path().join("seointel.db"));

    assert_eq!(db.init_db().await.unwrap().len(), 2);
    assert!(db.init_db().await.unwrap().is_empty());
}
