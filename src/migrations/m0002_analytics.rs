use cetane::prelude::*;

pub fn migration() -> Migration {
    Migration::new("0002_analytics")
        .depends_on(&["0001_initial_schema"])
        .operation(RunSql::portable().for_backend(
            "sqlite",
            r#"CREATE TABLE content_clusters (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sha256_text TEXT NOT NULL UNIQUE,
    first_page_id INTEGER NOT NULL REFERENCES pages(id),
    member_count INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)"#,
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            r#"CREATE TABLE cluster_members (
    cluster_id INTEGER NOT NULL REFERENCES content_clusters(id),
    page_id INTEGER NOT NULL REFERENCES pages(id),
    snapshot_id INTEGER NOT NULL,
    joined_at TEXT NOT NULL,
    PRIMARY KEY (cluster_id, page_id)
)"#,
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            r#"CREATE TABLE alert_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    severity TEXT NOT NULL,
    domain_id INTEGER NOT NULL REFERENCES domains(id),
    page_id INTEGER,
    snapshot_id INTEGER,
    message TEXT NOT NULL,
    details TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL
)"#,
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            "CREATE INDEX idx_alert_events_gate ON alert_events(domain_id, page_id, kind, created_at)",
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            r#"CREATE TABLE tickets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    alert_id INTEGER NOT NULL UNIQUE REFERENCES alert_events(id),
    status TEXT NOT NULL DEFAULT 'OPEN',
    title TEXT NOT NULL,
    created_at TEXT NOT NULL
)"#,
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            r#"CREATE TABLE cost_ledger (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    snapshot_id INTEGER NOT NULL REFERENCES snapshots(id),
    job_id INTEGER,
    stage TEXT NOT NULL,
    ms INTEGER NOT NULL DEFAULT 0,
    bytes INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
)"#,
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            r#"CREATE TABLE budget_usage (
    domain_id INTEGER NOT NULL REFERENCES domains(id),
    day TEXT NOT NULL,
    pages INTEGER NOT NULL DEFAULT 0,
    soft_alerted INTEGER NOT NULL DEFAULT 0,
    hard_alerted INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (domain_id, day)
)"#,
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            r#"CREATE TABLE domain_health_daily (
    domain_id INTEGER NOT NULL REFERENCES domains(id),
    day TEXT NOT NULL,
    fetches INTEGER NOT NULL DEFAULT 0,
    successes INTEGER NOT NULL DEFAULT 0,
    not_modified INTEGER NOT NULL DEFAULT 0,
    errors INTEGER NOT NULL DEFAULT 0,
    total_fetch_ms INTEGER NOT NULL DEFAULT 0,
    tier TEXT NOT NULL DEFAULT 'GOOD',
    PRIMARY KEY (domain_id, day)
)"#,
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            r#"CREATE TABLE job_kpis (
    job_id INTEGER PRIMARY KEY NOT NULL REFERENCES crawl_jobs(id),
    pages_saved INTEGER NOT NULL DEFAULT 0,
    avg_score REAL NOT NULL DEFAULT 0,
    issue_rate REAL NOT NULL DEFAULT 0,
    critical_rate REAL NOT NULL DEFAULT 0,
    not_modified_ratio REAL NOT NULL DEFAULT 0,
    avg_fetch_ms REAL NOT NULL DEFAULT 0,
    computed_at TEXT NOT NULL
)"#,
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            r#"CREATE TABLE lineage_edges (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    src_kind TEXT NOT NULL,
    src_id TEXT NOT NULL,
    dst_kind TEXT NOT NULL,
    dst_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (src_kind, src_id, dst_kind, dst_id)
)"#,
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            r#"CREATE TABLE link_edges (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    snapshot_id INTEGER NOT NULL REFERENCES snapshots(id),
    src_url_norm TEXT NOT NULL,
    dst_url_norm TEXT NOT NULL,
    kind TEXT NOT NULL,
    attr TEXT,
    created_at TEXT NOT NULL
)"#,
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            "CREATE INDEX idx_link_edges_dst ON link_edges(dst_url_norm, kind)",
        ))
}
