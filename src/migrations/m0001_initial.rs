use cetane::prelude::*;

pub fn migration() -> Migration {
    Migration::new("0001_initial_schema")
        .operation(RunSql::portable().for_backend(
            "sqlite",
            r#"CREATE TABLE domains (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    host TEXT NOT NULL UNIQUE,
    cost_tier TEXT NOT NULL DEFAULT 'B',
    ttl_hours INTEGER NOT NULL DEFAULT 24,
    daily_budget INTEGER NOT NULL DEFAULT 500,
    cooldown_until TEXT,
    first_seen TEXT NOT NULL,
    last_crawled TEXT
)"#,
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            r#"CREATE TABLE pages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url_norm TEXT NOT NULL UNIQUE,
    url TEXT NOT NULL,
    domain_id INTEGER NOT NULL REFERENCES domains(id),
    segment TEXT,
    etag TEXT,
    last_modified TEXT,
    last_status INTEGER,
    last_fetched TEXT,
    last_snapshot_id INTEGER,
    created_at TEXT NOT NULL
)"#,
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            "CREATE INDEX idx_pages_domain ON pages(domain_id)",
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            r#"CREATE TABLE snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    page_id INTEGER NOT NULL REFERENCES pages(id),
    job_id INTEGER,
    fetched_at TEXT NOT NULL,
    status_code INTEGER NOT NULL,
    final_url TEXT NOT NULL,
    redirect_chain TEXT NOT NULL DEFAULT '[]',
    title TEXT,
    meta_description TEXT,
    canonical TEXT,
    robots_meta TEXT,
    lang TEXT,
    h1_count INTEGER NOT NULL DEFAULT 0,
    h2_count INTEGER NOT NULL DEFAULT 0,
    word_count INTEGER NOT NULL DEFAULT 0,
    internal_links INTEGER NOT NULL DEFAULT 0,
    external_links INTEGER NOT NULL DEFAULT 0,
    images_count INTEGER NOT NULL DEFAULT 0,
    alt_coverage_pct REAL NOT NULL DEFAULT 0,
    broken_jsonld INTEGER NOT NULL DEFAULT 0,
    sha256_text TEXT,
    sha256_dom TEXT,
    content_hash TEXT NOT NULL,
    issues_sha256 TEXT NOT NULL,
    score INTEGER NOT NULL,
    gate_code TEXT,
    fetch_ms INTEGER NOT NULL DEFAULT 0,
    parse_ms INTEGER NOT NULL DEFAULT 0,
    audit_ms INTEGER NOT NULL DEFAULT 0,
    fingerprint TEXT NOT NULL DEFAULT '{}',
    analysis TEXT
)"#,
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            "CREATE INDEX idx_snapshots_page ON snapshots(page_id, fetched_at)",
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            "CREATE INDEX idx_snapshots_job ON snapshots(job_id)",
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            r#"CREATE TABLE issues (
    code TEXT PRIMARY KEY NOT NULL,
    severity TEXT NOT NULL,
    penalty INTEGER NOT NULL,
    description TEXT NOT NULL
)"#,
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            r#"INSERT INTO issues (code, severity, penalty, description) VALUES
    ('TITLE_MISSING', 'CRITICAL', 40, 'Page has no <title>'),
    ('NO_H1', 'CRITICAL', 20, 'Page has no <h1> heading'),
    ('NOINDEX', 'CRITICAL', 30, 'Robots meta tag excludes the page from indexing'),
    ('MULTIPLE_H1', 'WARNING', 10, 'Page has more than one <h1> heading'),
    ('CANONICAL_MISSING', 'WARNING', 15, 'Page declares no canonical URL'),
    ('BROKEN_JSONLD', 'WARNING', 10, 'A JSON-LD block is empty or invalid'),
    ('TITLE_TOO_LONG', 'NOTICE', 5, 'Title is longer than 60 characters'),
    ('HREFLANG_INCONSISTENT', 'NOTICE', 5, 'hreflang alternates do not reference the page itself'),
    ('LOW_ALT_COVERAGE', 'NOTICE', 5, 'Fewer than half of the images have alt text'),
    ('REDIRECT_CHAIN_LONG', 'NOTICE', 5, 'More than two redirects before the final URL'),
    ('HTTP_ERROR', 'CRITICAL', 100, 'Server answered with an error status'),
    ('NOT_HTML', 'CRITICAL', 100, 'Response is not an HTML document'),
    ('HTML_TOO_SMALL', 'CRITICAL', 100, 'HTML body is too small to audit')"#,
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            r#"CREATE TABLE snapshot_issues (
    snapshot_id INTEGER NOT NULL REFERENCES snapshots(id),
    code TEXT NOT NULL REFERENCES issues(code),
    PRIMARY KEY (snapshot_id, code)
)"#,
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            r#"CREATE TABLE crawl_jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    seed TEXT,
    mode TEXT NOT NULL,
    settings TEXT NOT NULL DEFAULT '{}',
    status TEXT NOT NULL DEFAULT 'RUNNING',
    metrics TEXT,
    pages_spent INTEGER NOT NULL DEFAULT 0,
    started_at TEXT NOT NULL,
    finished_at TEXT
)"#,
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            r#"CREATE TABLE frontier (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    url_norm TEXT NOT NULL UNIQUE,
    host TEXT NOT NULL,
    priority INTEGER NOT NULL DEFAULT 0,
    source TEXT,
    status TEXT NOT NULL DEFAULT 'PENDING',
    retry_count INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    next_attempt_at TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)"#,
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            "CREATE INDEX idx_frontier_ready ON frontier(status, next_attempt_at, priority)",
        ))
}
