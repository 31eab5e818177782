// Kept in sync by hand with src/migrations.

diesel::table! {
    domains (id) {
        id -> BigInt,
        host -> Text,
        cost_tier -> Text,
        ttl_hours -> BigInt,
        daily_budget -> BigInt,
        cooldown_until -> Nullable<Text>,
        first_seen -> Text,
        last_crawled -> Nullable<Text>,
    }
}

diesel::table! {
    pages (id) {
        id -> BigInt,
        url_norm -> Text,
        url -> Text,
        domain_id -> BigInt,
        segment -> Nullable<Text>,
        etag -> Nullable<Text>,
        last_modified -> Nullable<Text>,
        last_status -> Nullable<Integer>,
        last_fetched -> Nullable<Text>,
        last_snapshot_id -> Nullable<BigInt>,
        created_at -> Text,
    }
}

diesel::table! {
    snapshots (id) {
        id -> BigInt,
        page_id -> BigInt,
        job_id -> Nullable<BigInt>,
        fetched_at -> Text,
        status_code -> Integer,
        final_url -> Text,
        redirect_chain -> Text,
        title -> Nullable<Text>,
        meta_description -> Nullable<Text>,
        canonical -> Nullable<Text>,
        robots_meta -> Nullable<Text>,
        lang -> Nullable<Text>,
        h1_count -> Integer,
        h2_count -> Integer,
        word_count -> BigInt,
        internal_links -> Integer,
        external_links -> Integer,
        images_count -> Integer,
        alt_coverage_pct -> Double,
        broken_jsonld -> Bool,
        sha256_text -> Nullable<Text>,
        sha256_dom -> Nullable<Text>,
        content_hash -> Text,
        issues_sha256 -> Text,
        score -> Integer,
        gate_code -> Nullable<Text>,
        fetch_ms -> BigInt,
        parse_ms -> BigInt,
        audit_ms -> BigInt,
        fingerprint -> Text,
        analysis -> Nullable<Text>,
    }
}

diesel::table! {
    issues (code) {
        code -> Text,
        severity -> Text,
        penalty -> Integer,
        description -> Text,
    }
}

diesel::table! {
    snapshot_issues (snapshot_id, code) {
        snapshot_id -> BigInt,
        code -> Text,
    }
}

diesel::table! {
    crawl_jobs (id) {
        id -> BigInt,
        seed -> Nullable<Text>,
        mode -> Text,
        settings -> Text,
        status -> Text,
        metrics -> Nullable<Text>,
        pages_spent -> BigInt,
        started_at -> Text,
        finished_at -> Nullable<Text>,
    }
}

diesel::table! {
    frontier (id) {
        id -> BigInt,
        url -> Text,
        url_norm -> Text,
        host -> Text,
        priority -> Integer,
        source -> Nullable<Text>,
        status -> Text,
        retry_count -> Integer,
        last_error -> Nullable<Text>,
        next_attempt_at -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    content_clusters (id) {
        id -> BigInt,
        sha256_text -> Text,
        first_page_id -> BigInt,
        member_count -> BigInt,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    cluster_members (cluster_id, page_id) {
        cluster_id -> BigInt,
        page_id -> BigInt,
        snapshot_id -> BigInt,
        joined_at -> Text,
    }
}

diesel::table! {
    alert_events (id) {
        id -> BigInt,
        kind -> Text,
        severity -> Text,
        domain_id -> BigInt,
        page_id -> Nullable<BigInt>,
        snapshot_id -> Nullable<BigInt>,
        message -> Text,
        details -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    tickets (id) {
        id -> BigInt,
        alert_id -> BigInt,
        status -> Text,
        title -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    cost_ledger (id) {
        id -> BigInt,
        snapshot_id -> BigInt,
        job_id -> Nullable<BigInt>,
        stage -> Text,
        ms -> BigInt,
        bytes -> BigInt,
        created_at -> Text,
    }
}

diesel::table! {
    budget_usage (domain_id, day) {
        domain_id -> BigInt,
        day -> Text,
        pages -> BigInt,
        soft_alerted -> Bool,
        hard_alerted -> Bool,
    }
}

diesel::table! {
    domain_health_daily (domain_id, day) {
        domain_id -> BigInt,
        day -> Text,
        fetches -> BigInt,
        successes -> BigInt,
        not_modified -> BigInt,
        errors -> BigInt,
        total_fetch_ms -> BigInt,
        tier -> Text,
    }
}

diesel::table! {
    job_kpis (job_id) {
        job_id -> BigInt,
        pages_saved -> BigInt,
        avg_score -> Double,
        issue_rate -> Double,
        critical_rate -> Double,
        not_modified_ratio -> Double,
        avg_fetch_ms -> Double,
        computed_at -> Text,
    }
}

diesel::table! {
    lineage_edges (id) {
        id -> BigInt,
        src_kind -> Text,
        src_id -> Text,
        dst_kind -> Text,
        dst_id -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    link_edges (id) {
        id -> BigInt,
        snapshot_id -> BigInt,
        src_url_norm -> Text,
        dst_url_norm -> Text,
        kind -> Text,
        attr -> Nullable<Text>,
        created_at -> Text,
    }
}

diesel::joinable!(pages -> domains (domain_id));
diesel::joinable!(snapshots -> pages (page_id));
diesel::joinable!(snapshot_issues -> snapshots (snapshot_id));
diesel::joinable!(snapshot_issues -> issues (code));
diesel::joinable!(cluster_members -> content_clusters (cluster_id));
diesel::joinable!(alert_events -> domains (domain_id));
diesel::joinable!(tickets -> alert_events (alert_id));
diesel::joinable!(job_kpis -> crawl_jobs (job_id));

diesel::allow_tables_to_appear_in_same_query!(
    alert_events,
    budget_usage,
    cluster_members,
    content_clusters,
    cost_ledger,
    crawl_jobs,
    domain_health_daily,
    domains,
    frontier,
    issues,
    job_kpis,
    lineage_edges,
    link_edges,
    pages,
    snapshot_issues,
    snapshots,
    tickets,
);
