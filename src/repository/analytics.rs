//! Derived analytics tables written after each snapshot.
//!
//! Content clusters, alerts and tickets, the cost ledger, daily budget and
//! health counters, lineage and link edges.

use std::collections::HashMap;

use diesel::prelude::*;
use diesel::sql_types::{BigInt, Text};
use diesel_async::{AsyncConnection, RunQueryDsl};

use super::pool::{DbError, DbPool};
use super::records::{AlertRecord, DomainHealthRecord};
use super::util::{to_json_text, LastInsertRowId};
use crate::models::{Alert, AlertKind, DomainHealth, HealthTier, NewAlert};
use crate::schema::{
    alert_events, budget_usage, cluster_members, content_clusters, cost_ledger, domain_health_daily,
    domains, lineage_edges, link_edges, tickets,
};
use crate::with_conn;

/// A page's membership in a duplicate-content cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterMembership {
    pub cluster_id: i64,
    pub member_count: i64,
    /// The page joined the cluster on this call.
    pub joined: bool,
}

/// Per-domain page counter for one UTC day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Queryable)]
pub struct BudgetUsage {
    pub pages: i64,
    pub soft_alerted: bool,
    pub hard_alerted: bool,
}

/// One fetch observation fed into the daily health counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthSample {
    pub fetch_ms: i64,
    pub success: bool,
    pub not_modified: bool,
    pub error: bool,
}

/// Cost of one processing stage for a snapshot.
#[derive(Debug, Clone, Copy)]
pub struct CostEntry {
    pub stage: &'static str,
    pub ms: i64,
    pub bytes: i64,
}

/// A directed reference found on a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEdge {
    pub dst_url_norm: String,
    pub kind: &'static str,
    pub attr: Option<String>,
}

/// A provenance edge between two records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineageEdge {
    pub src_kind: &'static str,
    pub src_id: String,
    pub dst_kind: &'static str,
    pub dst_id: String,
}

impl LineageEdge {
    pub fn new(
        src_kind: &'static str,
        src_id: impl ToString,
        dst_kind: &'static str,
        dst_id: impl ToString,
    ) -> Self {
        Self {
            src_kind,
            src_id: src_id.to_string(),
            dst_kind,
            dst_id: dst_id.to_string(),
        }
    }
}

const BUDGET_INCREMENT_SQL: &str = "\
    INSERT INTO budget_usage (domain_id, day, pages) VALUES (?, ?, 1) \
    ON CONFLICT(domain_id, day) DO UPDATE SET pages = pages + 1";

const HEALTH_UPSERT_SQL: &str = "\
    INSERT INTO domain_health_daily \
        (domain_id, day, fetches, successes, not_modified, errors, total_fetch_ms) \
    VALUES (?, ?, 1, ?, ?, ?, ?) \
    ON CONFLICT(domain_id, day) DO UPDATE SET \
        fetches = fetches + 1, \
        successes = successes + excluded.successes, \
        not_modified = not_modified + excluded.not_modified, \
        errors = errors + excluded.errors, \
        total_fetch_ms = total_fetch_ms + excluded.total_fetch_ms";

#[derive(Clone)]
pub struct AnalyticsRepository {
    pool: DbPool,
}

impl AnalyticsRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    // ---------------------------------------------------------------------
    // Content clusters
    // ---------------------------------------------------------------------

    /// Add a page to the cluster for its visible-text hash, creating the
    /// cluster on first sight.
    pub async fn join_cluster(
        &self,
        sha256_text: &str,
        page_id: i64,
        snapshot_id: i64,
        now: &str,
    ) -> Result<ClusterMembership, DbError> {
        with_conn!(self.pool, conn => {
            conn.transaction(|conn| {
                Box::pin(async move {
                    diesel::insert_or_ignore_into(content_clusters::table)
                        .values((
                            content_clusters::sha256_text.eq(sha256_text),
                            content_clusters::first_page_id.eq(page_id),
                            content_clusters::member_count.eq(0i64),
                            content_clusters::created_at.eq(now),
                            content_clusters::updated_at.eq(now),
                        ))
                        .execute(conn)
                        .await?;

                    let cluster_id: i64 = content_clusters::table
                        .filter(content_clusters::sha256_text.eq(sha256_text))
                        .select(content_clusters::id)
                        .first(conn)
                        .await?;

                    let inserted = diesel::insert_or_ignore_into(cluster_members::table)
                        .values((
                            cluster_members::cluster_id.eq(cluster_id),
                            cluster_members::page_id.eq(page_id),
                            cluster_members::snapshot_id.eq(snapshot_id),
                            cluster_members::joined_at.eq(now),
                        ))
                        .execute(conn)
                        .await?;

                    if inserted > 0 {
                        diesel::update(content_clusters::table.find(cluster_id))
                            .set((
                                content_clusters::member_count
                                    .eq(content_clusters::member_count + 1),
                                content_clusters::updated_at.eq(now),
                            ))
                            .execute(conn)
                            .await?;
                    }

                    let member_count: i64 = content_clusters::table
                        .find(cluster_id)
                        .select(content_clusters::member_count)
                        .first(conn)
                        .await?;

                    Ok(ClusterMembership {
                        cluster_id,
                        member_count,
                        joined: inserted > 0,
                    })
                })
            })
            .await
        })
    }

    // ---------------------------------------------------------------------
    // Alerts and tickets
    // ---------------------------------------------------------------------

    /// Timestamp of the latest alert of `kind` for a domain and page.
    /// `page_id = None` matches domain-level alerts only.
    pub async fn last_alert_at(
        &self,
        domain_id: i64,
        page_id: Option<i64>,
        kind: AlertKind,
    ) -> Result<Option<String>, DbError> {
        with_conn!(self.pool, conn => {
            let mut query = alert_events::table
                .filter(alert_events::domain_id.eq(domain_id))
                .filter(alert_events::kind.eq(kind.as_str()))
                .select(alert_events::created_at)
                .order(alert_events::created_at.desc())
                .into_boxed();
            query = match page_id {
                Some(pid) => query.filter(alert_events::page_id.eq(pid)),
                None => query.filter(alert_events::page_id.is_null()),
            };
            query.first::<String>(&mut conn).await.optional()
        })
    }

    pub async fn insert_alert(&self, alert: &NewAlert, now: &str) -> Result<i64, DbError> {
        let details = to_json_text(&alert.details)?;
        with_conn!(self.pool, conn => {
            diesel::insert_into(alert_events::table)
                .values((
                    alert_events::kind.eq(alert.kind.as_str()),
                    alert_events::severity.eq(alert.severity.as_str()),
                    alert_events::domain_id.eq(alert.domain_id),
                    alert_events::page_id.eq(alert.page_id),
                    alert_events::snapshot_id.eq(alert.snapshot_id),
                    alert_events::message.eq(&alert.message),
                    alert_events::details.eq(&details),
                    alert_events::created_at.eq(now),
                ))
                .execute(&mut conn)
                .await?;
            let row: LastInsertRowId = diesel::sql_query("SELECT last_insert_rowid()")
                .get_result(&mut conn)
                .await?;
            Ok(row.id)
        })
    }

    /// Open a ticket for an alert. At most one ticket exists per alert.
    pub async fn open_ticket(&self, alert_id: i64, title: &str, now: &str) -> Result<i64, DbError> {
        with_conn!(self.pool, conn => {
            diesel::insert_or_ignore_into(tickets::table)
                .values((
                    tickets::alert_id.eq(alert_id),
                    tickets::status.eq("OPEN"),
                    tickets::title.eq(title),
                    tickets::created_at.eq(now),
                ))
                .execute(&mut conn)
                .await?;
            tickets::table
                .filter(tickets::alert_id.eq(alert_id))
                .select(tickets::id)
                .first::<i64>(&mut conn)
                .await
        })
    }

    /// Most recent alerts first, with their ticket ids.
    pub async fn recent_alerts(&self, limit: i64) -> Result<Vec<Alert>, DbError> {
        with_conn!(self.pool, conn => {
            let records: Vec<AlertRecord> = alert_events::table
                .order(alert_events::id.desc())
                .limit(limit)
                .select(AlertRecord::as_select())
                .load(&mut conn)
                .await?;

            let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
            let ticket_rows: Vec<(i64, i64)> = tickets::table
                .filter(tickets::alert_id.eq_any(ids))
                .select((tickets::alert_id, tickets::id))
                .load(&mut conn)
                .await?;
            let by_alert: HashMap<i64, i64> = ticket_rows.into_iter().collect();

            Ok(records
                .into_iter()
                .map(|r| {
                    let ticket = by_alert.get(&r.id).copied();
                    r.into_alert(ticket)
                })
                .collect())
        })
    }

    pub async fn alerts_for_page(&self, page_id: i64) -> Result<Vec<Alert>, DbError> {
        with_conn!(self.pool, conn => {
            alert_events::table
                .filter(alert_events::page_id.eq(page_id))
                .order(alert_events::id.asc())
                .select(AlertRecord::as_select())
                .load::<AlertRecord>(&mut conn)
                .await
                .map(|records| records.into_iter().map(|r| r.into_alert(None)).collect())
        })
    }

    pub async fn ticket_count(&self) -> Result<i64, DbError> {
        with_conn!(self.pool, conn => {
            tickets::table.count().get_result::<i64>(&mut conn).await
        })
    }

    // ---------------------------------------------------------------------
    // Cost ledger
    // ---------------------------------------------------------------------

    pub async fn record_costs(
        &self,
        snapshot_id: i64,
        job_id: Option<i64>,
        entries: &[CostEntry],
        now: &str,
    ) -> Result<(), DbError> {
        with_conn!(self.pool, conn => {
            for entry in entries {
                diesel::insert_into(cost_ledger::table)
                    .values((
                        cost_ledger::snapshot_id.eq(snapshot_id),
                        cost_ledger::job_id.eq(job_id),
                        cost_ledger::stage.eq(entry.stage),
                        cost_ledger::ms.eq(entry.ms),
                        cost_ledger::bytes.eq(entry.bytes),
                        cost_ledger::created_at.eq(now),
                    ))
                    .execute(&mut conn)
                    .await?;
            }
            Ok(())
        })
    }

    /// Total ms per stage recorded for a snapshot.
    pub async fn costs_for_snapshot(&self, snapshot_id: i64) -> Result<Vec<(String, i64)>, DbError> {
        with_conn!(self.pool, conn => {
            cost_ledger::table
                .filter(cost_ledger::snapshot_id.eq(snapshot_id))
                .order(cost_ledger::id.asc())
                .select((cost_ledger::stage, cost_ledger::ms))
                .load(&mut conn)
                .await
        })
    }

    // ---------------------------------------------------------------------
    // Budget
    // ---------------------------------------------------------------------

    /// Count one page against a domain's budget for `day`.
    pub async fn increment_budget(&self, domain_id: i64, day: &str) -> Result<BudgetUsage, DbError> {
        with_conn!(self.pool, conn => {
            diesel::sql_query(BUDGET_INCREMENT_SQL)
                .bind::<BigInt, _>(domain_id)
                .bind::<Text, _>(day)
                .execute(&mut conn)
                .await?;
            budget_usage::table
                .find((domain_id, day))
                .select((
                    budget_usage::pages,
                    budget_usage::soft_alerted,
                    budget_usage::hard_alerted,
                ))
                .first::<BudgetUsage>(&mut conn)
                .await
        })
    }

    pub async fn mark_budget_alerted(
        &self,
        domain_id: i64,
        day: &str,
        hard: bool,
    ) -> Result<(), DbError> {
        with_conn!(self.pool, conn => {
            let target = budget_usage::table.find((domain_id, day));
            if hard {
                diesel::update(target)
                    .set(budget_usage::hard_alerted.eq(true))
                    .execute(&mut conn)
                    .await?;
            } else {
                diesel::update(target)
                    .set(budget_usage::soft_alerted.eq(true))
                    .execute(&mut conn)
                    .await?;
            }
            Ok(())
        })
    }

    // ---------------------------------------------------------------------
    // Domain health
    // ---------------------------------------------------------------------

    /// Fold one fetch into the day's counters and re-derive the tier.
    pub async fn record_health(
        &self,
        domain_id: i64,
        day: &str,
        sample: HealthSample,
    ) -> Result<DomainHealth, DbError> {
        with_conn!(self.pool, conn => {
            diesel::sql_query(HEALTH_UPSERT_SQL)
                .bind::<BigInt, _>(domain_id)
                .bind::<Text, _>(day)
                .bind::<BigInt, _>(sample.success as i64)
                .bind::<BigInt, _>(sample.not_modified as i64)
                .bind::<BigInt, _>(sample.error as i64)
                .bind::<BigInt, _>(sample.fetch_ms.max(0))
                .execute(&mut conn)
                .await?;

            let mut record: DomainHealthRecord = domain_health_daily::table
                .find((domain_id, day))
                .select(DomainHealthRecord::as_select())
                .first(&mut conn)
                .await?;

            let tier =
                HealthTier::classify(record.fetches, record.successes, record.total_fetch_ms);
            if tier.as_str() != record.tier {
                diesel::update(domain_health_daily::table.find((domain_id, day)))
                    .set(domain_health_daily::tier.eq(tier.as_str()))
                    .execute(&mut conn)
                    .await?;
                record.tier = tier.as_str().to_string();
            }

            let host: String = domains::table
                .find(domain_id)
                .select(domains::host)
                .first(&mut conn)
                .await?;
            Ok(record.into_health(host))
        })
    }

    /// Average fetch time across every recorded day for a domain.
    pub async fn avg_fetch_ms(&self, domain_id: i64) -> Result<Option<f64>, DbError> {
        let rows: Vec<(i64, i64)> = with_conn!(self.pool, conn => {
            domain_health_daily::table
                .filter(domain_health_daily::domain_id.eq(domain_id))
                .select((domain_health_daily::fetches, domain_health_daily::total_fetch_ms))
                .load(&mut conn)
                .await?
        });
        let (fetches, total) = rows
            .into_iter()
            .fold((0i64, 0i64), |(f, t), (rf, rt)| (f + rf, t + rt));
        Ok((fetches > 0).then(|| total as f64 / fetches as f64))
    }

    /// Health rows for one day, joined with their hosts.
    pub async fn health_for_day(&self, day: &str) -> Result<Vec<DomainHealth>, DbError> {
        with_conn!(self.pool, conn => {
            let rows: Vec<(DomainHealthRecord, String)> = domain_health_daily::table
                .inner_join(domains::table.on(domains::id.eq(domain_health_daily::domain_id)))
                .filter(domain_health_daily::day.eq(day))
                .order(domains::host.asc())
                .select((DomainHealthRecord::as_select(), domains::host))
                .load(&mut conn)
                .await?;
            Ok(rows
                .into_iter()
                .map(|(record, host)| record.into_health(host))
                .collect())
        })
    }

    // ---------------------------------------------------------------------
    // Edges
    // ---------------------------------------------------------------------

    pub async fn add_lineage(&self, edges: &[LineageEdge], now: &str) -> Result<(), DbError> {
        with_conn!(self.pool, conn => {
            for edge in edges {
                diesel::insert_or_ignore_into(lineage_edges::table)
                    .values((
                        lineage_edges::src_kind.eq(edge.src_kind),
                        lineage_edges::src_id.eq(&edge.src_id),
                        lineage_edges::dst_kind.eq(edge.dst_kind),
                        lineage_edges::dst_id.eq(&edge.dst_id),
                        lineage_edges::created_at.eq(now),
                    ))
                    .execute(&mut conn)
                    .await?;
            }
            Ok(())
        })
    }

    /// Lineage edges leaving a record.
    pub async fn lineage_from(
        &self,
        src_kind: &str,
        src_id: &str,
    ) -> Result<Vec<LineageEdge>, DbError> {
        let rows: Vec<(String, String)> = with_conn!(self.pool, conn => {
            lineage_edges::table
                .filter(lineage_edges::src_kind.eq(src_kind))
                .filter(lineage_edges::src_id.eq(src_id))
                .order(lineage_edges::id.asc())
                .select((lineage_edges::dst_kind, lineage_edges::dst_id))
                .load(&mut conn)
                .await?
        });
        let src_kind = lineage_kind(src_kind);
        Ok(rows
            .into_iter()
            .map(|(dst_kind, dst_id)| LineageEdge {
                src_kind,
                src_id: src_id.to_string(),
                dst_kind: lineage_kind(&dst_kind),
                dst_id,
            })
            .collect())
    }

    pub async fn add_link_edges(
        &self,
        snapshot_id: i64,
        src_url_norm: &str,
        edges: &[LinkEdge],
        now: &str,
    ) -> Result<(), DbError> {
        if edges.is_empty() {
            return Ok(());
        }
        with_conn!(self.pool, conn => {
            conn.transaction(|conn| {
                Box::pin(async move {
                    for edge in edges {
                        diesel::insert_into(link_edges::table)
                            .values((
                                link_edges::snapshot_id.eq(snapshot_id),
                                link_edges::src_url_norm.eq(src_url_norm),
                                link_edges::dst_url_norm.eq(&edge.dst_url_norm),
                                link_edges::kind.eq(edge.kind),
                                link_edges::attr.eq(edge.attr.as_deref()),
                                link_edges::created_at.eq(now),
                            ))
                            .execute(conn)
                            .await?;
                    }
                    Ok(())
                })
            })
            .await
        })
    }

    pub async fn link_edges_for_snapshot(&self, snapshot_id: i64) -> Result<Vec<LinkEdge>, DbError> {
        let rows: Vec<(String, String, Option<String>)> = with_conn!(self.pool, conn => {
            link_edges::table
                .filter(link_edges::snapshot_id.eq(snapshot_id))
                .order(link_edges::id.asc())
                .select((link_edges::dst_url_norm, link_edges::kind, link_edges::attr))
                .load(&mut conn)
                .await?
        });
        Ok(rows
            .into_iter()
            .map(|(dst_url_norm, kind, attr)| LinkEdge {
                dst_url_norm,
                kind: link_kind(&kind),
                attr,
            })
            .collect())
    }
}

/// Kinds of records lineage edges connect.
pub mod lineage {
    pub const CRAWL: &str = "CRAWL";
    pub const SNAPSHOT: &str = "SNAPSHOT";
    pub const ISSUE: &str = "ISSUE";
    pub const ALERT: &str = "ALERT";
    pub const KPI: &str = "KPI";
}

/// Kinds of link edges.
pub mod link {
    pub const INTERNAL: &str = "INTERNAL";
    pub const EXTERNAL: &str = "EXTERNAL";
    pub const CANONICAL: &str = "CANONICAL";
    pub const HREFLANG: &str = "HREFLANG";
}

fn lineage_kind(s: &str) -> &'static str {
    use lineage::*;
    [CRAWL, SNAPSHOT, ISSUE, ALERT, KPI]
        .into_iter()
        .find(|k| *k == s)
        .unwrap_or("UNKNOWN")
}

fn link_kind(s: &str) -> &'static str {
    use link::*;
    [INTERNAL, EXTERNAL, CANONICAL, HREFLANG]
        .into_iter()
        .find(|k| *k == s)
        .unwrap_or("UNKNOWN")
}
