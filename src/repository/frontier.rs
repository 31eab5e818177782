//! Frontier queue repository.
//!
//! Items move `PENDING -> RUNNING -> DONE | FAILED`. Claiming is done in a
//! transaction so an item is handed out at most once. Transient failures
//! return an item to `PENDING` with a backoff until its retries run out, at
//! which point the item fails and its domain is put in cooldown.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Text};
use diesel_async::{AsyncConnection, RunQueryDsl};
use tracing::{debug, warn};

use super::pool::{DbError, DbPool};
use super::records::FrontierRecord;
use crate::config::CrawlPolicy;
use crate::models::{
    backoff_delay, CostTier, FrontierItem, FrontierStatus, HttpHints, RetryOutcome,
};
use crate::schema::{domains, frontier, pages};
use crate::utils::{db_timestamp, host_of, normalize_url};
use crate::with_conn;

const CLAIMABLE_SQL: &str = "\
    SELECT f.* FROM frontier f \
    LEFT JOIN domains d ON d.host = f.host \
    WHERE f.status = 'PENDING' \
      AND f.next_attempt_at <= ? \
      AND (d.cooldown_until IS NULL OR d.cooldown_until <= ?) \
    ORDER BY f.priority DESC, f.id ASC \
    LIMIT ?";

#[derive(Clone)]
pub struct FrontierRepository {
    pool: DbPool,
}

impl FrontierRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Queue a URL.
    ///
    /// A URL already queued keeps its row; a finished or failed one is
    /// re-queued with its retry count reset. Returns `None` for URLs without
    /// a host.
    pub async fn add(
        &self,
        url: &str,
        priority: i32,
        source: Option<&str>,
    ) -> Result<Option<i64>, DbError> {
        let url_norm = normalize_url(url);
        let Some(host) = host_of(&url_norm) else {
            warn!("Not queueing {}: no host", url);
            return Ok(None);
        };
        let now = db_timestamp(Utc::now());

        with_conn!(self.pool, conn => {
            diesel::insert_or_ignore_into(frontier::table)
                .values((
                    frontier::url.eq(url),
                    frontier::url_norm.eq(&url_norm),
                    frontier::host.eq(&host),
                    frontier::priority.eq(priority),
                    frontier::source.eq(source),
                    frontier::status.eq(FrontierStatus::Pending.as_str()),
                    frontier::retry_count.eq(0),
                    frontier::next_attempt_at.eq(&now),
                    frontier::created_at.eq(&now),
                    frontier::updated_at.eq(&now),
                ))
                .execute(&mut conn)
                .await?;

            let requeued = diesel::update(
                frontier::table
                    .filter(frontier::url_norm.eq(&url_norm))
                    .filter(frontier::status.eq_any([
                        FrontierStatus::Done.as_str(),
                        FrontierStatus::Failed.as_str(),
                    ])),
            )
            .set((
                frontier::status.eq(FrontierStatus::Pending.as_str()),
                frontier::retry_count.eq(0),
                frontier::last_error.eq(None::<String>),
                frontier::priority.eq(priority),
                frontier::next_attempt_at.eq(&now),
                frontier::updated_at.eq(&now),
            ))
            .execute(&mut conn)
            .await?;
            if requeued > 0 {
                debug!("Re-queued {}", url_norm);
            }

            frontier::table
                .filter(frontier::url_norm.eq(&url_norm))
                .select(frontier::id)
                .first::<i64>(&mut conn)
                .await
                .map(Some)
        })
    }

    /// Claim up to `limit` ready items.
    pub async fn next(&self, limit: i64) -> Result<Vec<FrontierItem>, DbError> {
        self.next_at(limit, Utc::now()).await
    }

    /// Claim up to `limit` items ready at `now`, marking them `RUNNING`.
    pub async fn next_at(
        &self,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<FrontierItem>, DbError> {
        let now = db_timestamp(now);

        let (records, hints) = with_conn!(self.pool, conn => {
            conn.transaction(|conn| {
                Box::pin(async move {
                    let records: Vec<FrontierRecord> = diesel::sql_query(CLAIMABLE_SQL)
                        .bind::<Text, _>(&now)
                        .bind::<Text, _>(&now)
                        .bind::<BigInt, _>(limit)
                        .load(conn)
                        .await?;

                    if records.is_empty() {
                        return Ok((records, HashMap::new()));
                    }

                    let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
                    diesel::update(frontier::table.filter(frontier::id.eq_any(ids)))
                        .set((
                            frontier::status.eq(FrontierStatus::Running.as_str()),
                            frontier::updated_at.eq(&now),
                        ))
                        .execute(conn)
                        .await?;

                    let norms: Vec<&str> = records.iter().map(|r| r.url_norm.as_str()).collect();
                    let cached: Vec<(String, Option<String>, Option<String>)> = pages::table
                        .filter(pages::url_norm.eq_any(norms))
                        .select((pages::url_norm, pages::etag, pages::last_modified))
                        .load(conn)
                        .await?;
                    let hints: HashMap<String, HttpHints> = cached
                        .into_iter()
                        .map(|(norm, etag, last_modified)| {
                            (norm, HttpHints { etag, last_modified })
                        })
                        .collect();

                    Ok::<_, DbError>((records, hints))
                })
            })
            .await?
        });

        Ok(records
            .into_iter()
            .map(|r| {
                let item_hints = hints.get(&r.url_norm).cloned().unwrap_or_default();
                let mut item = r.into_item(item_hints);
                item.status = FrontierStatus::Running;
                item
            })
            .collect())
    }

    /// Record a transient failure for a claimed item.
    pub async fn retry(
        &self,
        id: i64,
        error: &str,
        policy: &CrawlPolicy,
    ) -> Result<RetryOutcome, DbError> {
        self.retry_at(id, error, policy, Utc::now()).await
    }

    pub async fn retry_at(
        &self,
        id: i64,
        error: &str,
        policy: &CrawlPolicy,
        now: DateTime<Utc>,
    ) -> Result<RetryOutcome, DbError> {
        let stamp = db_timestamp(now);

        with_conn!(self.pool, conn => {
            conn.transaction(|conn| {
                Box::pin(async move {
                    let record: FrontierRecord = frontier::table
                        .find(id)
                        .select(FrontierRecord::as_select())
                        .first(conn)
                        .await?;
                    let retry_count = record.retry_count + 1;

                    if retry_count > policy.max_retries {
                        diesel::update(frontier::table.find(id))
                            .set((
                                frontier::status.eq(FrontierStatus::Failed.as_str()),
                                frontier::retry_count.eq(retry_count),
                                frontier::last_error.eq(Some(error)),
                                frontier::updated_at.eq(&stamp),
                            ))
                            .execute(conn)
                            .await?;

                        let until = db_timestamp(now + Duration::seconds(policy.cooldown_secs));
                        diesel::insert_or_ignore_into(domains::table)
                            .values((
                                domains::host.eq(&record.host),
                                domains::cost_tier.eq(CostTier::B.as_str()),
                                domains::ttl_hours.eq(policy.ttl_hours),
                                domains::daily_budget.eq(policy.daily_budget),
                                domains::first_seen.eq(&stamp),
                            ))
                            .execute(conn)
                            .await?;
                        diesel::update(domains::table.filter(domains::host.eq(&record.host)))
                            .set(domains::cooldown_until.eq(Some(&until)))
                            .execute(conn)
                            .await?;

                        warn!(
                            "{} failed after {} attempts; {} cooling down until {}",
                            record.url_norm, retry_count, record.host, until
                        );
                        return Ok(RetryOutcome::Failed);
                    }

                    let delay_secs = backoff_delay(&policy.backoff_secs, retry_count as u32);
                    let next_attempt =
                        db_timestamp(now + Duration::seconds(delay_secs as i64));
                    diesel::update(frontier::table.find(id))
                        .set((
                            frontier::status.eq(FrontierStatus::Pending.as_str()),
                            frontier::retry_count.eq(retry_count),
                            frontier::last_error.eq(Some(error)),
                            frontier::next_attempt_at.eq(&next_attempt),
                            frontier::updated_at.eq(&stamp),
                        ))
                        .execute(conn)
                        .await?;

                    debug!("{} retry {} in {}s", record.url_norm, retry_count, delay_secs);
                    Ok(RetryOutcome::Requeued { delay_secs })
                })
            })
            .await
        })
    }

    /// Put a claimed item back until `until` without spending a retry.
    pub async fn defer(&self, id: i64, until: DateTime<Utc>) -> Result<(), DbError> {
        let now = db_timestamp(Utc::now());
        let until = db_timestamp(until);
        with_conn!(self.pool, conn => {
            diesel::update(frontier::table.find(id))
                .set((
                    frontier::status.eq(FrontierStatus::Pending.as_str()),
                    frontier::next_attempt_at.eq(&until),
                    frontier::updated_at.eq(&now),
                ))
                .execute(&mut conn)
                .await?;
            Ok(())
        })
    }

    /// Mark a claimed item finished.
    pub async fn done(&self, id: i64) -> Result<(), DbError> {
        let now = db_timestamp(Utc::now());
        with_conn!(self.pool, conn => {
            diesel::update(frontier::table.find(id))
                .set((
                    frontier::status.eq(FrontierStatus::Done.as_str()),
                    frontier::updated_at.eq(&now),
                ))
                .execute(&mut conn)
                .await?;
            Ok(())
        })
    }

    /// Return items stuck in `RUNNING` for longer than `minutes` to `PENDING`.
    pub async fn recover_stale(&self, minutes: i64) -> Result<usize, DbError> {
        let now = Utc::now();
        let cutoff = db_timestamp(now - Duration::minutes(minutes));
        let now = db_timestamp(now);
        with_conn!(self.pool, conn => {
            diesel::update(
                frontier::table
                    .filter(frontier::status.eq(FrontierStatus::Running.as_str()))
                    .filter(frontier::updated_at.lt(&cutoff)),
            )
            .set((
                frontier::status.eq(FrontierStatus::Pending.as_str()),
                frontier::updated_at.eq(&now),
            ))
            .execute(&mut conn)
            .await
        })
    }

    pub async fn get(&self, id: i64) -> Result<Option<FrontierItem>, DbError> {
        with_conn!(self.pool, conn => {
            frontier::table
                .find(id)
                .select(FrontierRecord::as_select())
                .first::<FrontierRecord>(&mut conn)
                .await
                .optional()
                .map(|r| r.map(|r| r.into_item(HttpHints::default())))
        })
    }

    /// Item counts keyed by status.
    pub async fn counts(&self) -> Result<BTreeMap<String, i64>, DbError> {
        let rows: Vec<(String, i64)> = with_conn!(self.pool, conn => {
            frontier::table
                .group_by(frontier::status)
                .select((frontier::status, diesel::dsl::count_star()))
                .load(&mut conn)
                .await?
        });
        Ok(rows.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::DbContext;
    use tempfile::tempdir;

    async fn setup_test_db() -> (DbContext, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let ctx = DbContext::from_path(&dir.path().join("test.db"));
        ctx.init_db().await.unwrap();
        (ctx, dir)
    }

    #[tokio::test]
    async fn test_add_dedups_by_normalized_url() {
        let (ctx, _dir) = setup_test_db().await;
        let repo = ctx.frontier();

        let a = repo.add("https://Example.com/a/?utm_source=x", 0, None).await.unwrap();
        let b = repo.add("https://example.com/a", 5, Some("seed")).await.unwrap();
        assert!(a.is_some());
        assert_eq!(a, b);
        assert_eq!(repo.counts().await.unwrap().get("PENDING"), Some(&1));
        assert_eq!(repo.add("not a url", 0, None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_next_orders_by_priority_and_marks_running() {
        let (ctx, _dir) = setup_test_db().await;
        let repo = ctx.frontier();

        repo.add("https://example.com/low", 1, None).await.unwrap();
        repo.add("https://example.com/high", 9, None).await.unwrap();
        repo.add("https://example.com/mid", 5, None).await.unwrap();

        let items = repo.next(2).await.unwrap();
        let urls: Vec<_> = items.iter().map(|i| i.url_norm.as_str()).collect();
        assert_eq!(urls, ["https://example.com/high", "https://example.com/mid"]);
        assert!(items.iter().all(|i| i.status == FrontierStatus::Running));

        // Claimed items are not handed out twice.
        let rest = repo.next(10).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert!(repo.next(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retry_backoff_then_fail_with_cooldown() {
        let (ctx, _dir) = setup_test_db().await;
        let repo = ctx.frontier();
        let policy = CrawlPolicy::default();
        let id = repo.add("https://slow.test/page", 0, None).await.unwrap().unwrap();

        let mut now = Utc::now();
        for (attempt, expected) in [30u64, 120, 600].into_iter().enumerate() {
            let items = repo.next_at(1, now).await.unwrap();
            assert_eq!(items.len(), 1, "attempt {}", attempt + 1);
            let outcome = repo.retry_at(id, "timeout", &policy, now).await.unwrap();
            assert_eq!(outcome, RetryOutcome::Requeued { delay_secs: expected });

            let item = repo.get(id).await.unwrap().unwrap();
            assert_eq!(item.retry_count, attempt as i32 + 1);
            assert_eq!(item.status, FrontierStatus::Pending);

            // Not ready before the backoff elapses.
            assert!(repo.next_at(1, now).await.unwrap().is_empty());
            now += Duration::seconds(expected as i64);
        }

        repo.next_at(1, now).await.unwrap();
        let outcome = repo.retry_at(id, "timeout", &policy, now).await.unwrap();
        assert_eq!(outcome, RetryOutcome::Failed);
        let item = repo.get(id).await.unwrap().unwrap();
        assert_eq!(item.status, FrontierStatus::Failed);
        assert_eq!(item.retry_count, 4);

        let domain = ctx.domains().get_by_host("slow.test").await.unwrap().unwrap();
        assert!(domain.in_cooldown(now));

        // Other URLs on the cooled-down host are held back.
        repo.add("https://slow.test/other", 0, None).await.unwrap();
        assert!(repo.next_at(10, now).await.unwrap().is_empty());
        let later = now + Duration::seconds(policy.cooldown_secs + 1);
        assert_eq!(repo.next_at(10, later).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_readd_finished_url_requeues() {
        let (ctx, _dir) = setup_test_db().await;
        let repo = ctx.frontier();
        let id = repo.add("https://example.com/", 0, None).await.unwrap().unwrap();
        repo.next(1).await.unwrap();
        repo.done(id).await.unwrap();
        assert_eq!(repo.get(id).await.unwrap().unwrap().status, FrontierStatus::Done);

        assert_eq!(repo.add("https://example.com", 3, None).await.unwrap(), Some(id));
        let item = repo.get(id).await.unwrap().unwrap();
        assert_eq!(item.status, FrontierStatus::Pending);
        assert_eq!(item.retry_count, 0);
        assert_eq!(item.priority, 3);
    }

    #[tokio::test]
    async fn test_defer_keeps_retry_count() {
        let (ctx, _dir) = setup_test_db().await;
        let repo = ctx.frontier();
        let policy = CrawlPolicy::default();
        let id = repo.add("https://example.com/later", 0, None).await.unwrap().unwrap();

        let now = Utc::now();
        repo.next_at(1, now).await.unwrap();
        repo.retry_at(id, "timeout", &policy, now).await.unwrap();
        let ready = now + Duration::seconds(60);
        repo.next_at(1, ready).await.unwrap();

        let until = ready + Duration::hours(2);
        repo.defer(id, until).await.unwrap();
        let item = repo.get(id).await.unwrap().unwrap();
        assert_eq!(item.status, FrontierStatus::Pending);
        assert_eq!(item.retry_count, 1);
        assert_eq!(db_timestamp(item.next_attempt_at), db_timestamp(until));

        assert!(repo.next_at(1, until - Duration::seconds(1)).await.unwrap().is_empty());
        assert_eq!(repo.next_at(1, until).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_recover_stale() {
        let (ctx, _dir) = setup_test_db().await;
        let repo = ctx.frontier();
        repo.add("https://example.com/x", 0, None).await.unwrap();
        repo.next(1).await.unwrap();

        assert_eq!(repo.recover_stale(5).await.unwrap(), 0);
        assert_eq!(repo.recover_stale(-1).await.unwrap(), 1);
        assert_eq!(repo.counts().await.unwrap().get("PENDING"), Some(&1));
    }
}
