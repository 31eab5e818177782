//! Domain repository.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::pool::{DbError, DbPool};
use super::records::DomainRecord;
use crate::models::{CostTier, Domain};
use crate::schema::domains;
use crate::utils::{db_timestamp, now_timestamp};
use crate::with_conn;

/// Values a new domain row starts with.
#[derive(Debug, Clone, Copy)]
pub struct DomainDefaults {
    pub ttl_hours: i64,
    pub daily_budget: i64,
}

#[derive(Clone)]
pub struct DomainRepository {
    pool: DbPool,
}

impl DomainRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert the host if unseen, then return its row.
    pub async fn upsert(&self, host: &str, defaults: DomainDefaults) -> Result<Domain, DbError> {
        let now = now_timestamp();
        with_conn!(self.pool, conn => {
            diesel::insert_or_ignore_into(domains::table)
                .values((
                    domains::host.eq(host),
                    domains::cost_tier.eq(CostTier::B.as_str()),
                    domains::ttl_hours.eq(defaults.ttl_hours),
                    domains::daily_budget.eq(defaults.daily_budget),
                    domains::first_seen.eq(&now),
                ))
                .execute(&mut conn)
                .await?;

            domains::table
                .filter(domains::host.eq(host))
                .select(DomainRecord::as_select())
                .first::<DomainRecord>(&mut conn)
                .await
                .map(Domain::from)
        })
    }

    pub async fn get(&self, id: i64) -> Result<Option<Domain>, DbError> {
        with_conn!(self.pool, conn => {
            domains::table
                .find(id)
                .select(DomainRecord::as_select())
                .first::<DomainRecord>(&mut conn)
                .await
                .optional()
                .map(|r| r.map(Domain::from))
        })
    }

    pub async fn get_by_host(&self, host: &str) -> Result<Option<Domain>, DbError> {
        with_conn!(self.pool, conn => {
            domains::table
                .filter(domains::host.eq(host))
                .select(DomainRecord::as_select())
                .first::<DomainRecord>(&mut conn)
                .await
                .optional()
                .map(|r| r.map(Domain::from))
        })
    }

    pub async fn list(&self) -> Result<Vec<Domain>, DbError> {
        with_conn!(self.pool, conn => {
            domains::table
                .order(domains::host.asc())
                .select(DomainRecord::as_select())
                .load::<DomainRecord>(&mut conn)
                .await
                .map(|records| records.into_iter().map(Domain::from).collect())
        })
    }

    /// Pause crawling of a domain until `until`.
    pub async fn set_cooldown(&self, id: i64, until: DateTime<Utc>) -> Result<(), DbError> {
        let until = db_timestamp(until);
        with_conn!(self.pool, conn => {
            diesel::update(domains::table.find(id))
                .set(domains::cooldown_until.eq(Some(until)))
                .execute(&mut conn)
                .await?;
            Ok(())
        })
    }

    pub async fn touch_crawled(&self, id: i64, at: &str) -> Result<(), DbError> {
        with_conn!(self.pool, conn => {
            diesel::update(domains::table.find(id))
                .set(domains::last_crawled.eq(Some(at)))
                .execute(&mut conn)
                .await?;
            Ok(())
        })
    }

    pub async fn set_cost_tier(&self, id: i64, tier: CostTier) -> Result<(), DbError> {
        with_conn!(self.pool, conn => {
            diesel::update(domains::table.find(id))
                .set(domains::cost_tier.eq(tier.as_str()))
                .execute(&mut conn)
                .await?;
            Ok(())
        })
    }
}
