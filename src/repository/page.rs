//! Page repository.

use diesel::prelude::*;
use diesel::sql_types::{BigInt, Integer, Nullable, Text};
use diesel_async::RunQueryDsl;

use super::pool::{DbError, DbPool};
use super::records::PageRecord;
use crate::models::{HttpHints, Page, Segment};
use crate::schema::pages;
use crate::utils::now_timestamp;
use crate::with_conn;

/// Conditional-fetch cache values recorded after each fetch.
#[derive(Debug, Clone, Copy)]
pub struct FetchCacheUpdate<'a> {
    pub etag: Option<&'a str>,
    pub last_modified: Option<&'a str>,
    pub status: i32,
    pub fetched_at: &'a str,
}

#[derive(Clone)]
pub struct PageRepository {
    pool: DbPool,
}

impl PageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert the page if its normalized URL is unseen, then return its row.
    pub async fn upsert(&self, url: &str, url_norm: &str, domain_id: i64) -> Result<Page, DbError> {
        let now = now_timestamp();
        with_conn!(self.pool, conn => {
            diesel::insert_or_ignore_into(pages::table)
                .values((
                    pages::url_norm.eq(url_norm),
                    pages::url.eq(url),
                    pages::domain_id.eq(domain_id),
                    pages::created_at.eq(&now),
                ))
                .execute(&mut conn)
                .await?;

            pages::table
                .filter(pages::url_norm.eq(url_norm))
                .select(PageRecord::as_select())
                .first::<PageRecord>(&mut conn)
                .await
                .map(Page::from)
        })
    }

    pub async fn get(&self, id: i64) -> Result<Option<Page>, DbError> {
        with_conn!(self.pool, conn => {
            pages::table
                .find(id)
                .select(PageRecord::as_select())
                .first::<PageRecord>(&mut conn)
                .await
                .optional()
                .map(|r| r.map(Page::from))
        })
    }

    pub async fn get_by_url_norm(&self, url_norm: &str) -> Result<Option<Page>, DbError> {
        with_conn!(self.pool, conn => {
            pages::table
                .filter(pages::url_norm.eq(url_norm))
                .select(PageRecord::as_select())
                .first::<PageRecord>(&mut conn)
                .await
                .optional()
                .map(|r| r.map(Page::from))
        })
    }

    /// Cached validators for a URL; empty if the page was never fetched.
    pub async fn hints_for(&self, url_norm: &str) -> Result<HttpHints, DbError> {
        Ok(self
            .get_by_url_norm(url_norm)
            .await?
            .map(|p| p.hints)
            .unwrap_or_default())
    }

    /// Record the outcome of a fetch. Validators the server did not resend
    /// are kept.
    pub async fn update_fetch_cache(
        &self,
        page_id: i64,
        update: FetchCacheUpdate<'_>,
    ) -> Result<(), DbError> {
        with_conn!(self.pool, conn => {
            diesel::sql_query(
                "UPDATE pages SET etag = COALESCE(?, etag), \
                 last_modified = COALESCE(?, last_modified), \
                 last_status = ?, last_fetched = ? WHERE id = ?",
            )
            .bind::<Nullable<Text>, _>(update.etag)
            .bind::<Nullable<Text>, _>(update.last_modified)
            .bind::<Integer, _>(update.status)
            .bind::<Text, _>(update.fetched_at)
            .bind::<BigInt, _>(page_id)
            .execute(&mut conn)
            .await?;
            Ok(())
        })
    }

    pub async fn set_segment(&self, page_id: i64, segment: Segment) -> Result<(), DbError> {
        with_conn!(self.pool, conn => {
            diesel::update(pages::table.find(page_id))
                .set(pages::segment.eq(Some(segment.as_str())))
                .execute(&mut conn)
                .await?;
            Ok(())
        })
    }

    pub async fn count(&self) -> Result<i64, DbError> {
        with_conn!(self.pool, conn => {
            pages::table.count().get_result::<i64>(&mut conn).await
        })
    }
}
