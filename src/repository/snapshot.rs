//! Snapshot repository.
//!
//! Snapshots are append-only. Inserting one also links its issues and
//! advances the owning page's `last_snapshot_id`, all in one transaction.

use diesel::prelude::*;
use diesel_async::{AsyncConnection, RunQueryDsl};

use super::pool::{DbError, DbPool};
use super::records::{NewSnapshot, SnapshotRecord};
use super::util::LastInsertRowId;
use crate::models::{IssueCode, Snapshot};
use crate::schema::{pages, snapshot_issues, snapshots};
use crate::with_conn;

#[derive(Clone)]
pub struct SnapshotRepository {
    pool: DbPool,
}

impl SnapshotRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert a snapshot with its issue links. Returns the new snapshot id.
    pub async fn insert(
        &self,
        snapshot: &NewSnapshot<'_>,
        issues: &[IssueCode],
    ) -> Result<i64, DbError> {
        let codes: Vec<&'static str> = issues.iter().map(|c| c.as_str()).collect();
        let page_id = snapshot.page_id;

        with_conn!(self.pool, conn => {
            conn.transaction(|conn| {
                Box::pin(async move {
                    diesel::insert_into(snapshots::table)
                        .values(snapshot)
                        .execute(conn)
                        .await?;

                    let snapshot_id = diesel::sql_query("SELECT last_insert_rowid()")
                        .get_result::<LastInsertRowId>(conn)
                        .await?
                        .id;

                    for code in &codes {
                        diesel::insert_or_ignore_into(snapshot_issues::table)
                            .values((
                                snapshot_issues::snapshot_id.eq(snapshot_id),
                                snapshot_issues::code.eq(*code),
                            ))
                            .execute(conn)
                            .await?;
                    }

                    diesel::update(pages::table.find(page_id))
                        .set(pages::last_snapshot_id.eq(Some(snapshot_id)))
                        .execute(conn)
                        .await?;

                    Ok(snapshot_id)
                })
            })
            .await
        })
    }

    pub async fn get(&self, id: i64) -> Result<Option<Snapshot>, DbError> {
        with_conn!(self.pool, conn => {
            snapshots::table
                .find(id)
                .select(SnapshotRecord::as_select())
                .first::<SnapshotRecord>(&mut conn)
                .await
                .optional()
                .map(|r| r.map(Snapshot::from))
        })
    }

    /// Most recent snapshot of a page.
    pub async fn latest_for_page(&self, page_id: i64) -> Result<Option<Snapshot>, DbError> {
        with_conn!(self.pool, conn => {
            snapshots::table
                .filter(snapshots::page_id.eq(page_id))
                .order(snapshots::id.desc())
                .select(SnapshotRecord::as_select())
                .first::<SnapshotRecord>(&mut conn)
                .await
                .optional()
                .map(|r| r.map(Snapshot::from))
        })
    }

    /// Snapshots of a page, oldest first, limited to the most recent `limit`.
    pub async fn history(&self, page_id: i64, limit: i64) -> Result<Vec<Snapshot>, DbError> {
        let mut rows: Vec<Snapshot> = with_conn!(self.pool, conn => {
            snapshots::table
                .filter(snapshots::page_id.eq(page_id))
                .order(snapshots::id.desc())
                .limit(limit)
                .select(SnapshotRecord::as_select())
                .load::<SnapshotRecord>(&mut conn)
                .await?
                .into_iter()
                .map(Snapshot::from)
                .collect()
        });
        rows.reverse();
        Ok(rows)
    }

    pub async fn issues_for(&self, snapshot_id: i64) -> Result<Vec<IssueCode>, DbError> {
        let codes: Vec<String> = with_conn!(self.pool, conn => {
            snapshot_issues::table
                .filter(snapshot_issues::snapshot_id.eq(snapshot_id))
                .select(snapshot_issues::code)
                .load::<String>(&mut conn)
                .await?
        });
        let mut issues: Vec<IssueCode> = codes
            .iter()
            .filter_map(|c| IssueCode::from_str(c))
            .collect();
        issues.sort();
        Ok(issues)
    }

    pub async fn count_for_page(&self, page_id: i64) -> Result<i64, DbError> {
        with_conn!(self.pool, conn => {
            snapshots::table
                .filter(snapshots::page_id.eq(page_id))
                .count()
                .get_result::<i64>(&mut conn)
                .await
        })
    }

    pub async fn count(&self) -> Result<i64, DbError> {
        with_conn!(self.pool, conn => {
            snapshots::table.count().get_result::<i64>(&mut conn).await
        })
    }
}
