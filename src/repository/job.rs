//! Crawl job repository.

use diesel::prelude::*;
use diesel::sql_types::{BigInt, Double};
use diesel_async::RunQueryDsl;

use super::pool::{DbError, DbPool};
use super::records::{CrawlJobRecord, JobKpiRecord};
use super::util::{to_json_text, LastInsertRowId};
use crate::models::{CrawlJob, JobKpis, JobMetrics, JobMode, JobStatus};
use crate::schema::{crawl_jobs, job_kpis};
use crate::utils::now_timestamp;
use crate::with_conn;

#[derive(QueryableByName)]
struct JobAggregateRow {
    #[diesel(sql_type = BigInt)]
    pages_saved: i64,
    #[diesel(sql_type = Double)]
    avg_score: f64,
    #[diesel(sql_type = BigInt)]
    with_issues: i64,
    #[diesel(sql_type = BigInt)]
    with_critical: i64,
}

const JOB_AGGREGATE_SQL: &str = "\
    SELECT COUNT(*) AS pages_saved, \
           COALESCE(AVG(s.score), 0.0) AS avg_score, \
           COALESCE(SUM(CASE WHEN EXISTS ( \
               SELECT 1 FROM snapshot_issues si WHERE si.snapshot_id = s.id \
           ) THEN 1 ELSE 0 END), 0) AS with_issues, \
           COALESCE(SUM(CASE WHEN EXISTS ( \
               SELECT 1 FROM snapshot_issues si JOIN issues i ON i.code = si.code \
               WHERE si.snapshot_id = s.id AND i.severity = 'CRITICAL' \
           ) THEN 1 ELSE 0 END), 0) AS with_critical \
    FROM snapshots s \
    WHERE s.job_id = ? AND s.gate_code IS NULL";

#[derive(Clone)]
pub struct JobRepository {
    pool: DbPool,
}

impl JobRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Open a job in `RUNNING` state. Returns its id.
    pub async fn start(
        &self,
        mode: JobMode,
        seed: Option<&str>,
        settings: &serde_json::Value,
    ) -> Result<i64, DbError> {
        let settings = to_json_text(settings)?;
        let now = now_timestamp();
        with_conn!(self.pool, conn => {
            diesel::insert_into(crawl_jobs::table)
                .values((
                    crawl_jobs::seed.eq(seed),
                    crawl_jobs::mode.eq(mode.as_str()),
                    crawl_jobs::settings.eq(&settings),
                    crawl_jobs::status.eq(JobStatus::Running.as_str()),
                    crawl_jobs::pages_spent.eq(0i64),
                    crawl_jobs::started_at.eq(&now),
                ))
                .execute(&mut conn)
                .await?;
            let row: LastInsertRowId = diesel::sql_query("SELECT last_insert_rowid()")
                .get_result(&mut conn)
                .await?;
            Ok(row.id)
        })
    }

    /// Close a job with its final metrics.
    pub async fn finish(
        &self,
        id: i64,
        metrics: &JobMetrics,
        pages_spent: i64,
    ) -> Result<(), DbError> {
        let metrics = to_json_text(metrics)?;
        let now = now_timestamp();
        with_conn!(self.pool, conn => {
            diesel::update(crawl_jobs::table.find(id))
                .set((
                    crawl_jobs::status.eq(JobStatus::Finished.as_str()),
                    crawl_jobs::metrics.eq(Some(&metrics)),
                    crawl_jobs::pages_spent.eq(pages_spent),
                    crawl_jobs::finished_at.eq(Some(&now)),
                ))
                .execute(&mut conn)
                .await?;
            Ok(())
        })
    }

    pub async fn get(&self, id: i64) -> Result<Option<CrawlJob>, DbError> {
        with_conn!(self.pool, conn => {
            crawl_jobs::table
                .find(id)
                .select(CrawlJobRecord::as_select())
                .first::<CrawlJobRecord>(&mut conn)
                .await
                .optional()
                .map(|r| r.map(CrawlJob::from))
        })
    }

    /// Most recent jobs first.
    pub async fn recent(&self, limit: i64) -> Result<Vec<CrawlJob>, DbError> {
        with_conn!(self.pool, conn => {
            crawl_jobs::table
                .order(crawl_jobs::id.desc())
                .limit(limit)
                .select(CrawlJobRecord::as_select())
                .load::<CrawlJobRecord>(&mut conn)
                .await
                .map(|records| records.into_iter().map(CrawlJob::from).collect())
        })
    }

    /// Derive KPIs from the snapshots a job saved plus its run metrics.
    ///
    /// Gated snapshots are excluded from the score and issue rates.
    pub async fn compute_kpis(&self, id: i64, metrics: &JobMetrics) -> Result<JobKpis, DbError> {
        let row: JobAggregateRow = with_conn!(self.pool, conn => {
            diesel::sql_query(JOB_AGGREGATE_SQL)
                .bind::<BigInt, _>(id)
                .get_result(&mut conn)
                .await?
        });

        let rate = |n: i64| {
            if row.pages_saved > 0 {
                n as f64 / row.pages_saved as f64
            } else {
                0.0
            }
        };
        let total = metrics.total();
        let not_modified_ratio = if total > 0 {
            metrics.http_304 as f64 / total as f64
        } else {
            0.0
        };

        Ok(JobKpis {
            pages_saved: row.pages_saved,
            avg_score: row.avg_score,
            issue_rate: rate(row.with_issues),
            critical_rate: rate(row.with_critical),
            not_modified_ratio,
            avg_fetch_ms: metrics.avg_fetch_ms,
        })
    }

    pub async fn save_kpis(&self, id: i64, kpis: &JobKpis) -> Result<(), DbError> {
        let now = now_timestamp();
        with_conn!(self.pool, conn => {
            diesel::replace_into(job_kpis::table)
                .values((
                    job_kpis::job_id.eq(id),
                    job_kpis::pages_saved.eq(kpis.pages_saved),
                    job_kpis::avg_score.eq(kpis.avg_score),
                    job_kpis::issue_rate.eq(kpis.issue_rate),
                    job_kpis::critical_rate.eq(kpis.critical_rate),
                    job_kpis::not_modified_ratio.eq(kpis.not_modified_ratio),
                    job_kpis::avg_fetch_ms.eq(kpis.avg_fetch_ms),
                    job_kpis::computed_at.eq(&now),
                ))
                .execute(&mut conn)
                .await?;
            Ok(())
        })
    }

    pub async fn kpis(&self, id: i64) -> Result<Option<JobKpis>, DbError> {
        with_conn!(self.pool, conn => {
            job_kpis::table
                .find(id)
                .select(JobKpiRecord::as_select())
                .first::<JobKpiRecord>(&mut conn)
                .await
                .optional()
                .map(|r| r.map(JobKpis::from))
        })
    }
}
