//! Database context for managing the connection pool and repository access.

use std::path::{Path, PathBuf};

use super::analytics::AnalyticsRepository;
use super::domain::DomainRepository;
use super::frontier::FrontierRepository;
use super::job::JobRepository;
use super::migrations::run_migrations;
use super::page::PageRepository;
use super::pool::{DbError, DbPool};
use super::snapshot::SnapshotRepository;

/// Entry point for database operations.
///
/// Create one context per command, then use it to access repositories.
///
/// # Example
/// ```ignore
/// let ctx = DbContext::from_path(&db_path);
/// ctx.init_db().await?;
/// let queued = ctx.frontier().counts().await?;
/// ```
#[derive(Clone)]
pub struct DbContext {
    pool: DbPool,
    db_path: PathBuf,
}

impl DbContext {
    /// Create a context for the SQLite file at `db_path`.
    pub fn from_path(db_path: &Path) -> Self {
        Self {
            pool: DbPool::from_path(db_path),
            db_path: db_path.to_path_buf(),
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Create or upgrade the schema. Returns the migrations applied.
    pub async fn init_db(&self) -> Result<Vec<String>, DbError> {
        if let Some(parent) = self.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(super::util::to_diesel_error)?;
            }
        }
        run_migrations(&self.db_path).await
    }

    pub fn domains(&self) -> DomainRepository {
        DomainRepository::new(self.pool.clone())
    }

    pub fn pages(&self) -> PageRepository {
        PageRepository::new(self.pool.clone())
    }

    pub fn snapshots(&self) -> SnapshotRepository {
        SnapshotRepository::new(self.pool.clone())
    }

    pub fn jobs(&self) -> JobRepository {
        JobRepository::new(self.pool.clone())
    }

    pub fn frontier(&self) -> FrontierRepository {
        FrontierRepository::new(self.pool.clone())
    }

    pub fn analytics(&self) -> AnalyticsRepository {
        AnalyticsRepository::new(self.pool.clone())
    }
}
