//! SQLite connection pool.
//!
//! Connections are opened on demand and wrapped in `SyncConnectionWrapper`
//! so that diesel-async query code can run against SQLite.

use std::path::Path;

use diesel::sqlite::SqliteConnection;
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_async::{AsyncConnection, SimpleAsyncConnection};

use super::util::to_diesel_error;

/// Diesel error type alias.
pub type DbError = diesel::result::Error;

/// Async SQLite connection type.
pub type SqliteConn = SyncConnectionWrapper<SqliteConnection>;

/// Per-connection pragmas. WAL itself is persistent and set by the migrator.
const CONNECTION_PRAGMAS: &str = "PRAGMA busy_timeout = 5000; PRAGMA foreign_keys = ON;";

/// SQLite connection pool (lightweight - creates connections on demand).
#[derive(Clone, Debug)]
pub struct DbPool {
    database_url: String,
}

impl DbPool {
    /// Create a new pool.
    pub fn new(database_url: &str) -> Self {
        // Strip sqlite: prefix if present
        let url = database_url.strip_prefix("sqlite:").unwrap_or(database_url);
        Self {
            database_url: url.to_string(),
        }
    }

    /// Create pool from a file path.
    pub fn from_path(path: &Path) -> Self {
        Self::new(&path.display().to_string())
    }

    /// Get a connection with busy timeout and foreign keys configured.
    pub async fn get(&self) -> Result<SqliteConn, DbError> {
        let mut conn = SqliteConn::establish(&self.database_url)
            .await
            .map_err(to_diesel_error)?;
        conn.batch_execute(CONNECTION_PRAGMAS).await?;
        Ok(conn)
    }

    /// Get the database URL.
    pub fn database_url(&self) -> &str {
        &self.database_url
    }
}

/// Run a block with a fresh connection bound to `$conn`.
///
/// # Example
/// ```ignore
/// with_conn!(self.pool, conn => {
///     domains::table.load::<DomainRecord>(&mut conn).await
/// })
/// ```
#[macro_export]
macro_rules! with_conn {
    ($pool:expr, $conn:ident => $body:expr) => {{
        #[allow(unused_mut)]
        let mut $conn = $pool.get().await?;
        $body
    }};
}

