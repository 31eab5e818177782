//! Repository layer for database persistence.
//!
//! All database access goes through Diesel against a single SQLite file.
//! Each repository owns a cheap clone of the pool and opens a connection
//! per call.

pub mod analytics;
pub mod context;
pub mod domain;
pub mod frontier;
pub mod job;
pub mod migrations;
pub mod page;
pub mod pool;
pub mod records;
pub mod snapshot;
pub mod util;

pub use analytics::{
    AnalyticsRepository, BudgetUsage, ClusterMembership, CostEntry, HealthSample, LineageEdge,
    LinkEdge,
};
pub use context::DbContext;
pub use domain::{DomainDefaults, DomainRepository};
pub use frontier::FrontierRepository;
pub use job::JobRepository;
pub use page::{FetchCacheUpdate, PageRepository};
pub use pool::{DbError, DbPool};
pub use records::NewSnapshot;
pub use snapshot::SnapshotRepository;
