//! Service layer for seointel business logic.
//!
//! Services are independent of the CLI and can be driven directly through
//! the library API.

pub mod analyzer;
pub mod crawl;
pub mod persist;
pub mod report;
pub mod stages;

use thiserror::Error;

use crate::http_client::FetchError;
use crate::repository::DbError;

pub use analyzer::{build_record, AnalyzeReport, AnalyzeResult, Analyzer, PageSummary};
pub use crawl::{tally, CrawlEvent, CrawlService, CrawlSummary};
pub use persist::{SaveOutcome, SaveStatus, SnapshotPipeline};
pub use report::{page_report, PageReport, PageStability};
pub use stages::{default_stages, SnapshotStage, StageContext};

/// Failures that stop a pipeline rather than being recorded as results.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("database error: {0}")]
    Database(#[from] DbError),

    #[error("HTTP client error: {0}")]
    Client(#[from] FetchError),
}
