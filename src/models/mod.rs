//! Data models for seointel.

mod alert;
mod analysis;
mod domain;
mod frontier;
mod issue;
mod job;
mod page;
mod snapshot;

pub use alert::{Alert, AlertKind, NewAlert};
pub use analysis::{AnalysisRecord, PageBody};
pub use domain::{CostTier, Domain, DomainHealth, HealthTier};
pub use frontier::{backoff_delay, FrontierItem, FrontierStatus, RetryOutcome};
pub use issue::{IssueCode, Severity};
pub use job::{CrawlJob, JobKpis, JobMetrics, JobMode, JobStatus};
pub use page::{HttpHints, Page, Segment};
pub use snapshot::{RedirectHop, Snapshot, Timings};
