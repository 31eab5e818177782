//! Point-in-time snapshots of a page.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::issue::IssueCode;

/// One redirect followed while fetching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectHop {
    pub status: u16,
    pub url: String,
}

/// Per-stage wall times in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timings {
    pub fetch_ms: u64,
    pub parse_ms: u64,
    pub audit_ms: u64,
}

/// A stored snapshot, as read back for reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: i64,
    pub page_id: i64,
    pub job_id: Option<i64>,
    pub fetched_at: DateTime<Utc>,
    pub status_code: i32,
    pub final_url: String,
    pub title: Option<String>,
    pub word_count: i64,
    pub score: i32,
    pub content_hash: String,
    pub issues_sha256: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate_code: Option<IssueCode>,
    pub sha256_text: Option<String>,
    pub timings: Timings,
}

impl Snapshot {
    pub fn is_gated(&self) -> bool {
        self.gate_code.is_some()
    }
}
