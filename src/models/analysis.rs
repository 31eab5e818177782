//! The immutable result of fetching and auditing one URL.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::issue::IssueCode;
use super::snapshot::{RedirectHop, Timings};
use crate::audit::PageAudit;
use crate::http_client::HeaderFingerprint;

/// What the fetch produced, after the response gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageBody {
    /// `304 Not Modified`; nothing was parsed.
    NotModified,
    /// The response failed a gate before parsing.
    Gated { code: IssueCode },
    /// The HTML was parsed and audited.
    Parsed { audit: Box<PageAudit> },
}

/// Everything the persistence pipeline needs about one analyzed URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    /// URL as requested.
    pub url: String,
    pub url_norm: String,
    pub final_url: String,
    pub status_code: u16,
    pub redirect_chain: Vec<RedirectHop>,
    pub content_type: Option<String>,
    pub body_bytes: u64,
    /// Validators returned by the server for the next conditional fetch.
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub fingerprint: HeaderFingerprint,
    pub fetched_at: DateTime<Utc>,
    pub timings: Timings,
    pub body: PageBody,
    /// Frontier or batch job the fetch belongs to.
    pub job_id: Option<i64>,
}

impl AnalysisRecord {
    pub fn audit(&self) -> Option<&PageAudit> {
        match &self.body {
            PageBody::Parsed { audit } => Some(audit),
            _ => None,
        }
    }

    pub fn gate_code(&self) -> Option<IssueCode> {
        match self.body {
            PageBody::Gated { code } => Some(code),
            _ => None,
        }
    }

    pub fn is_not_modified(&self) -> bool {
        matches!(self.body, PageBody::NotModified)
    }
}
