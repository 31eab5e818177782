//! Frontier queue items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::page::HttpHints;

/// Lifecycle of a frontier item.
///
/// `PENDING -> RUNNING -> DONE | FAILED`; a transient failure puts a running
/// item back to `PENDING` until its retries are exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FrontierStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl FrontierStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "RUNNING" => Some(Self::Running),
            "DONE" => Some(Self::Done),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A URL waiting in (or taken from) the frontier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierItem {
    pub id: i64,
    pub url: String,
    pub url_norm: String,
    pub priority: i32,
    pub source: Option<String>,
    pub status: FrontierStatus,
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub next_attempt_at: DateTime<Utc>,
    /// Validators from the page cache, if the URL was fetched before.
    pub hints: HttpHints,
}

/// Result of recording a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Requeued; next attempt after the given delay.
    Requeued { delay_secs: u64 },
    /// Retries exhausted; the item is failed and its domain cooled down.
    Failed,
}

/// Delay before retry number `attempt` (1-based). The last entry is reused
/// once the schedule runs out.
pub fn backoff_delay(schedule: &[u64], attempt: u32) -> u64 {
    if schedule.is_empty() {
        return 0;
    }
    let idx = (attempt.max(1) as usize - 1).min(schedule.len() - 1);
    schedule[idx]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_schedule() {
        let schedule = [30, 120, 600];
        assert_eq!(backoff_delay(&schedule, 1), 30);
        assert_eq!(backoff_delay(&schedule, 2), 120);
        assert_eq!(backoff_delay(&schedule, 3), 600);
        assert_eq!(backoff_delay(&schedule, 9), 600);
        assert_eq!(backoff_delay(&schedule, 0), 30);
        assert_eq!(backoff_delay(&[], 2), 0);
    }

    #[test]
    fn test_status_round_trip() {
        for s in [
            FrontierStatus::Pending,
            FrontierStatus::Running,
            FrontierStatus::Done,
            FrontierStatus::Failed,
        ] {
            assert_eq!(FrontierStatus::from_str(s.as_str()), Some(s));
        }
    }
}
