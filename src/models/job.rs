//! Crawl jobs and their metrics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a job was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobMode {
    /// A single URL analyzed on request.
    Single,
    /// An explicit list of URLs.
    SeedOnly,
    /// Items pulled from the frontier queue.
    Frontier,
}

impl JobMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "SINGLE",
            Self::SeedOnly => "SEED_ONLY",
            Self::Frontier => "FRONTIER",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "SINGLE" => Some(Self::Single),
            "SEED_ONLY" => Some(Self::SeedOnly),
            "FRONTIER" => Some(Self::Frontier),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Running,
    Finished,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Finished => "FINISHED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "RUNNING" => Some(Self::Running),
            "FINISHED" => Some(Self::Finished),
            _ => None,
        }
    }
}

/// Counters tallied while a job runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobMetrics {
    pub success: u64,
    pub failed: u64,
    pub skipped: u64,
    pub http_304: u64,
    pub retried: u64,
    pub avg_fetch_ms: f64,
    pub avg_parse_ms: f64,
    #[serde(skip)]
    fetch_ms_total: u64,
    #[serde(skip)]
    fetch_samples: u64,
    #[serde(skip)]
    parse_ms_total: u64,
    #[serde(skip)]
    parse_samples: u64,
}

impl JobMetrics {
    pub fn record_fetch_ms(&mut self, ms: u64) {
        self.fetch_ms_total += ms;
        self.fetch_samples += 1;
        self.avg_fetch_ms = self.fetch_ms_total as f64 / self.fetch_samples as f64;
    }

    pub fn record_parse_ms(&mut self, ms: u64) {
        self.parse_ms_total += ms;
        self.parse_samples += 1;
        self.avg_parse_ms = self.parse_ms_total as f64 / self.parse_samples as f64;
    }

    pub fn total(&self) -> u64 {
        self.success + self.failed + self.skipped + self.http_304
    }
}

/// A crawl run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlJob {
    pub id: i64,
    pub seed: Option<String>,
    pub mode: JobMode,
    pub settings: serde_json::Value,
    pub status: JobStatus,
    pub metrics: Option<JobMetrics>,
    pub pages_spent: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Quality indicators computed when a job finishes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobKpis {
    pub pages_saved: i64,
    pub avg_score: f64,
    /// Share of saved snapshots with at least one issue.
    pub issue_rate: f64,
    /// Share of saved snapshots with at least one critical issue.
    pub critical_rate: f64,
    pub not_modified_ratio: f64,
    pub avg_fetch_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_averages() {
        let mut m = JobMetrics::default();
        m.record_fetch_ms(100);
        m.record_fetch_ms(300);
        m.record_parse_ms(10);
        assert_eq!(m.avg_fetch_ms, 200.0);
        assert_eq!(m.avg_parse_ms, 10.0);
    }

    #[test]
    fn test_metrics_json_shape() {
        let mut m = JobMetrics::default();
        m.success = 2;
        m.record_fetch_ms(50);
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["success"], 2);
        assert_eq!(v["avg_fetch_ms"], 50.0);
        assert!(v.get("fetch_ms_total").is_none());
    }
}
