//! Read-side reports over stored history.

use serde::Serialize;

use crate::models::{Alert, Page, Snapshot};
use crate::repository::{DbContext, DbError};
use crate::utils::normalize_url;

/// How stable a page has been across its snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PageStability {
    pub snapshots: usize,
    pub mean_score: f64,
    /// Population standard deviation of the score.
    pub score_stddev: f64,
    /// Share of consecutive snapshot pairs whose issue sets differ.
    pub issues_flip_rate: f64,
}

impl PageStability {
    /// Compute stability over snapshots in chronological order.
    pub fn from_history(history: &[Snapshot]) -> Self {
        let n = history.len();
        if n == 0 {
            return Self::default();
        }

        let mean = history.iter().map(|s| s.score as f64).sum::<f64>() / n as f64;
        let variance = history
            .iter()
            .map(|s| (s.score as f64 - mean).powi(2))
            .sum::<f64>()
            / n as f64;

        let flips = history
            .windows(2)
            .filter(|w| w[0].issues_sha256 != w[1].issues_sha256)
            .count();
        let issues_flip_rate = if n > 1 {
            flips as f64 / (n - 1) as f64
        } else {
            0.0
        };

        Self {
            snapshots: n,
            mean_score: mean,
            score_stddev: variance.sqrt(),
            issues_flip_rate,
        }
    }
}

/// History and stability of one page.
#[derive(Debug, Clone, Serialize)]
pub struct PageReport {
    pub page: Page,
    pub stability: PageStability,
    pub history: Vec<Snapshot>,
    pub alerts: Vec<Alert>,
}

/// Build the report for a URL, or `None` if it was never crawled.
pub async fn page_report(
    db: &DbContext,
    url: &str,
    limit: i64,
) -> Result<Option<PageReport>, DbError> {
    let Some(page) = db.pages().get_by_url_norm(&normalize_url(url)).await? else {
        return Ok(None);
    };

    let history = db.snapshots().history(page.id, limit).await?;
    let alerts = db.analytics().alerts_for_page(page.id).await?;

    Ok(Some(PageReport {
        stability: PageStability::from_history(&history),
        page,
        history,
        alerts,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Timings;
    use chrono::Utc;

    fn snap(score: i32, issues: &str) -> Snapshot {
        Snapshot {
            id: 1,
            page_id: 1,
            job_id: None,
            fetched_at: Utc::now(),
            status_code: 200,
            final_url: "https://example.com".to_string(),
            title: None,
            word_count: 0,
            score,
            content_hash: String::new(),
            issues_sha256: issues.to_string(),
            gate_code: None,
            sha256_text: None,
            timings: Timings::default(),
        }
    }

    #[test]
    fn test_stability_empty_history() {
        assert_eq!(PageStability::from_history(&[]), PageStability::default());
    }

    #[test]
    fn test_stability_stddev_and_flips() {
        let history = [snap(80, "a"), snap(60, "b"), snap(80, "b"), snap(60, "a")];
        let s = PageStability::from_history(&history);
        assert_eq!(s.snapshots, 4);
        assert_eq!(s.mean_score, 70.0);
        assert_eq!(s.score_stddev, 10.0);
        assert!((s.issues_flip_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_snapshot_never_flips() {
        let s = PageStability::from_history(&[snap(90, "a")]);
        assert_eq!(s.score_stddev, 0.0);
        assert_eq!(s.issues_flip_rate, 0.0);
    }
}
