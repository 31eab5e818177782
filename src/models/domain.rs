//! Crawled domains and their cost/health classification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Crawl cost class derived from average fetch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CostTier {
    A,
    B,
    C,
}

impl CostTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "A" => Some(Self::A),
            "B" => Some(Self::B),
            "C" => Some(Self::C),
            _ => None,
        }
    }

    /// Classify a domain by its average fetch time in milliseconds.
    pub fn from_avg_fetch_ms(avg_ms: f64) -> Self {
        if avg_ms < 800.0 {
            Self::A
        } else if avg_ms < 2500.0 {
            Self::B
        } else {
            Self::C
        }
    }
}

/// Daily availability classification of a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthTier {
    Good,
    Degraded,
    Bad,
}

impl HealthTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Good => "GOOD",
            Self::Degraded => "DEGRADED",
            Self::Bad => "BAD",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "GOOD" => Some(Self::Good),
            "DEGRADED" => Some(Self::Degraded),
            "BAD" => Some(Self::Bad),
            _ => None,
        }
    }

    /// Classify from a day's counters. A 304 counts as a success.
    pub fn classify(fetches: i64, successes: i64, total_fetch_ms: i64) -> Self {
        if fetches <= 0 {
            return Self::Good;
        }
        let rate = successes as f64 / fetches as f64;
        let avg_ms = total_fetch_ms as f64 / fetches as f64;
        if rate >= 0.95 && avg_ms < 2000.0 {
            Self::Good
        } else if rate >= 0.80 {
            Self::Degraded
        } else {
            Self::Bad
        }
    }
}

/// A crawled host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Domain {
    pub id: i64,
    /// Lowercased host name, unique.
    pub host: String,
    pub cost_tier: CostTier,
    /// Minimum age before an unchanged page is re-snapshotted.
    pub ttl_hours: i64,
    /// Pages per UTC day before the domain is paused.
    pub daily_budget: i64,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub first_seen: DateTime<Utc>,
    pub last_crawled: Option<DateTime<Utc>>,
}

impl Domain {
    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.is_some_and(|until| until > now)
    }
}

/// One row of per-day domain health counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainHealth {
    pub host: String,
    pub day: String,
    pub fetches: i64,
    pub successes: i64,
    pub not_modified: i64,
    pub errors: i64,
    pub total_fetch_ms: i64,
    pub tier: HealthTier,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_cost_tier_thresholds() {
        assert_eq!(CostTier::from_avg_fetch_ms(120.0), CostTier::A);
        assert_eq!(CostTier::from_avg_fetch_ms(800.0), CostTier::B);
        assert_eq!(CostTier::from_avg_fetch_ms(2499.9), CostTier::B);
        assert_eq!(CostTier::from_avg_fetch_ms(4000.0), CostTier::C);
    }

    #[test]
    fn test_health_classify() {
        assert_eq!(HealthTier::classify(0, 0, 0), HealthTier::Good);
        assert_eq!(HealthTier::classify(20, 20, 20_000), HealthTier::Good);
        assert_eq!(HealthTier::classify(20, 20, 60_000), HealthTier::Degraded);
        assert_eq!(HealthTier::classify(10, 8, 1_000), HealthTier::Degraded);
        assert_eq!(HealthTier::classify(10, 5, 1_000), HealthTier::Bad);
    }

    #[test]
    fn test_in_cooldown() {
        let now = Utc::now();
        let mut d = Domain {
            id: 1,
            host: "example.com".into(),
            cost_tier: CostTier::A,
            ttl_hours: 24,
            daily_budget: 500,
            cooldown_until: None,
            first_seen: now,
            last_crawled: None,
        };
        assert!(!d.in_cooldown(now));
        d.cooldown_until = Some(now + Duration::minutes(5));
        assert!(d.in_cooldown(now));
        d.cooldown_until = Some(now - Duration::minutes(5));
        assert!(!d.in_cooldown(now));
    }
}
