//! Alerts raised by the persistence pipeline and the tickets they open.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::issue::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    ScoreDrop,
    CriticalIssue,
    GateFailed,
    BudgetSoft,
    BudgetHard,
    DomainHealth,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScoreDrop => "SCORE_DROP",
            Self::CriticalIssue => "CRITICAL_ISSUE",
            Self::GateFailed => "GATE_FAILED",
            Self::BudgetSoft => "BUDGET_SOFT",
            Self::BudgetHard => "BUDGET_HARD",
            Self::DomainHealth => "DOMAIN_HEALTH",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "SCORE_DROP" => Some(Self::ScoreDrop),
            "CRITICAL_ISSUE" => Some(Self::CriticalIssue),
            "GATE_FAILED" => Some(Self::GateFailed),
            "BUDGET_SOFT" => Some(Self::BudgetSoft),
            "BUDGET_HARD" => Some(Self::BudgetHard),
            "DOMAIN_HEALTH" => Some(Self::DomainHealth),
            _ => None,
        }
    }
}

/// An alert about to be recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAlert {
    pub kind: AlertKind,
    pub severity: Severity,
    pub domain_id: i64,
    pub page_id: Option<i64>,
    pub snapshot_id: Option<i64>,
    pub message: String,
    pub details: serde_json::Value,
}

/// A recorded alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: i64,
    pub kind: AlertKind,
    pub severity: Severity,
    pub domain_id: i64,
    pub page_id: Option<i64>,
    pub snapshot_id: Option<i64>,
    pub message: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
    /// Ticket opened for this alert, if it was critical.
    pub ticket_id: Option<i64>,
}
