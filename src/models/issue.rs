//! SEO issue taxonomy and the fixed penalty table.

use serde::{Deserialize, Serialize};

/// How much an issue matters for alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Notice,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Notice => "NOTICE",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "NOTICE" => Some(Self::Notice),
            "WARNING" => Some(Self::Warning),
            "CRITICAL" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// A coded SEO defect contributing a fixed penalty to the page score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    TitleMissing,
    NoH1,
    Noindex,
    MultipleH1,
    CanonicalMissing,
    BrokenJsonld,
    TitleTooLong,
    HreflangInconsistent,
    LowAltCoverage,
    RedirectChainLong,
    /// Gate: the server answered with a 4xx/5xx status.
    HttpError,
    /// Gate: the response is not an HTML document.
    NotHtml,
    /// Gate: the HTML body is too small to audit.
    HtmlTooSmall,
}

impl IssueCode {
    /// Every code, in penalty-table order.
    pub const ALL: [IssueCode; 13] = [
        Self::TitleMissing,
        Self::NoH1,
        Self::Noindex,
        Self::MultipleH1,
        Self::CanonicalMissing,
        Self::BrokenJsonld,
        Self::TitleTooLong,
        Self::HreflangInconsistent,
        Self::LowAltCoverage,
        Self::RedirectChainLong,
        Self::HttpError,
        Self::NotHtml,
        Self::HtmlTooSmall,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TitleMissing => "TITLE_MISSING",
            Self::NoH1 => "NO_H1",
            Self::Noindex => "NOINDEX",
            Self::MultipleH1 => "MULTIPLE_H1",
            Self::CanonicalMissing => "CANONICAL_MISSING",
            Self::BrokenJsonld => "BROKEN_JSONLD",
            Self::TitleTooLong => "TITLE_TOO_LONG",
            Self::HreflangInconsistent => "HREFLANG_INCONSISTENT",
            Self::LowAltCoverage => "LOW_ALT_COVERAGE",
            Self::RedirectChainLong => "REDIRECT_CHAIN_LONG",
            Self::HttpError => "HTTP_ERROR",
            Self::NotHtml => "NOT_HTML",
            Self::HtmlTooSmall => "HTML_TOO_SMALL",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.as_str() == s)
    }

    /// Points subtracted from the base score of 100.
    pub fn penalty(&self) -> u32 {
        match self {
            Self::TitleMissing => 40,
            Self::NoH1 => 20,
            Self::Noindex => 30,
            Self::MultipleH1 => 10,
            Self::CanonicalMissing => 15,
            Self::BrokenJsonld => 10,
            Self::TitleTooLong
            | Self::HreflangInconsistent
            | Self::LowAltCoverage
            | Self::RedirectChainLong => 5,
            Self::HttpError | Self::NotHtml | Self::HtmlTooSmall => 100,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::TitleMissing
            | Self::NoH1
            | Self::Noindex
            | Self::HttpError
            | Self::NotHtml
            | Self::HtmlTooSmall => Severity::Critical,
            Self::MultipleH1 | Self::CanonicalMissing | Self::BrokenJsonld => Severity::Warning,
            Self::TitleTooLong
            | Self::HreflangInconsistent
            | Self::LowAltCoverage
            | Self::RedirectChainLong => Severity::Notice,
        }
    }

    /// Gate codes short-circuit the audit before any HTML is parsed.
    pub fn is_gate(&self) -> bool {
        matches!(self, Self::HttpError | Self::NotHtml | Self::HtmlTooSmall)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::TitleMissing => "Page has no <title>",
            Self::NoH1 => "Page has no <h1> heading",
            Self::Noindex => "Robots meta tag excludes the page from indexing",
            Self::MultipleH1 => "Page has more than one <h1> heading",
            Self::CanonicalMissing => "Page declares no canonical URL",
            Self::BrokenJsonld => "A JSON-LD block is empty or invalid",
            Self::TitleTooLong => "Title is longer than 60 characters",
            Self::HreflangInconsistent => "hreflang alternates do not reference the page itself",
            Self::LowAltCoverage => "Fewer than half of the images have alt text",
            Self::RedirectChainLong => "More than two redirects before the final URL",
            Self::HttpError => "Server answered with an error status",
            Self::NotHtml => "Response is not an HTML document",
            Self::HtmlTooSmall => "HTML body is too small to audit",
        }
    }
}

impl std::fmt::Display for IssueCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_round_trip() {
        for code in IssueCode::ALL {
            assert_eq!(IssueCode::from_str(code.as_str()), Some(code));
        }
        assert_eq!(IssueCode::from_str("NOPE"), None);
    }

    #[test]
    fn test_serde_matches_as_str() {
        let json = serde_json::to_string(&IssueCode::NoH1).unwrap();
        assert_eq!(json, "\"NO_H1\"");
        let json = serde_json::to_string(&IssueCode::BrokenJsonld).unwrap();
        assert_eq!(json, "\"BROKEN_JSONLD\"");
    }

    #[test]
    fn test_gates_are_critical() {
        for code in IssueCode::ALL.iter().filter(|c| c.is_gate()) {
            assert_eq!(code.severity(), Severity::Critical);
            assert_eq!(code.penalty(), 100);
        }
    }
}
