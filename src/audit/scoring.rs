//! Issue detection and the 0-100 page score.

use super::extract::PageAudit;
use crate::models::IssueCode;
use crate::utils::sha256_hex;

const TITLE_MAX_CHARS: usize = 60;
const MIN_ALT_COVERAGE_PCT: f64 = 50.0;
const MAX_REDIRECT_HOPS: usize = 2;

/// Detect issues on an audited page. The result is sorted and free of
/// duplicates.
pub fn compute_issues(audit: &PageAudit, redirect_hops: usize) -> Vec<IssueCode> {
    let mut issues = Vec::new();

    match audit.title.as_deref() {
        None => issues.push(IssueCode::TitleMissing),
        Some(t) if t.chars().count() > TITLE_MAX_CHARS => issues.push(IssueCode::TitleTooLong),
        Some(_) => {}
    }
    match audit.h1.len() {
        0 => issues.push(IssueCode::NoH1),
        1 => {}
        _ => issues.push(IssueCode::MultipleH1),
    }
    if audit.has_noindex() {
        issues.push(IssueCode::Noindex);
    }
    if audit.canonical.is_none() {
        issues.push(IssueCode::CanonicalMissing);
    }
    if audit.jsonld_broken {
        issues.push(IssueCode::BrokenJsonld);
    }
    if audit.hreflang_inconsistent {
        issues.push(IssueCode::HreflangInconsistent);
    }
    if audit.images > 0 && audit.alt_coverage_pct < MIN_ALT_COVERAGE_PCT {
        issues.push(IssueCode::LowAltCoverage);
    }
    if redirect_hops > MAX_REDIRECT_HOPS {
        issues.push(IssueCode::RedirectChainLong);
    }

    issues.sort();
    issues.dedup();
    issues
}

/// `100 - sum(penalties)`, clamped to `0..=100`.
pub fn compute_score(issues: &[IssueCode]) -> i32 {
    let penalty: u32 = issues.iter().map(IssueCode::penalty).sum();
    100 - penalty.min(100) as i32
}

/// Stable fingerprint of an issue set, independent of input order.
pub fn issues_sha256(issues: &[IssueCode]) -> String {
    let mut codes: Vec<&str> = issues.iter().map(IssueCode::as_str).collect();
    codes.sort_unstable();
    codes.dedup();
    sha256_hex(codes.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_audit() -> PageAudit {
        PageAudit {
            title: Some("Acme".into()),
            h1: vec!["Acme".into()],
            canonical: Some("https://acme.test/".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_clean_page_scores_100() {
        let issues = compute_issues(&base_audit(), 0);
        assert!(issues.is_empty());
        assert_eq!(compute_score(&issues), 100);
    }

    #[test]
    fn test_missing_title_scores_60() {
        let audit = PageAudit {
            title: None,
            ..base_audit()
        };
        let issues = compute_issues(&audit, 0);
        assert_eq!(issues, vec![IssueCode::TitleMissing]);
        assert_eq!(compute_score(&issues), 60);
    }

    #[test]
    fn test_each_rule_fires() {
        let audit = PageAudit {
            title: Some("x".repeat(61)),
            h1: vec!["a".into(), "b".into()],
            canonical: None,
            robots_meta: Some("noindex".into()),
            jsonld_broken: true,
            hreflang_inconsistent: true,
            images: 4,
            alt_coverage_pct: 25.0,
            ..Default::default()
        };
        let issues = compute_issues(&audit, 3);
        assert_eq!(
            issues,
            vec![
                IssueCode::Noindex,
                IssueCode::MultipleH1,
                IssueCode::CanonicalMissing,
                IssueCode::BrokenJsonld,
                IssueCode::TitleTooLong,
                IssueCode::HreflangInconsistent,
                IssueCode::LowAltCoverage,
                IssueCode::RedirectChainLong,
            ]
        );
        // 30 + 10 + 15 + 10 + 5 * 4
        assert_eq!(compute_score(&issues), 15);
    }

    #[test]
    fn test_thresholds_are_exclusive() {
        let audit = PageAudit {
            title: Some("x".repeat(60)),
            images: 2,
            alt_coverage_pct: 50.0,
            ..base_audit()
        };
        assert!(compute_issues(&audit, 2).is_empty());
    }

    #[test]
    fn test_score_clamps_at_zero() {
        let issues = vec![IssueCode::TitleMissing, IssueCode::NoH1, IssueCode::Noindex, IssueCode::CanonicalMissing];
        assert_eq!(compute_score(&issues), 0);
        assert_eq!(compute_score(&[IssueCode::HttpError]), 0);
    }

    #[test]
    fn test_score_monotonic() {
        let mut issues = Vec::new();
        let mut last = compute_score(&issues);
        for code in IssueCode::ALL {
            issues.push(code);
            let score = compute_score(&issues);
            assert!(score <= last);
            last = score;
        }
    }

    #[test]
    fn test_issues_sha256_order_independent() {
        let a = issues_sha256(&[IssueCode::NoH1, IssueCode::TitleMissing]);
        let b = issues_sha256(&[IssueCode::TitleMissing, IssueCode::NoH1]);
        assert_eq!(a, b);
        assert_eq!(a, sha256_hex("NO_H1,TITLE_MISSING"));
        assert_eq!(issues_sha256(&[]), sha256_hex(""));
    }
}
