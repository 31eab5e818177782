//! HTML audit: response gate, extraction, and scoring.

mod extract;
mod scoring;

pub use extract::{Hreflang, PageAudit, LINK_SAMPLE_CAP};
pub use scoring::{compute_issues, compute_score, issues_sha256};

use serde_json::json;

use crate::models::IssueCode;
use crate::utils::sha256_hex;

/// Outcome of the pre-parse response gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    NotModified,
    Gated(IssueCode),
    Html,
}

/// Decide whether a response is worth parsing.
///
/// A missing content type is treated as HTML.
pub fn classify_response(
    status: u16,
    content_type: Option<&str>,
    body_len: usize,
    min_html_bytes: usize,
) -> ResponseClass {
    if status == 304 {
        return ResponseClass::NotModified;
    }
    if status >= 400 {
        return ResponseClass::Gated(IssueCode::HttpError);
    }
    if let Some(ct) = content_type {
        let ct = ct.to_ascii_lowercase();
        if !(ct.contains("text/html") || ct.contains("application/xhtml+xml")) {
            return ResponseClass::Gated(IssueCode::NotHtml);
        }
    }
    if body_len < min_html_bytes {
        return ResponseClass::Gated(IssueCode::HtmlTooSmall);
    }
    ResponseClass::Html
}

/// Hash of the audit fields that matter for change detection.
///
/// Timings and link samples are left out so that re-fetching an unchanged
/// page yields the same hash.
pub fn content_hash(audit: &PageAudit, status_code: u16) -> String {
    let stable = json!({
        "status_code": status_code,
        "title": audit.title,
        "meta_description": audit.meta_description,
        "h1": audit.h1,
        "h2_count": audit.h2_count,
        "h3_count": audit.h3_count,
        "canonical": audit.canonical,
        "robots_meta": audit.robots_meta,
        "lang": audit.lang,
        "hreflang": audit.hreflang,
        "jsonld_types": audit.jsonld_types,
        "jsonld_broken": audit.jsonld_broken,
        "sha256_text": audit.sha256_text,
        "word_count": audit.word_count,
        "internal_links": audit.internal_links,
        "external_links": audit.external_links,
        "images": audit.images,
        "alt_coverage_pct": audit.alt_coverage_pct,
    });
    sha256_hex(stable.to_string())
}

/// Hash for a snapshot that never got past the gate.
pub fn gate_hash(code: IssueCode, status_code: u16) -> String {
    sha256_hex(json!({ "status_code": status_code, "gate": code.as_str() }).to_string())
}
