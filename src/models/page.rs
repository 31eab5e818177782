//! Pages keyed by normalized URL.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Coarse page role guessed from the URL path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Segment {
    Home,
    Login,
    Signup,
    Search,
    Blog,
    Product,
    Category,
    Docs,
    Legal,
    Other,
}

impl Segment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Home => "HOME",
            Self::Login => "LOGIN",
            Self::Signup => "SIGNUP",
            Self::Search => "SEARCH",
            Self::Blog => "BLOG",
            Self::Product => "PRODUCT",
            Self::Category => "CATEGORY",
            Self::Docs => "DOCS",
            Self::Legal => "LEGAL",
            Self::Other => "OTHER",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "HOME" => Some(Self::Home),
            "LOGIN" => Some(Self::Login),
            "SIGNUP" => Some(Self::Signup),
            "SEARCH" => Some(Self::Search),
            "BLOG" => Some(Self::Blog),
            "PRODUCT" => Some(Self::Product),
            "CATEGORY" => Some(Self::Category),
            "DOCS" => Some(Self::Docs),
            "LEGAL" => Some(Self::Legal),
            "OTHER" => Some(Self::Other),
            _ => None,
        }
    }

    /// Assign a segment from the path of an absolute URL.
    pub fn from_url(url: &str) -> Self {
        let path = match Url::parse(url) {
            Ok(u) => u.path().to_ascii_lowercase(),
            Err(_) => return Self::Other,
        };
        let path = path.trim_end_matches('/');
        if path.is_empty() || path == "/index.html" {
            return Self::Home;
        }

        const RULES: &[(&[&str], Segment)] = &[
            (&["login", "signin", "sign-in", "log-in"], Segment::Login),
            (&["signup", "sign-up", "register", "join"], Segment::Signup),
            (&["search"], Segment::Search),
            (&["blog", "news", "articles", "posts"], Segment::Blog),
            (&["product", "products", "p", "item", "shop"], Segment::Product),
            (&["category", "categories", "c", "collections", "tag"], Segment::Category),
            (&["docs", "documentation", "help", "guide", "api"], Segment::Docs),
            (&["privacy", "terms", "legal", "cookies", "imprint"], Segment::Legal),
        ];

        let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        for (keywords, segment) in RULES {
            if parts.iter().any(|p| keywords.contains(p)) {
                return *segment;
            }
        }
        Self::Other
    }
}

/// Cached conditional-request validators from the previous fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpHints {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl HttpHints {
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }
}

/// A crawled URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub id: i64,
    pub url_norm: String,
    /// URL as first submitted.
    pub url: String,
    pub domain_id: i64,
    pub segment: Option<Segment>,
    pub hints: HttpHints,
    pub last_status: Option<i32>,
    pub last_fetched: Option<DateTime<Utc>>,
    pub last_snapshot_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_from_url() {
        assert_eq!(Segment::from_url("https://example.com"), Segment::Home);
        assert_eq!(Segment::from_url("https://example.com/"), Segment::Home);
        assert_eq!(Segment::from_url("https://example.com/blog/my-post"), Segment::Blog);
        assert_eq!(Segment::from_url("https://example.com/Login"), Segment::Login);
        assert_eq!(Segment::from_url("https://example.com/legal/privacy"), Segment::Legal);
        assert_eq!(Segment::from_url("https://example.com/docs/api"), Segment::Docs);
        assert_eq!(Segment::from_url("https://example.com/pricing"), Segment::Other);
        assert_eq!(Segment::from_url("not a url"), Segment::Other);
    }

    #[test]
    fn test_segment_round_trip() {
        for s in ["HOME", "BLOG", "OTHER", "LEGAL"] {
            assert_eq!(Segment::from_str(s).map(|x| x.as_str()), Some(s));
        }
    }
}
