//! Fetched page wrapper.

use std::collections::HashMap;

use reqwest::StatusCode;

use crate::models::RedirectHop;

/// A fully read response after redirects were followed.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: StatusCode,
    /// Header names are lowercased.
    pub headers: HashMap<String, String>,
    pub final_url: String,
    pub redirect_chain: Vec<RedirectHop>,
    pub body: Vec<u8>,
    pub fetch_ms: u64,
}

impl FetchedPage {
    /// Check if the response is 304 Not Modified.
    pub fn is_not_modified(&self) -> bool {
        self.status == StatusCode::NOT_MODIFIED
    }

    /// Get the ETag header.
    pub fn etag(&self) -> Option<&str> {
        self.headers.get("etag").map(|s| s.as_str())
    }

    /// Get the Last-Modified header.
    pub fn last_modified(&self) -> Option<&str> {
        self.headers.get("last-modified").map(|s| s.as_str())
    }

    /// Get the Content-Type header.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(|s| s.as_str())
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
