//! HTTP client with conditional requests and manual redirect capture.

mod fingerprint;
mod response;
mod user_agent;

pub use fingerprint::HeaderFingerprint;
pub use response::FetchedPage;
pub use user_agent::{resolve_user_agent, BOT_USER_AGENT, USER_AGENT};

use std::collections::HashMap;
use std::time::{Duration, Instant};

use reqwest::header::{IF_MODIFIED_SINCE, IF_NONE_MATCH, LOCATION};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::models::{HttpHints, RedirectHop};

/// Errors from fetching a URL.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("timeout: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("too many redirects (more than {max}) from {url}")]
    TooManyRedirects { url: String, max: usize },

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP error: {0}")]
    Http(String),
}

impl FetchError {
    /// Transient failures are worth retrying later.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Connect(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else if e.is_builder() {
            Self::InvalidUrl(e.to_string())
        } else {
            Self::Http(e.to_string())
        }
    }
}

/// HTTP fetcher for page audits.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    max_redirects: usize,
}

impl HttpClient {
    /// Create a new HTTP client.
    ///
    /// Redirects are never followed by reqwest itself so that each hop can
    /// be recorded.
    pub fn new(
        user_agent: Option<&str>,
        timeout: Duration,
        max_redirects: usize,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(resolve_user_agent(user_agent))
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| FetchError::Http(e.to_string()))?;

        Ok(Self {
            client,
            max_redirects,
        })
    }

    /// GET a URL, sending conditional headers from `hints` and following
    /// up to `max_redirects` redirects.
    pub async fn fetch(&self, url: &str, hints: &HttpHints) -> Result<FetchedPage, FetchError> {
        let mut current =
            Url::parse(url.trim()).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", url, e)))?;
        if !matches!(current.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl(format!(
                "{}: unsupported scheme {}",
                url,
                current.scheme()
            )));
        }

        let mut redirect_chain = Vec::new();
        let start = Instant::now();

        loop {
            let mut request = self.client.get(current.clone());
            if let Some(etag) = hints.etag.as_deref() {
                request = request.header(IF_NONE_MATCH, etag);
            }
            if let Some(lm) = hints.last_modified.as_deref() {
                request = request.header(IF_MODIFIED_SINCE, lm);
            }

            let response = request.send().await?;
            let status = response.status();

            if status.is_redirection() && status != StatusCode::NOT_MODIFIED {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                if let Some(location) = location {
                    if redirect_chain.len() >= self.max_redirects {
                        return Err(FetchError::TooManyRedirects {
                            url: url.to_string(),
                            max: self.max_redirects,
                        });
                    }
                    let next = current.join(&location).map_err(|e| {
                        FetchError::InvalidUrl(format!("redirect to {}: {}", location, e))
                    })?;
                    debug!("{} {} -> {}", status.as_u16(), current, next);
                    redirect_chain.push(RedirectHop {
                        status: status.as_u16(),
                        url: current.to_string(),
                    });
                    current = next;
                    continue;
                }
            }

            let mut headers = HashMap::new();
            for (name, value) in response.headers() {
                if let Ok(v) = value.to_str() {
                    headers.insert(name.as_str().to_ascii_lowercase(), v.to_string());
                }
            }

            let body = response.bytes().await?.to_vec();
            let fetch_ms = start.elapsed().as_millis() as u64;

            return Ok(FetchedPage {
                status,
                headers,
                final_url: current.to_string(),
                redirect_chain,
                body,
                fetch_ms,
            });
        }
    }
}
