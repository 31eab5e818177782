//! Server stack fingerprint from response headers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// What the response headers reveal about the serving stack.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderFingerprint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub powered_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cdn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<String>,
    pub hsts: bool,
}

/// Header name markers that identify a CDN, checked in order.
const CDN_HEADER_MARKERS: &[(&str, &str)] = &[
    ("cf-ray", "cloudflare"),
    ("x-amz-cf-id", "cloudfront"),
    ("x-fastly-request-id", "fastly"),
    ("x-akamai-transformed", "akamai"),
    ("x-vercel-id", "vercel"),
    ("x-nf-request-id", "netlify"),
];

impl HeaderFingerprint {
    /// Build from lowercased response headers.
    pub fn from_headers(headers: &HashMap<String, String>) -> Self {
        let server = headers.get("server").cloned();
        let via = headers.get("via").map(|v| v.to_ascii_lowercase());

        let cdn = CDN_HEADER_MARKERS
            .iter()
            .find(|(name, _)| headers.contains_key(*name))
            .map(|(_, cdn)| cdn.to_string())
            .or_else(|| {
                let server = server.as_deref().map(str::to_ascii_lowercase);
                ["cloudflare", "cloudfront", "fastly", "akamai", "vercel", "netlify"]
                    .into_iter()
                    .find(|cdn| {
                        server.as_deref().is_some_and(|s| s.contains(cdn))
                            || via.as_deref().is_some_and(|v| v.contains(cdn))
                    })
                    .map(str::to_string)
            });

        Self {
            server,
            powered_by: headers.get("x-powered-by").cloned(),
            cdn,
            cache_control: headers.get("cache-control").cloned(),
            hsts: headers.contains_key("strict-transport-security"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_cloudflare_by_header() {
        let fp = HeaderFingerprint::from_headers(&headers(&[
            ("server", "cloudflare"),
            ("cf-ray", "abc-LAX"),
            ("strict-transport-security", "max-age=31536000"),
        ]));
        assert_eq!(fp.cdn.as_deref(), Some("cloudflare"));
        assert!(fp.hsts);
    }

    #[test]
    fn test_cdn_from_via() {
        let fp = HeaderFingerprint::from_headers(&headers(&[
            ("via", "1.1 abcdef.cloudfront.net (CloudFront)"),
            ("x-powered-by", "Next.js"),
        ]));
        assert_eq!(fp.cdn.as_deref(), Some("cloudfront"));
        assert_eq!(fp.powered_by.as_deref(), Some("Next.js"));
        assert!(!fp.hsts);
    }

    #[test]
    fn test_no_cdn() {
        let fp = HeaderFingerprint::from_headers(&headers(&[("server", "nginx")]));
        assert_eq!(fp.server.as_deref(), Some("nginx"));
        assert_eq!(fp.cdn, None);
    }
}
