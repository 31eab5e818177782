//! URL normalization and host helpers.

use url::form_urlencoded;
use url::Url;

/// Query parameters that only carry campaign/click tracking.
const TRACKING_PARAMS: &[&str] = &[
    "gclid", "fbclid", "msclkid", "dclid", "yclid", "mc_cid", "mc_eid", "_ga", "_gl",
];

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

/// Canonicalize a URL into the key used for page deduplication.
///
/// Lowercases scheme and host, drops default ports, tracking parameters and
/// the fragment, and trims trailing slashes from the path. Anything that is
/// not an absolute http(s) URL is returned trimmed but otherwise untouched.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let parsed = match Url::parse(trimmed) {
        Ok(u) if matches!(u.scheme(), "http" | "https") => u,
        _ => return trimmed.to_string(),
    };

    let host = match parsed.host_str() {
        Some(h) => h.to_ascii_lowercase(),
        None => return trimmed.to_string(),
    };

    let mut out = format!("{}://{}", parsed.scheme(), host);
    if let Some(port) = parsed.port() {
        out.push_str(&format!(":{}", port));
    }

    out.push_str(parsed.path().trim_end_matches('/'));

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if !kept.is_empty() {
        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(kept.iter())
            .finish();
        out.push('?');
        out.push_str(&query);
    }

    out
}

/// Lowercased host of a URL, if it has one.
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url.trim())
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
}

/// True when `host` is `base` or one of its subdomains.
pub fn is_same_site(host: &str, base: &str) -> bool {
    host == base || host.ends_with(&format!(".{}", base))
}

/// Resolve an href against the page URL it was found on.
pub fn resolve(base: &str, href: &str) -> Option<String> {
    let base = Url::parse(base).ok()?;
    base.join(href.trim()).ok().map(|u| u.to_string())
}
