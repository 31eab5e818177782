//! On-page SEO extraction from parsed HTML.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::OnceLock;
use std::time::Instant;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use crate::utils::{host_of, is_same_site, normalize_url, resolve, sha256_hex};

/// Maximum number of link samples kept per direction.
pub const LINK_SAMPLE_CAP: usize = 50;

const TOP_KEYWORDS: usize = 10;
const H2_SAMPLES: usize = 5;

macro_rules! selector {
    ($css:expr) => {{
        static SELECTOR: OnceLock<Selector> = OnceLock::new();
        SELECTOR.get_or_init(|| Selector::parse($css).expect("static selector"))
    }};
}

fn word_regex() -> &'static Regex {
    static WORD: OnceLock<Regex> = OnceLock::new();
    WORD.get_or_init(|| Regex::new(r"\w+").expect("static regex"))
}

/// An `<link rel="alternate" hreflang>` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hreflang {
    pub lang: String,
    pub href: String,
}

/// Everything extracted from one HTML document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageAudit {
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub h1: Vec<String>,
    pub h2_count: usize,
    pub h2_samples: Vec<String>,
    pub h3_count: usize,
    pub canonical: Option<String>,
    pub robots_meta: Option<String>,
    pub lang: Option<String>,
    pub open_graph: BTreeMap<String, String>,
    pub twitter_card: BTreeMap<String, String>,
    pub hreflang: Vec<Hreflang>,
    pub hreflang_inconsistent: bool,
    pub jsonld_types: Vec<String>,
    pub jsonld_count: usize,
    pub jsonld_broken: bool,
    /// SHA-256 over the document's tag sequence.
    pub sha256_dom: String,
    pub text_len: usize,
    pub sha256_text: String,
    pub word_count: usize,
    pub top_keywords: Vec<(String, usize)>,
    pub internal_links: usize,
    pub external_links: usize,
    pub internal_samples: Vec<String>,
    pub external_samples: Vec<String>,
    pub images: usize,
    pub alt_coverage_pct: f64,
    pub parse_ms: u64,
}

impl PageAudit {
    /// Parse and audit an HTML document served from `final_url`.
    pub fn from_html(html: &str, final_url: &str) -> Self {
        let start = Instant::now();
        let document = Html::parse_document(html);
        let page_host = host_of(final_url).unwrap_or_default();

        let h1: Vec<String> = document
            .select(selector!("h1"))
            .map(|el| element_text(&el))
            .collect();
        let h2: Vec<ElementRef> = document.select(selector!("h2")).collect();
        let hreflang = extract_hreflang(&document);
        let hreflang_inconsistent = is_hreflang_inconsistent(&hreflang, final_url);
        let (jsonld_types, jsonld_count, jsonld_broken) = extract_jsonld(&document);
        let links = collect_links(&document, final_url, &page_host);
        let (images, alt_coverage_pct) = alt_coverage(&document);

        let text = visible_text(&document);
        let words: Vec<String> = word_regex()
            .find_iter(&text.to_lowercase())
            .map(|m| m.as_str().to_string())
            .filter(|w| w.chars().count() > 2)
            .collect();

        Self {
            title: document
                .select(selector!("title"))
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
                .filter(|t| !t.is_empty()),
            meta_description: meta_content(&document, selector!(r#"meta[name="description"]"#)),
            h1,
            h2_count: h2.len(),
            h2_samples: h2.iter().take(H2_SAMPLES).map(element_text).collect(),
            h3_count: document.select(selector!("h3")).count(),
            canonical: document
                .select(selector!(r#"link[rel~="canonical"][href]"#))
                .next()
                .and_then(|el| el.value().attr("href"))
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty()),
            robots_meta: meta_content(&document, selector!(r#"meta[name="robots"]"#)),
            lang: document
                .root_element()
                .value()
                .attr("lang")
                .map(str::to_string),
            open_graph: prefixed_meta(&document, selector!(r#"meta[property^="og:"]"#), "property", "og:"),
            twitter_card: prefixed_meta(
                &document,
                selector!(r#"meta[name^="twitter:"]"#),
                "name",
                "twitter:",
            ),
            hreflang,
            hreflang_inconsistent,
            jsonld_types,
            jsonld_count,
            jsonld_broken,
            sha256_dom: dom_hash(&document),
            text_len: text.chars().count(),
            sha256_text: sha256_hex(&text),
            word_count: words.len(),
            top_keywords: top_keywords(&words, TOP_KEYWORDS),
            internal_links: links.internal,
            external_links: links.external,
            internal_samples: links.internal_samples,
            external_samples: links.external_samples,
            images,
            alt_coverage_pct,
            parse_ms: start.elapsed().as_millis() as u64,
        }
    }

    pub fn has_noindex(&self) -> bool {
        self.robots_meta
            .as_deref()
            .is_some_and(|r| r.to_ascii_lowercase().contains("noindex"))
    }
}

fn element_text(el: &ElementRef) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn meta_content(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

fn prefixed_meta(
    document: &Html,
    selector: &Selector,
    key_attr: &str,
    prefix: &str,
) -> BTreeMap<String, String> {
    document
        .select(selector)
        .filter_map(|el| {
            let key = el.value().attr(key_attr)?.strip_prefix(prefix)?;
            let content = el.value().attr("content").unwrap_or_default();
            Some((key.to_string(), content.to_string()))
        })
        .collect()
}

fn extract_hreflang(document: &Html) -> Vec<Hreflang> {
    document
        .select(selector!(r#"link[rel~="alternate"][hreflang]"#))
        .map(|el| Hreflang {
            lang: el.value().attr("hreflang").unwrap_or_default().to_string(),
            href: el.value().attr("href").unwrap_or_default().to_string(),
        })
        .collect()
}

/// Alternates exist but none of them points back at the page itself.
fn is_hreflang_inconsistent(hreflang: &[Hreflang], final_url: &str) -> bool {
    if hreflang.is_empty() {
        return false;
    }
    let own = normalize_url(final_url);
    !hreflang.iter().any(|h| {
        let absolute = resolve(final_url, &h.href).unwrap_or_else(|| h.href.clone());
        normalize_url(&absolute) == own
    })
}

/// Returns `(types, block_count, broken)`.
fn extract_jsonld(document: &Html) -> (Vec<String>, usize, bool) {
    let mut types = Vec::new();
    let mut count = 0;
    let mut broken = false;

    for script in document.select(selector!(r#"script[type="application/ld+json"]"#)) {
        count += 1;
        let raw: String = script.text().collect();
        if raw.trim().is_empty() {
            broken = true;
            continue;
        }
        match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(serde_json::Value::Object(obj)) => {
                collect_types(obj.get("@type"), &mut types);
                if let Some(serde_json::Value::Array(graph)) = obj.get("@graph") {
                    for item in graph {
                        collect_types(item.get("@type"), &mut types);
                    }
                }
            }
            Ok(serde_json::Value::Array(items)) => {
                for item in &items {
                    collect_types(item.get("@type"), &mut types);
                }
            }
            Ok(_) => {}
            Err(_) => broken = true,
        }
    }

    (types, count, broken)
}

fn collect_types(value: Option<&serde_json::Value>, out: &mut Vec<String>) {
    match value {
        Some(serde_json::Value::String(t)) => out.push(t.clone()),
        Some(serde_json::Value::Array(ts)) => {
            out.extend(ts.iter().filter_map(|t| t.as_str()).map(str::to_string))
        }
        _ => {}
    }
}

fn dom_hash(document: &Html) -> String {
    let tags: Vec<&str> = document
        .root_element()
        .descendants()
        .filter_map(|node| node.value().as_element().map(|e| e.name()))
        .collect();
    sha256_hex(tags.join("|"))
}

/// Concatenated text of the document outside `<script>` and `<style>`.
fn visible_text(document: &Html) -> String {
    let mut text = String::new();
    for node in document.root_element().descendants() {
        let Some(t) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| matches!(e.name(), "script" | "style"))
        });
        if !hidden {
            text.push_str(t);
        }
    }
    text
}

/// Most frequent words, ties broken by first occurrence.
fn top_keywords(words: &[String], n: usize) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (idx, w) in words.iter().enumerate() {
        counts.entry(w.as_str()).or_insert((0, idx)).0 += 1;
    }
    let mut ranked: Vec<(&str, usize, usize)> =
        counts.into_iter().map(|(w, (c, first))| (w, c, first)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked
        .into_iter()
        .take(n)
        .map(|(w, c, _)| (w.to_string(), c))
        .collect()
}

struct LinkSummary {
    internal: usize,
    external: usize,
    internal_samples: Vec<String>,
    external_samples: Vec<String>,
}

fn collect_links(document: &Html, final_url: &str, page_host: &str) -> LinkSummary {
    let mut internal = 0;
    let mut external = 0;
    let mut internal_set = BTreeSet::new();
    let mut external_set = BTreeSet::new();

    for a in document.select(selector!("a[href]")) {
        let href = a.value().attr("href").unwrap_or_default().trim();
        if href.is_empty()
            || href.starts_with('#')
            || href.starts_with("javascript:")
            || href.starts_with("mailto:")
            || href.starts_with("tel:")
        {
            continue;
        }

        let absolute = if href.starts_with("http") {
            href.to_string()
        } else {
            resolve(final_url, href).unwrap_or_else(|| href.to_string())
        };
        let is_internal = match host_of(&absolute) {
            Some(host) => is_same_site(&host, page_host),
            None => true,
        };

        if is_internal {
            internal += 1;
            internal_set.insert(absolute);
        } else {
            external += 1;
            external_set.insert(absolute);
        }
    }

    LinkSummary {
        internal,
        external,
        internal_samples: internal_set.into_iter().take(LINK_SAMPLE_CAP).collect(),
        external_samples: external_set.into_iter().take(LINK_SAMPLE_CAP).collect(),
    }
}

/// Returns `(image_count, alt_coverage_pct)` with one decimal place.
fn alt_coverage(document: &Html) -> (usize, f64) {
    let mut total = 0;
    let mut with_alt = 0;
    for img in document.select(selector!("img")) {
        total += 1;
        if img
            .value()
            .attr("alt")
            .is_some_and(|alt| !alt.trim().is_empty())
        {
            with_alt += 1;
        }
    }
    if total == 0 {
        return (0, 0.0);
    }
    let pct = (with_alt as f64 / total as f64 * 1000.0).round() / 10.0;
    (total, pct)
}
