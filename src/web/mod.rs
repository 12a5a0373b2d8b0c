//! Web search and scrape collaborator.
//!
//! DuckDuckGo Lite search returning up to five distinct result URLs, and
//! a readable-text scraper that extracts from a page's primary content
//! container. Both operations cache per key for a fixed window so repeat
//! calls inside it never refetch. HTTP transport sits behind the
//! [`HttpFetch`] seam so tests run without a network.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use moka::sync::Cache;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::info;

use crate::config::WebConfig;
use crate::error::{WebError, WebResult};

/// Tags whose content never counts as readable text.
const DENY_TAGS: [&str; 5] = ["script", "style", "meta", "link", "noscript"];

/// Minimum chunk length; shorter fragments are navigation noise.
const MIN_CHUNK_CHARS: usize = 40;

/// Maximum number of paragraph-like chunks taken from one page.
const MAX_CHUNKS: usize = 6;

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));
static RESULT_LINKS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"a.result-link[href*="uddg="]"#).expect("valid result-link selector")
});
static ARTICLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("article").expect("valid article selector"));
static BODY: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body").expect("valid body selector"));
static CHUNKS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("p, h1, h2, h3, li").expect("valid chunk selector"));

/// Blocking HTTP transport seam.
pub trait HttpFetch: Send + Sync {
    fn get(&self, url: &str) -> WebResult<String>;
}

/// Production transport over reqwest's blocking client.
pub struct ReqwestFetcher {
    client: reqwest::blocking::Client,
}

impl ReqwestFetcher {
    pub fn new(user_agent: &str) -> WebResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(user_agent.to_string())
            .build()
            .map_err(|e| WebError::Client {
                reason: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

impl HttpFetch for ReqwestFetcher {
    fn get(&self, url: &str) -> WebResult<String> {
        let response = self.client.get(url).send().map_err(|e| WebError::Http {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(WebError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response.text().map_err(|e| WebError::Http {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Search + scrape service with per-key TTL caches.
pub struct WebSearchService {
    fetcher: Arc<dyn HttpFetch>,
    search_cache: Cache<String, Vec<String>>,
    scrape_cache: Cache<String, String>,
    max_results: usize,
    scrape_max_chars: usize,
}

impl WebSearchService {
    pub fn new(fetcher: Arc<dyn HttpFetch>, config: &WebConfig) -> Self {
        let ttl = Duration::from_secs(config.cache_ttl_secs.max(1));
        Self {
            fetcher,
            search_cache: Cache::builder()
                .max_capacity(1_000)
                .time_to_live(ttl)
                .build(),
            scrape_cache: Cache::builder()
                .max_capacity(1_000)
                .time_to_live(ttl)
                .build(),
            max_results: config.max_results,
            scrape_max_chars: config.scrape_max_chars,
        }
    }

    /// Up to `max_results` distinct result URLs for a query, cached per
    /// query for the configured window.
    pub fn search(&self, query: &str) -> WebResult<Vec<String>> {
        if let Some(hits) = self.search_cache.get(query) {
            return Ok(hits);
        }
        let encoded = serde_urlencoded::to_string([("q", query)]).map_err(|e| {
            WebError::InvalidUrl {
                url: query.to_string(),
                reason: e.to_string(),
            }
        })?;
        let url = format!("https://lite.duckduckgo.com/lite/?{encoded}");
        let html = self.fetcher.get(&url)?;
        let hits = extract_result_urls(&html, self.max_results);
        info!(query, results = hits.len(), "web search completed");
        self.search_cache.insert(query.to_string(), hits.clone());
        Ok(hits)
    }

    /// Readable text of one page, cached per URL for the configured window.
    pub fn scrape(&self, url: &str) -> WebResult<String> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(WebError::InvalidUrl {
                url: url.to_string(),
                reason: "absolute http(s) URL required".to_string(),
            });
        }
        if let Some(text) = self.scrape_cache.get(url) {
            return Ok(text);
        }
        let html = self.fetcher.get(url)?;
        let text = extract_readable_text(&html, self.scrape_max_chars);
        info!(url, chars = text.len(), "page scraped");
        self.scrape_cache.insert(url.to_string(), text.clone());
        Ok(text)
    }
}

/// Pull distinct result URLs out of a DuckDuckGo Lite page. Result links
/// carry the destination percent-encoded in their `uddg` parameter.
pub fn extract_result_urls(html: &str, max_results: usize) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut urls: Vec<String> = Vec::new();
    for anchor in document.select(&RESULT_LINKS) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Some(query) = href.split_once('?').map(|(_, q)| q) else {
            continue;
        };
        let Ok(pairs) = serde_urlencoded::from_str::<Vec<(String, String)>>(query) else {
            continue;
        };
        let Some(target) = pairs.into_iter().find(|(k, _)| k == "uddg").map(|(_, v)| v) else {
            continue;
        };
        if !target.is_empty() && !urls.contains(&target) {
            urls.push(target);
        }
        if urls.len() == max_results {
            break;
        }
    }
    urls
}

/// Extract readable text: the `<article>` container when one exists (body
/// otherwise), paragraph-like chunks over 40 chars, at most six, with
/// deny-listed tag content removed, whitespace-normalized, capped.
pub fn extract_readable_text(html: &str, max_chars: usize) -> String {
    let document = Html::parse_document(html);
    let root = document
        .select(&ARTICLE)
        .next()
        .or_else(|| document.select(&BODY).next())
        .unwrap_or_else(|| document.root_element());

    let mut chunks: Vec<String> = Vec::new();
    for node in root.select(&CHUNKS) {
        let mut raw = String::new();
        filtered_text(node, &mut raw);
        let cleaned = WHITESPACE.replace_all(raw.trim(), " ").into_owned();
        if cleaned.chars().count() > MIN_CHUNK_CHARS {
            chunks.push(cleaned);
        }
        if chunks.len() == MAX_CHUNKS {
            break;
        }
    }

    let joined = chunks.join(" ");
    let text = WHITESPACE.replace_all(joined.trim(), " ");
    if text.chars().count() > max_chars {
        text.chars().take(max_chars).collect()
    } else {
        text.into_owned()
    }
}

/// Text content of an element, excluding deny-listed descendants.
fn filtered_text(element: ElementRef, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(node) = child.value().as_element() {
            if !DENY_TAGS.contains(&node.name()) {
                if let Some(child_ref) = ElementRef::wrap(child) {
                    filtered_text(child_ref, out);
                }
            }
        }
    }
}
