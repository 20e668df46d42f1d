//! Article field extraction.
//!
//! Article markup is as inconsistent as the sitemaps that point at it, so
//! every field is resolved through an ordered fallback chain; the first
//! strategy to produce a value wins:
//!
//! - **Title**: the document `<title>`, trimmed.
//! - **Body**: the site's configured content container → the generic
//!   `div.article-content` → all `<p>` texts, deduplicated in first-seen
//!   order and joined with [`BODY_DELIMITER`] → the whole `<body>` text.
//!   Deduplication defends against pages that render the same fragment twice
//!   (mobile and desktop layout blocks).
//! - **Published date**: `article:published_time` meta → `<time>` machine
//!   attribute or text → JSON-LD (`datePublished`/`dateModified`, single
//!   object or list) → the sitemap-supplied `lastmod` → `"unknown"`.
//!
//! Extraction is a pure function of the fetched markup and never fails; an
//! exhausted chain produces the documented default instead.

use crate::cutoff::parse_timestamp;
use crate::models::{ArticleRecord, UNKNOWN_DATE};
use crate::sites::{DateStyle, SiteConfig};
use itertools::Itertools;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::warn;

/// Joins body segments; chosen because it cannot appear in natural text.
pub const BODY_DELIMITER: &str = "||";

static TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());
static ARTICLE_CONTENT_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.article-content").unwrap());
static PARAGRAPH_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());
static BODY_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("body").unwrap());
static META_PUBLISHED_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="article:published_time"]"#).unwrap());
static TIME_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("time").unwrap());
static JSON_LD_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).unwrap());

/// Per-job extraction knobs, derived from the site configuration once.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Compiled site-specific content container selector, when configured
    /// and valid.
    pub body_selector: Option<Selector>,
    pub date_style: DateStyle,
}

impl ExtractOptions {
    pub fn from_site(site: &SiteConfig) -> Self {
        let body_selector = site.body_selector.as_deref().and_then(|raw| {
            match Selector::parse(raw) {
                Ok(sel) => Some(sel),
                Err(e) => {
                    warn!(site = %site.name, selector = raw, error = %e, "Invalid body selector; using generic fallbacks");
                    None
                }
            }
        });
        Self {
            body_selector,
            date_style: site.date_style,
        }
    }
}

/// Extract one [`ArticleRecord`] from fetched article markup.
pub fn extract_article(
    html: &str,
    url: &str,
    sitemap_lastmod: Option<&str>,
    opts: &ExtractOptions,
) -> ArticleRecord {
    let document = Html::parse_document(html);

    let title = document
        .select(&TITLE_SELECTOR)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default();

    let body = extract_body(&document, opts);

    let published_at = extract_date(&document, sitemap_lastmod)
        .map(|raw| normalize_date(&raw, opts.date_style))
        .unwrap_or_else(|| UNKNOWN_DATE.to_string());

    ArticleRecord {
        source_url: url.to_string(),
        title,
        body,
        published_at,
    }
}

fn extract_body(document: &Html, opts: &ExtractOptions) -> String {
    if let Some(selector) = &opts.body_selector {
        if let Some(text) = container_text(document, selector) {
            return text;
        }
    }

    if let Some(text) = container_text(document, &ARTICLE_CONTENT_SELECTOR) {
        return text;
    }

    let paragraphs = document
        .select(&PARAGRAPH_SELECTOR)
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty())
        .unique()
        .join(BODY_DELIMITER);
    if !paragraphs.is_empty() {
        return paragraphs;
    }

    container_text(document, &BODY_SELECTOR).unwrap_or_default()
}

fn container_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .next()
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty())
}

fn extract_date(document: &Html, sitemap_lastmod: Option<&str>) -> Option<String> {
    if let Some(content) = document
        .select(&META_PUBLISHED_SELECTOR)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        return Some(content.to_string());
    }

    if let Some(time) = document.select(&TIME_SELECTOR).next() {
        if let Some(datetime) = time.value().attr("datetime").map(str::trim).filter(|s| !s.is_empty()) {
            return Some(datetime.to_string());
        }
        let text = time.text().collect::<String>().trim().to_string();
        if !text.is_empty() {
            return Some(text);
        }
    }

    for script in document.select(&JSON_LD_SELECTOR) {
        let raw = script.text().collect::<String>();
        let Ok(value) = serde_json::from_str::<Value>(&raw) else {
            continue;
        };
        if let Some(date) = json_ld_date(&value) {
            return Some(date);
        }
    }

    sitemap_lastmod
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Pull `datePublished`/`dateModified` out of a JSON-LD value, unwrapping
/// either a single object or a list of objects.
fn json_ld_date(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => map
            .get("datePublished")
            .or_else(|| map.get("dateModified"))
            .and_then(Value::as_str)
            .map(str::to_string),
        Value::Array(items) => items.iter().find_map(json_ld_date),
        _ => None,
    }
}

fn normalize_date(raw: &str, style: DateStyle) -> String {
    match style {
        DateStyle::Raw => raw.trim().to_string(),
        DateStyle::Canonical => match parse_timestamp(raw) {
            Some(dt) => dt.format("%Y-%m-%d").to_string(),
            None => raw.trim().to_string(),
        },
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().join(" ")
}
