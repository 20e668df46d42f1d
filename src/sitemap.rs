//! Sitemap discovery.
//!
//! Real-world sitemaps are unreliable: strict XML one day, malformed markup
//! the next, sometimes a rendered HTML table behind a challenge page. A
//! document is therefore run through extraction strategies in fixed priority
//! order, taking the first one that yields anything:
//!
//! 1. Strict XML parse (`<loc>` elements, sibling `<lastmod>` attached)
//! 2. Lenient HTML-parser pass over the same markup, for documents strict
//!    parsers reject
//! 3. Raw-text URL scan filtered to sitemap-looking tokens, a last-resort
//!    recovery applied only to the document at the root/index position
//! 4. HTML table fallback: first column is the URL, a per-site column index
//!    holds the modification date
//!
//! Entries whose URL names another sitemap file are child sitemaps to
//! descend into; everything else is an article candidate. The crawl job owns
//! the visited-set that keeps a sitemap listing itself from recursing
//! forever.

use crate::fetch::{FetchError, ResilientFetcher, SessionFactory};
use crate::models::SitemapEntry;
use once_cell::sync::Lazy;
use quick_xml::Reader;
use quick_xml::events::Event;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};
use url::Url;

/// Matches URLs whose last path segment names a sitemap file.
static SITEMAP_FILE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[^/]*sitemap[^/]*\.xml(?:\?[^/]*)?$").unwrap());

/// Bare URL tokens for the raw-text scan.
static RAW_URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"https?://[^\s"'<>]+"#).unwrap());

/// One resolved sitemap document, split into child sitemaps and article
/// candidates. Entry order follows document order.
#[derive(Debug, Default)]
pub struct SitemapDocument {
    pub url: String,
    pub children: Vec<SitemapEntry>,
    pub articles: Vec<SitemapEntry>,
}

/// Whether `url` looks like a sitemap file rather than an article page.
pub fn is_sitemap_like(url: &str) -> bool {
    SITEMAP_FILE_RE.is_match(url)
}

/// Fetch and resolve one sitemap document.
///
/// `allow_raw_scan` enables strategy 3 and is set only for the root
/// document; child sitemaps are leaf article lists where a bare URL scan
/// would misfire. An unrecognized document resolves to an empty
/// [`SitemapDocument`] with a diagnostic, never an error.
pub async fn resolve_document<F: SessionFactory>(
    fetcher: &mut ResilientFetcher<F>,
    url: &str,
    table_lastmod_column: usize,
    allow_raw_scan: bool,
) -> Result<SitemapDocument, FetchError> {
    let text = fetcher.fetch(url).await?;
    Ok(classify_document(
        url,
        &text,
        table_lastmod_column,
        allow_raw_scan,
    ))
}

/// Pure half of [`resolve_document`]: run the strategy chain over fetched
/// markup and split the result.
pub fn classify_document(
    doc_url: &str,
    text: &str,
    table_lastmod_column: usize,
    allow_raw_scan: bool,
) -> SitemapDocument {
    let mut entries = parse_strict_xml(text);
    let mut strategy = "strict-xml";

    if entries.is_empty() {
        entries = parse_lenient_html(text);
        strategy = "lenient-html";
    }
    if entries.is_empty() && allow_raw_scan {
        entries = scan_raw_urls(text);
        strategy = "raw-scan";
    }
    if entries.is_empty() {
        entries = parse_table(text, table_lastmod_column);
        strategy = "table";
    }

    let entries = absolutize(doc_url, entries);

    if entries.is_empty() {
        warn!(url = %doc_url, "No sitemap strategy yielded entries");
    } else {
        debug!(url = %doc_url, strategy, count = entries.len(), "Resolved sitemap document");
    }

    let mut doc = SitemapDocument {
        url: doc_url.to_string(),
        ..Default::default()
    };
    for entry in entries {
        if is_sitemap_like(&entry.url) {
            doc.children.push(entry);
        } else {
            doc.articles.push(entry);
        }
    }
    doc
}

/// Strategy 1: strict XML event parse.
///
/// Collects `<loc>` text, attaching the `<lastmod>` sibling when the loc
/// sits inside a `<url>`/`<sitemap>` container. A malformed document yields
/// nothing so the lenient strategies get their turn.
fn parse_strict_xml(text: &str) -> Vec<SitemapEntry> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut in_container = false;
    let mut in_loc = false;
    let mut in_lastmod = false;
    let mut loc: Option<String> = None;
    let mut lastmod: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"url" | b"sitemap" => {
                    in_container = true;
                    loc = None;
                    lastmod = None;
                }
                b"loc" => in_loc = true,
                b"lastmod" => in_lastmod = true,
                _ => {}
            },
            Ok(Event::Text(t)) => {
                if let Ok(value) = t.xml_content() {
                    if in_loc {
                        loc = Some(value.trim().to_string());
                    } else if in_lastmod {
                        lastmod = Some(value.trim().to_string());
                    }
                }
            }
            Ok(Event::CData(t)) => {
                let value = String::from_utf8_lossy(t.into_inner().as_ref()).into_owned();
                if in_loc {
                    loc = Some(value.trim().to_string());
                } else if in_lastmod {
                    lastmod = Some(value.trim().to_string());
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"loc" => {
                    in_loc = false;
                    // Naked loc without a container, push right away.
                    if !in_container {
                        if let Some(url) = loc.take() {
                            entries.push(SitemapEntry::new(url, None));
                        }
                    }
                }
                b"lastmod" => in_lastmod = false,
                b"url" | b"sitemap" => {
                    if let Some(url) = loc.take() {
                        entries.push(SitemapEntry::new(url, lastmod.take()));
                    }
                    in_container = false;
                    lastmod = None;
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            // Strict means strict: a parse error invalidates the whole
            // strategy, not just the remainder of the document.
            Err(_) => return Vec::new(),
        }
    }

    prune(entries)
}

/// Strategy 2: run the markup through the HTML parser and pull `loc`
/// elements out of whatever tree it builds.
fn parse_lenient_html(text: &str) -> Vec<SitemapEntry> {
    let document = Html::parse_document(text);
    let loc_selector = Selector::parse("loc").unwrap();
    let lastmod_selector = Selector::parse("lastmod").unwrap();

    let mut entries = Vec::new();
    for loc in document.select(&loc_selector) {
        let url = loc.text().collect::<String>().trim().to_string();
        let lastmod = loc
            .parent()
            .and_then(ElementRef::wrap)
            .filter(|parent| {
                let name = parent.value().name();
                name == "url" || name == "sitemap"
            })
            .and_then(|parent| parent.select(&lastmod_selector).next())
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|s| !s.is_empty());
        entries.push(SitemapEntry::new(url, lastmod));
    }
    prune(entries)
}

/// Strategy 3: raw-text scan for sitemap-looking URLs, first-seen order.
fn scan_raw_urls(text: &str) -> Vec<SitemapEntry> {
    let mut seen = std::collections::HashSet::new();
    let mut entries = Vec::new();
    for m in RAW_URL_RE.find_iter(text) {
        let token = m.as_str();
        let lower = token.to_lowercase();
        if !(lower.contains("sitemap") || lower.ends_with(".xml")) {
            continue;
        }
        if seen.insert(token.to_string()) {
            entries.push(SitemapEntry::new(token, None));
        }
    }
    prune(entries)
}

/// Strategy 4: rendered HTML table, first column URL, configured column
/// holding the modification date.
fn parse_table(text: &str, lastmod_column: usize) -> Vec<SitemapEntry> {
    let document = Html::parse_document(text);
    let table_selector = Selector::parse("table").unwrap();
    let row_selector = Selector::parse("tr").unwrap();
    let cell_selector = Selector::parse("td").unwrap();

    let Some(table) = document.select(&table_selector).next() else {
        return Vec::new();
    };

    let mut entries = Vec::new();
    for row in table.select(&row_selector) {
        let cells: Vec<_> = row.select(&cell_selector).collect();
        // Header rows use <th> and produce no cells here.
        let Some(first) = cells.first() else { continue };
        let url = first.text().collect::<String>().trim().to_string();
        let lastmod = cells
            .get(lastmod_column)
            .map(|c| c.text().collect::<String>().trim().to_string())
            .filter(|s| !s.is_empty());
        entries.push(SitemapEntry::new(url, lastmod));
    }
    prune(entries)
}

/// Drop entries with empty/whitespace URLs.
fn prune(entries: Vec<SitemapEntry>) -> Vec<SitemapEntry> {
    entries
        .into_iter()
        .filter(|e| !e.url.trim().is_empty())
        .collect()
}

/// Resolve relative entry URLs against the document URL.
fn absolutize(doc_url: &str, entries: Vec<SitemapEntry>) -> Vec<SitemapEntry> {
    let base = Url::parse(doc_url).ok();
    entries
        .into_iter()
        .map(|mut entry| {
            if Url::parse(&entry.url).is_err() {
                if let Some(joined) = base.as_ref().and_then(|b| b.join(&entry.url).ok()) {
                    entry.url = joined.to_string();
                }
            }
            entry
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const URLSET: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url>
    <loc>https://example.com/news/alpha</loc>
    <lastmod>2025-08-01T10:00:00Z</lastmod>
  </url>
  <url>
    <loc>https://example.com/news/beta</loc>
  </url>
</urlset>"#;

    const INDEX: &str = r#"<?xml version="1.0"?>
<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <sitemap>
    <loc>https://example.com/post-sitemap1.xml</loc>
    <lastmod>2025-08-02</lastmod>
  </sitemap>
  <sitemap>
    <loc>https://example.com/post-sitemap2.xml</loc>
  </sitemap>
</sitemapindex>"#;

    #[test]
    fn test_strict_xml_with_lastmod() {
        let entries = parse_strict_xml(URLSET);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].url, "https://example.com/news/alpha");
        assert_eq!(entries[0].last_modified.as_deref(), Some("2025-08-01T10:00:00Z"));
        assert_eq!(entries[1].last_modified, None);
    }

    #[test]
    fn test_strict_xml_cdata_loc() {
        let xml = r#"<urlset><url><loc><![CDATA[https://example.com/a]]></loc></url></urlset>"#;
        let entries = parse_strict_xml(xml);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].url, "https://example.com/a");
    }

    #[test]
    fn test_malformed_xml_recovers_via_lenient_parse() {
        let broken = "<urlset><url><loc>https://example.com/a</loc><url></urlset>";
        assert!(parse_strict_xml(broken).is_empty());
        let doc = classify_document("https://example.com/sitemap.xml", broken, 1, false);
        assert_eq!(doc.articles.len(), 1);
    }

    #[test]
    fn test_lenient_html_parse() {
        let soup = "<html><urlset><url><loc>https://example.com/a</loc>\
                    <lastmod>2025-07-01</lastmod></url></urlset>";
        let entries = parse_lenient_html(soup);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].last_modified.as_deref(), Some("2025-07-01"));
    }

    #[test]
    fn test_raw_scan_filters_to_sitemap_tokens() {
        let text = r#"garbage <a href="https://example.com/about"> and
            https://example.com/post-sitemap1.xml plus
            https://example.com/post-sitemap1.xml again and
            https://example.com/feed.xml"#;
        let entries = scan_raw_urls(text);
        let urls: Vec<_> = entries.iter().map(|e| e.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://example.com/post-sitemap1.xml",
                "https://example.com/feed.xml"
            ]
        );
    }

    #[test]
    fn test_raw_scan_only_for_root() {
        let text = "nothing structured, just https://example.com/post-sitemap1.xml";
        let root = classify_document("https://example.com/sitemap_index.xml", text, 1, true);
        assert_eq!(root.children.len(), 1);
        let child = classify_document("https://example.com/post-sitemap1.xml", text, 1, false);
        assert!(child.children.is_empty());
        assert!(child.articles.is_empty());
    }

    #[test]
    fn test_table_fallback_with_column_config() {
        let html = r#"<html><body><table>
            <tr><th>URL</th><th>Type</th><th>Modified</th></tr>
            <tr><td>https://example.com/a</td><td>article</td><td>2025-08-01</td></tr>
            <tr><td>https://example.com/b</td><td>article</td><td></td></tr>
        </table></body></html>"#;
        let entries = parse_table(html, 2);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].last_modified.as_deref(), Some("2025-08-01"));
        assert_eq!(entries[1].last_modified, None);

        // With the wrong column the date lands on a different cell.
        let entries = parse_table(html, 1);
        assert_eq!(entries[0].last_modified.as_deref(), Some("article"));
    }

    #[test]
    fn test_index_classification() {
        let doc = classify_document("https://example.com/sitemap_index.xml", INDEX, 1, true);
        assert_eq!(doc.children.len(), 2);
        assert!(doc.articles.is_empty());
        assert_eq!(doc.children[0].last_modified.as_deref(), Some("2025-08-02"));
    }

    #[test]
    fn test_mixed_index_keeps_article_candidates() {
        let xml = r#"<sitemapindex>
            <sitemap><loc>https://example.com/post-sitemap1.xml</loc></sitemap>
            <sitemap><loc>https://example.com/news/direct-story</loc></sitemap>
        </sitemapindex>"#;
        let doc = classify_document("https://example.com/sitemap_index.xml", xml, 1, false);
        assert_eq!(doc.children.len(), 1);
        assert_eq!(doc.articles.len(), 1);
        assert_eq!(doc.articles[0].url, "https://example.com/news/direct-story");
    }

    #[test]
    fn test_no_strategy_yields_empty_document() {
        let doc = classify_document("https://example.com/sitemap.xml", "<html>nothing here</html>", 1, true);
        assert!(doc.children.is_empty());
        assert!(doc.articles.is_empty());
    }

    #[test]
    fn test_urls_never_empty() {
        let xml = r#"<urlset>
            <url><loc>   </loc></url>
            <url><loc>https://example.com/a</loc></url>
        </urlset>"#;
        let doc = classify_document("https://example.com/sitemap.xml", xml, 1, false);
        assert_eq!(doc.articles.len(), 1);
        assert!(doc.articles.iter().all(|e| !e.url.trim().is_empty()));
    }

    #[test]
    fn test_relative_urls_absolutized() {
        let html = r#"<table><tr><td>/news/relative</td><td>2025-08-01</td></tr></table>"#;
        let doc = classify_document("https://example.com/sitemap.xml", html, 1, false);
        assert_eq!(doc.articles[0].url, "https://example.com/news/relative");
    }

    #[test]
    fn test_is_sitemap_like() {
        assert!(is_sitemap_like("https://example.com/post-sitemap1.xml"));
        assert!(is_sitemap_like("https://example.com/sitemap.xml"));
        assert!(is_sitemap_like("https://example.com/sitemap.xml?page=2"));
        assert!(!is_sitemap_like("https://example.com/news/story"));
        assert!(!is_sitemap_like("https://example.com/feed.xml"));
    }
}
