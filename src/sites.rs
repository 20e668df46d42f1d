//! Per-site crawl configuration.
//!
//! Every concrete site job is the same engine wired to a different
//! [`SiteConfig`]: sitemap root, recency window, body-container selector,
//! page-load timeout, and output naming. The compiled-in set covers the
//! pharmaceutical-industry sources this tool was built around; `--sites`
//! swaps in a JSON list with the same shape.
//!
//! A `{page}` placeholder in the sitemap URL marks a paginated sitemap: the
//! crawl job substitutes consecutive page numbers until a page yields no
//! entries.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Placeholder substituted with the page number in paginated sitemap URLs.
pub const PAGE_PLACEHOLDER: &str = "{page}";

/// How extracted publication dates are written to the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DateStyle {
    /// Pass the source string through untouched.
    #[default]
    Raw,
    /// Reformat parseable dates to `YYYY-MM-DD`; unparseable strings pass
    /// through untouched.
    Canonical,
}

/// Configuration for one site's crawl job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Short site name; used for job reporting and output file naming.
    pub name: String,
    /// Root sitemap URL. May contain `{page}` for paginated sitemaps.
    pub sitemap_url: String,
    /// Recency window in days; entries older than this stop the page.
    pub window_days: i64,
    /// CSS selector of the site's main content container, if it has a
    /// reliable one. Falls back through the generic chain otherwise.
    #[serde(default)]
    pub body_selector: Option<String>,
    /// Column index of the modification date in table-rendered sitemaps.
    #[serde(default = "default_table_lastmod_column")]
    pub table_lastmod_column: usize,
    /// Page-load timeout in seconds.
    #[serde(default = "default_page_timeout_secs")]
    pub page_timeout_secs: u64,
    #[serde(default)]
    pub date_style: DateStyle,
    /// Append a `Scraped At` column to every row, for jobs whose output
    /// accumulates history across runs.
    #[serde(default)]
    pub capture_timestamp: bool,
}

fn default_table_lastmod_column() -> usize {
    1
}

fn default_page_timeout_secs() -> u64 {
    60
}

impl SiteConfig {
    /// Whether the sitemap root is paginated.
    pub fn is_paged(&self) -> bool {
        self.sitemap_url.contains(PAGE_PLACEHOLDER)
    }

    /// Sitemap URL for `page`, with the placeholder substituted.
    pub fn page_url(&self, page: usize) -> String {
        self.sitemap_url
            .replace(PAGE_PLACEHOLDER, &page.to_string())
    }

    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }

    /// Primary CSV artifact path for this site under `output_dir`.
    pub fn output_path(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(format!("{}_scraped_articles.csv", self.name))
    }

    /// Skip-log path for this site under `output_dir`.
    pub fn skip_log_path(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(format!("{}_skipped_urls.txt", self.name))
    }
}

/// The compiled-in site set.
pub fn default_sites() -> Vec<SiteConfig> {
    vec![
        SiteConfig {
            name: "biopharma".to_string(),
            sitemap_url: "https://www.biopharminternational.com/sitemap.xml?category=Article%20Detail&page={page}"
                .to_string(),
            window_days: 62,
            body_selector: Some("div.field--name-body".to_string()),
            table_lastmod_column: 1,
            page_timeout_secs: 60,
            date_style: DateStyle::Raw,
            capture_timestamp: false,
        },
        SiteConfig {
            name: "catalent".to_string(),
            sitemap_url: "http://www.catalent.com/sitemap_index.xml".to_string(),
            window_days: 60,
            body_selector: Some("div.field--name-body".to_string()),
            table_lastmod_column: 2,
            page_timeout_secs: 60,
            date_style: DateStyle::Raw,
            capture_timestamp: false,
        },
        SiteConfig {
            name: "pharmtech".to_string(),
            sitemap_url: "https://www.pharmtech.com/sitemap.xml?category=Article%20Detail&page={page}"
                .to_string(),
            window_days: 60,
            body_selector: Some("div.field--name-body".to_string()),
            table_lastmod_column: 1,
            page_timeout_secs: 180,
            date_style: DateStyle::Raw,
            capture_timestamp: false,
        },
        SiteConfig {
            name: "resilience".to_string(),
            sitemap_url: "https://resilience.com/sitemap.xml".to_string(),
            window_days: 62,
            body_selector: None,
            table_lastmod_column: 1,
            page_timeout_secs: 60,
            date_style: DateStyle::Canonical,
            capture_timestamp: false,
        },
        SiteConfig {
            name: "genenews".to_string(),
            sitemap_url: "https://www.genengnews.com/sitemap_index.xml".to_string(),
            window_days: 62,
            body_selector: Some("div.field--name-body".to_string()),
            table_lastmod_column: 1,
            page_timeout_secs: 60,
            date_style: DateStyle::Raw,
            capture_timestamp: false,
        },
    ]
}

/// Load a site list from a JSON file, replacing the compiled-in set.
pub fn load_sites(path: &Path) -> Result<Vec<SiteConfig>, Box<dyn Error>> {
    let text = std::fs::read_to_string(path)?;
    let sites: Vec<SiteConfig> = serde_json::from_str(&text)?;
    Ok(sites)
}
