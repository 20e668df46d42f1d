//! Recency cutoff policy.
//!
//! Sitemap entries are ordered newest-first, so one entry older than the
//! recency window is treated as evidence that the remainder of the current
//! sitemap page is stale. The policy here answers the single question
//! "should traversal of this page stop?"; the crawl job applies it both
//! eagerly (sitemap `lastmod`, before the article is fetched) and defensively
//! (the date actually extracted from the page).

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

/// Date-time layouts accepted from sitemaps and article pages.
const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// Parse a timestamp string leniently.
///
/// Accepts date-only (`2025-08-06`), date-time (`2025-08-06T14:30:00`, with
/// `T` or space separator), and date-time with a trailing UTC suffix or
/// offset. Input is truncated to its first 19 characters, which covers the
/// date and time and drops any `Z`/offset tail. Returns `None` for anything
/// that does not match; callers treat that as "unknown", never as an error.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let head: String = trimmed.chars().take(19).collect();
    for fmt in TIMESTAMP_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&head, fmt) {
            return Some(dt);
        }
    }

    let date_head: String = head.chars().take(10).collect();
    NaiveDate::parse_from_str(&date_head, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN))
}

/// Decides whether traversal of the current sitemap page should stop.
///
/// One policy instance is shared by a whole job; the per-page "stop" state
/// lives in the traversal loop, scoped to one page and never carried across
/// pages or jobs.
#[derive(Debug, Clone, Copy)]
pub struct CutoffPolicy {
    reference: NaiveDateTime,
    window_days: i64,
}

impl CutoffPolicy {
    /// A policy measuring staleness against `reference` (normally "now").
    pub fn new(reference: NaiveDateTime, window_days: i64) -> Self {
        Self {
            reference,
            window_days,
        }
    }

    /// Oldest timestamp still inside the recency window.
    pub fn horizon(&self) -> NaiveDateTime {
        self.reference - Duration::days(self.window_days)
    }

    /// True when `timestamp` parses and falls before the window horizon.
    /// Unparseable timestamps never trigger a stop.
    pub fn should_stop(&self, timestamp: &str) -> bool {
        match parse_timestamp(timestamp) {
            Some(dt) => dt < self.horizon(),
            None => false,
        }
    }

    /// [`Self::should_stop`] lifted over an optional timestamp.
    pub fn should_stop_opt(&self, timestamp: Option<&str>) -> bool {
        timestamp.is_some_and(|ts| self.should_stop(ts))
    }
}
