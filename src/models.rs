//! Data models shared across the crawl pipeline.
//!
//! This module defines the core data structures used throughout the application:
//! - [`SitemapEntry`]: a URL discovered in a sitemap, with its optional `lastmod`
//! - [`ArticleRecord`]: one scraped article row, schema-fixed for the CSV sink
//! - [`JobStatus`] / [`JobResult`] / [`RunSummary`]: per-job outcomes aggregated
//!   by the supervisor
//!
//! Sinks downstream expect every record to carry all four fields, so the
//! record type defaults missing fields to empty strings and the date to the
//! [`UNKNOWN_DATE`] sentinel rather than using `Option`s.

use std::fmt;

/// Sentinel written in place of a publication date that could not be found.
pub const UNKNOWN_DATE: &str = "unknown";

/// A single URL discovered in a sitemap document.
///
/// Produced by the sitemap resolver and consumed once by a crawl job. The
/// `last_modified` value is carried verbatim from the sitemap (`<lastmod>`
/// element or table column) and parsed lazily by the cutoff policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitemapEntry {
    /// Absolute URL of the entry (article page or child sitemap).
    pub url: String,
    /// Raw `lastmod` string from the sitemap, if one was present.
    pub last_modified: Option<String>,
}

impl SitemapEntry {
    pub fn new(url: impl Into<String>, last_modified: Option<String>) -> Self {
        Self {
            url: url.into(),
            last_modified,
        }
    }
}

/// One scraped article, ready for the incremental sink.
///
/// Field extraction is best-effort: a failed fetch or an exhausted fallback
/// chain yields empty strings and [`UNKNOWN_DATE`] instead of aborting the
/// record, so the output schema stays fixed across every row of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleRecord {
    /// The article page URL this record was scraped from.
    pub source_url: String,
    /// Document title, trimmed; empty when none was found.
    pub title: String,
    /// Extracted body text; empty when every strategy came up short.
    pub body: String,
    /// Publication date, canonical or raw per site policy; [`UNKNOWN_DATE`]
    /// when no source yielded one.
    pub published_at: String,
}

impl ArticleRecord {
    /// A record with all fields defaulted, used when the page could not be
    /// fetched at all.
    pub fn empty(source_url: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            title: String::new(),
            body: String::new(),
            published_at: UNKNOWN_DATE.to_string(),
        }
    }
}

/// Terminal outcome of one crawl job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// The job ran to its natural end.
    Success,
    /// The job raised an unrecoverable error; detail is in [`JobResult`].
    Failed,
    /// The job exceeded the per-job wall-clock budget. Its background work
    /// may still be running; only the report is cancelled.
    TimedOut,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
            JobStatus::TimedOut => "timed out",
        };
        f.write_str(s)
    }
}

/// Outcome of one crawl job, as reported by the supervisor.
#[derive(Debug, Clone)]
pub struct JobResult {
    /// Site name the job was configured with.
    pub job_name: String,
    pub status: JobStatus,
    /// Failure or timeout detail; `None` on success.
    pub error_detail: Option<String>,
}

/// All job results of one supervisor run, in completion order.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub results: Vec<JobResult>,
}

impl RunSummary {
    pub fn count(&self, status: JobStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }
}
