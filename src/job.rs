//! One site's end-to-end crawl.
//!
//! A [`CrawlJob`] composes the sitemap resolver, cutoff policy, article
//! extractor and incremental sink into a single run:
//!
//! ```text
//! Discovering -> Traversing(page) -> Fetching(url) -> Extracting -> Recording
//!                     ^                                                 |
//!                     +------ next page / next child sitemap <----------+
//! ```
//!
//! Sitemap indexes are walked depth-first: a document's direct article
//! candidates are processed before its child sitemaps. The cutoff check runs
//! twice per article (eagerly on the sitemap `lastmod` before fetching, then
//! defensively on the date extracted from the page), and either one skips
//! the remainder of the current page only. A fetch failure records an
//! empty-field row plus a skip-log line and moves on; per-article failure
//! never aborts the job.

use crate::cutoff::CutoffPolicy;
use crate::extract::{ExtractOptions, extract_article};
use crate::fetch::{FetchError, ResilientFetcher, SessionFactory};
use crate::models::ArticleRecord;
use crate::sink::{ArticleSink, SinkError, SkipLog};
use crate::sitemap::{self, SitemapDocument};
use crate::sites::SiteConfig;
use crate::utils::truncate_for_log;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Failures that abort a whole job. Per-article trouble never lands here.
#[derive(Debug, Error)]
pub enum JobError {
    /// The root sitemap (or a pagination page of it) could not be fetched.
    #[error("sitemap unreachable: {0}")]
    Resolver(#[from] FetchError),
    /// An output artifact could not be written.
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Counters reported by a completed job.
#[derive(Debug, Default, Clone, Copy)]
pub struct JobOutcome {
    pub sitemaps_visited: usize,
    pub articles_recorded: usize,
    pub articles_skipped: usize,
}

/// A single site crawl, exclusively owning its fetcher, sink and logs.
pub struct CrawlJob<F: SessionFactory> {
    site: SiteConfig,
    fetcher: ResilientFetcher<F>,
    policy: CutoffPolicy,
    options: ExtractOptions,
    sink: ArticleSink,
    skip_log: SkipLog,
    visited: HashSet<String>,
    outcome: JobOutcome,
}

impl<F: SessionFactory> CrawlJob<F> {
    pub fn new(
        site: SiteConfig,
        factory: F,
        policy: CutoffPolicy,
        sink: ArticleSink,
        skip_log: SkipLog,
    ) -> Self {
        let options = ExtractOptions::from_site(&site);
        Self {
            site,
            fetcher: ResilientFetcher::new(factory),
            policy,
            options,
            sink,
            skip_log,
            visited: HashSet::new(),
            outcome: JobOutcome::default(),
        }
    }

    /// Run the job to completion.
    #[instrument(level = "info", skip_all, fields(site = %self.site.name))]
    pub async fn run(mut self) -> Result<JobOutcome, JobError> {
        info!(sitemap = %self.site.sitemap_url, window_days = self.site.window_days, "Starting crawl");

        if self.site.is_paged() {
            let mut page = 1usize;
            loop {
                let url = self.site.page_url(page);
                if !self.visited.insert(url.clone()) {
                    break;
                }
                let doc = sitemap::resolve_document(
                    &mut self.fetcher,
                    &url,
                    self.site.table_lastmod_column,
                    false,
                )
                .await?;
                if doc.children.is_empty() && doc.articles.is_empty() {
                    info!(page, "Empty sitemap page; stopping pagination");
                    break;
                }
                self.walk_document(doc).await?;
                page += 1;
            }
        } else {
            let root = self.site.sitemap_url.clone();
            self.visited.insert(root.clone());
            let doc = sitemap::resolve_document(
                &mut self.fetcher,
                &root,
                self.site.table_lastmod_column,
                true,
            )
            .await?;
            self.walk_document(doc).await?;
        }

        info!(
            sitemaps = self.outcome.sitemaps_visited,
            recorded = self.outcome.articles_recorded,
            skipped = self.outcome.articles_skipped,
            "Crawl complete"
        );
        Ok(self.outcome)
    }

    /// Process one sitemap document: its article candidates first, then its
    /// child sitemaps depth-first.
    fn walk_document(&mut self, doc: SitemapDocument) -> BoxFuture<'_, Result<(), JobError>> {
        async move {
            self.outcome.sitemaps_visited += 1;

            for entry in &doc.articles {
                if self
                    .policy
                    .should_stop_opt(entry.last_modified.as_deref())
                {
                    info!(
                        url = %entry.url,
                        lastmod = entry.last_modified.as_deref().unwrap_or(""),
                        "Stale sitemap entry; skipping rest of page"
                    );
                    break;
                }

                match self.fetcher.fetch(&entry.url).await {
                    Ok(html) => {
                        let record = extract_article(
                            &html,
                            &entry.url,
                            entry.last_modified.as_deref(),
                            &self.options,
                        );
                        if self.policy.should_stop(&record.published_at) {
                            info!(
                                url = %entry.url,
                                date = %record.published_at,
                                "Stale scraped date; skipping rest of page"
                            );
                            break;
                        }
                        self.sink.append(&record)?;
                        self.outcome.articles_recorded += 1;
                        info!(
                            url = %entry.url,
                            title_len = record.title.len(),
                            body_len = record.body.len(),
                            date = %record.published_at,
                            "Recorded article"
                        );
                        debug!(body = %truncate_for_log(&record.body, 120), "Body preview");
                    }
                    Err(e) => {
                        warn!(url = %entry.url, error = %e, "Article fetch failed; skipping");
                        self.skip_log.record(&entry.url, &e.to_string())?;
                        self.sink.append(&ArticleRecord::empty(&entry.url))?;
                        self.outcome.articles_skipped += 1;
                    }
                }
            }

            for child in &doc.children {
                if self.policy.should_stop_opt(child.last_modified.as_deref()) {
                    info!(url = %child.url, "Stale child sitemap; not descending");
                    continue;
                }
                if !self.visited.insert(child.url.clone()) {
                    warn!(url = %child.url, "Sitemap already visited; cycle guard");
                    continue;
                }
                match sitemap::resolve_document(
                    &mut self.fetcher,
                    &child.url,
                    self.site.table_lastmod_column,
                    false,
                )
                .await
                {
                    Ok(child_doc) => self.walk_document(child_doc).await?,
                    Err(e) => {
                        warn!(url = %child.url, error = %e, "Child sitemap unreachable; skipping");
                    }
                }
            }

            Ok(())
        }
        .boxed()
    }
}
