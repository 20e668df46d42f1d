//! # Pharma News Watch
//!
//! A recurring crawler for pharmaceutical-industry news sites. Each site's
//! sitemap is discovered through a chain of fallback strategies, traversal is
//! bounded to a recency window, and every article is written incrementally to
//! a per-site CSV so partial progress survives crashes.
//!
//! ## Features
//!
//! - Multi-strategy sitemap resolution (strict XML, lenient HTML, raw URL
//!   scan, rendered table) with recursive sitemap-index handling
//! - Recency cutoff applied both from sitemap `lastmod` metadata and from
//!   dates extracted out of the article pages themselves
//! - Fetch layer that survives its session crashing mid-run
//! - Parallel supervision of all site jobs with per-job timeouts and
//!   failure isolation
//!
//! ## Usage
//!
//! ```sh
//! pharma_news_watch -o ./output
//! ```
//!
//! ## Architecture
//!
//! The application follows a pipeline architecture per site:
//! 1. **Discovery**: resolve the root sitemap, recursing through indexes
//! 2. **Traversal**: walk entries newest-first, stopping each page at the
//!    recency cutoff
//! 3. **Extraction**: pull title/body/date through per-field fallback chains
//! 4. **Recording**: append each record to the site's CSV as it is produced
//!
//! Site jobs run concurrently under a supervisor that turns every failure
//! mode into a per-job result line rather than a crashed run.

use chrono::Local;
use clap::Parser;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod cutoff;
mod extract;
mod fetch;
mod job;
mod models;
mod sink;
mod sitemap;
mod sites;
mod supervisor;
mod utils;

use cli::Cli;
use cutoff::CutoffPolicy;
use fetch::HttpSessionFactory;
use job::CrawlJob;
use models::JobStatus;
use sink::{ArticleSink, ErrorLog, SkipLog};
use supervisor::NamedJob;
use utils::ensure_writable_dir;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("pharma_news_watch starting up");

    let args = Cli::parse();
    debug!(?args.output_dir, ?args.sites, max_concurrency = args.max_concurrency, "Parsed CLI arguments");

    // Early check: ensure the output dir is writable before any job starts
    let output_dir = PathBuf::from(&args.output_dir);
    if let Err(e) = ensure_writable_dir(&output_dir).await {
        error!(
            path = %args.output_dir,
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    // ---- Site configurations ----
    let site_configs = match &args.sites {
        Some(path) => sites::load_sites(Path::new(path))?,
        None => sites::default_sites(),
    };
    info!(count = site_configs.len(), "Loaded site configurations");

    let error_log = Arc::new(ErrorLog::create(&args.error_log)?);

    // One reference "now" shared by every job's cutoff policy.
    let reference_now = Local::now().naive_local();

    // ---- Assemble jobs ----
    let jobs: Vec<NamedJob> = site_configs
        .into_iter()
        .map(|site| {
            let policy = CutoffPolicy::new(reference_now, site.window_days);
            let factory = HttpSessionFactory::new(site.page_timeout());
            let sink = ArticleSink::new(site.output_path(&output_dir), site.capture_timestamp);
            let skip_log = SkipLog::new(site.skip_log_path(&output_dir));
            let name = site.name.clone();
            NamedJob::new(name, CrawlJob::new(site, factory, policy, sink, skip_log).run())
        })
        .collect();

    // ---- Run everything under the supervisor ----
    let summary = supervisor::run_all(
        jobs,
        args.max_concurrency,
        Duration::from_secs(args.job_timeout_secs),
        Arc::clone(&error_log),
    )
    .await;

    if summary.count(JobStatus::Failed) + summary.count(JobStatus::TimedOut) > 0 {
        info!(
            path = %error_log.path().display(),
            "One or more jobs did not succeed; see the consolidated error log"
        );
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}
