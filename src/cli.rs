//! Command-line interface definitions.
//!
//! This module defines the CLI arguments and options using the `clap` crate.

use clap::Parser;

/// Command-line arguments for the crawler.
///
/// # Examples
///
/// ```sh
/// # Crawl the built-in site set into ./output
/// pharma_news_watch -o ./output
///
/// # Custom site list, three jobs at a time, 5 minute budget per job
/// pharma_news_watch -o ./output -s sites.json --max-concurrency 3 --job-timeout-secs 300
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Directory receiving per-site CSV outputs and skip logs
    #[arg(short, long, default_value = "./output")]
    pub output_dir: String,

    /// JSON file with site configurations, replacing the built-in set
    #[arg(short, long)]
    pub sites: Option<String>,

    /// Maximum number of crawl jobs running concurrently
    #[arg(long, default_value_t = 5)]
    pub max_concurrency: usize,

    /// Wall-clock budget per job, in seconds
    #[arg(long, default_value_t = 900)]
    pub job_timeout_secs: u64,

    /// Path of the consolidated error log
    #[arg(long, default_value = "scraper_errors.log")]
    pub error_log: String,
}
