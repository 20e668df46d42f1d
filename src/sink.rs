//! Incremental output artifacts.
//!
//! Three artifacts per run:
//! - [`ArticleSink`]: the per-job CSV. The first append truncates whatever a
//!   previous run left behind and writes the header; every later append adds
//!   one row. Nothing is buffered across calls, so partial progress survives
//!   a mid-job crash.
//! - [`SkipLog`]: per-job, one `url<TAB>error` line per URL whose fetch
//!   failed. Operator-facing only; never read back.
//! - [`ErrorLog`]: one consolidated artifact across all jobs; appends are
//!   serialized so concurrent jobs cannot interleave blocks.

use crate::models::ArticleRecord;
use chrono::Local;
use csv::{QuoteStyle, WriterBuilder};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

/// Fixed column set of the primary output.
pub const OUTPUT_COLUMNS: [&str; 4] = ["Site URL", "Title", "Body", "Date"];

/// Extra column appended by history-accumulating jobs.
pub const CAPTURE_COLUMN: &str = "Scraped At";

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("output io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not encode record: {0}")]
    Csv(#[from] csv::Error),
}

/// Append-only CSV writer for one job's output target.
pub struct ArticleSink {
    path: PathBuf,
    capture_timestamp: bool,
    started: bool,
}

impl ArticleSink {
    pub fn new(path: impl Into<PathBuf>, capture_timestamp: bool) -> Self {
        Self {
            path: path.into(),
            capture_timestamp,
            started: false,
        }
    }

    /// Write one record. The first call creates/truncates the target and
    /// writes the header; the file is opened, flushed and closed on every
    /// call.
    pub fn append(&mut self, record: &ArticleRecord) -> Result<(), SinkError> {
        let file = if self.started {
            OpenOptions::new().append(true).open(&self.path)?
        } else {
            File::create(&self.path)?
        };

        let mut writer = WriterBuilder::new()
            .quote_style(QuoteStyle::Always)
            .has_headers(false)
            .from_writer(file);

        if !self.started {
            let mut header: Vec<&str> = OUTPUT_COLUMNS.to_vec();
            if self.capture_timestamp {
                header.push(CAPTURE_COLUMN);
            }
            writer.write_record(&header)?;
        }

        let mut row = vec![
            record.source_url.clone(),
            record.title.clone(),
            record.body.clone(),
            record.published_at.clone(),
        ];
        if self.capture_timestamp {
            row.push(Local::now().format("%Y-%m-%d %H:%M:%S").to_string());
        }
        writer.write_record(&row)?;
        writer.flush()?;

        self.started = true;
        Ok(())
    }
}

/// Append-only log of URLs whose extraction failed.
pub struct SkipLog {
    path: PathBuf,
}

impl SkipLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn record(&self, url: &str, error: &str) -> Result<(), SinkError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{url}\t{error}")?;
        Ok(())
    }
}

/// Consolidated error artifact shared by every job of a run.
///
/// Appends take an internal lock so blocks from concurrently failing jobs
/// never interleave.
pub struct ErrorLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ErrorLog {
    /// Create the artifact, truncating one left over from a previous run.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let path = path.into();
        File::create(&path)?;
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one multi-line block followed by a blank separator line.
    pub fn append(&self, block: &str) -> Result<(), SinkError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        writeln!(file, "{block}\n")?;
        Ok(())
    }
}
