//! Parallel job supervision.
//!
//! Runs the configured crawl jobs as independent tasks with a bounded
//! concurrency and a per-job wall-clock timeout. Failure isolation is the
//! whole point: a job's error or panic becomes a [`JobResult`] and a block
//! in the consolidated error log, never a problem for its siblings or the
//! run as a whole.
//!
//! # Timeout semantics
//!
//! When a job exceeds its budget it is reported as timed out immediately,
//! but the underlying task is not aborted; its background fetches may keep
//! running until the process exits. Cancellation is report-level only, a
//! documented limitation: nothing downstream reads the timed-out job's
//! output from this run anyway.

use crate::job::{JobError, JobOutcome};
use crate::models::{JobResult, JobStatus, RunSummary};
use crate::sink::ErrorLog;
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};

/// A crawl job ready to run, reduced to a name and its future so the
/// supervisor does not care how the job was assembled (or mocked).
pub struct NamedJob {
    pub name: String,
    future: BoxFuture<'static, Result<JobOutcome, JobError>>,
}

impl NamedJob {
    pub fn new(
        name: impl Into<String>,
        future: impl Future<Output = Result<JobOutcome, JobError>> + Send + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            future: Box::pin(future),
        }
    }
}

/// Run all jobs and collect a [`RunSummary`] in completion order.
///
/// Jobs beyond `max_concurrency` queue until a slot frees. Every failure
/// mode (error return, panic, timeout) is absorbed here and written to
/// `error_log`.
pub async fn run_all(
    jobs: Vec<NamedJob>,
    max_concurrency: usize,
    per_job_timeout: Duration,
    error_log: Arc<ErrorLog>,
) -> RunSummary {
    let job_count = jobs.len();
    info!(jobs = job_count, max_concurrency, ?per_job_timeout, "Supervisor starting");

    let results: Vec<JobResult> = stream::iter(jobs.into_iter().map(|job| {
        let error_log = Arc::clone(&error_log);
        run_one(job, per_job_timeout, error_log)
    }))
    .buffer_unordered(max_concurrency.max(1))
    .collect()
    .await;

    let summary = RunSummary { results };
    info!(
        success = summary.count(JobStatus::Success),
        failed = summary.count(JobStatus::Failed),
        timed_out = summary.count(JobStatus::TimedOut),
        "All jobs finished"
    );
    for result in &summary.results {
        info!(job = %result.job_name, status = %result.status, "Job result");
    }
    summary
}

async fn run_one(job: NamedJob, per_job_timeout: Duration, error_log: Arc<ErrorLog>) -> JobResult {
    let name = job.name;
    info!(job = %name, "Job starting");

    let handle = tokio::spawn(job.future);
    match timeout(per_job_timeout, handle).await {
        Ok(Ok(Ok(outcome))) => {
            info!(
                job = %name,
                recorded = outcome.articles_recorded,
                skipped = outcome.articles_skipped,
                "Job completed"
            );
            JobResult {
                job_name: name,
                status: JobStatus::Success,
                error_detail: None,
            }
        }
        Ok(Ok(Err(e))) => {
            error!(job = %name, error = %e, "Job failed");
            log_block(&error_log, &format!("Error in {name}:\n{e}"));
            JobResult {
                job_name: name,
                status: JobStatus::Failed,
                error_detail: Some(e.to_string()),
            }
        }
        Ok(Err(join_error)) => {
            // The task itself died, almost certainly a panic.
            error!(job = %name, error = %join_error, "Job crashed");
            log_block(&error_log, &format!("Error in {name}:\n{join_error}"));
            JobResult {
                job_name: name,
                status: JobStatus::Failed,
                error_detail: Some(join_error.to_string()),
            }
        }
        Err(_elapsed) => {
            // Dropping the join handle detaches the task: the job's work may
            // continue in the background, only its report is cancelled.
            error!(job = %name, ?per_job_timeout, "Job timed out");
            log_block(
                &error_log,
                &format!(
                    "{name} timed out after {} seconds.",
                    per_job_timeout.as_secs()
                ),
            );
            JobResult {
                job_name: name,
                status: JobStatus::TimedOut,
                error_detail: Some(format!(
                    "timed out after {} seconds",
                    per_job_timeout.as_secs()
                )),
            }
        }
    }
}

fn log_block(error_log: &ErrorLog, block: &str) {
    if let Err(e) = error_log.append(block) {
        warn!(error = %e, "Could not write to consolidated error log");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn outcome() -> JobOutcome {
        JobOutcome::default()
    }

    fn error_log(dir: &tempfile::TempDir) -> Arc<ErrorLog> {
        Arc::new(ErrorLog::create(dir.path().join("errors.log")).unwrap())
    }

    #[tokio::test]
    async fn test_mixed_outcomes_with_timeout() {
        // Three jobs, two slots: one hangs past the timeout, one fails, one
        // succeeds; each is reported on its own terms.
        let dir = tempfile::tempdir().unwrap();
        let log = error_log(&dir);

        let jobs = vec![
            NamedJob::new("sleeper", async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(outcome())
            }),
            NamedJob::new("failer", async {
                Err(JobError::Resolver(crate::fetch::FetchError::Timeout))
            }),
            NamedJob::new("worker", async { Ok(outcome()) }),
        ];

        let summary = run_all(jobs, 2, Duration::from_millis(100), log.clone()).await;

        assert_eq!(summary.results.len(), 3);
        let status_of = |name: &str| {
            summary
                .results
                .iter()
                .find(|r| r.job_name == name)
                .unwrap()
                .status
        };
        assert_eq!(status_of("sleeper"), JobStatus::TimedOut);
        assert_eq!(status_of("failer"), JobStatus::Failed);
        assert_eq!(status_of("worker"), JobStatus::Success);

        let text = std::fs::read_to_string(log.path()).unwrap();
        assert!(text.contains("Error in failer:"));
        assert!(text.contains("sleeper timed out after 0 seconds."));
    }

    #[tokio::test]
    async fn test_panic_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let log = error_log(&dir);

        let jobs = vec![
            NamedJob::new("panicker", async {
                panic!("boom");
            }),
            NamedJob::new("survivor", async { Ok(outcome()) }),
        ];

        let summary = run_all(jobs, 2, Duration::from_secs(5), log.clone()).await;

        let panicker = summary
            .results
            .iter()
            .find(|r| r.job_name == "panicker")
            .unwrap();
        assert_eq!(panicker.status, JobStatus::Failed);
        assert!(panicker.error_detail.is_some());

        let survivor = summary
            .results
            .iter()
            .find(|r| r.job_name == "survivor")
            .unwrap();
        assert_eq!(survivor.status, JobStatus::Success);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let log = error_log(&dir);

        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let jobs: Vec<NamedJob> = (0..6)
            .map(|n| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                NamedJob::new(format!("job{n}"), async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(outcome())
                })
            })
            .collect();

        let summary = run_all(jobs, 2, Duration::from_secs(5), log).await;

        assert_eq!(summary.count(JobStatus::Success), 6);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_timed_out_work_keeps_running() {
        let dir = tempfile::tempdir().unwrap();
        let log = error_log(&dir);

        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        let jobs = vec![NamedJob::new("leaky", async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            flag.store(true, Ordering::SeqCst);
            Ok(outcome())
        })];

        let summary = run_all(jobs, 1, Duration::from_millis(10), log).await;
        assert_eq!(summary.results[0].status, JobStatus::TimedOut);
        assert!(!finished.load(Ordering::SeqCst));

        // The detached task completes on its own after the report.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(finished.load(Ordering::SeqCst));
    }
}
