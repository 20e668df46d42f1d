//! Page fetching with session recovery.
//!
//! The crawl job never talks to the network directly; it goes through a
//! [`ResilientFetcher`], which owns a fetch session and survives the session
//! dying mid-run. The module uses a trait-based design:
//! - [`FetchSession`]: "load a URL, return its markup", the only capability
//!   the rest of the engine depends on
//! - [`SessionFactory`]: creates sessions, so a crashed one can be replaced
//! - [`ResilientFetcher`]: decorator adding the bounded retry/recreate logic
//!
//! # Retry Strategy
//!
//! - 2 attempts per URL
//! - Fatal session errors replace the session before the next attempt
//! - Transient errors (timeout, connection reset) retry within the same
//!   session after a short jittered delay
//! - Everything else (e.g. an HTTP error status) propagates immediately

use rand::{Rng, rng};
use reqwest::Client;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{instrument, warn};

/// Delay before an in-session retry; a 0-250 ms jitter is added on top.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Attempts per URL, counting the first one.
const FETCH_ATTEMPTS: usize = 2;

/// Browser-like user agent presented to the crawled sites.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/116.0.0.0 Safari/537.36";

/// Classified fetch failures. The retry wrapper keys off [`is_fatal`] and
/// [`is_transient`]; the crawl job only cares that any of these means "skip
/// this URL and move on".
///
/// [`is_fatal`]: FetchError::is_fatal
/// [`is_transient`]: FetchError::is_transient
#[derive(Debug, Error)]
pub enum FetchError {
    /// The session backing the fetcher became unusable and must be replaced.
    #[error("fetch session crashed: {0}")]
    SessionCrashed(String),
    /// The page did not load within the configured timeout.
    #[error("page load timed out")]
    Timeout,
    /// Connection-level failure (refused, reset, DNS).
    #[error("network error: {0}")]
    Network(String),
    /// The server answered with a non-success status.
    #[error("HTTP status {0}")]
    Status(u16),
    /// A replacement session could not be constructed.
    #[error("could not build fetch session: {0}")]
    SessionBuild(String),
}

impl FetchError {
    /// Errors that invalidate the whole session rather than one request.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FetchError::SessionCrashed(_) | FetchError::SessionBuild(_)
        )
    }

    /// Errors worth retrying against the same session.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Timeout | FetchError::Network(_))
    }
}

/// A live fetch capability: load a URL and return its markup.
///
/// Implementations may be backed by a plain HTTP client or a rendering
/// browser; the crawl job must not depend on which.
pub trait FetchSession: Send + Sync {
    fn load(&self, url: &str) -> impl Future<Output = Result<String, FetchError>> + Send;
}

/// Creates [`FetchSession`]s, so the fetcher can replace a crashed one.
pub trait SessionFactory: Send + Sync {
    type Session: FetchSession;

    fn create(&self) -> Result<Self::Session, FetchError>;
}

/// HTTP-backed fetch session.
pub struct HttpSession {
    client: Client,
}

impl FetchSession for HttpSession {
    async fn load(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await.map_err(classify)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        response.text().await.map_err(classify)
    }
}

fn classify(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else if e.is_connect() {
        FetchError::Network("connection failed".to_string())
    } else {
        FetchError::Network(e.to_string())
    }
}

/// Builds [`HttpSession`]s with the configured page-load timeout.
#[derive(Debug, Clone)]
pub struct HttpSessionFactory {
    page_timeout: Duration,
}

impl HttpSessionFactory {
    pub fn new(page_timeout: Duration) -> Self {
        Self { page_timeout }
    }
}

impl SessionFactory for HttpSessionFactory {
    type Session = HttpSession;

    fn create(&self) -> Result<HttpSession, FetchError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(self.page_timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| FetchError::SessionBuild(e.to_string()))?;
        Ok(HttpSession { client })
    }
}

/// Wrapper that owns a session and transparently recovers from it dying.
///
/// The session is created lazily on first use and replaced whenever a fatal
/// error is observed, so a crash in the middle of a long job costs one
/// retried URL rather than the rest of the run.
pub struct ResilientFetcher<F: SessionFactory> {
    factory: F,
    session: Option<F::Session>,
}

impl<F: SessionFactory> ResilientFetcher<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            session: None,
        }
    }

    /// Fetch `url`, retrying per the module-level strategy.
    #[instrument(level = "debug", skip_all, fields(%url))]
    pub async fn fetch(&mut self, url: &str) -> Result<String, FetchError> {
        let mut last_error = None;

        for attempt in 1..=FETCH_ATTEMPTS {
            if self.session.is_none() {
                match self.factory.create() {
                    Ok(session) => self.session = Some(session),
                    Err(e) => {
                        warn!(attempt, error = %e, "Could not create fetch session");
                        last_error = Some(e);
                        continue;
                    }
                }
            }
            let Some(session) = self.session.as_ref() else {
                continue;
            };

            match session.load(url).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_fatal() => {
                    warn!(attempt, error = %e, "Session crashed; recreating");
                    self.session = None;
                    last_error = Some(e);
                }
                Err(e) if e.is_transient() => {
                    warn!(attempt, error = %e, "Transient fetch error; retrying");
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    sleep(RETRY_BASE_DELAY + Duration::from_millis(jitter_ms)).await;
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or(FetchError::Network("fetch attempts exhausted".to_string())))
    }
}
