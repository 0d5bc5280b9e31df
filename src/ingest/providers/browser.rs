// src/ingest/providers/browser.rs
//! Headless-browser scraping through an explicitly owned session handle.
//!
//! The automation backend lives outside this crate behind `BrowserLauncher`
//! and `BrowserSession`. `BrowserHandle` owns at most one live session; the
//! async mutex guarantees a single in-flight scrape per session. A session
//! whose scrape timed out, or whose scrape was cancelled from outside, is
//! dropped, so the next user relaunches. Launches are bounded too.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::catalog::SourceDescriptor;
use crate::ingest::types::{CandidateItem, FetchError, FetchOptions, SourceAdapter};

#[async_trait]
pub trait BrowserSession: Send {
    async fn scrape(&mut self, source: &SourceDescriptor) -> Result<Vec<CandidateItem>, FetchError>;
    async fn close(&mut self);
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, FetchError>;
}

const DEFAULT_LAUNCH_TIMEOUT: Duration = Duration::from_secs(30);

pub struct BrowserHandle {
    launcher: Arc<dyn BrowserLauncher>,
    session: Mutex<Option<Box<dyn BrowserSession>>>,
    launch_timeout: Duration,
}

impl BrowserHandle {
    pub fn new(launcher: Arc<dyn BrowserLauncher>) -> Self {
        Self {
            launcher,
            session: Mutex::new(None),
            launch_timeout: DEFAULT_LAUNCH_TIMEOUT,
        }
    }

    pub fn with_launch_timeout(mut self, timeout: Duration) -> Self {
        self.launch_timeout = timeout;
        self
    }

    async fn launch(&self) -> Result<Box<dyn BrowserSession>, FetchError> {
        tracing::debug!(target: "browser", "launching browser session");
        match tokio::time::timeout(self.launch_timeout, self.launcher.launch()).await {
            Ok(res) => res,
            Err(_) => Err(FetchError::Timeout {
                after: self.launch_timeout,
            }),
        }
    }

    /// Scrape with the shared session, launching it lazily.
    ///
    /// The session is taken out of the slot for the duration of the scrape
    /// and put back only when the scrape returns. If the caller drops this
    /// future mid-scrape the session goes with it instead of lingering in
    /// the slot half-used.
    pub async fn scrape(
        &self,
        source: &SourceDescriptor,
        timeout: Duration,
    ) -> Result<Vec<CandidateItem>, FetchError> {
        let mut slot = self.session.lock().await;
        let mut session = match slot.take() {
            Some(s) => s,
            None => self.launch().await?,
        };

        let outcome = tokio::time::timeout(timeout, session.scrape(source)).await;
        match outcome {
            Ok(res) => {
                *slot = Some(session);
                res
            }
            Err(_) => {
                tracing::warn!(target: "browser", source = %source.name, "scrape timed out; discarding session");
                session.close().await;
                Err(FetchError::Timeout { after: timeout })
            }
        }
    }

    /// Tear down the current session (if any) and launch a new one.
    pub async fn restart(&self) -> Result<(), FetchError> {
        let mut slot = self.session.lock().await;
        if let Some(mut s) = slot.take() {
            s.close().await;
        }
        *slot = Some(self.launch().await?);
        tracing::info!(target: "browser", "browser session restarted");
        Ok(())
    }

    /// Close the session at the end of a scraping pass.
    pub async fn shutdown(&self) {
        let mut slot = self.session.lock().await;
        if let Some(mut s) = slot.take() {
            s.close().await;
            tracing::debug!(target: "browser", "browser session closed");
        }
    }

    pub async fn is_live(&self) -> bool {
        self.session.lock().await.is_some()
    }
}

pub struct BrowserScrapeAdapter {
    handle: Arc<BrowserHandle>,
}

impl BrowserScrapeAdapter {
    pub fn new(handle: Arc<BrowserHandle>) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl SourceAdapter for BrowserScrapeAdapter {
    async fn fetch(
        &self,
        source: &SourceDescriptor,
        opts: &FetchOptions,
    ) -> Result<Vec<CandidateItem>, FetchError> {
        self.handle.scrape(source, opts.timeout).await
    }

    fn name(&self) -> &'static str {
        "browser-scrape"
    }
}
