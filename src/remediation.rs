//! # Remediation engine
//!
//! One recovery strategy per source type, registered like adapters:
//!
//! - `feed`: retry with an extended timeout on a non-pooled connection.
//! - `html-scrape`: retry through the generic extractor, ignoring custom selectors.
//! - `browser-scrape`: restart the shared browser session, then retry once.
//!
//! Each strategy runs at most once per source per run and yields exactly one
//! `FixAction`. A retry that returns at least one item counts as fixed; its
//! items go through the normal dedup path.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::counter;
use serde::{Deserialize, Serialize};

use crate::catalog::{SourceDescriptor, SourceType};
use crate::config::MonitorConfig;
use crate::ingest::providers::browser::BrowserHandle;
use crate::ingest::providers::AdapterRegistry;
use crate::ingest::types::{CandidateItem, FetchError, FetchOptions};
use crate::model::{FixAction, FixStep, IssueType};
use crate::store::{persist_items, ItemStore};
use crate::taxonomy::{ErrorCategory, ErrorClassification};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixStatus {
    Fixed,
    NotFixed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixReport {
    pub status: FixStatus,
    pub fetched_count: u32,
    pub saved_count: u32,
    pub new_count: u32,
    pub duration_ms: u64,
    pub fix_actions: Vec<FixAction>,
    pub error: Option<String>,
}

impl FixReport {
    fn not_fixed(error: String, duration_ms: u64, fix_actions: Vec<FixAction>) -> Self {
        Self {
            status: FixStatus::NotFixed,
            fetched_count: 0,
            saved_count: 0,
            new_count: 0,
            duration_ms,
            fix_actions,
            error: Some(error),
        }
    }
}

/// Inputs a strategy may use.
pub struct FixContext<'a> {
    pub source: &'a SourceDescriptor,
    pub registry: &'a AdapterRegistry,
    /// The source's regular fetch timeout.
    pub base_timeout: Duration,
    pub timeout_floor: Duration,
}

impl FixContext<'_> {
    /// Call the source's regular adapter with `opts`, bounded by `opts.timeout`.
    /// Runs in its own task, like the first fetch, so a panicking adapter
    /// fails this retry only.
    pub async fn fetch_with(&self, opts: FetchOptions) -> Result<Vec<CandidateItem>, FetchError> {
        let adapter = self.registry.get(self.source.source_type).ok_or_else(|| {
            FetchError::Other(format!(
                "no adapter registered for source type {}",
                self.source.source_type
            ))
        })?;
        let source = self.source.clone();
        let task = tokio::spawn(async move { adapter.fetch(&source, &opts).await });
        let abort = task.abort_handle();

        match tokio::time::timeout(opts.timeout, task).await {
            Ok(Ok(res)) => res,
            Ok(Err(join)) => Err(FetchError::Other(format!("adapter task failed: {join}"))),
            Err(_) => {
                abort.abort();
                Err(FetchError::Timeout {
                    after: opts.timeout,
                })
            }
        }
    }

    /// Upper bound for a whole strategy: one relaunch plus one retry.
    pub fn budget(&self) -> Duration {
        self.base_timeout.max(self.timeout_floor) * 2
    }
}

#[async_trait]
pub trait FixStrategy: Send + Sync {
    fn step(&self) -> FixStep;
    fn method(&self) -> &'static str;
    async fn apply(&self, ctx: &FixContext<'_>) -> Result<Vec<CandidateItem>, FetchError>;
}

/// Feed: longer timeout, fresh connection.
pub struct ExtendedTimeoutRetry;

#[async_trait]
impl FixStrategy for ExtendedTimeoutRetry {
    fn step(&self) -> FixStep {
        FixStep::Retry
    }

    fn method(&self) -> &'static str {
        "extended_timeout_retry"
    }

    async fn apply(&self, ctx: &FixContext<'_>) -> Result<Vec<CandidateItem>, FetchError> {
        ctx.fetch_with(FetchOptions {
            timeout: ctx.base_timeout.max(ctx.timeout_floor),
            fresh_connection: true,
            generic_extraction: false,
        })
        .await
    }
}

/// HTML: drop custom selectors, use the generic extractor.
pub struct GenericHtmlFallback;

#[async_trait]
impl FixStrategy for GenericHtmlFallback {
    fn step(&self) -> FixStep {
        FixStep::Fallback
    }

    fn method(&self) -> &'static str {
        "generic_html_fallback"
    }

    async fn apply(&self, ctx: &FixContext<'_>) -> Result<Vec<CandidateItem>, FetchError> {
        ctx.fetch_with(FetchOptions {
            timeout: ctx.base_timeout,
            fresh_connection: false,
            generic_extraction: true,
        })
        .await
    }
}

/// Browser: recreate the shared session, then retry the original scrape.
pub struct BrowserRestartRetry {
    handle: Arc<BrowserHandle>,
}

impl BrowserRestartRetry {
    pub fn new(handle: Arc<BrowserHandle>) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl FixStrategy for BrowserRestartRetry {
    fn step(&self) -> FixStep {
        FixStep::Restart
    }

    fn method(&self) -> &'static str {
        "browser_restart_retry"
    }

    async fn apply(&self, ctx: &FixContext<'_>) -> Result<Vec<CandidateItem>, FetchError> {
        self.handle.restart().await?;
        ctx.fetch_with(FetchOptions::with_timeout(ctx.base_timeout)).await
    }
}

/// Whether an issue is worth a remediation attempt.
///
/// Stale sources always are. Errors are when their category is auto-fixable,
/// plus selector breakage on HTML sources, which is what the generic fallback
/// exists for.
pub fn should_attempt(
    issue: IssueType,
    classification: Option<&ErrorClassification>,
    source_type: SourceType,
) -> bool {
    match issue {
        IssueType::None => false,
        IssueType::Stale => true,
        IssueType::Error => classification.is_some_and(|c| {
            c.auto_fixable
                || (source_type == SourceType::HtmlScrape && c.category == ErrorCategory::Selector)
        }),
    }
}

pub struct RemediationEngine {
    registry: AdapterRegistry,
    store: Arc<dyn ItemStore>,
    strategies: HashMap<SourceType, Arc<dyn FixStrategy>>,
    default_timeout: Duration,
    timeout_floor: Duration,
}

impl RemediationEngine {
    /// Engine with the feed and HTML strategies. Browser remediation needs
    /// the session handle, see `with_browser`.
    pub fn new(registry: AdapterRegistry, store: Arc<dyn ItemStore>, cfg: &MonitorConfig) -> Self {
        Self {
            registry,
            store,
            strategies: HashMap::new(),
            default_timeout: cfg.default_timeout(),
            timeout_floor: cfg.fix_timeout_floor(),
        }
        .register(SourceType::Feed, Arc::new(ExtendedTimeoutRetry))
        .register(SourceType::HtmlScrape, Arc::new(GenericHtmlFallback))
    }

    pub fn with_browser(self, handle: Arc<BrowserHandle>) -> Self {
        self.register(
            SourceType::BrowserScrape,
            Arc::new(BrowserRestartRetry::new(handle)),
        )
    }

    pub fn register(mut self, source_type: SourceType, strategy: Arc<dyn FixStrategy>) -> Self {
        self.strategies.insert(source_type, strategy);
        self
    }

    pub fn has_strategy(&self, source_type: SourceType) -> bool {
        self.strategies.contains_key(&source_type)
    }

    pub async fn attempt_fix(&self, source: &SourceDescriptor, dry_run: bool) -> FixReport {
        let t0 = Instant::now();

        let Some(strategy) = self.strategies.get(&source.source_type).cloned() else {
            counter!("sentinel_fix_attempts_total", "result" => "unsupported").increment(1);
            return FixReport::not_fixed(
                format!("no remediation strategy for source type {}", source.source_type),
                0,
                Vec::new(),
            );
        };

        let ctx = FixContext {
            source,
            registry: &self.registry,
            base_timeout: source
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(self.default_timeout),
            timeout_floor: self.timeout_floor,
        };

        tracing::info!(
            target: "remediation",
            source = %source.name,
            method = strategy.method(),
            "attempting fix"
        );
        let budget = ctx.budget();
        let result = match tokio::time::timeout(budget, strategy.apply(&ctx)).await {
            Ok(res) => res,
            Err(_) => Err(FetchError::Timeout { after: budget }),
        };
        let duration_ms = t0.elapsed().as_millis() as u64;

        let (items, error) = match result {
            Ok(items) if !items.is_empty() => (items, None),
            Ok(_) => (Vec::new(), Some("retry returned no items".to_string())),
            Err(e) => (Vec::new(), Some(e.to_string())),
        };

        let action = FixAction {
            step: strategy.step(),
            method: strategy.method().to_string(),
            success: error.is_none(),
            fetched_count: items.len() as u32,
            duration_ms,
            error: error.clone(),
        };

        if let Some(err) = error {
            counter!("sentinel_fix_attempts_total", "result" => "not_fixed").increment(1);
            tracing::warn!(target: "remediation", source = %source.name, error = %err, "fix failed");
            return FixReport::not_fixed(err, duration_ms, vec![action]);
        }

        let persisted = persist_items(self.store.as_ref(), &items, dry_run).await;
        counter!("sentinel_fix_attempts_total", "result" => "fixed").increment(1);
        tracing::info!(
            target: "remediation",
            source = %source.name,
            fetched = items.len(),
            new = persisted.new,
            "fix succeeded"
        );

        FixReport {
            status: FixStatus::Fixed,
            fetched_count: items.len() as u32,
            saved_count: persisted.saved as u32,
            new_count: persisted.new as u32,
            duration_ms: t0.elapsed().as_millis() as u64,
            fix_actions: vec![action],
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::classify;

    #[test]
    fn stale_always_attempted_none_never() {
        assert!(should_attempt(IssueType::Stale, None, SourceType::Demo));
        assert!(!should_attempt(IssueType::None, None, SourceType::Feed));
    }

    #[test]
    fn errors_need_fixable_category() {
        let t = classify("ETIMEDOUT", None);
        let a = classify("forbidden", Some(403));
        let s = classify("selector .item matched nothing", None);
        assert!(should_attempt(IssueType::Error, Some(&t), SourceType::Feed));
        assert!(!should_attempt(IssueType::Error, Some(&a), SourceType::Feed));
        assert!(should_attempt(IssueType::Error, Some(&s), SourceType::HtmlScrape));
        assert!(!should_attempt(IssueType::Error, Some(&s), SourceType::Feed));
    }
}
