// src/ingest/mod.rs
//! Fetch orchestrator.
//!
//! One run walks the eligible sources sequentially in priority order. Each
//! source is fetched through its registered adapter under a timeout,
//! persisted through the dedup path, classified against its success history
//! and, if enabled, handed to remediation. A failing source only ever yields
//! an `error` check; the loop always moves on.

pub mod providers;
pub mod scheduler;
pub mod types;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::alert::{compose_issue_summary, Issue};
use crate::catalog::{Catalog, CatalogSource, Priority, SourceDescriptor, SourceType};
use crate::config::MonitorConfig;
use crate::health::{self, FetchOutcome, HealthState};
use crate::ingest::providers::browser::{BrowserHandle, BrowserScrapeAdapter};
use crate::ingest::providers::AdapterRegistry;
use crate::ingest::types::{CandidateItem, FetchError, FetchOptions};
use crate::model::{
    CheckStatus, RunCompletion, RunMetadata, RunStatus, RunTotals, RunType, SourceCheck,
};
use crate::notify::antiflutter::AlertGate;
use crate::notify::{NotifierMux, SendResult};
use crate::recorder::RunRecorder;
use crate::remediation::{self, FixStatus, RemediationEngine};
use crate::store::{persist_items, ItemStore};
use crate::taxonomy::{classify_failure, extract_status_code, ErrorClassification};

/// Issue detail on checks for sources left out by fast mode.
pub const FAST_MODE_SKIP_REASON: &str = "omitted by fast mode";

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("sentinel_runs_total", "Orchestration runs by final status.");
        describe_counter!(
            "sentinel_source_checks_total",
            "Per-source checks by final status."
        );
        describe_counter!(
            "sentinel_fix_attempts_total",
            "Remediation attempts by result."
        );
        describe_counter!(
            "sentinel_new_items_total",
            "Items not previously stored, across all runs."
        );
        describe_histogram!("sentinel_fetch_ms", "Adapter fetch time in milliseconds.");
        describe_histogram!("sentinel_parse_ms", "Feed parse time in milliseconds.");
        describe_gauge!("sentinel_last_run_ts", "Unix ts when the last run finished.");
    });
}

/// Normalize text: decode entities, strip tags, collapse whitespace, trim.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").expect("ws regex"));
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap: 1500 chars
    if out.chars().count() > 1500 {
        out = out.chars().take(1500).collect();
    }

    out
}

/// Operator-facing run options. Scheduled and manual runs share them; only
/// `run_type` differs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    #[serde(default = "manual_run")]
    pub run_type: RunType,
    #[serde(default)]
    pub fast_mode: bool,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_true")]
    pub fix_issues: bool,
    #[serde(default)]
    pub category_filter: Option<String>,
}

fn manual_run() -> RunType {
    RunType::Manual
}

fn default_true() -> bool {
    true
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::manual()
    }
}

impl RunOptions {
    pub fn manual() -> Self {
        Self {
            run_type: RunType::Manual,
            fast_mode: false,
            dry_run: false,
            fix_issues: true,
            category_filter: None,
        }
    }

    pub fn scheduled(cfg: &MonitorConfig) -> Self {
        Self {
            run_type: RunType::Scheduled,
            fast_mode: cfg.fast_mode_scheduled,
            dry_run: false,
            fix_issues: cfg.fix_issues_scheduled,
            category_filter: None,
        }
    }

    pub fn metadata(&self) -> RunMetadata {
        RunMetadata {
            fast_mode: self.fast_mode,
            dry_run: self.dry_run,
            fix_enabled: self.fix_issues,
            category_filter: self.category_filter.clone(),
        }
    }
}

/// Split of the catalog for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Eligibility {
    /// Sources to fetch, in priority order (catalog order within a priority).
    pub eligible: Vec<SourceDescriptor>,
    /// Sources omitted by fast mode; recorded as `skipped` checks.
    pub skipped: Vec<SourceDescriptor>,
}

fn fast_mode_keeps(src: &SourceDescriptor) -> bool {
    match src.source_type {
        SourceType::BrowserScrape => false,
        SourceType::HtmlScrape => matches!(src.priority, Priority::Critical | Priority::High),
        SourceType::Feed | SourceType::Demo => true,
    }
}

/// Disabled sources never run. The category filter narrows the catalog
/// before fast mode does.
pub fn eligible_sources(catalog: &Catalog, opts: &RunOptions) -> Eligibility {
    let category = opts
        .category_filter
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());

    let mut out = Eligibility::default();
    for src in &catalog.sources {
        if src.is_disabled() {
            continue;
        }
        if let Some(cat) = category {
            if !src.in_category(cat) {
                continue;
            }
        }
        if opts.fast_mode && !fast_mode_keeps(src) {
            out.skipped.push(src.clone());
            continue;
        }
        out.eligible.push(src.clone());
    }

    // stable: ties keep catalog order
    out.eligible.sort_by_key(|s| s.priority.rank());

    if let Some(cat) = category {
        if out.eligible.is_empty() && out.skipped.is_empty() {
            match catalog.suggest_category(cat) {
                Some(hint) => tracing::warn!(
                    target: "ingest",
                    category = cat,
                    suggestion = %hint,
                    "category filter matched no sources"
                ),
                None => tracing::warn!(target: "ingest", category = cat, "category filter matched no sources"),
            }
        }
    }
    out
}

/// Full result of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub status: RunStatus,
    pub totals: RunTotals,
    pub checks: Vec<SourceCheck>,
    pub issues: Vec<Issue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert: Option<SendResult>,
}

/// Synchronous result handed to operators: `{success, run_id, totals, issues}`
/// or `{success: false, error}`.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<RunStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub totals: Option<RunTotals>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<Issue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<RunReport> for RunOutcome {
    fn from(r: RunReport) -> Self {
        Self {
            success: true,
            run_id: Some(r.run_id),
            status: Some(r.status),
            totals: Some(r.totals),
            issues: r.issues,
            error: None,
        }
    }
}

impl RunOutcome {
    pub fn failed(error: String) -> Self {
        Self {
            success: false,
            run_id: None,
            status: None,
            totals: None,
            issues: Vec::new(),
            error: Some(error),
        }
    }
}

pub struct Orchestrator {
    catalog: CatalogSource,
    registry: AdapterRegistry,
    store: Arc<dyn ItemStore>,
    recorder: Arc<dyn RunRecorder>,
    remediation: RemediationEngine,
    browser: Option<Arc<BrowserHandle>>,
    notifier: NotifierMux,
    // one cooldown gate per notification target
    gates: tokio::sync::Mutex<Vec<AlertGate>>,
    cfg: MonitorConfig,
    cancel: AtomicBool,
    // one run at a time; the browser session and staleness history assume it
    run_lock: tokio::sync::Mutex<()>,
}

impl Orchestrator {
    pub fn new(
        catalog: CatalogSource,
        registry: AdapterRegistry,
        store: Arc<dyn ItemStore>,
        recorder: Arc<dyn RunRecorder>,
        cfg: MonitorConfig,
    ) -> Self {
        let remediation = RemediationEngine::new(registry.clone(), store.clone(), &cfg);
        Self {
            catalog,
            registry,
            store,
            recorder,
            remediation,
            browser: None,
            notifier: NotifierMux::default(),
            gates: tokio::sync::Mutex::new(vec![AlertGate::new(cfg.alert_cooldown_secs)]),
            cfg,
            cancel: AtomicBool::new(false),
            run_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Register browser scraping and its restart-and-retry remediation on a
    /// shared session handle. Call before `with_remediation`.
    pub fn with_browser(mut self, handle: Arc<BrowserHandle>) -> Self {
        self.registry = self.registry.register(
            SourceType::BrowserScrape,
            Arc::new(BrowserScrapeAdapter::new(handle.clone())),
        );
        self.remediation =
            RemediationEngine::new(self.registry.clone(), self.store.clone(), &self.cfg)
                .with_browser(handle.clone());
        self.browser = Some(handle);
        self
    }

    pub fn with_remediation(mut self, engine: RemediationEngine) -> Self {
        self.remediation = engine;
        self
    }

    pub fn with_notifier(mut self, notifier: NotifierMux) -> Self {
        let gates = (0..notifier.targets())
            .map(|_| AlertGate::new(self.cfg.alert_cooldown_secs))
            .collect();
        self.gates = tokio::sync::Mutex::new(gates);
        self.notifier = notifier;
        self
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.cfg
    }

    pub fn recorder(&self) -> Arc<dyn RunRecorder> {
        self.recorder.clone()
    }

    /// Ask the in-flight run to stop after the current source. The source
    /// being fetched finishes or times out normally.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Run once and fold any orchestration-level failure into the outcome.
    pub async fn trigger(&self, opts: RunOptions) -> RunOutcome {
        match self.run_orchestration(&opts).await {
            Ok(report) => report.into(),
            Err(e) => {
                tracing::error!(target: "ingest", error = %format!("{e:#}"), "run failed");
                RunOutcome::failed(format!("{e:#}"))
            }
        }
    }

    /// Execute one run. `Err` only when the run itself could not execute
    /// (recorder unavailable at start, catalog unreadable).
    pub async fn run_orchestration(&self, opts: &RunOptions) -> Result<RunReport> {
        ensure_metrics_described();
        let _running = self.run_lock.lock().await;
        self.cancel.store(false, Ordering::SeqCst);

        let run_id = self
            .recorder
            .create_run(opts.run_type, opts.metadata())
            .await
            .context("creating run record")?;

        let catalog = match self.catalog.load() {
            Ok(c) => c,
            Err(e) => {
                self.finish(&run_id, RunStatus::Error, RunTotals::default()).await;
                counter!("sentinel_runs_total", "status" => "error").increment(1);
                return Err(e.context("loading source catalog"));
            }
        };

        let Eligibility { eligible, skipped } = eligible_sources(&catalog, opts);
        tracing::info!(
            target: "ingest",
            run_id = %run_id,
            run_type = ?opts.run_type,
            eligible = eligible.len(),
            skipped = skipped.len(),
            dry_run = opts.dry_run,
            "run started"
        );

        let last_success = match self.recorder.last_success_timestamps().await {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(target: "ingest", error = %e, "no success history; staleness checks disabled for this run");
                HashMap::new()
            }
        };

        let mut totals = RunTotals::default();
        let mut checks = Vec::with_capacity(eligible.len() + skipped.len());
        let delay = self.cfg.inter_source_delay();

        for (idx, src) in eligible.iter().enumerate() {
            if self.cancel.load(Ordering::SeqCst) {
                tracing::warn!(target: "ingest", run_id = %run_id, remaining = eligible.len() - idx, "run cancelled");
                break;
            }
            if idx > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let check = self
                .process_source(&run_id, src, last_success.get(&src.name).copied(), opts)
                .await;
            self.record(&check).await;
            totals.absorb(&check, check.new_count as usize);
            checks.push(check);
        }

        for src in &skipped {
            let check = SourceCheck::skipped(&run_id, src, FAST_MODE_SKIP_REASON);
            self.record(&check).await;
            totals.absorb(&check, 0);
            checks.push(check);
        }

        if let Some(browser) = &self.browser {
            browser.shutdown().await;
        }

        let status = totals.status();
        self.finish(&run_id, status, totals).await;

        counter!("sentinel_runs_total", "status" => status_label(status)).increment(1);
        counter!("sentinel_new_items_total").increment(u64::from(totals.new_updates));
        gauge!("sentinel_last_run_ts").set(Utc::now().timestamp() as f64);

        let issues: Vec<Issue> = checks.iter().filter_map(Issue::from_check).collect();
        tracing::info!(
            target: "ingest",
            run_id = %run_id,
            status = status_label(status),
            total = totals.total_sources,
            errors = totals.error_sources,
            stale = totals.stale_sources,
            fixed = totals.fixed_sources,
            new = totals.new_updates,
            "run finished"
        );

        let alert = if issues.is_empty() || opts.dry_run {
            None
        } else {
            self.send_alert(&run_id, &issues, &totals).await
        };

        Ok(RunReport {
            run_id,
            status,
            totals,
            checks,
            issues,
            alert,
        })
    }

    async fn process_source(
        &self,
        run_id: &str,
        src: &SourceDescriptor,
        last_success: Option<DateTime<Utc>>,
        opts: &RunOptions,
    ) -> SourceCheck {
        let t0 = Instant::now();
        let mut check = SourceCheck::for_source(run_id, src);
        let timeout = src
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.cfg.default_timeout());

        let fetched = self.fetch(src, timeout).await;
        histogram!("sentinel_fetch_ms").record(t0.elapsed().as_millis() as f64);

        let mut classification: Option<ErrorClassification> = None;
        let outcome = match fetched {
            Ok(items) => {
                let persisted = persist_items(self.store.as_ref(), &items, opts.dry_run).await;
                check.fetched_count = items.len() as u32;
                check.saved_count = persisted.saved as u32;
                check.new_count = persisted.new as u32;
                FetchOutcome::Items {
                    fetched: items.len(),
                    new: persisted.new,
                }
            }
            Err(e) => {
                let message = e.to_string();
                let c = classify_failure(&e);
                tracing::warn!(
                    target: "ingest",
                    source = %src.name,
                    category = %c.category,
                    error = %message,
                    "fetch failed"
                );
                check.error_category = Some(c.category);
                check.http_status_code = e.status_code().or_else(|| extract_status_code(&message));
                check.error_message = Some(message.clone());
                classification = Some(c);
                FetchOutcome::Failed { message }
            }
        };

        check.initial_status = HealthState::Pending
            .on_fetch(&outcome)
            .map(|s| s.surfaced())
            .unwrap_or(CheckStatus::Error);

        let assessment = health::assess(&outcome, last_success, src.recency_days, Utc::now());
        check.issue_type = assessment.issue_type;
        check.issue_detail = assessment.issue_detail;
        let mut state = assessment.state;

        if opts.fix_issues
            && remediation::should_attempt(
                assessment.issue_type,
                classification.as_ref(),
                src.source_type,
            )
        {
            state = self.remediate(src, state, &mut check, opts.dry_run).await;
        }

        check.final_status = state.surfaced();
        check.duration_ms = t0.elapsed().as_millis() as u64;
        check.checked_at = Utc::now();
        counter!("sentinel_source_checks_total", "status" => check.final_status.as_str())
            .increment(1);
        check
    }

    /// Adapter call isolated in its own task: a panic or a hang becomes an
    /// ordinary `FetchError`.
    async fn fetch(
        &self,
        src: &SourceDescriptor,
        timeout: Duration,
    ) -> Result<Vec<CandidateItem>, FetchError> {
        let adapter = self.registry.get(src.source_type).ok_or_else(|| {
            FetchError::Other(format!(
                "no adapter registered for source type {}",
                src.source_type
            ))
        })?;

        let source = src.clone();
        let opts = FetchOptions::with_timeout(timeout);
        let task = tokio::spawn(async move { adapter.fetch(&source, &opts).await });
        let abort = task.abort_handle();

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(res)) => res,
            Ok(Err(join)) => Err(FetchError::Other(format!("adapter task failed: {join}"))),
            Err(_) => {
                abort.abort();
                Err(FetchError::Timeout { after: timeout })
            }
        }
    }

    async fn remediate(
        &self,
        src: &SourceDescriptor,
        state: HealthState,
        check: &mut SourceCheck,
        dry_run: bool,
    ) -> HealthState {
        let attempting = match state.begin_fix() {
            Ok(s) => s,
            Err(e) => {
                tracing::debug!(target: "remediation", source = %src.name, error = %e, "fix not applicable");
                return state;
            }
        };

        let report = self.remediation.attempt_fix(src, dry_run).await;
        let fixed = report.status == FixStatus::Fixed;
        check.fix_actions.extend(report.fix_actions);
        if fixed {
            check.fetched_count = check.fetched_count.max(report.fetched_count);
            check.saved_count += report.saved_count;
            check.new_count += report.new_count;
        }

        attempting.finish_fix(fixed).unwrap_or(state)
    }

    async fn record(&self, check: &SourceCheck) {
        if let Err(e) = self.recorder.record_check(check).await {
            tracing::warn!(
                target: "recorder",
                run_id = %check.run_id,
                source = %check.source_name,
                error = %e,
                "check write failed"
            );
        }
    }

    async fn finish(&self, run_id: &str, status: RunStatus, totals: RunTotals) {
        let completion = RunCompletion {
            status,
            totals,
            completed_at: Utc::now(),
        };
        if let Err(e) = self.recorder.finish_run(run_id, completion).await {
            tracing::error!(target: "recorder", run_id = %run_id, error = %e, "finishing run failed");
        }
    }

    /// Each target is gated on its own: a channel that delivered is not
    /// re-alerted because another one failed.
    async fn send_alert(
        &self,
        run_id: &str,
        issues: &[Issue],
        totals: &RunTotals,
    ) -> Option<SendResult> {
        let now = Utc::now();
        let mut gates = self.gates.lock().await;
        let mut attempted = false;
        let mut errors = Vec::new();

        for (idx, gate) in gates.iter_mut().enumerate() {
            let due = gate.filter(issues, now);
            if due.is_empty() {
                continue;
            }
            attempted = true;
            let msg = compose_issue_summary(run_id, &due, totals, self.cfg.max_listed_issues);
            let channel = self.notifier.target_name(idx);
            match self.notifier.send_to(idx, &msg).await {
                Ok(()) => gate.record(&due, now),
                Err(e) => {
                    tracing::warn!(target: "notify", channel, error = %e, "notification failed");
                    errors.push(format!("{channel}: {e:#}"));
                }
            }
        }

        if !attempted {
            tracing::info!(target: "notify", run_id = %run_id, suppressed = issues.len(), "all issues inside alert cooldown");
            return None;
        }
        Some(SendResult {
            ok: errors.is_empty(),
            error: (!errors.is_empty()).then(|| errors.join("; ")),
        })
    }
}

fn status_label(s: RunStatus) -> &'static str {
    match s {
        RunStatus::Running => "running",
        RunStatus::Success => "success",
        RunStatus::Degraded => "degraded",
        RunStatus::Error => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn src(name: &str, t: SourceType, p: Priority) -> SourceDescriptor {
        SourceDescriptor {
            name: name.into(),
            authority: "A".into(),
            source_type: t,
            priority: p,
            recency_days: 30,
            category: Some("banking".into()),
            url: String::new(),
            timeout_secs: None,
        }
    }

    #[test]
    fn normalize_text_collapses_ws_and_decodes() {
        let s = "  <b>Hello,</b>&nbsp;&nbsp; \u{201C}world\u{201D}!  ";
        assert_eq!(normalize_text(s), "Hello, \"world\"!");
    }

    #[test]
    fn priority_order_is_stable() {
        let catalog = Catalog {
            sources: vec![
                src("low", SourceType::Feed, Priority::Low),
                src("crit-a", SourceType::Feed, Priority::Critical),
                src("off", SourceType::Feed, Priority::Disabled),
                src("crit-b", SourceType::Demo, Priority::Critical),
                src("med", SourceType::Feed, Priority::Medium),
            ],
        };
        let e = eligible_sources(&catalog, &RunOptions::manual());
        let names: Vec<_> = e.eligible.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["crit-a", "crit-b", "med", "low"]);
        assert!(e.skipped.is_empty());
    }

    #[test]
    fn fast_mode_skips_browser_and_minor_html() {
        let catalog = Catalog {
            sources: vec![
                src("browser", SourceType::BrowserScrape, Priority::Critical),
                src("html-high", SourceType::HtmlScrape, Priority::High),
                src("html-med", SourceType::HtmlScrape, Priority::Medium),
                src("feed-low", SourceType::Feed, Priority::Low),
            ],
        };
        let opts = RunOptions {
            fast_mode: true,
            ..RunOptions::manual()
        };
        let e = eligible_sources(&catalog, &opts);
        let kept: Vec<_> = e.eligible.iter().map(|s| s.name.as_str()).collect();
        let skipped: Vec<_> = e.skipped.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(kept, ["html-high", "feed-low"]);
        assert_eq!(skipped, ["browser", "html-med"]);
    }

    #[test]
    fn category_filter_is_case_insensitive() {
        let mut other = src("other", SourceType::Feed, Priority::High);
        other.category = Some("insurance".into());
        let catalog = Catalog {
            sources: vec![src("bank", SourceType::Feed, Priority::High), other],
        };
        let opts = RunOptions {
            category_filter: Some(" Banking ".into()),
            ..RunOptions::manual()
        };
        let e = eligible_sources(&catalog, &opts);
        assert_eq!(e.eligible.len(), 1);
        assert_eq!(e.eligible[0].name, "bank");
    }

    #[test]
    fn run_options_defaults_from_json() {
        let o: RunOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(o, RunOptions::manual());
        let o: RunOptions = serde_json::from_str(r#"{"run_type":"scheduled","fix_issues":false}"#).unwrap();
        assert_eq!(o.run_type, RunType::Scheduled);
        assert!(!o.fix_issues);
    }
}
