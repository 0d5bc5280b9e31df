//! # Run and check records
//! Data contracts shared by the orchestrator, the recorder and the alert
//! composer. A `RunRecord` is created `running` and finished exactly once;
//! a `SourceCheck` is immutable once recorded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::{Priority, SourceDescriptor, SourceType};
use crate::taxonomy::ErrorCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunType {
    #[default]
    Scheduled,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    Degraded,
    Error,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

/// Aggregate counts for one run.
///
/// `total_sources = success + fixed + no_update + stale + error`; skipped
/// sources are counted separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RunTotals {
    pub total_sources: u32,
    pub success_sources: u32,
    pub fixed_sources: u32,
    pub no_update_sources: u32,
    pub stale_sources: u32,
    pub error_sources: u32,
    pub skipped_sources: u32,
    pub new_updates: u32,
    pub total_processed: u32,
}

impl RunTotals {
    /// Fold one finished check into the totals.
    pub fn absorb(&mut self, check: &SourceCheck, new_items: usize) {
        if check.final_status == CheckStatus::Skipped {
            self.skipped_sources += 1;
            return;
        }
        self.total_sources += 1;
        match check.final_status {
            CheckStatus::Success => self.success_sources += 1,
            CheckStatus::Fixed => self.fixed_sources += 1,
            CheckStatus::NoUpdates => self.no_update_sources += 1,
            CheckStatus::Stale => self.stale_sources += 1,
            CheckStatus::Error => self.error_sources += 1,
            CheckStatus::Skipped => {}
        }
        self.new_updates += new_items as u32;
        self.total_processed += check.fetched_count;
    }

    pub fn status(&self) -> RunStatus {
        if self.error_sources > 0 || self.stale_sources > 0 {
            RunStatus::Degraded
        } else {
            RunStatus::Success
        }
    }
}

/// Echo of the run options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RunMetadata {
    pub fast_mode: bool,
    pub dry_run: bool,
    pub fix_enabled: bool,
    pub category_filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub run_type: RunType,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub totals: RunTotals,
    pub metadata: RunMetadata,
}

impl RunRecord {
    pub fn start(run_id: String, run_type: RunType, metadata: RunMetadata) -> Self {
        Self {
            run_id,
            run_type,
            started_at: Utc::now(),
            completed_at: None,
            status: RunStatus::Running,
            totals: RunTotals::default(),
            metadata,
        }
    }

    /// Apply the single terminal transition. `completed_at` never precedes
    /// `started_at`.
    pub fn finish(&mut self, completion: &RunCompletion) -> anyhow::Result<()> {
        if self.status.is_terminal() {
            anyhow::bail!("run {} already finished as {:?}", self.run_id, self.status);
        }
        if !completion.status.is_terminal() {
            anyhow::bail!("run {} cannot finish as running", self.run_id);
        }
        self.status = completion.status;
        self.totals = completion.totals;
        self.completed_at = Some(completion.completed_at.max(self.started_at));
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunCompletion {
    pub status: RunStatus,
    pub totals: RunTotals,
    pub completed_at: DateTime<Utc>,
}

/// Status surfaced on a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Success,
    NoUpdates,
    Stale,
    Error,
    Fixed,
    Skipped,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Success => "success",
            CheckStatus::NoUpdates => "no_updates",
            CheckStatus::Stale => "stale",
            CheckStatus::Error => "error",
            CheckStatus::Fixed => "fixed",
            CheckStatus::Skipped => "skipped",
        }
    }

    /// Still broken after the run finished.
    pub fn is_unresolved(&self) -> bool {
        matches!(self, CheckStatus::Stale | CheckStatus::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IssueType {
    #[default]
    None,
    Error,
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixStep {
    Retry,
    Fallback,
    Restart,
}

/// One remediation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixAction {
    pub step: FixStep,
    pub method: String,
    pub success: bool,
    pub fetched_count: u32,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-source outcome within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceCheck {
    pub run_id: String,
    pub source_name: String,
    pub authority: String,
    pub source_type: SourceType,
    pub priority: Priority,
    #[serde(default)]
    pub category: Option<String>,
    pub initial_status: CheckStatus,
    pub final_status: CheckStatus,
    pub issue_type: IssueType,
    #[serde(default)]
    pub issue_detail: Option<String>,
    pub fetched_count: u32,
    pub saved_count: u32,
    /// New items found, whether or not they were written (dry runs).
    #[serde(default)]
    pub new_count: u32,
    #[serde(default)]
    pub error_message: Option<String>,
    pub duration_ms: u64,
    #[serde(default)]
    pub fix_actions: Vec<FixAction>,
    #[serde(default)]
    pub error_category: Option<ErrorCategory>,
    #[serde(default)]
    pub http_status_code: Option<u16>,
    pub checked_at: DateTime<Utc>,
}

impl SourceCheck {
    /// Empty check for `source`, before any outcome is known.
    pub fn for_source(run_id: &str, source: &SourceDescriptor) -> Self {
        Self {
            run_id: run_id.to_string(),
            source_name: source.name.clone(),
            authority: source.authority.clone(),
            source_type: source.source_type,
            priority: source.priority,
            category: source.category.clone(),
            initial_status: CheckStatus::Skipped,
            final_status: CheckStatus::Skipped,
            issue_type: IssueType::None,
            issue_detail: None,
            fetched_count: 0,
            saved_count: 0,
            new_count: 0,
            error_message: None,
            duration_ms: 0,
            fix_actions: Vec::new(),
            error_category: None,
            http_status_code: None,
            checked_at: Utc::now(),
        }
    }

    pub fn skipped(run_id: &str, source: &SourceDescriptor, reason: &str) -> Self {
        let mut c = Self::for_source(run_id, source);
        c.issue_detail = Some(reason.to_string());
        c
    }

    pub fn fix_attempted(&self) -> bool {
        !self.fix_actions.is_empty()
    }

    /// Counts as a "successful fetch" for staleness purposes.
    pub fn is_success_marker(&self) -> bool {
        matches!(self.final_status, CheckStatus::Success | CheckStatus::Fixed) && self.new_count > 0
    }
}
