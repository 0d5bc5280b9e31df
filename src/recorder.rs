//! Run/check recorder contract.
//!
//! Append-only audit trail of runs and per-source checks. It is also the
//! only source of "last successful fetch per source", which feeds the
//! staleness check of the next run.

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::model::{RunCompletion, RunMetadata, RunRecord, RunType, SourceCheck};

#[async_trait::async_trait]
pub trait RunRecorder: Send + Sync {
    /// Create a `running` record and return its id.
    async fn create_run(&self, run_type: RunType, metadata: RunMetadata) -> Result<String>;
    async fn record_check(&self, check: &SourceCheck) -> Result<()>;
    /// Single terminal transition; a second call is an error.
    async fn finish_run(&self, run_id: &str, completion: RunCompletion) -> Result<()>;
    async fn last_success_timestamps(&self) -> Result<HashMap<String, DateTime<Utc>>>;
    async fn checks_since(&self, since: DateTime<Utc>) -> Result<Vec<SourceCheck>>;
    async fn checks_for_run(&self, run_id: &str) -> Result<Vec<SourceCheck>>;
    /// Newest first.
    async fn recent_runs(&self, limit: usize) -> Result<Vec<RunRecord>>;
}

/// Advance `source → latest success timestamp` with one recorded check.
pub fn note_success(last: &mut HashMap<String, DateTime<Utc>>, check: &SourceCheck) {
    if !check.is_success_marker() {
        return;
    }
    last.entry(check.source_name.clone())
        .and_modify(|ts| {
            if check.checked_at > *ts {
                *ts = check.checked_at;
            }
        })
        .or_insert(check.checked_at);
}
