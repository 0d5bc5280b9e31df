//! In-memory store and recorder (tests, demo runs, and the state behind `JsonlStore`).

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};

use super::{canonical_url, ItemStore, StoredItem};
use crate::ingest::types::CandidateItem;
use crate::model::{RunCompletion, RunMetadata, RunRecord, RunType, SourceCheck};
use crate::recorder::{note_success, RunRecorder};

#[derive(Debug, Default)]
pub(crate) struct MemoryState {
    pub(crate) items: HashMap<String, StoredItem>,
    pub(crate) runs: Vec<RunRecord>,
    pub(crate) checks: Vec<SourceCheck>,
    // kept current on every check write; never rebuilt from `checks`
    pub(crate) last_success: HashMap<String, DateTime<Utc>>,
}

impl MemoryState {
    /// Insert-if-absent. Returns the stored record when it was new.
    pub(crate) fn insert_item(&mut self, item: &CandidateItem) -> Option<StoredItem> {
        let key = canonical_url(&item.url);
        if self.items.contains_key(&key) {
            return None;
        }
        let stored = StoredItem::new(item.clone());
        self.items.insert(key, stored.clone());
        Some(stored)
    }

    pub(crate) fn push_check(&mut self, check: SourceCheck) {
        note_success(&mut self.last_success, &check);
        self.checks.push(check);
    }

    pub(crate) fn finish(&mut self, run_id: &str, completion: &RunCompletion) -> Result<RunRecord> {
        let run = self
            .runs
            .iter_mut()
            .find(|r| r.run_id == run_id)
            .ok_or_else(|| anyhow!("unknown run {run_id}"))?;
        run.finish(completion)?;
        Ok(run.clone())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_state(state: MemoryState) -> Self {
        Self {
            inner: Mutex::new(state),
        }
    }

    pub(crate) fn state(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("memory store mutex poisoned"))
    }

    pub fn item_count(&self) -> usize {
        self.state().map(|s| s.items.len()).unwrap_or(0)
    }

    pub fn items(&self) -> Vec<StoredItem> {
        self.state()
            .map(|s| s.items.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Seed a historical check (backfill, tests).
    pub fn push_check(&self, check: SourceCheck) -> Result<()> {
        self.state()?.push_check(check);
        Ok(())
    }
}

#[async_trait::async_trait]
impl ItemStore for MemoryStore {
    async fn exists(&self, url: &str) -> Result<bool> {
        Ok(self.state()?.items.contains_key(&canonical_url(url)))
    }

    async fn save(&self, item: &CandidateItem) -> Result<bool> {
        Ok(self.state()?.insert_item(item).is_some())
    }
}

#[async_trait::async_trait]
impl RunRecorder for MemoryStore {
    async fn create_run(&self, run_type: RunType, metadata: RunMetadata) -> Result<String> {
        let run = RunRecord::start(uuid::Uuid::new_v4().to_string(), run_type, metadata);
        let id = run.run_id.clone();
        self.state()?.runs.push(run);
        Ok(id)
    }

    async fn record_check(&self, check: &SourceCheck) -> Result<()> {
        self.state()?.push_check(check.clone());
        Ok(())
    }

    async fn finish_run(&self, run_id: &str, completion: RunCompletion) -> Result<()> {
        self.state()?.finish(run_id, &completion).map(|_| ())
    }

    async fn last_success_timestamps(&self) -> Result<HashMap<String, DateTime<Utc>>> {
        Ok(self.state()?.last_success.clone())
    }

    async fn checks_since(&self, since: DateTime<Utc>) -> Result<Vec<SourceCheck>> {
        Ok(self
            .state()?
            .checks
            .iter()
            .filter(|c| c.checked_at >= since)
            .cloned()
            .collect())
    }

    async fn checks_for_run(&self, run_id: &str) -> Result<Vec<SourceCheck>> {
        Ok(self
            .state()?
            .checks
            .iter()
            .filter(|c| c.run_id == run_id)
            .cloned()
            .collect())
    }

    async fn recent_runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        Ok(self.state()?.runs.iter().rev().take(limit).cloned().collect())
    }
}
