//! Append-only JSON-lines store.
//!
//! Layout under `dir`:
//! - `runs.jsonl`: `RunEvent` lines (started / finished)
//! - `checks.jsonl`: one `SourceCheck` per line
//! - `items.jsonl`: one `StoredItem` per line
//!
//! Files are replayed into a `MemoryStore` on open; every mutation is applied
//! in memory first and then appended. Malformed lines are skipped on replay.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex as AsyncMutex;

use super::memory::{MemoryState, MemoryStore};
use super::{canonical_url, ItemStore, StoredItem};
use crate::ingest::types::CandidateItem;
use crate::model::{RunCompletion, RunMetadata, RunRecord, RunType, SourceCheck};
use crate::recorder::RunRecorder;

const RUNS_FILE: &str = "runs.jsonl";
const CHECKS_FILE: &str = "checks.jsonl";
const ITEMS_FILE: &str = "items.jsonl";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum RunEvent {
    Started(RunRecord),
    Finished {
        run_id: String,
        completion: RunCompletion,
    },
}

pub struct JsonlStore {
    dir: PathBuf,
    mem: MemoryStore,
    // Serializes appends so lines never interleave.
    write_lock: AsyncMutex<()>,
}

impl JsonlStore {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating store dir {}", dir.display()))?;

        let mut state = MemoryState::default();

        for ev in read_lines::<RunEvent>(&dir.join(RUNS_FILE)).await? {
            match ev {
                RunEvent::Started(run) => state.runs.push(run),
                RunEvent::Finished { run_id, completion } => {
                    if let Err(e) = state.finish(&run_id, &completion) {
                        tracing::warn!(target: "recorder", run_id = %run_id, error = %e, "skipping finish event on replay");
                    }
                }
            }
        }
        for check in read_lines::<SourceCheck>(&dir.join(CHECKS_FILE)).await? {
            state.push_check(check);
        }
        for stored in read_lines::<StoredItem>(&dir.join(ITEMS_FILE)).await? {
            state
                .items
                .entry(canonical_url(&stored.item.url))
                .or_insert(stored);
        }

        tracing::info!(
            target: "recorder",
            dir = %dir.display(),
            runs = state.runs.len(),
            checks = state.checks.len(),
            items = state.items.len(),
            "jsonl store opened"
        );

        Ok(Self {
            dir,
            mem: MemoryStore::from_state(state),
            write_lock: AsyncMutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn item_count(&self) -> usize {
        self.mem.item_count()
    }

    async fn append<T: Serialize>(&self, file: &str, value: &T) -> Result<()> {
        let mut line = serde_json::to_vec(value).context("serialize jsonl line")?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        let path = self.dir.join(file);
        let mut f = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("open {}", path.display()))?;
        f.write_all(&line)
            .await
            .with_context(|| format!("append {}", path.display()))?;
        f.flush().await?;
        Ok(())
    }
}

async fn read_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
    };
    let mut out = Vec::new();
    for (n, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(v) => out.push(v),
            Err(e) => {
                tracing::warn!(target: "recorder", file = %path.display(), line = n + 1, error = %e, "skipping malformed line")
            }
        }
    }
    Ok(out)
}

#[async_trait::async_trait]
impl ItemStore for JsonlStore {
    async fn exists(&self, url: &str) -> Result<bool> {
        self.mem.exists(url).await
    }

    async fn save(&self, item: &CandidateItem) -> Result<bool> {
        let stored = {
            let mut state = self.mem.state()?;
            match state.insert_item(item) {
                Some(s) => s,
                None => return Ok(false),
            }
        };
        if let Err(e) = self.append(ITEMS_FILE, &stored).await {
            // Undo so a retry can write it again.
            self.mem.state()?.items.remove(&canonical_url(&item.url));
            return Err(e);
        }
        Ok(true)
    }
}

#[async_trait::async_trait]
impl RunRecorder for JsonlStore {
    async fn create_run(&self, run_type: RunType, metadata: RunMetadata) -> Result<String> {
        let run = RunRecord::start(uuid::Uuid::new_v4().to_string(), run_type, metadata);
        self.append(RUNS_FILE, &RunEvent::Started(run.clone())).await?;
        let id = run.run_id.clone();
        self.mem.state()?.runs.push(run);
        Ok(id)
    }

    async fn record_check(&self, check: &SourceCheck) -> Result<()> {
        self.append(CHECKS_FILE, check).await?;
        self.mem.record_check(check).await
    }

    async fn finish_run(&self, run_id: &str, completion: RunCompletion) -> Result<()> {
        // Validate the transition before anything hits disk.
        self.mem.state()?.finish(run_id, &completion)?;
        self.append(
            RUNS_FILE,
            &RunEvent::Finished {
                run_id: run_id.to_string(),
                completion,
            },
        )
        .await
    }

    async fn last_success_timestamps(&self) -> Result<HashMap<String, DateTime<Utc>>> {
        self.mem.last_success_timestamps().await
    }

    async fn checks_since(&self, since: DateTime<Utc>) -> Result<Vec<SourceCheck>> {
        self.mem.checks_since(since).await
    }

    async fn checks_for_run(&self, run_id: &str) -> Result<Vec<SourceCheck>> {
        self.mem.checks_for_run(run_id).await
    }

    async fn recent_runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        self.mem.recent_runs(limit).await
    }
}
