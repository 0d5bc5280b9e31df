// src/store/mod.rs
//! Item persistence with at-most-once semantics per URL.
//!
//! `ItemStore::save` is an atomic insert-if-absent: implementations hold one
//! lock across the existence check and the write, so two writers racing on
//! the same URL still produce a single record.

pub mod jsonl;
pub mod memory;

use std::collections::HashSet;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ingest::types::CandidateItem;

pub use jsonl::JsonlStore;
pub use memory::MemoryStore;

#[async_trait::async_trait]
pub trait ItemStore: Send + Sync {
    async fn exists(&self, url: &str) -> Result<bool>;
    /// Returns `true` if the item was written, `false` if its URL was already stored.
    async fn save(&self, item: &CandidateItem) -> Result<bool>;
}

/// Stored form of a candidate item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredItem {
    pub id: String,
    pub saved_at: DateTime<Utc>,
    #[serde(flatten)]
    pub item: CandidateItem,
}

impl StoredItem {
    pub fn new(item: CandidateItem) -> Self {
        Self {
            id: item_id(&item.url),
            saved_at: Utc::now(),
            item,
        }
    }
}

/// Identity key: trimmed, fragment stripped, trailing slash removed.
pub fn canonical_url(url: &str) -> String {
    let t = url.trim();
    let t = t.split('#').next().unwrap_or(t);
    t.strip_suffix('/').unwrap_or(t).to_string()
}

/// Short stable id for an item URL (safe to log).
pub fn item_id(url: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(canonical_url(url).as_bytes());
    let mut out = String::with_capacity(16);
    for b in digest.iter().take(8) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PersistOutcome {
    /// Items not previously stored.
    pub new: usize,
    /// Items actually written (0 in dry runs).
    pub saved: usize,
    pub failed: usize,
}

/// Push items through the dedup path. Write failures are logged and skipped.
pub async fn persist_items(
    store: &dyn ItemStore,
    items: &[CandidateItem],
    dry_run: bool,
) -> PersistOutcome {
    let mut out = PersistOutcome::default();
    let mut seen = HashSet::new();

    for item in items {
        let key = canonical_url(&item.url);
        if key.is_empty() || !seen.insert(key) {
            continue;
        }

        if dry_run {
            match store.exists(&item.url).await {
                Ok(false) => out.new += 1,
                Ok(true) => {}
                Err(e) => {
                    tracing::warn!(target: "store", error = %e, item = %item_id(&item.url), "exists check failed");
                    out.failed += 1;
                }
            }
            continue;
        }

        match store.save(item).await {
            Ok(true) => {
                out.new += 1;
                out.saved += 1;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(target: "store", error = %e, item = %item_id(&item.url), "item write failed");
                out.failed += 1;
            }
        }
    }
    out
}
