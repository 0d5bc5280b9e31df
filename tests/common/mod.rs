// tests/common/mod.rs
//
// Scripted adapters, a capturing notifier and catalog helpers shared by the
// integration tests. Each test binary uses a different subset.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use source_sentinel::alert::AlertMessage;
use source_sentinel::notify::Notifier;
use source_sentinel::{
    CandidateItem, FetchError, FetchOptions, Priority, SourceAdapter, SourceDescriptor, SourceType,
};

pub enum Step {
    Items(Vec<CandidateItem>),
    Fail(FetchError),
    /// Sleep, then return nothing. Used to trip the orchestrator's timeout.
    Hang(Duration),
    Panic,
}

/// Plays back a per-source queue of steps; an exhausted queue yields `Ok(vec![])`.
#[derive(Default)]
pub struct ScriptedAdapter {
    script: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<Vec<(String, FetchOptions)>>,
}

impl ScriptedAdapter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, source: &str, step: Step) {
        self.script
            .lock()
            .entry(source.to_string())
            .or_default()
            .push_back(step);
    }

    pub fn calls(&self) -> Vec<(String, FetchOptions)> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, source: &str) -> Vec<FetchOptions> {
        self.calls
            .lock()
            .iter()
            .filter(|(s, _)| s == source)
            .map(|(_, o)| *o)
            .collect()
    }
}

#[async_trait]
impl SourceAdapter for ScriptedAdapter {
    async fn fetch(
        &self,
        source: &SourceDescriptor,
        opts: &FetchOptions,
    ) -> Result<Vec<CandidateItem>, FetchError> {
        self.calls.lock().push((source.name.clone(), *opts));
        let step = self
            .script
            .lock()
            .get_mut(&source.name)
            .and_then(|q| q.pop_front());
        match step {
            None => Ok(Vec::new()),
            Some(Step::Items(v)) => Ok(v),
            Some(Step::Fail(e)) => Err(e),
            Some(Step::Hang(d)) => {
                tokio::time::sleep(d).await;
                Ok(Vec::new())
            }
            Some(Step::Panic) => panic!("adapter blew up for {}", source.name),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Records every message instead of sending it.
#[derive(Default)]
pub struct CapturingNotifier {
    pub sent: Mutex<Vec<AlertMessage>>,
}

#[async_trait]
impl Notifier for CapturingNotifier {
    async fn send(&self, msg: &AlertMessage) -> anyhow::Result<()> {
        self.sent.lock().push(msg.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "capture"
    }
}

pub fn source(name: &str, source_type: SourceType, priority: Priority) -> SourceDescriptor {
    SourceDescriptor {
        name: name.into(),
        authority: format!("{name} Authority"),
        source_type,
        priority,
        recency_days: 30,
        category: None,
        url: format!("https://{}.example/feed", name.to_ascii_lowercase()),
        timeout_secs: None,
    }
}

pub fn items(prefix: &str, n: usize) -> Vec<CandidateItem> {
    (1..=n)
        .map(|i| CandidateItem {
            title: format!("{prefix} headline number {i}"),
            url: format!("https://items.example/{prefix}/{i}"),
            published_at: None,
            summary: String::new(),
            authority: "Test".into(),
            source_type: SourceType::Feed,
        })
        .collect()
}
