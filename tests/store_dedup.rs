// tests/store_dedup.rs
//
// At-most-once persistence per URL, and JSONL replay across reopen.

mod common;

use std::sync::Arc;

use chrono::Utc;
use common::{items, source};

use source_sentinel::model::{
    CheckStatus, RunCompletion, RunMetadata, RunStatus, RunTotals, RunType, SourceCheck,
};
use source_sentinel::store::persist_items;
use source_sentinel::{ItemStore, JsonlStore, MemoryStore, Priority, RunRecorder, SourceType};

#[tokio::test]
async fn same_url_in_one_batch_is_stored_once() {
    let store = MemoryStore::new();
    let mut batch = items("dup", 2);
    let mut twin = batch[0].clone();
    twin.url.push('/'); // canonical form is identical
    twin.title = "Different title, same article".into();
    batch.push(twin);

    let out = persist_items(&store, &batch, false).await;
    assert_eq!(out.new, 2);
    assert_eq!(out.saved, 2);
    assert_eq!(store.item_count(), 2);

    let again = persist_items(&store, &batch, false).await;
    assert_eq!(again.new, 0);
    assert_eq!(store.item_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_writers_produce_one_record() {
    let store = Arc::new(MemoryStore::new());
    let item = items("race", 1).remove(0);

    let mut handles = Vec::new();
    for _ in 0..16 {
        let store = store.clone();
        let item = item.clone();
        handles.push(tokio::spawn(async move { store.save(&item).await.unwrap() }));
    }
    let mut inserted = 0;
    for h in handles {
        if h.await.unwrap() {
            inserted += 1;
        }
    }
    assert_eq!(inserted, 1);
    assert_eq!(store.item_count(), 1);
}

#[tokio::test]
async fn dry_run_only_checks_existence() {
    let store = MemoryStore::new();
    let batch = items("dry", 3);
    store.save(&batch[0]).await.unwrap();

    let out = persist_items(&store, &batch, true).await;
    assert_eq!(out.new, 2);
    assert_eq!(out.saved, 0);
    assert_eq!(store.item_count(), 1);
}

#[tokio::test]
async fn jsonl_store_replays_items_runs_and_history() {
    let tmp = tempfile::tempdir().unwrap();
    let src = source("Wire", SourceType::Feed, Priority::High);

    let run_id = {
        let store = JsonlStore::open(tmp.path()).await.unwrap();
        for it in items("wire", 3) {
            assert!(store.save(&it).await.unwrap());
        }
        let run_id = store
            .create_run(RunType::Manual, RunMetadata::default())
            .await
            .unwrap();

        let mut check = SourceCheck::for_source(&run_id, &src);
        check.initial_status = CheckStatus::Success;
        check.final_status = CheckStatus::Success;
        check.fetched_count = 3;
        check.saved_count = 3;
        check.new_count = 3;
        store.record_check(&check).await.unwrap();

        let totals = RunTotals {
            total_sources: 1,
            success_sources: 1,
            new_updates: 3,
            total_processed: 3,
            ..RunTotals::default()
        };
        store
            .finish_run(
                &run_id,
                RunCompletion {
                    status: RunStatus::Success,
                    totals,
                    completed_at: Utc::now(),
                },
            )
            .await
            .unwrap();
        run_id
    };

    // A torn write must not poison replay.
    let checks_path = tmp.path().join("checks.jsonl");
    let mut raw = std::fs::read_to_string(&checks_path).unwrap();
    raw.push_str("{\"run_id\": \"trunc");
    std::fs::write(&checks_path, raw).unwrap();

    let reopened = JsonlStore::open(tmp.path()).await.unwrap();
    assert_eq!(reopened.item_count(), 3);
    assert!(reopened.exists("https://items.example/wire/1").await.unwrap());
    assert!(!reopened.save(&items("wire", 1)[0]).await.unwrap());

    let runs = reopened.recent_runs(10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].run_id, run_id);
    assert_eq!(runs[0].status, RunStatus::Success);
    assert_eq!(runs[0].totals.new_updates, 3);

    assert_eq!(reopened.checks_for_run(&run_id).await.unwrap().len(), 1);
    let last = reopened.last_success_timestamps().await.unwrap();
    assert!(last.contains_key("Wire"));
}

#[tokio::test]
async fn second_finish_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let store = JsonlStore::open(tmp.path()).await.unwrap();
    let run_id = store
        .create_run(RunType::Scheduled, RunMetadata::default())
        .await
        .unwrap();
    let done = RunCompletion {
        status: RunStatus::Degraded,
        totals: RunTotals::default(),
        completed_at: Utc::now(),
    };
    store.finish_run(&run_id, done).await.unwrap();
    assert!(store.finish_run(&run_id, done).await.is_err());

    let reopened = JsonlStore::open(tmp.path()).await.unwrap();
    assert_eq!(
        reopened.recent_runs(1).await.unwrap()[0].status,
        RunStatus::Degraded
    );
}
