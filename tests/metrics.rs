// tests/metrics.rs
#![cfg(feature = "strict-metrics")]

use std::sync::Arc;

use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use source_sentinel::metrics::Metrics;
use source_sentinel::{
    AdapterRegistry, Catalog, CatalogSource, MemoryStore, MonitorConfig, Orchestrator, Priority,
    RunOptions, SourceDescriptor, SourceType,
};

#[tokio::test]
async fn metrics_exposed_after_run() {
    // Install the global recorder for this test binary
    let metrics = Metrics::init().expect("recorder");

    let catalog = Catalog::new(vec![SourceDescriptor {
        name: "Metrics Demo".into(),
        authority: "Demo".into(),
        source_type: SourceType::Demo,
        priority: Priority::High,
        recency_days: 30,
        category: None,
        url: String::new(),
        timeout_secs: None,
    }])
    .unwrap();
    let store = Arc::new(MemoryStore::new());
    let orch = Orchestrator::new(
        CatalogSource::Static(catalog),
        AdapterRegistry::with_defaults(),
        store.clone(),
        store,
        MonitorConfig::for_tests(),
    );
    let outcome = orch.trigger(RunOptions::manual()).await;
    assert!(outcome.success);

    let resp = metrics
        .router()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    // axum::body::to_bytes requires an explicit limit
    let body = body::to_bytes(resp.into_body(), 1_048_576).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();

    for series in [
        "sentinel_runs_total",
        "sentinel_source_checks_total",
        "sentinel_new_items_total",
        "sentinel_fetch_ms",
        "sentinel_last_run_ts",
    ] {
        assert!(text.contains(series), "missing {series} in:\n{text}");
    }
    assert!(text.contains("status=\"success\""));
}
