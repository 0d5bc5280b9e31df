// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - POST /runs (demo catalog, then a failing catalog)
// - GET /runs?limit=
// - GET /runs/{run_id}/checks
// - GET /summary?hours=

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value as Json;
use tower::ServiceExt as _; // for `oneshot`

use source_sentinel::{
    AdapterRegistry, AppState, Catalog, CatalogSource, MemoryStore, MonitorConfig, Orchestrator,
    Priority, SourceDescriptor, SourceType,
};

const BODY_LIMIT: usize = 1024 * 1024; // 1MB, safe for tests

fn demo(name: &str, priority: Priority) -> SourceDescriptor {
    SourceDescriptor {
        name: name.into(),
        authority: "Demo Authority".into(),
        source_type: SourceType::Demo,
        priority,
        recency_days: 30,
        category: Some("demo".into()),
        url: String::new(),
        timeout_secs: None,
    }
}

fn router_for(catalog: CatalogSource) -> Router {
    let store = Arc::new(MemoryStore::new());
    let orch = Orchestrator::new(
        catalog,
        AdapterRegistry::with_defaults(),
        store.clone(),
        store,
        MonitorConfig::for_tests(),
    );
    source_sentinel::router(AppState::new(Arc::new(orch)))
}

fn demo_router() -> Router {
    let catalog = Catalog::new(vec![
        demo("Alpha", Priority::High),
        demo("Beta", Priority::Low),
    ])
    .expect("catalog");
    router_for(CatalogSource::Static(catalog))
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Json) {
    let resp = app.clone().oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    let json = serde_json::from_slice(&bytes).unwrap_or(Json::Null);
    (status, json)
}

fn post_runs(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/runs")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("build POST /runs")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build GET")
}

#[tokio::test]
async fn api_health_returns_200_and_ok_body() {
    let app = demo_router();
    let resp = app.oneshot(get("/health")).await.expect("oneshot /health");
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    assert_eq!(String::from_utf8(bytes.to_vec()).unwrap().trim(), "ok");
}

#[tokio::test]
async fn api_manual_run_then_history() {
    let app = demo_router();

    let (status, body) = send(&app, post_runs("{}")).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "success");
    assert_eq!(body["totals"]["total_sources"], 2);
    assert_eq!(body["totals"]["new_updates"], 6);
    let run_id = body["run_id"].as_str().expect("run_id").to_string();

    let (status, runs) = send(&app, get("/runs?limit=5")).await;
    assert_eq!(status, StatusCode::OK);
    let runs = runs.as_array().expect("array");
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0]["run_id"], run_id.as_str());
    assert_eq!(runs[0]["run_type"], "manual");
    assert!(runs[0]["completed_at"].is_string());

    let (status, checks) = send(&app, get(&format!("/runs/{run_id}/checks"))).await;
    assert_eq!(status, StatusCode::OK);
    let checks = checks.as_array().expect("array");
    assert_eq!(checks.len(), 2);
    assert_eq!(checks[0]["source_name"], "Alpha");
    assert_eq!(checks[0]["final_status"], "success");
    assert_eq!(checks[0]["source_type"], "demo");
}

#[tokio::test]
async fn api_summary_reflects_recorded_checks() {
    let app = demo_router();
    let (status, _) = send(&app, post_runs(r#"{"fast_mode": true}"#)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, summary) = send(&app, get("/summary?hours=6")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["window_hours"], 6);
    assert_eq!(summary["rollup"]["runs"], 1);
    assert_eq!(summary["rollup"]["checks"], 2);
    assert_eq!(summary["rollup"]["unresolved"], 0);
    assert!(summary["text"].as_str().unwrap().contains("No unresolved issues"));
}

#[tokio::test]
async fn api_failed_run_is_structured_error() {
    let app = router_for(CatalogSource::File("nope/sources.toml".into()));
    let (status, body) = send(&app, post_runs(r#"{"run_type": "scheduled"}"#)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("catalog"));
    assert!(body.get("totals").is_none());
}
