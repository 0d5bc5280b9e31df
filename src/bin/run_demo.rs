//! One orchestration run over a built-in demo catalog, in memory.
//! Run it twice in one process to see dedup turn `success` into `no_updates`.

use std::sync::Arc;

use source_sentinel::{
    AdapterRegistry, Catalog, CatalogSource, MemoryStore, MonitorConfig, Orchestrator, Priority,
    RunOptions, SourceDescriptor, SourceType,
};

fn demo_source(name: &str, authority: &str, priority: Priority, category: &str) -> SourceDescriptor {
    SourceDescriptor {
        name: name.into(),
        authority: authority.into(),
        source_type: SourceType::Demo,
        priority,
        recency_days: 30,
        category: Some(category.into()),
        url: String::new(),
        timeout_secs: None,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let catalog = Catalog::new(vec![
        demo_source("Central Bank Press", "Central Bank", Priority::Critical, "banking"),
        demo_source("Markets Authority News", "Markets Authority", Priority::High, "markets"),
        demo_source("Data Protection Notices", "DPA", Priority::Medium, "privacy"),
        demo_source("Archived Bulletin", "Old Agency", Priority::Disabled, "archive"),
    ])?;

    let store = Arc::new(MemoryStore::new());
    let orchestrator = Orchestrator::new(
        CatalogSource::Static(catalog),
        AdapterRegistry::with_defaults(),
        store.clone(),
        store.clone(),
        MonitorConfig::for_tests(),
    );

    for pass in 1..=2 {
        let outcome = orchestrator.trigger(RunOptions::manual()).await;
        println!("--- pass {pass} ---");
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    }
    println!("items stored: {}", store.item_count());
    Ok(())
}
