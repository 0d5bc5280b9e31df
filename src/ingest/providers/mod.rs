// src/ingest/providers/mod.rs
pub mod browser;
pub mod demo;
pub mod feed;
pub mod html;

use std::collections::HashMap;
use std::sync::Arc;

use crate::catalog::SourceType;
use crate::ingest::types::SourceAdapter;

/// `SourceType → adapter` dispatch. New source types register here; the
/// orchestrator never branches on type.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<SourceType, Arc<dyn SourceAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, source_type: SourceType, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.adapters.insert(source_type, adapter);
        self
    }

    pub fn get(&self, source_type: SourceType) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.get(&source_type).cloned()
    }

    pub fn supports(&self, source_type: SourceType) -> bool {
        self.adapters.contains_key(&source_type)
    }

    /// Feed, HTML and demo adapters with default HTTP clients. Browser
    /// scraping needs a launcher and is registered by the caller.
    pub fn with_defaults() -> Self {
        Self::new()
            .register(SourceType::Feed, Arc::new(feed::FeedAdapter::new()))
            .register(SourceType::HtmlScrape, Arc::new(html::HtmlScrapeAdapter::new()))
            .register(SourceType::Demo, Arc::new(demo::DemoAdapter::default()))
    }
}
