// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod alert;
pub mod api;
pub mod catalog;
pub mod config;
pub mod health;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod notify;
pub mod recorder;
pub mod remediation;
pub mod store;
pub mod taxonomy;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::catalog::{Catalog, CatalogSource, Priority, SourceDescriptor, SourceType};
pub use crate::config::MonitorConfig;
pub use crate::ingest::providers::AdapterRegistry;
pub use crate::ingest::types::{CandidateItem, FetchError, FetchOptions, SourceAdapter};
pub use crate::ingest::{Orchestrator, RunOptions, RunOutcome, RunReport};
pub use crate::notify::NotifierMux;
pub use crate::recorder::RunRecorder;
pub use crate::store::{ItemStore, JsonlStore, MemoryStore};
