// src/ingest/providers/demo.rs
use async_trait::async_trait;
use chrono::Utc;

use crate::catalog::{SourceDescriptor, SourceType};
use crate::ingest::types::{CandidateItem, FetchError, FetchOptions, SourceAdapter};

/// Deterministic offline adapter: `items_per_source` items per source, with
/// URLs derived from the source name so repeated runs dedup to nothing new.
pub struct DemoAdapter {
    pub items_per_source: usize,
}

impl Default for DemoAdapter {
    fn default() -> Self {
        Self { items_per_source: 3 }
    }
}

fn slug(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect::<String>()
        .split('-')
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[async_trait]
impl SourceAdapter for DemoAdapter {
    async fn fetch(
        &self,
        source: &SourceDescriptor,
        _opts: &FetchOptions,
    ) -> Result<Vec<CandidateItem>, FetchError> {
        let base = slug(&source.name);
        Ok((1..=self.items_per_source)
            .map(|n| CandidateItem {
                title: format!("{} update #{n}", source.name),
                url: format!("https://demo.invalid/{base}/{n}"),
                published_at: Some(Utc::now()),
                summary: format!("Demo item {n} from {}", source.authority),
                authority: source.authority.clone(),
                source_type: SourceType::Demo,
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "demo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_collapses_separators() {
        assert_eq!(slug("ECB  Press / Releases"), "ecb-press-releases");
    }
}
