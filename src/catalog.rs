//! # Source Catalog
//!
//! Static, ordered list of source descriptors. Pure data: everything above
//! this module (orchestrator, classifier, remediation) only reads it.
//!
//! - Loads from TOML (`[[sources]]`) or JSON (bare array or `{"sources": [...]}`).
//! - Lookup order: `$SENTINEL_CATALOG_PATH` → `config/sources.toml` → `config/sources.json`.
//! - Catalog order is preserved; it breaks priority ties in the orchestrator.

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_CATALOG_PATH: &str = "SENTINEL_CATALOG_PATH";
pub const DEFAULT_CATALOG_TOML: &str = "config/sources.toml";
pub const DEFAULT_CATALOG_JSON: &str = "config/sources.json";

/// How a source is fetched. Each variant maps to exactly one adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceType {
    Feed,
    HtmlScrape,
    BrowserScrape,
    Demo,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Feed => "feed",
            SourceType::HtmlScrape => "html-scrape",
            SourceType::BrowserScrape => "browser-scrape",
            SourceType::Demo => "demo",
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduling priority. Declaration order is the run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
    Disabled,
}

impl Priority {
    /// Lower rank runs first.
    pub fn rank(&self) -> u8 {
        match self {
            Priority::Critical => 0,
            Priority::High => 1,
            Priority::Medium => 2,
            Priority::Low => 3,
            Priority::Disabled => u8::MAX,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
            Priority::Disabled => "disabled",
        }
    }
}

fn default_recency_days() -> u32 {
    30
}

/// Immutable description of one external source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Unique key.
    pub name: String,
    /// Owning organization label.
    pub authority: String,
    #[serde(rename = "type", alias = "source_type")]
    pub source_type: SourceType,
    pub priority: Priority,
    /// Max acceptable silence (days) before "no new items" counts as stale.
    #[serde(default = "default_recency_days")]
    pub recency_days: u32,
    #[serde(default)]
    pub category: Option<String>,
    /// Fetch target (feed URL or page URL). Demo sources may leave it empty.
    #[serde(default)]
    pub url: String,
    /// Per-source fetch timeout; falls back to the monitor default.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl SourceDescriptor {
    pub fn is_disabled(&self) -> bool {
        self.priority == Priority::Disabled
    }

    pub fn in_category(&self, category: &str) -> bool {
        self.category
            .as_deref()
            .is_some_and(|c| c.eq_ignore_ascii_case(category.trim()))
    }
}

/// Ordered source list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub sources: Vec<SourceDescriptor>,
}

impl Catalog {
    /// Build a catalog, rejecting empty or duplicate names.
    pub fn new(sources: Vec<SourceDescriptor>) -> Result<Self> {
        let mut seen = HashSet::new();
        for s in &sources {
            let name = s.name.trim();
            if name.is_empty() {
                bail!("source with empty name (authority '{}')", s.authority);
            }
            if !seen.insert(name.to_ascii_lowercase()) {
                bail!("duplicate source name '{name}' in catalog");
            }
        }
        Ok(Self { sources })
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&SourceDescriptor> {
        self.sources.iter().find(|s| s.name == name)
    }

    /// Distinct categories in catalog order.
    pub fn categories(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for c in self.sources.iter().filter_map(|s| s.category.as_deref()) {
            if !out.iter().any(|o| o.eq_ignore_ascii_case(c)) {
                out.push(c);
            }
        }
        out
    }

    /// Closest known category to `wanted`, for "did you mean" hints.
    pub fn suggest_category(&self, wanted: &str) -> Option<String> {
        let wanted = wanted.trim().to_ascii_lowercase();
        self.categories()
            .into_iter()
            .map(|c| (c, strsim::jaro_winkler(&wanted, &c.to_ascii_lowercase())))
            .filter(|(_, score)| *score >= 0.75)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(c, _)| c.to_string())
    }
}

/// Where the orchestrator gets its catalog from on each run.
#[derive(Debug, Clone)]
pub enum CatalogSource {
    Static(Catalog),
    File(PathBuf),
}

impl CatalogSource {
    pub fn load(&self) -> Result<Catalog> {
        match self {
            CatalogSource::Static(c) => Ok(c.clone()),
            CatalogSource::File(p) => load_catalog_from(p),
        }
    }
}

/// Load a catalog from an explicit path. Supports TOML or JSON formats.
pub fn load_catalog_from(path: &Path) -> Result<Catalog> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading source catalog from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_catalog(&content, ext.as_str())
        .with_context(|| format!("parsing source catalog {}", path.display()))
}

/// Resolve the catalog path using env var + fallbacks.
pub fn default_catalog_path() -> Result<PathBuf> {
    if let Ok(p) = std::env::var(ENV_CATALOG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return Ok(pb);
        }
        return Err(anyhow!("{ENV_CATALOG_PATH} points to non-existent path"));
    }
    for candidate in [DEFAULT_CATALOG_TOML, DEFAULT_CATALOG_JSON] {
        let pb = PathBuf::from(candidate);
        if pb.exists() {
            return Ok(pb);
        }
    }
    Err(anyhow!(
        "no source catalog found (set {ENV_CATALOG_PATH} or create {DEFAULT_CATALOG_TOML})"
    ))
}

pub fn load_catalog_default() -> Result<Catalog> {
    load_catalog_from(&default_catalog_path()?)
}

fn parse_catalog(s: &str, hint_ext: &str) -> Result<Catalog> {
    #[derive(Deserialize)]
    struct Wrapped {
        sources: Vec<SourceDescriptor>,
    }

    if hint_ext == "toml" {
        let w: Wrapped = toml::from_str(s)?;
        return Catalog::new(w.sources);
    }
    if let Ok(v) = serde_json::from_str::<Vec<SourceDescriptor>>(s) {
        return Catalog::new(v);
    }
    if let Ok(w) = serde_json::from_str::<Wrapped>(s) {
        return Catalog::new(w.sources);
    }
    let w: Wrapped = toml::from_str(s).map_err(|e| anyhow!("unsupported catalog format: {e}"))?;
    Catalog::new(w.sources)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOML: &str = r#"
[[sources]]
name = "ECB Press"
authority = "ECB"
type = "feed"
priority = "critical"
url = "https://www.ecb.europa.eu/rss/press.html"
category = "banking"

[[sources]]
name = "EBA News"
authority = "EBA"
type = "html-scrape"
priority = "medium"
recency_days = 14
"#;

    #[test]
    fn toml_catalog_parses_with_defaults() {
        let c = parse_catalog(TOML, "toml").unwrap();
        assert_eq!(c.len(), 2);
        assert_eq!(c.sources[0].source_type, SourceType::Feed);
        assert_eq!(c.sources[0].recency_days, 30);
        assert_eq!(c.sources[1].recency_days, 14);
        assert_eq!(c.sources[1].category, None);
    }

    #[test]
    fn json_array_and_wrapped_forms() {
        let arr = r#"[{"name":"A","authority":"X","type":"demo","priority":"low"}]"#;
        let wrapped = r#"{"sources":[{"name":"A","authority":"X","type":"browser-scrape","priority":"disabled"}]}"#;
        assert_eq!(parse_catalog(arr, "json").unwrap().len(), 1);
        let w = parse_catalog(wrapped, "json").unwrap();
        assert!(w.sources[0].is_disabled());
    }

    #[test]
    fn duplicate_names_rejected() {
        let arr = r#"[
            {"name":"A","authority":"X","type":"demo","priority":"low"},
            {"name":"a","authority":"Y","type":"feed","priority":"high"}
        ]"#;
        assert!(parse_catalog(arr, "json").is_err());
    }

    #[test]
    fn priority_rank_orders_critical_first() {
        assert!(Priority::Critical.rank() < Priority::High.rank());
        assert!(Priority::High.rank() < Priority::Medium.rank());
        assert!(Priority::Medium.rank() < Priority::Low.rank());
    }

    #[test]
    fn category_suggestion() {
        let c = parse_catalog(TOML, "toml").unwrap();
        assert_eq!(c.suggest_category("bankng").as_deref(), Some("banking"));
        assert_eq!(c.suggest_category("zzz"), None);
    }
}
