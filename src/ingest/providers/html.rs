// src/ingest/providers/html.rs
//! HTML page adapter.
//!
//! Sources may register a custom `HtmlExtractor` (site-specific selectors,
//! maintained outside this crate). Without one, or when remediation asks for
//! `generic_extraction`, the page goes through `extract_generic`, which keeps
//! headline-like anchors and resolves them against the page URL.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use regex::Regex;
use reqwest::{Client, Url};

use super::feed::fetch_text;
use crate::catalog::{SourceDescriptor, SourceType};
use crate::ingest::normalize_text;
use crate::ingest::types::{CandidateItem, FetchError, FetchOptions, SourceAdapter};

/// Anchors with shorter text are navigation, not items.
const MIN_TITLE_CHARS: usize = 20;
const MAX_GENERIC_ITEMS: usize = 50;

/// Site-specific extraction routine.
pub trait HtmlExtractor: Send + Sync {
    fn extract(&self, html: &str, source: &SourceDescriptor)
        -> Result<Vec<CandidateItem>, FetchError>;
}

/// Source-agnostic extraction: every `<a href>` whose text looks like a headline.
pub fn extract_generic(html: &str, source: &SourceDescriptor) -> Vec<CandidateItem> {
    static RE_ANCHOR: OnceCell<Regex> = OnceCell::new();
    static RE_SCRIPT: OnceCell<Regex> = OnceCell::new();
    let re_anchor = RE_ANCHOR.get_or_init(|| {
        Regex::new(r#"(?is)<a\s[^>]*?href\s*=\s*["']([^"']+)["'][^>]*>(.*?)</a>"#)
            .expect("anchor regex")
    });
    let re_script = RE_SCRIPT.get_or_init(|| {
        Regex::new(r"(?is)<(script|style|nav|header|footer)\b.*?</(script|style|nav|header|footer)>")
            .expect("script regex")
    });

    let base = Url::parse(&source.url).ok();
    let body = re_script.replace_all(html, " ");

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for cap in re_anchor.captures_iter(&body) {
        let href = html_escape::decode_html_entities(cap[1].trim()).to_string();
        if href.starts_with('#')
            || href.starts_with("javascript:")
            || href.starts_with("mailto:")
            || href.starts_with("tel:")
        {
            continue;
        }
        let title = normalize_text(&cap[2]);
        if title.chars().count() < MIN_TITLE_CHARS {
            continue;
        }
        let url = match (&base, Url::parse(&href)) {
            (_, Ok(abs)) => abs.to_string(),
            (Some(b), Err(_)) => match b.join(&href) {
                Ok(u) => u.to_string(),
                Err(_) => continue,
            },
            (None, Err(_)) => continue,
        };
        if !seen.insert(url.clone()) {
            continue;
        }
        out.push(CandidateItem {
            title,
            url,
            published_at: None,
            summary: String::new(),
            authority: source.authority.clone(),
            source_type: SourceType::HtmlScrape,
        });
        if out.len() >= MAX_GENERIC_ITEMS {
            break;
        }
    }
    out
}

pub struct HtmlScrapeAdapter {
    client: Client,
    extractors: HashMap<String, Arc<dyn HtmlExtractor>>,
}

impl Default for HtmlScrapeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl HtmlScrapeAdapter {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            extractors: HashMap::new(),
        }
    }

    /// Attach a custom extractor for one source name.
    pub fn with_extractor(mut self, source_name: &str, ex: Arc<dyn HtmlExtractor>) -> Self {
        self.extractors.insert(source_name.to_string(), ex);
        self
    }

    pub fn extract(
        &self,
        html: &str,
        source: &SourceDescriptor,
        generic: bool,
    ) -> Result<Vec<CandidateItem>, FetchError> {
        match self.extractors.get(&source.name) {
            Some(ex) if !generic => ex.extract(html, source),
            _ => Ok(extract_generic(html, source)),
        }
    }
}

#[async_trait]
impl SourceAdapter for HtmlScrapeAdapter {
    async fn fetch(
        &self,
        source: &SourceDescriptor,
        opts: &FetchOptions,
    ) -> Result<Vec<CandidateItem>, FetchError> {
        let html = fetch_text(&self.client, &source.url, opts.timeout).await?;
        self.extract(&html, source, opts.generic_extraction)
    }

    fn name(&self) -> &'static str {
        "html-scrape"
    }
}
