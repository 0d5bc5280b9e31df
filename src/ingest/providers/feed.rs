// src/ingest/providers/feed.rs
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::histogram;
use once_cell::sync::OnceCell;
use quick_xml::de::from_str;
use reqwest::header::{HeaderMap, HeaderValue, CONNECTION};
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::catalog::{SourceDescriptor, SourceType};
use crate::ingest::normalize_text;
use crate::ingest::types::{CandidateItem, FetchError, FetchOptions, SourceAdapter};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    guid: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entry: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<String>,
    #[serde(rename = "link", default)]
    link: Vec<AtomLink>,
    id: Option<String>,
    updated: Option<String>,
    published: Option<String>,
    summary: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()
        .and_then(|dt| DateTime::<Utc>::from_timestamp(dt.unix_timestamp(), 0))
}

fn parse_rfc3339(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse an RSS 2.0 or Atom document into candidate items.
pub fn parse_feed(xml: &str, source: &SourceDescriptor) -> Result<Vec<CandidateItem>, FetchError> {
    let t0 = std::time::Instant::now();
    let xml_clean = scrub_html_entities_for_xml(xml);

    let items = match root_element(&xml_clean) {
        Some("rss") => {
            let rss: Rss = from_str(&xml_clean)
                .map_err(|e| FetchError::Parse(format!("parsing rss xml: {e}")))?;
            rss.channel
                .item
                .into_iter()
                .filter_map(|it| {
                    let url = it.link.or(it.guid)?.trim().to_string();
                    build_item(
                        source,
                        it.title.as_deref(),
                        url,
                        it.description.as_deref(),
                        it.pub_date.as_deref().and_then(parse_rfc2822),
                    )
                })
                .collect::<Vec<_>>()
        }
        Some("feed") => {
            let atom: AtomFeed = from_str(&xml_clean)
                .map_err(|e| FetchError::Parse(format!("parsing atom xml: {e}")))?;
            atom.entry
                .into_iter()
                .filter_map(|e| {
                    let href = e
                        .link
                        .iter()
                        .find(|l| l.rel.as_deref().unwrap_or("alternate") == "alternate")
                        .or_else(|| e.link.first())
                        .and_then(|l| l.href.clone());
                    let url = href.or(e.id)?.trim().to_string();
                    let ts = e
                        .published
                        .as_deref()
                        .or(e.updated.as_deref())
                        .and_then(parse_rfc3339);
                    build_item(source, e.title.as_deref(), url, e.summary.as_deref(), ts)
                })
                .collect()
        }
        other => {
            return Err(FetchError::Parse(format!(
                "unexpected feed root element {:?}",
                other.unwrap_or("<none>")
            )))
        }
    };

    histogram!("sentinel_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    Ok(items)
}

/// Name of the first element, skipping the prolog, comments and doctype.
fn root_element(xml: &str) -> Option<&str> {
    static RE: OnceCell<Regex> = OnceCell::new();
    let re = RE.get_or_init(|| Regex::new(r"<([A-Za-z][A-Za-z0-9:._-]*)").expect("root regex"));
    re.captures(xml).and_then(|c| c.get(1)).map(|m| m.as_str())
}

fn build_item(
    source: &SourceDescriptor,
    title: Option<&str>,
    url: String,
    summary: Option<&str>,
    published_at: Option<DateTime<Utc>>,
) -> Option<CandidateItem> {
    let title = normalize_text(title.unwrap_or_default());
    if title.is_empty() || url.is_empty() {
        return None;
    }
    Some(CandidateItem {
        title,
        url,
        published_at,
        summary: normalize_text(summary.unwrap_or_default()),
        authority: source.authority.clone(),
        source_type: SourceType::Feed,
    })
}

/// Syndicated feed adapter (RSS 2.0 / Atom over HTTP).
pub struct FeedAdapter {
    client: Client,
}

impl Default for FeedAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedAdapter {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// One-off client with no idle pool and `Connection: close`, so a retry
    /// never reuses a poisoned pooled connection.
    fn fresh_client(timeout: Duration) -> Result<Client, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONNECTION, HeaderValue::from_static("close"));
        Client::builder()
            .pool_max_idle_per_host(0)
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Other(format!("building fresh http client: {e}")))
    }
}

#[async_trait]
impl SourceAdapter for FeedAdapter {
    async fn fetch(
        &self,
        source: &SourceDescriptor,
        opts: &FetchOptions,
    ) -> Result<Vec<CandidateItem>, FetchError> {
        let fresh;
        let client = if opts.fresh_connection {
            fresh = Self::fresh_client(opts.timeout)?;
            &fresh
        } else {
            &self.client
        };

        let body = fetch_text(client, &source.url, opts.timeout).await?;
        parse_feed(&body, source)
    }

    fn name(&self) -> &'static str {
        "feed"
    }
}

/// GET `url` and return the body, mapping non-2xx to `FetchError::Status`.
pub(crate) async fn fetch_text(
    client: &Client,
    url: &str,
    timeout: Duration,
) -> Result<String, FetchError> {
    if url.trim().is_empty() {
        return Err(FetchError::Other("source has no url configured".into()));
    }
    let resp = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| FetchError::from_reqwest(e, timeout))?;
    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::status(status.as_u16()));
    }
    resp.text()
        .await
        .map_err(|e| FetchError::from_reqwest(e, timeout))
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
