// src/ingest/types.rs
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::catalog::{SourceDescriptor, SourceType};

/// Adapter output. `url` is the identity key used for dedup.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct CandidateItem {
    pub title: String,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub summary: String,
    pub authority: String,
    pub source_type: SourceType,
}

/// Structured adapter failure. Classification reads the variant first and
/// only falls back to text matching for `Browser`/`Other`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("request timed out after {}ms", .after.as_millis())]
    Timeout { after: Duration },
    #[error("{message}")]
    Status { code: u16, message: String },
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("tls error: {0}")]
    Tls(String),
    #[error("dns resolution failed: {0}")]
    Dns(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("browser error: {0}")]
    Browser(String),
    #[error("{0}")]
    Other(String),
}

impl FetchError {
    pub fn status(code: u16) -> Self {
        FetchError::Status {
            code,
            message: format!("Request failed with status code {code}"),
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            FetchError::Status { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Map a transport error, keeping the full source chain in the text so
    /// DNS/TLS causes hidden behind a connect error are still recognised.
    pub fn from_reqwest(e: reqwest::Error, timeout: Duration) -> Self {
        if e.is_timeout() {
            return FetchError::Timeout { after: timeout };
        }
        let text = error_chain(&e);
        if let Some(status) = e.status() {
            return FetchError::Status {
                code: status.as_u16(),
                message: text,
            };
        }
        if e.is_connect() {
            let lower = text.to_ascii_lowercase();
            if lower.contains("dns") || lower.contains("lookup") || lower.contains("resolve") {
                return FetchError::Dns(text);
            }
            if lower.contains("certificate") || lower.contains("tls") || lower.contains("ssl") {
                return FetchError::Tls(text);
            }
            return FetchError::Connection(text);
        }
        if e.is_decode() || e.is_body() {
            return FetchError::Parse(text);
        }
        FetchError::Other(text)
    }
}

fn error_chain(e: &dyn std::error::Error) -> String {
    let mut out = e.to_string();
    let mut cur = e.source();
    while let Some(src) = cur {
        out.push_str(": ");
        out.push_str(&src.to_string());
        cur = src.source();
    }
    out
}

/// Knobs an adapter must honour. Remediation strategies change these rather
/// than calling adapters in special ways.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    pub timeout: Duration,
    /// Bypass pooled connections (`Connection: close`, no idle pool).
    pub fresh_connection: bool,
    /// Ignore per-source extractors and use the generic HTML path.
    pub generic_extraction: bool,
}

impl FetchOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            fresh_connection: false,
            generic_extraction: false,
        }
    }
}

/// One fetch implementation per source type.
/// Must return an empty vec (never "nothing") when a source has no items.
#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn fetch(
        &self,
        source: &SourceDescriptor,
        opts: &FetchOptions,
    ) -> Result<Vec<CandidateItem>, FetchError>;

    fn name(&self) -> &'static str;
}
