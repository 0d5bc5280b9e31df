//! Error taxonomy: maps a raw failure to a category and an auto-fix flag.
//!
//! `classify` is pure and total. Categories are checked in a fixed order and
//! the first match wins, so e.g. "gateway timeout" is a timeout, not site_down.
//! `classify_failure` prefers the structured `FetchError` kind and only falls
//! back to substring matching for opaque text.

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::ingest::types::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Timeout,
    Connection,
    RateLimit,
    Ssl,
    Dns,
    Auth,
    SiteDown,
    Selector,
    Skipped,
    Unknown,
}

impl ErrorCategory {
    pub fn auto_fixable(&self) -> bool {
        matches!(
            self,
            ErrorCategory::Timeout
                | ErrorCategory::Connection
                | ErrorCategory::RateLimit
                | ErrorCategory::Ssl
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Connection => "connection",
            ErrorCategory::RateLimit => "rate_limit",
            ErrorCategory::Ssl => "ssl",
            ErrorCategory::Dns => "dns",
            ErrorCategory::Auth => "auth",
            ErrorCategory::SiteDown => "site_down",
            ErrorCategory::Selector => "selector",
            ErrorCategory::Skipped => "skipped",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorClassification {
    pub category: ErrorCategory,
    pub auto_fixable: bool,
}

impl From<ErrorCategory> for ErrorClassification {
    fn from(category: ErrorCategory) -> Self {
        Self {
            category,
            auto_fixable: category.auto_fixable(),
        }
    }
}

const TIMEOUT_WORDS: &[&str] = &[
    "timeout",
    "timed out",
    "etimedout",
    "esockettimedout",
    "deadline exceeded",
];
const CONNECTION_WORDS: &[&str] = &[
    "econnreset",
    "econnrefused",
    "socket hang up",
    "connection reset",
    "connection refused",
    "connection closed",
    "broken pipe",
    "epipe",
];
const RATE_LIMIT_WORDS: &[&str] = &["rate limit", "ratelimit", "rate-limit", "too many requests"];
const SSL_WORDS: &[&str] = &[
    "certificate",
    "ssl",
    "tls",
    "self signed",
    "self-signed",
    "unable to verify",
];
const DNS_WORDS: &[&str] = &[
    "enotfound",
    "eai_again",
    "getaddrinfo",
    "dns",
    "name resolution",
    "failed to lookup address",
    "no such host",
];
const AUTH_WORDS: &[&str] = &["unauthorized", "forbidden", "access denied"];
const SITE_DOWN_WORDS: &[&str] = &[
    "service unavailable",
    "bad gateway",
    "internal server error",
    "under maintenance",
];
const SELECTOR_WORDS: &[&str] = &[
    "selector",
    "parse",
    "parsing",
    "cannot read propert",
    "undefined",
    "unexpected token",
    "element not found",
];
const SKIPPED_WORDS: &[&str] = &["missing result", "no result"];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Pull a 3-digit HTTP status out of text like "status code 429" or "HTTP 503".
pub fn extract_status_code(message: &str) -> Option<u16> {
    static RE: OnceCell<Regex> = OnceCell::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:status(?:\s+code)?|http)[\s:=]+([1-5]\d{2})\b")
            .expect("status regex is valid")
    });
    re.captures(message)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Map `(message, status)` to a classification. Never panics.
pub fn classify(error_message: &str, http_status_code: Option<u16>) -> ErrorClassification {
    let msg = error_message.to_ascii_lowercase();
    let status = http_status_code.or_else(|| extract_status_code(error_message));

    let category = if contains_any(&msg, TIMEOUT_WORDS) {
        ErrorCategory::Timeout
    } else if contains_any(&msg, CONNECTION_WORDS) {
        ErrorCategory::Connection
    } else if status == Some(429) || contains_any(&msg, RATE_LIMIT_WORDS) {
        ErrorCategory::RateLimit
    } else if contains_any(&msg, SSL_WORDS) {
        ErrorCategory::Ssl
    } else if contains_any(&msg, DNS_WORDS) {
        ErrorCategory::Dns
    } else if matches!(status, Some(401) | Some(403)) || contains_any(&msg, AUTH_WORDS) {
        ErrorCategory::Auth
    } else if status.is_some_and(|s| s >= 500) || contains_any(&msg, SITE_DOWN_WORDS) {
        ErrorCategory::SiteDown
    } else if contains_any(&msg, SELECTOR_WORDS) {
        ErrorCategory::Selector
    } else if contains_any(&msg, SKIPPED_WORDS) {
        ErrorCategory::Skipped
    } else {
        ErrorCategory::Unknown
    };

    category.into()
}

/// Classify a structured adapter failure.
pub fn classify_failure(err: &FetchError) -> ErrorClassification {
    match err {
        FetchError::Timeout { .. } => ErrorCategory::Timeout.into(),
        FetchError::Connection(_) => ErrorCategory::Connection.into(),
        FetchError::Tls(_) => ErrorCategory::Ssl.into(),
        FetchError::Dns(_) => ErrorCategory::Dns.into(),
        FetchError::Parse(_) => ErrorCategory::Selector.into(),
        FetchError::Status { code, message } => classify(message, Some(*code)),
        FetchError::Browser(m) | FetchError::Other(m) => classify(m, None),
    }
}
