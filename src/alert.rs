//! # Alert composer
//! Turns unresolved issues into a bounded Slack-style message (plain `text`
//! plus block-kit `blocks`). The daily rollup reads recorder history only.

use std::collections::{BTreeMap, HashMap, HashSet};

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::catalog::{Priority, SourceType};
use crate::model::{CheckStatus, IssueType, RunTotals, SourceCheck};
use crate::recorder::RunRecorder;
use crate::taxonomy::ErrorCategory;

/// One unresolved problem from a run, with its remediation outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub source_name: String,
    pub authority: String,
    pub source_type: SourceType,
    pub priority: Priority,
    pub issue_type: IssueType,
    pub detail: Option<String>,
    pub error_category: Option<ErrorCategory>,
    pub http_status_code: Option<u16>,
    pub fix_attempted: bool,
    pub fix_method: Option<String>,
    pub fix_error: Option<String>,
}

impl Issue {
    /// `None` unless the check ended unresolved.
    pub fn from_check(c: &SourceCheck) -> Option<Self> {
        if !c.final_status.is_unresolved() {
            return None;
        }
        let last_fix = c.fix_actions.last();
        Some(Self {
            source_name: c.source_name.clone(),
            authority: c.authority.clone(),
            source_type: c.source_type,
            priority: c.priority,
            issue_type: c.issue_type,
            detail: c.issue_detail.clone(),
            error_category: c.error_category,
            http_status_code: c.http_status_code,
            fix_attempted: last_fix.is_some(),
            fix_method: last_fix.map(|a| a.method.clone()),
            fix_error: last_fix.and_then(|a| a.error.clone()),
        })
    }

    fn kind_label(&self) -> String {
        match (self.issue_type, self.error_category) {
            (IssueType::Stale, _) => "stale".to_string(),
            (_, Some(cat)) => format!("error/{cat}"),
            _ => "error".to_string(),
        }
    }

    fn line(&self) -> String {
        let mut s = format!(
            "[{}] {} ({}, {}): {}",
            self.priority.as_str(),
            self.source_name,
            self.authority,
            self.source_type,
            self.kind_label()
        );
        if let Some(d) = &self.detail {
            s.push_str(" - ");
            s.push_str(&truncate(d, 160));
        }
        match (&self.fix_method, &self.fix_error) {
            (Some(m), Some(e)) => s.push_str(&format!("; fix {m} failed: {}", truncate(e, 80))),
            (Some(m), None) => s.push_str(&format!("; fix {m} failed")),
            _ if self.fix_attempted => s.push_str("; fix failed"),
            _ => s.push_str("; no fix attempted"),
        }
        s
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertMessage {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<Value>,
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

fn short_id(run_id: &str) -> &str {
    run_id.get(..8).unwrap_or(run_id)
}

/// Critical first; errors before stale within a priority.
fn sort_issues(issues: &[Issue]) -> Vec<&Issue> {
    let mut v: Vec<&Issue> = issues.iter().collect();
    v.sort_by_key(|i| (i.priority.rank(), i.issue_type != IssueType::Error));
    v
}

fn totals_line(t: &RunTotals) -> String {
    format!(
        "Sources: {} | ok {} | fixed {} | no updates {} | stale {} | errors {} | new items {}",
        t.total_sources,
        t.success_sources,
        t.fixed_sources,
        t.no_update_sources,
        t.stale_sources,
        t.error_sources,
        t.new_updates
    )
}

/// Summary of one run's unresolved issues. At most `max_listed` issues are
/// listed individually.
pub fn compose_issue_summary(
    run_id: &str,
    issues: &[Issue],
    totals: &RunTotals,
    max_listed: usize,
) -> AlertMessage {
    let max_listed = max_listed.max(1);
    let sorted = sort_issues(issues);
    let listed: Vec<String> = sorted.iter().take(max_listed).map(|i| i.line()).collect();
    let hidden = sorted.len().saturating_sub(listed.len());

    let header = format!(
        "Ingestion run {}: {} unresolved issue{}",
        short_id(run_id),
        issues.len(),
        if issues.len() == 1 { "" } else { "s" }
    );

    let mut text = format!("*{header}*\n{}\n", totals_line(totals));
    for l in &listed {
        text.push_str("- ");
        text.push_str(l);
        text.push('\n');
    }
    if hidden > 0 {
        text.push_str(&format!("...and {hidden} more\n"));
    }

    let mut blocks = vec![
        json!({ "type": "header", "text": { "type": "plain_text", "text": header } }),
        json!({ "type": "section", "text": { "type": "mrkdwn", "text": totals_line(totals) } }),
        json!({ "type": "divider" }),
    ];
    for l in &listed {
        blocks.push(json!({ "type": "section", "text": { "type": "mrkdwn", "text": l } }));
    }
    if hidden > 0 {
        blocks.push(json!({
            "type": "context",
            "elements": [{ "type": "mrkdwn", "text": format!("...and {hidden} more") }]
        }));
    }

    AlertMessage {
        text: text.trim_end().to_string(),
        blocks,
    }
}

/// Aggregated view over a window of recorded checks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DailyRollup {
    pub runs: usize,
    pub checks: usize,
    pub unresolved: usize,
    pub fixed: usize,
    /// Category label → unresolved count ("stale" for stale issues).
    pub by_category: BTreeMap<String, usize>,
    /// Most affected sources, descending.
    pub top_sources: Vec<(String, usize)>,
}

pub fn rollup(checks: &[SourceCheck], window_hours: u32, now: DateTime<Utc>) -> DailyRollup {
    let since = now - Duration::hours(i64::from(window_hours));
    let in_window: Vec<&SourceCheck> = checks
        .iter()
        .filter(|c| c.checked_at >= since && c.checked_at <= now)
        .collect();

    let mut r = DailyRollup {
        runs: in_window
            .iter()
            .map(|c| c.run_id.as_str())
            .collect::<HashSet<_>>()
            .len(),
        checks: in_window.len(),
        ..Default::default()
    };

    let mut per_source: HashMap<&str, usize> = HashMap::new();
    for c in &in_window {
        if c.final_status == CheckStatus::Fixed {
            r.fixed += 1;
        }
        if !c.final_status.is_unresolved() {
            continue;
        }
        r.unresolved += 1;
        let label = match (c.final_status, c.error_category) {
            (CheckStatus::Stale, _) => "stale".to_string(),
            (_, Some(cat)) => cat.as_str().to_string(),
            _ => ErrorCategory::Unknown.as_str().to_string(),
        };
        *r.by_category.entry(label).or_default() += 1;
        *per_source.entry(c.source_name.as_str()).or_default() += 1;
    }

    let mut top: Vec<(String, usize)> = per_source
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    top.truncate(5);
    r.top_sources = top;
    r
}

/// Periodic rollup of issue counts by category.
pub fn compose_daily_summary(
    checks: &[SourceCheck],
    window_hours: u32,
    now: DateTime<Utc>,
) -> AlertMessage {
    let r = rollup(checks, window_hours, now);
    let header = format!("Ingestion summary (last {window_hours}h)");
    let counts = format!(
        "Runs: {} | checks: {} | unresolved: {} | auto-fixed: {}",
        r.runs, r.checks, r.unresolved, r.fixed
    );

    let mut text = format!("*{header}*\n{counts}\n");
    let mut blocks = vec![
        json!({ "type": "header", "text": { "type": "plain_text", "text": header } }),
        json!({ "type": "section", "text": { "type": "mrkdwn", "text": counts } }),
    ];

    if r.unresolved == 0 {
        text.push_str("No unresolved issues.");
        blocks.push(json!({ "type": "section", "text": { "type": "mrkdwn", "text": "No unresolved issues." } }));
    } else {
        let cats = r
            .by_category
            .iter()
            .map(|(k, v)| format!("{k} {v}"))
            .collect::<Vec<_>>()
            .join(", ");
        let top = r
            .top_sources
            .iter()
            .map(|(k, v)| format!("{k} ({v})"))
            .collect::<Vec<_>>()
            .join(", ");
        text.push_str(&format!("By category: {cats}\nMost affected: {top}"));
        blocks.push(json!({ "type": "section", "text": { "type": "mrkdwn", "text": format!("*By category:* {cats}") } }));
        blocks.push(json!({ "type": "section", "text": { "type": "mrkdwn", "text": format!("*Most affected:* {top}") } }));
    }

    AlertMessage {
        text: text.trim_end().to_string(),
        blocks,
    }
}

/// Daily summary straight from recorder history.
pub async fn daily_summary(
    recorder: &dyn RunRecorder,
    window_hours: u32,
    now: DateTime<Utc>,
) -> Result<AlertMessage> {
    let since = now - Duration::hours(i64::from(window_hours));
    let checks = recorder.checks_since(since).await?;
    Ok(compose_daily_summary(&checks, window_hours, now))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(name: &str, priority: Priority, issue_type: IssueType) -> Issue {
        Issue {
            source_name: name.into(),
            authority: "A".into(),
            source_type: SourceType::Feed,
            priority,
            issue_type,
            detail: Some("detail".into()),
            error_category: (issue_type == IssueType::Error).then_some(ErrorCategory::Timeout),
            http_status_code: None,
            fix_attempted: true,
            fix_method: Some("extended_timeout_retry".into()),
            fix_error: Some("still timing out".into()),
        }
    }

    #[test]
    fn summary_caps_listed_issues() {
        let issues: Vec<Issue> = (0..7)
            .map(|n| issue(&format!("S{n}"), Priority::Low, IssueType::Error))
            .collect();
        let msg = compose_issue_summary("abcdef0123", &issues, &RunTotals::default(), 3);
        assert!(msg.text.contains("7 unresolved issues"));
        assert!(msg.text.contains("...and 4 more"));
        assert_eq!(msg.text.matches("\n- ").count(), 3);
        // header + totals + divider + 3 issues + context
        assert_eq!(msg.blocks.len(), 7);
    }

    #[test]
    fn summary_orders_by_priority() {
        let issues = vec![
            issue("Low", Priority::Low, IssueType::Stale),
            issue("Crit", Priority::Critical, IssueType::Error),
        ];
        let msg = compose_issue_summary("r", &issues, &RunTotals::default(), 10);
        let crit = msg.text.find("Crit").unwrap();
        let low = msg.text.find("Low (").unwrap();
        assert!(crit < low);
        assert!(msg.text.contains("error/timeout"));
        assert!(msg.text.contains("fix extended_timeout_retry failed: still timing out"));
    }
}
