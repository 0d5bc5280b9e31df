// src/notify/antiflutter.rs
use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::alert::Issue;
use crate::model::IssueType;

/// Per-source cooldown gate so a source that stays broken does not page on
/// every run.
/// - First alert for a `(source, issue)` pair always passes.
/// - Inside the cooldown, the same pair is suppressed.
/// - A different issue kind for the same source passes immediately.
/// - State is updated explicitly via `record` after a successful send.
#[derive(Debug, Clone, Default)]
pub struct AlertGate {
    cooldown: ChronoDuration,
    last_alert: HashMap<(String, IssueType), DateTime<Utc>>,
}

impl AlertGate {
    /// `cooldown_secs` <= 0 disables the gate.
    pub fn new(cooldown_secs: i64) -> Self {
        Self {
            cooldown: ChronoDuration::seconds(cooldown_secs.max(0)),
            last_alert: HashMap::new(),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.cooldown <= ChronoDuration::zero()
    }

    /// Check a single issue at `now`. Does NOT mutate state.
    pub fn should_alert(&self, issue: &Issue, now: DateTime<Utc>) -> bool {
        if self.is_disabled() {
            return true;
        }
        match self
            .last_alert
            .get(&(issue.source_name.clone(), issue.issue_type))
        {
            None => true,
            Some(ts) => now.signed_duration_since(*ts) >= self.cooldown,
        }
    }

    /// Issues still allowed through at `now`, order preserved.
    pub fn filter(&self, issues: &[Issue], now: DateTime<Utc>) -> Vec<Issue> {
        issues
            .iter()
            .filter(|i| self.should_alert(i, now))
            .cloned()
            .collect()
    }

    /// Record that `issues` were alerted on at `now`.
    pub fn record(&mut self, issues: &[Issue], now: DateTime<Utc>) {
        if self.is_disabled() {
            return;
        }
        for i in issues {
            self.last_alert
                .insert((i.source_name.clone(), i.issue_type), now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Priority, SourceType};
    use chrono::TimeZone;

    fn issue(name: &str, issue_type: IssueType) -> Issue {
        Issue {
            source_name: name.into(),
            authority: "A".into(),
            source_type: SourceType::Feed,
            priority: Priority::High,
            issue_type,
            detail: None,
            error_category: None,
            http_status_code: None,
            fix_attempted: false,
            fix_method: None,
            fix_error: None,
        }
    }

    #[test]
    fn first_alert_passes() {
        let gate = AlertGate::new(10_800);
        let now = Utc.with_ymd_and_hms(2025, 9, 6, 9, 0, 0).unwrap();
        assert!(gate.should_alert(&issue("S", IssueType::Error), now));
    }

    #[test]
    fn inside_cooldown_blocked_per_source() {
        let mut gate = AlertGate::new(10_800);
        let t0 = Utc.with_ymd_and_hms(2025, 9, 6, 9, 0, 0).unwrap();
        let a = issue("A", IssueType::Error);
        gate.record(std::slice::from_ref(&a), t0);

        let t1 = t0 + ChronoDuration::seconds(120);
        let all = vec![a.clone(), issue("B", IssueType::Error), issue("A", IssueType::Stale)];
        let kept = gate.filter(&all, t1);
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|i| !(i.source_name == "A" && i.issue_type == IssueType::Error)));
    }

    #[test]
    fn after_cooldown_passes() {
        let mut gate = AlertGate::new(10_800);
        let t0 = Utc.with_ymd_and_hms(2025, 9, 6, 9, 0, 0).unwrap();
        let a = issue("A", IssueType::Error);
        gate.record(std::slice::from_ref(&a), t0);
        let t_after = t0 + ChronoDuration::seconds(10_800 + 5);
        assert!(gate.should_alert(&a, t_after));
    }

    #[test]
    fn zero_cooldown_never_suppresses() {
        let mut gate = AlertGate::new(0);
        let t0 = Utc.with_ymd_and_hms(2025, 9, 6, 9, 0, 0).unwrap();
        let a = issue("A", IssueType::Error);
        gate.record(std::slice::from_ref(&a), t0);
        assert!(gate.should_alert(&a, t0));
    }
}
