//! # Outcome classifier
//!
//! Per-source, per-run state machine:
//!
//! ```text
//! Pending ─fetch─▶ Success | NoUpdates | Error
//! NoUpdates ─staleness─▶ Stale            (only with a prior success on record)
//! Error | Stale ─begin_fix─▶ FixAttempted ─finish_fix─▶ Fixed | NotFixed
//! ```
//!
//! A source with no recorded success is never stale, however long it has
//! been silent. New sources bootstrap this way on purpose.

use chrono::{DateTime, Utc};

use crate::model::{CheckStatus, IssueType};

/// Raw adapter result after persistence, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Items { fetched: usize, new: usize },
    Failed { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Pending,
    Success,
    NoUpdates,
    Stale,
    Error,
    FixAttempted { issue: IssueType },
    Fixed,
    NotFixed { issue: IssueType },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid health transition: {from:?} on {event}")]
pub struct InvalidTransition {
    pub from: HealthState,
    pub event: &'static str,
}

impl HealthState {
    pub fn on_fetch(self, outcome: &FetchOutcome) -> Result<Self, InvalidTransition> {
        if self != HealthState::Pending {
            return Err(self.invalid("fetch"));
        }
        Ok(match outcome {
            FetchOutcome::Failed { .. } => HealthState::Error,
            FetchOutcome::Items { new, .. } if *new > 0 => HealthState::Success,
            FetchOutcome::Items { .. } => HealthState::NoUpdates,
        })
    }

    /// `NoUpdates → Stale` when `stale` is known. Other states pass through.
    pub fn on_staleness(self, stale: Option<&Staleness>) -> Self {
        match (self, stale) {
            (HealthState::NoUpdates, Some(_)) => HealthState::Stale,
            (s, _) => s,
        }
    }

    pub fn begin_fix(self) -> Result<Self, InvalidTransition> {
        match self {
            HealthState::Error => Ok(HealthState::FixAttempted {
                issue: IssueType::Error,
            }),
            HealthState::Stale => Ok(HealthState::FixAttempted {
                issue: IssueType::Stale,
            }),
            s => Err(s.invalid("begin_fix")),
        }
    }

    pub fn finish_fix(self, fixed: bool) -> Result<Self, InvalidTransition> {
        match self {
            HealthState::FixAttempted { .. } if fixed => Ok(HealthState::Fixed),
            HealthState::FixAttempted { issue } => Ok(HealthState::NotFixed { issue }),
            s => Err(s.invalid("finish_fix")),
        }
    }

    pub fn issue_type(&self) -> IssueType {
        match self {
            HealthState::Error => IssueType::Error,
            HealthState::Stale => IssueType::Stale,
            HealthState::FixAttempted { issue } | HealthState::NotFixed { issue } => *issue,
            _ => IssueType::None,
        }
    }

    /// Status written to the check record.
    pub fn surfaced(&self) -> CheckStatus {
        match self {
            HealthState::Pending => CheckStatus::Skipped,
            HealthState::Success => CheckStatus::Success,
            HealthState::NoUpdates => CheckStatus::NoUpdates,
            HealthState::Stale => CheckStatus::Stale,
            HealthState::Error => CheckStatus::Error,
            HealthState::Fixed => CheckStatus::Fixed,
            HealthState::FixAttempted { issue } | HealthState::NotFixed { issue } => match issue {
                IssueType::Stale => CheckStatus::Stale,
                _ => CheckStatus::Error,
            },
        }
    }

    fn invalid(self, event: &'static str) -> InvalidTransition {
        InvalidTransition { from: self, event }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Staleness {
    pub days_since: i64,
    pub threshold_days: u32,
}

impl Staleness {
    pub fn detail(&self) -> String {
        format!(
            "No new items for {} days (threshold: {} days)",
            self.days_since, self.threshold_days
        )
    }
}

/// `Some` when the last success is older than `recency_days`.
pub fn staleness(
    last_success: Option<DateTime<Utc>>,
    recency_days: u32,
    now: DateTime<Utc>,
) -> Option<Staleness> {
    let last = last_success?;
    let elapsed = now.signed_duration_since(last);
    if elapsed > chrono::Duration::days(i64::from(recency_days)) {
        Some(Staleness {
            days_since: elapsed.num_days(),
            threshold_days: recency_days,
        })
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assessment {
    pub state: HealthState,
    pub issue_type: IssueType,
    pub issue_detail: Option<String>,
}

/// Classify a raw outcome against the source's success history.
pub fn assess(
    outcome: &FetchOutcome,
    last_success: Option<DateTime<Utc>>,
    recency_days: u32,
    now: DateTime<Utc>,
) -> Assessment {
    // Pending always accepts a fetch.
    let fetched = HealthState::Pending
        .on_fetch(outcome)
        .unwrap_or(HealthState::Error);

    let stale = if fetched == HealthState::NoUpdates {
        staleness(last_success, recency_days, now)
    } else {
        None
    };
    let state = fetched.on_staleness(stale.as_ref());

    let issue_detail = match (outcome, stale) {
        (FetchOutcome::Failed { message }, _) => Some(message.clone()),
        (_, Some(s)) => Some(s.detail()),
        _ => None,
    };

    Assessment {
        state,
        issue_type: state.issue_type(),
        issue_detail,
    }
}
