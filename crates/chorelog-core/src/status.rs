use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::datetime::days_since;
use crate::task::Completion;

/// Share of the interval after which a chore that is not yet overdue is
/// flagged as a warning.
pub const WARNING_RATIO: f64 = 0.8;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Neutral,
    Overdue,
    Warning,
    Good,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Neutral => "neutral",
            Status::Overdue => "overdue",
            Status::Warning => "warning",
            Status::Good => "good",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusPolicy {
    pub warning_ratio: f64,
}

impl Default for StatusPolicy {
    fn default() -> Self {
        Self {
            warning_ratio: WARNING_RATIO,
        }
    }
}

impl StatusPolicy {
    /// First match wins: no interval is neutral, never done is overdue, more
    /// than `interval_days` elapsed is overdue, at least
    /// `interval_days * warning_ratio` elapsed is a warning, otherwise good.
    /// Elapsed equal to the interval is still a warning.
    pub fn classify(
        &self,
        interval_days: Option<u32>,
        last_completion: Option<&Completion>,
        now: DateTime<Utc>,
    ) -> Status {
        let interval = match interval_days {
            None | Some(0) => return Status::Neutral,
            Some(days) => i64::from(days),
        };

        let Some(last) = last_completion else {
            return Status::Overdue;
        };

        let elapsed = days_since(last.completed_at, now);
        let warning_threshold = interval as f64 * self.warning_ratio;

        if elapsed > interval {
            Status::Overdue
        } else if elapsed as f64 >= warning_threshold {
            Status::Warning
        } else {
            Status::Good
        }
    }
}

pub fn classify(
    interval_days: Option<u32>,
    last_completion: Option<&Completion>,
    now: DateTime<Utc>,
) -> Status {
    StatusPolicy::default().classify(interval_days, last_completion, now)
}
