//! Analysis windows
//!
//! A [`Window`] is what the caller asks for: either an explicit range or a
//! lookback of N days/months. It resolves to a concrete [`TimeRange`]
//! against an `as_of` instant, and every aggregation is bounded by that
//! range (both ends inclusive).

use crate::{Error, Result};
use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Lookback unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LookbackUnit {
    /// Calendar days
    Days,
    /// Calendar months
    Months,
}

/// Requested analysis window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Window {
    /// Explicit range
    Range {
        /// Window start
        start: DateTime<Utc>,
        /// Window end
        end: DateTime<Utc>,
    },
    /// Trailing lookback ending at the resolution instant
    Lookback {
        /// Number of units, must be positive
        count: u32,
        /// Unit
        unit: LookbackUnit,
    },
}

impl Window {
    /// Explicit range, rejected when `start >= end`
    pub fn range(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        let window = Window::Range { start, end };
        window.validate()?;
        Ok(window)
    }

    /// Trailing N months
    pub fn months(count: u32) -> Result<Self> {
        let window = Window::Lookback {
            count,
            unit: LookbackUnit::Months,
        };
        window.validate()?;
        Ok(window)
    }

    /// Trailing N days
    pub fn days(count: u32) -> Result<Self> {
        let window = Window::Lookback {
            count,
            unit: LookbackUnit::Days,
        };
        window.validate()?;
        Ok(window)
    }

    /// Check window invariants
    pub fn validate(&self) -> Result<()> {
        match self {
            Window::Range { start, end } if start >= end => Err(Error::InvalidWindow(format!(
                "start {} must be before end {}",
                start, end
            ))),
            Window::Lookback { count: 0, .. } => Err(Error::InvalidWindow(
                "lookback count must be positive".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Resolve to a concrete range, lookbacks end at `as_of`
    pub fn resolve(&self, as_of: DateTime<Utc>) -> Result<TimeRange> {
        self.validate()?;
        match *self {
            Window::Range { start, end } => Ok(TimeRange { start, end }),
            Window::Lookback { count, unit } => {
                let start = match unit {
                    LookbackUnit::Days => as_of
                        .checked_sub_signed(Duration::days(i64::from(count)))
                        .ok_or_else(|| Error::InvalidWindow(format!("{} days out of range", count)))?,
                    LookbackUnit::Months => as_of
                        .checked_sub_months(Months::new(count))
                        .ok_or_else(|| Error::InvalidWindow(format!("{} months out of range", count)))?,
                };
                Ok(TimeRange { start, end: as_of })
            }
        }
    }
}

/// Resolved, non-empty time range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Inclusive start
    pub start: DateTime<Utc>,
    /// Inclusive end
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Construct, rejecting empty or inverted ranges
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        Window::range(start, end)?;
        Ok(Self { start, end })
    }

    /// Range length in fractional days
    pub fn length_days(&self) -> f64 {
        (self.end - self.start).num_seconds() as f64 / SECONDS_PER_DAY
    }

    /// Inclusive containment
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant <= self.end
    }

    /// Midpoint splitting the range into first and second half
    pub fn midpoint(&self) -> DateTime<Utc> {
        self.start + (self.end - self.start) / 2
    }

    /// Consecutive equal-length periods ending at `end`, oldest first.
    ///
    /// Only whole periods are returned; a leading remainder shorter than
    /// `period_days` is dropped.
    pub fn periods(&self, period_days: u32) -> Result<Vec<TimeRange>> {
        if period_days == 0 {
            return Err(Error::InvalidWindow("period length must be positive".to_string()));
        }
        let step = Duration::days(i64::from(period_days));
        let mut periods = Vec::new();
        let mut end = self.end;
        while end - step >= self.start {
            periods.push(TimeRange {
                start: end - step,
                end,
            });
            end = end - step;
        }
        periods.reverse();
        Ok(periods)
    }
}
