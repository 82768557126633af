//! Lookback window bounds.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Inclusive time range `[start, end]` a run considers "recent".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookbackWindow {
    /// Earliest timestamp considered, inclusive.
    pub start: DateTime<Utc>,
    /// Latest timestamp considered, inclusive.
    pub end: DateTime<Utc>,
}

impl LookbackWindow {
    /// Creates a window from explicit bounds.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start > end {
            anyhow::bail!("Lookback window starts after it ends ({start} > {end})");
        }
        Ok(Self { start, end })
    }

    /// Creates the window `[now - hours, now]`.
    pub fn ending_at(now: DateTime<Utc>, hours: u32) -> Self {
        Self {
            start: now - Duration::hours(i64::from(hours)),
            end: now,
        }
    }

    /// Returns true if `timestamp` falls inside the window, bounds included.
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.start <= timestamp && timestamp <= self.end
    }

    /// Length of the window in whole hours.
    pub fn hours(&self) -> i64 {
        (self.end - self.start).num_hours()
    }
}
