//! Calendar-day ranges used to chunk a backfill span.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-open calendar-day range `[from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    /// Returns `None` when `to <= from`.
    pub fn new(from: NaiveDate, to: NaiveDate) -> Option<Self> {
        (to > from).then_some(Self { from, to })
    }

    /// `[start_year-01-01, end_year-01-01)`.
    pub fn years(start_year: i32, end_year: i32) -> Option<Self> {
        let from = NaiveDate::from_ymd_opt(start_year, 1, 1)?;
        let to = NaiveDate::from_ymd_opt(end_year, 1, 1)?;
        Self::new(from, to)
    }

    /// Number of calendar days covered.
    pub fn days(&self) -> i64 {
        (self.to - self.from).num_days()
    }

    /// Last calendar day inside the range.
    pub fn last_day(&self) -> NaiveDate {
        self.to - Duration::days(1)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.from && date < self.to
    }

    /// Partition into consecutive, non-overlapping windows of `chunk_days`.
    /// The last window is clamped to `self.to` and may be shorter.
    pub fn split(&self, chunk_days: u32) -> Vec<DateRange> {
        let step = Duration::days(i64::from(chunk_days.max(1)));
        let mut chunks = Vec::with_capacity((self.days() / step.num_days() + 1) as usize);
        let mut cursor = self.from;
        while cursor < self.to {
            let next = (cursor + step).min(self.to);
            chunks.push(DateRange {
                from: cursor,
                to: next,
            });
            cursor = next;
        }
        chunks
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to {}",
            self.from.format("%Y-%m-%d"),
            self.to.format("%Y-%m-%d")
        )
    }
}

/// A chunk whose fetch never succeeded during a backfill run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingRange {
    pub range: DateRange,
    pub attempts: u32,
    pub reason: String,
}
