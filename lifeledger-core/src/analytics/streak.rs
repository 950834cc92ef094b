//! Consecutive-day streaks from task completions.
//!
//! A streak counts calendar days (local time) with at least one completed
//! task, walking backwards from today.
//!
//! Today is special: if nothing has been completed yet today, the walk
//! simply starts at yesterday, so an unbroken run through yesterday still
//! counts. Any earlier missing day ends the walk. This asymmetry is kept on
//! purpose; users expect their streak to survive until the day is over.

use std::collections::BTreeSet;

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::types::Task;

/// Default number of days the current-streak walk looks back.
pub const DEFAULT_LOOKBACK_DAYS: u32 = 365;

/// Current and longest streak, in days.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreakState {
    /// Consecutive days ending today (or yesterday, see module docs)
    pub current: u32,
    /// Longest streak ever observed
    pub longest: u32,
}

/// Unique local calendar days on which any task was completed.
///
/// Tasks flagged complete without a timestamp are ignored.
pub fn completion_dates<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> BTreeSet<NaiveDate> {
    tasks.into_iter().filter_map(Task::completion_date).collect()
}

/// Length of the run of consecutive days ending at `today` (or yesterday).
pub fn current_streak(dates: &BTreeSet<NaiveDate>, today: NaiveDate, lookback_days: u32) -> u32 {
    let mut streak = 0u32;

    for offset in 0..lookback_days {
        let day = today - Duration::days(i64::from(offset));
        if dates.contains(&day) {
            streak += 1;
        } else if offset == 0 {
            // Nothing yet today; keep counting from yesterday.
            continue;
        } else {
            break;
        }
    }

    streak
}

/// Longest run of consecutive days anywhere in `dates`.
pub fn longest_run(dates: &BTreeSet<NaiveDate>) -> u32 {
    let mut longest = 0u32;
    let mut run = 0u32;
    let mut prev: Option<NaiveDate> = None;

    for &date in dates {
        run = match prev {
            Some(p) if date - p == Duration::days(1) => run + 1,
            _ => 1,
        };
        longest = longest.max(run);
        prev = Some(date);
    }

    longest
}

/// Compute both streak values from scratch.
pub fn compute(tasks: &[Task], today: NaiveDate, lookback_days: u32) -> StreakState {
    let dates = completion_dates(tasks);
    let current = current_streak(&dates, today, lookback_days);
    StreakState {
        current,
        longest: longest_run(&dates).max(current),
    }
}

/// Keeps `longest` as a high-water mark across recomputations.
///
/// Reopening or deleting tasks can shorten the history; the longest streak
/// already achieved is never taken back.
#[derive(Debug, Clone)]
pub struct StreakTracker {
    high_water: u32,
    lookback_days: u32,
}

impl StreakTracker {
    /// Start from a previously persisted high-water mark.
    pub fn new(high_water: u32, lookback_days: u32) -> Self {
        Self {
            high_water,
            lookback_days,
        }
    }

    /// Recompute from the current task set.
    pub fn observe(&mut self, tasks: &[Task], today: NaiveDate) -> StreakState {
        let fresh = compute(tasks, today, self.lookback_days);
        self.high_water = self.high_water.max(fresh.longest);
        StreakState {
            current: fresh.current,
            longest: self.high_water,
        }
    }

    pub fn high_water(&self) -> u32 {
        self.high_water
    }
}

impl Default for StreakTracker {
    fn default() -> Self {
        Self::new(0, DEFAULT_LOOKBACK_DAYS)
    }
}
