//! Analytics for lifeledger
//!
//! Everything under this module is computed from record snapshots:
//! - [`streak`]: consecutive-day completion streaks
//! - [`buckets`]: the generic day/week/month aggregator and expense views
//! - [`trend`]: improving / stable / declining classification
//! - [`achievements`]: badges, XP and levels
//! - [`dashboard`]: the plain-data view-models the presentation layer renders
//!
//! [`progress`] and [`live`] are the only parts that touch the
//! [`EventStore`](crate::store::EventStore): the former persists
//! achievement and streak state in the profile, the latter keeps a
//! [`Dashboard`] current as collections change.

pub mod achievements;
pub mod buckets;
pub mod dashboard;
pub mod live;
pub mod progress;
pub mod streak;
pub mod trend;

#[cfg(test)]
pub(crate) mod test_support;

pub use achievements::{
    AchievementDefinition, AchievementStatus, Counters, LevelInfo, ProgressSource, CATALOGUE,
};
pub use buckets::{BucketUnit, CategorySlice, MonthlyTotals, Reducer, SeriesPoint};
pub use dashboard::{Dashboard, ExpenseSummary, MoodInsights, ProductivityStats};
pub use live::LiveAnalytics;
pub use progress::{record_theme_toggle, refresh_profile};
pub use streak::{StreakState, StreakTracker};
pub use trend::{Trend, TrendComparison};

use chrono::{DateTime, NaiveDate, Utc};

use crate::types::local_date;

/// Source of the current instant.
///
/// Analytics never read the system clock directly so that "today" can be
/// pinned in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Local calendar day of [`Clock::now`].
    fn today(&self) -> NaiveDate {
        local_date(self.now())
    }
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
