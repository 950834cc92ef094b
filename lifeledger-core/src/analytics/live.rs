//! Dashboard that follows the store.
//!
//! [`LiveAnalytics`] subscribes to every collection and, inside the
//! notifying call, recomputes only the views fed by the collection that
//! changed:
//!
//! | Changed | Recomputed |
//! |---------|------------|
//! | tasks | productivity, streak, level, achievements |
//! | moods | mood insights, achievements |
//! | transactions | expense summary, achievements |

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use super::achievements::{statuses, AchievementDefinition, LevelInfo, CATALOGUE};
use super::dashboard::{Dashboard, ExpenseSummary, MoodInsights, ProductivityStats};
use super::progress::refresh_profile;
use super::streak::StreakTracker;
use super::Clock;
use crate::config::AnalyticsConfig;
use crate::error::Result;
use crate::store::{EventStore, SubscriptionId};
use crate::types::{Collection, CollectionSnapshot};

struct LiveState {
    dashboard: Dashboard,
    unlocked: Vec<&'static AchievementDefinition>,
}

struct Shared {
    config: AnalyticsConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<LiveState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, LiveState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn on_change(&self, store: &EventStore, snapshot: &CollectionSnapshot) -> Result<()> {
        let today = self.clock.today();
        let days = self.config.rolling_days;

        let unlocked = refresh_profile(store, &self.config, self.clock.as_ref())?;
        let profile = store.profile()?;
        let achievements = statuses(CATALOGUE, &profile.achievements);
        let stale = store.is_stale();

        let mut state = self.lock();
        let dashboard = &mut state.dashboard;
        dashboard.date = today;
        match snapshot {
            CollectionSnapshot::Tasks(tasks) => {
                dashboard.productivity = ProductivityStats::compute(tasks, today, days);
                dashboard.streak = StreakTracker::new(
                    profile.longest_streak,
                    self.config.streak_lookback_days,
                )
                .observe(tasks, today);
                let completed = tasks.iter().filter(|t| t.completed).count() as u64;
                dashboard.level = LevelInfo::from_completed_tasks(completed);
            }
            CollectionSnapshot::Moods(moods) => {
                dashboard.mood = MoodInsights::compute(moods, today, days);
            }
            CollectionSnapshot::Transactions(transactions) => {
                dashboard.expenses = ExpenseSummary::compute(
                    transactions,
                    today,
                    self.config.monthly_trend_months,
                );
            }
        }
        dashboard.achievements = achievements;
        dashboard.stale = stale;
        state.unlocked.extend(unlocked);

        tracing::debug!(
            collection = %snapshot.collection(),
            records = snapshot.len(),
            "Recomputed live analytics"
        );
        Ok(())
    }
}

/// A [`Dashboard`] kept current by store notifications.
///
/// Unsubscribes when dropped.
pub struct LiveAnalytics {
    store: Arc<EventStore>,
    shared: Arc<Shared>,
    subscription: SubscriptionId,
}

impl LiveAnalytics {
    /// Compute the initial dashboard and start following `store`.
    pub fn attach(
        store: &Arc<EventStore>,
        config: AnalyticsConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let unlocked = refresh_profile(store, &config, clock.as_ref())?;
        let dashboard = Dashboard::compute(
            &store.data()?,
            &store.profile()?,
            clock.today(),
            &config,
            store.is_stale(),
        );

        let shared = Arc::new(Shared {
            config,
            clock,
            state: Mutex::new(LiveState {
                dashboard,
                unlocked,
            }),
        });

        // The store owns the callback, so it must not own the store back.
        let weak_store: Weak<EventStore> = Arc::downgrade(store);
        let weak_shared: Weak<Shared> = Arc::downgrade(&shared);
        let subscription = store.subscribe(&Collection::ALL, move |snapshot| {
            let (Some(store), Some(shared)) = (weak_store.upgrade(), weak_shared.upgrade()) else {
                return;
            };
            if let Err(e) = shared.on_change(&store, snapshot) {
                tracing::warn!(
                    collection = %snapshot.collection(),
                    error = %e,
                    "Live analytics refresh failed"
                );
            }
        });

        Ok(Self {
            store: Arc::clone(store),
            shared,
            subscription,
        })
    }

    /// Current dashboard.
    pub fn dashboard(&self) -> Dashboard {
        self.shared.lock().dashboard.clone()
    }

    /// Achievements unlocked since the last call, oldest first.
    pub fn take_unlocked(&self) -> Vec<&'static AchievementDefinition> {
        std::mem::take(&mut self.shared.lock().unlocked)
    }

    /// Recompute every view from scratch.
    pub fn refresh(&self) -> Result<()> {
        let unlocked = refresh_profile(
            &self.store,
            &self.shared.config,
            self.shared.clock.as_ref(),
        )?;
        let dashboard = Dashboard::compute(
            &self.store.data()?,
            &self.store.profile()?,
            self.shared.clock.today(),
            &self.shared.config,
            self.store.is_stale(),
        );
        let mut state = self.shared.lock();
        state.dashboard = dashboard;
        state.unlocked.extend(unlocked);
        Ok(())
    }
}

impl Drop for LiveAnalytics {
    fn drop(&mut self) {
        self.store.unsubscribe(self.subscription);
    }
}
