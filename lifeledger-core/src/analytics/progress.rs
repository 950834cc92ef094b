//! Persisting gamification state.
//!
//! The streak high-water mark and achievement progress live in the user's
//! [`Profile`]. Both only ever move forward, so refreshing is safe to run
//! after every change.

use super::achievements::{evaluate, AchievementDefinition, Counters, CATALOGUE};
use super::streak::StreakTracker;
use super::Clock;
use crate::config::AnalyticsConfig;
use crate::error::Result;
use crate::store::EventStore;
use crate::types::{Collections, Profile};

/// Advance `profile` to reflect `data`. Returns the newly unlocked achievements.
pub fn advance_profile(
    profile: &mut Profile,
    data: &Collections,
    config: &AnalyticsConfig,
    clock: &dyn Clock,
) -> Vec<&'static AchievementDefinition> {
    let mut tracker = StreakTracker::new(profile.longest_streak, config.streak_lookback_days);
    let streak = tracker.observe(&data.tasks, clock.today());
    profile.longest_streak = tracker.high_water();

    let counters = Counters::collect(data, streak, profile.theme_toggles);
    evaluate(&mut profile.achievements, CATALOGUE, &counters, clock.now())
}

/// Recompute streak and achievement state from the store's current records
/// and persist it if anything moved.
///
/// Records and profile are read and written in one locked step, so a
/// concurrent theme toggle or record change is never overwritten.
pub fn refresh_profile(
    store: &EventStore,
    config: &AnalyticsConfig,
    clock: &dyn Clock,
) -> Result<Vec<&'static AchievementDefinition>> {
    let (_, unlocked) = store
        .update_profile_with(|profile, data| advance_profile(profile, data, config, clock))?;
    Ok(unlocked)
}

/// Count a theme switch, then refresh achievements.
pub fn record_theme_toggle(
    store: &EventStore,
    config: &AnalyticsConfig,
    clock: &dyn Clock,
) -> Result<Vec<&'static AchievementDefinition>> {
    let profile = store.update_profile(|profile| profile.theme_toggles += 1)?;
    tracing::debug!(toggles = profile.theme_toggles, "Theme toggled");
    refresh_profile(store, config, clock)
}
