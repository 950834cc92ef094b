//! Achievements, XP and levels.
//!
//! Each achievement watches one counter. It unlocks the first time the
//! counter reaches its target and stays unlocked from then on; evaluating it
//! again never moves the unlock timestamp.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::streak::StreakState;
use crate::types::{AchievementProgress, Collections};

/// XP awarded per completed task.
pub const XP_PER_TASK: u64 = 10;

/// XP needed to go up one level.
pub const XP_PER_LEVEL: u64 = 100;

/// Counter an achievement tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressSource {
    CompletedTasks,
    CurrentStreak,
    MoodEntries,
    Transactions,
    ThemeToggles,
}

/// A threshold-triggered badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AchievementDefinition {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    pub source: ProgressSource,
    pub target: u64,
    pub reward_xp: u64,
}

impl AchievementDefinition {
    /// Panics on a zero target; such a definition is a programming error.
    pub const fn new(
        id: &'static str,
        name: &'static str,
        description: &'static str,
        icon: &'static str,
        source: ProgressSource,
        target: u64,
        reward_xp: u64,
    ) -> Self {
        assert!(target > 0, "achievement target must be positive");
        Self {
            id,
            name,
            description,
            icon,
            source,
            target,
            reward_xp,
        }
    }
}

/// Built-in achievements.
pub const CATALOGUE: &[AchievementDefinition] = &[
    AchievementDefinition::new(
        "first_task",
        "First Step",
        "Complete your first task",
        "✅",
        ProgressSource::CompletedTasks,
        1,
        10,
    ),
    AchievementDefinition::new(
        "task_10",
        "Getting Things Done",
        "Complete 10 tasks",
        "📋",
        ProgressSource::CompletedTasks,
        10,
        50,
    ),
    AchievementDefinition::new(
        "task_50",
        "Productivity Pro",
        "Complete 50 tasks",
        "🚀",
        ProgressSource::CompletedTasks,
        50,
        100,
    ),
    AchievementDefinition::new(
        "task_100",
        "Centurion",
        "Complete 100 tasks",
        "💯",
        ProgressSource::CompletedTasks,
        100,
        200,
    ),
    AchievementDefinition::new(
        "streak_3",
        "On a Roll",
        "Keep a 3-day streak",
        "🔥",
        ProgressSource::CurrentStreak,
        3,
        30,
    ),
    AchievementDefinition::new(
        "streak_7",
        "Week Warrior",
        "Keep a 7-day streak",
        "⚡",
        ProgressSource::CurrentStreak,
        7,
        70,
    ),
    AchievementDefinition::new(
        "streak_30",
        "Unstoppable",
        "Keep a 30-day streak",
        "🏆",
        ProgressSource::CurrentStreak,
        30,
        300,
    ),
    AchievementDefinition::new(
        "first_mood",
        "Check-in",
        "Log your first mood",
        "🙂",
        ProgressSource::MoodEntries,
        1,
        10,
    ),
    AchievementDefinition::new(
        "mood_7",
        "Self-aware",
        "Log 7 moods",
        "🧘",
        ProgressSource::MoodEntries,
        7,
        50,
    ),
    AchievementDefinition::new(
        "mood_30",
        "Mood Journalist",
        "Log 30 moods",
        "📔",
        ProgressSource::MoodEntries,
        30,
        150,
    ),
    AchievementDefinition::new(
        "first_transaction",
        "Penny Counter",
        "Log your first transaction",
        "💰",
        ProgressSource::Transactions,
        1,
        10,
    ),
    AchievementDefinition::new(
        "transactions_25",
        "Budget Keeper",
        "Log 25 transactions",
        "📊",
        ProgressSource::Transactions,
        25,
        100,
    ),
    AchievementDefinition::new(
        "theme_5",
        "Interior Designer",
        "Switch the theme 5 times",
        "🎨",
        ProgressSource::ThemeToggles,
        5,
        20,
    ),
];

/// Current value of every progress source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub completed_tasks: u64,
    pub current_streak: u64,
    pub mood_entries: u64,
    pub transactions: u64,
    pub theme_toggles: u64,
}

impl Counters {
    pub fn collect(data: &Collections, streak: StreakState, theme_toggles: u64) -> Self {
        Self {
            completed_tasks: data.completed_tasks().count() as u64,
            current_streak: u64::from(streak.current),
            mood_entries: data.moods.len() as u64,
            transactions: data.transactions.len() as u64,
            theme_toggles,
        }
    }

    pub fn get(&self, source: ProgressSource) -> u64 {
        match source {
            ProgressSource::CompletedTasks => self.completed_tasks,
            ProgressSource::CurrentStreak => self.current_streak,
            ProgressSource::MoodEntries => self.mood_entries,
            ProgressSource::Transactions => self.transactions,
            ProgressSource::ThemeToggles => self.theme_toggles,
        }
    }
}

impl AchievementProgress {
    /// Record a new progress value. Returns true only on the transition to unlocked.
    pub fn observe(&mut self, progress: u64, target: u64, now: DateTime<Utc>) -> bool {
        assert!(target > 0, "achievement target must be positive");
        self.progress = progress;
        if self.unlocked || progress < target {
            return false;
        }
        self.unlocked = true;
        self.unlocked_at = Some(now);
        true
    }
}

/// Update progress for every definition; returns the newly unlocked ones.
pub fn evaluate(
    progress: &mut BTreeMap<String, AchievementProgress>,
    catalogue: &'static [AchievementDefinition],
    counters: &Counters,
    now: DateTime<Utc>,
) -> Vec<&'static AchievementDefinition> {
    let mut unlocked = Vec::new();
    for def in catalogue {
        let entry = progress.entry(def.id.to_string()).or_default();
        if entry.observe(counters.get(def.source), def.target, now) {
            tracing::info!(achievement = def.id, "Achievement unlocked");
            unlocked.push(def);
        }
    }
    unlocked
}

/// A definition together with the user's progress on it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AchievementStatus {
    pub definition: AchievementDefinition,
    pub progress: AchievementProgress,
}

impl AchievementStatus {
    /// Progress towards the target, capped at 1.0.
    pub fn fraction(&self) -> f64 {
        if self.progress.unlocked {
            return 1.0;
        }
        (self.progress.progress as f64 / self.definition.target as f64).min(1.0)
    }
}

/// Status of every definition, in catalogue order.
pub fn statuses(
    catalogue: &[AchievementDefinition],
    progress: &BTreeMap<String, AchievementProgress>,
) -> Vec<AchievementStatus> {
    catalogue
        .iter()
        .map(|def| AchievementStatus {
            definition: *def,
            progress: progress.get(def.id).cloned().unwrap_or_default(),
        })
        .collect()
}

/// XP and level derived from completed tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LevelInfo {
    pub xp: u64,
    pub level: u64,
    pub xp_in_level: u64,
    pub xp_to_next_level: u64,
}

impl LevelInfo {
    pub fn from_completed_tasks(completed: u64) -> Self {
        let xp = completed * XP_PER_TASK;
        let xp_in_level = xp % XP_PER_LEVEL;
        Self {
            xp,
            level: xp / XP_PER_LEVEL + 1,
            xp_in_level,
            xp_to_next_level: XP_PER_LEVEL - xp_in_level,
        }
    }
}
