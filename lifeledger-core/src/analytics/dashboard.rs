//! Dashboard view-models.
//!
//! Everything here is plain data computed from a [`Collections`] snapshot;
//! formatting and localisation are left to the presentation layer.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;

use super::achievements::{statuses, AchievementStatus, LevelInfo, CATALOGUE};
use super::buckets::{
    category_breakdown, monthly_trend, rolling_series, BucketUnit, CategorySlice, MonthlyTotals,
    Reducer, SeriesPoint,
};
use super::streak::{StreakState, StreakTracker};
use super::trend::{mood_trend, TrendComparison};
use crate::config::AnalyticsConfig;
use crate::types::{Collections, Mood, MoodEntry, Profile, Task, Transaction};

/// Task completion statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductivityStats {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    pub overdue: usize,
    /// Completed share of all tasks, 0–100 (0 with no tasks)
    pub completion_rate: f64,
    pub completed_today: usize,
    /// Completions per day, oldest first
    pub daily_completions: Vec<SeriesPoint>,
}

impl ProductivityStats {
    pub fn compute(tasks: &[Task], today: NaiveDate, days: u32) -> Self {
        let total = tasks.len();
        let completed = tasks.iter().filter(|t| t.completed).count();
        let completion_rate = if total == 0 {
            0.0
        } else {
            completed as f64 / total as f64 * 100.0
        };

        Self {
            total,
            completed,
            pending: total - completed,
            overdue: tasks.iter().filter(|t| t.is_overdue(today)).count(),
            completion_rate,
            completed_today: tasks
                .iter()
                .filter(|t| t.completion_date() == Some(today))
                .count(),
            daily_completions: rolling_series(
                tasks,
                today,
                days,
                Task::completion_date,
                |_| 1.0,
                Reducer::Count,
                0.0,
            ),
        }
    }
}

/// Mood journal statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoodInsights {
    pub entries: usize,
    /// Mean score over all entries
    pub average: Option<f64>,
    /// Mean score per day, neutral where nothing was logged
    pub daily_average: Vec<SeriesPoint>,
    /// Mean score per ISO week over the whole journal
    pub weekly_average: Vec<SeriesPoint>,
    /// Most logged mood; ties go to the happier mood
    pub most_frequent: Option<Mood>,
    pub trend: TrendComparison,
}

impl MoodInsights {
    pub fn compute(moods: &[MoodEntry], today: NaiveDate, days: u32) -> Self {
        let average = if moods.is_empty() {
            None
        } else {
            Some(moods.iter().map(MoodEntry::value).sum::<f64>() / moods.len() as f64)
        };

        let mut frequency: HashMap<Mood, usize> = HashMap::new();
        for entry in moods {
            *frequency.entry(entry.mood).or_insert(0) += 1;
        }
        let most_frequent = frequency
            .into_iter()
            .max_by_key(|(mood, count)| (*count, *mood))
            .map(|(mood, _)| mood);

        Self {
            entries: moods.len(),
            average,
            daily_average: rolling_series(
                moods,
                today,
                days,
                |m| Some(m.date),
                MoodEntry::value,
                Reducer::Average,
                Mood::NEUTRAL,
            ),
            weekly_average: super::buckets::aggregate(
                moods,
                BucketUnit::Week,
                |m| Some(m.date),
                MoodEntry::value,
                Reducer::Average,
            ),
            most_frequent,
            trend: mood_trend(moods, today, days),
        }
    }
}

/// Income and spending statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpenseSummary {
    pub total_income: f64,
    pub total_expense: f64,
    /// `total_income - total_expense`
    pub balance: f64,
    pub month_income: f64,
    pub month_expense: f64,
    pub breakdown: Vec<CategorySlice>,
    pub monthly: Vec<MonthlyTotals>,
}

impl ExpenseSummary {
    pub fn compute(transactions: &[Transaction], today: NaiveDate, months: usize) -> Self {
        let valid: Vec<Transaction> = transactions
            .iter()
            .filter(|tx| tx.amount.is_finite())
            .cloned()
            .collect();

        let sum = |income: bool, this_month_only: bool| -> f64 {
            let month = BucketUnit::Month.bucket_start(today);
            valid
                .iter()
                .filter(|tx| tx.is_income() == income)
                .filter(|tx| !this_month_only || BucketUnit::Month.bucket_start(tx.date) == month)
                .map(|tx| tx.amount)
                .sum()
        };

        let total_income = sum(true, false);
        let total_expense = sum(false, false);

        Self {
            total_income,
            total_expense,
            balance: total_income - total_expense,
            month_income: sum(true, true),
            month_expense: sum(false, true),
            breakdown: category_breakdown(&valid),
            monthly: monthly_trend(&valid, months),
        }
    }
}

/// Everything the main screen shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub date: NaiveDate,
    pub productivity: ProductivityStats,
    pub mood: MoodInsights,
    pub expenses: ExpenseSummary,
    pub streak: StreakState,
    pub level: LevelInfo,
    pub achievements: Vec<AchievementStatus>,
    /// Some data could not be loaded from or saved to storage
    pub stale: bool,
}

impl Dashboard {
    /// Compute every view from a snapshot.
    ///
    /// `profile.longest_streak` seeds the streak high-water mark.
    pub fn compute(
        data: &Collections,
        profile: &Profile,
        today: NaiveDate,
        config: &AnalyticsConfig,
        stale: bool,
    ) -> Self {
        let streak = StreakTracker::new(profile.longest_streak, config.streak_lookback_days)
            .observe(&data.tasks, today);
        let completed = data.completed_tasks().count() as u64;

        Self {
            date: today,
            productivity: ProductivityStats::compute(&data.tasks, today, config.rolling_days),
            mood: MoodInsights::compute(&data.moods, today, config.rolling_days),
            expenses: ExpenseSummary::compute(
                &data.transactions,
                today,
                config.monthly_trend_months,
            ),
            streak,
            level: LevelInfo::from_completed_tasks(completed),
            achievements: statuses(CATALOGUE, &profile.achievements),
            stale,
        }
    }

    pub fn unlocked_count(&self) -> usize {
        self.achievements
            .iter()
            .filter(|a| a.progress.unlocked)
            .count()
    }
}
