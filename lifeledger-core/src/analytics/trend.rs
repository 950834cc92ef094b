//! Trend classification between two adjacent windows.

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::types::{Mood, MoodEntry};

/// Minimum change in mean, either direction, that counts as a trend.
pub const TREND_THRESHOLD: f64 = 0.5;

/// Direction of change between two windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Stable,
    Declining,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Improving => "improving",
            Trend::Stable => "stable",
            Trend::Declining => "declining",
        }
    }

    pub fn arrow(&self) -> &'static str {
        match self {
            Trend::Improving => "↑",
            Trend::Stable => "→",
            Trend::Declining => "↓",
        }
    }
}

/// Means of both windows and the resulting classification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendComparison {
    pub recent_mean: f64,
    pub previous_mean: f64,
    /// `recent_mean - previous_mean`
    pub delta: f64,
    pub trend: Trend,
}

/// Arithmetic mean of the finite values; [`Mood::NEUTRAL`] for an empty window.
pub fn mean_or_neutral(values: &[f64]) -> f64 {
    let (sum, count) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        Mood::NEUTRAL
    } else {
        sum / count as f64
    }
}

/// Classify a change in mean. Exactly ±threshold is still stable.
pub fn classify_means(recent_mean: f64, previous_mean: f64) -> Trend {
    let delta = recent_mean - previous_mean;
    if delta > TREND_THRESHOLD {
        Trend::Improving
    } else if delta < -TREND_THRESHOLD {
        Trend::Declining
    } else {
        Trend::Stable
    }
}

/// Compare two windows of values.
pub fn compare(recent: &[f64], previous: &[f64]) -> TrendComparison {
    let recent_mean = mean_or_neutral(recent);
    let previous_mean = mean_or_neutral(previous);
    TrendComparison {
        recent_mean,
        previous_mean,
        delta: recent_mean - previous_mean,
        trend: classify_means(recent_mean, previous_mean),
    }
}

/// Compare mood logged in the last `window_days` (ending today) with the
/// `window_days` before that.
///
/// Only days with an entry contribute; an empty window counts as neutral.
pub fn mood_trend(moods: &[MoodEntry], today: NaiveDate, window_days: u32) -> TrendComparison {
    let window = Duration::days(i64::from(window_days.max(1)));
    let recent_start = today - window + Duration::days(1);
    let previous_start = recent_start - window;

    let in_range = |from: NaiveDate, to: NaiveDate| -> Vec<f64> {
        moods
            .iter()
            .filter(|m| m.date >= from && m.date < to)
            .map(MoodEntry::value)
            .collect()
    };

    let recent = in_range(recent_start, today + Duration::days(1));
    let previous = in_range(previous_start, recent_start);
    compare(&recent, &previous)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::test_support::{day, mood_on};

    #[test]
    fn test_classification_examples() {
        assert_eq!(compare(&[4.0], &[3.0]).trend, Trend::Improving);
        assert_eq!(compare(&[2.0], &[3.0]).trend, Trend::Declining);
        assert_eq!(compare(&[3.2], &[3.0]).trend, Trend::Stable);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        assert_eq!(classify_means(3.5, 3.0), Trend::Stable);
        assert_eq!(classify_means(2.5, 3.0), Trend::Stable);
        assert_eq!(classify_means(3.51, 3.0), Trend::Improving);
    }

    #[test]
    fn test_empty_windows_are_neutral() {
        assert_eq!(mean_or_neutral(&[]), 3.0);
        let cmp = compare(&[], &[]);
        assert_eq!(cmp.trend, Trend::Stable);
        assert_eq!(cmp.delta, 0.0);

        // A bad recent week against no history still reads as declining
        assert_eq!(compare(&[1.0, 2.0], &[]).trend, Trend::Declining);
    }

    #[test]
    fn test_mean_ignores_non_finite() {
        assert_eq!(mean_or_neutral(&[4.0, f64::NAN, 2.0]), 3.0);
    }

    #[test]
    fn test_mood_trend_windows() {
        let today = day(2024, 6, 14);
        let moods = vec![
            // this week: 06-08 ..= 06-14
            mood_on(day(2024, 6, 14), Mood::Great),
            mood_on(day(2024, 6, 8), Mood::Good),
            // last week: 06-01 ..= 06-07
            mood_on(day(2024, 6, 7), Mood::Okay),
            mood_on(day(2024, 6, 1), Mood::Okay),
            // older, ignored
            mood_on(day(2024, 5, 31), Mood::Terrible),
        ];

        let cmp = mood_trend(&moods, today, 7);
        assert_eq!(cmp.recent_mean, 4.5);
        assert_eq!(cmp.previous_mean, 3.0);
        assert_eq!(cmp.trend, Trend::Improving);
    }
}
