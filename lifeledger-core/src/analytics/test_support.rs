//! Record builders shared by the analytics tests.

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};

use crate::types::{Category, Mood, MoodEntry, Task, Transaction};

pub const OWNER: &str = "tester";

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Local noon of `date`, as UTC.
pub fn noon(date: NaiveDate) -> DateTime<Utc> {
    let naive = date.and_hms_opt(12, 0, 0).unwrap();
    Local
        .from_local_datetime(&naive)
        .earliest()
        .unwrap()
        .with_timezone(&Utc)
}

pub fn open_task() -> Task {
    Task::new(OWNER, "open", noon(day(2024, 1, 1)))
}

/// A task created and completed at local noon of `date`.
pub fn completed_on(date: NaiveDate) -> Task {
    let at = noon(date);
    let mut task = Task::new(OWNER, "done", at);
    task.complete(at);
    task
}

pub fn tx(category: Category, amount: f64, date: NaiveDate) -> Transaction {
    Transaction::new(OWNER, category, amount, date, noon(date))
}

pub fn mood_on(date: NaiveDate, mood: Mood) -> MoodEntry {
    MoodEntry::new(OWNER, date, mood, noon(date))
}
