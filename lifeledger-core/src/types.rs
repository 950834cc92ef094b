//! Core domain types for lifeledger
//!
//! These types are the records persisted by the event store and consumed by
//! the analytics core.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Task** | A completable record: created at some instant, optionally completed later |
//! | **MoodEntry** | A dated journal entry carrying a 1–5 mood score |
//! | **Transaction** | A dated amount, either income or an expense in a fixed category |
//! | **Owner** | The user id a record was created under; used only for namespacing |
//! | **Collection** | One of the three persisted record sets (`tasks`, `moods`, `transactions`) |

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Generate a fresh record id.
pub fn new_record_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Project an instant onto the local calendar day it falls on.
pub fn local_date(instant: DateTime<Utc>) -> NaiveDate {
    instant.with_timezone(&Local).date_naive()
}

// ============================================
// Collections
// ============================================

/// The persisted record collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Tasks,
    Moods,
    Transactions,
}

impl Collection {
    /// All collections, in export order.
    pub const ALL: [Collection; 3] = [
        Collection::Tasks,
        Collection::Moods,
        Collection::Transactions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Tasks => "tasks",
            Collection::Moods => "moods",
            Collection::Transactions => "transactions",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tasks" => Ok(Collection::Tasks),
            "moods" => Ok(Collection::Moods),
            "transactions" => Ok(Collection::Transactions),
            _ => Err(format!("unknown collection: {}", s)),
        }
    }
}

/// A record that lives in one of the store's collections.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Collection this record type is stored in.
    const COLLECTION: Collection;

    /// Unique identifier within the collection.
    fn id(&self) -> &str;

    /// User id the record belongs to.
    fn owner(&self) -> &str;

    /// Shape check beyond what deserialization enforces.
    ///
    /// Records failing this are excluded from loading and aggregation.
    fn validate(&self) -> Result<(), String>;

    /// This record type's slot in a [`Collections`].
    fn slot(collections: &Collections) -> &Vec<Self>;

    fn slot_mut(collections: &mut Collections) -> &mut Vec<Self>;

    /// Wrap a full collection for change notification.
    fn into_snapshot(records: Vec<Self>) -> CollectionSnapshot;
}

/// All records of one user, one vector per collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Collections {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub moods: Vec<MoodEntry>,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

impl Collections {
    pub fn len(&self, collection: Collection) -> usize {
        match collection {
            Collection::Tasks => self.tasks.len(),
            Collection::Moods => self.moods.len(),
            Collection::Transactions => self.transactions.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty() && self.moods.is_empty() && self.transactions.is_empty()
    }

    /// Completed tasks only.
    pub fn completed_tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|t| t.completed)
    }
}

/// A full collection, as handed to subscribers after a mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionSnapshot {
    Tasks(Vec<Task>),
    Moods(Vec<MoodEntry>),
    Transactions(Vec<Transaction>),
}

impl CollectionSnapshot {
    pub fn collection(&self) -> Collection {
        match self {
            CollectionSnapshot::Tasks(_) => Collection::Tasks,
            CollectionSnapshot::Moods(_) => Collection::Moods,
            CollectionSnapshot::Transactions(_) => Collection::Transactions,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            CollectionSnapshot::Tasks(r) => r.len(),
            CollectionSnapshot::Moods(r) => r.len(),
            CollectionSnapshot::Transactions(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================
// Task (completable record)
// ============================================

/// Task priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            _ => Err(format!("unknown priority: {}", s)),
        }
    }
}

/// A task that can be completed.
///
/// `completed_at` is present exactly when `completed` is true, and is never
/// earlier than `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub owner: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create an open task owned by `owner`.
    pub fn new(owner: &str, title: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            id: new_record_id(),
            owner: owner.to_string(),
            title: title.to_string(),
            description: None,
            priority: Priority::default(),
            due_date: None,
            created_at,
            completed: false,
            completed_at: None,
        }
    }

    /// Mark complete. Completing an already-complete task keeps the original
    /// completion instant.
    pub fn complete(&mut self, now: DateTime<Utc>) {
        if self.completed {
            return;
        }
        self.completed = true;
        self.completed_at = Some(now.max(self.created_at));
    }

    /// Reopen a completed task.
    pub fn reopen(&mut self) {
        self.completed = false;
        self.completed_at = None;
    }

    /// Open and past its due date.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.completed && self.due_date.is_some_and(|due| due < today)
    }

    /// Local calendar day the task was completed on.
    pub fn completion_date(&self) -> Option<NaiveDate> {
        match (self.completed, self.completed_at) {
            (true, Some(at)) => Some(local_date(at)),
            _ => None,
        }
    }
}

impl Record for Task {
    const COLLECTION: Collection = Collection::Tasks;

    fn id(&self) -> &str {
        &self.id
    }

    fn owner(&self) -> &str {
        &self.owner
    }

    fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("task id is empty".to_string());
        }
        match (self.completed, self.completed_at) {
            (true, None) => Err(format!("task {} is completed without a timestamp", self.id)),
            (false, Some(_)) => Err(format!("task {} has a timestamp but is open", self.id)),
            (true, Some(at)) if at < self.created_at => Err(format!(
                "task {} completed before it was created",
                self.id
            )),
            _ => Ok(()),
        }
    }

    fn slot(collections: &Collections) -> &Vec<Self> {
        &collections.tasks
    }

    fn slot_mut(collections: &mut Collections) -> &mut Vec<Self> {
        &mut collections.tasks
    }

    fn into_snapshot(records: Vec<Self>) -> CollectionSnapshot {
        CollectionSnapshot::Tasks(records)
    }
}

// ============================================
// MoodEntry (dated entry)
// ============================================

/// Mood score on a 1–5 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Terrible,
    Bad,
    Okay,
    Good,
    Great,
}

impl Mood {
    /// Neutral midpoint of the scale.
    pub const NEUTRAL: f64 = 3.0;

    pub const ALL: [Mood; 5] = [Mood::Terrible, Mood::Bad, Mood::Okay, Mood::Good, Mood::Great];

    /// Integer score, 1 (terrible) to 5 (great).
    pub fn score(&self) -> u8 {
        match self {
            Mood::Terrible => 1,
            Mood::Bad => 2,
            Mood::Okay => 3,
            Mood::Good => 4,
            Mood::Great => 5,
        }
    }

    pub fn from_score(score: u8) -> Option<Self> {
        match score {
            1 => Some(Mood::Terrible),
            2 => Some(Mood::Bad),
            3 => Some(Mood::Okay),
            4 => Some(Mood::Good),
            5 => Some(Mood::Great),
            _ => None,
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Mood::Terrible => "😢",
            Mood::Bad => "😕",
            Mood::Okay => "😐",
            Mood::Good => "🙂",
            Mood::Great => "😄",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Terrible => "terrible",
            Mood::Bad => "bad",
            Mood::Okay => "okay",
            Mood::Good => "good",
            Mood::Great => "great",
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for Mood {
    type Err = String;

    /// Accepts a name (`good`), a score (`4`) or the emoji.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(score) = trimmed.parse::<u8>() {
            return Mood::from_score(score).ok_or_else(|| format!("mood score out of range: {}", s));
        }
        Mood::ALL
            .into_iter()
            .find(|m| m.as_str() == trimmed.to_lowercase() || m.emoji() == trimmed)
            .ok_or_else(|| format!("unknown mood: {}", s))
    }
}

/// One mood journal entry for a calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodEntry {
    pub id: String,
    pub owner: String,
    pub date: NaiveDate,
    pub mood: Mood,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl MoodEntry {
    pub fn new(owner: &str, date: NaiveDate, mood: Mood, created_at: DateTime<Utc>) -> Self {
        Self {
            id: new_record_id(),
            owner: owner.to_string(),
            date,
            mood,
            note: None,
            tags: Vec::new(),
            created_at,
        }
    }

    pub fn value(&self) -> f64 {
        f64::from(self.mood.score())
    }
}

impl Record for MoodEntry {
    const COLLECTION: Collection = Collection::Moods;

    fn id(&self) -> &str {
        &self.id
    }

    fn owner(&self) -> &str {
        &self.owner
    }

    fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("mood entry id is empty".to_string());
        }
        Ok(())
    }

    fn slot(collections: &Collections) -> &Vec<Self> {
        &collections.moods
    }

    fn slot_mut(collections: &mut Collections) -> &mut Vec<Self> {
        &mut collections.moods
    }

    fn into_snapshot(records: Vec<Self>) -> CollectionSnapshot {
        CollectionSnapshot::Moods(records)
    }
}

// ============================================
// Transaction (amount entry)
// ============================================

/// Transaction category. `Income` is the only non-expense category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Income,
    Food,
    Transport,
    Shopping,
    Entertainment,
    Bills,
    Health,
    Education,
    Other,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::Income,
        Category::Food,
        Category::Transport,
        Category::Shopping,
        Category::Entertainment,
        Category::Bills,
        Category::Health,
        Category::Education,
        Category::Other,
    ];

    pub fn is_income(&self) -> bool {
        matches!(self, Category::Income)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Income => "income",
            Category::Food => "food",
            Category::Transport => "transport",
            Category::Shopping => "shopping",
            Category::Entertainment => "entertainment",
            Category::Bills => "bills",
            Category::Health => "health",
            Category::Education => "education",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == lower)
            .ok_or_else(|| format!("unknown category: {}", s))
    }
}

/// Income or expense. `amount` is stored positive; the sign comes from the category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub owner: String,
    pub category: Category,
    pub amount: f64,
    #[serde(default)]
    pub description: Option<String>,
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        owner: &str,
        category: Category,
        amount: f64,
        date: NaiveDate,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_record_id(),
            owner: owner.to_string(),
            category,
            amount: amount.abs(),
            description: None,
            date,
            created_at,
        }
    }

    pub fn is_income(&self) -> bool {
        self.category.is_income()
    }

    /// `+amount` for income, `-amount` for expenses.
    pub fn signed_amount(&self) -> f64 {
        if self.is_income() {
            self.amount
        } else {
            -self.amount
        }
    }
}

impl Record for Transaction {
    const COLLECTION: Collection = Collection::Transactions;

    fn id(&self) -> &str {
        &self.id
    }

    fn owner(&self) -> &str {
        &self.owner
    }

    fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("transaction id is empty".to_string());
        }
        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err(format!(
                "transaction {} has invalid amount {}",
                self.id, self.amount
            ));
        }
        Ok(())
    }

    fn slot(collections: &Collections) -> &Vec<Self> {
        &collections.transactions
    }

    fn slot_mut(collections: &mut Collections) -> &mut Vec<Self> {
        &mut collections.transactions
    }

    fn into_snapshot(records: Vec<Self>) -> CollectionSnapshot {
        CollectionSnapshot::Transactions(records)
    }
}

// ============================================
// Gamification state
// ============================================

/// Progress towards one achievement.
///
/// Once `unlocked` is set it is never cleared, and `unlocked_at` never changes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AchievementProgress {
    pub progress: u64,
    pub unlocked: bool,
    #[serde(default)]
    pub unlocked_at: Option<DateTime<Utc>>,
}

/// Per-user persisted gamification state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Profile {
    /// How many times the user switched the display theme
    #[serde(default)]
    pub theme_toggles: u64,
    /// Longest streak ever observed (high-water mark)
    #[serde(default)]
    pub longest_streak: u32,
    /// Achievement id -> progress
    #[serde(default)]
    pub achievements: std::collections::BTreeMap<String, AchievementProgress>,
}

impl Profile {
    /// Combine with another profile without losing progress from either.
    ///
    /// Counters take the max; an achievement unlocked on either side stays
    /// unlocked with the earliest unlock time.
    pub fn merge(&mut self, incoming: Profile) {
        self.theme_toggles = self.theme_toggles.max(incoming.theme_toggles);
        self.longest_streak = self.longest_streak.max(incoming.longest_streak);

        for (id, theirs) in incoming.achievements {
            let ours = self.achievements.entry(id).or_default();
            ours.progress = ours.progress.max(theirs.progress);
            if theirs.unlocked {
                ours.unlocked_at = match (ours.unlocked, ours.unlocked_at, theirs.unlocked_at) {
                    (true, Some(a), Some(b)) => Some(a.min(b)),
                    (true, Some(a), None) => Some(a),
                    (_, _, b) => b,
                };
                ours.unlocked = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, h, 0, 0).unwrap()
    }

    #[test]
    fn test_task_complete_and_reopen() {
        let mut task = Task::new("ada", "write tests", ts(8));
        assert!(task.validate().is_ok());
        assert!(task.completion_date().is_none());

        task.complete(ts(9));
        assert!(task.completed);
        assert_eq!(task.completed_at, Some(ts(9)));
        assert!(task.validate().is_ok());

        // Re-completing keeps the first instant
        task.complete(ts(12));
        assert_eq!(task.completed_at, Some(ts(9)));

        task.reopen();
        assert!(!task.completed);
        assert!(task.completed_at.is_none());
    }

    #[test]
    fn test_task_completion_never_precedes_creation() {
        let mut task = Task::new("ada", "clock skew", ts(10));
        task.complete(ts(9));
        assert_eq!(task.completed_at, Some(ts(10)));
    }

    #[test]
    fn test_task_validation_rejects_inconsistent_completion() {
        let mut task = Task::new("ada", "broken", ts(10));
        task.completed = true;
        assert!(task.validate().is_err());

        task.completed = false;
        task.completed_at = Some(ts(11));
        assert!(task.validate().is_err());

        task.completed = true;
        task.completed_at = Some(ts(9));
        assert!(task.validate().is_err());
    }

    #[test]
    fn test_task_overdue() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let mut task = Task::new("ada", "pay rent", ts(8));
        assert!(!task.is_overdue(today));

        task.due_date = NaiveDate::from_ymd_opt(2024, 3, 9);
        assert!(task.is_overdue(today));

        task.complete(ts(9));
        assert!(!task.is_overdue(today));
    }

    #[test]
    fn test_mood_parsing() {
        assert_eq!("good".parse::<Mood>().unwrap(), Mood::Good);
        assert_eq!("5".parse::<Mood>().unwrap(), Mood::Great);
        assert_eq!("😢".parse::<Mood>().unwrap(), Mood::Terrible);
        assert!("6".parse::<Mood>().is_err());
        assert!("meh".parse::<Mood>().is_err());
    }

    #[test]
    fn test_mood_scores_round_trip() {
        for mood in Mood::ALL {
            assert_eq!(Mood::from_score(mood.score()), Some(mood));
        }
    }

    #[test]
    fn test_transaction_sign() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let income = Transaction::new("ada", Category::Income, 1200.0, date, ts(8));
        let lunch = Transaction::new("ada", Category::Food, -12.5, date, ts(12));

        assert_eq!(income.signed_amount(), 1200.0);
        assert_eq!(lunch.amount, 12.5);
        assert_eq!(lunch.signed_amount(), -12.5);
    }

    #[test]
    fn test_transaction_validation() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let mut tx = Transaction::new("ada", Category::Bills, 80.0, date, ts(8));
        assert!(tx.validate().is_ok());

        tx.amount = f64::NAN;
        assert!(tx.validate().is_err());
    }

    #[test]
    fn test_collection_names() {
        for collection in Collection::ALL {
            assert_eq!(collection.as_str().parse::<Collection>(), Ok(collection));
        }
        assert_eq!(
            serde_json::to_string(&Collection::Transactions).unwrap(),
            "\"transactions\""
        );
    }
}
