//! JSON backup and restore.
//!
//! A snapshot is one JSON object:
//!
//! ```json
//! {
//!   "version": 1,
//!   "exported_at": "2024-06-15T12:00:00Z",
//!   "owner": "alice",
//!   "tasks": [ ... ],
//!   "moods": [ ... ],
//!   "transactions": [ ... ],
//!   "profile": { ... },
//!   "checksum": "<hex sha256>"
//! }
//! ```
//!
//! The checksum covers only the three collections, serialized with sorted
//! keys. Snapshots without a checksum (hand-written or from older exports)
//! are accepted; a checksum that does not match is not.
//!
//! Imported records always end up owned by the importing user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::store::{merge_by_id, parse_records, EventStore};
use crate::types::{Collections, MoodEntry, Profile, Record, Task, Transaction};

/// Format version written by [`export`].
pub const SNAPSHOT_VERSION: u32 = 1;

/// Serialized form of a full backup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(flatten)]
    pub data: Collections,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
    pub checksum: String,
}

impl Snapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Snapshot as read from disk, before any record is trusted.
#[derive(Debug, Deserialize)]
struct RawSnapshot {
    version: u32,
    #[serde(default)]
    exported_at: Option<DateTime<Utc>>,
    #[serde(default)]
    tasks: Vec<Value>,
    #[serde(default)]
    moods: Vec<Value>,
    #[serde(default)]
    transactions: Vec<Value>,
    #[serde(default)]
    profile: Option<Value>,
    #[serde(default)]
    checksum: Option<String>,
}

/// How imported records combine with existing ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportMode {
    /// Keep existing records; incoming records win on matching ids
    #[default]
    Merge,
    /// Discard existing records
    Replace,
}

impl ImportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportMode::Merge => "merge",
            ImportMode::Replace => "replace",
        }
    }
}

impl std::str::FromStr for ImportMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "merge" => Ok(ImportMode::Merge),
            "replace" => Ok(ImportMode::Replace),
            _ => Err(format!("unknown import mode: {} (expected merge or replace)", s)),
        }
    }
}

/// Outcome of an [`import`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub tasks: usize,
    pub moods: usize,
    pub transactions: usize,
    /// Records dropped because they failed to parse or validate, or repeated an id
    pub excluded: usize,
    pub profile_imported: bool,
}

/// Hex SHA-256 over the three collections.
///
/// `serde_json` maps keep keys sorted, so equal data always hashes equally.
fn checksum(tasks: &[Value], moods: &[Value], transactions: &[Value]) -> String {
    let mut body = serde_json::Map::new();
    body.insert("tasks".to_string(), Value::Array(tasks.to_vec()));
    body.insert("moods".to_string(), Value::Array(moods.to_vec()));
    body.insert(
        "transactions".to_string(),
        Value::Array(transactions.to_vec()),
    );
    let content = Value::Object(body).to_string();

    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

fn to_values<R: Serialize>(records: &[R]) -> Result<Vec<Value>> {
    records
        .iter()
        .map(|r| serde_json::to_value(r).map_err(Error::from))
        .collect()
}

/// Capture the current user's records and profile.
pub fn export(store: &EventStore, now: DateTime<Utc>) -> Result<Snapshot> {
    let data = store.data()?;
    let checksum = checksum(
        &to_values(&data.tasks)?,
        &to_values(&data.moods)?,
        &to_values(&data.transactions)?,
    );

    tracing::info!(
        tasks = data.tasks.len(),
        moods = data.moods.len(),
        transactions = data.transactions.len(),
        "Exported snapshot"
    );

    Ok(Snapshot {
        version: SNAPSHOT_VERSION,
        exported_at: now,
        owner: Some(store.owner()),
        data,
        profile: Some(store.profile()?),
        checksum,
    })
}

/// Restore a snapshot into the store.
///
/// Fails without touching the store when the document is not a snapshot,
/// comes from a newer format, or its checksum does not match. Individual
/// malformed records are excluded and counted.
pub fn import(store: &EventStore, json: &str, mode: ImportMode) -> Result<ImportReport> {
    let raw: RawSnapshot = serde_json::from_str(json)
        .map_err(|e| Error::Snapshot(format!("not a lifeledger snapshot: {}", e)))?;

    if raw.version == 0 || raw.version > SNAPSHOT_VERSION {
        return Err(Error::Snapshot(format!(
            "unsupported snapshot version {} (this build reads up to {})",
            raw.version, SNAPSHOT_VERSION
        )));
    }

    if let Some(expected) = &raw.checksum {
        let actual = checksum(&raw.tasks, &raw.moods, &raw.transactions);
        if !expected.eq_ignore_ascii_case(&actual) {
            return Err(Error::Snapshot(format!(
                "checksum mismatch: snapshot says {}, contents hash to {}",
                expected, actual
            )));
        }
    }

    let owner = store.owner();
    let mut report = ImportReport::default();

    let tasks = reown::<Task>(raw.tasks, &owner, &mut report.excluded);
    let moods = reown::<MoodEntry>(raw.moods, &owner, &mut report.excluded);
    let transactions = reown::<Transaction>(raw.transactions, &owner, &mut report.excluded);
    report.tasks = tasks.len();
    report.moods = moods.len();
    report.transactions = transactions.len();

    apply(store, tasks, mode)?;
    apply(store, moods, mode)?;
    apply(store, transactions, mode)?;

    if let Some(value) = raw.profile {
        match serde_json::from_value::<Profile>(value) {
            Ok(incoming) => {
                store.update_profile(|profile| match mode {
                    ImportMode::Replace => *profile = incoming,
                    ImportMode::Merge => profile.merge(incoming),
                })?;
                report.profile_imported = true;
            }
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring malformed profile in snapshot");
            }
        }
    }

    tracing::info!(
        mode = mode.as_str(),
        exported_at = ?raw.exported_at,
        tasks = report.tasks,
        moods = report.moods,
        transactions = report.transactions,
        excluded = report.excluded,
        "Imported snapshot"
    );

    Ok(report)
}

/// Rewrite ownership to `owner`, then parse, validate and collapse
/// repeated ids to their last copy.
fn reown<R: Record>(values: Vec<Value>, owner: &str, excluded: &mut usize) -> Vec<R> {
    let total = values.len();
    let values: Vec<Value> = values
        .into_iter()
        .map(|mut value| {
            if let Some(object) = value.as_object_mut() {
                object.insert("owner".to_string(), Value::String(owner.to_string()));
            }
            value
        })
        .collect();
    let records = merge_by_id(Vec::new(), parse_records::<R>(values, Some(owner)));
    *excluded += total - records.len();
    records
}

fn apply<R: Record>(store: &EventStore, incoming: Vec<R>, mode: ImportMode) -> Result<()> {
    store.replace_with::<R>(move |existing| match mode {
        ImportMode::Replace => incoming,
        ImportMode::Merge => merge_by_id(existing, incoming),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryBackend, StaticIdentity};
    use crate::types::{AchievementProgress, Category, Mood};
    use chrono::{NaiveDate, TimeZone};
    use std::sync::Arc;

    fn store_for(user: &str) -> EventStore {
        EventStore::open(
            Arc::new(MemoryBackend::new()),
            Arc::new(StaticIdentity::user(user)),
        )
    }

    fn ts(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, d, 9, 30, 0).unwrap()
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn populated(user: &str) -> EventStore {
        let store = store_for(user);
        let mut done = Task::new(user, "write report", ts(1));
        done.complete(ts(2));
        store.append(done).unwrap();
        store.append(Task::new(user, "call mum", ts(3))).unwrap();

        let mut mood = MoodEntry::new(user, date(2), Mood::Good, ts(2));
        mood.note = Some("sunny".to_string());
        mood.tags = vec!["outdoors".to_string()];
        store.append(mood).unwrap();

        store
            .append(Transaction::new(user, Category::Food, 12.34, date(2), ts(2)))
            .unwrap();
        store
            .append(Transaction::new(user, Category::Income, 0.1 + 0.2, date(3), ts(3)))
            .unwrap();
        store
            .update_profile(|p| {
                p.theme_toggles = 2;
                p.longest_streak = 4;
            })
            .unwrap();
        store
    }

    #[test]
    fn test_export_then_replace_round_trips() {
        let source = populated("alice");
        let json = export(&source, ts(10)).unwrap().to_json().unwrap();

        let target = store_for("alice");
        target
            .append(Task::new("alice", "to be replaced", ts(1)))
            .unwrap();
        let report = import(&target, &json, ImportMode::Replace).unwrap();

        assert_eq!(report.tasks, 2);
        assert_eq!(report.moods, 1);
        assert_eq!(report.transactions, 2);
        assert_eq!(report.excluded, 0);
        assert!(report.profile_imported);
        assert_eq!(target.data().unwrap(), source.data().unwrap());
        assert_eq!(target.profile().unwrap(), source.profile().unwrap());
    }

    #[test]
    fn test_import_reowns_records() {
        let json = export(&populated("alice"), ts(10))
            .unwrap()
            .to_json()
            .unwrap();
        let bob = store_for("bob");
        import(&bob, &json, ImportMode::Replace).unwrap();

        let data = bob.data().unwrap();
        assert_eq!(data.tasks.len(), 2);
        assert!(data.tasks.iter().all(|t| t.owner == "bob"));
        assert!(data.moods.iter().all(|m| m.owner == "bob"));
    }

    #[test]
    fn test_merge_incoming_wins_by_id() {
        let store = store_for("alice");
        let mut task = Task::new("alice", "draft", ts(1));
        store.append(task.clone()).unwrap();
        store.append(Task::new("alice", "keep me", ts(1))).unwrap();

        task.title = "final".to_string();
        let other = Task::new("alice", "new", ts(2));
        let json = serde_json::json!({
            "version": 1,
            "tasks": [task, other],
        })
        .to_string();

        let report = import(&store, &json, ImportMode::Merge).unwrap();
        assert_eq!(report.tasks, 2);

        let tasks = store.get_all::<Task>().unwrap();
        let titles: Vec<&str> = tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["final", "keep me", "new"]);
    }

    #[test]
    fn test_repeated_ids_collapse_to_last_copy() {
        let mut first = Task::new("alice", "first draft", ts(1));
        let mut second = first.clone();
        second.title = "second draft".to_string();
        let json = serde_json::json!({
            "version": 1,
            "tasks": [first.clone(), second],
        })
        .to_string();

        let store = store_for("alice");
        let report = import(&store, &json, ImportMode::Merge).unwrap();
        assert_eq!(report.tasks, 1);
        assert_eq!(report.excluded, 1);
        let tasks = store.get_all::<Task>().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "second draft");

        // Same through replace, and against an existing copy
        first.title = "again".to_string();
        let json = serde_json::json!({
            "version": 1,
            "tasks": [first.clone(), first],
        })
        .to_string();
        let report = import(&store, &json, ImportMode::Replace).unwrap();
        assert_eq!(report.excluded, 1);
        let tasks = store.get_all::<Task>().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "again");
    }

    #[test]
    fn test_malformed_records_are_excluded() {
        let good = Task::new("alice", "ok", ts(1));
        let json = serde_json::json!({
            "version": 1,
            "tasks": [good, {"id": "x"}, 42],
            "transactions": [{
                "id": "t1", "owner": "alice", "category": "food",
                "amount": -5.0, "date": "2024-06-01",
                "created_at": "2024-06-01T00:00:00Z"
            }],
        })
        .to_string();

        let store = store_for("alice");
        let report = import(&store, &json, ImportMode::Replace).unwrap();
        assert_eq!(report.tasks, 1);
        assert_eq!(report.transactions, 0);
        assert_eq!(report.excluded, 3);
    }

    #[test]
    fn test_checksum_mismatch_rejected() {
        let mut snapshot = export(&populated("alice"), ts(10)).unwrap();
        snapshot.data.tasks[0].title = "tampered".to_string();
        let json = snapshot.to_json().unwrap();

        let store = store_for("alice");
        let err = import(&store, &json, ImportMode::Replace).unwrap_err();
        assert!(matches!(err, Error::Snapshot(ref msg) if msg.contains("checksum")));
        assert!(store.data().unwrap().is_empty());
    }

    #[test]
    fn test_future_version_rejected() {
        let json = serde_json::json!({ "version": 2, "tasks": [] }).to_string();
        let err = import(&store_for("alice"), &json, ImportMode::Merge).unwrap_err();
        assert!(matches!(err, Error::Snapshot(_)));
    }

    #[test]
    fn test_not_a_snapshot() {
        let err = import(&store_for("alice"), "[1, 2, 3]", ImportMode::Merge).unwrap_err();
        assert!(matches!(err, Error::Snapshot(_)));
    }

    #[test]
    fn test_profile_merge_keeps_best_of_both() {
        let mut ours = Profile {
            theme_toggles: 3,
            longest_streak: 2,
            ..Default::default()
        };
        ours.achievements.insert(
            "first_task".to_string(),
            AchievementProgress {
                progress: 1,
                unlocked: true,
                unlocked_at: Some(ts(5)),
            },
        );

        let mut theirs = Profile {
            theme_toggles: 1,
            longest_streak: 8,
            ..Default::default()
        };
        theirs.achievements.insert(
            "first_task".to_string(),
            AchievementProgress {
                progress: 4,
                unlocked: true,
                unlocked_at: Some(ts(2)),
            },
        );
        theirs.achievements.insert(
            "streak_7".to_string(),
            AchievementProgress {
                progress: 8,
                unlocked: true,
                unlocked_at: Some(ts(3)),
            },
        );

        ours.merge(theirs);
        assert_eq!(ours.theme_toggles, 3);
        assert_eq!(ours.longest_streak, 8);
        assert_eq!(ours.achievements["first_task"].progress, 4);
        assert_eq!(ours.achievements["first_task"].unlocked_at, Some(ts(2)));
        assert!(ours.achievements["streak_7"].unlocked);
    }

    #[test]
    fn test_import_mode_from_str() {
        assert_eq!("merge".parse::<ImportMode>().unwrap(), ImportMode::Merge);
        assert_eq!("REPLACE".parse::<ImportMode>().unwrap(), ImportMode::Replace);
        assert!("append".parse::<ImportMode>().is_err());
    }
}
