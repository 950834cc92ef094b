//! Event store: the in-memory record collections and their persistence
//!
//! ## Architecture
//!
//! ```text
//!   caller ── append / update / modify / replace ──▶ EventStore
//!                                                      │
//!                       ┌──────────────────────────────┼──────────────────────┐
//!                       │ under one mutex:             │                      │
//!                       │  1. read in-memory vector    │                      │
//!                       │  2. apply the change         │                      │
//!                       │  3. serialize + Backend::set ├──▶ Backend (SQLite / │
//!                       │  4. record staleness         │      memory)         │
//!                       └──────────────────────────────┘                      │
//!                                                      │
//!                                 notify subscribers of that collection
//!                                 (same call, after the lock is released)
//! ```
//!
//! Reads always come from memory, so a read right after a write observes it
//! even when the backend write failed. A failed write marks the key stale;
//! [`EventStore::is_stale`] reports whether any key is out of sync with the
//! backend.
//!
//! A key whose stored copy could not be read is never overwritten. Changes
//! to it stay in memory until a later write (or [`EventStore::reload`])
//! manages to read it; the stored records are then merged under the
//! in-memory ones.

pub mod backend;
pub mod identity;

pub use backend::{Backend, MemoryBackend};
pub use identity::{IdentityProvider, StaticIdentity, GUEST_NAMESPACE};

use crate::error::{Error, Result};
use crate::types::{
    Collection, CollectionSnapshot, Collections, MoodEntry, Profile, Record, Task, Transaction,
};
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

/// Key suffix for the per-user gamification profile.
const PROFILE_KEY: &str = "profile";

/// Callback invoked with the new snapshot of a collection.
pub type Subscriber = Arc<dyn Fn(&CollectionSnapshot) + Send + Sync>;

/// Handle returned by [`EventStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    collections: Vec<Collection>,
    callback: Subscriber,
}

struct StoreState {
    namespace: String,
    data: Collections,
    profile: Profile,
    /// Keys whose last write failed
    stale_keys: HashSet<String>,
    /// Keys whose stored copy could not be read
    unreadable_keys: HashSet<String>,
}

impl StoreState {
    fn new(namespace: String) -> Self {
        Self {
            namespace,
            data: Collections::default(),
            profile: Profile::default(),
            stale_keys: HashSet::new(),
            unreadable_keys: HashSet::new(),
        }
    }
}

/// Record collections of the current user, persisted through a [`Backend`].
pub struct EventStore {
    backend: Arc<dyn Backend>,
    identity: Arc<dyn IdentityProvider>,
    state: Mutex<StoreState>,
    subscribers: RwLock<Vec<Subscription>>,
    next_subscription: Mutex<u64>,
}

impl EventStore {
    /// Open the store and load the current user's collections.
    ///
    /// Load failures never fail opening: the affected collection starts
    /// empty and the store reports itself stale.
    pub fn open(backend: Arc<dyn Backend>, identity: Arc<dyn IdentityProvider>) -> Self {
        let mut state = StoreState::new(identity.namespace());
        load_into(backend.as_ref(), &mut state);

        Self {
            backend,
            identity,
            state: Mutex::new(state),
            subscribers: RwLock::new(Vec::new()),
            next_subscription: Mutex::new(0),
        }
    }

    /// Re-read everything from the backend, e.g. after the signed-in user
    /// changed or the backend became readable again.
    ///
    /// In-memory changes that never reached the backend are dropped.
    /// Subscribers of every collection are notified.
    pub fn reload(&self) -> Result<()> {
        let snapshots = {
            let mut state = self.lock()?;
            *state = StoreState::new(self.identity.namespace());
            load_into(self.backend.as_ref(), &mut state);
            all_snapshots(&state.data)
        };
        for snapshot in &snapshots {
            self.notify(snapshot);
        }
        Ok(())
    }

    /// User id new records should be owned by.
    pub fn owner(&self) -> String {
        self.lock()
            .map(|s| s.namespace.clone())
            .unwrap_or_else(|_| self.identity.namespace())
    }

    /// True when some collection could not be loaded from or written to the backend.
    pub fn is_stale(&self) -> bool {
        self.lock()
            .map(|s| !s.stale_keys.is_empty() || !s.unreadable_keys.is_empty())
            .unwrap_or(true)
    }

    // ============================================
    // Reads
    // ============================================

    /// Full snapshot of one collection.
    pub fn get_all<R: Record>(&self) -> Result<Vec<R>> {
        Ok(R::slot(&self.lock()?.data).clone())
    }

    /// Find a record by id.
    pub fn find<R: Record>(&self, id: &str) -> Result<Option<R>> {
        Ok(R::slot(&self.lock()?.data)
            .iter()
            .find(|r| r.id() == id)
            .cloned())
    }

    /// Every collection of the current user.
    pub fn data(&self) -> Result<Collections> {
        Ok(self.lock()?.data.clone())
    }

    /// The mood entry already logged for `date`, if any.
    ///
    /// The store itself allows several entries per day; callers use this to
    /// offer an overwrite instead of adding a duplicate.
    pub fn mood_for_date(&self, date: NaiveDate) -> Result<Option<MoodEntry>> {
        Ok(self
            .lock()?
            .data
            .moods
            .iter()
            .find(|m| m.date == date)
            .cloned())
    }

    // ============================================
    // Mutations
    // ============================================

    /// Append a record. Fails if its id is already taken.
    pub fn append<R: Record>(&self, record: R) -> Result<()> {
        self.mutate::<R, _>(|records, owner| {
            check_record(&record, owner)?;
            if records.iter().any(|r| r.id() == record.id()) {
                return Err(Error::InvalidRecord {
                    collection: R::COLLECTION.to_string(),
                    reason: format!("id {} already exists", record.id()),
                });
            }
            records.push(record);
            Ok(())
        })
    }

    /// Replace the record with the same id. Returns false if there was none.
    pub fn update<R: Record>(&self, record: R) -> Result<bool> {
        self.mutate::<R, _>(|records, owner| {
            check_record(&record, owner)?;
            match records.iter().position(|r| r.id() == record.id()) {
                Some(index) => {
                    records[index] = record;
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    /// Apply `f` to the record with `id` and store the result.
    pub fn modify<R: Record>(&self, id: &str, f: impl FnOnce(&mut R)) -> Result<R> {
        self.mutate::<R, _>(|records, owner| {
            let index = records
                .iter()
                .position(|r| r.id() == id)
                .ok_or_else(|| Error::NotFound {
                    collection: R::COLLECTION.to_string(),
                    id: id.to_string(),
                })?;
            let mut record = records[index].clone();
            f(&mut record);
            if record.id() != id {
                return Err(Error::InvalidRecord {
                    collection: R::COLLECTION.to_string(),
                    reason: format!("id {} cannot be changed", id),
                });
            }
            check_record(&record, owner)?;
            records[index] = record.clone();
            Ok(record)
        })
    }

    /// Remove a record by id. Returns false if there was none.
    pub fn remove_by_id<R: Record>(&self, id: &str) -> Result<bool> {
        self.mutate::<R, _>(|records, _| {
            let before = records.len();
            records.retain(|r| r.id() != id);
            Ok(records.len() != before)
        })
    }

    /// Replace a whole collection. Invalid or foreign records are dropped.
    pub fn replace_all<R: Record>(&self, records: Vec<R>) -> Result<()> {
        self.replace_with::<R>(move |_| records)
    }

    /// Replace a collection with `f(current)`.
    ///
    /// Invalid or foreign records in the result are dropped; of records
    /// sharing an id, the last one is kept.
    pub fn replace_with<R: Record>(&self, f: impl FnOnce(Vec<R>) -> Vec<R>) -> Result<()> {
        self.mutate::<R, _>(|slot, owner| {
            let accepted: Vec<R> = f(std::mem::take(slot))
                .into_iter()
                .filter(|r| match check_record(r, owner) {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::debug!(id = r.id(), error = %e, "Dropping record");
                        false
                    }
                })
                .collect();
            let total = accepted.len();
            *slot = merge_by_id(Vec::new(), accepted);
            if slot.len() != total {
                tracing::debug!(
                    collection = %R::COLLECTION,
                    dropped = total - slot.len(),
                    "Dropped records with repeated ids"
                );
            }
            Ok(())
        })
    }

    // ============================================
    // Profile
    // ============================================

    /// Current gamification profile.
    pub fn profile(&self) -> Result<Profile> {
        Ok(self.lock()?.profile.clone())
    }

    /// Modify and persist the profile, returning the new value.
    pub fn update_profile(&self, f: impl FnOnce(&mut Profile)) -> Result<Profile> {
        self.update_profile_with(|profile, _| f(profile))
            .map(|(profile, ())| profile)
    }

    /// Modify the profile with the current records in view.
    ///
    /// Records and profile are read and written under the same lock. The
    /// profile is only persisted when `f` changed it or its last write failed.
    pub fn update_profile_with<T>(
        &self,
        f: impl FnOnce(&mut Profile, &Collections) -> T,
    ) -> Result<(Profile, T)> {
        let (profile, out, recovered) = {
            let mut state = self.lock()?;
            let recovered = self.recover_all(&mut state);

            let before = state.profile.clone();
            let StoreState { profile, data, .. } = &mut *state;
            let out = f(profile, &*data);

            let key = storage_key(&state.namespace, PROFILE_KEY);
            if state.profile != before || state.stale_keys.contains(&key) {
                self.persist_profile(&mut state, key);
            }
            (state.profile.clone(), out, recovered)
        };
        for snapshot in &recovered {
            self.notify(snapshot);
        }
        Ok((profile, out))
    }

    // ============================================
    // Subscriptions
    // ============================================

    /// Register `callback` for changes to the given collections.
    ///
    /// The callback runs synchronously inside the mutating call, after the
    /// store's lock is released, so it may read from the store.
    pub fn subscribe<F>(&self, collections: &[Collection], callback: F) -> SubscriptionId
    where
        F: Fn(&CollectionSnapshot) + Send + Sync + 'static,
    {
        let id = {
            let mut next = self
                .next_subscription
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *next += 1;
            SubscriptionId(*next)
        };
        let subscription = Subscription {
            id,
            collections: collections.to_vec(),
            callback: Arc::new(callback),
        };
        self.subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(subscription);
        id
    }

    /// Remove a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() != before
    }

    // ============================================
    // Internals
    // ============================================

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>> {
        self.state
            .lock()
            .map_err(|_| Error::Backend("event store lock poisoned".to_string()))
    }

    /// Read-modify-write of one collection under the store lock, then notify.
    ///
    /// `f` gets the collection and the current owner. When it fails it must
    /// leave the collection untouched; nothing is written or notified.
    fn mutate<R: Record, T>(&self, f: impl FnOnce(&mut Vec<R>, &str) -> Result<T>) -> Result<T> {
        let (out, snapshot, recovered) = {
            let mut state = self.lock()?;
            let recovered = self.recover_all(&mut state);

            let inner = &mut *state;
            let out = f(R::slot_mut(&mut inner.data), inner.namespace.as_str())?;

            let key = storage_key(&state.namespace, R::COLLECTION.as_str());
            let records = R::slot(&state.data).clone();
            self.persist(&mut state, key, &records);
            (out, R::into_snapshot(records), recovered)
        };
        for other in recovered.iter().filter(|s| s.collection() != R::COLLECTION) {
            self.notify(other);
        }
        self.notify(&snapshot);
        Ok(out)
    }

    fn persist<R: Record>(&self, state: &mut StoreState, key: String, records: &[R]) {
        if state.unreadable_keys.contains(&key) {
            tracing::warn!(key = %key, "Stored collection unreadable; keeping change in memory");
            return;
        }
        if records.is_empty() {
            self.write(state, key, None);
            return;
        }
        match serde_json::to_string(records) {
            Ok(json) => self.write(state, key, Some(&json)),
            Err(e) => {
                tracing::warn!(collection = %R::COLLECTION, error = %e, "Failed to serialize collection");
                state.stale_keys.insert(key);
            }
        }
    }

    /// Store `value` under `key`, or delete the key when there is no value.
    fn write(&self, state: &mut StoreState, key: String, value: Option<&str>) {
        let result = match value {
            Some(json) => self.backend.set(&key, json),
            None => self.backend.remove(&key),
        };
        match result {
            Ok(()) => {
                state.stale_keys.remove(&key);
            }
            Err(e) => {
                tracing::warn!(
                    key = %key,
                    backend = self.backend.name(),
                    error = %e,
                    "Persisting failed; keeping in-memory state"
                );
                state.stale_keys.insert(key);
            }
        }
    }

    /// Retry every key whose stored copy could not be read.
    ///
    /// Recovered collections are merged under the in-memory records and
    /// written back; their new snapshots are returned for notification.
    fn recover_all(&self, state: &mut StoreState) -> Vec<CollectionSnapshot> {
        if state.unreadable_keys.is_empty() {
            return Vec::new();
        }
        let mut recovered = Vec::new();
        if self.recover::<Task>(state) {
            recovered.push(CollectionSnapshot::Tasks(state.data.tasks.clone()));
        }
        if self.recover::<MoodEntry>(state) {
            recovered.push(CollectionSnapshot::Moods(state.data.moods.clone()));
        }
        if self.recover::<Transaction>(state) {
            recovered.push(CollectionSnapshot::Transactions(
                state.data.transactions.clone(),
            ));
        }
        self.recover_profile(state);
        recovered
    }

    fn recover<R: Record>(&self, state: &mut StoreState) -> bool {
        let key = storage_key(&state.namespace, R::COLLECTION.as_str());
        if !state.unreadable_keys.contains(&key) {
            return false;
        }
        match read_collection::<R>(self.backend.as_ref(), &key, &state.namespace) {
            Ok(stored) => {
                let slot = R::slot_mut(&mut state.data);
                let pending = std::mem::take(slot);
                *slot = merge_by_id(stored, pending);
                let records = slot.clone();
                state.unreadable_keys.remove(&key);
                tracing::info!(key = %key, records = records.len(), "Recovered stored collection");
                self.persist(state, key, &records);
                true
            }
            Err(e) => {
                tracing::debug!(key = %key, error = %e, "Stored collection still unreadable");
                false
            }
        }
    }

    fn recover_profile(&self, state: &mut StoreState) {
        let key = storage_key(&state.namespace, PROFILE_KEY);
        if !state.unreadable_keys.contains(&key) {
            return;
        }
        match read_profile(self.backend.as_ref(), &key) {
            Ok(stored) => {
                state.profile.merge(stored);
                state.unreadable_keys.remove(&key);
                tracing::info!(key = %key, "Recovered stored profile");
                self.persist_profile(state, key);
            }
            Err(e) => {
                tracing::debug!(key = %key, error = %e, "Stored profile still unreadable");
            }
        }
    }

    fn persist_profile(&self, state: &mut StoreState, key: String) {
        if state.unreadable_keys.contains(&key) {
            tracing::warn!(key = %key, "Stored profile unreadable; keeping change in memory");
            return;
        }
        match serde_json::to_string(&state.profile) {
            Ok(json) => self.write(state, key, Some(&json)),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize profile");
                state.stale_keys.insert(key);
            }
        }
    }

    fn notify(&self, snapshot: &CollectionSnapshot) {
        let collection = snapshot.collection();
        let callbacks: Vec<Subscriber> = self
            .subscribers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|s| s.collections.contains(&collection))
            .map(|s| Arc::clone(&s.callback))
            .collect();

        tracing::trace!(
            %collection,
            records = snapshot.len(),
            subscribers = callbacks.len(),
            "Notifying subscribers"
        );

        for callback in callbacks {
            callback(snapshot);
        }
    }
}

fn storage_key(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace, name)
}

fn check_record<R: Record>(record: &R, owner: &str) -> Result<()> {
    record.validate().map_err(|reason| Error::InvalidRecord {
        collection: R::COLLECTION.to_string(),
        reason,
    })?;
    if record.owner() != owner {
        return Err(Error::InvalidRecord {
            collection: R::COLLECTION.to_string(),
            reason: format!(
                "record {} belongs to {}, not {}",
                record.id(),
                record.owner(),
                owner
            ),
        });
    }
    Ok(())
}

fn all_snapshots(data: &Collections) -> Vec<CollectionSnapshot> {
    vec![
        CollectionSnapshot::Tasks(data.tasks.clone()),
        CollectionSnapshot::Moods(data.moods.clone()),
        CollectionSnapshot::Transactions(data.transactions.clone()),
    ]
}

/// Overlay `incoming` on `existing` by id.
///
/// Existing order is kept; matching ids are overwritten in place and new
/// ids are appended in order. Repeated ids collapse to their last copy.
pub fn merge_by_id<R: Record>(existing: Vec<R>, incoming: Vec<R>) -> Vec<R> {
    let mut index: HashMap<String, usize> = HashMap::with_capacity(existing.len());
    let mut merged: Vec<R> = Vec::with_capacity(existing.len() + incoming.len());
    for record in existing.into_iter().chain(incoming) {
        match index.get(record.id()) {
            Some(&i) => merged[i] = record,
            None => {
                index.insert(record.id().to_string(), merged.len());
                merged.push(record);
            }
        }
    }
    merged
}

fn load_into(backend: &dyn Backend, state: &mut StoreState) {
    let namespace = state.namespace.clone();
    state.data.tasks = load_collection(backend, &namespace, &mut state.unreadable_keys);
    state.data.moods = load_collection(backend, &namespace, &mut state.unreadable_keys);
    state.data.transactions = load_collection(backend, &namespace, &mut state.unreadable_keys);

    let key = storage_key(&namespace, PROFILE_KEY);
    state.profile = read_profile(backend, &key).unwrap_or_else(|e| {
        tracing::warn!(key = %key, error = %e, "Failed to load profile");
        state.unreadable_keys.insert(key);
        Profile::default()
    });

    tracing::debug!(
        namespace = %namespace,
        tasks = state.data.tasks.len(),
        moods = state.data.moods.len(),
        transactions = state.data.transactions.len(),
        unreadable = state.unreadable_keys.len(),
        "Loaded collections"
    );
}

fn load_collection<R: Record>(
    backend: &dyn Backend,
    namespace: &str,
    unreadable_keys: &mut HashSet<String>,
) -> Vec<R> {
    let key = storage_key(namespace, R::COLLECTION.as_str());
    read_collection(backend, &key, namespace).unwrap_or_else(|e| {
        tracing::warn!(key = %key, error = %e, "Failed to load collection");
        unreadable_keys.insert(key);
        Vec::new()
    })
}

/// Read one stored collection, skipping entries that fail to parse, fail
/// validation, or belong to another user.
///
/// Errors when the backend fails or the document is not a JSON array.
fn read_collection<R: Record>(backend: &dyn Backend, key: &str, namespace: &str) -> Result<Vec<R>> {
    let Some(raw) = backend.get(key)? else {
        return Ok(Vec::new());
    };
    let values: Vec<serde_json::Value> = serde_json::from_str(&raw)?;
    Ok(merge_by_id(Vec::new(), parse_records(values, Some(namespace))))
}

fn read_profile(backend: &dyn Backend, key: &str) -> Result<Profile> {
    match backend.get(key)? {
        Some(json) => Ok(serde_json::from_str(&json)?),
        None => Ok(Profile::default()),
    }
}

/// Parse raw JSON values into records, excluding malformed ones.
///
/// With `owner` set, records owned by anyone else are excluded too.
pub fn parse_records<R: Record>(
    values: Vec<serde_json::Value>,
    owner: Option<&str>,
) -> Vec<R> {
    let total = values.len();
    let records: Vec<R> = values
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<R>(value) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::debug!(collection = %R::COLLECTION, error = %e, "Skipping unparseable record");
                None
            }
        })
        .filter(|record| match record.validate() {
            Ok(()) => true,
            Err(reason) => {
                tracing::debug!(collection = %R::COLLECTION, %reason, "Skipping invalid record");
                false
            }
        })
        .filter(|record| owner.map_or(true, |o| record.owner() == o))
        .collect();

    if records.len() != total {
        tracing::info!(
            collection = %R::COLLECTION,
            kept = records.len(),
            skipped = total - records.len(),
            "Excluded malformed or foreign records"
        );
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Category, Mood, Task, Transaction};
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Backend whose writes always fail.
    struct BrokenBackend;

    impl Backend for BrokenBackend {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Ok(None)
        }

        fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Err(Error::Backend("disk full".to_string()))
        }

        fn remove(&self, _key: &str) -> Result<()> {
            Err(Error::Backend("disk full".to_string()))
        }

        fn name(&self) -> &'static str {
            "broken"
        }
    }

    /// Memory backend whose reads can be switched off.
    #[derive(Default)]
    struct FlakyBackend {
        inner: MemoryBackend,
        fail_reads: AtomicBool,
    }

    impl FlakyBackend {
        fn stored_len(&self, key: &str) -> usize {
            let raw = self.inner.get(key).unwrap().unwrap_or_else(|| "[]".to_string());
            serde_json::from_str::<Vec<serde_json::Value>>(&raw)
                .unwrap()
                .len()
        }
    }

    impl Backend for FlakyBackend {
        fn get(&self, key: &str) -> Result<Option<String>> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(Error::Backend("read timed out".to_string()));
            }
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<()> {
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<()> {
            self.inner.remove(key)
        }

        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    /// Identity that can change after the store is opened.
    struct SwitchableIdentity(Mutex<String>);

    impl SwitchableIdentity {
        fn new(user: &str) -> Self {
            Self(Mutex::new(user.to_string()))
        }

        fn switch_to(&self, user: &str) {
            *self.0.lock().unwrap() = user.to_string();
        }
    }

    impl IdentityProvider for SwitchableIdentity {
        fn current_user_id(&self) -> Option<String> {
            Some(self.0.lock().unwrap().clone())
        }
    }

    fn store_for(user: &str, backend: Arc<dyn Backend>) -> EventStore {
        EventStore::open(backend, Arc::new(StaticIdentity::user(user)))
    }

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_append_then_read_observes_write() {
        let store = store_for("ada", Arc::new(MemoryBackend::new()));
        let task = Task::new("ada", "stretch", now());
        store.append(task.clone()).unwrap();

        let tasks = store.get_all::<Task>().unwrap();
        assert_eq!(tasks, vec![task]);
        assert!(!store.is_stale());
    }

    #[test]
    fn test_persists_across_reopen() {
        let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
        {
            let store = store_for("ada", Arc::clone(&backend));
            store
                .append(Task::new("ada", "read", now()))
                .unwrap();
            store
                .update_profile(|p| p.theme_toggles = 2)
                .unwrap();
        }

        let store = store_for("ada", Arc::clone(&backend));
        assert_eq!(store.get_all::<Task>().unwrap().len(), 1);
        assert_eq!(store.profile().unwrap().theme_toggles, 2);

        // Another user sees nothing
        let other = store_for("bob", backend);
        assert!(other.get_all::<Task>().unwrap().is_empty());
    }

    #[test]
    fn test_update_and_remove() {
        let store = store_for("ada", Arc::new(MemoryBackend::new()));
        let task = Task::new("ada", "draft", now());
        let id = task.id.clone();
        store.append(task).unwrap();

        let done = store
            .modify::<Task>(&id, |t| t.complete(now()))
            .unwrap();
        assert!(done.completed);
        assert!(store.find::<Task>(&id).unwrap().unwrap().completed);

        assert!(store.remove_by_id::<Task>(&id).unwrap());
        assert!(!store.remove_by_id::<Task>(&id).unwrap());
        assert!(!store.update(Task::new("ada", "ghost", now())).unwrap());
        assert!(matches!(
            store.modify::<Task>("missing", |_| {}),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_rejects_invalid_and_foreign_records() {
        let store = store_for("ada", Arc::new(MemoryBackend::new()));

        let mut broken = Task::new("ada", "broken", now());
        broken.completed = true;
        assert!(matches!(
            store.append(broken),
            Err(Error::InvalidRecord { .. })
        ));

        let foreign = Task::new("bob", "not mine", now());
        assert!(store.append(foreign).is_err());
        assert!(store.get_all::<Task>().unwrap().is_empty());
    }

    #[test]
    fn test_subscribers_notified_synchronously_per_collection() {
        let store = store_for("ada", Arc::new(MemoryBackend::new()));
        let task_events = Arc::new(AtomicUsize::new(0));
        let last_len = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&task_events);
        let len = Arc::clone(&last_len);
        let id = store.subscribe(&[Collection::Tasks], move |snapshot| {
            assert_eq!(snapshot.collection(), Collection::Tasks);
            counter.fetch_add(1, Ordering::SeqCst);
            len.store(snapshot.len(), Ordering::SeqCst);
        });

        store.append(Task::new("ada", "one", now())).unwrap();
        store.append(Task::new("ada", "two", now())).unwrap();
        assert_eq!(task_events.load(Ordering::SeqCst), 2);
        assert_eq!(last_len.load(Ordering::SeqCst), 2);

        // Other collections do not reach this subscriber
        let date = now().date_naive();
        store
            .append(MoodEntry::new("ada", date, Mood::Good, now()))
            .unwrap();
        assert_eq!(task_events.load(Ordering::SeqCst), 2);

        assert!(store.unsubscribe(id));
        store.append(Task::new("ada", "three", now())).unwrap();
        assert_eq!(task_events.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_subscriber_can_read_store() {
        let store = Arc::new(store_for("ada", Arc::new(MemoryBackend::new())));
        let seen = Arc::new(AtomicUsize::new(0));

        let reader = Arc::downgrade(&store);
        let seen_in_cb = Arc::clone(&seen);
        store.subscribe(&[Collection::Transactions], move |_| {
            if let Some(store) = reader.upgrade() {
                let count = store.get_all::<Transaction>().unwrap().len();
                seen_in_cb.store(count, Ordering::SeqCst);
            }
        });

        let date = now().date_naive();
        store
            .append(Transaction::new("ada", Category::Food, 9.5, date, now()))
            .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backend_failure_marks_stale_but_keeps_data() {
        let store = store_for("ada", Arc::new(BrokenBackend));
        store.append(Task::new("ada", "offline", now())).unwrap();

        assert!(store.is_stale());
        assert_eq!(store.get_all::<Task>().unwrap().len(), 1);
    }

    #[test]
    fn test_malformed_stored_records_are_skipped() {
        let backend = Arc::new(MemoryBackend::new());
        let good = Task::new("ada", "good", now());
        let foreign = Task::new("bob", "someone else's", now());
        let raw = serde_json::json!([
            good.clone(),
            {"id": "no-created-at", "owner": "ada", "title": "x"},
            {"id": "done-without-time", "owner": "ada", "title": "y",
             "created_at": "2024-05-01T09:00:00Z", "completed": true},
            foreign,
        ]);
        backend.set("ada/tasks", &raw.to_string()).unwrap();

        let store = store_for("ada", backend);
        assert_eq!(store.get_all::<Task>().unwrap(), vec![good]);
        assert!(!store.is_stale());
    }

    #[test]
    fn test_unreadable_document_is_never_overwritten() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set("ada/moods", "not json").unwrap();

        let store = store_for("ada", backend.clone());
        assert!(store.get_all::<MoodEntry>().unwrap().is_empty());
        assert!(store.is_stale());

        let date = now().date_naive();
        store
            .append(MoodEntry::new("ada", date, Mood::Good, now()))
            .unwrap();
        assert_eq!(store.get_all::<MoodEntry>().unwrap().len(), 1);
        assert!(store.is_stale());
        assert_eq!(backend.get("ada/moods").unwrap().as_deref(), Some("not json"));
    }

    #[test]
    fn test_load_failure_then_write_keeps_stored_records() {
        let backend = Arc::new(FlakyBackend::default());
        {
            let store = store_for("ada", backend.clone());
            for i in 0..5 {
                store
                    .append(Task::new("ada", &format!("task {}", i), now()))
                    .unwrap();
            }
        }

        backend.fail_reads.store(true, Ordering::SeqCst);
        let store = store_for("ada", backend.clone());
        assert!(store.is_stale());
        assert!(store.get_all::<Task>().unwrap().is_empty());

        // Still unreadable: the change stays in memory only
        store.append(Task::new("ada", "offline", now())).unwrap();
        assert!(store.is_stale());
        assert_eq!(backend.stored_len("ada/tasks"), 5);

        // Readable again: stored records are folded under the pending ones
        backend.fail_reads.store(false, Ordering::SeqCst);
        store.append(Task::new("ada", "online", now())).unwrap();
        assert_eq!(store.get_all::<Task>().unwrap().len(), 7);
        assert_eq!(backend.stored_len("ada/tasks"), 7);
        assert!(!store.is_stale());

        let reopened = store_for("ada", backend);
        assert_eq!(reopened.get_all::<Task>().unwrap().len(), 7);
    }

    #[test]
    fn test_unreadable_profile_is_merged_on_recovery() {
        let backend = Arc::new(FlakyBackend::default());
        store_for("ada", backend.clone())
            .update_profile(|p| {
                p.theme_toggles = 4;
                p.longest_streak = 9;
            })
            .unwrap();

        backend.fail_reads.store(true, Ordering::SeqCst);
        let store = store_for("ada", backend.clone());
        assert_eq!(store.profile().unwrap().theme_toggles, 0);

        backend.fail_reads.store(false, Ordering::SeqCst);
        let profile = store.update_profile(|p| p.theme_toggles += 1).unwrap();
        assert_eq!(profile.theme_toggles, 5);
        assert_eq!(profile.longest_streak, 9);
        assert!(!store.is_stale());
    }

    #[test]
    fn test_reload_after_backend_recovers() {
        let backend = Arc::new(FlakyBackend::default());
        store_for("ada", backend.clone())
            .append(Task::new("ada", "kept", now()))
            .unwrap();

        backend.fail_reads.store(true, Ordering::SeqCst);
        let store = store_for("ada", backend.clone());
        assert!(store.is_stale());

        backend.fail_reads.store(false, Ordering::SeqCst);
        store.reload().unwrap();
        assert!(!store.is_stale());
        assert_eq!(store.get_all::<Task>().unwrap().len(), 1);
    }

    #[test]
    fn test_reload_follows_identity_change() {
        let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
        let identity = Arc::new(SwitchableIdentity::new("ada"));
        let store = EventStore::open(Arc::clone(&backend), identity.clone());
        store.append(Task::new("ada", "mine", now())).unwrap();

        let notified = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&notified);
        store.subscribe(&Collection::ALL, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        identity.switch_to("bob");
        store.reload().unwrap();
        assert_eq!(store.owner(), "bob");
        assert!(store.get_all::<Task>().unwrap().is_empty());
        assert_eq!(notified.load(Ordering::SeqCst), 3);

        identity.switch_to("ada");
        store.reload().unwrap();
        assert_eq!(store.get_all::<Task>().unwrap().len(), 1);
    }

    #[test]
    fn test_concurrent_modify_loses_no_update() {
        let store = Arc::new(store_for("ada", Arc::new(MemoryBackend::new())));
        let entry = MoodEntry::new("ada", now().date_naive(), Mood::Okay, now());
        let id = entry.id.clone();
        store.append(entry).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let store = Arc::clone(&store);
                let id = id.clone();
                std::thread::spawn(move || {
                    for i in 0..250 {
                        store
                            .modify::<MoodEntry>(&id, |e| e.tags.push(format!("{}-{}", worker, i)))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let entry = store.find::<MoodEntry>(&id).unwrap().unwrap();
        assert_eq!(entry.tags.len(), 1000);
    }

    #[test]
    fn test_concurrent_profile_updates_loses_no_increment() {
        let store = Arc::new(store_for("ada", Arc::new(MemoryBackend::new())));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        store.update_profile(|p| p.theme_toggles += 1).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.profile().unwrap().theme_toggles, 400);
    }

    #[test]
    fn test_duplicate_ids_rejected_and_collapsed() {
        let store = store_for("ada", Arc::new(MemoryBackend::new()));
        let task = Task::new("ada", "once", now());
        store.append(task.clone()).unwrap();
        assert!(matches!(
            store.append(task.clone()),
            Err(Error::InvalidRecord { .. })
        ));

        let mut renamed = task.clone();
        renamed.title = "twice".to_string();
        store.replace_all(vec![task, renamed]).unwrap();
        let tasks = store.get_all::<Task>().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "twice");
    }

    #[test]
    fn test_modify_cannot_change_id() {
        let store = store_for("ada", Arc::new(MemoryBackend::new()));
        let task = Task::new("ada", "fixed", now());
        let id = task.id.clone();
        store.append(task).unwrap();

        let err = store
            .modify::<Task>(&id, |t| t.id = "other".to_string())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRecord { .. }));
        assert!(store.find::<Task>(&id).unwrap().is_some());
    }

    #[test]
    fn test_emptied_collection_removes_key() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_for("ada", backend.clone());
        let task = Task::new("ada", "short-lived", now());
        let id = task.id.clone();
        store.append(task).unwrap();
        assert!(backend.get("ada/tasks").unwrap().is_some());

        store.remove_by_id::<Task>(&id).unwrap();
        assert!(backend.get("ada/tasks").unwrap().is_none());
    }

    #[test]
    fn test_replace_all_drops_invalid_records() {
        let store = store_for("ada", Arc::new(MemoryBackend::new()));
        let date = now().date_naive();
        let mut negative = Transaction::new("ada", Category::Food, 3.0, date, now());
        negative.amount = -3.0;

        store
            .replace_all(vec![
                Transaction::new("ada", Category::Income, 100.0, date, now()),
                negative,
            ])
            .unwrap();
        assert_eq!(store.get_all::<Transaction>().unwrap().len(), 1);
    }

    #[test]
    fn test_mood_for_date() {
        let store = store_for("ada", Arc::new(MemoryBackend::new()));
        let date = now().date_naive();
        assert!(store.mood_for_date(date).unwrap().is_none());

        let entry = MoodEntry::new("ada", date, Mood::Okay, now());
        store.append(entry.clone()).unwrap();
        assert_eq!(store.mood_for_date(date).unwrap(), Some(entry));
    }

    #[test]
    fn test_guest_namespace() {
        let backend = Arc::new(MemoryBackend::new());
        let store = EventStore::open(backend.clone(), Arc::new(StaticIdentity::guest()));
        assert_eq!(store.owner(), GUEST_NAMESPACE);

        store
            .append(Task::new(GUEST_NAMESPACE, "anon", now()))
            .unwrap();
        assert!(backend.get("guest/tasks").unwrap().is_some());
    }
}
