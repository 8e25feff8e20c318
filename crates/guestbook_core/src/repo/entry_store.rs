//! In-memory ordered entry registry.
//!
//! # Responsibility
//! - Hold the client-visible entry sequence, most recent first.
//! - Expose pure, synchronous mutations used by the lifecycle manager.
//!
//! # Invariants
//! - Exactly one entry per `LocalId`.
//! - Sequence order is `created_at DESC`, ties broken by insertion ordinal
//!   (most recent insert first).
//! - `replace_all` never drops an unconfirmed entry the caller did not
//!   explicitly remove first.

use crate::model::entry::{Entry, LocalId, RemoteId};
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StoreResult<T> = Result<T, EntryStoreError>;

/// Structural errors raised by the entry registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryStoreError {
    DuplicateLocalId(LocalId),
    NotFound(LocalId),
}

impl Display for EntryStoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateLocalId(id) => write!(f, "entry local id already present: {id}"),
            Self::NotFound(id) => write!(f, "entry not found: {id}"),
        }
    }
}

impl Error for EntryStoreError {}

#[derive(Debug, Clone)]
struct Slot {
    entry: Entry,
    ordinal: u64,
}

/// Ordered registry of entries.
#[derive(Debug, Default)]
pub struct EntryStore {
    slots: Vec<Slot>,
    next_ordinal: u64,
}

impl EntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, local_id: LocalId) -> bool {
        self.position(local_id).is_some()
    }

    /// Inserts one optimistic entry at its ordered position.
    ///
    /// # Errors
    /// - `DuplicateLocalId` when `entry.local_id` is already present.
    pub fn insert_optimistic(&mut self, entry: Entry) -> StoreResult<()> {
        if self.contains(entry.local_id) {
            return Err(EntryStoreError::DuplicateLocalId(entry.local_id));
        }

        let ordinal = self.take_ordinal();
        self.slots.push(Slot { entry, ordinal });
        self.sort();
        Ok(())
    }

    /// Atomically replaces the visible sequence with an authoritative one.
    ///
    /// Entries already known keep their insertion ordinal. Unconfirmed
    /// entries absent from `authoritative` are carried over unchanged.
    ///
    /// # Errors
    /// - `DuplicateLocalId` when `authoritative` repeats a local id. The
    ///   registry is left untouched in that case.
    pub fn replace_all(&mut self, authoritative: Vec<Entry>) -> StoreResult<()> {
        let mut seen = HashSet::with_capacity(authoritative.len());
        for entry in &authoritative {
            if !seen.insert(entry.local_id) {
                return Err(EntryStoreError::DuplicateLocalId(entry.local_id));
            }
        }

        let known: HashMap<LocalId, u64> = self
            .slots
            .iter()
            .map(|slot| (slot.entry.local_id, slot.ordinal))
            .collect();

        // Fresh ordinals are handed out back to front so earlier items in the
        // authoritative list win ties.
        let mut fresh = Vec::with_capacity(authoritative.len());
        for entry in authoritative.into_iter().rev() {
            let ordinal = match known.get(&entry.local_id) {
                Some(ordinal) => *ordinal,
                None => self.take_ordinal(),
            };
            fresh.push(Slot { entry, ordinal });
        }

        let retained = self
            .slots
            .drain(..)
            .filter(|slot| slot.entry.state.is_unconfirmed() && !seen.contains(&slot.entry.local_id));
        fresh.extend(retained);

        self.slots = fresh;
        self.sort();
        Ok(())
    }

    /// Removes one entry and returns it.
    ///
    /// # Errors
    /// - `NotFound` when the id is absent. Removal is not idempotent.
    pub fn remove(&mut self, local_id: LocalId) -> StoreResult<Entry> {
        let index = self
            .position(local_id)
            .ok_or(EntryStoreError::NotFound(local_id))?;
        Ok(self.slots.remove(index).entry)
    }

    /// Returns one entry by local id.
    pub fn get(&self, local_id: LocalId) -> StoreResult<&Entry> {
        self.slots
            .iter()
            .find(|slot| slot.entry.local_id == local_id)
            .map(|slot| &slot.entry)
            .ok_or(EntryStoreError::NotFound(local_id))
    }

    /// Returns the entry currently bound to a store-assigned id.
    pub fn find_by_remote_id(&self, remote_id: &RemoteId) -> Option<&Entry> {
        self.slots
            .iter()
            .map(|slot| &slot.entry)
            .find(|entry| entry.remote_id.as_ref() == Some(remote_id))
    }

    /// Marks one entry as errored after a failed remote insert.
    pub fn mark_errored(&mut self, local_id: LocalId, message: impl Into<String>) -> StoreResult<()> {
        self.slot_mut(local_id)?.entry.mark_errored(message);
        Ok(())
    }

    /// Returns one errored entry to pending.
    pub fn mark_pending(&mut self, local_id: LocalId) -> StoreResult<()> {
        self.slot_mut(local_id)?.entry.mark_pending();
        Ok(())
    }

    /// Returns an ordered read-only copy for presentation.
    pub fn snapshot(&self) -> Vec<Entry> {
        self.slots.iter().map(|slot| slot.entry.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.slots.iter().map(|slot| &slot.entry)
    }

    fn position(&self, local_id: LocalId) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.entry.local_id == local_id)
    }

    fn slot_mut(&mut self, local_id: LocalId) -> StoreResult<&mut Slot> {
        self.slots
            .iter_mut()
            .find(|slot| slot.entry.local_id == local_id)
            .ok_or(EntryStoreError::NotFound(local_id))
    }

    fn take_ordinal(&mut self) -> u64 {
        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        ordinal
    }

    fn sort(&mut self) {
        self.slots.sort_by(|a, b| {
            b.entry
                .created_at
                .cmp(&a.entry.created_at)
                .then_with(|| b.ordinal.cmp(&a.ordinal))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::{EntryStore, EntryStoreError};
    use crate::model::entry::{new_local_id, Entry, EntryDraft, EntryState, RemoteId};

    fn pending(author: &str, at: i64) -> Entry {
        let draft = EntryDraft::new(author, "body", "secret").unwrap();
        Entry::pending(new_local_id(), draft, at)
    }

    fn confirmed(remote: &str, at: i64) -> Entry {
        Entry::confirmed(new_local_id(), RemoteId::new(remote), "a", "b", "s", at)
    }

    fn authors(store: &EntryStore) -> Vec<String> {
        store.iter().map(|entry| entry.author.clone()).collect()
    }

    #[test]
    fn optimistic_inserts_with_equal_timestamps_put_latest_first() {
        let mut store = EntryStore::new();
        store.insert_optimistic(pending("Ann", 100)).unwrap();
        store.insert_optimistic(pending("Bo", 100)).unwrap();
        assert_eq!(authors(&store), vec!["Bo", "Ann"]);
    }

    #[test]
    fn insert_rejects_duplicate_local_id() {
        let mut store = EntryStore::new();
        let entry = pending("Ann", 1);
        let id = entry.local_id;
        store.insert_optimistic(entry.clone()).unwrap();
        let err = store.insert_optimistic(entry).unwrap_err();
        assert_eq!(err, EntryStoreError::DuplicateLocalId(id));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remove_is_not_idempotent() {
        let mut store = EntryStore::new();
        let entry = pending("Ann", 1);
        let id = entry.local_id;
        store.insert_optimistic(entry).unwrap();
        assert_eq!(store.remove(id).unwrap().local_id, id);
        assert_eq!(store.remove(id).unwrap_err(), EntryStoreError::NotFound(id));
        assert!(matches!(store.get(id), Err(EntryStoreError::NotFound(_))));
    }

    #[test]
    fn replace_all_retains_unconfirmed_and_drops_missing_confirmed() {
        let mut store = EntryStore::new();
        let stale = confirmed("r-old", 50);
        let waiting = pending("Ann", 300);
        let mut failed = pending("Bo", 10);
        failed.mark_errored("store unavailable");
        let waiting_id = waiting.local_id;
        let failed_id = failed.local_id;
        store.insert_optimistic(stale).unwrap();
        store.insert_optimistic(waiting).unwrap();
        store.insert_optimistic(failed).unwrap();

        store
            .replace_all(vec![confirmed("r2", 200), confirmed("r1", 100)])
            .unwrap();

        let snapshot = store.snapshot();
        let created: Vec<i64> = snapshot.iter().map(|entry| entry.created_at).collect();
        assert_eq!(created, vec![300, 200, 100, 10]);
        assert_eq!(snapshot[0].local_id, waiting_id);
        assert_eq!(snapshot[3].local_id, failed_id);
        assert_eq!(snapshot[3].state, EntryState::Errored);
        assert!(store.find_by_remote_id(&RemoteId::new("r-old")).is_none());
    }

    #[test]
    fn replace_all_keeps_authoritative_order_on_ties() {
        let mut store = EntryStore::new();
        store
            .replace_all(vec![confirmed("r2", 100), confirmed("r1", 100)])
            .unwrap();
        let remote: Vec<String> = store
            .iter()
            .map(|entry| entry.remote_id.clone().unwrap().to_string())
            .collect();
        assert_eq!(remote, vec!["r2", "r1"]);
    }

    #[test]
    fn replace_all_rejects_duplicates_without_mutation() {
        let mut store = EntryStore::new();
        store.insert_optimistic(pending("Ann", 1)).unwrap();
        let dup = confirmed("r1", 5);
        let err = store.replace_all(vec![dup.clone(), dup.clone()]).unwrap_err();
        assert_eq!(err, EntryStoreError::DuplicateLocalId(dup.local_id));
        assert_eq!(authors(&store), vec!["Ann"]);
    }
}
