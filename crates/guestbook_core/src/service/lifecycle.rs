//! Entry lifecycle use-case service.
//!
//! # Responsibility
//! - Apply optimistic inserts and reconcile them against the remote log.
//! - Gate retraction behind the entry's shared secret.
//! - Publish a fresh snapshot to subscribers after every mutation.
//!
//! # Invariants
//! - No lock is held across a remote call.
//! - A wrong or missing secret never reaches `RemoteLogPort::delete`.
//! - A failed insert never removes the entry; it is marked `Errored`.
//! - Reconcile replies older than the last applied one are dropped.
//! - A record deleted through `retract` is ignored by reconcile replies until
//!   the store stops listing it.
//! - A listed record whose insert reply has not arrived yet confirms the
//!   oldest unbound pending entry with identical content.

use crate::config::LifecycleConfig;
use crate::model::entry::{
    new_local_id, Entry, EntryDraft, EntryState, EntryValidationError, LocalId, RemoteId,
};
use crate::remote::port::{NewRemoteRecord, RemoteError, RemoteLogPort, RemoteRecord};
use crate::repo::entry_store::{EntryStore, EntryStoreError};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Source of local submission instants (epoch milliseconds).
pub type LocalClock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Errors from `LifecycleManager::submit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    Validation(EntryValidationError),
    Store(EntryStoreError),
}

impl Display for SubmitError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SubmitError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Store(err) => Some(err),
        }
    }
}

impl From<EntryValidationError> for SubmitError {
    fn from(value: EntryValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<EntryStoreError> for SubmitError {
    fn from(value: EntryStoreError) -> Self {
        Self::Store(value)
    }
}

/// Errors from `LifecycleManager::retract`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetractError {
    NotFound(LocalId),
    /// Candidate secret was empty.
    MissingSecret,
    Authorization(LocalId),
    NotYetConfirmed(LocalId),
    Remote(RemoteError),
}

impl Display for RetractError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "entry not found: {id}"),
            Self::MissingSecret => write!(f, "secret is required to retract an entry"),
            Self::Authorization(id) => write!(f, "secret does not match entry {id}"),
            Self::NotYetConfirmed(id) => {
                write!(f, "entry {id} is not confirmed by the store yet")
            }
            Self::Remote(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RetractError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Remote(err) => Some(err),
            _ => None,
        }
    }
}

/// Errors from local-only actions (`retry`, `discard`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalActionError {
    NotFound(LocalId),
    InvalidState { local_id: LocalId, state: EntryState },
}

impl Display for LocalActionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "entry not found: {id}"),
            Self::InvalidState { local_id, state } => {
                write!(f, "entry {local_id} is {state}; action not allowed")
            }
        }
    }
}

impl Error for LocalActionError {}

/// Errors from `LifecycleManager::reconcile`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    Remote(RemoteError),
    Store(EntryStoreError),
}

impl Display for ReconcileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Remote(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ReconcileError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Remote(err) => Some(err),
            Self::Store(err) => Some(err),
        }
    }
}

impl From<RemoteError> for ReconcileError {
    fn from(value: RemoteError) -> Self {
        Self::Remote(value)
    }
}

impl From<EntryStoreError> for ReconcileError {
    fn from(value: EntryStoreError) -> Self {
        Self::Store(value)
    }
}

/// Counts describing one applied reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub seq: u64,
    pub confirmed: usize,
    pub removed: usize,
    pub retained_unconfirmed: usize,
}

/// Result of one reconcile call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Applied(ReconcileSummary),
    /// A newer reconcile was applied first; this reply was dropped.
    Stale { seq: u64, applied: u64 },
}

/// Final result of the background insert started by `submit` or `retry`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The store accepted the insert and the follow-up reconcile listed it.
    Confirmed { remote_id: RemoteId },
    /// The store accepted the insert but its list view has not caught up.
    AwaitingPropagation { remote_id: RemoteId },
    /// The insert failed; the entry is `Errored`.
    Failed(RemoteError),
}

/// Handle for an optimistic insert whose remote half is still running.
///
/// Dropping it detaches the background task; the insert still completes.
#[derive(Debug)]
pub struct Submission {
    local_id: LocalId,
    task: JoinHandle<SubmitOutcome>,
}

impl Submission {
    pub fn local_id(&self) -> LocalId {
        self.local_id
    }

    /// Waits for the remote insert (and its follow-up reconcile).
    pub async fn settled(self) -> SubmitOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(err) => SubmitOutcome::Failed(RemoteError::StoreUnavailable(format!(
                "submit task did not complete: {err}"
            ))),
        }
    }
}

struct ManagerState {
    store: EntryStore,
    /// Ids returned by `insert` whose local entry is still unconfirmed.
    bound_inserts: HashMap<RemoteId, LocalId>,
    issued_reconciles: u64,
    applied_reconcile: Option<u64>,
    /// Retracted ids, keyed to the last reconcile seq issued before the
    /// delete completed.
    delete_fences: HashMap<RemoteId, u64>,
}

struct Inner {
    remote: Arc<dyn RemoteLogPort>,
    runtime: Handle,
    config: LifecycleConfig,
    clock: LocalClock,
    state: Mutex<ManagerState>,
    snapshots: watch::Sender<Vec<Entry>>,
}

/// Builder for `LifecycleManager`.
pub struct LifecycleManagerBuilder {
    remote: Arc<dyn RemoteLogPort>,
    config: LifecycleConfig,
    clock: LocalClock,
}

impl LifecycleManagerBuilder {
    pub fn config(mut self, config: LifecycleConfig) -> Self {
        self.config = config;
        self
    }

    /// Overrides the source of local submission instants.
    pub fn clock(mut self, clock: LocalClock) -> Self {
        self.clock = clock;
        self
    }

    /// Builds the manager; background inserts are spawned on `runtime`.
    pub fn build(self, runtime: Handle) -> LifecycleManager {
        let (snapshots, _) = watch::channel(Vec::new());
        LifecycleManager {
            inner: Arc::new(Inner {
                remote: self.remote,
                runtime,
                config: self.config,
                clock: self.clock,
                state: Mutex::new(ManagerState {
                    store: EntryStore::new(),
                    bound_inserts: HashMap::new(),
                    issued_reconciles: 0,
                    applied_reconcile: None,
                    delete_fences: HashMap::new(),
                }),
                snapshots,
            }),
        }
    }
}

/// Orchestrates submit, reconcile and retract for one guestbook view.
///
/// Cloning is cheap and yields a handle to the same state.
#[derive(Clone)]
pub struct LifecycleManager {
    inner: Arc<Inner>,
}

impl LifecycleManager {
    /// Creates a manager with default config and the system clock.
    pub fn new(remote: Arc<dyn RemoteLogPort>, runtime: Handle) -> Self {
        Self::builder(remote).build(runtime)
    }

    pub fn builder(remote: Arc<dyn RemoteLogPort>) -> LifecycleManagerBuilder {
        LifecycleManagerBuilder {
            remote,
            config: LifecycleConfig::default(),
            clock: Arc::new(system_epoch_ms),
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.inner.config
    }

    /// Returns the current ordered entries.
    pub fn snapshot(&self) -> Vec<Entry> {
        self.inner.state.lock().store.snapshot()
    }

    /// Subscribes to snapshots published after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Entry>> {
        self.inner.snapshots.subscribe()
    }

    pub fn get(&self, local_id: LocalId) -> Result<Entry, EntryStoreError> {
        self.inner.state.lock().store.get(local_id).cloned()
    }

    pub fn find_by_remote_id(&self, remote_id: &RemoteId) -> Option<Entry> {
        self.inner
            .state
            .lock()
            .store
            .find_by_remote_id(remote_id)
            .cloned()
    }

    /// Validates input, inserts a pending entry, and starts the remote insert.
    ///
    /// Returns as soon as the optimistic entry is visible; the remote half
    /// runs on the manager's runtime.
    ///
    /// # Errors
    /// - `Validation` when any field is blank. Nothing is mutated.
    /// - `Store(DuplicateLocalId)` on an id generator collision.
    pub fn submit(
        &self,
        author: impl Into<String>,
        body: impl Into<String>,
        secret: impl Into<String>,
    ) -> Result<Submission, SubmitError> {
        let draft = match EntryDraft::new(author, body, secret) {
            Ok(draft) => draft,
            Err(err) => {
                info!(
                    "event=entry_submit module=lifecycle status=rejected reason={:?}",
                    err
                );
                return Err(err.into());
            }
        };

        let local_id = new_local_id();
        let entry = Entry::pending(local_id, draft, (self.inner.clock)());
        let record = NewRemoteRecord::from_entry(&entry);
        {
            let mut state = self.inner.state.lock();
            state.store.insert_optimistic(entry)?;
            self.publish(&state);
        }
        info!("event=entry_submit module=lifecycle status=pending local_id={local_id}");

        Ok(self.spawn_insert(local_id, record))
    }

    /// Re-issues the remote insert for an `Errored` entry.
    ///
    /// The entry keeps its local id, timestamp and secret.
    pub fn retry(&self, local_id: LocalId) -> Result<Submission, LocalActionError> {
        let record = {
            let mut state = self.inner.state.lock();
            let entry = state
                .store
                .get(local_id)
                .map_err(|_| LocalActionError::NotFound(local_id))?;
            if entry.state != EntryState::Errored {
                return Err(LocalActionError::InvalidState {
                    local_id,
                    state: entry.state,
                });
            }
            let record = NewRemoteRecord::from_entry(entry);
            state
                .store
                .mark_pending(local_id)
                .map_err(|_| LocalActionError::NotFound(local_id))?;
            self.publish(&state);
            record
        };
        info!("event=entry_retry module=lifecycle status=pending local_id={local_id}");

        Ok(self.spawn_insert(local_id, record))
    }

    /// Drops an unconfirmed entry locally without touching the store.
    pub fn discard(&self, local_id: LocalId) -> Result<Entry, LocalActionError> {
        let mut state = self.inner.state.lock();
        let current = state
            .store
            .get(local_id)
            .map_err(|_| LocalActionError::NotFound(local_id))?
            .state;
        if !current.is_unconfirmed() {
            return Err(LocalActionError::InvalidState {
                local_id,
                state: current,
            });
        }

        let entry = state
            .store
            .remove(local_id)
            .map_err(|_| LocalActionError::NotFound(local_id))?;
        state.bound_inserts.retain(|_, bound| *bound != local_id);
        self.publish(&state);
        drop(state);

        info!("event=entry_discard module=lifecycle status=ok local_id={local_id}");
        Ok(entry)
    }

    /// Merges the store's authoritative list into the local view.
    ///
    /// # Errors
    /// - `Remote` when listing fails; local state is untouched.
    /// - `Store` when the merged sequence would repeat a local id.
    pub async fn reconcile(&self) -> Result<ReconcileOutcome, ReconcileError> {
        let seq = {
            let mut state = self.inner.state.lock();
            state.issued_reconciles += 1;
            state.issued_reconciles
        };
        let started_at = Instant::now();
        debug!("event=reconcile module=lifecycle status=start seq={seq}");

        let records = match self.inner.remote.list_desc().await {
            Ok(records) => records,
            Err(err) => {
                warn!(
                    "event=reconcile module=lifecycle status=error seq={} error_code={} duration_ms={}",
                    seq,
                    err.code(),
                    started_at.elapsed().as_millis()
                );
                return Err(err.into());
            }
        };

        let mut state = self.inner.state.lock();
        if let Some(applied) = state.applied_reconcile {
            if applied > seq {
                info!(
                    "event=reconcile module=lifecycle status=stale seq={seq} applied_seq={applied}"
                );
                return Ok(ReconcileOutcome::Stale { seq, applied });
            }
        }

        let summary = merge_records(&mut state, seq, records)?;
        state.applied_reconcile = Some(seq);
        self.publish(&state);
        drop(state);

        info!(
            "event=reconcile module=lifecycle status=ok seq={} confirmed={} removed={} retained_unconfirmed={} duration_ms={}",
            seq,
            summary.confirmed,
            summary.removed,
            summary.retained_unconfirmed,
            started_at.elapsed().as_millis()
        );
        Ok(ReconcileOutcome::Applied(summary))
    }

    /// Deletes a confirmed entry after checking `candidate_secret`.
    ///
    /// Checks run in order: existence, non-empty candidate, exact secret
    /// match, confirmation. Only then is the store called.
    ///
    /// # Errors
    /// - `NotFound`, `MissingSecret`, `Authorization`, `NotYetConfirmed`
    ///   without any remote side effect.
    /// - `Remote` when the delete fails; the entry stays `Confirmed`.
    pub async fn retract(&self, local_id: LocalId, candidate_secret: &str) -> Result<(), RetractError> {
        let remote_id = {
            let state = self.inner.state.lock();
            let entry = state
                .store
                .get(local_id)
                .map_err(|_| RetractError::NotFound(local_id))?;
            if candidate_secret.is_empty() {
                return Err(RetractError::MissingSecret);
            }
            if !entry.secret_matches(candidate_secret) {
                info!("event=entry_retract module=lifecycle status=denied local_id={local_id}");
                return Err(RetractError::Authorization(local_id));
            }
            match (entry.state, entry.remote_id.as_ref()) {
                (EntryState::Confirmed, Some(remote_id)) => remote_id.clone(),
                _ => return Err(RetractError::NotYetConfirmed(local_id)),
            }
        };

        let started_at = Instant::now();
        if let Err(err) = self.inner.remote.delete(&remote_id).await {
            warn!(
                "event=entry_retract module=lifecycle status=error local_id={} remote_id={} error_code={} duration_ms={}",
                local_id,
                remote_id,
                err.code(),
                started_at.elapsed().as_millis()
            );
            return Err(RetractError::Remote(err));
        }

        let mut state = self.inner.state.lock();
        let fence = state.issued_reconciles;
        state.delete_fences.insert(remote_id.clone(), fence);
        if state.store.remove(local_id).is_err() {
            // A reconcile already dropped it while the delete was in flight.
            debug!("event=entry_retract module=lifecycle status=already_removed local_id={local_id}");
        }
        self.publish(&state);
        drop(state);

        info!(
            "event=entry_retract module=lifecycle status=ok local_id={} remote_id={} duration_ms={}",
            local_id,
            remote_id,
            started_at.elapsed().as_millis()
        );
        Ok(())
    }

    fn spawn_insert(&self, local_id: LocalId, record: NewRemoteRecord) -> Submission {
        let manager = self.clone();
        let task = self
            .inner
            .runtime
            .spawn(async move { manager.push_insert(local_id, record).await });
        Submission { local_id, task }
    }

    async fn push_insert(&self, local_id: LocalId, record: NewRemoteRecord) -> SubmitOutcome {
        let started_at = Instant::now();
        let remote_id = match self.inner.remote.insert(record).await {
            Ok(remote_id) => remote_id,
            Err(err) => {
                let mut state = self.inner.state.lock();
                match state.store.mark_errored(local_id, err.to_string()) {
                    Ok(()) => self.publish(&state),
                    Err(_) => debug!(
                        "event=entry_insert module=lifecycle status=orphaned local_id={local_id}"
                    ),
                }
                drop(state);
                warn!(
                    "event=entry_insert module=lifecycle status=error local_id={} error_code={} duration_ms={}",
                    local_id,
                    err.code(),
                    started_at.elapsed().as_millis()
                );
                return SubmitOutcome::Failed(err);
            }
        };

        {
            let mut state = self.inner.state.lock();
            let still_waiting = state
                .store
                .get(local_id)
                .map(|entry| entry.state.is_unconfirmed())
                .unwrap_or(false);
            if still_waiting {
                state.bound_inserts.insert(remote_id.clone(), local_id);
            } else if state.store.find_by_remote_id(&remote_id).is_some() {
                debug!(
                    "event=entry_insert module=lifecycle status=already_listed local_id={local_id} remote_id={remote_id}"
                );
            }
        }
        info!(
            "event=entry_insert module=lifecycle status=ok local_id={} remote_id={} duration_ms={}",
            local_id,
            remote_id,
            started_at.elapsed().as_millis()
        );

        if !self.inner.config.reconcile_after_submit {
            return SubmitOutcome::AwaitingPropagation { remote_id };
        }
        if let Err(err) = self.reconcile().await {
            warn!(
                "event=entry_insert module=lifecycle status=reconcile_failed local_id={local_id} error={err}"
            );
        }

        let listed = self
            .inner
            .state
            .lock()
            .store
            .find_by_remote_id(&remote_id)
            .is_some();
        if listed {
            SubmitOutcome::Confirmed { remote_id }
        } else {
            SubmitOutcome::AwaitingPropagation { remote_id }
        }
    }

    fn publish(&self, state: &ManagerState) {
        self.inner.snapshots.send_replace(state.store.snapshot());
    }
}

fn merge_records(
    state: &mut ManagerState,
    seq: u64,
    records: Vec<RemoteRecord>,
) -> Result<ReconcileSummary, EntryStoreError> {
    let listed_ids: HashSet<RemoteId> = records
        .iter()
        .map(|record| record.remote_id.clone())
        .collect();
    let previously_confirmed: Vec<LocalId> = state
        .store
        .iter()
        .filter(|entry| entry.state == EntryState::Confirmed)
        .map(|entry| entry.local_id)
        .collect();

    let mut merged_ids = HashSet::with_capacity(records.len());
    let mut superseded = Vec::new();
    let mut resolved: Vec<(RemoteRecord, Option<LocalId>)> = Vec::with_capacity(records.len());
    for record in records {
        if state.delete_fences.contains_key(&record.remote_id) {
            continue;
        }
        if !merged_ids.insert(record.remote_id.clone()) {
            continue;
        }

        let existing = state
            .store
            .find_by_remote_id(&record.remote_id)
            .map(|entry| entry.local_id);
        let bound = state
            .bound_inserts
            .get(&record.remote_id)
            .copied()
            .filter(|local_id| state.store.contains(*local_id));
        let local_id = match (existing, bound) {
            (Some(existing), Some(pending)) if existing != pending => {
                superseded.push(pending);
                Some(existing)
            }
            (Some(existing), _) => Some(existing),
            (None, Some(pending)) => Some(pending),
            (None, None) => None,
        };
        resolved.push((record, local_id));
    }

    // A record can be listed before its insert reply arrives. Pair such
    // records with unbound pending entries of identical content, oldest
    // record first, so the pending entry is confirmed in place.
    let mut claimed: HashSet<LocalId> = state.bound_inserts.values().copied().collect();
    claimed.extend(resolved.iter().filter_map(|(_, local_id)| *local_id));
    for (record, local_id) in resolved.iter_mut().rev() {
        if local_id.is_some() {
            continue;
        }
        if let Some(twin) = oldest_pending_twin(&state.store, record, &claimed) {
            claimed.insert(twin);
            *local_id = Some(twin);
        }
    }

    let authoritative: Vec<Entry> = resolved
        .into_iter()
        .map(|(record, local_id)| {
            Entry::confirmed(
                local_id.unwrap_or_else(new_local_id),
                record.remote_id,
                record.author,
                record.body,
                record.secret,
                record.created_at,
            )
        })
        .collect();

    let kept: HashSet<LocalId> = authoritative.iter().map(|entry| entry.local_id).collect();
    for local_id in &superseded {
        if state.store.contains(*local_id) {
            state.store.remove(*local_id)?;
        }
    }
    state.store.replace_all(authoritative)?;

    let ManagerState {
        store,
        bound_inserts,
        ..
    } = &mut *state;
    bound_inserts.retain(|remote_id, local_id| {
        !merged_ids.contains(remote_id) && store.contains(*local_id)
    });
    state
        .delete_fences
        .retain(|remote_id, fence| *fence >= seq || listed_ids.contains(remote_id));

    let removed = previously_confirmed
        .iter()
        .filter(|local_id| !kept.contains(local_id))
        .count()
        + superseded.len();
    let retained_unconfirmed = state
        .store
        .iter()
        .filter(|entry| entry.state.is_unconfirmed())
        .count();

    Ok(ReconcileSummary {
        seq,
        confirmed: kept.len(),
        removed,
        retained_unconfirmed,
    })
}

/// Oldest pending entry with no remote id whose content equals `record`.
fn oldest_pending_twin(
    store: &EntryStore,
    record: &RemoteRecord,
    claimed: &HashSet<LocalId>,
) -> Option<LocalId> {
    // Iteration is newest first, so the last match is the oldest.
    store
        .iter()
        .filter(|entry| {
            entry.state == EntryState::Pending
                && entry.remote_id.is_none()
                && !claimed.contains(&entry.local_id)
                && entry.author == record.author
                && entry.body == record.body
                && entry.secret_matches(&record.secret)
        })
        .last()
        .map(|entry| entry.local_id)
}

fn system_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as i64)
}
