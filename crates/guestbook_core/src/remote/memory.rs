//! In-memory remote log with fault and latency injection.
//!
//! # Responsibility
//! - Stand in for the authoritative store in tests and demos.
//! - Simulate eventual consistency (list lag), failures, and in-flight calls.
//!
//! # Invariants
//! - Ids are `r1`, `r2`, ... in insert order.
//! - `created_at` is strictly increasing across inserts and seeds.
//! - A paused list reply reflects the records visible when the call started.

use crate::model::entry::RemoteId;
use crate::remote::port::{NewRemoteRecord, RemoteError, RemoteLogPort, RemoteRecord, RemoteResult};
use log::debug;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

const DEFAULT_CLOCK_START_MS: i64 = 100;

#[derive(Debug)]
struct StoredRecord {
    record: RemoteRecord,
    hidden_lists: u32,
}

#[derive(Debug, Default)]
struct FaultQueues {
    insert: VecDeque<RemoteError>,
    list: VecDeque<RemoteError>,
    delete: VecDeque<RemoteError>,
}

#[derive(Debug)]
struct State {
    records: Vec<StoredRecord>,
    next_id: u64,
    next_created_at: i64,
    list_lag: u32,
    faults: FaultQueues,
}

#[derive(Debug, Default)]
struct Gates {
    insert: Option<Arc<Semaphore>>,
    insert_reply: Option<Arc<Semaphore>>,
    list: Option<Arc<Semaphore>>,
    delete: Option<Arc<Semaphore>>,
}

/// Parks remote calls until permits are released.
#[derive(Debug, Clone)]
pub struct Gate(Arc<Semaphore>);

impl Gate {
    fn closed() -> Self {
        Self(Arc::new(Semaphore::new(0)))
    }

    /// Lets `count` parked or future calls on this gate complete.
    pub fn release(&self, count: usize) {
        self.0.add_permits(count);
    }
}

/// Remote log double backed by a `Vec`.
#[derive(Debug)]
pub struct InMemoryRemoteLog {
    state: Mutex<State>,
    gates: Mutex<Gates>,
    insert_calls: AtomicUsize,
    list_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl Default for InMemoryRemoteLog {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRemoteLog {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                records: Vec::new(),
                next_id: 1,
                next_created_at: DEFAULT_CLOCK_START_MS,
                list_lag: 0,
                faults: FaultQueues::default(),
            }),
            gates: Mutex::new(Gates::default()),
            insert_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
        }
    }

    /// Sets the first `created_at` value handed out by the store clock.
    pub fn with_clock_start(self, start_ms: i64) -> Self {
        self.state.lock().next_created_at = start_ms;
        self
    }

    /// Hides each new insert from the next `lists` list calls.
    pub fn with_list_lag(self, lists: u32) -> Self {
        self.state.lock().list_lag = lists;
        self
    }

    /// Adds a visible record directly, bypassing `insert`.
    ///
    /// The store clock is advanced past `created_at`.
    pub fn seed(&self, record: RemoteRecord) {
        let mut state = self.state.lock();
        state.next_created_at = state.next_created_at.max(record.created_at + 1);
        state.records.push(StoredRecord {
            record,
            hidden_lists: 0,
        });
    }

    /// Removes a record without going through `delete`, as another client would.
    pub fn remove_external(&self, remote_id: &RemoteId) -> bool {
        let mut state = self.state.lock();
        let before = state.records.len();
        state
            .records
            .retain(|stored| &stored.record.remote_id != remote_id);
        before != state.records.len()
    }

    /// Makes every hidden record visible to the next list call.
    pub fn publish_all(&self) {
        for stored in &mut self.state.lock().records {
            stored.hidden_lists = 0;
        }
    }

    pub fn fail_next_insert(&self, error: RemoteError) {
        self.state.lock().faults.insert.push_back(error);
    }

    pub fn fail_next_list(&self, error: RemoteError) {
        self.state.lock().faults.list.push_back(error);
    }

    pub fn fail_next_delete(&self, error: RemoteError) {
        self.state.lock().faults.delete.push_back(error);
    }

    /// Blocks subsequent inserts until released through the returned gate.
    pub fn pause_inserts(&self) -> Gate {
        let gate = Gate::closed();
        self.gates.lock().insert = Some(Arc::clone(&gate.0));
        gate
    }

    /// Lets subsequent inserts commit but holds their replies until released.
    ///
    /// The committed record is visible to lists while the reply is parked.
    pub fn pause_insert_replies(&self) -> Gate {
        let gate = Gate::closed();
        self.gates.lock().insert_reply = Some(Arc::clone(&gate.0));
        gate
    }

    /// Blocks subsequent list replies until released through the returned gate.
    pub fn pause_lists(&self) -> Gate {
        let gate = Gate::closed();
        self.gates.lock().list = Some(Arc::clone(&gate.0));
        gate
    }

    /// Blocks subsequent deletes until released through the returned gate.
    pub fn pause_deletes(&self) -> Gate {
        let gate = Gate::closed();
        self.gates.lock().delete = Some(Arc::clone(&gate.0));
        gate
    }

    /// Lets new calls through again. Calls already parked on a gate stay
    /// parked until that gate is released.
    pub fn resume_all(&self) {
        *self.gates.lock() = Gates::default();
    }

    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    /// Returns every stored record, hidden or not, newest first.
    pub fn records(&self) -> Vec<RemoteRecord> {
        let state = self.state.lock();
        let mut records: Vec<RemoteRecord> =
            state.records.iter().map(|stored| stored.record.clone()).collect();
        sort_desc(&mut records);
        records
    }

    fn commit_insert(&self, record: NewRemoteRecord) -> RemoteResult<RemoteId> {
        let mut state = self.state.lock();
        if let Some(error) = state.faults.insert.pop_front() {
            debug!("event=remote_insert module=remote.memory status=error error_code={}", error.code());
            return Err(error);
        }

        let remote_id = RemoteId::new(format!("r{}", state.next_id));
        let created_at = state.next_created_at;
        state.next_id += 1;
        state.next_created_at += 1;
        let hidden_lists = state.list_lag;
        state.records.push(StoredRecord {
            record: RemoteRecord {
                remote_id: remote_id.clone(),
                author: record.author,
                body: record.body,
                secret: record.secret,
                created_at,
            },
            hidden_lists,
        });
        debug!(
            "event=remote_insert module=remote.memory status=ok remote_id={} created_at={}",
            remote_id, created_at
        );
        Ok(remote_id)
    }

    async fn wait(gate: Option<Arc<Semaphore>>) -> RemoteResult<()> {
        let Some(gate) = gate else {
            return Ok(());
        };
        match gate.acquire_owned().await {
            Ok(permit) => {
                permit.forget();
                Ok(())
            }
            Err(_) => Err(RemoteError::StoreUnavailable("gate closed".to_string())),
        }
    }
}

#[async_trait::async_trait]
impl RemoteLogPort for InMemoryRemoteLog {
    async fn insert(&self, record: NewRemoteRecord) -> RemoteResult<RemoteId> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gates.lock().insert.clone();
        Self::wait(gate).await?;

        let remote_id = self.commit_insert(record)?;
        let reply_gate = self.gates.lock().insert_reply.clone();
        Self::wait(reply_gate).await?;
        Ok(remote_id)
    }

    async fn list_desc(&self) -> RemoteResult<Vec<RemoteRecord>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let captured = {
            let mut state = self.state.lock();
            if let Some(error) = state.faults.list.pop_front() {
                return Err(error);
            }
            let mut visible = Vec::new();
            for stored in &mut state.records {
                if stored.hidden_lists == 0 {
                    visible.push(stored.record.clone());
                } else {
                    stored.hidden_lists -= 1;
                }
            }
            sort_desc(&mut visible);
            visible
        };

        let gate = self.gates.lock().list.clone();
        Self::wait(gate).await?;
        Ok(captured)
    }

    async fn delete(&self, remote_id: &RemoteId) -> RemoteResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gates.lock().delete.clone();
        Self::wait(gate).await?;

        let mut state = self.state.lock();
        if let Some(error) = state.faults.delete.pop_front() {
            return Err(error);
        }
        let before = state.records.len();
        state
            .records
            .retain(|stored| &stored.record.remote_id != remote_id);
        if before == state.records.len() {
            return Err(RemoteError::NotFound(remote_id.clone()));
        }
        debug!("event=remote_delete module=remote.memory status=ok remote_id={}", remote_id);
        Ok(())
    }
}

fn sort_desc(records: &mut [RemoteRecord]) {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}
