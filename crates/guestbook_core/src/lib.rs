//! Core entry lifecycle logic for the guestbook.
//! This crate owns every invariant about ordering, optimistic inserts, and
//! secret-gated retraction; presentation layers only render its snapshots.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod remote;
pub mod repo;
pub mod service;

pub use config::LifecycleConfig;
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::entry::{Entry, EntryDraft, EntryState, EntryValidationError, LocalId, RemoteId};
pub use remote::{
    Gate, InMemoryRemoteLog, NewRemoteRecord, RemoteError, RemoteLogPort, RemoteRecord, RemoteResult,
    SqliteRemoteLog,
};
pub use repo::entry_store::{EntryStore, EntryStoreError, StoreResult};
pub use service::lifecycle::{
    LifecycleManager, LifecycleManagerBuilder, LocalActionError, LocalClock, ReconcileError,
    ReconcileOutcome, ReconcileSummary, RetractError, SubmitError, SubmitOutcome, Submission,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
