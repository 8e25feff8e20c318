//! Remote log port and adapters.
//!
//! # Responsibility
//! - Define the append/list/delete contract of the authoritative store.
//! - Provide an in-memory double and a SQLite-backed adapter.
//!
//! # Invariants
//! - Adapters assign `remote_id` and `created_at`; callers never do.
//! - Listing is ordered by `created_at DESC`.

pub mod memory;
pub mod port;
pub mod sqlite;

pub use memory::{Gate, InMemoryRemoteLog};
pub use port::{NewRemoteRecord, RemoteError, RemoteLogPort, RemoteRecord, RemoteResult};
pub use sqlite::SqliteRemoteLog;
