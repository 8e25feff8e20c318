//! Remote log contract shared by all store adapters.

use crate::model::entry::{Entry, RemoteId};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Failures reported by a remote log adapter.
///
/// Timeouts are reported as `StoreUnavailable`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    StoreUnavailable(String),
    WriteRejected(String),
    NotFound(RemoteId),
}

impl RemoteError {
    /// Stable machine-readable code used in log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::WriteRejected(_) => "write_rejected",
            Self::NotFound(_) => "remote_not_found",
        }
    }
}

impl Display for RemoteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StoreUnavailable(message) => write!(f, "store unavailable: {message}"),
            Self::WriteRejected(message) => write!(f, "write rejected: {message}"),
            Self::NotFound(id) => write!(f, "remote record not found: {id}"),
        }
    }
}

impl Error for RemoteError {}

/// Insert payload. `created_at` is assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRemoteRecord {
    pub author: String,
    pub body: String,
    pub secret: String,
}

impl NewRemoteRecord {
    pub fn from_entry(entry: &Entry) -> Self {
        Self {
            author: entry.author.clone(),
            body: entry.body.clone(),
            secret: entry.secret().to_string(),
        }
    }
}

/// One authoritative record as listed by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRecord {
    pub remote_id: RemoteId,
    pub author: String,
    pub body: String,
    pub secret: String,
    /// Store-assigned, monotonically increasing epoch milliseconds.
    pub created_at: i64,
}

/// Append-only log with store-assigned ids and creation timestamps.
///
/// Implementations may be eventually consistent: a record returned by
/// `insert` is not guaranteed to appear in the next `list_desc` call.
#[async_trait::async_trait]
pub trait RemoteLogPort: Send + Sync {
    /// Appends one record and returns its store-assigned id.
    async fn insert(&self, record: NewRemoteRecord) -> RemoteResult<RemoteId>;

    /// Lists all visible records ordered by `created_at DESC`.
    async fn list_desc(&self) -> RemoteResult<Vec<RemoteRecord>>;

    /// Deletes one record by id.
    async fn delete(&self, remote_id: &RemoteId) -> RemoteResult<()>;
}
