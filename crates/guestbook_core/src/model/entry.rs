//! Guestbook entry domain model.
//!
//! # Responsibility
//! - Define the entry record and its lifecycle state.
//! - Validate user-supplied author/body/secret before any mutation.
//!
//! # Invariants
//! - `local_id` is stable and never reused for another entry.
//! - `remote_id` is `None` while the entry is pending or errored.
//! - `secret` is set once at construction and never rewritten.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Client-generated identifier for one entry.
pub type LocalId = Uuid;

/// Store-assigned identifier for a persisted entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(String);

impl RemoteId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for RemoteId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RemoteId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Lifecycle state of one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    /// Optimistically inserted; waiting for the store's list view.
    Pending,
    /// Remote insert failed; content retained for retry or discard.
    Errored,
    /// Listed by the store with an attached `remote_id`.
    Confirmed,
    /// Retracted remotely. Only ever observed on the value returned by retract.
    Deleted,
}

impl EntryState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Errored => "errored",
            Self::Confirmed => "confirmed",
            Self::Deleted => "deleted",
        }
    }

    /// Returns whether the entry has no store counterpart yet.
    pub fn is_unconfirmed(self) -> bool {
        matches!(self, Self::Pending | Self::Errored)
    }
}

impl Display for EntryState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validation errors for user-supplied entry fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryValidationError {
    EmptyAuthor,
    EmptyBody,
    EmptySecret,
}

impl Display for EntryValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyAuthor => write!(f, "author must not be blank"),
            Self::EmptyBody => write!(f, "body must not be blank"),
            Self::EmptySecret => write!(f, "secret must not be blank"),
        }
    }
}

impl Error for EntryValidationError {}

/// Validated user input for a new entry.
///
/// Values are stored verbatim; trimming is only used for the blank check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDraft {
    author: String,
    body: String,
    secret: String,
}

impl EntryDraft {
    /// Validates author/body/secret.
    ///
    /// # Errors
    /// - Returns the first blank field in `author`, `body`, `secret` order.
    pub fn new(
        author: impl Into<String>,
        body: impl Into<String>,
        secret: impl Into<String>,
    ) -> Result<Self, EntryValidationError> {
        let author = author.into();
        let body = body.into();
        let secret = secret.into();

        if author.trim().is_empty() {
            return Err(EntryValidationError::EmptyAuthor);
        }
        if body.trim().is_empty() {
            return Err(EntryValidationError::EmptyBody);
        }
        if secret.trim().is_empty() {
            return Err(EntryValidationError::EmptySecret);
        }

        Ok(Self {
            author,
            body,
            secret,
        })
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

/// Client-visible guestbook entry.
///
/// Serializes without the secret so snapshots can be handed to renderers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub local_id: LocalId,
    pub remote_id: Option<RemoteId>,
    pub author: String,
    pub body: String,
    /// Plaintext; only ever compared for exact equality.
    #[serde(skip_serializing)]
    secret: String,
    /// Unix epoch milliseconds. Local submission instant until confirmed.
    pub created_at: i64,
    pub state: EntryState,
    /// Last remote failure message while `state == Errored`.
    pub last_error: Option<String>,
}

impl Entry {
    /// Builds a pending entry from validated input.
    pub fn pending(local_id: LocalId, draft: EntryDraft, submitted_at: i64) -> Self {
        Self {
            local_id,
            remote_id: None,
            author: draft.author,
            body: draft.body,
            secret: draft.secret,
            created_at: submitted_at,
            state: EntryState::Pending,
            last_error: None,
        }
    }

    /// Builds a confirmed entry from a store-listed record.
    pub fn confirmed(
        local_id: LocalId,
        remote_id: RemoteId,
        author: impl Into<String>,
        body: impl Into<String>,
        secret: impl Into<String>,
        created_at: i64,
    ) -> Self {
        Self {
            local_id,
            remote_id: Some(remote_id),
            author: author.into(),
            body: body.into(),
            secret: secret.into(),
            created_at,
            state: EntryState::Confirmed,
            last_error: None,
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Exact, unnormalized comparison against the stored secret.
    pub fn secret_matches(&self, candidate: &str) -> bool {
        self.secret == candidate
    }

    /// Marks a pending entry as errored with a failure message.
    pub fn mark_errored(&mut self, message: impl Into<String>) {
        self.state = EntryState::Errored;
        self.last_error = Some(message.into());
    }

    /// Returns an errored entry to pending for a re-issued insert.
    pub fn mark_pending(&mut self) {
        self.state = EntryState::Pending;
        self.last_error = None;
    }
}

/// Returns a fresh random local id.
pub fn new_local_id() -> LocalId {
    Uuid::new_v4()
}
