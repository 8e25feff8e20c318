//! Guestbook domain model.
//!
//! # Responsibility
//! - Define the canonical entry record rendered by presentation layers.
//! - Keep identity split between client-local and store-assigned ids.
//!
//! # Invariants
//! - Every entry is identified locally by a stable `LocalId`.
//! - Deletion is a hard remove; no tombstones are retained.

pub mod entry;
