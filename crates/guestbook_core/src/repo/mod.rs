//! Local entry registry.
//!
//! # Responsibility
//! - Own the client-visible ordered entry sequence and its lifecycle state.
//! - Stay free of network and persistence access.
//!
//! # Invariants
//! - Registry APIs return semantic errors (`NotFound`, `DuplicateLocalId`)
//!   instead of silently ignoring stale ids.

pub mod entry_store;
