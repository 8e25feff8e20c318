//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate entry registry mutations and remote log calls.
//! - Keep presentation layers decoupled from store adapters.

pub mod lifecycle;
