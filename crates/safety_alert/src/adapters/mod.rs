// Rust guideline compliant 2026-08-21

//! Adapters (secondary ports) for the safety-alert binary.
//!
//! Each sub-module implements the storage port traits defined in the
//! `domain` crate. Adapters are intentionally isolated from engine logic.
//! The SQLite adapter lives outside this tree and is loaded via `#[path]`
//! only by the SQLite binary.

pub mod in_memory_store;
