//! Repository adapters for the Dirigent engine.
//!
//! The engine persists through the [`Repository`] trait only; this crate
//! supplies the two stock implementations: an in-memory store for tests and
//! short-lived runs, and a file-backed store that writes one JSON document
//! per entity plus an append-only JSONL audit log.
//!
//! # Main types
//!
//! - [`InMemoryRepository`] — Lock-protected maps; also the base for the
//!   fault-injecting test double.
//! - [`FileRepository`] — JSON documents on disk, good enough for a single
//!   node.
//! - [`FlakyRepository`] — Wraps another repository and fails the first N
//!   writes with a transient error (retry-path tests).
//!
//! [`Repository`]: dirigent_core::Repository

mod file;
mod memory;

pub use file::FileRepository;
pub use memory::{FlakyRepository, InMemoryRepository};
