//! Content-addressed artifact store with provenance.
//!
//! Every file captured from an agent workspace is registered here with its
//! SHA-256 hash, size, owning agent, producing task and workflow, and a
//! lineage record: why it exists, which artifacts it was derived from, and
//! an append-only modification history. The store is append-only — artifacts
//! outlive the tasks that produced them — and all mutation goes through its
//! own internally-serialized operations.
//!
//! # Main types
//!
//! - [`LineageStore`] — The shared store: record, update, lineage queries,
//!   search, and reporting.
//! - [`NewArtifact`] — Registration request for a freshly captured file.
//! - [`ArtifactWithLineage`] — An artifact plus ancestry, descendants,
//!   history, and same-hash siblings.
//! - [`LineageReport`] — Aggregate counts by agent, workflow, and type.

mod report;
mod store;

pub use report::LineageReport;
pub use store::{hash_bytes, ArtifactWithLineage, LineageStore, NewArtifact};
