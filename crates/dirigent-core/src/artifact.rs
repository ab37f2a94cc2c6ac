use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// What a modification entry records about an artifact change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModificationAction {
    /// The artifact was first registered.
    Created,
    /// The bytes were changed in place.
    Edited,
    /// The artifact was produced again from its inputs.
    Regenerated,
}

/// Append-only record of one change to an artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModificationEntry {
    /// When the change happened.
    pub at: DateTime<Utc>,
    /// Agent name or user that made the change.
    pub actor: String,
    /// Kind of change.
    pub action: ModificationAction,
    /// Free-form context (e.g. the reason an update was issued).
    pub details: String,
    /// Content hash before the change; `None` for creation.
    pub hash_before: Option<String>,
    /// Content hash after the change.
    pub hash_after: String,
}

/// Provenance attached to an artifact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Lineage {
    /// Why the artifact exists (e.g. "captured from task output").
    pub reason: String,
    /// Ids of artifacts this one was derived from.
    pub parents: Vec<Uuid>,
    /// Full modification history, oldest first.
    pub modifications: Vec<ModificationEntry>,
}

/// A file captured from an agent workspace, addressed by content hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// Unique artifact id. Byte-identical registrations get distinct ids.
    pub id: Uuid,
    /// Logical name (usually the file name).
    pub name: String,
    /// Path relative to the owning agent's workspace root.
    pub relative_path: String,
    /// Absolute path on disk; always inside the owning agent's workspace.
    pub absolute_path: PathBuf,
    /// Name of the agent whose workspace produced the file.
    pub agent: String,
    /// Task that produced the artifact, when known.
    pub task_id: Option<Uuid>,
    /// Workflow that produced the artifact, when known.
    pub workflow_id: Option<Uuid>,
    /// Size in bytes at registration time.
    pub size_bytes: u64,
    /// File type derived from the extension (`html`, `css`, ...).
    pub file_type: String,
    /// Lowercase hex SHA-256 of the current content.
    pub content_hash: String,
    /// Registration timestamp.
    pub created_at: DateTime<Utc>,
    /// Parents, history, and creation reason.
    pub lineage: Lineage,
}

impl Artifact {
    /// File type for a path, by extension; `"unknown"` when there is none.
    pub fn file_type_of(path: &std::path::Path) -> String {
        path.extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_else(|| "unknown".into())
    }
}

/// Criteria for artifact searches; all fields are conjunctive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtifactQuery {
    /// Restrict to one workflow.
    pub workflow_id: Option<Uuid>,
    /// Restrict to one agent's output.
    pub agent: Option<String>,
    /// Substring match on the logical name.
    pub file_name: Option<String>,
    /// Exact file-type match.
    pub file_type: Option<String>,
    /// Only artifacts registered at or after this instant.
    pub created_after: Option<DateTime<Utc>>,
    /// Substring match on the stored content.
    pub content_substring: Option<String>,
}
