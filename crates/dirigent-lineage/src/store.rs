use chrono::Utc;
use dirigent_core::{
    Artifact, ArtifactQuery, DirigentError, DirigentResult, EngineEvent, EventBus, Lineage,
    ModificationAction, ModificationEntry,
};
use dirigent_workspace::AgentWorkspace;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

/// Lowercase hex SHA-256 of `bytes`.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Registration request for a file captured from a workspace.
#[derive(Debug, Clone)]
pub struct NewArtifact {
    /// Logical name; defaults to the file name when empty.
    pub name: String,
    /// Path relative to the owning agent's workspace root.
    pub relative_path: String,
    /// The file content at capture time.
    pub bytes: Vec<u8>,
    /// Producing workflow, when known.
    pub workflow_id: Option<Uuid>,
    /// Producing task, when known.
    pub task_id: Option<Uuid>,
    /// Artifacts this one was derived from; every id must exist in the store.
    pub parents: Vec<Uuid>,
    /// Why the artifact exists.
    pub reason: String,
}

/// An artifact plus everything the lineage tables know about it.
#[derive(Debug, Clone)]
pub struct ArtifactWithLineage {
    /// The artifact itself.
    pub artifact: Artifact,
    /// Transitive ancestry (parents, grandparents, ...), deduplicated.
    pub ancestors: Vec<Artifact>,
    /// Artifacts that list this one as a direct parent.
    pub descendants: Vec<Artifact>,
    /// Other artifact ids whose current content hash is identical.
    pub siblings_by_hash: Vec<Uuid>,
}

#[derive(Default)]
struct StoreInner {
    artifacts: HashMap<Uuid, Artifact>,
    content: HashMap<Uuid, Vec<u8>>,
    /// Registration order, for stable listings.
    order: Vec<Uuid>,
    by_workflow: HashMap<Uuid, Vec<Uuid>>,
    by_agent: HashMap<String, Vec<Uuid>>,
    by_hash: HashMap<String, Vec<Uuid>>,
    /// parent id → child ids.
    children: HashMap<Uuid, Vec<Uuid>>,
}

/// The shared artifact lineage service.
///
/// Mutations are serialized through one internal lock; readers receive
/// snapshots. Byte-identical registrations produce equal hashes but distinct
/// ids — deduplication is left to callers via `siblings_by_hash`.
#[derive(Clone)]
pub struct LineageStore {
    inner: Arc<RwLock<StoreInner>>,
    bus: EventBus,
    search_cap: usize,
}

impl LineageStore {
    /// Creates a store publishing on `bus`, with `search_cap` bounding search
    /// results.
    pub fn new(bus: EventBus, search_cap: usize) -> Self {
        Self {
            inner: Arc::default(),
            bus,
            search_cap,
        }
    }

    /// Registers a captured file. The resolved absolute path must lie inside
    /// `workspace`; unknown parent ids are rejected.
    pub async fn record(
        &self,
        workspace: &AgentWorkspace,
        new: NewArtifact,
    ) -> DirigentResult<Artifact> {
        let absolute = workspace
            .resolve_absolute(&workspace.root().join(&new.relative_path))
            .await?;

        let mut inner = self.inner.write().await;
        for parent in &new.parents {
            if !inner.artifacts.contains_key(parent) {
                return Err(DirigentError::InvalidInput(format!(
                    "unknown parent artifact {parent}"
                )));
            }
        }

        let hash = hash_bytes(&new.bytes);
        let name = if new.name.is_empty() {
            absolute
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| new.relative_path.clone())
        } else {
            new.name
        };
        let now = Utc::now();
        let artifact = Artifact {
            id: Uuid::new_v4(),
            name: name.clone(),
            relative_path: new.relative_path,
            absolute_path: absolute.clone(),
            agent: workspace.agent().to_string(),
            task_id: new.task_id,
            workflow_id: new.workflow_id,
            size_bytes: new.bytes.len() as u64,
            file_type: Artifact::file_type_of(&absolute),
            content_hash: hash.clone(),
            created_at: now,
            lineage: Lineage {
                reason: new.reason,
                parents: new.parents.clone(),
                modifications: vec![ModificationEntry {
                    at: now,
                    actor: workspace.agent().to_string(),
                    action: ModificationAction::Created,
                    details: "registered from workspace capture".into(),
                    hash_before: None,
                    hash_after: hash.clone(),
                }],
            },
        };

        let id = artifact.id;
        if let Some(workflow_id) = artifact.workflow_id {
            inner.by_workflow.entry(workflow_id).or_default().push(id);
        }
        inner
            .by_agent
            .entry(artifact.agent.clone())
            .or_default()
            .push(id);
        inner.by_hash.entry(hash).or_default().push(id);
        for parent in &new.parents {
            inner.children.entry(*parent).or_default().push(id);
        }
        inner.content.insert(id, new.bytes);
        inner.order.push(id);
        inner.artifacts.insert(id, artifact.clone());
        drop(inner);

        info!(artifact_id = %id, name = %artifact.name, agent = %artifact.agent, "artifact recorded");
        self.bus.emit(EngineEvent::ArtifactRecorded {
            artifact_id: id,
            workflow_id: artifact.workflow_id,
            name: artifact.name.clone(),
        });
        Ok(artifact)
    }

    /// Replaces an artifact's bytes, appending a modification entry and
    /// re-indexing the content hash.
    pub async fn update(
        &self,
        id: Uuid,
        new_bytes: Vec<u8>,
        actor: &str,
        details: &str,
    ) -> DirigentResult<Artifact> {
        let mut inner = self.inner.write().await;
        let old_hash = inner
            .artifacts
            .get(&id)
            .map(|a| a.content_hash.clone())
            .ok_or_else(|| DirigentError::InvalidInput(format!("unknown artifact {id}")))?;

        let new_hash = hash_bytes(&new_bytes);
        if let Some(ids) = inner.by_hash.get_mut(&old_hash) {
            ids.retain(|existing| *existing != id);
        }
        inner.by_hash.entry(new_hash.clone()).or_default().push(id);

        let size = new_bytes.len() as u64;
        inner.content.insert(id, new_bytes);
        let name;
        {
            let artifact = inner
                .artifacts
                .get_mut(&id)
                .ok_or_else(|| DirigentError::InvalidInput(format!("unknown artifact {id}")))?;
            artifact.size_bytes = size;
            artifact.content_hash = new_hash.clone();
            artifact.lineage.modifications.push(ModificationEntry {
                at: Utc::now(),
                actor: actor.to_string(),
                action: ModificationAction::Edited,
                details: details.to_string(),
                hash_before: Some(old_hash),
                hash_after: new_hash,
            });
            name = artifact.name.clone();
        }
        let snapshot = inner.artifacts[&id].clone();
        drop(inner);

        self.bus.emit(EngineEvent::ArtifactUpdated {
            artifact_id: id,
            name,
        });
        Ok(snapshot)
    }

    /// Looks up one artifact.
    pub async fn get(&self, id: Uuid) -> Option<Artifact> {
        self.inner.read().await.artifacts.get(&id).cloned()
    }

    /// The stored bytes of an artifact.
    pub async fn content(&self, id: Uuid) -> DirigentResult<Vec<u8>> {
        self.inner
            .read()
            .await
            .content
            .get(&id)
            .cloned()
            .ok_or_else(|| DirigentError::InvalidInput(format!("unknown artifact {id}")))
    }

    /// An artifact plus transitive ancestry, one level of descendants, and
    /// same-hash siblings.
    pub async fn get_with_lineage(&self, id: Uuid) -> DirigentResult<ArtifactWithLineage> {
        let inner = self.inner.read().await;
        let artifact = inner
            .artifacts
            .get(&id)
            .cloned()
            .ok_or_else(|| DirigentError::InvalidInput(format!("unknown artifact {id}")))?;

        let mut ancestors = Vec::new();
        let mut seen: HashSet<Uuid> = HashSet::new();
        let mut frontier: Vec<Uuid> = artifact.lineage.parents.clone();
        while let Some(parent_id) = frontier.pop() {
            if !seen.insert(parent_id) {
                continue;
            }
            if let Some(parent) = inner.artifacts.get(&parent_id) {
                frontier.extend(parent.lineage.parents.iter().copied());
                ancestors.push(parent.clone());
            }
        }

        let descendants = inner
            .children
            .get(&id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|child| inner.artifacts.get(child).cloned())
                    .collect()
            })
            .unwrap_or_default();

        let siblings_by_hash = inner
            .by_hash
            .get(&artifact.content_hash)
            .map(|ids| ids.iter().copied().filter(|other| *other != id).collect())
            .unwrap_or_default();

        Ok(ArtifactWithLineage {
            artifact,
            ancestors,
            descendants,
            siblings_by_hash,
        })
    }

    /// Artifacts matching `criteria`, in registration order, capped at the
    /// configured search limit.
    pub async fn search(&self, criteria: &ArtifactQuery) -> Vec<Artifact> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|id| inner.artifacts.get(id).map(|a| (id, a)))
            .filter(|&(id, artifact)| {
                if let Some(workflow_id) = criteria.workflow_id {
                    if artifact.workflow_id != Some(workflow_id) {
                        return false;
                    }
                }
                if let Some(agent) = &criteria.agent {
                    if !artifact.agent.eq_ignore_ascii_case(agent) {
                        return false;
                    }
                }
                if let Some(file_name) = &criteria.file_name {
                    if !artifact.name.contains(file_name.as_str()) {
                        return false;
                    }
                }
                if let Some(file_type) = &criteria.file_type {
                    if &artifact.file_type != file_type {
                        return false;
                    }
                }
                if let Some(created_after) = criteria.created_after {
                    if artifact.created_at < created_after {
                        return false;
                    }
                }
                if let Some(needle) = &criteria.content_substring {
                    let matched = inner
                        .content
                        .get(id)
                        .map(|bytes| {
                            String::from_utf8_lossy(bytes).contains(needle.as_str())
                        })
                        .unwrap_or(false);
                    if !matched {
                        return false;
                    }
                }
                true
            })
            .map(|(_, artifact)| artifact.clone())
            .take(self.search_cap)
            .collect()
    }

    /// All artifacts for a workflow, in registration order.
    pub async fn for_workflow(&self, workflow_id: Uuid) -> Vec<Artifact> {
        let inner = self.inner.read().await;
        inner
            .by_workflow
            .get(&workflow_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.artifacts.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) async fn snapshot_all(&self) -> Vec<Artifact> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|id| inner.artifacts.get(id).cloned())
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    async fn fixture() -> (tempfile::TempDir, AgentWorkspace, LineageStore) {
        let base = tempfile::tempdir().unwrap();
        let ws = AgentWorkspace::create(base.path(), "designer").await.unwrap();
        let store = LineageStore::new(EventBus::new(64), 100);
        (base, ws, store)
    }

    async fn record_file(
        ws: &AgentWorkspace,
        store: &LineageStore,
        rel: &str,
        bytes: &[u8],
        parents: Vec<Uuid>,
    ) -> Artifact {
        ws.write_file(rel, bytes).await.unwrap();
        store
            .record(
                ws,
                NewArtifact {
                    name: String::new(),
                    relative_path: rel.into(),
                    bytes: bytes.to_vec(),
                    workflow_id: Some(Uuid::new_v4()),
                    task_id: Some(Uuid::new_v4()),
                    parents,
                    reason: "task output".into(),
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_record_computes_hash_and_type() {
        let (_base, ws, store) = fixture().await;
        let artifact = record_file(&ws, &store, "index.html", b"<html></html>", vec![]).await;
        assert_eq!(artifact.file_type, "html");
        assert_eq!(artifact.content_hash, hash_bytes(b"<html></html>"));
        assert_eq!(artifact.size_bytes, 13);
        assert_eq!(artifact.agent, "designer");
        assert_eq!(artifact.name, "index.html");
    }

    #[tokio::test]
    async fn test_record_rejects_unknown_parent() {
        let (_base, ws, store) = fixture().await;
        ws.write_file("a.css", b"body{}").await.unwrap();
        let err = store
            .record(
                &ws,
                NewArtifact {
                    name: String::new(),
                    relative_path: "a.css".into(),
                    bytes: b"body{}".to_vec(),
                    workflow_id: None,
                    task_id: None,
                    parents: vec![Uuid::new_v4()],
                    reason: "x".into(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[tokio::test]
    async fn test_byte_identical_records_get_distinct_ids_same_hash() {
        let (_base, ws, store) = fixture().await;
        let a = record_file(&ws, &store, "one.txt", b"same", vec![]).await;
        let b = record_file(&ws, &store, "two.txt", b"same", vec![]).await;
        assert_ne!(a.id, b.id);
        assert_eq!(a.content_hash, b.content_hash);

        let detail = store.get_with_lineage(a.id).await.unwrap();
        assert_eq!(detail.siblings_by_hash, vec![b.id]);
    }

    #[tokio::test]
    async fn test_update_appends_history_and_rehashes() {
        let (_base, ws, store) = fixture().await;
        let artifact = record_file(&ws, &store, "page.html", b"v1", vec![]).await;
        let old_hash = artifact.content_hash.clone();

        let updated = store
            .update(artifact.id, b"v2".to_vec(), "designer", "palette revision")
            .await
            .unwrap();
        assert_ne!(updated.content_hash, old_hash);
        assert_eq!(updated.lineage.modifications.len(), 2);
        let last = updated.lineage.modifications.last().unwrap();
        assert_eq!(last.action, ModificationAction::Edited);
        assert_eq!(last.hash_before.as_deref(), Some(old_hash.as_str()));

        let content = store.content(artifact.id).await.unwrap();
        assert_eq!(content, b"v2");
    }

    #[tokio::test]
    async fn test_lineage_traversal_is_transitive() {
        let (_base, ws, store) = fixture().await;
        let root = record_file(&ws, &store, "brief.md", b"brief", vec![]).await;
        let mid = record_file(&ws, &store, "draft.html", b"draft", vec![root.id]).await;
        let leaf = record_file(&ws, &store, "final.html", b"final", vec![mid.id]).await;

        let detail = store.get_with_lineage(leaf.id).await.unwrap();
        let ancestor_ids: Vec<Uuid> = detail.ancestors.iter().map(|a| a.id).collect();
        assert!(ancestor_ids.contains(&mid.id));
        assert!(ancestor_ids.contains(&root.id));

        let root_detail = store.get_with_lineage(root.id).await.unwrap();
        let child_ids: Vec<Uuid> = root_detail.descendants.iter().map(|a| a.id).collect();
        assert_eq!(child_ids, vec![mid.id]);
    }

    #[tokio::test]
    async fn test_search_by_type_and_content() {
        let (_base, ws, store) = fixture().await;
        record_file(&ws, &store, "index.html", b"<h1>Kittens</h1>", vec![]).await;
        record_file(&ws, &store, "site.css", b"h1 { color: red }", vec![]).await;

        let html = store
            .search(&ArtifactQuery {
                file_type: Some("html".into()),
                ..Default::default()
            })
            .await;
        assert_eq!(html.len(), 1);
        assert_eq!(html[0].name, "index.html");

        let kittens = store
            .search(&ArtifactQuery {
                content_substring: Some("Kittens".into()),
                ..Default::default()
            })
            .await;
        assert_eq!(kittens.len(), 1);
    }

    #[tokio::test]
    async fn test_search_respects_cap() {
        let base = tempfile::tempdir().unwrap();
        let ws = AgentWorkspace::create(base.path(), "writer").await.unwrap();
        let store = LineageStore::new(EventBus::new(64), 2);
        for i in 0..5 {
            record_file(&ws, &store, &format!("f{i}.txt"), b"x", vec![]).await;
        }
        let all = store.search(&ArtifactQuery::default()).await;
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_record_emits_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let base = tempfile::tempdir().unwrap();
        let ws = AgentWorkspace::create(base.path(), "backend").await.unwrap();
        let store = LineageStore::new(bus, 100);
        let artifact = record_file(&ws, &store, "api.md", b"routes", vec![]).await;
        match rx.recv().await.unwrap() {
            EngineEvent::ArtifactRecorded { artifact_id, .. } => {
                assert_eq!(artifact_id, artifact.id);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
