use dirigent_core::{DirigentError, DirigentResult};
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

/// One agent's workspace: a directory the agent may freely write inside and
/// may never escape.
///
/// The root is canonicalized at creation time; every operation re-checks
/// containment on the canonicalized target, so neither `..` components nor
/// symlinks can reach outside.
#[derive(Debug, Clone)]
pub struct AgentWorkspace {
    agent: String,
    root: PathBuf,
}

impl AgentWorkspace {
    /// Creates (if needed) and opens the workspace for `agent` under `base`.
    pub async fn create(base: &Path, agent: &str) -> DirigentResult<Self> {
        if agent.is_empty() || agent.contains(['/', '\\']) || agent == ".." {
            return Err(DirigentError::InvalidInput(format!(
                "invalid agent name: '{agent}'"
            )));
        }
        let dir = base.join(agent);
        tokio::fs::create_dir_all(&dir).await?;
        let root = tokio::fs::canonicalize(&dir).await?;
        debug!(agent = %agent, root = %root.display(), "workspace ready");
        Ok(Self {
            agent: agent.to_string(),
            root,
        })
    }

    /// The owning agent's name.
    pub fn agent(&self) -> &str {
        &self.agent
    }

    /// The canonicalized workspace root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// True when `path` (already canonicalized) lies inside this workspace.
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
    }

    /// Joins a relative path onto the root, rejecting absolute paths and
    /// any `..` component before the filesystem is touched.
    fn join_checked(&self, relative: &str) -> DirigentResult<PathBuf> {
        let rel = Path::new(relative);
        if rel.is_absolute() {
            return Err(self.violation(relative, "absolute path"));
        }
        for component in rel.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => return Err(self.violation(relative, "path traversal component")),
            }
        }
        Ok(self.root.join(rel))
    }

    fn violation(&self, path: &str, why: &str) -> DirigentError {
        warn!(agent = %self.agent, path = %path, why = %why, "workspace violation");
        DirigentError::WorkspaceViolation(format!(
            "'{path}' escapes workspace of agent '{}': {why}",
            self.agent
        ))
    }

    /// Writes `bytes` at `relative`, creating parent directories. Returns the
    /// canonicalized absolute path of the written file.
    pub async fn write_file(&self, relative: &str, bytes: &[u8]) -> DirigentResult<PathBuf> {
        let target = self.join_checked(relative)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
            // Re-check after creation: a symlinked parent could point outside.
            let canonical_parent = tokio::fs::canonicalize(parent).await?;
            if !self.contains(&canonical_parent) {
                return Err(self.violation(relative, "symlinked parent escapes root"));
            }
        }
        tokio::fs::write(&target, bytes).await?;
        let canonical = tokio::fs::canonicalize(&target).await?;
        if !self.contains(&canonical) {
            tokio::fs::remove_file(&canonical).await.ok();
            return Err(self.violation(relative, "resolved path escapes root"));
        }
        Ok(canonical)
    }

    /// Reads the file at `relative`; the canonicalized path must stay inside
    /// the workspace.
    pub async fn read_file(&self, relative: &str) -> DirigentResult<Vec<u8>> {
        let target = self.join_checked(relative)?;
        let canonical = tokio::fs::canonicalize(&target)
            .await
            .map_err(|e| DirigentError::InvalidInput(format!("'{relative}': {e}")))?;
        if !self.contains(&canonical) {
            return Err(self.violation(relative, "resolved path escapes root"));
        }
        Ok(tokio::fs::read(&canonical).await?)
    }

    /// Validates an absolute path claimed to live in this workspace and
    /// returns its canonical form.
    pub async fn resolve_absolute(&self, path: &Path) -> DirigentResult<PathBuf> {
        let canonical = tokio::fs::canonicalize(path)
            .await
            .map_err(|e| DirigentError::InvalidInput(format!("'{}': {e}", path.display())))?;
        if !self.contains(&canonical) {
            return Err(self.violation(&path.display().to_string(), "outside workspace root"));
        }
        Ok(canonical)
    }

    /// Regular files created or modified at or after `since`, as paths
    /// relative to the root, in sorted order.
    pub async fn scan_modified_since(&self, since: SystemTime) -> DirigentResult<Vec<PathBuf>> {
        let mut found = Vec::new();
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let meta = entry.metadata().await?;
                if meta.is_dir() {
                    pending.push(path);
                } else if meta.is_file() {
                    let modified = meta.modified()?;
                    if modified >= since {
                        if let Ok(rel) = path.strip_prefix(&self.root) {
                            found.push(rel.to_path_buf());
                        }
                    }
                }
            }
        }
        found.sort();
        Ok(found)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn workspace() -> (tempfile::TempDir, AgentWorkspace) {
        let base = tempfile::tempdir().unwrap();
        let ws = AgentWorkspace::create(base.path(), "frontend").await.unwrap();
        (base, ws)
    }

    #[tokio::test]
    async fn test_write_and_read_roundtrip() {
        let (_base, ws) = workspace().await;
        let path = ws.write_file("site/index.html", b"<html></html>").await.unwrap();
        assert!(ws.contains(&path));
        let bytes = ws.read_file("site/index.html").await.unwrap();
        assert_eq!(bytes, b"<html></html>");
    }

    #[tokio::test]
    async fn test_rejects_absolute_path() {
        let (_base, ws) = workspace().await;
        let err = ws.write_file("/etc/passwd", b"x").await.unwrap_err();
        assert_eq!(err.kind(), "workspace_violation");
    }

    #[tokio::test]
    async fn test_rejects_parent_traversal() {
        let (_base, ws) = workspace().await;
        let err = ws.write_file("../outside.txt", b"x").await.unwrap_err();
        assert_eq!(err.kind(), "workspace_violation");
        let err = ws.read_file("a/../../b.txt").await.unwrap_err();
        assert_eq!(err.kind(), "workspace_violation");
    }

    #[tokio::test]
    async fn test_rejects_symlink_escape() {
        let (base, ws) = workspace().await;
        let outside = base.path().join("outside");
        tokio::fs::create_dir_all(&outside).await.unwrap();
        tokio::fs::write(outside.join("secret.txt"), b"secret").await.unwrap();
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(&outside, ws.root().join("leak")).unwrap();
            let err = ws.read_file("leak/secret.txt").await.unwrap_err();
            assert_eq!(err.kind(), "workspace_violation");
        }
    }

    #[tokio::test]
    async fn test_rejects_bad_agent_name() {
        let base = tempfile::tempdir().unwrap();
        assert!(AgentWorkspace::create(base.path(), "a/b").await.is_err());
        assert!(AgentWorkspace::create(base.path(), "..").await.is_err());
    }

    #[tokio::test]
    async fn test_resolve_absolute_inside_and_outside() {
        let (base, ws) = workspace().await;
        let inside = ws.write_file("styles.css", b"body{}").await.unwrap();
        assert!(ws.resolve_absolute(&inside).await.is_ok());

        let outside = base.path().join("other.txt");
        tokio::fs::write(&outside, b"x").await.unwrap();
        let err = ws.resolve_absolute(&outside).await.unwrap_err();
        assert_eq!(err.kind(), "workspace_violation");
    }

    #[tokio::test]
    async fn test_scan_modified_since_finds_new_files() {
        let (_base, ws) = workspace().await;
        ws.write_file("old.txt", b"old").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let mark = SystemTime::now();
        ws.write_file("new/page.html", b"<p>hi</p>").await.unwrap();

        let modified = ws.scan_modified_since(mark).await.unwrap();
        assert_eq!(modified, vec![PathBuf::from("new/page.html")]);
    }
}
