use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSeverity {
    /// Routine lifecycle event.
    Info,
    /// Security-relevant event (workspace violations, emergency overrides).
    High,
}

/// Append-only record of an actor performing an action on a target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Who performed the action (agent name, user, or "orchestrator").
    pub actor: String,
    /// What was done (e.g. "workflow_cancelled", "emergency_unblock").
    pub action: String,
    /// Target entity kind ("workflow", "task", "artifact", "brief").
    pub target_kind: String,
    /// Target entity id.
    pub target_id: String,
    /// Arbitrary context attached to the entry.
    pub metadata: serde_json::Value,
    /// Wall-clock timestamp.
    pub at: DateTime<Utc>,
    /// Severity.
    pub severity: AuditSeverity,
    /// Transport-provided source (ip, channel), when known.
    pub source: Option<String>,
}

impl AuditEntry {
    /// Creates an info-severity entry stamped now.
    pub fn new(
        actor: impl Into<String>,
        action: impl Into<String>,
        target_kind: impl Into<String>,
        target_id: impl Into<String>,
    ) -> Self {
        Self {
            actor: actor.into(),
            action: action.into(),
            target_kind: target_kind.into(),
            target_id: target_id.into(),
            metadata: serde_json::Value::Null,
            at: Utc::now(),
            severity: AuditSeverity::Info,
            source: None,
        }
    }

    /// Attaches metadata.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Raises the severity to high.
    pub fn high_severity(mut self) -> Self {
        self.severity = AuditSeverity::High;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_severity_is_info() {
        let entry = AuditEntry::new("operator", "workflow_cancelled", "workflow", "wf-1");
        assert_eq!(entry.severity, AuditSeverity::Info);
    }

    #[test]
    fn test_high_severity_builder() {
        let entry = AuditEntry::new("agent:backend", "path_escape_attempt", "workspace", "backend")
            .high_severity()
            .with_metadata(serde_json::json!({"path": "../../etc/passwd"}));
        assert_eq!(entry.severity, AuditSeverity::High);
        assert_eq!(entry.metadata["path"], "../../etc/passwd");
    }
}
