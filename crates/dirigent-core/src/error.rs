use thiserror::Error;

/// A convenience `Result` alias using [`DirigentError`].
pub type DirigentResult<T> = Result<T, DirigentError>;

/// Top-level error type for the Dirigent engine.
///
/// Every operation's failure channel carries one of these variants. Each
/// variant maps to a stable kind identifier (see [`DirigentError::kind`])
/// that is surfaced to callers alongside the human-readable reason.
#[derive(Error, Debug)]
pub enum DirigentError {
    /// Malformed directive, unknown id, or a bad brief response. Never retried.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A brief still has an unanswered required clarifying question.
    #[error("Unresolved clarifying question '{question}': {detail}")]
    Unresolved {
        /// Id of the offending question.
        question: String,
        /// What the caller must do to resolve it.
        detail: String,
    },

    /// The planner produced a cyclic task graph. This is a bug, not a runtime
    /// condition; workflow creation fails and the event is audit-logged.
    #[error("Dependency cycle in task graph: {0}")]
    DependencyCycle(String),

    /// A path escaped its agent's workspace root.
    #[error("Workspace violation: {0}")]
    WorkspaceViolation(String),

    /// A task command exited non-zero.
    #[error("Task failed: {0}")]
    TaskFailed(String),

    /// A task or workflow exceeded its time budget.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// A repository write failed in a way that may succeed on retry.
    #[error("Transient persistence error: {0}")]
    PersistenceTransient(String),

    /// A repository failure that retrying cannot fix (schema mismatch, disk full).
    #[error("Terminal persistence error: {0}")]
    PersistenceTerminal(String),

    /// An attempt to complete a workflow that has a pending approval request.
    #[error("Approval blocked: {0}")]
    ApprovalBlocked(String),

    /// A JSON serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DirigentError {
    /// Stable, machine-readable identifier for this error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            DirigentError::InvalidInput(_) => "invalid_input",
            DirigentError::Unresolved { .. } => "unresolved",
            DirigentError::DependencyCycle(_) => "dependency_cycle",
            DirigentError::WorkspaceViolation(_) => "workspace_violation",
            DirigentError::TaskFailed(_) => "task_failed",
            DirigentError::Timeout(_) => "timeout",
            DirigentError::PersistenceTransient(_) => "persistence_transient",
            DirigentError::PersistenceTerminal(_) => "persistence_terminal",
            DirigentError::ApprovalBlocked(_) => "approval_blocked",
            DirigentError::Serialization(_) => "serialization",
            DirigentError::Io(_) => "io",
        }
    }

    /// Whether a local bounded retry is appropriate for this error.
    pub fn is_retriable(&self) -> bool {
        matches!(self, DirigentError::PersistenceTransient(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_is_stable() {
        assert_eq!(DirigentError::InvalidInput("x".into()).kind(), "invalid_input");
        assert_eq!(
            DirigentError::Unresolved {
                question: "scope".into(),
                detail: "answer required".into()
            }
            .kind(),
            "unresolved"
        );
        assert_eq!(
            DirigentError::WorkspaceViolation("escape".into()).kind(),
            "workspace_violation"
        );
        assert_eq!(DirigentError::ApprovalBlocked("pending".into()).kind(), "approval_blocked");
    }

    #[test]
    fn test_only_transient_persistence_is_retriable() {
        assert!(DirigentError::PersistenceTransient("locked".into()).is_retriable());
        assert!(!DirigentError::PersistenceTerminal("disk full".into()).is_retriable());
        assert!(!DirigentError::TaskFailed("exit 1".into()).is_retriable());
    }

    #[test]
    fn test_unresolved_names_the_question() {
        let err = DirigentError::Unresolved {
            question: "agent_mismatch".into(),
            detail: "must be answered before workflow creation".into(),
        };
        assert!(err.to_string().contains("agent_mismatch"));
    }
}
