use crate::error::{DirigentError, DirigentResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Bounded retry policy for repository writes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Backoff before the second attempt; doubles on each further attempt.
    pub base_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 100,
        }
    }
}

impl RetryPolicy {
    /// The backoff to sleep after attempt number `attempt` (1-based) failed.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.base_backoff_ms.saturating_mul(factor))
    }
}

/// Weights and token lists for the deterministic approval summary.
///
/// The gate never hard-codes scoring constants; everything a deployment may
/// want to tune lives here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringRules {
    /// Starting quality score.
    pub base_score: u32,
    /// Added when every task completed.
    pub all_completed_bonus: u32,
    /// Added when at least one artifact was captured.
    pub artifacts_bonus: u32,
    /// Added when the manager review task completed.
    pub review_bonus: u32,
    /// Added when no task failed.
    pub no_failure_bonus: u32,
    /// Directive tokens that raise risk to at least medium.
    pub medium_risk_tokens: Vec<String>,
    /// Directive tokens that raise risk to at least high.
    pub high_risk_tokens: Vec<String>,
}

impl Default for ScoringRules {
    fn default() -> Self {
        Self {
            base_score: 50,
            all_completed_bonus: 15,
            artifacts_bonus: 10,
            review_bonus: 15,
            no_failure_bonus: 10,
            medium_risk_tokens: vec![
                "donation".into(),
                "payment".into(),
                "checkout".into(),
                "account".into(),
                "login".into(),
            ],
            high_risk_tokens: vec![
                "deploy".into(),
                "production".into(),
                "security".into(),
                "auth".into(),
            ],
        }
    }
}

/// Engine-wide configuration, loadable from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Root under which each agent's workspace directory lives.
    pub workspace_root: PathBuf,
    /// Retry policy for repository writes.
    pub retry: RetryPolicy,
    /// Per-task execution budget in seconds; `None` disables the timeout.
    pub task_timeout_secs: Option<u64>,
    /// Per-workflow budget in seconds; `None` disables the timeout.
    pub workflow_timeout_secs: Option<u64>,
    /// Optional cap on concurrently executing workflows.
    pub max_concurrent_workflows: Option<usize>,
    /// Maximum results returned by artifact searches.
    pub artifact_search_cap: usize,
    /// Approval summary scoring ruleset.
    pub scoring: ScoringRules,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from("workspaces"),
            retry: RetryPolicy::default(),
            task_timeout_secs: Some(300),
            workflow_timeout_secs: None,
            max_concurrent_workflows: None,
            artifact_search_cap: 100,
            scoring: ScoringRules::default(),
        }
    }
}

impl EngineConfig {
    /// Parses a TOML document; missing fields fall back to defaults.
    pub fn from_toml_str(s: &str) -> DirigentResult<Self> {
        toml::from_str(s).map_err(|e| DirigentError::InvalidInput(format!("bad config: {e}")))
    }

    /// The per-task budget as a [`Duration`], when configured.
    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_secs.map(Duration::from_secs)
    }

    /// The per-workflow budget as a [`Duration`], when configured.
    pub fn workflow_timeout(&self) -> Option<Duration> {
        self.workflow_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.artifact_search_cap, 100);
        assert_eq!(config.task_timeout(), Some(Duration::from_secs(300)));
        assert!(config.workflow_timeout().is_none());
    }

    #[test]
    fn test_backoff_doubles() {
        let retry = RetryPolicy {
            max_attempts: 4,
            base_backoff_ms: 100,
        };
        assert_eq!(retry.backoff_after(1), Duration::from_millis(100));
        assert_eq!(retry.backoff_after(2), Duration::from_millis(200));
        assert_eq!(retry.backoff_after(3), Duration::from_millis(400));
    }

    #[test]
    fn test_from_toml_partial_document() {
        let config = EngineConfig::from_toml_str(
            r#"
            workspace_root = "/srv/agents"
            task_timeout_secs = 60

            [retry]
            max_attempts = 5
            base_backoff_ms = 50
            "#,
        )
        .unwrap();
        assert_eq!(config.workspace_root, PathBuf::from("/srv/agents"));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.scoring.base_score, 50);
    }

    #[test]
    fn test_from_toml_rejects_garbage() {
        assert!(EngineConfig::from_toml_str("workspace_root = [1,2]").is_err());
    }

    #[test]
    fn test_default_scoring_tokens_cover_donations() {
        let scoring = ScoringRules::default();
        assert!(scoring.medium_risk_tokens.iter().any(|t| t == "donation"));
        assert!(scoring.high_risk_tokens.iter().any(|t| t == "deploy"));
    }
}
