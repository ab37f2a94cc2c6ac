use dirigent_core::{
    ApprovalSummary, ComplianceCheck, RiskLevel, ScoringRules, TaskKind, TaskStatus, Workflow,
};

/// The executive approval gate's deterministic summary computation.
///
/// Every number is a pure function of workflow state and the configured
/// [`ScoringRules`]; nothing here consults a model or a human. The engine
/// freezes the workflow at `waiting_for_ceo_approval` before calling in.
pub struct ApprovalGate {
    rules: ScoringRules,
}

impl ApprovalGate {
    /// Creates a gate with the given ruleset.
    pub fn new(rules: ScoringRules) -> Self {
        Self { rules }
    }

    /// Computes the summary snapshot for a workflow about to be submitted.
    pub fn summarize(&self, workflow: &Workflow, artifact_count: usize) -> ApprovalSummary {
        ApprovalSummary {
            quality_score: self.quality_score(workflow, artifact_count),
            risk_level: self.risk_level(workflow),
            checks: self.compliance_checks(workflow, artifact_count),
            artifact_count,
            task_count: workflow.tasks.len(),
        }
    }

    fn quality_score(&self, workflow: &Workflow, artifact_count: usize) -> u32 {
        let mut score = self.rules.base_score;
        let all_completed = workflow
            .tasks
            .iter()
            .all(|t| t.status == TaskStatus::Completed);
        if all_completed && !workflow.tasks.is_empty() {
            score += self.rules.all_completed_bonus;
        }
        if artifact_count > 0 {
            score += self.rules.artifacts_bonus;
        }
        if review_completed(workflow) {
            score += self.rules.review_bonus;
        }
        if workflow.progress.failed == 0 {
            score += self.rules.no_failure_bonus;
        }
        score.min(100)
    }

    fn risk_level(&self, workflow: &Workflow) -> RiskLevel {
        let directive = workflow.directive.to_lowercase();
        let hits = |tokens: &[String]| tokens.iter().any(|t| directive.contains(t.as_str()));

        let security_flagged = directive.contains("security") || directive.contains("secure");
        if security_flagged && !has_security_task(workflow) {
            return RiskLevel::Critical;
        }
        if hits(&self.rules.high_risk_tokens) {
            RiskLevel::High
        } else if hits(&self.rules.medium_risk_tokens) {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    fn compliance_checks(&self, workflow: &Workflow, artifact_count: usize) -> Vec<ComplianceCheck> {
        let all_terminal = workflow.tasks.iter().all(|t| t.is_terminal());
        let review = review_completed(workflow);
        let directive = workflow.directive.to_lowercase();
        let security_flagged = directive.contains("security") || directive.contains("secure");
        let security_ok = !security_flagged || has_security_task(workflow);

        vec![
            ComplianceCheck {
                name: "all_tasks_terminal".into(),
                passed: all_terminal,
                details: format!(
                    "{} of {} tasks settled",
                    workflow.progress.completed + workflow.progress.failed,
                    workflow.progress.total
                ),
            },
            ComplianceCheck {
                name: "manager_review_completed".into(),
                passed: review,
                details: if review {
                    "review task completed".into()
                } else {
                    "no completed review task".into()
                },
            },
            ComplianceCheck {
                name: "artifacts_captured".into(),
                passed: artifact_count > 0,
                details: format!("{artifact_count} artifacts in the lineage store"),
            },
            ComplianceCheck {
                name: "security_review_present".into(),
                passed: security_ok,
                details: if security_flagged {
                    "directive is security-flagged".into()
                } else {
                    "directive is not security-flagged".into()
                },
            },
        ]
    }
}

fn review_completed(workflow: &Workflow) -> bool {
    workflow
        .tasks
        .iter()
        .any(|t| t.kind == TaskKind::ManagerReview && t.status == TaskStatus::Completed)
}

fn has_security_task(workflow: &Workflow) -> bool {
    workflow.tasks.iter().any(|t| t.agent == "security")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use dirigent_core::Task;

    fn workflow_with(directive: &str, statuses: &[(&str, TaskStatus, TaskKind)]) -> Workflow {
        let mut workflow = Workflow::new(directive);
        let id = workflow.id;
        let tasks = statuses
            .iter()
            .map(|(agent, status, kind)| {
                let mut task = Task::new(id, "t", *agent).with_kind(*kind);
                task.status = *status;
                task
            })
            .collect();
        workflow = workflow.with_tasks(tasks);
        workflow
    }

    #[test]
    fn test_full_marks_for_clean_run() {
        let gate = ApprovalGate::new(ScoringRules::default());
        let workflow = workflow_with(
            "make a landing page",
            &[
                ("frontend", TaskStatus::Completed, TaskKind::Work),
                ("manager", TaskStatus::Completed, TaskKind::ManagerReview),
            ],
        );
        let summary = gate.summarize(&workflow, 3);
        assert_eq!(summary.quality_score, 100);
        assert_eq!(summary.risk_level, RiskLevel::Low);
        assert!(summary.checks.iter().all(|c| c.passed));
    }

    #[test]
    fn test_donation_directive_is_medium_risk() {
        let gate = ApprovalGate::new(ScoringRules::default());
        let workflow = workflow_with(
            "landing page with donation links",
            &[("frontend", TaskStatus::Completed, TaskKind::Work)],
        );
        assert_eq!(gate.summarize(&workflow, 1).risk_level, RiskLevel::Medium);
    }

    #[test]
    fn test_deploy_directive_is_high_risk() {
        let gate = ApprovalGate::new(ScoringRules::default());
        let workflow = workflow_with(
            "deploy the marketing site",
            &[("frontend", TaskStatus::Completed, TaskKind::Work)],
        );
        assert_eq!(gate.summarize(&workflow, 1).risk_level, RiskLevel::High);
    }

    #[test]
    fn test_security_flag_without_specialist_is_critical() {
        let gate = ApprovalGate::new(ScoringRules::default());
        let workflow = workflow_with(
            "build a secure login page",
            &[("frontend", TaskStatus::Completed, TaskKind::Work)],
        );
        let summary = gate.summarize(&workflow, 1);
        assert_eq!(summary.risk_level, RiskLevel::Critical);
        let check = summary
            .checks
            .iter()
            .find(|c| c.name == "security_review_present")
            .unwrap();
        assert!(!check.passed);
    }

    #[test]
    fn test_security_specialist_clears_the_flag() {
        let gate = ApprovalGate::new(ScoringRules::default());
        let workflow = workflow_with(
            "build a secure login page",
            &[
                ("frontend", TaskStatus::Completed, TaskKind::Work),
                ("security", TaskStatus::Completed, TaskKind::Work),
            ],
        );
        let summary = gate.summarize(&workflow, 1);
        assert_ne!(summary.risk_level, RiskLevel::Critical);
        assert!(summary
            .checks
            .iter()
            .find(|c| c.name == "security_review_present")
            .unwrap()
            .passed);
    }

    #[test]
    fn test_failures_cost_points() {
        let gate = ApprovalGate::new(ScoringRules::default());
        let workflow = workflow_with(
            "make a page",
            &[
                ("frontend", TaskStatus::Completed, TaskKind::Work),
                ("backend", TaskStatus::Failed, TaskKind::Work),
            ],
        );
        let summary = gate.summarize(&workflow, 0);
        // base only: no all-completed, no artifacts, no review, failures present.
        assert_eq!(summary.quality_score, ScoringRules::default().base_score);
    }

    #[test]
    fn test_summary_is_deterministic() {
        let gate = ApprovalGate::new(ScoringRules::default());
        let workflow = workflow_with(
            "landing page with donation links",
            &[("frontend", TaskStatus::Completed, TaskKind::Work)],
        );
        let a = gate.summarize(&workflow, 2);
        let b = gate.summarize(&workflow, 2);
        assert_eq!(a.quality_score, b.quality_score);
        assert_eq!(a.risk_level, b.risk_level);
        assert_eq!(a.checks, b.checks);
    }
}
