use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Project kind inferred from a directive.
///
/// Template selection in the planner dispatches on this tag; nothing else in
/// the engine string-matches on the directive after classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectKind {
    /// A static site or landing page.
    Website,
    /// A data dashboard backed by an API.
    Dashboard,
    /// A full application: design, backend, frontend, security, deploy.
    Fullstack,
    /// Idea generation across several agents with a synthesis step.
    Brainstorm,
    /// Anything that matched no specific template.
    Generic,
}

impl std::fmt::Display for ProjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProjectKind::Website => "website",
            ProjectKind::Dashboard => "dashboard",
            ProjectKind::Fullstack => "fullstack",
            ProjectKind::Brainstorm => "brainstorm",
            ProjectKind::Generic => "generic",
        };
        write!(f, "{s}")
    }
}

/// Status of an in-flight brief. Advances forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BriefStatus {
    /// The analysis pass is running.
    Analyzing,
    /// Clarifying questions are waiting for operator responses.
    AwaitingResponses,
    /// Every required question has a recorded response.
    ReadyForApproval,
    /// Finalized; a workflow may be created from it.
    Approved,
}

/// How a clarifying question expects to be answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionForm {
    /// Pick exactly one of the listed options.
    Choice,
    /// Pick any subset of the listed options.
    MultiChoice,
    /// Free text.
    Text,
}

/// Priority of a clarifying question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionPriority {
    /// Nice to know.
    Low,
    /// Default.
    Normal,
    /// Blocks workflow creation until answered.
    High,
}

/// A single clarifying question produced by the analysis pass.
///
/// Question ids are stable strings (`scope`, `timeline`, `agent_mismatch`, ...)
/// so responses can be recorded against them deterministically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClarifyingQuestion {
    /// Stable question id.
    pub id: String,
    /// The prompt shown to the operator.
    pub prompt: String,
    /// Whether finalization requires a response.
    pub required: bool,
    /// Question priority.
    pub priority: QuestionPriority,
    /// Expected response form.
    pub form: QuestionForm,
    /// Options for choice-form questions.
    pub options: Vec<String>,
}

/// A recorded response to a clarifying question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionResponse {
    /// The raw response text (an option label or free text).
    pub response: String,
    /// When the response was recorded.
    pub at: DateTime<Utc>,
}

/// Estimated complexity of the directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    /// One or two tasks.
    Low,
    /// A small DAG.
    Medium,
    /// A multi-branch DAG with several agents.
    High,
}

/// The clarified, finalized form of a directive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizedBrief {
    /// The original directive text.
    pub directive: String,
    /// Classified project kind.
    pub kind: ProjectKind,
    /// Chosen scope (e.g. "prototype", "production").
    pub scope: String,
    /// Chosen timeline (e.g. "standard", "urgent").
    pub timeline: String,
    /// Key features selected by the operator.
    pub key_features: Vec<String>,
    /// Intended audience.
    pub target_users: String,
    /// Agents the analysis suggests for this kind of work.
    pub suggested_agents: Vec<String>,
    /// Agent explicitly requested in the directive, after mismatch resolution.
    pub requested_agent: Option<String>,
    /// True when `requested_agent` came from the operator, not the analysis.
    pub agent_explicit: bool,
}

/// In-flight intent analysis of a directive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Brief {
    /// Unique brief id.
    pub id: Uuid,
    /// The original directive.
    pub directive: String,
    /// Who submitted the directive.
    pub submitter: String,
    /// Current status; advances forward only.
    pub status: BriefStatus,
    /// Literal facts extracted from the directive.
    pub known_facts: Vec<String>,
    /// Defaults assumed until a response overrides them.
    pub assumptions: Vec<String>,
    /// Things the analysis could not determine.
    pub unknowns: Vec<String>,
    /// Clarifying questions, in deterministic order.
    pub questions: Vec<ClarifyingQuestion>,
    /// Responses recorded so far, keyed by question id.
    pub responses: HashMap<String, QuestionResponse>,
    /// Agents suggested for the classified kind.
    pub suggested_agents: Vec<String>,
    /// Estimated complexity.
    pub estimated_complexity: Complexity,
    /// Set once the brief is approved.
    pub finalized: Option<FinalizedBrief>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Brief {
    /// Looks up a question by its stable id.
    pub fn question(&self, id: &str) -> Option<&ClarifyingQuestion> {
        self.questions.iter().find(|q| q.id == id)
    }

    /// The recorded response for a question id, if any.
    pub fn response(&self, question_id: &str) -> Option<&str> {
        self.responses.get(question_id).map(|r| r.response.as_str())
    }

    /// Required questions that do not yet have a recorded response.
    pub fn unanswered_required(&self) -> Vec<&ClarifyingQuestion> {
        self.questions
            .iter()
            .filter(|q| q.required && !self.responses.contains_key(&q.id))
            .collect()
    }

    /// True when every required question has a response.
    pub fn all_required_answered(&self) -> bool {
        self.unanswered_required().is_empty()
    }
}
