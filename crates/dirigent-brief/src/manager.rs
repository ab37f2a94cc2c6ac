use crate::analysis::{
    classify_kind, clarifying_questions, complexity_of, default_assumptions, default_unknowns,
    extract_known_facts, first_matching_agent, first_mismatched_agent, normalize_scope,
    normalize_timeline, Q_AGENT_MISMATCH, Q_KEY_FEATURES, Q_SCOPE, Q_TARGET_USERS, Q_TIMELINE,
};
use chrono::Utc;
use dirigent_core::{
    AgentRegistry, Brief, BriefStatus, DirigentError, DirigentResult, FinalizedBrief,
    QuestionResponse,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

/// Holds in-flight briefs and drives their state machine.
///
/// Status only moves forward: `analyzing → awaiting_responses →
/// ready_for_approval → approved`. Readers receive snapshots; mutation is
/// serialized through the internal lock.
pub struct BriefManager {
    briefs: Arc<RwLock<HashMap<Uuid, Brief>>>,
    roster: AgentRegistry,
}

impl BriefManager {
    /// Creates a manager over the given agent roster.
    pub fn new(roster: AgentRegistry) -> Self {
        Self {
            briefs: Arc::default(),
            roster,
        }
    }

    /// Runs the analysis pass on a directive and stores the resulting brief
    /// in `awaiting_responses`.
    pub async fn analyze(&self, directive: &str, submitter: &str) -> DirigentResult<Brief> {
        let directive = directive.trim();
        if directive.is_empty() {
            return Err(DirigentError::InvalidInput("empty directive".into()));
        }

        let kind = classify_kind(directive);
        let brief = Brief {
            id: Uuid::new_v4(),
            directive: directive.to_string(),
            submitter: submitter.to_string(),
            status: BriefStatus::AwaitingResponses,
            known_facts: extract_known_facts(directive, &self.roster),
            assumptions: default_assumptions(),
            unknowns: default_unknowns(),
            questions: clarifying_questions(directive, kind, &self.roster),
            responses: HashMap::new(),
            suggested_agents: self.roster.suggested_for(kind),
            estimated_complexity: complexity_of(kind),
            finalized: None,
            created_at: Utc::now(),
        };

        info!(
            brief_id = %brief.id,
            kind = %kind,
            questions = brief.questions.len(),
            "directive analyzed"
        );
        self.briefs.write().await.insert(brief.id, brief.clone());
        Ok(brief)
    }

    /// A snapshot of one brief.
    pub async fn get(&self, brief_id: Uuid) -> DirigentResult<Brief> {
        self.briefs
            .read()
            .await
            .get(&brief_id)
            .cloned()
            .ok_or_else(|| DirigentError::InvalidInput(format!("unknown brief {brief_id}")))
    }

    /// Records a response against a question id and recomputes the status.
    pub async fn record_response(
        &self,
        brief_id: Uuid,
        question_id: &str,
        response: &str,
    ) -> DirigentResult<Brief> {
        let mut briefs = self.briefs.write().await;
        let brief = briefs
            .get_mut(&brief_id)
            .ok_or_else(|| DirigentError::InvalidInput(format!("unknown brief {brief_id}")))?;

        if brief.status == BriefStatus::Approved {
            return Err(DirigentError::InvalidInput(
                "brief is already approved".into(),
            ));
        }
        if brief.question(question_id).is_none() {
            return Err(DirigentError::InvalidInput(format!(
                "brief {brief_id} has no question '{question_id}'"
            )));
        }

        brief.responses.insert(
            question_id.to_string(),
            QuestionResponse {
                response: response.to_string(),
                at: Utc::now(),
            },
        );
        if brief.all_required_answered() {
            brief.status = BriefStatus::ReadyForApproval;
        }
        Ok(brief.clone())
    }

    /// Finalizes a brief; fails `Unresolved` while a required question is
    /// unanswered.
    pub async fn finalize(&self, brief_id: Uuid) -> DirigentResult<FinalizedBrief> {
        let mut briefs = self.briefs.write().await;
        let brief = briefs
            .get_mut(&brief_id)
            .ok_or_else(|| DirigentError::InvalidInput(format!("unknown brief {brief_id}")))?;

        if let Some(finalized) = &brief.finalized {
            return Ok(finalized.clone());
        }
        if let Some(open) = brief.unanswered_required().first() {
            return Err(DirigentError::Unresolved {
                question: open.id.clone(),
                detail: open.prompt.clone(),
            });
        }

        let kind = classify_kind(&brief.directive);
        let (requested_agent, agent_explicit) = resolve_agent_request(brief, &self.roster);
        let finalized = FinalizedBrief {
            directive: brief.directive.clone(),
            kind,
            scope: normalize_scope(brief.response(Q_SCOPE).unwrap_or("")),
            timeline: normalize_timeline(brief.response(Q_TIMELINE).unwrap_or("")),
            key_features: brief
                .response(Q_KEY_FEATURES)
                .map(parse_feature_list)
                .unwrap_or_default(),
            target_users: brief
                .response(Q_TARGET_USERS)
                .unwrap_or("general audience")
                .to_string(),
            suggested_agents: brief.suggested_agents.clone(),
            requested_agent,
            agent_explicit,
        };

        brief.status = BriefStatus::Approved;
        brief.finalized = Some(finalized.clone());
        info!(brief_id = %brief_id, kind = %finalized.kind, "brief finalized");
        Ok(finalized)
    }
}

/// Reads the `agent_mismatch` response (when present) and normalizes the
/// explicit agent request to exactly one of: keep the originally named
/// agent, reassign to the first named candidate, or clear the request.
fn resolve_agent_request(brief: &Brief, roster: &AgentRegistry) -> (Option<String>, bool) {
    let kind = classify_kind(&brief.directive);

    if brief.question(Q_AGENT_MISMATCH).is_some() {
        let original = first_mismatched_agent(&brief.directive, kind, roster);
        let response = brief.response(Q_AGENT_MISMATCH).unwrap_or("");
        let lower = response.to_lowercase();
        if lower.contains("keep") {
            return (original, true);
        }
        if lower.starts_with("reassign") {
            // Candidates are taken verbatim from the raw response so their
            // capitalization survives normalization.
            let raw = response.get("reassign".len()..).unwrap_or("").trim_start();
            let raw = match raw.get(..3) {
                Some(prefix) if prefix.eq_ignore_ascii_case("to ") => &raw[3..],
                _ => raw,
            };
            if let Some(first) = raw
                .split([',', ';'])
                .flat_map(|chunk| chunk.split(" and "))
                .map(str::trim)
                .find(|candidate| !candidate.is_empty())
            {
                return (Some(first.to_string()), true);
            }
        }
        return (None, false);
    }

    match first_matching_agent(&brief.directive, kind, roster) {
        Some(agent) => (Some(agent), true),
        None => (None, false),
    }
}

fn parse_feature_list(response: &str) -> Vec<String> {
    response
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(String::from)
        .collect()
}
