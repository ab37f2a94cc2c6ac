use dirigent_core::{
    AgentRegistry, ClarifyingQuestion, Complexity, ProjectKind, QuestionForm, QuestionPriority,
};

/// Stable id of the scope question.
pub const Q_SCOPE: &str = "scope";
/// Stable id of the timeline question.
pub const Q_TIMELINE: &str = "timeline";
/// Stable id of the target-users question.
pub const Q_TARGET_USERS: &str = "target_users";
/// Stable id of the key-features question.
pub const Q_KEY_FEATURES: &str = "key_features";
/// Stable id of the reference-files question; its answer is informational only.
pub const Q_REFERENCE_FILES: &str = "reference_files";
/// Stable id of the agent-mismatch question.
pub const Q_AGENT_MISMATCH: &str = "agent_mismatch";

/// Classifies a directive into a [`ProjectKind`] tag.
///
/// The match order is fixed: brainstorm, dashboard, fullstack, website,
/// generic. All downstream dispatch works off the tag, never the raw text.
pub fn classify_kind(directive: &str) -> ProjectKind {
    let lower = directive.to_lowercase();
    let has = |needle: &str| lower.contains(needle);

    if has("brainstorm") || has("idea") {
        ProjectKind::Brainstorm
    } else if has("dashboard") {
        ProjectKind::Dashboard
    } else if has("fullstack") || has("full-stack") || has("full stack") || has("web app") {
        ProjectKind::Fullstack
    } else if has("landing page") || has("website") || has("web site") || has("homepage")
        || has("site") || has("page")
    {
        ProjectKind::Website
    } else {
        ProjectKind::Generic
    }
}

/// Literal facts extracted from the directive: file names, named agents,
/// deadline markers.
pub fn extract_known_facts(directive: &str, roster: &AgentRegistry) -> Vec<String> {
    let mut facts = Vec::new();

    for word in directive.split_whitespace() {
        let trimmed = word.trim_matches(|c: char| !c.is_alphanumeric() && c != '.' && c != '_');
        if let Some((stem, ext)) = trimmed.rsplit_once('.') {
            let ext_ok = !ext.is_empty()
                && ext.len() <= 5
                && ext.chars().all(|c| c.is_ascii_alphanumeric());
            if !stem.is_empty() && ext_ok {
                facts.push(format!("references file '{trimmed}'"));
            }
        }
    }

    for agent in roster.mentioned_in(directive) {
        facts.push(format!("names agent '{agent}'"));
    }

    let lower = directive.to_lowercase();
    for marker in ["deadline", "by friday", "by monday", "today", "tomorrow", "asap", "urgent"] {
        if lower.contains(marker) {
            facts.push(format!("mentions deadline marker '{marker}'"));
        }
    }

    facts
}

/// Default assumptions stated until responses override them.
pub fn default_assumptions() -> Vec<String> {
    vec![
        "scope defaults to prototype".into(),
        "timeline defaults to standard".into(),
    ]
}

/// Things the analysis cannot determine from the directive alone.
pub fn default_unknowns() -> Vec<String> {
    vec!["target users".into(), "acceptance criteria".into()]
}

/// Estimated complexity for a project kind.
pub fn complexity_of(kind: ProjectKind) -> Complexity {
    match kind {
        ProjectKind::Generic => Complexity::Low,
        ProjectKind::Website | ProjectKind::Dashboard | ProjectKind::Brainstorm => {
            Complexity::Medium
        }
        ProjectKind::Fullstack => Complexity::High,
    }
}

/// Feature options offered for a project kind.
fn feature_options(kind: ProjectKind) -> Vec<String> {
    let options: &[&str] = match kind {
        ProjectKind::Website => &[
            "Contact form",
            "Donation system",
            "Photo gallery",
            "Newsletter signup",
        ],
        ProjectKind::Dashboard => &[
            "Live charts",
            "CSV export",
            "Alerting",
            "Role-based views",
        ],
        ProjectKind::Fullstack => &[
            "User accounts",
            "Payments",
            "Admin panel",
            "Public API",
        ],
        ProjectKind::Brainstorm | ProjectKind::Generic => &[],
    };
    options.iter().map(|s| (*s).to_string()).collect()
}

/// Builds the deterministic clarifying-question list for a directive.
///
/// The minimum set is scope, timeline, target users, and reference files; a
/// key-features question appears for kinds that offer options, and a
/// high-priority `agent_mismatch` question when a named agent's
/// specializations do not cover the classified kind.
pub fn clarifying_questions(
    directive: &str,
    kind: ProjectKind,
    roster: &AgentRegistry,
) -> Vec<ClarifyingQuestion> {
    let mut questions = vec![
        ClarifyingQuestion {
            id: Q_SCOPE.into(),
            prompt: "How polished should the result be?".into(),
            required: true,
            priority: QuestionPriority::Normal,
            form: QuestionForm::Choice,
            options: vec![
                "Basic prototype/MVP".into(),
                "Full-featured".into(),
                "Production-ready".into(),
            ],
        },
        ClarifyingQuestion {
            id: Q_TIMELINE.into(),
            prompt: "Is there a deadline?".into(),
            required: true,
            priority: QuestionPriority::Normal,
            form: QuestionForm::Choice,
            options: vec![
                "No specific deadline".into(),
                "Within a week".into(),
                "ASAP".into(),
            ],
        },
        ClarifyingQuestion {
            id: Q_TARGET_USERS.into(),
            prompt: "Who is the intended audience?".into(),
            required: false,
            priority: QuestionPriority::Low,
            form: QuestionForm::Text,
            options: Vec::new(),
        },
    ];

    let features = feature_options(kind);
    if !features.is_empty() {
        questions.push(ClarifyingQuestion {
            id: Q_KEY_FEATURES.into(),
            prompt: "Which features matter most?".into(),
            required: false,
            priority: QuestionPriority::Normal,
            form: QuestionForm::MultiChoice,
            options: features,
        });
    }

    questions.push(ClarifyingQuestion {
        id: Q_REFERENCE_FILES.into(),
        prompt: "Are there existing files to use as reference material?".into(),
        required: false,
        priority: QuestionPriority::Low,
        form: QuestionForm::Text,
        options: Vec::new(),
    });

    if let Some(mismatched) = first_mismatched_agent(directive, kind, roster) {
        questions.push(ClarifyingQuestion {
            id: Q_AGENT_MISMATCH.into(),
            prompt: format!(
                "The directive names agent '{mismatched}', whose specialization does not \
                 cover {kind} work. Keep '{mismatched}', reassign to someone else, or drop \
                 the explicit assignment?"
            ),
            required: true,
            priority: QuestionPriority::High,
            form: QuestionForm::Text,
            options: Vec::new(),
        });
    }

    questions
}

/// The first named agent whose specializations do not cover `kind`.
pub fn first_mismatched_agent(
    directive: &str,
    kind: ProjectKind,
    roster: &AgentRegistry,
) -> Option<String> {
    roster
        .mentioned_in(directive)
        .into_iter()
        .find(|name| roster.by_name(name).is_some_and(|p| !p.covers(kind)))
}

/// The first named agent whose specializations do cover `kind`.
pub fn first_matching_agent(
    directive: &str,
    kind: ProjectKind,
    roster: &AgentRegistry,
) -> Option<String> {
    roster
        .mentioned_in(directive)
        .into_iter()
        .find(|name| roster.by_name(name).is_some_and(|p| p.covers(kind)))
}

/// Normalizes a scope option to its planner token.
pub fn normalize_scope(response: &str) -> String {
    let lower = response.to_lowercase();
    if lower.contains("production") {
        "production".into()
    } else if lower.contains("full-featured") || lower.contains("full featured") {
        "full-featured".into()
    } else {
        "prototype".into()
    }
}

/// Normalizes a timeline option to its planner token.
pub fn normalize_timeline(response: &str) -> String {
    let lower = response.to_lowercase();
    if lower.contains("asap") || lower.contains("24 hours") {
        "urgent".into()
    } else if lower.contains("week") {
        "week".into()
    } else {
        "standard".into()
    }
}
