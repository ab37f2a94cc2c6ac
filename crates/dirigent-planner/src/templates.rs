use dirigent_core::{AgentRegistry, AgentRole, FinalizedBrief, ProjectKind, Task};
use uuid::Uuid;

/// Turns a directive into a filesystem-safe slug for generated file names.
pub(crate) fn slug_of(directive: &str) -> String {
    let mut slug: String = directive
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    while slug.contains("--") {
        slug = slug.replace("--", "-");
    }
    let slug = slug.trim_matches('-');
    let mut cut = slug.len().min(40);
    while !slug.is_char_boundary(cut) {
        cut -= 1;
    }
    let short = &slug[..cut];
    if short.is_empty() {
        "directive".into()
    } else {
        short.to_string()
    }
}

fn agent_named(roster: &AgentRegistry, role: AgentRole) -> String {
    roster
        .by_role(role)
        .map(|p| p.name.clone())
        .unwrap_or_else(|| role.to_string())
}

fn wants_donation(brief: &FinalizedBrief) -> bool {
    brief
        .key_features
        .iter()
        .any(|f| f.to_lowercase().contains("donation"))
        || brief.directive.to_lowercase().contains("donation")
}

fn security_flagged(brief: &FinalizedBrief) -> bool {
    let lower = brief.directive.to_lowercase();
    lower.contains("security") || lower.contains("secure") || brief.scope == "production"
}

/// Number of brainstorm ideas requested; the first small integer in the
/// directive, clamped to 3..=6, defaulting to 3.
fn idea_count(brief: &FinalizedBrief) -> usize {
    brief
        .directive
        .split_whitespace()
        .find_map(|w| w.parse::<usize>().ok())
        .map(|n| n.clamp(3, 6))
        .unwrap_or(3)
}

/// Builds the fixed topology for the brief's project kind.
///
/// Tasks come back in topological order with dependency edges wired and
/// synthetic command lists that produce the template's deliverable files.
pub(crate) fn instantiate(
    workflow_id: Uuid,
    brief: &FinalizedBrief,
    roster: &AgentRegistry,
) -> Vec<Task> {
    match brief.kind {
        ProjectKind::Website => website(workflow_id, brief, roster),
        ProjectKind::Dashboard => dashboard(workflow_id, brief, roster),
        ProjectKind::Fullstack => fullstack(workflow_id, brief, roster),
        ProjectKind::Brainstorm => brainstorm(workflow_id, brief, roster),
        ProjectKind::Generic => generic(workflow_id, brief, roster),
    }
}

/// The agent that should own a template's main build task, honoring an
/// explicit request when the roster knows the name.
fn build_agent(brief: &FinalizedBrief, roster: &AgentRegistry, default: String) -> String {
    if brief.agent_explicit {
        if let Some(requested) = &brief.requested_agent {
            if let Some(profile) = roster.by_name(requested) {
                return profile.name.clone();
            }
        }
    }
    default
}

fn plan_task(workflow_id: Uuid, brief: &FinalizedBrief, manager: &str) -> Task {
    let slug = slug_of(&brief.directive);
    Task::new(workflow_id, "Plan the work", manager)
        .with_description(format!("Break down the directive: {}", brief.directive))
        .with_commands(vec![
            "mkdir -p plans".into(),
            format!("printf '%s\\n' '# Plan' 'kind: {}' 'scope: {}' > plans/{slug}.md", brief.kind, brief.scope),
        ])
}

fn website(workflow_id: Uuid, brief: &FinalizedBrief, roster: &AgentRegistry) -> Vec<Task> {
    let manager = agent_named(roster, AgentRole::Manager);
    let designer = agent_named(roster, AgentRole::Designer);
    let frontend = build_agent(brief, roster, agent_named(roster, AgentRole::Frontend));
    let backend = agent_named(roster, AgentRole::Backend);
    let security = agent_named(roster, AgentRole::Security);
    let slug = slug_of(&brief.directive);

    let plan = plan_task(workflow_id, brief, &manager);
    let plan_id = plan.id;

    let design = Task::new(workflow_id, "Design the page", &designer)
        .with_description("Produce layout and visual direction for the site".to_string())
        .with_commands(vec![
            "mkdir -p design".into(),
            format!("printf '%s\\n' ':root {{ --brand: #2a6f4e; }}' > design/{slug}-palette.css"),
        ])
        .with_dependencies(vec![plan_id]);
    let design_id = design.id;

    let build = Task::new(workflow_id, "Build the frontend", &frontend)
        .with_description("Implement the landing page from the design".to_string())
        .with_commands(vec![
            "mkdir -p site".into(),
            format!(
                "printf '%s\\n' '<!doctype html>' '<html><head><link rel=\"stylesheet\" href=\"styles.css\"></head>' '<body><h1>{slug}</h1></body></html>' > site/index.html"
            ),
            "printf '%s\\n' 'body { font-family: sans-serif; margin: 2rem; }' > site/styles.css"
                .into(),
        ])
        .with_dependencies(vec![design_id]);
    let build_id = build.id;

    let mut tasks = vec![plan, design, build];
    let mut tail_ids = vec![build_id];

    if wants_donation(brief) {
        let donation = Task::new(workflow_id, "Wire the donation flow", &backend)
            .with_description("Add the donation endpoint and link it from the page".to_string())
            .with_commands(vec![
                "mkdir -p api".into(),
                "printf '%s\\n' 'POST /donate -> provider checkout' > api/donations.md".into(),
            ])
            .with_dependencies(vec![build_id]);
        tail_ids.push(donation.id);
        tasks.push(donation);
    }

    if security_flagged(brief) {
        let audit = Task::new(workflow_id, "Security pass", &security)
            .with_description("Audit the page and donation flow before anything ships".to_string())
            .with_commands(vec![
                "mkdir -p audits".into(),
                format!("printf '%s\\n' 'no findings' > audits/{slug}.md"),
            ])
            .with_dependencies(tail_ids.clone());
        let audit_id = audit.id;
        tasks.push(audit);

        if brief.scope == "production" {
            let deploy = Task::new(workflow_id, "Deploy the site", &backend)
                .with_description("Publish the reviewed build".to_string())
                .with_commands(vec![
                    "mkdir -p releases".into(),
                    format!("printf '%s\\n' 'released {slug}' > releases/{slug}.txt"),
                ])
                .with_dependencies(vec![audit_id]);
            tasks.push(deploy);
        }
    }

    tasks
}

fn dashboard(workflow_id: Uuid, brief: &FinalizedBrief, roster: &AgentRegistry) -> Vec<Task> {
    let manager = agent_named(roster, AgentRole::Manager);
    let backend = agent_named(roster, AgentRole::Backend);
    let frontend = build_agent(brief, roster, agent_named(roster, AgentRole::Frontend));
    let slug = slug_of(&brief.directive);

    let plan = plan_task(workflow_id, brief, &manager);
    let plan_id = plan.id;

    let api = Task::new(workflow_id, "Build the backend API", &backend)
        .with_description("Expose the data the dashboard will chart".to_string())
        .with_commands(vec![
            "mkdir -p api".into(),
            format!("printf '%s\\n' 'GET /metrics' > api/{slug}.md"),
        ])
        .with_dependencies(vec![plan_id]);
    let api_id = api.id;

    let ui = Task::new(workflow_id, "Build the dashboard UI", &frontend)
        .with_description("Render the charts against the API".to_string())
        .with_commands(vec![
            "mkdir -p site".into(),
            "printf '%s\\n' '<!doctype html>' '<html><body><main id=\"charts\"></main></body></html>' > site/index.html".into(),
            "printf '%s\\n' '#charts { display: grid; }' > site/styles.css".into(),
        ])
        .with_dependencies(vec![api_id]);

    vec![plan, api, ui]
}

fn fullstack(workflow_id: Uuid, brief: &FinalizedBrief, roster: &AgentRegistry) -> Vec<Task> {
    let manager = agent_named(roster, AgentRole::Manager);
    let designer = agent_named(roster, AgentRole::Designer);
    let backend = agent_named(roster, AgentRole::Backend);
    let frontend = agent_named(roster, AgentRole::Frontend);
    let security = agent_named(roster, AgentRole::Security);
    let slug = slug_of(&brief.directive);

    let plan = plan_task(workflow_id, brief, &manager);
    let plan_id = plan.id;

    let design = Task::new(workflow_id, "Design the application", &designer)
        .with_commands(vec![
            "mkdir -p design".into(),
            format!("printf '%s\\n' 'screens: home, detail' > design/{slug}.md"),
        ])
        .with_dependencies(vec![plan_id]);
    let design_id = design.id;

    let api = Task::new(workflow_id, "Build the backend", &backend)
        .with_commands(vec![
            "mkdir -p api".into(),
            format!("printf '%s\\n' 'service skeleton' > api/{slug}.md"),
        ])
        .with_dependencies(vec![plan_id]);
    let api_id = api.id;

    let ui = Task::new(workflow_id, "Build the frontend", &frontend)
        .with_commands(vec![
            "mkdir -p site".into(),
            "printf '%s\\n' '<!doctype html>' '<html><body>app shell</body></html>' > site/index.html".into(),
            "printf '%s\\n' 'body { margin: 0; }' > site/styles.css".into(),
        ])
        .with_dependencies(vec![design_id, api_id]);
    let ui_id = ui.id;

    let audit = Task::new(workflow_id, "Security pass", &security)
        .with_commands(vec![
            "mkdir -p audits".into(),
            format!("printf '%s\\n' 'no findings' > audits/{slug}.md"),
        ])
        .with_dependencies(vec![api_id]);
    let audit_id = audit.id;

    let deploy = Task::new(workflow_id, "Deploy", &backend)
        .with_commands(vec![
            "mkdir -p releases".into(),
            format!("printf '%s\\n' 'released' > releases/{slug}.txt"),
        ])
        .with_dependencies(vec![ui_id, audit_id]);

    vec![plan, design, api, ui, audit, deploy]
}

fn brainstorm(workflow_id: Uuid, brief: &FinalizedBrief, roster: &AgentRegistry) -> Vec<Task> {
    let manager = agent_named(roster, AgentRole::Manager);
    let slug = slug_of(&brief.directive);

    let plan = plan_task(workflow_id, brief, &manager);
    let plan_id = plan.id;
    let mut tasks = vec![plan];

    let idea_agents: Vec<String> = roster
        .profiles()
        .iter()
        .filter(|p| p.role != AgentRole::Manager)
        .map(|p| p.name.clone())
        .take(idea_count(brief))
        .collect();

    let mut idea_ids = Vec::new();
    for (index, agent) in idea_agents.iter().enumerate() {
        let idea = Task::new(workflow_id, format!("Idea {}", index + 1), agent)
            .with_description(format!("Propose an angle on: {}", brief.directive))
            .with_commands(vec![
                "mkdir -p ideas".into(),
                format!("printf '%s\\n' 'idea {} for {slug}' > ideas/idea-{}.md", index + 1, index + 1),
            ])
            .with_dependencies(vec![plan_id]);
        idea_ids.push(idea.id);
        tasks.push(idea);
    }

    let synthesis = Task::new(workflow_id, "Synthesize the ideas", &manager)
        .with_description("Merge the proposals into one recommendation".to_string())
        .with_commands(vec![
            "mkdir -p synthesis".into(),
            format!("printf '%s\\n' 'recommendation for {slug}' > synthesis/{slug}.md"),
        ])
        .with_dependencies(idea_ids);
    tasks.push(synthesis);

    tasks
}

fn generic(workflow_id: Uuid, brief: &FinalizedBrief, roster: &AgentRegistry) -> Vec<Task> {
    let manager = agent_named(roster, AgentRole::Manager);
    let worker = build_agent(brief, roster, agent_named(roster, AgentRole::Research));
    let slug = slug_of(&brief.directive);

    let plan = plan_task(workflow_id, brief, &manager);
    let plan_id = plan.id;

    let execute = Task::new(workflow_id, "Execute the directive", &worker)
        .with_description(brief.directive.clone())
        .with_commands(vec![
            "mkdir -p output".into(),
            format!("printf '%s\\n' 'done: {slug}' > output/{slug}.md"),
        ])
        .with_dependencies(vec![plan_id]);

    vec![plan, execute]
}
