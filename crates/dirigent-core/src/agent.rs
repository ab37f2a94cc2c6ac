use crate::brief::ProjectKind;
use serde::{Deserialize, Serialize};

/// Role of a worker agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    /// Plans work, reviews results, synthesizes brainstorms.
    Manager,
    /// Produces layouts, styles, and visual assets.
    Designer,
    /// Builds client-side pages and apps.
    Frontend,
    /// Builds APIs and server-side integrations.
    Backend,
    /// Audits output for security issues.
    Security,
    /// Gathers background material and generates ideas.
    Research,
    /// Drafts copy and written deliverables.
    Writer,
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgentRole::Manager => "manager",
            AgentRole::Designer => "designer",
            AgentRole::Frontend => "frontend",
            AgentRole::Backend => "backend",
            AgentRole::Security => "security",
            AgentRole::Research => "research",
            AgentRole::Writer => "writer",
        };
        write!(f, "{s}")
    }
}

/// A named, role-specialized worker owning one workspace directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Unique agent name; also the workspace directory name.
    pub name: String,
    /// The agent's role.
    pub role: AgentRole,
    /// Project kinds this agent is specialized for.
    pub specializations: Vec<ProjectKind>,
}

impl AgentProfile {
    /// Creates a profile.
    pub fn new(name: impl Into<String>, role: AgentRole, specializations: Vec<ProjectKind>) -> Self {
        Self {
            name: name.into(),
            role,
            specializations,
        }
    }

    /// Whether this agent's specializations cover `kind`.
    pub fn covers(&self, kind: ProjectKind) -> bool {
        self.specializations.contains(&kind)
    }
}

/// Ordered registry of agent profiles; iteration order is deterministic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRegistry {
    profiles: Vec<AgentProfile>,
}

impl AgentRegistry {
    /// Builds a registry from an explicit profile list.
    pub fn new(profiles: Vec<AgentProfile>) -> Self {
        Self { profiles }
    }

    /// The default roster used when no custom profiles are configured.
    pub fn default_roster() -> Self {
        use ProjectKind::*;
        Self::new(vec![
            AgentProfile::new(
                "manager",
                AgentRole::Manager,
                vec![Website, Dashboard, Fullstack, Brainstorm, Generic],
            ),
            AgentProfile::new("designer", AgentRole::Designer, vec![Website, Dashboard, Fullstack]),
            AgentProfile::new(
                "frontend",
                AgentRole::Frontend,
                vec![Website, Dashboard, Fullstack],
            ),
            AgentProfile::new("backend", AgentRole::Backend, vec![Website, Dashboard, Fullstack]),
            AgentProfile::new("security", AgentRole::Security, vec![Fullstack]),
            AgentProfile::new("research", AgentRole::Research, vec![Brainstorm, Generic]),
            AgentProfile::new("writer", AgentRole::Writer, vec![Brainstorm, Generic]),
        ])
    }

    /// All profiles, in registry order.
    pub fn profiles(&self) -> &[AgentProfile] {
        &self.profiles
    }

    /// Looks up a profile by name (case-insensitive).
    pub fn by_name(&self, name: &str) -> Option<&AgentProfile> {
        self.profiles
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// The first profile with the given role, in registry order.
    pub fn by_role(&self, role: AgentRole) -> Option<&AgentProfile> {
        self.profiles.iter().find(|p| p.role == role)
    }

    /// Names of agents whose specializations cover `kind`, in registry order.
    pub fn suggested_for(&self, kind: ProjectKind) -> Vec<String> {
        self.profiles
            .iter()
            .filter(|p| p.covers(kind))
            .map(|p| p.name.clone())
            .collect()
    }

    /// Agent names mentioned verbatim in a directive, in registry order.
    pub fn mentioned_in(&self, directive: &str) -> Vec<String> {
        let lower = directive.to_lowercase();
        self.profiles
            .iter()
            .filter(|p| {
                lower
                    .split(|c: char| !c.is_alphanumeric())
                    .any(|word| word == p.name.to_lowercase())
            })
            .map(|p| p.name.clone())
            .collect()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::default_roster()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_roster_has_manager_first() {
        let registry = AgentRegistry::default_roster();
        assert_eq!(registry.profiles()[0].name, "manager");
        assert_eq!(registry.profiles()[0].role, AgentRole::Manager);
    }

    #[test]
    fn test_by_name_is_case_insensitive() {
        let registry = AgentRegistry::default_roster();
        assert!(registry.by_name("Frontend").is_some());
        assert!(registry.by_name("nobody").is_none());
    }

    #[test]
    fn test_suggested_for_website_excludes_security() {
        let registry = AgentRegistry::default_roster();
        let suggested = registry.suggested_for(ProjectKind::Website);
        assert!(suggested.contains(&"designer".to_string()));
        assert!(suggested.contains(&"frontend".to_string()));
        assert!(!suggested.contains(&"security".to_string()));
    }

    #[test]
    fn test_mentioned_in_matches_whole_words() {
        let registry = AgentRegistry::default_roster();
        let mentioned = registry.mentioned_in("Have security review the backend's API");
        assert_eq!(mentioned, vec!["backend".to_string(), "security".to_string()]);
        assert!(registry.mentioned_in("securely handle data").is_empty());
    }

    #[test]
    fn test_covers() {
        let registry = AgentRegistry::default_roster();
        let security = registry.by_name("security").unwrap();
        assert!(security.covers(ProjectKind::Fullstack));
        assert!(!security.covers(ProjectKind::Website));
    }
}
