//! Delegation section of an agent's system prompt.
//!
//! All functions here are pure: the same configuration always yields the
//! same targets and the same text.

use serde::{Deserialize, Serialize};

use crate::config::{AgentsConfig, DelegationPermission};

pub const DELEGATION_SECTION_HEADER: &str = "## Available Agents for Delegation";

/// An agent another agent may hand work to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegationTarget {
    pub name: String,
    pub use_for: String,
}

/// Agents `agent_name` may delegate to, in declaration order.
///
/// `specific` names that no longer resolve are skipped; load-time validation
/// already rejects them, this only tolerates drift at runtime.
pub fn get_delegation_targets(agent_name: &str, config: &AgentsConfig) -> Vec<DelegationTarget> {
    let Some(definition) = config.agent(agent_name) else {
        return Vec::new();
    };

    let allowed = |name: &str| match &definition.delegation_permissions {
        DelegationPermission::All => true,
        DelegationPermission::None => false,
        DelegationPermission::Specific { agents } => agents.iter().any(|a| a == name),
    };

    config
        .agents()
        .iter()
        .filter(|a| a.name != agent_name && allowed(&a.name))
        .map(|a| DelegationTarget {
            name: a.name.clone(),
            use_for: a.use_for.clone(),
        })
        .collect()
}

pub fn format_delegation_section(targets: &[DelegationTarget]) -> String {
    if targets.is_empty() {
        return String::new();
    }

    let mut lines = Vec::with_capacity(targets.len() + 2);
    lines.push(DELEGATION_SECTION_HEADER.to_string());
    for target in targets {
        lines.push(format!("- **{}**: {}", target.name, target.use_for));
    }
    lines.push(format!(
        "Use the delegateWork tool with one of these exact agent names: {}",
        get_enumerated_agent_names(targets).join(", ")
    ));
    lines.join("\n")
}

/// `base` unchanged when there is nobody to delegate to.
pub fn build_system_prompt(base: &str, agent_name: &str, config: &AgentsConfig) -> String {
    let targets = get_delegation_targets(agent_name, config);
    if targets.is_empty() {
        return base.to_string();
    }
    format!("{}\n\n{}", base, format_delegation_section(&targets))
}

pub fn get_enumerated_agent_names(targets: &[DelegationTarget]) -> Vec<String> {
    targets.iter().map(|t| t.name.clone()).collect()
}

/// Opening message for a delegate's conversation.
pub fn render_work_request(from: &str, work_description: &str, report_expectations: &str) -> String {
    format!(
        "You have been delegated work by agent '{from}'.\n\n\
         ## Work\n{work_description}\n\n\
         ## Expected report\n{report_expectations}\n\n\
         When the work is complete, call the reportOut tool with your full report."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentDefinition;

    fn agent(name: &str, use_for: &str) -> AgentDefinition {
        AgentDefinition::new(name, format!("You are {name}."))
            .with_description(name)
            .with_use_for(use_for)
    }

    fn config(coordinator: DelegationPermission) -> AgentsConfig {
        AgentsConfig::new(
            "coordinator",
            vec![
                agent("coordinator", "Planning").with_delegation(coordinator),
                agent("reviewer", "Code review"),
                agent("tester", "Testing"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_all_targets_in_declaration_order() {
        let targets = get_delegation_targets("coordinator", &config(DelegationPermission::all()));
        assert_eq!(
            targets,
            vec![
                DelegationTarget {
                    name: "reviewer".into(),
                    use_for: "Code review".into()
                },
                DelegationTarget {
                    name: "tester".into(),
                    use_for: "Testing".into()
                },
            ]
        );
    }

    #[test]
    fn test_specific_targets_follow_declaration_order() {
        let config = config(DelegationPermission::specific(["tester", "reviewer"]));
        let names = get_enumerated_agent_names(&get_delegation_targets("coordinator", &config));
        assert_eq!(names, ["reviewer", "tester"]);
    }

    #[test]
    fn test_none_and_unknown_agent_yield_nothing() {
        let config = config(DelegationPermission::none());
        assert!(get_delegation_targets("coordinator", &config).is_empty());
        assert!(get_delegation_targets("ghost", &config).is_empty());
    }

    #[test]
    fn test_format_section() {
        let targets = get_delegation_targets("coordinator", &config(DelegationPermission::all()));
        let section = format_delegation_section(&targets);
        assert_eq!(
            section,
            "## Available Agents for Delegation\n\
             - **reviewer**: Code review\n\
             - **tester**: Testing\n\
             Use the delegateWork tool with one of these exact agent names: reviewer, tester"
        );
        assert_eq!(format_delegation_section(&[]), "");
    }

    #[test]
    fn test_build_system_prompt() {
        let all = config(DelegationPermission::all());
        let prompt = build_system_prompt("Base prompt.", "coordinator", &all);
        assert!(prompt.starts_with("Base prompt.\n\n## Available Agents"));

        let none = config(DelegationPermission::none());
        assert_eq!(build_system_prompt("Base prompt.", "coordinator", &none), "Base prompt.");
    }

    #[test]
    fn test_render_work_request() {
        let text = render_work_request("coordinator", "Review module X", "Findings list");
        assert!(text.contains("agent 'coordinator'"));
        assert!(text.contains("Review module X"));
        assert!(text.contains("reportOut"));
    }
}
