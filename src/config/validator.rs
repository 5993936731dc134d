//! Configuration Validation Layer
//!
//! Validates agent definitions before use. Validation is not fail-fast: every
//! discoverable problem is collected and returned together.

use std::collections::{HashMap, HashSet};

use super::definition::{AgentDefinition, is_valid_identifier};
use super::{ConfigError, ConfigResult, ConfigWarning, ValidationErrors};

#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validates and returns non-fatal warnings on success.
    pub fn validate(
        &self,
        entry_agent: Option<&str>,
        agents: &[AgentDefinition],
    ) -> ConfigResult<Vec<ConfigWarning>> {
        let errors = self.collect_errors(agents);
        if errors.is_empty() {
            Ok(self.warnings(entry_agent, agents))
        } else {
            Err(ConfigError::ValidationErrors(ValidationErrors(errors)))
        }
    }

    pub fn validate_partial(&self, agents: &[AgentDefinition]) -> Vec<ConfigError> {
        self.collect_errors(agents)
    }

    pub fn warnings(&self, entry_agent: Option<&str>, agents: &[AgentDefinition]) -> Vec<ConfigWarning> {
        let Some(first) = agents.first() else {
            return Vec::new();
        };
        match entry_agent.filter(|e| !e.trim().is_empty()) {
            Some(requested) if !agents.iter().any(|a| a.name == requested) => {
                vec![ConfigWarning::EntryAgentFallback {
                    requested: requested.to_string(),
                    fallback: first.name.clone(),
                }]
            }
            _ => Vec::new(),
        }
    }

    fn collect_errors(&self, agents: &[AgentDefinition]) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if agents.is_empty() {
            errors.push(ConfigError::NoAgents);
            return errors;
        }

        let mut seen: HashSet<&str> = HashSet::new();
        let mut reported: HashSet<&str> = HashSet::new();

        for (idx, agent) in agents.iter().enumerate() {
            let label = agent_label(idx, agent);
            check_fields(idx, &label, agent, &mut errors);

            if !agent.name.is_empty()
                && !seen.insert(agent.name.as_str())
                && reported.insert(agent.name.as_str())
            {
                errors.push(ConfigError::DuplicateAgent {
                    name: agent.name.clone(),
                });
            }

            if let Some(entries) = agent.delegation_permissions.specific_entries() {
                check_entries(
                    &format!("agents[{idx}].delegationPermissions"),
                    entries,
                    &mut errors,
                );
            }
            if let Some(entries) = agent.tool_permissions.specific_entries() {
                check_entries(
                    &format!("agents[{idx}].toolPermissions"),
                    entries,
                    &mut errors,
                );
            }
        }

        for agent in agents {
            let Some(targets) = agent.delegation_permissions.specific_entries() else {
                continue;
            };
            let mut checked: HashSet<&str> = HashSet::new();
            for target in targets {
                if is_valid_identifier(target)
                    && checked.insert(target.as_str())
                    && !seen.contains(target.as_str())
                {
                    errors.push(ConfigError::UnknownDelegationTarget {
                        agent: agent.name.clone(),
                        target: target.clone(),
                    });
                }
            }
        }

        for cycle in find_cycles(agents) {
            errors.push(ConfigError::CircularDelegation { cycle });
        }

        errors
    }
}

fn agent_label(idx: usize, agent: &AgentDefinition) -> String {
    if agent.name.is_empty() {
        format!("#{idx}")
    } else {
        format!("'{}'", agent.name)
    }
}

fn check_fields(idx: usize, label: &str, agent: &AgentDefinition, errors: &mut Vec<ConfigError>) {
    if agent.name.is_empty() {
        errors.push(ConfigError::MissingField {
            agent: label.to_string(),
            field: "name",
        });
    } else if !is_valid_identifier(&agent.name) {
        errors.push(ConfigError::InvalidValue {
            key: format!("agents[{idx}].name"),
            message: format!(
                "'{}' must be 1-50 characters of letters, digits, '_' or '-'",
                agent.name
            ),
        });
    }

    let required = [
        ("systemPrompt", &agent.system_prompt),
        ("description", &agent.description),
        ("useFor", &agent.use_for),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            errors.push(ConfigError::MissingField {
                agent: label.to_string(),
                field,
            });
        }
    }
}

fn check_entries(key: &str, entries: &[String], errors: &mut Vec<ConfigError>) {
    if entries.is_empty() {
        errors.push(ConfigError::EmptyPermissionSet {
            key: key.to_string(),
        });
        return;
    }

    let mut seen: HashSet<&str> = HashSet::new();
    let mut reported: HashSet<&str> = HashSet::new();
    for entry in entries {
        if !is_valid_identifier(entry) {
            errors.push(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("'{}' is not a valid identifier", entry),
            });
        } else if !seen.insert(entry.as_str()) && reported.insert(entry.as_str()) {
            errors.push(ConfigError::DuplicatePermissionEntry {
                key: key.to_string(),
                entry: entry.clone(),
            });
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    Unvisited,
    OnStack,
    Done,
}

struct CycleSearch<'a> {
    agents: &'a [AgentDefinition],
    edges: Vec<Vec<usize>>,
    state: Vec<Visit>,
    stack: Vec<usize>,
    seen: HashSet<Vec<String>>,
    cycles: Vec<Vec<String>>,
}

impl CycleSearch<'_> {
    fn visit(&mut self, node: usize) {
        self.state[node] = Visit::OnStack;
        self.stack.push(node);

        for i in 0..self.edges[node].len() {
            let next = self.edges[node][i];
            match self.state[next] {
                Visit::Unvisited => self.visit(next),
                Visit::OnStack => self.record(next),
                Visit::Done => {}
            }
        }

        self.stack.pop();
        self.state[node] = Visit::Done;
    }

    fn record(&mut self, back_to: usize) {
        let Some(pos) = self.stack.iter().position(|&n| n == back_to) else {
            return;
        };
        let members: Vec<String> = self.stack[pos..]
            .iter()
            .map(|&n| self.agents[n].name.clone())
            .collect();

        // Same cycle entered from a different node is reported once.
        let mut key = members.clone();
        if let Some(min_idx) = key
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.cmp(b.1))
            .map(|(i, _)| i)
        {
            key.rotate_left(min_idx);
        }
        if self.seen.insert(key) {
            let mut cycle = members;
            cycle.push(self.agents[back_to].name.clone());
            self.cycles.push(cycle);
        }
    }
}

/// Depth-first search over `specific` delegation edges only.
///
/// `all` and `none` contribute no edges. Each cycle is returned closed, e.g.
/// `["a", "b", "a"]`.
pub fn find_cycles(agents: &[AgentDefinition]) -> Vec<Vec<String>> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    for (i, agent) in agents.iter().enumerate() {
        index.entry(agent.name.as_str()).or_insert(i);
    }

    let edges = agents
        .iter()
        .map(|agent| {
            let mut targets: Vec<usize> = Vec::new();
            for target in agent
                .delegation_permissions
                .specific_entries()
                .unwrap_or_default()
            {
                if let Some(&t) = index.get(target.as_str())
                    && !targets.contains(&t)
                {
                    targets.push(t);
                }
            }
            targets
        })
        .collect();

    let mut search = CycleSearch {
        agents,
        edges,
        state: vec![Visit::Unvisited; agents.len()],
        stack: Vec::new(),
        seen: HashSet::new(),
        cycles: Vec::new(),
    };

    for start in 0..agents.len() {
        if search.state[start] == Visit::Unvisited {
            search.visit(start);
        }
    }

    search.cycles
}
