//! Serializable snapshot of a resolved rule graph.
//!
//! `mast plan` emits this as JSON so other tools can inspect what a build
//! would run without running it.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::graph::RuleSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildPlan {
    pub configuration: String,
    pub rules: Vec<PlannedRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedRule {
    pub target: String,
    pub active: bool,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub command: Vec<String>,
    pub message: Vec<String>,
    /// Indices into `rules` of the rules this one waits for.
    pub dependencies: Vec<usize>,
}

impl BuildPlan {
    pub fn from_rule_set(configuration: &str, set: &RuleSet) -> Self {
        let rules = set
            .rules
            .iter()
            .map(|rule| PlannedRule {
                target: set.targets[rule.target].name.clone(),
                active: set.targets[rule.target].active,
                inputs: rule.inputs.clone(),
                outputs: rule.outputs.clone(),
                command: rule.command.clone(),
                message: rule.message.clone(),
                dependencies: rule.dependencies.clone(),
            })
            .collect();
        BuildPlan {
            configuration: configuration.to_string(),
            rules,
        }
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize build plan")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::graph::Rule;

    #[test]
    fn test_plan_snapshot() {
        let mut set = RuleSet::default();
        let t = set.add_target("app".into(), true);
        set.add_rule(Rule {
            target: t,
            inputs: vec!["a.c".into()],
            outputs: vec!["a.o".into()],
            command: vec!["cc".into(), "-c".into(), "a.c".into()],
            message: vec!["a.c".into()],
            ..Rule::default()
        });
        set.add_rule(Rule {
            target: t,
            inputs: vec!["a.o".into()],
            outputs: vec!["app".into()],
            command: vec!["cc".into(), "-o".into(), "app".into()],
            ..Rule::default()
        });
        set.resolve_dependencies();

        let plan = BuildPlan::from_rule_set("Debug", &set);
        assert_eq!(plan.configuration, "Debug");
        assert_eq!(plan.rules.len(), 2);
        assert_eq!(plan.rules[1].dependencies, vec![0]);

        let json = plan.to_json_pretty().unwrap();
        let parsed: BuildPlan = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.rules[0].target, "app");
        assert_eq!(parsed.rules[0].command, vec!["cc", "-c", "a.c"]);
    }
}
