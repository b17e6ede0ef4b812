//! Rule graph: arenas of targets and rules, dependency resolution.
//!
//! Rules and targets live in flat vectors and point at each other with
//! integer indices. Dependencies are inferred by matching a rule's input
//! paths against other rules' declared outputs; every dependency edge is
//! mirrored by a propagation edge on the producing rule so completions can
//! be pushed forward without searching.

use std::collections::HashMap;
use std::time::SystemTime;

pub type RuleId = usize;
pub type TargetId = usize;

/// Lifecycle of a rule inside one scheduler run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuleState {
    /// Waiting for dependencies to finish.
    #[default]
    Pending,
    /// All dependencies finished; queued for execution.
    Ready,
    /// A process is running for this rule.
    Running,
    /// Completed, successfully or by being up to date.
    Finished,
    /// The command exited non-zero or could not be started.
    Failed,
}

#[derive(Debug, Default)]
pub struct Rule {
    pub target: TargetId,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub command: Vec<String>,
    pub message: Vec<String>,
    /// Rules whose outputs feed this rule.
    pub dependencies: Vec<RuleId>,
    /// Rules consuming this rule's outputs (mirror of `dependencies`).
    pub propagations: Vec<RuleId>,
    pub finished_dependencies: usize,
    /// Set once the rule is determined stale; consumers treat a rebuilt
    /// dependency as staleness regardless of timestamps.
    pub rebuild: bool,
    pub state: RuleState,
}

#[derive(Debug, Default)]
pub struct Target {
    pub name: String,
    pub rules: Vec<RuleId>,
    pub active: bool,
}

#[derive(Debug, Default)]
pub struct RuleSet {
    pub targets: Vec<Target>,
    pub rules: Vec<Rule>,
    /// Targets selected for building, in activation order.
    pub active_targets: Vec<TargetId>,
    /// Rules belonging to active targets.
    pub active_rules: usize,
    pub finished_rules: usize,
}

impl RuleSet {
    pub fn add_target(&mut self, name: String, active: bool) -> TargetId {
        let id = self.targets.len();
        self.targets.push(Target {
            name,
            rules: Vec::new(),
            active,
        });
        if active {
            self.active_targets.push(id);
        }
        id
    }

    pub fn add_rule(&mut self, mut rule: Rule) -> RuleId {
        let id = self.rules.len();
        let target = rule.target;
        rule.dependencies.clear();
        rule.propagations.clear();
        self.rules.push(rule);
        self.targets[target].rules.push(id);
        id
    }

    /// Wire dependency edges and activate every target an active target
    /// transitively depends on.
    ///
    /// Outputs of all targets, active or not, take part in matching; a
    /// duplicate producer for the same output is a warning and the first
    /// registration wins. Self-dependencies are dropped with a warning.
    pub fn resolve_dependencies(&mut self) {
        let mut producer: HashMap<String, RuleId> = HashMap::new();
        for (id, rule) in self.rules.iter().enumerate() {
            let target = &self.targets[rule.target].name;
            if rule.outputs.is_empty() {
                tracing::warn!("target `{}`: rule declares no output", target);
            }
            if rule.command.is_empty() {
                tracing::warn!("target `{}`: rule declares no command", target);
            }
            for output in &rule.outputs {
                if producer.contains_key(output) {
                    tracing::warn!(
                        "target `{}`: output `{}` is already produced by another rule",
                        target,
                        output
                    );
                    continue;
                }
                producer.insert(output.clone(), id);
            }
        }

        // Worklist over active targets: linking an inactive producer
        // activates its whole target, whose rules are then processed too.
        let mut next = 0;
        while next < self.active_targets.len() {
            let target = self.active_targets[next];
            next += 1;
            for rule_id in self.targets[target].rules.clone() {
                self.active_rules += 1;
                for input in self.rules[rule_id].inputs.clone() {
                    let Some(&dep) = producer.get(&input) else {
                        continue;
                    };
                    if dep == rule_id {
                        tracing::warn!(
                            "target `{}`: rule depends on its own output `{}`",
                            self.targets[target].name,
                            input
                        );
                        continue;
                    }
                    let dep_target = self.rules[dep].target;
                    if !self.targets[dep_target].active {
                        self.targets[dep_target].active = true;
                        self.active_targets.push(dep_target);
                    }
                    if !self.rules[rule_id].dependencies.contains(&dep) {
                        self.rules[rule_id].dependencies.push(dep);
                    }
                    if !self.rules[dep].propagations.contains(&rule_id) {
                        self.rules[dep].propagations.push(rule_id);
                    }
                }
            }
        }
    }
}

/// Timestamp comparison for the rebuild decision: stale when any output is
/// missing, any input is missing, or the earliest output is not strictly
/// newer than the latest input.
pub fn out_of_date(outputs: &[Option<SystemTime>], inputs: &[Option<SystemTime>]) -> bool {
    let mut earliest_output: Option<SystemTime> = None;
    for time in outputs {
        match time {
            None => return true,
            Some(time) => {
                if earliest_output.is_none_or(|min| *time < min) {
                    earliest_output = Some(*time);
                }
            }
        }
    }
    for time in inputs {
        match (time, earliest_output) {
            (None, _) => return true,
            // no outputs declared at all: inputs alone force a rebuild
            (Some(_), None) => return true,
            (Some(time), Some(min)) => {
                if *time >= min {
                    return true;
                }
            }
        }
    }
    false
}
