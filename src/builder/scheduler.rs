//! Bounded-parallel rule execution.
//!
//! A single coordinating loop owns all scheduler state. Rules whose
//! dependencies have all finished sit in a FIFO ready queue; at most
//! `max_jobs` processes run at once. The only suspension point is
//! [`JobRunner::wait_any`]. A failed rule stops new starts, but processes
//! already running are drained. If the loop ends with fewer finished than
//! active rules, the leftovers form a dependency cycle.

use std::collections::{HashMap, VecDeque};
use std::path::Path;

use anyhow::{bail, Result};
use indicatif::ProgressBar;

use crate::util::fs;
use crate::util::process::{JobId, JobRunner};

use super::graph::{out_of_date, RuleId, RuleSet, RuleState};

enum Started {
    /// Up to date, or rebuilt without a command; no process needed.
    Finished,
    Spawned(JobId),
}

/// Run every active rule of the set, oldest-ready first.
pub fn execute(
    set: &mut RuleSet,
    max_jobs: usize,
    runner: &mut dyn JobRunner,
    progress: Option<&ProgressBar>,
) -> Result<()> {
    let max_jobs = max_jobs.max(1);

    let mut ready: VecDeque<RuleId> = VecDeque::new();
    for &target in &set.active_targets {
        for &rule in &set.targets[target].rules {
            if set.rules[rule].dependencies.is_empty() {
                ready.push_back(rule);
            }
        }
    }
    for &rule in &ready {
        set.rules[rule].state = RuleState::Ready;
    }

    let mut running: HashMap<JobId, RuleId> = HashMap::new();
    let mut failed = false;
    let mut fatal: Option<anyhow::Error> = None;

    loop {
        while !failed && fatal.is_none() && running.len() < max_jobs {
            let Some(rule) = ready.pop_front() else { break };
            match start_rule(set, rule, runner, progress) {
                Ok(Started::Finished) => finish_rule(set, rule, &mut ready, progress),
                Ok(Started::Spawned(job)) => {
                    set.rules[rule].state = RuleState::Running;
                    running.insert(job, rule);
                }
                Err(err) => {
                    set.rules[rule].state = RuleState::Failed;
                    fatal = Some(err);
                }
            }
        }

        if running.is_empty() {
            break;
        }

        let (job, code) = match runner.wait_any() {
            Ok(finished) => finished,
            Err(err) => {
                fatal = Some(err);
                break;
            }
        };
        let Some(rule) = running.remove(&job) else {
            continue;
        };
        if code == 0 {
            finish_rule(set, rule, &mut ready, progress);
        } else {
            set.rules[rule].state = RuleState::Failed;
            failed = true;
            tracing::error!(
                "command failed with exit code {}: {}",
                code,
                set.rules[rule].command.join(" ")
            );
            if let Some(progress) = progress {
                progress.inc(1);
            }
            propagate(set, rule, &mut ready);
        }
    }

    if let Some(err) = fatal {
        return Err(err);
    }
    if failed {
        bail!("build failed");
    }
    if set.finished_rules < set.active_rules {
        bail!(
            "could not build {} rule(s): dependency cycle",
            set.active_rules - set.finished_rules
        );
    }
    Ok(())
}

/// Decide whether `rule` is stale and either finish it on the spot or
/// start its command.
fn start_rule(
    set: &mut RuleSet,
    rule_id: RuleId,
    runner: &mut dyn JobRunner,
    progress: Option<&ProgressBar>,
) -> Result<Started> {
    debug_assert_eq!(
        set.rules[rule_id].finished_dependencies,
        set.rules[rule_id].dependencies.len()
    );

    let stale = {
        let rule = &set.rules[rule_id];
        rule.dependencies.iter().any(|&dep| set.rules[dep].rebuild) || stale_on_disk(rule)
    };
    if !stale {
        tracing::debug!("`{}` is up to date", set.rules[rule_id].outputs.join(" "));
        return Ok(Started::Finished);
    }
    set.rules[rule_id].rebuild = true;

    let rule = &set.rules[rule_id];
    let message = if rule.message.is_empty() {
        rule.command.join(" ")
    } else {
        rule.message.join(" ")
    };
    if !message.is_empty() {
        match progress {
            // `ProgressBar::println` is a no-op on a hidden bar (stdout not
            // a terminal); fall back to plain stdout so messages survive.
            Some(progress) if !progress.is_hidden() => progress.println(&message),
            _ => println!("{}", message),
        }
    }

    if rule.command.is_empty() {
        return Ok(Started::Finished);
    }
    for output in &rule.outputs {
        fs::ensure_parent_dir(Path::new(output))?;
    }
    let job = runner.spawn(&rule.command)?;
    Ok(Started::Spawned(job))
}

fn stale_on_disk(rule: &super::graph::Rule) -> bool {
    let outputs: Vec<_> = rule
        .outputs
        .iter()
        .map(|path| fs::write_time(Path::new(path)))
        .collect();
    let inputs: Vec<_> = rule
        .inputs
        .iter()
        .map(|path| fs::write_time(Path::new(path)))
        .collect();
    out_of_date(&outputs, &inputs)
}

fn finish_rule(
    set: &mut RuleSet,
    rule: RuleId,
    ready: &mut VecDeque<RuleId>,
    progress: Option<&ProgressBar>,
) {
    set.rules[rule].state = RuleState::Finished;
    set.finished_rules += 1;
    if let Some(progress) = progress {
        progress.inc(1);
    }
    propagate(set, rule, ready);
}

/// Credit this rule's completion to every consumer; consumers whose last
/// dependency just finished become ready.
fn propagate(set: &mut RuleSet, rule: RuleId, ready: &mut VecDeque<RuleId>) {
    for consumer in set.rules[rule].propagations.clone() {
        set.rules[consumer].finished_dependencies += 1;
        if set.rules[consumer].finished_dependencies == set.rules[consumer].dependencies.len() {
            set.rules[consumer].state = RuleState::Ready;
            ready.push_back(consumer);
        }
    }
}
