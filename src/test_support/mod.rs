//! Test doubles shared across unit tests.

use std::collections::VecDeque;

use anyhow::{bail, Result};

use crate::util::process::{JobId, JobRunner};

/// Scripted [`JobRunner`]: no processes are spawned; every command
/// "finishes" in spawn order with a configurable exit code.
///
/// Records everything the scheduler does so tests can assert on command
/// order and on how many jobs were in flight at once.
pub struct FakeRunner {
    /// Every argv passed to `spawn`, in order.
    pub spawned: Vec<Vec<String>>,
    /// Highest number of jobs simultaneously in flight.
    pub max_in_flight: usize,
    /// Substring patterns mapped to the exit code they should produce.
    failures: Vec<(String, i32)>,
    in_flight: VecDeque<(JobId, i32)>,
    next_id: JobId,
}

impl FakeRunner {
    pub fn new() -> Self {
        FakeRunner {
            spawned: Vec::new(),
            max_in_flight: 0,
            failures: Vec::new(),
            in_flight: VecDeque::new(),
            next_id: 0,
        }
    }

    /// Commands whose joined argv contains `pattern` exit with `code`.
    pub fn fail_matching(&mut self, pattern: &str, code: i32) {
        self.failures.push((pattern.to_string(), code));
    }

    fn exit_code_for(&self, argv: &[String]) -> i32 {
        let joined = argv.join(" ");
        self.failures
            .iter()
            .find(|(pattern, _)| joined.contains(pattern))
            .map(|(_, code)| *code)
            .unwrap_or(0)
    }
}

impl Default for FakeRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRunner for FakeRunner {
    fn spawn(&mut self, argv: &[String]) -> Result<JobId> {
        let code = self.exit_code_for(argv);
        self.spawned.push(argv.to_vec());

        let id = self.next_id;
        self.next_id += 1;
        self.in_flight.push_back((id, code));
        self.max_in_flight = self.max_in_flight.max(self.in_flight.len());
        Ok(id)
    }

    fn wait_any(&mut self) -> Result<(JobId, i32)> {
        match self.in_flight.pop_front() {
            Some(finished) => Ok(finished),
            None => bail!("no running jobs to wait for"),
        }
    }
}
