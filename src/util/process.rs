//! Child-process execution.
//!
//! The scheduler talks to processes through the [`JobRunner`] trait so
//! tests can substitute a scripted runner. The real implementation spawns
//! one supervisory thread per child; each thread reports the child's exit
//! code over a shared channel, and `wait_any` is a blocking receive on it.

use std::num::NonZeroUsize;
use std::process::Command;
use std::sync::mpsc;
use std::thread;

use anyhow::{bail, Context, Result};

/// Identifier for a spawned job, unique within one runner.
pub type JobId = u64;

/// Starts jobs and waits for whichever finishes first.
pub trait JobRunner {
    /// Spawn `argv` as a child process. A spawn failure is fatal to the
    /// build, so it is reported as an error rather than an exit code.
    fn spawn(&mut self, argv: &[String]) -> Result<JobId>;

    /// Block until any running job finishes and return its exit code.
    fn wait_any(&mut self) -> Result<(JobId, i32)>;
}

/// [`JobRunner`] backed by real child processes.
///
/// Stdout/stderr are inherited so build tool output interleaves with ours.
pub struct ProcessRunner {
    next_id: JobId,
    live: usize,
    sender: mpsc::Sender<(JobId, i32)>,
    receiver: mpsc::Receiver<(JobId, i32)>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        ProcessRunner {
            next_id: 0,
            live: 0,
            sender,
            receiver,
        }
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRunner for ProcessRunner {
    fn spawn(&mut self, argv: &[String]) -> Result<JobId> {
        let (program, args) = argv
            .split_first()
            .context("cannot spawn an empty command")?;

        let mut child = Command::new(program)
            .args(args)
            .spawn()
            .with_context(|| format!("failed to start `{}`", program))?;

        let id = self.next_id;
        self.next_id += 1;
        self.live += 1;

        let sender = self.sender.clone();
        thread::spawn(move || {
            // A signal-terminated child has no exit code; report failure.
            let code = match child.wait() {
                Ok(status) => status.code().unwrap_or(-1),
                Err(_) => -1,
            };
            let _ = sender.send((id, code));
        });

        Ok(id)
    }

    fn wait_any(&mut self) -> Result<(JobId, i32)> {
        if self.live == 0 {
            bail!("no running jobs to wait for");
        }
        let finished = self
            .receiver
            .recv()
            .context("job supervisor channel closed")?;
        self.live -= 1;
        Ok(finished)
    }
}

/// Number of logical processors, used as the default job bound.
pub fn processor_count() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}
