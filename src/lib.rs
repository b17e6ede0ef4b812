//! mast - a make-like build orchestrator.
//!
//! A build file declares a tree of keys; values stay unexpanded until they
//! are read, in whichever scope reads them. The [`Builder`] resolves the
//! tree into a graph of rules, matches inputs against outputs to infer
//! dependencies, and runs stale rules with bounded parallelism, skipping
//! anything whose outputs are newer than its inputs.

pub mod builder;
pub mod engine;
pub mod util;

#[cfg(test)]
pub mod test_support;

pub use builder::{BuildPlan, Builder, RuleSet};
pub use engine::Engine;
pub use util::{processor_count, JobRunner, ProcessRunner};
