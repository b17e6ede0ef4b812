//! Shared utilities: filesystem helpers, process execution, word operations.

pub mod fs;
pub mod process;
pub mod words;

pub use process::{processor_count, JobId, JobRunner, ProcessRunner};
