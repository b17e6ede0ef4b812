//! Command-line interface definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "mast",
    version,
    about = "A make-like build orchestrator",
    propagate_version = true
)]
pub struct Cli {
    /// Print debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the requested targets
    Build(BuildArgs),
    /// Print the resolved rule graph as JSON without building
    Plan(PlanArgs),
}

#[derive(Args)]
pub struct BuildArgs {
    /// Build file to load
    #[arg(short, long, default_value = "Mastfile")]
    pub file: PathBuf,

    /// Maximum number of parallel jobs (defaults to the processor count)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Key overrides; `configuration=NAME` and `target=NAME` select what
    /// to build
    #[arg(value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,
}

#[derive(Args)]
pub struct PlanArgs {
    /// Build file to load
    #[arg(short, long, default_value = "Mastfile")]
    pub file: PathBuf,

    /// Write the plan to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Key overrides; `configuration=NAME` and `target=NAME` select what
    /// to plan
    #[arg(value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,
}
