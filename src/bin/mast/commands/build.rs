//! `mast build`: run the build.

use anyhow::Result;

use mast::{Builder, Engine, ProcessRunner};

use crate::cli::BuildArgs;

pub fn execute(args: &BuildArgs, verbose: bool) -> Result<()> {
    let user_args = super::parse_overrides(&args.overrides)?;

    let mut engine = Engine::new();
    engine.load_file(&args.file)?;

    let mut runner = ProcessRunner::new();
    Builder::new(engine)
        .jobs(args.jobs)
        .show_progress(!verbose)
        .build(&user_args, &mut runner)
}
