//! `mast plan`: emit the resolved rule graph as JSON.

use std::fs;

use anyhow::{Context, Result};

use mast::{Builder, Engine};

use crate::cli::PlanArgs;

pub fn execute(args: &PlanArgs) -> Result<()> {
    let user_args = super::parse_overrides(&args.overrides)?;

    let mut engine = Engine::new();
    engine.load_file(&args.file)?;

    let plan = Builder::new(engine).plan(&user_args)?;
    let json = plan.to_json_pretty()?;

    match &args.output {
        Some(path) => fs::write(path, json)
            .with_context(|| format!("failed to write plan to {}", path.display()))?,
        None => println!("{}", json),
    }
    Ok(())
}
