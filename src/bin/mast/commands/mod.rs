//! Subcommand implementations.

pub mod build;
pub mod plan;

use anyhow::{bail, Context, Result};

/// Parse `KEY=VALUE` arguments. Repeated keys accumulate into one
/// space-separated value, so `target=a target=b` selects both.
pub fn parse_overrides(overrides: &[String]) -> Result<Vec<(String, String)>> {
    let mut merged: Vec<(String, String)> = Vec::new();
    for raw in overrides {
        let (key, value) = raw
            .split_once('=')
            .with_context(|| format!("invalid override `{}` (expected KEY=VALUE)", raw))?;
        if key.is_empty() {
            bail!("invalid override `{}` (empty key)", raw);
        }
        match merged.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => {
                existing.push(' ');
                existing.push_str(value);
            }
            None => merged.push((key.to_string(), value.to_string())),
        }
    }
    Ok(merged)
}
