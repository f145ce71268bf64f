//! Offline diff of two snapshot files

use anyhow::Context;
use clap::Args;
use std::path::PathBuf;
use stemvault_core::diff::compute_diff;

#[derive(Debug, Args)]
pub struct DiffArgs {
    /// Older snapshot (ableton_project.json)
    pub old: PathBuf,

    /// Newer snapshot
    pub new: PathBuf,

    /// Print the full diff as JSON instead of the text summary
    #[arg(long)]
    pub json: bool,
}

pub fn execute(args: DiffArgs) -> anyhow::Result<()> {
    let old = std::fs::read(&args.old)
        .with_context(|| format!("reading {}", args.old.display()))?;
    let new = std::fs::read(&args.new)
        .with_context(|| format!("reading {}", args.new.display()))?;

    let diff = compute_diff(&old, &new)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&diff)?);
    } else {
        println!("{}", diff.text_summary);
    }
    Ok(())
}
