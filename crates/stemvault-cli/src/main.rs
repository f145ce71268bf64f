//! stemvault CLI
//!
//! Command-line interface over the project history engine

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use stemvault_core::logging_facility::{self, Profile};
use stemvault_engine::{EngineConfig, ProjectService};

mod commands;

#[derive(Debug, Parser)]
#[command(name = "stemvault")]
#[command(about = "stemvault - Version history for DAW projects", long_about = None)]
struct Cli {
    /// Engine configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding one repository per project
    #[arg(long, global = true)]
    repositories_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create the repository for a project
    Init(commands::history::InitArgs),
    /// Record the working tree as a new revision
    Commit(commands::history::CommitArgs),
    /// Show revision history, latest first
    Log(commands::history::ProjectArgs),
    /// Print the latest revision id, or NONE
    Head(commands::history::ProjectArgs),
    /// Restore the working tree to an earlier revision
    Restore(commands::history::RestoreArgs),
    /// Write a zip archive of a revision
    Export(commands::history::ExportArgs),
    /// Print the diff recorded with a revision
    Artifact(commands::history::RevisionArgs),
    /// Diff two snapshot files
    Diff(commands::diff::DiffArgs),
    /// Apply a collaborator's proposal to a project
    Merge(commands::merge::MergeArgs),
}

fn load_config(cli: &Cli) -> anyhow::Result<EngineConfig> {
    let mut config = EngineConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(root) = &cli.repositories_root {
        config.repositories_root = root.clone();
    }
    Ok(config)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    let profile: Profile = config
        .log_profile
        .parse()
        .map_err(anyhow::Error::msg)?;
    logging_facility::init(profile);

    let service = ProjectService::new(config);
    match cli.command {
        Commands::Init(args) => commands::history::init(&service, args).await,
        Commands::Commit(args) => commands::history::commit(&service, args).await,
        Commands::Log(args) => commands::history::log(&service, args).await,
        Commands::Head(args) => commands::history::head(&service, args).await,
        Commands::Restore(args) => commands::history::restore(&service, args).await,
        Commands::Export(args) => commands::history::export(&service, args).await,
        Commands::Artifact(args) => commands::history::artifact(&service, args).await,
        Commands::Diff(args) => commands::diff::execute(args),
        Commands::Merge(args) => commands::merge::execute(&service, args).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
