//! Repository history commands

use clap::Args;
use std::path::PathBuf;
use stemvault_core::diff::TrackChanges;
use stemvault_engine::ProjectService;
use stemvault_store::{CommitOutcome, CommitRequest, RevisionInfo};

#[derive(Debug, Args)]
pub struct ProjectArgs {
    /// Project id (directory name under the repositories root)
    pub project: String,
}

#[derive(Debug, Args)]
pub struct InitArgs {
    pub project: String,
}

#[derive(Debug, Args)]
pub struct CommitArgs {
    pub project: String,

    #[arg(long)]
    pub author: String,

    #[arg(long)]
    pub author_id: String,

    #[arg(short, long)]
    pub message: String,
}

#[derive(Debug, Args)]
pub struct RevisionArgs {
    pub project: String,

    /// Revision id, unique prefix of at least 4 characters, or HEAD
    pub revision: String,
}

#[derive(Debug, Args)]
pub struct RestoreArgs {
    pub project: String,

    pub revision: String,

    #[arg(long)]
    pub author_id: String,

    #[arg(short, long)]
    pub message: String,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    pub project: String,

    pub revision: String,

    /// Output directory (defaults to the configured archive directory)
    #[arg(long)]
    pub out: Option<PathBuf>,
}

pub async fn init(service: &ProjectService, args: InitArgs) -> anyhow::Result<()> {
    let state = service.init(&args.project).await?;
    println!(
        "Initialized {} ({})",
        service.project_path(&args.project)?.display(),
        serde_json::to_value(state)?.as_str().unwrap_or("unknown")
    );
    Ok(())
}

pub async fn commit(service: &ProjectService, args: CommitArgs) -> anyhow::Result<()> {
    let request = CommitRequest::new(&args.author, &args.author_id, &args.message);
    match service.commit(&args.project, request).await? {
        CommitOutcome::Created { revision } => println!("Committed {}", revision),
        CommitOutcome::NothingToCommit => println!("Nothing to commit"),
    }
    Ok(())
}

fn change_line(changes: &TrackChanges) -> String {
    let names = |refs: &[stemvault_core::diff::TrackRef]| {
        refs.iter()
            .map(|r| r.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };
    let mut parts = Vec::new();
    if !changes.added.is_empty() {
        parts.push(format!("+[{}]", names(&changes.added)));
    }
    if !changes.modified.is_empty() {
        parts.push(format!("~[{}]", names(&changes.modified)));
    }
    if !changes.removed.is_empty() {
        parts.push(format!("-[{}]", names(&changes.removed)));
    }
    parts.join(" ")
}

fn print_revision(rev: &RevisionInfo) {
    println!(
        "{} {:<6} {} {} <{}>",
        rev.short_hash(),
        rev.kind.as_str(),
        rev.timestamp.format("%Y-%m-%d %H:%M:%S"),
        rev.author,
        rev.author_id
    );
    println!("    {}", rev.subject());
    if let Some(from) = &rev.restored_from {
        println!("    restored from {}", from);
    }
    if let Some(changes) = rev.changes.as_ref().filter(|c| !c.is_empty()) {
        println!("    {}", change_line(changes));
    }
}

pub async fn log(service: &ProjectService, args: ProjectArgs) -> anyhow::Result<()> {
    let history = service.history(&args.project).await?;
    if history.is_empty() {
        println!("No revisions");
    }
    for rev in &history {
        print_revision(rev);
    }
    Ok(())
}

pub async fn head(service: &ProjectService, args: ProjectArgs) -> anyhow::Result<()> {
    let latest = service.latest_revision(&args.project).await?;
    println!("{}", latest.as_deref().unwrap_or("NONE"));
    Ok(())
}

pub async fn restore(service: &ProjectService, args: RestoreArgs) -> anyhow::Result<()> {
    let outcome = service
        .restore(&args.project, &args.revision, &args.author_id, &args.message)
        .await?;
    println!("Restored {} as {}", outcome.restored_from, outcome.revision);
    println!("  paths changed: {}", outcome.paths_changed.len());
    Ok(())
}

pub async fn export(service: &ProjectService, args: ExportArgs) -> anyhow::Result<()> {
    let path = service
        .export_archive(&args.project, &args.revision, args.out.as_deref())
        .await?;
    println!("{}", path.display());
    Ok(())
}

pub async fn artifact(service: &ProjectService, args: RevisionArgs) -> anyhow::Result<()> {
    let diff = service.diff_artifact(&args.project, &args.revision).await?;
    println!("{}", serde_json::to_string_pretty(&diff)?);
    Ok(())
}
