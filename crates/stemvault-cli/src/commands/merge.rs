//! Collaboration merge command

use clap::Args;
use std::path::PathBuf;
use stemvault_engine::commands::{MergeOutcome, Proposal, ProposalDecision};
use stemvault_engine::ProjectService;

#[derive(Debug, Args)]
pub struct MergeArgs {
    pub project: String,

    /// Directory holding the proposed project tree
    pub proposal_dir: PathBuf,

    #[arg(long)]
    pub author: String,

    #[arg(long)]
    pub author_id: String,

    #[arg(short, long)]
    pub message: String,

    /// accepted or rejected
    #[arg(long, default_value = "accepted")]
    pub decision: ProposalDecision,
}

pub async fn execute(service: &ProjectService, args: MergeArgs) -> anyhow::Result<()> {
    let id = args
        .proposal_dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "proposal".to_string());
    tracing::debug!(proposal = %id, dir = %args.proposal_dir.display(), "Applying proposal");

    let proposal = Proposal {
        id,
        dir: args.proposal_dir,
        author: args.author,
        author_id: args.author_id,
        description: args.message,
    };

    match service
        .apply_proposal(&args.project, proposal, args.decision)
        .await?
    {
        MergeOutcome::Merged {
            revision: Some(revision),
            diff_attached,
            ..
        } => {
            println!("Merged {}", revision);
            if diff_attached {
                println!("  diff attached");
            }
        }
        MergeOutcome::Merged { revision: None, .. } => println!("Nothing to merge"),
        MergeOutcome::Rejected => println!("Rejected"),
    }
    Ok(())
}
