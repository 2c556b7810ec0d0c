use clap::{Parser, ValueEnum};

use crate::checkpoint::Step;

/// geeto - interactive release workflow for git
#[derive(Parser)]
#[command(name = "geeto")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Start at this step, treating earlier steps as already done
    #[arg(long, value_enum)]
    pub step: Option<StartStep>,

    /// Discard the saved checkpoint (the AI provider selection is kept)
    #[arg(long)]
    pub fresh: bool,

    /// Stage all changes without asking
    #[arg(long)]
    pub stage_all: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StartStep {
    Stage,
    Branch,
    Commit,
    Push,
    Merge,
    Cleanup,
}

impl StartStep {
    /// The checkpoint step that must already be recorded for the workflow
    /// to begin at this stage.
    pub fn floor(self) -> Step {
        match self {
            StartStep::Stage => Step::Init,
            StartStep::Branch => Step::Staged,
            StartStep::Commit => Step::BranchCreated,
            StartStep::Push => Step::Committed,
            StartStep::Merge => Step::Pushed,
            StartStep::Cleanup => Step::Merged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_start_step_floors_to_the_preceding_checkpoint() {
        assert_eq!(StartStep::Stage.floor(), Step::Init);
        assert_eq!(StartStep::Branch.floor(), Step::Staged);
        assert_eq!(StartStep::Commit.floor(), Step::BranchCreated);
        assert_eq!(StartStep::Push.floor(), Step::Committed);
        assert_eq!(StartStep::Merge.floor(), Step::Pushed);
        assert_eq!(StartStep::Cleanup.floor(), Step::Merged);
    }

    #[test]
    fn cli_parses_flags() {
        let cli = Cli::parse_from(["geeto", "--fresh", "--stage-all", "--step", "commit"]);
        assert!(cli.fresh);
        assert!(cli.stage_all);
        assert!(matches!(cli.step, Some(StartStep::Commit)));
    }
}
