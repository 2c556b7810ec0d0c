//! Per-step sub-workflows.
//!
//! Each function runs one stage end to end: gather input, call the safe git
//! layer and/or the AI orchestrator, and report how the stage ended. None of
//! them touch the checkpoint's `step` field; advancing and persisting is the
//! state machine's job.

use anyhow::{bail, Result};
use tracing::warn;

use crate::ai::clean::branch_name_error;
use crate::ai::providers::GenerationKind;
use crate::ai::Orchestrator;
use crate::checkpoint::{CheckpointStore, WorkflowState};
use crate::error::GeetoError;
use crate::git::safe::{
    safe_checkout, safe_commit, safe_merge, safe_pull, safe_push, CheckoutOpts, CommitOpts,
    MergeOpts, PushOpts,
};
use crate::git::{branch_exists, changed_files, staged_diff_summary, staged_files, GitCli};
use crate::prompt::{hint, Prompter};

/// How a sub-workflow ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Stage completed; the state machine advances and checkpoints.
    Done,
    /// The user deliberately bypassed the stage; its skip flag is set and
    /// the machine advances without "already done" messaging later.
    Skipped,
    /// The repository needs manual attention (unresolved conflicts); stop
    /// here and resume from the same stage on the next run.
    Paused,
}

pub struct StepContext<'a> {
    pub git: &'a dyn GitCli,
    pub prompter: &'a dyn Prompter,
    pub store: &'a CheckpointStore,
    pub stage_all: bool,
}

impl StepContext<'_> {
    /// Mid-step checkpoint write; losing it only costs resumability.
    fn checkpoint(&self, state: &WorkflowState) {
        if let Err(err) = self.store.save(state) {
            warn!("checkpoint save failed: {err:#}");
        }
    }
}

/// Stage: choose what goes into the release commit.
pub fn run_stage(ctx: &StepContext<'_>, _state: &mut WorkflowState) -> Result<StepOutcome> {
    let staged = staged_files(ctx.git)?;
    let changed = changed_files(ctx.git)?;

    if staged.is_empty() && changed.is_empty() {
        return Err(GeetoError::Validation(
            "working tree is clean; nothing to release".to_string(),
        )
        .into());
    }

    if ctx.stage_all {
        stage_everything(ctx.git)?;
        println!("Staged all changes.");
        return Ok(StepOutcome::Done);
    }

    let mut items = vec!["Stage all changes"];
    if !staged.is_empty() {
        items.push("Keep what is already staged");
    }
    items.push("Pick files to stage");
    items.push("Cancel");

    let choice = ctx.prompter.select(
        &format!("{} file(s) changed. What should go into this release?", changed.len()),
        &items,
    )?;

    match items[choice] {
        "Stage all changes" => {
            stage_everything(ctx.git)?;
            println!("Staged all changes.");
        }
        "Keep what is already staged" => {
            println!("Keeping {} staged file(s).", staged.len());
        }
        "Pick files to stage" => {
            let refs: Vec<&str> = changed.iter().map(String::as_str).collect();
            let picked = ctx.prompter.multi_select("Select files to stage", &refs)?;
            if picked.is_empty() && staged.is_empty() {
                return Err(
                    GeetoError::Validation("no files selected to stage".to_string()).into(),
                );
            }
            for index in picked {
                let add = ctx.git.run(&["add", "--", &changed[index]])?;
                if !add.success {
                    bail!("failed to stage {}: {}", changed[index], add.stderr.trim());
                }
            }
        }
        _ => return Err(GeetoError::Cancelled.into()),
    }

    Ok(StepOutcome::Done)
}

fn stage_everything(git: &dyn GitCli) -> Result<()> {
    let add = git.run(&["add", "-A"])?;
    if !add.success {
        bail!("failed to stage changes: {}", add.stderr.trim());
    }
    Ok(())
}

/// Branch: pick the merge target, name the working branch (AI or manual),
/// validate it, and create it.
pub async fn run_branch(
    ctx: &StepContext<'_>,
    orchestrator: &mut Orchestrator<'_>,
    state: &mut WorkflowState,
) -> Result<StepOutcome> {
    let default_target = detect_default_branch(ctx.git);
    let target = ctx
        .prompter
        .input("Target branch to merge into", Some(&default_target))?;
    state.target_branch = target.trim().to_string();
    ctx.checkpoint(state);

    let summary = staged_diff_summary(ctx.git)?;
    let name = loop {
        let candidate = orchestrator
            .generate(GenerationKind::BranchName, &summary, state)
            .await?;

        // Validation failures are reported immediately; the same input is
        // never retried, the loop produces a new candidate instead.
        if let Some(reason) = branch_name_error(&candidate) {
            println!("Invalid branch name '{candidate}': {reason}");
        } else if branch_exists(ctx.git, &candidate)? {
            println!("A branch named '{candidate}' already exists.");
        } else {
            break candidate;
        }

        if !ctx.prompter.confirm("Try another name?", true)? {
            return Err(GeetoError::Cancelled.into());
        }
    };

    let result = safe_checkout(
        ctx.git,
        ctx.prompter,
        &name,
        CheckoutOpts {
            create: true,
            ..Default::default()
        },
    )?;
    if !result.success {
        bail!(
            "could not create branch '{name}': {}",
            result.error.unwrap_or_default()
        );
    }

    state.working_branch = name.clone();
    state.current_branch = name;
    Ok(StepOutcome::Done)
}

/// Commit: AI or manual message over the live staged set.
pub async fn run_commit(
    ctx: &StepContext<'_>,
    orchestrator: &mut Orchestrator<'_>,
    state: &mut WorkflowState,
) -> Result<StepOutcome> {
    if !ctx.prompter.confirm("Create the commit now?", true)? {
        println!("Skipping the commit step.");
        state.skipped_commit = true;
        return Ok(StepOutcome::Skipped);
    }

    // Staged files are re-read from git at the moment of use; the
    // checkpoint never holds a file list that could go stale.
    let summary = staged_diff_summary(ctx.git)?;
    let message = orchestrator
        .generate(GenerationKind::CommitMessage, &summary, state)
        .await?;

    let result = safe_commit(ctx.git, ctx.prompter, &message, CommitOpts::default())?;
    if !result.success {
        bail!("commit failed: {}", result.error.unwrap_or_default());
    }
    println!("Committed: {message}");
    Ok(StepOutcome::Done)
}

/// Push the working branch.
pub fn run_push(ctx: &StepContext<'_>, state: &mut WorkflowState) -> Result<StepOutcome> {
    let branch = state.working_branch.clone();
    if !ctx
        .prompter
        .confirm(&format!("Push '{branch}' to origin?"), true)?
    {
        println!("Skipping the push step.");
        state.skipped_push = true;
        return Ok(StepOutcome::Skipped);
    }

    let result = safe_push(ctx.git, ctx.prompter, &branch, PushOpts::default())?;
    if result.conflict {
        // The pull-then-retry path hit conflicts the user chose to resolve
        // by hand; resume re-runs the push once the tree is clean.
        println!("Resolve the pull conflicts, then run geeto again to resume.");
        return Ok(StepOutcome::Paused);
    }
    if !result.success {
        bail!("push failed: {}", result.error.unwrap_or_default());
    }
    println!("Pushed '{branch}'.");
    Ok(StepOutcome::Done)
}

/// Merge: switch to the target branch, optionally pull it, merge the
/// working branch (no fast-forward), and push the result.
pub async fn run_merge(
    ctx: &StepContext<'_>,
    orchestrator: &mut Orchestrator<'_>,
    state: &mut WorkflowState,
) -> Result<StepOutcome> {
    let target = state.target_branch.clone();
    let working = state.working_branch.clone();

    let mut checkout = safe_checkout(ctx.git, ctx.prompter, &target, CheckoutOpts::default())?;
    if checkout.commit_needed {
        // The checkout layer never commits on its own; run the commit
        // sub-workflow here and retry.
        println!("Committing local changes before switching to '{target}'.");
        let summary = staged_diff_summary(ctx.git)?;
        let message = orchestrator
            .generate(GenerationKind::CommitMessage, &summary, state)
            .await?;
        let committed = safe_commit(ctx.git, ctx.prompter, &message, CommitOpts::default())?;
        if !committed.success {
            bail!("commit failed: {}", committed.error.unwrap_or_default());
        }
        checkout = safe_checkout(ctx.git, ctx.prompter, &target, CheckoutOpts::default())?;
    }
    if checkout.conflict {
        println!("Resolve the checkout conflicts, then run geeto again to resume.");
        return Ok(StepOutcome::Paused);
    }
    if !checkout.success {
        bail!(
            "could not switch to '{target}': {}",
            checkout.error.unwrap_or_default()
        );
    }

    state.current_branch = target.clone();
    ctx.checkpoint(state);

    if ctx
        .prompter
        .confirm(&format!("Pull the latest '{target}' before merging?"), true)?
    {
        let pulled = safe_pull(ctx.git, ctx.prompter, "origin", &target)?;
        if pulled.conflict {
            println!("Resolve the pull conflicts, then run geeto again to resume.");
            return Ok(StepOutcome::Paused);
        }
        if !pulled.success {
            println!(
                "Pull failed ({}); continuing with the local '{target}'.",
                pulled.error.unwrap_or_default()
            );
        }
    }

    let merged = safe_merge(
        ctx.git,
        ctx.prompter,
        &working,
        MergeOpts {
            no_ff: true,
            ..Default::default()
        },
    )?;
    if merged.conflict {
        println!("Resolve the merge conflicts, then run geeto again to resume.");
        return Ok(StepOutcome::Paused);
    }
    if !merged.success {
        bail!("merge failed: {}", merged.error.unwrap_or_default());
    }

    let pushed = safe_push(ctx.git, ctx.prompter, &target, PushOpts::default())?;
    if pushed.conflict {
        println!("Resolve the pull conflicts, then run geeto again to resume.");
        return Ok(StepOutcome::Paused);
    }
    if !pushed.success {
        bail!(
            "push of '{target}' failed: {}",
            pushed.error.unwrap_or_default()
        );
    }

    println!("Merged '{working}' into '{target}' and pushed.");
    Ok(StepOutcome::Done)
}

/// Cleanup: delete the working branch (local, optionally remote) and reset
/// the checkpoint, keeping the provider selection.
pub fn run_cleanup(ctx: &StepContext<'_>, state: &WorkflowState) -> Result<WorkflowState> {
    let working = state.working_branch.clone();

    if !working.is_empty()
        && ctx
            .prompter
            .confirm(&format!("Delete the local branch '{working}'?"), true)?
    {
        let deleted = ctx.git.run(&["branch", "-d", &working])?;
        if !deleted.success {
            if deleted.combined_lower().contains("not fully merged") {
                let force = ctx.prompter.confirm(
                    "The branch is not fully merged; force delete will discard its commits. Continue?",
                    false,
                )?;
                if force {
                    let forced = ctx.git.run(&["branch", "-D", &working])?;
                    if !forced.success {
                        println!("Could not delete '{working}': {}", forced.stderr.trim());
                    }
                }
            } else {
                println!("Could not delete '{working}': {}", deleted.stderr.trim());
            }
        }
    }

    if !working.is_empty()
        && ctx
            .prompter
            .confirm(&format!("Delete the remote branch 'origin/{working}' too?"), false)?
    {
        let deleted = ctx.git.run(&["push", "origin", "--delete", &working])?;
        if !deleted.success {
            println!(
                "Could not delete the remote branch: {}",
                deleted.stderr.trim()
            );
        }
    }

    // The release itself is done at this point; a checkpoint that cannot
    // be rewritten must not turn it into a failure.
    let fresh = state.fresh_preserving_provider();
    ctx.checkpoint(&fresh);
    println!("Release workflow complete.");
    hint("The next run starts fresh with the same AI provider.");
    Ok(fresh)
}

/// Best-effort guess of the repository's long-lived branch: origin's HEAD
/// if known, otherwise "main".
fn detect_default_branch(git: &dyn GitCli) -> String {
    if let Ok(out) = git.run(&["symbolic-ref", "refs/remotes/origin/HEAD"]) {
        if out.success {
            if let Some(name) = out.stdout.trim().rsplit('/').next() {
                if !name.is_empty() {
                    return name.to_string();
                }
            }
        }
    }
    "main".to_string()
}
