//! The release workflow state machine.
//!
//! Steps run in a fixed order (stage, branch, commit, push, merge, cleanup);
//! the checkpoint records the furthest completed step and the workflow
//! re-enters at the first incomplete one. Resuming is only safe when the
//! repository still looks the way the checkpoint left it, so a branch
//! mismatch restarts from the beginning rather than operating on the wrong
//! branch.

pub mod steps;

use anyhow::Result;
use tracing::{info, warn};

use crate::ai::providers::{ProviderKind, ProviderRegistry};
use crate::ai::Orchestrator;
use crate::checkpoint::{CheckpointStore, ProviderChoice, Step, WorkflowState};
use crate::git::{current_branch, GitCli};
use crate::prompt::Prompter;

use steps::{StepContext, StepOutcome};

/// Record a completed step. The step field only moves forward; a stale or
/// repeated completion leaves the checkpoint untouched.
pub fn advance(state: &mut WorkflowState, completed: Step) {
    if completed <= state.step {
        warn!(
            "ignoring advance to {:?}; checkpoint already at {:?}",
            completed, state.step
        );
        return;
    }
    state.step = completed;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Discard the checkpoint (keeping the provider selection) before running.
    pub fresh: bool,
    /// Minimum starting step; completed steps below it are assumed done.
    pub start_floor: Option<Step>,
    /// Stage everything without asking.
    pub stage_all: bool,
}

pub struct Workflow<'a> {
    git: &'a dyn GitCli,
    prompter: &'a dyn Prompter,
    store: &'a CheckpointStore,
    registry: &'a ProviderRegistry,
}

impl<'a> Workflow<'a> {
    pub fn new(
        git: &'a dyn GitCli,
        prompter: &'a dyn Prompter,
        store: &'a CheckpointStore,
        registry: &'a ProviderRegistry,
    ) -> Self {
        Self {
            git,
            prompter,
            store,
            registry,
        }
    }

    pub async fn run(&self, opts: RunOptions) -> Result<()> {
        let loaded = self.store.load();
        let had_checkpoint = loaded.is_some();
        let mut state = loaded.unwrap_or_default();

        if opts.fresh && state.step > Step::Init {
            println!("Starting fresh; the previous checkpoint is discarded.");
            state = state.fresh_preserving_provider();
            self.persist(&state);
        }

        // A checkpoint is only trustworthy if HEAD is still where it left
        // it. Otherwise the user moved on and resuming would act on the
        // wrong branch.
        if state.step > Step::Init {
            let live = current_branch(self.git)?;
            if live == state.current_branch {
                println!(
                    "Resuming: '{}' completed through the {} step.",
                    state.working_branch,
                    state.step.label()
                );
            } else {
                println!(
                    "Checkpoint expected branch '{}' but HEAD is on '{}'; starting over.",
                    state.current_branch, live
                );
                state = state.fresh_preserving_provider();
                self.persist(&state);
            }
        }

        if let Some(floor) = opts.start_floor {
            if floor > state.step {
                info!("starting at the {} step by request", floor.label());
                state.step = floor;
            }
        }

        if !had_checkpoint {
            self.select_provider(&mut state)?;
        }
        self.persist(&state);

        let ctx = StepContext {
            git: self.git,
            prompter: self.prompter,
            store: self.store,
            stage_all: opts.stage_all,
        };
        let mut orchestrator = Orchestrator::new(self.registry, self.prompter, self.store);

        if state.step >= Step::Staged {
            println!("✔ stage already done");
        } else {
            steps::run_stage(&ctx, &mut state)?;
            self.complete(&mut state, Step::Staged);
        }

        if state.step >= Step::BranchCreated {
            println!("✔ branch already done");
        } else {
            steps::run_branch(&ctx, &mut orchestrator, &mut state).await?;
            self.complete(&mut state, Step::BranchCreated);
        }

        if state.step >= Step::Committed {
            // A deliberately skipped step is not announced as done.
            if !state.skipped_commit {
                println!("✔ commit already done");
            }
        } else {
            steps::run_commit(&ctx, &mut orchestrator, &mut state).await?;
            self.complete(&mut state, Step::Committed);
        }

        if state.step >= Step::Pushed {
            if !state.skipped_push {
                println!("✔ push already done");
            }
        } else {
            match steps::run_push(&ctx, &mut state)? {
                StepOutcome::Paused => return Ok(()),
                _ => self.complete(&mut state, Step::Pushed),
            }
        }

        if state.step >= Step::Merged {
            println!("✔ merge already done");
        } else {
            match steps::run_merge(&ctx, &mut orchestrator, &mut state).await? {
                StepOutcome::Paused => return Ok(()),
                _ => self.complete(&mut state, Step::Merged),
            }
        }

        // Cleanup resets the checkpoint itself; there is no Cleanup
        // checkpoint to resume from.
        steps::run_cleanup(&ctx, &state)?;
        Ok(())
    }

    /// First run in a repository: ask which generator backs the AI steps.
    fn select_provider(&self, state: &mut WorkflowState) -> Result<()> {
        let providers = ProviderKind::all();
        let mut items: Vec<&str> = providers.iter().map(|p| p.label()).collect();
        items.push("Manual (no AI)");

        let choice = self.prompter.select(
            "Which AI provider should draft branch names and commit messages?",
            &items,
        )?;

        if choice >= providers.len() {
            state.set_provider(ProviderChoice::Manual, None);
            return Ok(());
        }

        let provider = providers[choice];
        let models = provider.default_models();
        let mut model_items: Vec<String> = models.iter().map(|m| m.to_string()).collect();
        model_items.push("Other (enter a model id)".to_string());
        let refs: Vec<&str> = model_items.iter().map(String::as_str).collect();

        let picked = self
            .prompter
            .select(&format!("Pick a {} model", provider.label()), &refs)?;
        let model = if picked < models.len() {
            models[picked].to_string()
        } else {
            self.prompter.input("Model id", None)?
        };

        state.set_provider(provider.as_choice(), Some(model));
        Ok(())
    }

    fn complete(&self, state: &mut WorkflowState, step: Step) {
        advance(state, step);
        self.persist(state);
    }

    /// Checkpoint writes are resilience, not correctness; a failed write
    /// only costs resumability.
    fn persist(&self, state: &WorkflowState) {
        if let Err(err) = self.store.save(state) {
            warn!("checkpoint save failed: {err:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GeetoError;
    use crate::git::fake::FakeGit;
    use crate::git::GitOutput;
    use crate::prompt::script::{Answer, ScriptedPrompter};
    use tempfile::tempdir;

    fn empty_registry() -> ProviderRegistry {
        ProviderRegistry::with_providers(vec![])
    }

    fn is_cancelled(err: &anyhow::Error) -> bool {
        matches!(err.downcast_ref::<GeetoError>(), Some(GeetoError::Cancelled))
    }

    #[test]
    fn advance_never_moves_backward() {
        let mut state = WorkflowState {
            step: Step::Committed,
            ..Default::default()
        };

        advance(&mut state, Step::Staged);
        assert_eq!(state.step, Step::Committed);

        advance(&mut state, Step::Committed);
        assert_eq!(state.step, Step::Committed);

        advance(&mut state, Step::Pushed);
        assert_eq!(state.step, Step::Pushed);
    }

    #[tokio::test]
    async fn resume_on_matching_branch_skips_completed_steps() {
        // Checkpoint says the branch step finished on feat/x and HEAD is
        // still there: the run must go straight to the commit step.
        let tmp = tempdir().unwrap();
        let store = CheckpointStore::new(tmp.path());
        store
            .save(&WorkflowState {
                step: Step::BranchCreated,
                working_branch: "feat/x".to_string(),
                target_branch: "main".to_string(),
                current_branch: "feat/x".to_string(),
                ..Default::default()
            })
            .unwrap();

        let git = FakeGit::new(vec![(
            "rev-parse --abbrev-ref HEAD",
            GitOutput::ok("feat/x\n"),
        )]);
        let prompter = ScriptedPrompter::new(vec![
            Answer::Confirm(true),                            // commit now
            Answer::Input("fix: adjust the parser".to_string()), // manual message
            Answer::Cancel,                                   // stop at the push prompt
        ]);
        let registry = empty_registry();

        let workflow = Workflow::new(&git, &prompter, &store, &registry);
        let err = workflow.run(RunOptions::default()).await.unwrap_err();
        assert!(is_cancelled(&err));

        // Staging and branch creation never ran again.
        assert!(!git.ran("add"));
        assert!(!git.ran("checkout -b"));
        assert!(git.ran("commit -m"));
        assert_eq!(store.load().unwrap().step, Step::Committed);
    }

    #[tokio::test]
    async fn branch_mismatch_resets_and_restarts_from_staging() {
        // Checkpoint says feat/x but HEAD is on main: the checkpoint is
        // stale and the workflow must start over, keeping the provider.
        let tmp = tempdir().unwrap();
        let store = CheckpointStore::new(tmp.path());
        let mut stale = WorkflowState {
            step: Step::Committed,
            working_branch: "feat/x".to_string(),
            target_branch: "main".to_string(),
            current_branch: "feat/x".to_string(),
            ..Default::default()
        };
        stale.set_provider(
            ProviderChoice::Openrouter,
            Some("anthropic/claude-3.5-sonnet".to_string()),
        );
        store.save(&stale).unwrap();

        let git = FakeGit::new(vec![
            ("rev-parse --abbrev-ref HEAD", GitOutput::ok("main\n")),
            ("status --porcelain", GitOutput::ok(" M src/lib.rs\n")),
        ]);
        let prompter = ScriptedPrompter::new(vec![
            Answer::Select(0), // stage menu: stage all changes
            Answer::Cancel,    // stop at the target-branch prompt
        ]);
        let registry = empty_registry();

        let workflow = Workflow::new(&git, &prompter, &store, &registry);
        let err = workflow.run(RunOptions::default()).await.unwrap_err();
        assert!(is_cancelled(&err));

        // Staging ran again from scratch.
        assert!(git.ran("add -A"));
        let saved = store.load().unwrap();
        assert_eq!(saved.step, Step::Staged);
        assert!(saved.working_branch.is_empty());
        // The provider selection survived the reset.
        assert_eq!(saved.ai_provider, ProviderChoice::Openrouter);
        assert_eq!(saved.model(), Some("anthropic/claude-3.5-sonnet"));
    }

    #[tokio::test]
    async fn first_run_asks_for_a_provider() {
        let tmp = tempdir().unwrap();
        let store = CheckpointStore::new(tmp.path());

        // Clean tree: the stage step refuses to run, but the provider
        // question must already have been asked and persisted.
        let git = FakeGit::new(vec![]);
        let prompter = ScriptedPrompter::new(vec![
            Answer::Select(3), // provider menu: Manual (no AI)
        ]);
        let registry = empty_registry();

        let workflow = Workflow::new(&git, &prompter, &store, &registry);
        let err = workflow.run(RunOptions::default()).await.unwrap_err();

        assert!(prompter.saw_prompt_containing("Which AI provider"));
        assert!(matches!(
            err.downcast_ref::<GeetoError>(),
            Some(GeetoError::Validation(_))
        ));
        assert_eq!(store.load().unwrap().ai_provider, ProviderChoice::Manual);
    }

    #[tokio::test]
    async fn fresh_flag_discards_progress_but_keeps_provider() {
        let tmp = tempdir().unwrap();
        let store = CheckpointStore::new(tmp.path());
        let mut state = WorkflowState {
            step: Step::Pushed,
            working_branch: "feat/x".to_string(),
            current_branch: "feat/x".to_string(),
            ..Default::default()
        };
        state.set_provider(ProviderChoice::Gemini, Some("gemini-2.5-pro".to_string()));
        store.save(&state).unwrap();

        let git = FakeGit::new(vec![]);
        let prompter = ScriptedPrompter::new(vec![]);
        let registry = empty_registry();

        let workflow = Workflow::new(&git, &prompter, &store, &registry);
        let err = workflow
            .run(RunOptions {
                fresh: true,
                ..Default::default()
            })
            .await
            .unwrap_err();

        // Clean tree stops the run, but only after the reset happened.
        assert!(matches!(
            err.downcast_ref::<GeetoError>(),
            Some(GeetoError::Validation(_))
        ));
        let saved = store.load().unwrap();
        assert_eq!(saved.step, Step::Init);
        assert!(saved.working_branch.is_empty());
        assert_eq!(saved.ai_provider, ProviderChoice::Gemini);
        assert_eq!(saved.model(), Some("gemini-2.5-pro"));
    }

    #[tokio::test]
    async fn start_floor_skips_earlier_steps_without_a_checkpoint() {
        let tmp = tempdir().unwrap();
        let store = CheckpointStore::new(tmp.path());

        let git = FakeGit::new(vec![]);
        let prompter = ScriptedPrompter::new(vec![
            Answer::Select(3), // provider menu: Manual (no AI)
            Answer::Cancel,    // stop at the "commit now?" prompt
        ]);
        let registry = empty_registry();

        let workflow = Workflow::new(&git, &prompter, &store, &registry);
        let err = workflow
            .run(RunOptions {
                start_floor: Some(Step::BranchCreated),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(is_cancelled(&err));

        // Stage and branch were assumed done; commit was the first prompt
        // after provider selection.
        assert!(!git.ran("add"));
        assert!(!git.ran("checkout -b"));
        assert!(prompter.saw_prompt_containing("Create the commit now?"));
    }
}
