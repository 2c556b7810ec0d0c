//! Workflow checkpointing.
//!
//! The whole resumability story lives here: a single JSON record under
//! `<repo>/.geeto/geeto-state.json`, rewritten after every completed step.
//! A missing or corrupt checkpoint is treated as no checkpoint at all;
//! loading never fails the workflow, and a failed save only costs
//! resumability, never correctness.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Ordered workflow stages. `step` in the checkpoint records the furthest
/// stage that has completed; it only ever moves forward within a session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Step {
    #[default]
    Init,
    Staged,
    BranchCreated,
    Committed,
    Pushed,
    Merged,
    Cleanup,
}

impl Step {
    pub fn label(&self) -> &'static str {
        match self {
            Step::Init => "init",
            Step::Staged => "stage",
            Step::BranchCreated => "branch",
            Step::Committed => "commit",
            Step::Pushed => "push",
            Step::Merged => "merge",
            Step::Cleanup => "cleanup",
        }
    }
}

/// Which text generator backs the AI-assisted steps. `Manual` is a sentinel
/// meaning "skip AI entirely", not a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderChoice {
    Gemini,
    Copilot,
    Openrouter,
    #[default]
    Manual,
}

/// The single persisted record. Serialized as camelCase JSON with 2-space
/// indentation; every field has a default so checkpoints written by older
/// versions (or hand-edited ones missing fields) still load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowState {
    pub step: Step,
    pub working_branch: String,
    pub target_branch: String,
    pub current_branch: String,
    pub ai_provider: ProviderChoice,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gemini_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copilot_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openrouter_model: Option<String>,
    pub timestamp: String,
    pub skipped_commit: bool,
    pub skipped_push: bool,
}

impl WorkflowState {
    /// Model for the currently selected provider, if any.
    pub fn model(&self) -> Option<&str> {
        match self.ai_provider {
            ProviderChoice::Gemini => self.gemini_model.as_deref(),
            ProviderChoice::Copilot => self.copilot_model.as_deref(),
            ProviderChoice::Openrouter => self.openrouter_model.as_deref(),
            ProviderChoice::Manual => None,
        }
    }

    /// A fresh `Init` state with branch fields cleared, carrying over only
    /// the provider selection so the user is not re-asked on restart. Pure;
    /// callers decide whether and how to persist it.
    pub fn fresh_preserving_provider(&self) -> WorkflowState {
        let mut fresh = WorkflowState::default();
        fresh.set_provider(self.ai_provider, self.model().map(str::to_string));
        fresh
    }

    /// Switch provider/model, clearing the model fields that no longer match.
    /// Keeps the invariant that at most one model field is populated.
    pub fn set_provider(&mut self, provider: ProviderChoice, model: Option<String>) {
        self.ai_provider = provider;
        self.gemini_model = None;
        self.copilot_model = None;
        self.openrouter_model = None;
        match provider {
            ProviderChoice::Gemini => self.gemini_model = model,
            ProviderChoice::Copilot => self.copilot_model = model,
            ProviderChoice::Openrouter => self.openrouter_model = model,
            ProviderChoice::Manual => {}
        }
    }
}

/// Owns the on-disk representation; the only collaborator allowed to touch
/// the checkpoint file.
pub struct CheckpointStore {
    path: PathBuf,
}

/// Checkpoint location relative to the repository root.
const CHECKPOINT_DIR: &str = ".geeto";
const CHECKPOINT_FILE: &str = "geeto-state.json";

impl CheckpointStore {
    pub fn new(repo_root: &Path) -> Self {
        Self {
            path: repo_root.join(CHECKPOINT_DIR).join(CHECKPOINT_FILE),
        }
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize and write the state. Serialization happens before any file
    /// is touched, so a serialization failure never leaves a partial write.
    /// Safe to call repeatedly with the same state.
    pub fn save(&self, state: &WorkflowState) -> Result<()> {
        let mut stamped = state.clone();
        stamped.timestamp = Utc::now().to_rfc3339();

        let content = serde_json::to_string_pretty(&stamped)
            .context("failed to serialize workflow state")?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create checkpoint directory {}", parent.display())
            })?;
        }
        std::fs::write(&self.path, content)
            .with_context(|| format!("failed to write checkpoint {}", self.path.display()))?;

        debug!("checkpoint saved at step {:?}", stamped.step);
        Ok(())
    }

    /// Load the checkpoint if present and well-formed. A corrupt checkpoint
    /// is treated the same as a missing one.
    pub fn load(&self) -> Option<WorkflowState> {
        if !self.path.exists() {
            return None;
        }
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) => {
                warn!("failed to read checkpoint {}: {err}", self.path.display());
                return None;
            }
        };
        match serde_json::from_str::<WorkflowState>(&content) {
            Ok(state) => Some(state),
            Err(err) => {
                warn!("ignoring corrupt checkpoint {}: {err}", self.path.display());
                None
            }
        }
    }

}
