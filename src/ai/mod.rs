//! AI generation orchestration.
//!
//! One entry point, [`Orchestrator::generate`], drives a finite-state loop:
//! attempt a generation with the selected provider/model, classify the
//! outcome, and either review the suggestion with the user or walk the
//! fallback menu (retry / other model / other provider / manual). Every
//! provider/model change is written to the checkpoint immediately so a
//! resumed session keeps the selection the user landed on.

pub mod classify;
pub mod clean;
pub mod providers;

use anyhow::Result;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::checkpoint::{CheckpointStore, ProviderChoice, WorkflowState};
use crate::prompt::Prompter;

use classify::{classify, is_provider_wide_failure, FailureKind};
use providers::{GenerationKind, GenerationRequest, Provider, ProviderKind, ProviderRegistry};

/// Result of one raw generation attempt, after classification.
#[derive(Debug)]
enum Attempt {
    Output(String),
    NoSuggestion,
    Failed(FailureKind, String),
}

/// Named states of the generation loop. Every reachable state and its exits
/// are enumerable here instead of being buried in loop/continue jumps.
#[derive(Debug)]
enum LoopState {
    Generate,
    Review(String),
    Fallback {
        kind: FailureKind,
        message: Option<String>,
    },
    ContextLimit(String),
    Done(String),
}

pub struct Orchestrator<'a> {
    registry: &'a ProviderRegistry,
    prompter: &'a dyn Prompter,
    store: &'a CheckpointStore,
    /// Models that failed with a transient error this session, keyed
    /// "provider/model". Biases the model menu; never a hard block.
    failed_models: HashSet<String>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        registry: &'a ProviderRegistry,
        prompter: &'a dyn Prompter,
        store: &'a CheckpointStore,
    ) -> Self {
        Self {
            registry,
            prompter,
            store,
            failed_models: HashSet::new(),
        }
    }

    /// Generate a piece of text, looping through review/fallback menus until
    /// the user accepts something or cancels. Mutates the provider/model
    /// selection on `state` and persists it on every change.
    pub async fn generate(
        &mut self,
        kind: GenerationKind,
        input: &str,
        state: &mut WorkflowState,
    ) -> Result<String> {
        // Manual is a sentinel, not a provider: skip AI entirely.
        if state.ai_provider == ProviderChoice::Manual {
            return self.manual_entry(kind);
        }

        let mut correction: Option<String> = None;
        let mut loop_state = LoopState::Generate;

        loop {
            loop_state = match loop_state {
                LoopState::Generate => {
                    let attempt = self.attempt(kind, input, correction.as_deref(), state).await;
                    match attempt {
                        Attempt::Output(raw) => {
                            let cleaned = clean_output(kind, &raw);
                            if cleaned.is_empty() {
                                LoopState::Fallback {
                                    kind: FailureKind::None,
                                    message: None,
                                }
                            } else {
                                LoopState::Review(cleaned)
                            }
                        }
                        Attempt::NoSuggestion => LoopState::Fallback {
                            kind: FailureKind::None,
                            message: None,
                        },
                        Attempt::Failed(FailureKind::ContextLimit, message) => {
                            self.mark_failed(state);
                            LoopState::ContextLimit(message)
                        }
                        Attempt::Failed(failure, message) => {
                            if failure == FailureKind::Transient {
                                self.mark_failed(state);
                            }
                            LoopState::Fallback {
                                kind: failure,
                                message: Some(message),
                            }
                        }
                    }
                }

                LoopState::Review(text) => {
                    self.review(kind, text, &mut correction, state)?
                }

                LoopState::Fallback { kind: failure, message } => {
                    self.fallback(kind, failure, message.as_deref(), state)?
                }

                LoopState::ContextLimit(message) => self.context_limit(kind, &message, state)?,

                LoopState::Done(text) => return Ok(text),
            };
        }
    }

    async fn attempt(
        &self,
        kind: GenerationKind,
        input: &str,
        correction: Option<&str>,
        state: &WorkflowState,
    ) -> Attempt {
        let Some(provider_kind) = ProviderKind::from_choice(state.ai_provider) else {
            return Attempt::NoSuggestion;
        };
        let Some(provider) = self.registry.get(provider_kind) else {
            return Attempt::Failed(
                FailureKind::None,
                format!("{} is not configured", provider_kind.label()),
            );
        };

        let model = state
            .model()
            .unwrap_or(provider_kind.default_models()[0])
            .to_string();
        let request = GenerationRequest {
            kind,
            model: &model,
            input,
            correction,
        };

        println!(
            "Generating {} with {} ({model})...",
            kind.label(),
            provider_kind.label()
        );

        match provider.generate(&request).await {
            Ok(Some(text)) if !text.trim().is_empty() => Attempt::Output(text),
            Ok(_) => {
                debug!("{} returned no suggestion", provider_kind.label());
                Attempt::NoSuggestion
            }
            Err(err) => {
                let message = err.to_string();
                warn!("generation failed: {message}");
                Attempt::Failed(classify(Some(&message)), message)
            }
        }
    }

    fn review(
        &mut self,
        kind: GenerationKind,
        text: String,
        correction: &mut Option<String>,
        state: &mut WorkflowState,
    ) -> Result<LoopState> {
        println!("Suggested {}: {}", kind.label(), text);

        let choice = self.prompter.select(
            "What do you want to do with this suggestion?",
            &[
                "Accept it",
                "Regenerate",
                "Give feedback and regenerate",
                "Edit it manually",
                "Change model",
                "Change provider",
            ],
        )?;

        Ok(match choice {
            0 => LoopState::Done(text),
            1 => LoopState::Generate,
            2 => {
                let feedback = self
                    .prompter
                    .input("What should be different?", None)?;
                *correction = Some(feedback);
                LoopState::Generate
            }
            3 => {
                let edited = self
                    .prompter
                    .input(&format!("Edit the {}", kind.label()), Some(&text))?;
                LoopState::Done(clean_output(kind, &edited))
            }
            4 => {
                self.change_model(state)?;
                LoopState::Generate
            }
            _ => {
                self.change_provider(state)?;
                LoopState::Generate
            }
        })
    }

    /// Transient failure / no-suggestion menu. "Try a different model" is
    /// omitted when the provider has no alternatives or the failure reads as
    /// provider-wide (quota/billing), where another model cannot help.
    fn fallback(
        &mut self,
        kind: GenerationKind,
        failure: FailureKind,
        message: Option<&str>,
        state: &mut WorkflowState,
    ) -> Result<LoopState> {
        match (failure, message) {
            (FailureKind::Transient, Some(msg)) => {
                println!("The provider reported a transient failure: {msg}");
            }
            (_, Some(msg)) => println!("Generation failed: {msg}"),
            (_, None) => println!("The model had no suggestion."),
        }

        let provider_wide = message.is_some_and(is_provider_wide_failure);
        let has_alternatives = ProviderKind::from_choice(state.ai_provider)
            .map(|p| p.default_models().len() > 1)
            .unwrap_or(false);
        let offer_other_model = has_alternatives && !provider_wide;

        let mut items = vec!["Retry with the same model"];
        if offer_other_model {
            items.push("Try a different model of the same provider");
        }
        items.push("Try a different provider");
        items.push("Enter it manually");

        let choice = self.prompter.select("How do you want to continue?", &items)?;
        let picked = items[choice];

        Ok(match picked {
            "Retry with the same model" => LoopState::Generate,
            "Try a different model of the same provider" => {
                self.change_model(state)?;
                LoopState::Generate
            }
            "Try a different provider" => {
                self.change_provider(state)?;
                LoopState::Generate
            }
            _ => LoopState::Done(self.manual_entry(kind)?),
        })
    }

    /// Context-limit menu: retrying the identical model is pointless and is
    /// not offered.
    fn context_limit(
        &mut self,
        kind: GenerationKind,
        message: &str,
        state: &mut WorkflowState,
    ) -> Result<LoopState> {
        println!("The input exceeds the model's context window: {message}");

        let choice = self.prompter.select(
            "How do you want to continue?",
            &[
                "Change to a model with a larger context",
                "Change provider",
                "Write it manually",
            ],
        )?;

        Ok(match choice {
            0 => {
                self.change_model(state)?;
                LoopState::Generate
            }
            1 => {
                self.change_provider(state)?;
                LoopState::Generate
            }
            _ => LoopState::Done(self.manual_entry(kind)?),
        })
    }

    fn manual_entry(&self, kind: GenerationKind) -> Result<String> {
        let text = self
            .prompter
            .input(&format!("Enter the {} manually", kind.label()), None)?;
        Ok(clean_output(kind, &text))
    }

    fn mark_failed(&mut self, state: &WorkflowState) {
        let Some(provider) = ProviderKind::from_choice(state.ai_provider) else {
            return;
        };
        let model = state.model().unwrap_or(provider.default_models()[0]);
        self.failed_models
            .insert(format!("{}/{}", provider.label(), model));
    }

    fn is_failed(&self, provider: ProviderKind, model: &str) -> bool {
        self.failed_models
            .contains(&format!("{}/{}", provider.label(), model))
    }

    /// Pick a new model for the current provider. Models that failed this
    /// session sink to the bottom of the menu but stay selectable.
    fn change_model(&mut self, state: &mut WorkflowState) -> Result<()> {
        let Some(provider) = ProviderKind::from_choice(state.ai_provider) else {
            return Ok(());
        };

        let mut fresh: Vec<&str> = Vec::new();
        let mut failed: Vec<&str> = Vec::new();
        for model in provider.default_models() {
            if self.is_failed(provider, model) {
                failed.push(model);
            } else {
                fresh.push(model);
            }
        }

        let mut items: Vec<String> = fresh.iter().map(|m| m.to_string()).collect();
        items.extend(failed.iter().map(|m| format!("{m} (failed this session)")));
        items.push("Other (enter a model id)".to_string());

        let refs: Vec<&str> = items.iter().map(String::as_str).collect();
        let choice = self
            .prompter
            .select(&format!("Pick a {} model", provider.label()), &refs)?;

        let model = if choice == refs.len() - 1 {
            self.prompter.input("Model id", None)?
        } else if choice < fresh.len() {
            fresh[choice].to_string()
        } else {
            failed[choice - fresh.len()].to_string()
        };

        state.set_provider(provider.as_choice(), Some(model));
        self.persist_selection(state);
        Ok(())
    }

    /// Pick a different provider, then a model for it.
    fn change_provider(&mut self, state: &mut WorkflowState) -> Result<()> {
        let current = ProviderKind::from_choice(state.ai_provider);
        let options: Vec<ProviderKind> = ProviderKind::all()
            .into_iter()
            .filter(|p| Some(*p) != current)
            .collect();

        let mut items: Vec<&str> = options.iter().map(|p| p.label()).collect();
        items.push("Manual (no AI)");

        let choice = self.prompter.select("Pick a provider", &items)?;
        if choice >= options.len() {
            state.set_provider(ProviderChoice::Manual, None);
            self.persist_selection(state);
            return Ok(());
        }

        let provider = options[choice];
        state.set_provider(
            provider.as_choice(),
            Some(provider.default_models()[0].to_string()),
        );
        self.persist_selection(state);
        self.change_model(state)
    }

    /// Checkpointing the new selection is resilience, not correctness.
    fn persist_selection(&self, state: &WorkflowState) {
        if let Err(err) = self.store.save(state) {
            warn!("failed to persist provider selection: {err:#}");
        }
    }
}

fn clean_output(kind: GenerationKind, raw: &str) -> String {
    match kind {
        GenerationKind::BranchName => clean::clean_branch_name(raw),
        GenerationKind::CommitMessage => clean::clean_commit_message(raw),
        GenerationKind::ReleaseNotes => raw.trim().to_string(),
    }
}
