//! AI provider abstraction.
//!
//! Every provider implements [`Provider::generate`] behind a uniform
//! request shape; nothing outside this module knows a provider's wire
//! format. Providers surface their error bodies as error strings so the
//! classifier can pattern-match them.

mod copilot;
mod gemini;
mod openrouter;

pub use copilot::CopilotProvider;
pub use gemini::GeminiProvider;
pub use openrouter::OpenRouterProvider;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::checkpoint::ProviderChoice;

/// Default request timeout; a generation attempt that never returns must
/// not hang the workflow.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// What kind of text is being generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationKind {
    BranchName,
    CommitMessage,
    ReleaseNotes,
}

impl GenerationKind {
    pub fn label(&self) -> &'static str {
        match self {
            GenerationKind::BranchName => "branch name",
            GenerationKind::CommitMessage => "commit message",
            GenerationKind::ReleaseNotes => "release notes",
        }
    }
}

/// A real generation backend (excludes the `Manual` sentinel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Gemini,
    Copilot,
    Openrouter,
}

impl ProviderKind {
    pub fn all() -> [ProviderKind; 3] {
        [
            ProviderKind::Gemini,
            ProviderKind::Copilot,
            ProviderKind::Openrouter,
        ]
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "Gemini",
            ProviderKind::Copilot => "GitHub Copilot",
            ProviderKind::Openrouter => "OpenRouter",
        }
    }

    /// Known-good models offered in the model menu, first entry is the
    /// default.
    pub fn default_models(&self) -> &'static [&'static str] {
        match self {
            ProviderKind::Gemini => &["gemini-2.5-flash", "gemini-2.5-pro", "gemini-2.0-flash"],
            ProviderKind::Copilot => &["gpt-4o", "gpt-4o-mini", "o3-mini"],
            ProviderKind::Openrouter => &[
                "anthropic/claude-3.5-sonnet",
                "openai/gpt-4o",
                "meta-llama/llama-3.1-70b-instruct",
            ],
        }
    }

    pub fn as_choice(&self) -> ProviderChoice {
        match self {
            ProviderKind::Gemini => ProviderChoice::Gemini,
            ProviderKind::Copilot => ProviderChoice::Copilot,
            ProviderKind::Openrouter => ProviderChoice::Openrouter,
        }
    }

    pub fn from_choice(choice: ProviderChoice) -> Option<ProviderKind> {
        match choice {
            ProviderChoice::Gemini => Some(ProviderKind::Gemini),
            ProviderChoice::Copilot => Some(ProviderKind::Copilot),
            ProviderChoice::Openrouter => Some(ProviderKind::Openrouter),
            ProviderChoice::Manual => None,
        }
    }
}

/// One generation attempt.
#[derive(Debug, Clone)]
pub struct GenerationRequest<'a> {
    pub kind: GenerationKind,
    pub model: &'a str,
    /// Change context: staged diff summary or a user-written description.
    pub input: &'a str,
    /// User feedback on the previous suggestion, if regenerating.
    pub correction: Option<&'a str>,
}

pub type GenerationFuture<'a> = Pin<Box<dyn Future<Output = Result<Option<String>>> + Send + 'a>>;

pub trait Provider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Generate text for the request. `Ok(None)` means the provider had no
    /// suggestion; `Err` carries the provider's error text for the
    /// classifier.
    fn generate<'a>(&'a self, req: &'a GenerationRequest<'a>) -> GenerationFuture<'a>;
}

/// Build the instruction/user prompt pair shared by all providers.
pub fn build_prompt(req: &GenerationRequest<'_>) -> (String, String) {
    let system = match req.kind {
        GenerationKind::BranchName => {
            "You name git branches. Respond with exactly one kebab-case branch name \
             (optionally prefixed like feat/ or fix/), under 60 characters. \
             No commentary, no code fences."
        }
        GenerationKind::CommitMessage => {
            "You write git commit messages in Conventional Commits style \
             (type(scope): summary). Respond with exactly one subject line under \
             72 characters. No commentary, no code fences."
        }
        GenerationKind::ReleaseNotes => {
            "You write concise release notes in markdown: a short summary followed \
             by a bulleted list of user-visible changes."
        }
    };

    let mut user = format!("Changes:\n{}", req.input);
    if let Some(correction) = req.correction {
        user.push_str("\n\nThe previous suggestion was not acceptable. Feedback: ");
        user.push_str(correction);
    }

    (system.to_string(), user)
}

/// Shared reqwest client construction with the bounded timeout.
pub(crate) fn build_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
        .build()
        .expect("failed to build HTTP client")
}

// OpenAI-compatible chat wire format, shared by Copilot and OpenRouter.

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChoice {
    pub message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

pub(crate) fn chat_request(req: &GenerationRequest<'_>, model: &str) -> ChatRequest {
    let (system, user) = build_prompt(req);
    ChatRequest {
        model: model.to_string(),
        messages: vec![
            ChatMessage {
                role: "system",
                content: system,
            },
            ChatMessage {
                role: "user",
                content: user,
            },
        ],
        temperature: 0.4,
    }
}

pub(crate) fn extract_chat_text(response: ChatResponse) -> Option<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

/// All configured providers, selected by kind at a single dispatch site.
pub struct ProviderRegistry {
    providers: Vec<Box<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: vec![
                Box::new(GeminiProvider::from_env()),
                Box::new(CopilotProvider::from_env()),
                Box::new(OpenRouterProvider::from_env()),
            ],
        }
    }

    #[cfg(test)]
    pub fn with_providers(providers: Vec<Box<dyn Provider>>) -> Self {
        Self { providers }
    }

    pub fn get(&self, kind: ProviderKind) -> Option<&dyn Provider> {
        self.providers
            .iter()
            .find(|p| p.kind() == kind)
            .map(|p| p.as_ref())
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
