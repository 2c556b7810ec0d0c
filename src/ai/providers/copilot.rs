//! GitHub Copilot chat completions client.

use anyhow::{anyhow, Result};
use reqwest::Client;
use tracing::debug;

use super::{
    build_http_client, chat_request, extract_chat_text, ChatResponse, GenerationFuture,
    GenerationRequest, Provider, ProviderKind,
};

const COPILOT_CHAT_COMPLETIONS_URL: &str = "https://api.githubcopilot.com/chat/completions";
const COPILOT_TOKEN_VAR: &str = "GITHUB_COPILOT_TOKEN";

pub struct CopilotProvider {
    client: Client,
    /// Pre-computed `"Bearer <token>"` header value.
    cached_auth_header: Option<String>,
}

impl CopilotProvider {
    pub fn from_env() -> Self {
        Self {
            client: build_http_client(),
            cached_auth_header: std::env::var(COPILOT_TOKEN_VAR)
                .ok()
                .filter(|t| !t.is_empty())
                .map(|t| format!("Bearer {t}")),
        }
    }
}

impl Provider for CopilotProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Copilot
    }

    fn generate<'a>(&'a self, req: &'a GenerationRequest<'a>) -> GenerationFuture<'a> {
        Box::pin(async move {
            let auth = self
                .cached_auth_header
                .as_deref()
                .ok_or_else(|| anyhow!("{COPILOT_TOKEN_VAR} is not set"))?;

            let body = chat_request(req, req.model);
            debug!("copilot request: model={}", req.model);

            let response = self
                .client
                .post(COPILOT_CHAT_COMPLETIONS_URL)
                .header("Authorization", auth)
                .header("Copilot-Integration-Id", "vscode-chat")
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(anyhow!("Copilot API error ({status}): {body}"));
            }

            let parsed: ChatResponse = response.json().await?;
            Ok(extract_chat_text(parsed))
        })
    }
}
