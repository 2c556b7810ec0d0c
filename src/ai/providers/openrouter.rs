//! OpenRouter chat completions client.

use anyhow::{anyhow, Result};
use reqwest::Client;
use tracing::debug;

use super::{
    build_http_client, chat_request, extract_chat_text, ChatResponse, GenerationFuture,
    GenerationRequest, Provider, ProviderKind,
};

const OPENROUTER_CHAT_COMPLETIONS_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const OPENROUTER_API_KEY_VAR: &str = "OPENROUTER_API_KEY";

pub struct OpenRouterProvider {
    client: Client,
    /// Pre-computed `"Bearer <key>"` header value.
    cached_auth_header: Option<String>,
}

impl OpenRouterProvider {
    pub fn from_env() -> Self {
        Self {
            client: build_http_client(),
            cached_auth_header: std::env::var(OPENROUTER_API_KEY_VAR)
                .ok()
                .filter(|k| !k.is_empty())
                .map(|k| format!("Bearer {k}")),
        }
    }
}

impl Provider for OpenRouterProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Openrouter
    }

    fn generate<'a>(&'a self, req: &'a GenerationRequest<'a>) -> GenerationFuture<'a> {
        Box::pin(async move {
            let auth = self
                .cached_auth_header
                .as_deref()
                .ok_or_else(|| anyhow!("{OPENROUTER_API_KEY_VAR} is not set"))?;

            let body = chat_request(req, req.model);
            debug!("openrouter request: model={}", req.model);

            let response = self
                .client
                .post(OPENROUTER_CHAT_COMPLETIONS_URL)
                .header("Authorization", auth)
                .header("X-Title", "geeto")
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(anyhow!("OpenRouter API error ({status}): {body}"));
            }

            let parsed: ChatResponse = response.json().await?;
            Ok(extract_chat_text(parsed))
        })
    }
}
