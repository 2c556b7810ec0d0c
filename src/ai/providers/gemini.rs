//! Google Gemini generateContent client.

use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    build_http_client, build_prompt, GenerationFuture, GenerationRequest, Provider, ProviderKind,
};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const GEMINI_API_KEY_VAR: &str = "GEMINI_API_KEY";

pub struct GeminiProvider {
    client: Client,
    api_key: Option<String>,
}

impl GeminiProvider {
    pub fn from_env() -> Self {
        Self {
            client: build_http_client(),
            api_key: std::env::var(GEMINI_API_KEY_VAR)
                .ok()
                .filter(|k| !k.is_empty()),
        }
    }
}

#[derive(Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "systemInstruction")]
    system_instruction: Content,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

impl Provider for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn generate<'a>(&'a self, req: &'a GenerationRequest<'a>) -> GenerationFuture<'a> {
        Box::pin(async move {
            let api_key = self
                .api_key
                .as_deref()
                .ok_or_else(|| anyhow!("{GEMINI_API_KEY_VAR} is not set"))?;

            let (system, user) = build_prompt(req);
            let body = GenerateContentRequest {
                contents: vec![Content {
                    parts: vec![Part { text: user }],
                }],
                system_instruction: Content {
                    parts: vec![Part { text: system }],
                },
            };

            let url = format!("{GEMINI_BASE_URL}/{}:generateContent", req.model);
            debug!("gemini request: model={}", req.model);

            let response = self
                .client
                .post(&url)
                .header("x-goog-api-key", api_key)
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(anyhow!("Gemini API error ({status}): {body}"));
            }

            let parsed: GenerateContentResponse = response.json().await?;
            Ok(extract_text(parsed))
        })
    }
}

fn extract_text(response: GenerateContentResponse) -> Option<String> {
    let text = response
        .candidates
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .map(|p| p.text)
        .collect::<Vec<_>>()
        .join("")
        .trim()
        .to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
