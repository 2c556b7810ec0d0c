//! Provider failure classification.
//!
//! Provider error text is free-form prose, so these are deliberately
//! heuristic substring/regex checks rather than exact matches. The
//! classification, not the raw string, drives the fallback loop.

use regex::Regex;
use std::sync::OnceLock;

/// What a failed generation attempt means for the fallback loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Expected to succeed on retry or with another model/provider
    /// (rate limit, quota, billing).
    Transient,
    /// Input exceeds the model's token window; retrying identically is
    /// futile.
    ContextLimit,
    /// Not a recognized failure pattern.
    None,
}

/// Classify an error string from a provider.
pub fn classify(error: Option<&str>) -> FailureKind {
    if is_context_limit_failure(error) {
        FailureKind::ContextLimit
    } else if is_transient_failure(error) {
        FailureKind::Transient
    } else {
        FailureKind::None
    }
}

fn model_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // A bare model identifier: one kebab/snake token, optionally namespaced
    // with "/" (e.g. "allenai/olmo-3.1-32b-instruct"). Never an error.
    RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9._/-]*$").expect("valid regex"))
}

const TRANSIENT_PATTERNS: &[&str] = &[
    "rate limit",
    "rate-limit",
    "ratelimit",
    "too many requests",
    "quota",
    "resource exhausted",
    "resource_exhausted",
    "insufficient credit",
    "insufficient_quota",
    "payment",
    "billing",
    "subscription",
    "model not found",
    "no endpoints found",
    "overloaded",
    "temporarily unavailable",
];

const CONTEXT_LIMIT_PATTERNS: &[&str] = &[
    "context length",
    "context_length",
    "context window",
    "maximum context",
    "token limit",
    "too many tokens",
    "tokens exceed",
    "input is too long",
    "prompt is too long",
    "middle-out",
];

/// True when the string looks like a rate-limit / quota / billing /
/// model-availability failure worth retrying elsewhere. A bare model
/// identifier is never a failure, whatever substrings it happens to contain.
pub fn is_transient_failure(error: Option<&str>) -> bool {
    let Some(text) = error else { return false };
    let text = text.trim();
    if text.is_empty() || model_id_regex().is_match(text) {
        return false;
    }
    let lower = text.to_lowercase();
    TRANSIENT_PATTERNS.iter().any(|p| lower.contains(p))
}

/// True when the string indicates the input blew the model's token window.
pub fn is_context_limit_failure(error: Option<&str>) -> bool {
    let Some(text) = error else { return false };
    let text = text.trim();
    if text.is_empty() || model_id_regex().is_match(text) {
        return false;
    }
    let lower = text.to_lowercase();
    CONTEXT_LIMIT_PATTERNS.iter().any(|p| lower.contains(p))
}

/// True when a transient failure reads as account-wide (quota, billing,
/// subscription) rather than per-model, in which case switching models
/// within the same provider is pointless.
pub fn is_provider_wide_failure(error: &str) -> bool {
    let lower = error.to_lowercase();
    ["quota", "billing", "payment", "subscription", "credit"]
        .iter()
        .any(|p| lower.contains(p))
}
