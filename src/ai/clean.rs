//! Normalization of raw model output into usable git content.
//!
//! Models wrap answers in code fences, add commentary, or return several
//! candidate lines; these helpers reduce that to a single branch slug or
//! commit message.

use regex::Regex;
use std::sync::OnceLock;

/// Strip surrounding code fences and inline backticks, returning the first
/// non-empty content line.
pub fn strip_fences(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("```"))
        .map(|line| line.trim_matches('`').trim())
        .find(|line| !line.is_empty())
        .unwrap_or("")
        .to_string()
}

/// Normalize a suggestion into a kebab-case branch name. Keeps `/` so
/// prefixed names like `feat/add-login` survive; everything else outside
/// `[a-z0-9-]` collapses into hyphens.
pub fn clean_branch_name(raw: &str) -> String {
    let line = strip_fences(raw).to_lowercase();

    let mut slug = String::with_capacity(line.len());
    let mut last_dash = true; // suppress leading dash
    for c in line.chars() {
        match c {
            'a'..='z' | '0'..='9' => {
                slug.push(c);
                last_dash = false;
            }
            '/' => {
                // Segment separator resets dash collapsing.
                while slug.ends_with('-') {
                    slug.pop();
                }
                if !slug.is_empty() && !slug.ends_with('/') {
                    slug.push('/');
                }
                last_dash = true;
            }
            _ => {
                if !last_dash {
                    slug.push('-');
                    last_dash = true;
                }
            }
        }
    }
    while slug.ends_with('-') || slug.ends_with('/') {
        slug.pop();
    }

    // Branch names beyond this length stop being useful in logs and UIs.
    const MAX_LEN: usize = 60;
    if slug.len() > MAX_LEN {
        let mut cut = slug[..MAX_LEN].to_string();
        while cut.ends_with('-') || cut.ends_with('/') {
            cut.pop();
        }
        cut
    } else {
        slug
    }
}

fn conventional_commit_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(feat|fix|chore|docs|style|refactor|perf|test|build|ci|revert)(\([^)]*\))?!?: .+")
            .expect("valid regex")
    })
}

/// Extract a commit message from model output: prefer the first line shaped
/// like a conventional commit, otherwise fall back to the first content line.
pub fn clean_commit_message(raw: &str) -> String {
    let lines: Vec<&str> = raw
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("```"))
        .map(|l| l.trim_matches('`').trim())
        .filter(|l| !l.is_empty())
        .collect();

    lines
        .iter()
        .find(|l| conventional_commit_regex().is_match(l))
        .or_else(|| lines.first())
        .unwrap_or(&"")
        .to_string()
}

/// Validate a branch name against the subset of git ref rules that users
/// actually trip over. Returns the reason the name is invalid, if any.
pub fn branch_name_error(name: &str) -> Option<String> {
    if name.is_empty() {
        return Some("branch name is empty".to_string());
    }
    if name.eq_ignore_ascii_case("head") {
        return Some("'HEAD' is a reserved name".to_string());
    }
    if name.starts_with('-') || name.starts_with('.') || name.starts_with('/') {
        return Some(format!("branch name cannot start with '{}'", &name[..1]));
    }
    if name.ends_with('/') || name.ends_with(".lock") {
        return Some("branch name has an invalid suffix".to_string());
    }
    if name.contains("..") || name.contains("//") || name.contains("@{") {
        return Some("branch name contains an invalid sequence".to_string());
    }
    if name
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || "~^:?*[\\".contains(c))
    {
        return Some("branch name contains invalid characters".to_string());
    }
    None
}
