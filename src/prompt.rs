//! Interactive prompt collaborator.
//!
//! Every component that needs a user decision (safe git recovery menus, the
//! AI fallback loop, step confirmations) goes through the [`Prompter`] trait
//! rather than talking to the terminal directly, so the decision logic stays
//! testable with a scripted implementation.

use anyhow::Result;
use console::style;
use dialoguer::{theme::ColorfulTheme, Confirm, Input, MultiSelect, Select};

use crate::error::GeetoError;

pub trait Prompter {
    /// Present a single-choice menu; returns the selected index.
    fn select(&self, prompt: &str, items: &[&str]) -> Result<usize>;

    /// Present a multi-choice menu; returns the selected indices.
    fn multi_select(&self, prompt: &str, items: &[&str]) -> Result<Vec<usize>>;

    /// Yes/no question with a default answer.
    fn confirm(&self, prompt: &str, default: bool) -> Result<bool>;

    /// Free-form text input, optionally pre-filled.
    fn input(&self, prompt: &str, initial: Option<&str>) -> Result<String>;
}

/// Terminal prompter backed by dialoguer.
pub struct ConsolePrompter {
    theme: ColorfulTheme,
}

impl ConsolePrompter {
    pub fn new() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }
}

impl Default for ConsolePrompter {
    fn default() -> Self {
        Self::new()
    }
}

impl Prompter for ConsolePrompter {
    fn select(&self, prompt: &str, items: &[&str]) -> Result<usize> {
        // Esc maps to Cancelled so any menu is an exit point.
        let choice = Select::with_theme(&self.theme)
            .with_prompt(prompt)
            .items(items)
            .default(0)
            .interact_opt()?;
        choice.ok_or_else(|| GeetoError::Cancelled.into())
    }

    fn multi_select(&self, prompt: &str, items: &[&str]) -> Result<Vec<usize>> {
        let choice = MultiSelect::with_theme(&self.theme)
            .with_prompt(prompt)
            .items(items)
            .interact_opt()?;
        choice.ok_or_else(|| GeetoError::Cancelled.into())
    }

    fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        let answer = Confirm::with_theme(&self.theme)
            .with_prompt(prompt)
            .default(default)
            .interact_opt()?;
        answer.ok_or_else(|| GeetoError::Cancelled.into())
    }

    fn input(&self, prompt: &str, initial: Option<&str>) -> Result<String> {
        let mut input = Input::<String>::with_theme(&self.theme).with_prompt(prompt);
        if let Some(text) = initial {
            input = input.with_initial_text(text);
        }
        Ok(input.allow_empty(false).interact_text()?)
    }
}

/// Print a dimmed informational line (recovery instructions, hints).
pub fn hint(text: &str) {
    println!("  {}", style(text).dim());
}
