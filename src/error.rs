//! Workflow-level error taxonomy.
//!
//! Most failure modes (git conflicts, push rejections, provider rate limits)
//! are handled interactively inside the component that hit them and never
//! surface here. The variants below are the ones that must cross module
//! boundaries with their identity intact so `main` can pick an exit code.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GeetoError {
    /// The user chose to abort at a menu. Not a failure; exits 0.
    #[error("cancelled by user")]
    Cancelled,

    /// Invalid user-supplied input (branch name, reserved name, collision).
    /// Reported immediately; the same input is never retried.
    #[error("{0}")]
    Validation(String),

    /// The repository or checkpoint location is inaccessible. The workflow
    /// cannot continue; exits non-zero with a single diagnostic line.
    #[error("fatal: {0}")]
    FatalIo(String),
}

impl GeetoError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            GeetoError::Cancelled => 0,
            GeetoError::Validation(_) => 2,
            GeetoError::FatalIo(_) => 1,
        }
    }
}
