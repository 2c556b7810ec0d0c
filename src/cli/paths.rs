//! Repository root resolution.

use std::path::PathBuf;

use crate::error::GeetoError;
use crate::git::find_git_root;

/// Locate the repository root from the current directory. Running outside a
/// git repository is a fatal precondition failure.
pub fn resolve_repo_root() -> Result<PathBuf, GeetoError> {
    let cwd = std::env::current_dir()
        .map_err(|err| GeetoError::FatalIo(format!("cannot read current directory: {err}")))?;
    find_git_root(&cwd).ok_or_else(|| {
        GeetoError::FatalIo(format!(
            "{} is not inside a git repository",
            cwd.display()
        ))
    })
}
