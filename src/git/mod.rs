//! Git process collaborator.
//!
//! All mutating git operations are issued as command-line invocations
//! against the repository root; only git's exit-code/stderr contract is
//! relied on, plus simple line splitting of porcelain output. The
//! [`GitCli`] trait is the seam that lets the safe-operation layer be
//! tested against a scripted git.

pub mod safe;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Outcome of one git invocation.
#[derive(Debug, Clone, Default)]
pub struct GitOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl GitOutput {
    pub fn ok(stdout: &str) -> Self {
        Self {
            success: true,
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    pub fn err(stderr: &str) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    /// Combined stdout+stderr, lowercased, for failure-mode pattern checks.
    /// Git is not consistent about which stream carries diagnostics.
    pub fn combined_lower(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr).to_lowercase()
    }
}

pub trait GitCli {
    fn run(&self, args: &[&str]) -> Result<GitOutput>;
}

/// Real git, shelling out in the repository root.
pub struct SystemGit {
    repo_root: PathBuf,
}

impl SystemGit {
    pub fn new(repo_root: PathBuf) -> Self {
        Self { repo_root }
    }
}

impl GitCli for SystemGit {
    fn run(&self, args: &[&str]) -> Result<GitOutput> {
        debug!("git {}", args.join(" "));
        let output = std::process::Command::new("git")
            .args(args)
            .current_dir(&self.repo_root)
            .output()
            .with_context(|| format!("failed to run git {}", args.join(" ")))?;

        Ok(GitOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Find the repository root by searching upward for `.git`.
pub fn find_git_root(start: &Path) -> Option<PathBuf> {
    let mut path = start;
    loop {
        if path.join(".git").exists() {
            return Some(path.to_path_buf());
        }
        path = path.parent()?;
    }
}

/// Name of the currently checked-out branch.
pub fn current_branch(git: &dyn GitCli) -> Result<String> {
    let out = git.run(&["rev-parse", "--abbrev-ref", "HEAD"])?;
    if !out.success {
        anyhow::bail!("failed to determine current branch: {}", out.stderr.trim());
    }
    Ok(out.stdout.trim().to_string())
}

/// Paths currently staged for commit. Always read live from git, never from
/// the checkpoint, since staging can change outside the tool.
pub fn staged_files(git: &dyn GitCli) -> Result<Vec<String>> {
    let out = git.run(&["diff", "--cached", "--name-only"])?;
    if !out.success {
        anyhow::bail!("failed to list staged files: {}", out.stderr.trim());
    }
    Ok(lines(&out.stdout))
}

/// Paths with unstaged or untracked changes, from porcelain status.
pub fn changed_files(git: &dyn GitCli) -> Result<Vec<String>> {
    let out = git.run(&["status", "--porcelain"])?;
    if !out.success {
        anyhow::bail!("failed to read git status: {}", out.stderr.trim());
    }
    // Porcelain lines are "XY <path>"; drop the two status columns.
    // Renames read "XY old -> new"; only the new path is stageable.
    Ok(out
        .stdout
        .lines()
        .filter_map(|line| line.get(3..))
        .map(|path| match path.split_once(" -> ") {
            Some((_, renamed)) => renamed,
            None => path,
        })
        .map(str::to_string)
        .filter(|p| !p.is_empty())
        .collect())
}

/// Whether the working tree has any uncommitted changes (staged or not).
pub fn has_uncommitted_changes(git: &dyn GitCli) -> Result<bool> {
    let out = git.run(&["status", "--porcelain"])?;
    if !out.success {
        anyhow::bail!("failed to read git status: {}", out.stderr.trim());
    }
    Ok(!out.stdout.trim().is_empty())
}

/// Whether a local branch with this name already exists.
pub fn branch_exists(git: &dyn GitCli, name: &str) -> Result<bool> {
    let spec = format!("refs/heads/{name}");
    let out = git.run(&["show-ref", "--verify", "--quiet", &spec])?;
    Ok(out.success)
}

/// A merge is in progress when MERGE_HEAD resolves.
pub fn merge_in_progress(git: &dyn GitCli) -> Result<bool> {
    let out = git.run(&["rev-parse", "-q", "--verify", "MERGE_HEAD"])?;
    Ok(out.success)
}

/// A rebase is in progress when REBASE_HEAD resolves.
pub fn rebase_in_progress(git: &dyn GitCli) -> Result<bool> {
    let out = git.run(&["rev-parse", "-q", "--verify", "REBASE_HEAD"])?;
    Ok(out.success)
}

/// Paths left unmerged by a conflicted merge/checkout.
pub fn unmerged_files(git: &dyn GitCli) -> Result<Vec<String>> {
    let out = git.run(&["diff", "--name-only", "--diff-filter=U"])?;
    if !out.success {
        anyhow::bail!("failed to list unmerged files: {}", out.stderr.trim());
    }
    Ok(lines(&out.stdout))
}

/// Short stat of the staged diff, used as AI generation input.
pub fn staged_diff_summary(git: &dyn GitCli) -> Result<String> {
    let out = git.run(&["diff", "--cached", "--stat"])?;
    if !out.success {
        anyhow::bail!("failed to summarize staged diff: {}", out.stderr.trim());
    }
    Ok(out.stdout.trim().to_string())
}

fn lines(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
pub mod fake {
    //! Scripted git for unit tests: a queue of canned results keyed by the
    //! leading argument pattern, plus a log of everything that was run.

    use super::{GitCli, GitOutput};
    use anyhow::Result;
    use std::cell::RefCell;

    /// One expectation: commands whose joined args start with `prefix` get
    /// this result. Expectations are consumed front-to-back; a command that
    /// matches no remaining expectation succeeds with empty output.
    pub struct FakeGit {
        responses: RefCell<Vec<(String, GitOutput)>>,
        pub calls: RefCell<Vec<String>>,
    }

    impl FakeGit {
        pub fn new(responses: Vec<(&str, GitOutput)>) -> Self {
            Self {
                responses: RefCell::new(
                    responses
                        .into_iter()
                        .map(|(p, o)| (p.to_string(), o))
                        .collect(),
                ),
                calls: RefCell::new(Vec::new()),
            }
        }

        pub fn ran(&self, prefix: &str) -> bool {
            self.calls.borrow().iter().any(|c| c.starts_with(prefix))
        }

        pub fn count(&self, prefix: &str) -> usize {
            self.calls
                .borrow()
                .iter()
                .filter(|c| c.starts_with(prefix))
                .count()
        }
    }

    impl GitCli for FakeGit {
        fn run(&self, args: &[&str]) -> Result<GitOutput> {
            let cmd = args.join(" ");
            self.calls.borrow_mut().push(cmd.clone());

            let mut responses = self.responses.borrow_mut();
            if let Some(pos) = responses.iter().position(|(p, _)| cmd.starts_with(p.as_str())) {
                let (_, out) = responses.remove(pos);
                return Ok(out);
            }
            Ok(GitOutput::ok(""))
        }
    }
}
