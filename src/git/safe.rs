//! Safe git operations.
//!
//! Each operation wraps a raw git invocation with pre-checks, failure-mode
//! pattern matching over git's stderr, and an interactive recovery menu.
//! Expected failures (conflicts, rejected pushes, auth errors) come back as
//! a [`GitOpResult`], never as `Err`; only genuinely unexpected conditions
//! propagate. No operation discards uncommitted work without an explicit
//! extra confirmation beyond the initial menu choice.

use anyhow::Result;
use tracing::{info, warn};

use crate::error::GeetoError;
use crate::prompt::{hint, Prompter};

use super::{merge_in_progress, rebase_in_progress, staged_files, unmerged_files, GitCli};

/// Outcome of one safe operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitOpResult {
    pub success: bool,
    /// Operation left the repository with unresolved conflict markers that
    /// the user chose to handle manually.
    pub conflict: bool,
    /// A commit sub-workflow must run before this operation can proceed.
    /// The operation never commits on the user's behalf.
    pub commit_needed: bool,
    pub error: Option<String>,
}

impl GitOpResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn conflicted() -> Self {
        Self {
            success: false,
            conflict: true,
            ..Default::default()
        }
    }

    fn needs_commit() -> Self {
        Self {
            success: false,
            commit_needed: true,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CheckoutOpts {
    pub create: bool,
    pub force: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CommitOpts {
    pub amend: bool,
    pub no_verify: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MergeOpts {
    pub no_ff: bool,
    pub squash: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PushOpts {
    pub set_upstream: bool,
    pub force: bool,
}

/// Maximum attempts for a push before giving up.
const MAX_PUSH_ATTEMPTS: usize = 3;

fn looks_like_local_changes(lower: &str) -> bool {
    lower.contains("would be overwritten") || lower.contains("local changes")
}

fn looks_like_conflict(lower: &str) -> bool {
    lower.contains("conflict") || lower.contains("automatic merge failed")
}

fn looks_like_auth_failure(lower: &str) -> bool {
    lower.contains("authentication failed")
        || lower.contains("permission denied")
        || lower.contains("could not read username")
        || lower.contains("403")
}

fn looks_like_rejected(lower: &str) -> bool {
    lower.contains("non-fast-forward")
        || lower.contains("fetch first")
        || lower.contains("[rejected]")
        || lower.contains("rejected")
}

fn looks_like_network_failure(lower: &str) -> bool {
    lower.contains("could not resolve host")
        || lower.contains("connection refused")
        || lower.contains("connection reset")
        || lower.contains("timed out")
        || lower.contains("network is unreachable")
}

fn looks_like_missing_upstream(lower: &str) -> bool {
    lower.contains("has no upstream branch") || lower.contains("--set-upstream")
}

fn looks_like_hook_failure(lower: &str) -> bool {
    lower.contains("pre-commit") || lower.contains("hook") || lower.contains("husky")
}

/// Checkout with escalating recovery: plain checkout, then a three-way merge
/// checkout when local changes are in the way, then an interactive menu.
pub fn safe_checkout(
    git: &dyn GitCli,
    prompter: &dyn Prompter,
    branch: &str,
    opts: CheckoutOpts,
) -> Result<GitOpResult> {
    if opts.create {
        let out = git.run(&["checkout", "-b", branch])?;
        return Ok(if out.success {
            info!("created and switched to branch {branch}");
            GitOpResult::ok()
        } else {
            GitOpResult::failed(out.stderr.trim())
        });
    }

    if opts.force {
        return force_checkout(git, prompter, branch);
    }

    let out = git.run(&["checkout", branch])?;
    if out.success {
        return Ok(GitOpResult::ok());
    }

    let lower = out.combined_lower();
    if !looks_like_local_changes(&lower) {
        return Ok(GitOpResult::failed(out.stderr.trim()));
    }

    // Local changes block the switch; try carrying them across with a
    // three-way merge checkout before bothering the user.
    println!("Local changes prevent switching to '{branch}'; trying a three-way merge checkout...");
    let merged = git.run(&["checkout", "--merge", branch])?;
    if merged.success {
        let conflicts = unmerged_files(git)?;
        if conflicts.is_empty() {
            println!("Switched to '{branch}' carrying your local changes.");
            return Ok(GitOpResult::ok());
        }
        return resolve_checkout_conflict(git, prompter, branch, &conflicts);
    }

    // Three-way checkout failed outright; fall back to the recovery menu.
    checkout_recovery_menu(git, prompter, branch)
}

fn resolve_checkout_conflict(
    git: &dyn GitCli,
    prompter: &dyn Prompter,
    branch: &str,
    conflicts: &[String],
) -> Result<GitOpResult> {
    println!(
        "Checkout produced conflicts in {} file(s):",
        conflicts.len()
    );
    for file in conflicts {
        println!("  {file}");
    }

    let choice = prompter.select(
        &format!("How do you want to handle the conflicts on '{branch}'?"),
        &[
            "Resolve them manually (stay here with conflict markers)",
            "Abort and restore the previous state",
        ],
    )?;

    match choice {
        0 => {
            hint("Edit the conflicted files, then `git add <file>` each one.");
            Ok(GitOpResult {
                success: true,
                conflict: true,
                ..Default::default()
            })
        }
        _ => {
            abort_in_progress_merge(git)?;
            Ok(GitOpResult::failed("checkout aborted; previous state restored"))
        }
    }
}

/// Abort whatever merge-ish state the checkout left behind, escalating
/// through the abort commands until one succeeds.
fn abort_in_progress_merge(git: &dyn GitCli) -> Result<()> {
    let abort = git.run(&["merge", "--abort"])?;
    if abort.success {
        return Ok(());
    }
    let checkout_abort = git.run(&["checkout", "--merge", "--abort"])?;
    if checkout_abort.success {
        return Ok(());
    }
    let reset = git.run(&["reset", "--merge"])?;
    if !reset.success {
        warn!("all abort strategies failed: {}", reset.stderr.trim());
    }
    Ok(())
}

fn checkout_recovery_menu(
    git: &dyn GitCli,
    prompter: &dyn Prompter,
    branch: &str,
) -> Result<GitOpResult> {
    let choice = prompter.select(
        &format!("Could not switch to '{branch}' with local changes present. What now?"),
        &[
            "Stash the changes and retry",
            "Commit the changes first",
            "Force checkout (discards local changes)",
            "Cancel",
        ],
    )?;

    match choice {
        0 => {
            let stash = git.run(&["stash", "push", "-u", "-m", "geeto: auto-stash before checkout"])?;
            if !stash.success {
                return Ok(GitOpResult::failed(format!(
                    "stash failed: {}",
                    stash.stderr.trim()
                )));
            }
            println!("Changes stashed. Restore them later with `git stash pop`.");
            let retry = git.run(&["checkout", branch])?;
            Ok(if retry.success {
                GitOpResult::ok()
            } else {
                GitOpResult::failed(retry.stderr.trim())
            })
        }
        1 => Ok(GitOpResult::needs_commit()),
        2 => force_checkout(git, prompter, branch),
        _ => Err(GeetoError::Cancelled.into()),
    }
}

/// Force checkout is the one checkout path that loses work, so it always
/// asks again with explicit data-loss wording, defaulting to "no".
fn force_checkout(
    git: &dyn GitCli,
    prompter: &dyn Prompter,
    branch: &str,
) -> Result<GitOpResult> {
    let confirmed = prompter.confirm(
        "Force checkout will permanently discard uncommitted changes. Continue?",
        false,
    )?;
    if !confirmed {
        return Ok(GitOpResult::failed("force checkout declined"));
    }
    let out = git.run(&["checkout", "-f", branch])?;
    Ok(if out.success {
        GitOpResult::ok()
    } else {
        GitOpResult::failed(out.stderr.trim())
    })
}

/// Commit with special cases for an in-progress merge (no staged changes
/// required) and an empty index (offer to stage everything first).
pub fn safe_commit(
    git: &dyn GitCli,
    prompter: &dyn Prompter,
    message: &str,
    opts: CommitOpts,
) -> Result<GitOpResult> {
    let merging = merge_in_progress(git)?;

    if !merging && staged_files(git)?.is_empty() {
        let choice = prompter.select(
            "Nothing is staged. What do you want to do?",
            &["Stage all changes and commit", "Cancel"],
        )?;
        if choice != 0 {
            return Err(GeetoError::Cancelled.into());
        }
        let add = git.run(&["add", "-A"])?;
        if !add.success {
            return Ok(GitOpResult::failed(format!(
                "staging failed: {}",
                add.stderr.trim()
            )));
        }
    }

    let out = run_commit(git, message, opts)?;
    if out.success {
        return Ok(GitOpResult::ok());
    }

    let lower = out.combined_lower();
    if looks_like_hook_failure(&lower) && !opts.no_verify {
        println!("A commit hook rejected the commit:");
        hint(out.stdout.trim());
        let bypass = prompter.confirm("Retry with hooks bypassed (--no-verify)?", false)?;
        if bypass {
            let retry = run_commit(
                git,
                message,
                CommitOpts {
                    no_verify: true,
                    ..opts
                },
            )?;
            return Ok(if retry.success {
                GitOpResult::ok()
            } else {
                GitOpResult::failed(retry.stderr.trim())
            });
        }
    }

    Ok(GitOpResult::failed(format!(
        "{}\n{}",
        out.stdout.trim(),
        out.stderr.trim()
    )))
}

fn run_commit(git: &dyn GitCli, message: &str, opts: CommitOpts) -> Result<super::GitOutput> {
    let mut args = vec!["commit", "-m", message];
    if opts.amend {
        args.push("--amend");
    }
    if opts.no_verify {
        args.push("--no-verify");
    }
    git.run(&args)
}

/// Merge with a hard precondition: never start on top of an in-progress
/// merge or rebase. On conflict, offer abort or manual resolution.
pub fn safe_merge(
    git: &dyn GitCli,
    prompter: &dyn Prompter,
    source: &str,
    opts: MergeOpts,
) -> Result<GitOpResult> {
    if merge_in_progress(git)? {
        return Ok(GitOpResult::failed(
            "a merge is already in progress; finish it or run `git merge --abort` first",
        ));
    }
    if rebase_in_progress(git)? {
        return Ok(GitOpResult::failed(
            "a rebase is already in progress; finish it or run `git rebase --abort` first",
        ));
    }

    let mut args = vec!["merge"];
    if opts.no_ff {
        args.push("--no-ff");
    }
    if opts.squash {
        args.push("--squash");
    }
    args.push(source);

    let out = git.run(&args)?;
    if out.success {
        return Ok(GitOpResult::ok());
    }

    let lower = out.combined_lower();
    if looks_like_conflict(&lower) {
        return merge_conflict_menu(git, prompter, source);
    }

    Ok(GitOpResult::failed(out.stderr.trim()))
}

fn merge_conflict_menu(
    git: &dyn GitCli,
    prompter: &dyn Prompter,
    source: &str,
) -> Result<GitOpResult> {
    let conflicts = unmerged_files(git)?;
    println!(
        "Merging '{source}' hit conflicts in {} file(s).",
        conflicts.len()
    );

    let choice = prompter.select(
        "How do you want to proceed?",
        &[
            "Abort the merge (restore the previous state)",
            "Resolve the conflicts manually",
        ],
    )?;

    match choice {
        0 => {
            let abort = git.run(&["merge", "--abort"])?;
            if !abort.success {
                warn!("merge --abort failed: {}", abort.stderr.trim());
                return Ok(GitOpResult::failed(format!(
                    "merge abort failed: {}",
                    abort.stderr.trim()
                )));
            }
            Ok(GitOpResult::failed("merge aborted; previous state restored"))
        }
        _ => {
            hint("Resolve each conflicted file, then:");
            hint("  git add <file>      (for every resolved file)");
            hint("  git commit          (to finish the merge)");
            hint("or run `git merge --abort` to back out.");
            Ok(GitOpResult::conflicted())
        }
    }
}

/// Push with a bounded retry loop that classifies each failure: missing
/// upstream (one automatic retry with `-u`), auth, rejected/non-fast-forward,
/// and network errors each get their own recovery path. Anything else is
/// terminal and returned verbatim.
pub fn safe_push(
    git: &dyn GitCli,
    prompter: &dyn Prompter,
    branch: &str,
    opts: PushOpts,
) -> Result<GitOpResult> {
    let mut set_upstream = opts.set_upstream;
    let mut force = opts.force;
    let mut last_error = String::new();

    for attempt in 1..=MAX_PUSH_ATTEMPTS {
        if force {
            let confirmed = prompter.confirm(
                "Force push will overwrite the remote branch and can discard others' work. Continue?",
                false,
            )?;
            if !confirmed {
                return Ok(GitOpResult::failed("force push declined"));
            }
        }

        let mut args = vec!["push"];
        if set_upstream {
            args.push("-u");
        }
        args.push("origin");
        args.push(branch);
        if force {
            args.push("--force");
        }

        let out = git.run(&args)?;
        if out.success {
            return Ok(GitOpResult::ok());
        }

        let lower = out.combined_lower();
        last_error = out.stderr.trim().to_string();
        warn!("push attempt {attempt}/{MAX_PUSH_ATTEMPTS} failed: {last_error}");

        if looks_like_missing_upstream(&lower) && !set_upstream {
            // Retries once automatically; the flag flip makes it one-shot.
            println!("No upstream configured; retrying with --set-upstream.");
            set_upstream = true;
            continue;
        }

        if looks_like_auth_failure(&lower) {
            println!("Push failed: authentication error.");
            hint("Check your credentials (SSH key, credential helper, or token scope).");
            if attempt < MAX_PUSH_ATTEMPTS
                && prompter.confirm("Retry the push?", true)?
            {
                continue;
            }
            return Ok(GitOpResult::failed(format!(
                "authentication failed: {last_error}"
            )));
        }

        if looks_like_rejected(&lower) {
            let choice = prompter.select(
                "The remote rejected the push (non-fast-forward). What now?",
                &[
                    "Pull the remote changes and retry",
                    "Force push (overwrites the remote branch)",
                    "Cancel",
                ],
            )?;
            match choice {
                0 => {
                    let pulled = safe_pull(git, prompter, "origin", branch)?;
                    if !pulled.success {
                        return Ok(pulled);
                    }
                    continue;
                }
                1 => {
                    force = true;
                    continue;
                }
                _ => return Err(GeetoError::Cancelled.into()),
            }
        }

        if looks_like_network_failure(&lower) {
            println!("Push failed: network error.");
            if attempt < MAX_PUSH_ATTEMPTS && prompter.confirm("Retry the push?", true)? {
                continue;
            }
            return Ok(GitOpResult::failed(format!("network error: {last_error}")));
        }

        // Unrecognized failure mode: terminal, returned verbatim.
        return Ok(GitOpResult::failed(last_error));
    }

    Ok(GitOpResult::failed(format!(
        "push failed after {MAX_PUSH_ATTEMPTS} attempts: {last_error}"
    )))
}

/// Pull with auto-stash: uncommitted changes are stashed (after explicit
/// confirmation) before the pull and offered back afterward. Pull conflicts
/// reuse the merge conflict menu.
pub fn safe_pull(
    git: &dyn GitCli,
    prompter: &dyn Prompter,
    remote: &str,
    branch: &str,
) -> Result<GitOpResult> {
    let mut stashed = false;
    if super::has_uncommitted_changes(git)? {
        let stash_first = prompter.confirm(
            "You have uncommitted changes. Stash them before pulling?",
            true,
        )?;
        if stash_first {
            let stash = git.run(&["stash", "push", "-u", "-m", "geeto: auto-stash before pull"])?;
            if !stash.success {
                return Ok(GitOpResult::failed(format!(
                    "stash failed: {}",
                    stash.stderr.trim()
                )));
            }
            stashed = true;
        }
    }

    let out = git.run(&["pull", remote, branch])?;
    let result = if out.success {
        GitOpResult::ok()
    } else {
        let lower = out.combined_lower();
        if looks_like_conflict(&lower) {
            merge_conflict_menu(git, prompter, &format!("{remote}/{branch}"))?
        } else {
            GitOpResult::failed(out.stderr.trim())
        }
    };

    if stashed && !result.conflict {
        let pop = prompter.confirm("Restore (pop) the stashed changes now?", true)?;
        if pop {
            let popped = git.run(&["stash", "pop"])?;
            if !popped.success {
                println!("Stash pop failed; your changes are still in the stash.");
                hint("Run `git stash pop` manually after sorting out the tree.");
            }
        } else {
            hint("Your changes remain stashed; `git stash pop` restores them.");
        }
    } else if stashed && result.conflict {
        hint("Your pre-pull changes are stashed; pop them after resolving the conflicts.");
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::fake::FakeGit;
    use crate::git::GitOutput;
    use crate::prompt::script::{Answer, ScriptedPrompter};

    const LOCAL_CHANGES: &str =
        "error: Your local changes to the following files would be overwritten by checkout";

    #[test]
    fn plain_checkout_success_asks_nothing() {
        let git = FakeGit::new(vec![("checkout main", GitOutput::ok(""))]);
        let prompter = ScriptedPrompter::new(vec![]);

        let result = safe_checkout(&git, &prompter, "main", CheckoutOpts::default()).unwrap();
        assert!(result.success);
        assert!(prompter.seen.borrow().is_empty());
    }

    #[test]
    fn checkout_with_local_changes_tries_three_way_first() {
        let git = FakeGit::new(vec![
            ("checkout main", GitOutput::err(LOCAL_CHANGES)),
            ("checkout --merge main", GitOutput::ok("")),
            ("diff --name-only --diff-filter=U", GitOutput::ok("")),
        ]);
        let prompter = ScriptedPrompter::new(vec![]);

        let result = safe_checkout(&git, &prompter, "main", CheckoutOpts::default()).unwrap();
        assert!(result.success);
        assert!(git.ran("checkout --merge main"));
        // No menu, no stash, no force: nothing was at risk.
        assert!(!git.ran("checkout -f"));
    }

    #[test]
    fn checkout_conflict_manual_resolution_reports_conflict() {
        let git = FakeGit::new(vec![
            ("checkout main", GitOutput::err(LOCAL_CHANGES)),
            ("checkout --merge main", GitOutput::ok("")),
            (
                "diff --name-only --diff-filter=U",
                GitOutput::ok("src/lib.rs\n"),
            ),
        ]);
        let prompter = ScriptedPrompter::new(vec![Answer::Select(0)]);

        let result = safe_checkout(&git, &prompter, "main", CheckoutOpts::default()).unwrap();
        assert!(result.success);
        assert!(result.conflict);
    }

    #[test]
    fn checkout_conflict_abort_escalates_through_abort_commands() {
        let git = FakeGit::new(vec![
            ("checkout main", GitOutput::err(LOCAL_CHANGES)),
            ("checkout --merge main", GitOutput::ok("")),
            (
                "diff --name-only --diff-filter=U",
                GitOutput::ok("src/lib.rs\n"),
            ),
            ("merge --abort", GitOutput::err("fatal: no merge in progress")),
            ("checkout --merge --abort", GitOutput::err("unknown option")),
            ("reset --merge", GitOutput::ok("")),
        ]);
        let prompter = ScriptedPrompter::new(vec![Answer::Select(1)]);

        let result = safe_checkout(&git, &prompter, "main", CheckoutOpts::default()).unwrap();
        assert!(!result.success);
        assert!(git.ran("merge --abort"));
        assert!(git.ran("checkout --merge --abort"));
        assert!(git.ran("reset --merge"));
    }

    #[test]
    fn checkout_never_discards_work_without_confirmation() {
        // Three-way fails outright; the user picks "force" from the menu but
        // declines the data-loss confirmation. No forced checkout may run.
        let git = FakeGit::new(vec![
            ("checkout main", GitOutput::err(LOCAL_CHANGES)),
            ("checkout --merge main", GitOutput::err("error: cannot merge")),
        ]);
        let prompter =
            ScriptedPrompter::new(vec![Answer::Select(2), Answer::Confirm(false)]);

        let result = safe_checkout(&git, &prompter, "main", CheckoutOpts::default()).unwrap();
        assert!(!result.success);
        assert!(!git.ran("checkout -f"));
        assert!(prompter.saw_prompt_containing("permanently discard"));
    }

    #[test]
    fn checkout_commit_first_signals_caller() {
        let git = FakeGit::new(vec![
            ("checkout main", GitOutput::err(LOCAL_CHANGES)),
            ("checkout --merge main", GitOutput::err("error: cannot merge")),
        ]);
        let prompter = ScriptedPrompter::new(vec![Answer::Select(1)]);

        let result = safe_checkout(&git, &prompter, "main", CheckoutOpts::default()).unwrap();
        assert!(!result.success);
        assert!(result.commit_needed);
        // It signals; it never commits on its own.
        assert!(!git.ran("commit"));
    }

    #[test]
    fn checkout_stash_path_retries_checkout() {
        let git = FakeGit::new(vec![
            ("checkout main", GitOutput::err(LOCAL_CHANGES)),
            ("checkout --merge main", GitOutput::err("error: cannot merge")),
            ("stash push", GitOutput::ok("Saved working directory")),
            ("checkout main", GitOutput::ok("")),
        ]);
        let prompter = ScriptedPrompter::new(vec![Answer::Select(0)]);

        let result = safe_checkout(&git, &prompter, "main", CheckoutOpts::default()).unwrap();
        assert!(result.success);
        assert!(git.ran("stash push"));
        assert_eq!(git.count("checkout main"), 2);
    }

    #[test]
    fn commit_during_merge_skips_staging_check() {
        let git = FakeGit::new(vec![
            ("rev-parse -q --verify MERGE_HEAD", GitOutput::ok("abc")),
            ("commit -m finish merge", GitOutput::ok("")),
        ]);
        let prompter = ScriptedPrompter::new(vec![]);

        let result =
            safe_commit(&git, &prompter, "finish merge", CommitOpts::default()).unwrap();
        assert!(result.success);
        // Staged-file listing is never consulted mid-merge.
        assert!(!git.ran("diff --cached --name-only"));
    }

    #[test]
    fn commit_with_empty_staging_offers_stage_all() {
        let git = FakeGit::new(vec![
            ("rev-parse -q --verify MERGE_HEAD", GitOutput::err("")),
            ("diff --cached --name-only", GitOutput::ok("")),
            ("add -A", GitOutput::ok("")),
            ("commit -m msg", GitOutput::ok("")),
        ]);
        let prompter = ScriptedPrompter::new(vec![Answer::Select(0)]);

        let result = safe_commit(&git, &prompter, "msg", CommitOpts::default()).unwrap();
        assert!(result.success);
        assert!(git.ran("add -A"));
    }

    #[test]
    fn commit_hook_failure_offers_no_verify_retry() {
        let git = FakeGit::new(vec![
            ("rev-parse -q --verify MERGE_HEAD", GitOutput::err("")),
            ("diff --cached --name-only", GitOutput::ok("a.rs\n")),
            ("commit -m msg", GitOutput::err("pre-commit hook failed")),
            ("commit -m msg --no-verify", GitOutput::ok("")),
        ]);
        let prompter = ScriptedPrompter::new(vec![Answer::Confirm(true)]);

        let result = safe_commit(&git, &prompter, "msg", CommitOpts::default()).unwrap();
        assert!(result.success);
        assert!(git.ran("commit -m msg --no-verify"));
    }

    #[test]
    fn merge_refuses_during_in_progress_merge() {
        let git = FakeGit::new(vec![(
            "rev-parse -q --verify MERGE_HEAD",
            GitOutput::ok("abc"),
        )]);
        let prompter = ScriptedPrompter::new(vec![]);

        let result =
            safe_merge(&git, &prompter, "feat/x", MergeOpts::default()).unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("merge is already in progress"));
        assert!(!git.ran("merge --no-ff"));
        assert!(!git.ran("merge feat/x"));
    }

    #[test]
    fn merge_refuses_during_rebase() {
        let git = FakeGit::new(vec![
            ("rev-parse -q --verify MERGE_HEAD", GitOutput::err("")),
            ("rev-parse -q --verify REBASE_HEAD", GitOutput::ok("abc")),
        ]);
        let prompter = ScriptedPrompter::new(vec![]);

        let result =
            safe_merge(&git, &prompter, "feat/x", MergeOpts::default()).unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("rebase is already in progress"));
    }

    #[test]
    fn merge_conflict_abort_restores_state() {
        let git = FakeGit::new(vec![
            ("rev-parse -q --verify MERGE_HEAD", GitOutput::err("")),
            ("rev-parse -q --verify REBASE_HEAD", GitOutput::err("")),
            (
                "merge --no-ff feat/x",
                GitOutput::err("CONFLICT (content): Merge conflict in src/lib.rs"),
            ),
            ("diff --name-only --diff-filter=U", GitOutput::ok("src/lib.rs")),
            ("merge --abort", GitOutput::ok("")),
        ]);
        let prompter = ScriptedPrompter::new(vec![Answer::Select(0)]);

        let result = safe_merge(
            &git,
            &prompter,
            "feat/x",
            MergeOpts {
                no_ff: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(!result.success);
        assert!(!result.conflict);
        assert!(git.ran("merge --abort"));
    }

    #[test]
    fn merge_conflict_manual_resolution_returns_conflict() {
        let git = FakeGit::new(vec![
            ("rev-parse -q --verify MERGE_HEAD", GitOutput::err("")),
            ("rev-parse -q --verify REBASE_HEAD", GitOutput::err("")),
            (
                "merge feat/x",
                GitOutput::err("Automatic merge failed; fix conflicts"),
            ),
            ("diff --name-only --diff-filter=U", GitOutput::ok("src/lib.rs")),
        ]);
        let prompter = ScriptedPrompter::new(vec![Answer::Select(1)]);

        let result =
            safe_merge(&git, &prompter, "feat/x", MergeOpts::default()).unwrap();
        assert!(!result.success);
        assert!(result.conflict);
    }

    #[test]
    fn push_missing_upstream_retries_once_automatically() {
        let git = FakeGit::new(vec![
            (
                "push origin feat/x",
                GitOutput::err("fatal: The current branch feat/x has no upstream branch."),
            ),
            ("push -u origin feat/x", GitOutput::ok("")),
        ]);
        let prompter = ScriptedPrompter::new(vec![]);

        let result = safe_push(&git, &prompter, "feat/x", PushOpts::default()).unwrap();
        assert!(result.success);
        assert!(git.ran("push -u origin feat/x"));
        // Fully automatic: the user was never asked.
        assert!(prompter.seen.borrow().is_empty());
    }

    #[test]
    fn push_terminates_within_retry_bound() {
        let network_err = GitOutput::err("fatal: unable to access remote: Connection timed out");
        let git = FakeGit::new(vec![
            ("push origin feat/x", network_err.clone()),
            ("push origin feat/x", network_err.clone()),
            ("push origin feat/x", network_err),
        ]);
        // User keeps saying "retry"; the loop must still stop at 3 attempts.
        let prompter =
            ScriptedPrompter::new(vec![Answer::Confirm(true), Answer::Confirm(true)]);

        let result = safe_push(&git, &prompter, "feat/x", PushOpts::default()).unwrap();
        assert!(!result.success);
        assert_eq!(git.count("push origin feat/x"), 3);
    }

    #[test]
    fn push_rejected_force_requires_second_confirmation() {
        let git = FakeGit::new(vec![(
            "push origin feat/x",
            GitOutput::err("! [rejected] feat/x -> feat/x (non-fast-forward)"),
        )]);
        // Choose force at the menu, then decline the data-loss confirmation.
        let prompter =
            ScriptedPrompter::new(vec![Answer::Select(1), Answer::Confirm(false)]);

        let result = safe_push(&git, &prompter, "feat/x", PushOpts::default()).unwrap();
        assert!(!result.success);
        assert!(!git.ran("push origin feat/x --force"));
        assert!(prompter.saw_prompt_containing("overwrite the remote"));
    }

    #[test]
    fn push_unknown_failure_is_terminal_and_verbatim() {
        let git = FakeGit::new(vec![(
            "push origin feat/x",
            GitOutput::err("remote: unexpected server meltdown"),
        )]);
        let prompter = ScriptedPrompter::new(vec![]);

        let result = safe_push(&git, &prompter, "feat/x", PushOpts::default()).unwrap();
        assert!(!result.success);
        assert_eq!(
            result.error.unwrap(),
            "remote: unexpected server meltdown"
        );
        assert_eq!(git.count("push origin feat/x"), 1);
    }

    #[test]
    fn push_auth_failure_offers_retry() {
        let git = FakeGit::new(vec![
            (
                "push origin feat/x",
                GitOutput::err("fatal: Authentication failed for 'https://...'"),
            ),
            ("push origin feat/x", GitOutput::ok("")),
        ]);
        let prompter = ScriptedPrompter::new(vec![Answer::Confirm(true)]);

        let result = safe_push(&git, &prompter, "feat/x", PushOpts::default()).unwrap();
        assert!(result.success);
    }

    #[test]
    fn pull_stashes_with_confirmation_and_pops_after() {
        let git = FakeGit::new(vec![
            ("status --porcelain", GitOutput::ok(" M src/main.rs\n")),
            ("stash push", GitOutput::ok("")),
            ("pull origin main", GitOutput::ok("")),
            ("stash pop", GitOutput::ok("")),
        ]);
        let prompter =
            ScriptedPrompter::new(vec![Answer::Confirm(true), Answer::Confirm(true)]);

        let result = safe_pull(&git, &prompter, "origin", "main").unwrap();
        assert!(result.success);
        assert!(git.ran("stash push"));
        assert!(git.ran("stash pop"));
    }

    #[test]
    fn pull_conflict_keeps_stash_unpopped() {
        let git = FakeGit::new(vec![
            ("status --porcelain", GitOutput::ok(" M src/main.rs\n")),
            ("stash push", GitOutput::ok("")),
            (
                "pull origin main",
                GitOutput::err("CONFLICT (content): Merge conflict in a.rs"),
            ),
            ("diff --name-only --diff-filter=U", GitOutput::ok("a.rs")),
        ]);
        // Stash yes, then resolve manually at the conflict menu.
        let prompter =
            ScriptedPrompter::new(vec![Answer::Confirm(true), Answer::Select(1)]);

        let result = safe_pull(&git, &prompter, "origin", "main").unwrap();
        assert!(result.conflict);
        assert!(!git.ran("stash pop"));
    }
}
