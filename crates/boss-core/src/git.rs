//! Working-tree guard and release tagging via the `git` CLI.
//!
//! A directory that is not inside a git work tree (or a machine without git)
//! counts as clean and is never tagged.

use crate::error::{BossError, Result};
use serde::Serialize;
use std::path::Path;
use std::process::{Command, Output, Stdio};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TagOutcome {
    Created,
    /// The tag already pointed at HEAD.
    AlreadyAtHead,
    NotARepository,
}

/// Uncommitted changes, split the way `git` reports them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TreeStatus {
    pub unstaged: Vec<String>,
    pub staged: Vec<String>,
}

impl TreeStatus {
    pub fn is_clean(&self) -> bool {
        self.unstaged.is_empty() && self.staged.is_empty()
    }
}

fn git(root: &Path, args: &[&str]) -> Result<Output> {
    Command::new("git")
        .args(args)
        .current_dir(root)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| BossError::Git(format!("failed to run git {}: {e}", args.join(" "))))
}

fn git_ok(root: &Path, args: &[&str]) -> Result<String> {
    let output = git(root, args)?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(BossError::Git(format!(
            "git {} failed: {}",
            args.join(" "),
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

pub fn is_repository(root: &Path) -> bool {
    if which::which("git").is_err() {
        return false;
    }
    git(root, &["rev-parse", "--is-inside-work-tree"])
        .map(|o| o.status.success() && String::from_utf8_lossy(&o.stdout).trim() == "true")
        .unwrap_or(false)
}

pub fn status(root: &Path) -> Result<TreeStatus> {
    if !is_repository(root) {
        return Ok(TreeStatus::default());
    }
    // Refresh stat info so touched-but-unchanged files don't show as dirty.
    let _ = git(root, &["update-index", "-q", "--ignore-submodules", "--refresh"]);

    let unstaged = git_ok(
        root,
        &["diff-files", "--name-status", "-r", "--ignore-submodules", "--"],
    )?;
    // A repository without commits has no HEAD; compare against the empty index instead.
    let staged = if git(root, &["rev-parse", "--verify", "-q", "HEAD"])?.status.success() {
        git_ok(
            root,
            &[
                "diff-index",
                "--cached",
                "--name-status",
                "-r",
                "--ignore-submodules",
                "HEAD",
                "--",
            ],
        )?
    } else {
        git_ok(root, &["ls-files", "--cached"])?
    };

    Ok(TreeStatus {
        unstaged: lines(&unstaged),
        staged: lines(&staged),
    })
}

fn lines(s: &str) -> Vec<String> {
    s.lines()
        .filter(|l| !l.trim().is_empty())
        .map(str::to_string)
        .collect()
}

pub fn ensure_clean(root: &Path) -> Result<()> {
    let status = status(root)?;
    if status.is_clean() {
        return Ok(());
    }
    for line in &status.unstaged {
        tracing::warn!(change = %line, "unstaged change");
    }
    for line in &status.staged {
        tracing::warn!(change = %line, "uncommitted change in index");
    }
    Err(BossError::DirtyWorkingTree)
}

fn resolve_commit(root: &Path, rev: &str) -> Result<Option<String>> {
    let output = git(root, &["rev-parse", "-q", "--verify", &format!("{rev}^{{commit}}")])?;
    if !output.status.success() {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
}

/// Tag HEAD with `tag` and push tags to the default remote.
///
/// An existing tag is accepted only when it already points at HEAD.
/// A failed push is logged, not fatal: the tag exists locally either way.
pub fn tag_release(root: &Path, tag: &str) -> Result<TagOutcome> {
    if !is_repository(root) {
        return Ok(TagOutcome::NotARepository);
    }
    let head = resolve_commit(root, "HEAD")?
        .ok_or_else(|| BossError::Git("repository has no commits to tag".into()))?;

    if let Some(tagged) = resolve_commit(root, &format!("refs/tags/{tag}"))? {
        if tagged == head {
            tracing::info!(%tag, "git tag already at HEAD");
            return Ok(TagOutcome::AlreadyAtHead);
        }
        return Err(BossError::Git(format!(
            "tag '{tag}' already exists at {} but HEAD is {}; choose another release tag",
            short(&tagged),
            short(&head)
        )));
    }

    git_ok(root, &["tag", tag])?;
    tracing::info!(%tag, commit = %short(&head), "tagged git repository");

    if let Err(e) = git_ok(root, &["push", "--tags"]) {
        tracing::warn!(%tag, error = %e, "could not push git tags");
    }
    Ok(TagOutcome::Created)
}

fn short(sha: &str) -> &str {
    sha.get(..8).unwrap_or(sha)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn have_git() -> bool {
        which::which("git").is_ok()
    }

    fn run(root: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(root)
            .status()
            .unwrap();
        assert!(status.success(), "git {args:?}");
    }

    fn repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        run(dir.path(), &["init", "-q"]);
        run(dir.path(), &["config", "user.email", "ci@example.com"]);
        run(dir.path(), &["config", "user.name", "CI"]);
        run(dir.path(), &["config", "commit.gpgsign", "false"]);
        run(dir.path(), &["config", "tag.gpgsign", "false"]);
        std::fs::write(dir.path().join("Dockerfile"), "FROM busybox\n").unwrap();
        run(dir.path(), &["add", "."]);
        run(dir.path(), &["commit", "-q", "-m", "init"]);
        dir
    }

    #[test]
    fn plain_directory_is_clean() {
        let dir = TempDir::new().unwrap();
        assert!(ensure_clean(dir.path()).is_ok());
        assert_eq!(
            tag_release(dir.path(), "v1").unwrap(),
            TagOutcome::NotARepository
        );
    }

    #[test]
    fn modified_file_is_dirty() {
        if !have_git() {
            return;
        }
        let dir = repo();
        assert!(ensure_clean(dir.path()).is_ok());

        std::fs::write(dir.path().join("Dockerfile"), "FROM alpine\n").unwrap();
        let s = status(dir.path()).unwrap();
        assert_eq!(s.unstaged.len(), 1);
        assert!(matches!(
            ensure_clean(dir.path()),
            Err(BossError::DirtyWorkingTree)
        ));

        run(dir.path(), &["add", "Dockerfile"]);
        let s = status(dir.path()).unwrap();
        assert!(s.unstaged.is_empty());
        assert_eq!(s.staged.len(), 1);
    }

    #[test]
    fn tagging_is_repeatable_at_head_only() {
        if !have_git() {
            return;
        }
        let dir = repo();
        assert_eq!(tag_release(dir.path(), "r1").unwrap(), TagOutcome::Created);
        assert_eq!(
            tag_release(dir.path(), "r1").unwrap(),
            TagOutcome::AlreadyAtHead
        );

        std::fs::write(dir.path().join("app.txt"), "x").unwrap();
        run(dir.path(), &["add", "."]);
        run(dir.path(), &["commit", "-q", "-m", "next"]);
        assert!(matches!(
            tag_release(dir.path(), "r1"),
            Err(BossError::Git(_))
        ));
    }
}
