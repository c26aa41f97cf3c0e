//! Version control collaborator.
//!
//! Documents are recovered from and committed to git by shelling out to the
//! `git` binary. Calls are serialized: two git processes working on the same
//! tree at once can leave the index locked or half-written.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::{Arc, Mutex, OnceLock};

use tracing::{debug, info, warn};

use crate::config::VcsMode;
use crate::error::{Error, Result};

/// What a restore attempt achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// The file was checked out from the last commit.
    Restored,
    /// No version control is available; nothing was attempted.
    Unavailable,
}

/// Restores and commits documents.
pub trait VersionControl: Send + Sync + std::fmt::Debug {
    /// Restores `path` to its last committed content.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Recovery`] if version control is present but the
    /// file could not be restored (never committed, tool failure).
    fn restore(&self, path: &Path) -> Result<RestoreOutcome>;

    /// Stages `paths` (including deletions) and commits them.
    ///
    /// "Nothing to commit" is success.
    ///
    /// # Errors
    ///
    /// Returns [`Error::VersionControl`] if staging or committing fails.
    fn commit(&self, paths: &[PathBuf], message: &str) -> Result<()>;
}

/// Builds the collaborator selected by `mode` for the project at `root`.
#[must_use]
pub fn for_mode(mode: VcsMode, root: &Path) -> Arc<dyn VersionControl> {
    match mode {
        VcsMode::Auto => Arc::new(Git::new(root)),
        VcsMode::Off => Arc::new(NoVcs),
    }
}

/// No version control: restores are unavailable and commits do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoVcs;

impl VersionControl for NoVcs {
    fn restore(&self, _path: &Path) -> Result<RestoreOutcome> {
        Ok(RestoreOutcome::Unavailable)
    }

    fn commit(&self, _paths: &[PathBuf], _message: &str) -> Result<()> {
        Ok(())
    }
}

/// Git working tree at `root`.
///
/// Whether `root` is inside a work tree is checked once, on first use.
/// Outside one (or without a `git` binary) every call is a no-op.
#[derive(Debug)]
pub struct Git {
    root: PathBuf,
    lock: Mutex<()>,
    available: OnceLock<bool>,
}

impl Git {
    /// Creates a collaborator for the tree containing `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock: Mutex::new(()),
            available: OnceLock::new(),
        }
    }

    fn git(&self, args: &[&str]) -> std::io::Result<Output> {
        Command::new("git").current_dir(&self.root).args(args).output()
    }

    /// Returns `true` if git can be used here.
    pub fn is_available(&self) -> bool {
        *self.available.get_or_init(|| {
            let available = self
                .git(&["rev-parse", "--is-inside-work-tree"])
                .is_ok_and(|o| o.status.success() && String::from_utf8_lossy(&o.stdout).trim() == "true");
            if !available {
                debug!(root = %self.root.display(), "no git work tree, version control disabled");
            }
            available
        })
    }

    /// Whether git knows `path` from the index.
    fn is_tracked(&self, path: &str) -> bool {
        self.git(&["ls-files", "--error-unmatch", "--", path])
            .is_ok_and(|o| o.status.success())
    }

    fn serialize(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|e| Error::Internal(format!("git mutex poisoned: {e}")))
    }
}

fn describe(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let text = if stderr.trim().is_empty() { stdout } else { stderr };
    text.trim().to_string()
}

fn nothing_to_commit(output: &Output) -> bool {
    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    text.contains("nothing to commit") || text.contains("no changes added to commit")
}

impl VersionControl for Git {
    fn restore(&self, path: &Path) -> Result<RestoreOutcome> {
        if !self.is_available() {
            return Ok(RestoreOutcome::Unavailable);
        }
        let _guard = self.serialize()?;

        let target = path.to_string_lossy();
        let output = self
            .git(&["checkout", "HEAD", "--", &target])
            .map_err(|e| Error::Recovery {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        if !output.status.success() {
            return Err(Error::Recovery {
                path: path.to_path_buf(),
                reason: describe(&output),
            });
        }

        info!(path = %path.display(), "restored document from git");
        Ok(RestoreOutcome::Restored)
    }

    fn commit(&self, paths: &[PathBuf], message: &str) -> Result<()> {
        if paths.is_empty() || !self.is_available() {
            return Ok(());
        }
        let _guard = self.serialize()?;

        // A path that is gone and was never tracked matches nothing, and git
        // rejects the whole command for it.
        let targets: Vec<String> = paths
            .iter()
            .filter(|p| p.exists() || self.is_tracked(&p.to_string_lossy()))
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        if targets.is_empty() {
            debug!(message, "no committable paths");
            return Ok(());
        }

        let mut add: Vec<&str> = vec!["add", "--all", "--"];
        add.extend(targets.iter().map(String::as_str));
        let output = self
            .git(&add)
            .map_err(|e| Error::VersionControl(format!("git add: {e}")))?;
        if !output.status.success() {
            return Err(Error::VersionControl(format!("git add: {}", describe(&output))));
        }

        let mut commit: Vec<&str> = vec!["commit", "-m", message, "--"];
        commit.extend(targets.iter().map(String::as_str));
        let output = self
            .git(&commit)
            .map_err(|e| Error::VersionControl(format!("git commit: {e}")))?;
        if output.status.success() {
            debug!(message, files = paths.len(), "committed documents");
            return Ok(());
        }
        if nothing_to_commit(&output) {
            debug!(message, "nothing to commit");
            return Ok(());
        }

        let reason = describe(&output);
        warn!(message, %reason, "git commit failed");
        Err(Error::VersionControl(format!("git commit: {reason}")))
    }
}
