//! Project layout and configuration.
//!
//! A project is any directory containing `.arbor/`:
//!
//! ```text
//! .arbor/
//!   config.yaml   settings (tracked)
//!   tasks/        task documents (tracked)
//!   arbor.db      derived store (ignored)
//!   .gitignore
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::{DEFAULT_MAX_DEPTH, MAX_DEPTH_LIMIT};
use crate::error::{Error, Result};

/// Name of the project directory.
pub const ARBOR_DIR_NAME: &str = ".arbor";

/// Name of the configuration file.
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Name of the task document directory.
pub const TASKS_DIR_NAME: &str = "tasks";

/// Name of the store database file.
pub const DB_FILE_NAME: &str = "arbor.db";

/// Name of the gitignore file within `.arbor`.
pub const GITIGNORE_FILE_NAME: &str = ".gitignore";

/// Maximum directory depth to traverse when searching for the project root.
pub const MAX_TRAVERSAL_DEPTH: usize = 256;

/// Whether to use git for document recovery and commits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VcsMode {
    /// Use git when the project is inside a work tree.
    #[default]
    Auto,
    /// Never touch version control.
    Off,
}

/// What happens to a `split` parent when its last child is deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LastChildPolicy {
    /// Leave the status alone; only the leaf flag changes.
    #[default]
    KeepSplit,
    /// Move the parent back to `todo` so it is planned again.
    RevertToTodo,
}

/// External program used as the execution delegate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutorConfig {
    /// Program to spawn.
    pub program: String,
    /// Arguments passed before the prompt is written to stdin.
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            program: "claude".to_string(),
            args: vec!["--print".to_string()],
        }
    }
}

/// Contents of `.arbor/config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct ArborConfig {
    /// Tasks executed at once during traversals.
    pub parallelism: usize,
    /// Deepest allowed hierarchy level (root is 0).
    pub max_depth: u32,
    /// How long a store write waits on a locked database.
    pub busy_timeout_ms: u64,
    /// Version control usage.
    pub vcs: VcsMode,
    /// Commit touched documents after each mutation.
    pub auto_commit: bool,
    /// Parent status policy when the last child goes away.
    pub on_last_child_removed: LastChildPolicy,
    /// Upper bound on planning rounds in a full cycle.
    pub max_plan_rounds: u32,
    /// Execution delegate.
    pub executor: ExecutorConfig,
}

impl Default for ArborConfig {
    fn default() -> Self {
        Self {
            parallelism: 2,
            max_depth: DEFAULT_MAX_DEPTH,
            busy_timeout_ms: 5000,
            vcs: VcsMode::Auto,
            auto_commit: true,
            on_last_child_removed: LastChildPolicy::KeepSplit,
            max_plan_rounds: 10,
            executor: ExecutorConfig::default(),
        }
    }
}

impl ArborConfig {
    /// Loads and validates configuration from a file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file does not parse or a value is
    /// out of range, and [`Error::Io`] if it cannot be read.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            serde_yaml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Saves configuration to a file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_yaml::to_string(self).map_err(|e| Error::Config(format!("YAML error: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        if self.parallelism == 0 {
            return Err(Error::Config("parallelism must be at least 1".into()));
        }
        if self.max_depth == 0 || self.max_depth > MAX_DEPTH_LIMIT {
            return Err(Error::Config(format!(
                "max-depth must be between 1 and {MAX_DEPTH_LIMIT}"
            )));
        }
        if self.max_plan_rounds == 0 {
            return Err(Error::Config("max-plan-rounds must be at least 1".into()));
        }
        if self.executor.program.trim().is_empty() {
            return Err(Error::Config("executor program must not be empty".into()));
        }
        Ok(())
    }
}

/// Resolved paths of one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    root: PathBuf,
}

impl ProjectPaths {
    /// Paths for the project rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory containing `.arbor/`.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The `.arbor/` directory.
    #[must_use]
    pub fn arbor_dir(&self) -> PathBuf {
        self.root.join(ARBOR_DIR_NAME)
    }

    /// The configuration file.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.arbor_dir().join(CONFIG_FILE_NAME)
    }

    /// The task document directory.
    #[must_use]
    pub fn tasks_dir(&self) -> PathBuf {
        self.arbor_dir().join(TASKS_DIR_NAME)
    }

    /// The store database.
    #[must_use]
    pub fn db_file(&self) -> PathBuf {
        self.arbor_dir().join(DB_FILE_NAME)
    }

    /// Loads the configuration, falling back to defaults if the file is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is invalid.
    pub fn load_config(&self) -> Result<ArborConfig> {
        let path = self.config_file();
        if path.exists() {
            ArborConfig::load(&path)
        } else {
            Ok(ArborConfig::default())
        }
    }
}

/// Initializes a project in `base_dir`.
///
/// Creates `.arbor/` with a default configuration, the task directory and a
/// `.gitignore` that keeps the derived store out of version control.
///
/// # Errors
///
/// Returns [`Error::Config`] if `.arbor/` already exists, or an I/O error if
/// the files cannot be created.
pub fn init(base_dir: &Path) -> Result<ProjectPaths> {
    let paths = ProjectPaths::new(base_dir);
    let arbor_dir = paths.arbor_dir();

    if arbor_dir.exists() {
        return Err(Error::Config(format!(
            "arbor is already initialized here (found '{}')",
            arbor_dir.display()
        )));
    }

    std::fs::create_dir_all(paths.tasks_dir())?;
    ArborConfig::default().save(&paths.config_file())?;

    let gitignore = "\
# The store is rebuilt from task documents; do not track it
arbor.db
arbor.db-wal
arbor.db-shm
*.tmp
";
    std::fs::write(arbor_dir.join(GITIGNORE_FILE_NAME), gitignore)?;

    info!(root = %base_dir.display(), "initialized project");
    Ok(paths)
}

/// Finds the project root by searching up from `start_dir`.
///
/// Returns `None` if no `.arbor/` directory is found within
/// [`MAX_TRAVERSAL_DEPTH`] levels.
#[must_use]
pub fn find_root(start_dir: &Path) -> Option<PathBuf> {
    start_dir
        .ancestors()
        .take(MAX_TRAVERSAL_DEPTH)
        .find(|dir| dir.join(ARBOR_DIR_NAME).is_dir())
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[test]
    fn init_creates_layout() {
        let dir = TempDir::new().unwrap();
        let paths = init(dir.path()).unwrap();

        assert!(paths.tasks_dir().is_dir());
        assert!(paths.config_file().is_file());
        let ignore = std::fs::read_to_string(paths.arbor_dir().join(GITIGNORE_FILE_NAME)).unwrap();
        assert!(ignore.contains("arbor.db"));
    }

    #[test]
    fn init_twice_fails() {
        let dir = TempDir::new().unwrap();
        init(dir.path()).unwrap();
        assert!(matches!(init(dir.path()), Err(Error::Config(_))));
    }

    #[test]
    fn saved_defaults_load_back() {
        let dir = TempDir::new().unwrap();
        let paths = init(dir.path()).unwrap();
        assert_eq!(paths.load_config().unwrap(), ArborConfig::default());
    }

    #[test]
    fn missing_config_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let paths = ProjectPaths::new(dir.path());
        assert_eq!(paths.load_config().unwrap(), ArborConfig::default());
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: ArborConfig =
            serde_yaml::from_str("parallelism: 4\non-last-child-removed: revert-to-todo\n").unwrap();
        assert_eq!(config.parallelism, 4);
        assert_eq!(config.on_last_child_removed, LastChildPolicy::RevertToTodo);
        assert_eq!(config.max_depth, DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn unknown_field_is_rejected() {
        assert!(serde_yaml::from_str::<ArborConfig>("paralelism: 4\n").is_err());
    }

    #[rstest]
    #[case::zero_parallelism("parallelism: 0\n", "parallelism")]
    #[case::zero_depth("max-depth: 0\n", "max-depth")]
    #[case::deep("max-depth: 99\n", "max-depth")]
    #[case::no_rounds("max-plan-rounds: 0\n", "max-plan-rounds")]
    #[case::empty_program("executor:\n  program: ''\n", "executor")]
    fn load_rejects_out_of_range(#[case] yaml: &str, #[case] field: &str) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, yaml).unwrap();

        let err = ArborConfig::load(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains(field), "unexpected message: {err}");
    }

    #[test]
    fn find_root_walks_up() {
        let dir = TempDir::new().unwrap();
        init(dir.path()).unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_root(&nested), Some(dir.path().to_path_buf()));
    }

    #[test]
    fn find_root_none_outside_project() {
        let dir = TempDir::new().unwrap();
        assert_eq!(find_root(dir.path()), None);
    }
}
