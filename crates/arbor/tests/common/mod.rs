//! Common test utilities shared across integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::{Arc, Mutex};

use arbor::vcs::{NoVcs, RestoreOutcome, VersionControl};
use arbor::{ArborConfig, Engine, NewTask, Task, TaskId};
use tempfile::TempDir;

pub fn id(raw: i64) -> TaskId {
    TaskId::new(raw).expect("positive id")
}

/// Opens a fresh project without version control.
pub fn project() -> (TempDir, Engine) {
    project_with(ArborConfig::default(), Arc::new(NoVcs))
}

/// Opens a fresh project with explicit configuration and version control.
pub fn project_with(config: ArborConfig, vcs: Arc<dyn VersionControl>) -> (TempDir, Engine) {
    let dir = TempDir::new().expect("create temp dir");
    let engine = Engine::with_vcs(dir.path(), config, vcs).expect("open engine");
    (dir, engine)
}

pub fn add(engine: &Engine, title: &str) -> Task {
    engine
        .create_task(NewTask::new(title).with_body(format!("Requirement of {title}.")))
        .expect("create task")
}

pub fn add_child(engine: &Engine, parent: TaskId, title: &str) -> Task {
    engine
        .create_task(NewTask::new(title).with_parent(parent))
        .expect("create child task")
}

/// In-memory stand-in for git: `commit` snapshots file contents and
/// `restore` writes the last snapshot back.
#[derive(Debug, Default)]
pub struct SnapshotVcs {
    committed: Mutex<HashMap<PathBuf, Vec<u8>>>,
    pub messages: Mutex<Vec<String>>,
}

impl SnapshotVcs {
    pub fn commit_count(&self) -> usize {
        self.messages.lock().expect("lock messages").len()
    }
}

impl VersionControl for SnapshotVcs {
    fn restore(&self, path: &Path) -> arbor::Result<RestoreOutcome> {
        let committed = self.committed.lock().expect("lock snapshots");
        match committed.get(path) {
            Some(bytes) => {
                std::fs::write(path, bytes)?;
                Ok(RestoreOutcome::Restored)
            }
            None => Err(arbor::Error::Recovery {
                path: path.to_path_buf(),
                reason: "never committed".to_string(),
            }),
        }
    }

    fn commit(&self, paths: &[PathBuf], message: &str) -> arbor::Result<()> {
        let mut committed = self.committed.lock().expect("lock snapshots");
        let mut files = Vec::new();
        for path in paths {
            if path.is_dir() {
                for entry in std::fs::read_dir(path)? {
                    files.push(entry?.path());
                }
            } else {
                files.push(path.clone());
            }
        }
        for file in files {
            match std::fs::read(&file) {
                Ok(bytes) => {
                    committed.insert(file, bytes);
                }
                Err(_) => {
                    committed.remove(&file);
                }
            }
        }
        self.messages
            .lock()
            .expect("lock messages")
            .push(message.to_string());
        Ok(())
    }
}

/// Runs the `arbor` binary in `dir`.
pub fn run_arbor(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_arbor"))
        .args(args)
        .current_dir(dir)
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .output()
        .expect("execute arbor binary")
}
