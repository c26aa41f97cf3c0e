//! Project handle tying documents, store and version control together.
//!
//! Every mutation keeps the task document and the store row in step and, when
//! `auto-commit` is on, commits the touched documents. Document writes come
//! first so that a crash leaves the authoritative side ahead; Sync repairs the
//! row afterwards. Status changes are the exception: the row is checked and
//! moved first (so concurrent claims of one task cannot both win) and put
//! back if the document write fails.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arbor_doc::{DocumentStore, Sibling};
use tracing::{debug, info, warn};

use crate::config::{self, ArborConfig, ProjectPaths};
use crate::domain::{
    Document, Edge, NewTask, RelatedTask, Stats, Task, TaskDetail, TaskFilter, TaskId, TaskRecord,
    TaskStatus,
};
use crate::error::{Error, Result};
use crate::graph::GraphScheduler;
use crate::pagination::{Page, PageRequest};
use crate::reconcile::{Confirmation, RebuildSummary, ReconciliationEngine, SyncSummary};
use crate::state::StateMachine;
use crate::store::{GraphStore, Removal};
use crate::vcs::{self, VersionControl};

/// An open arbor project.
#[derive(Debug)]
pub struct Engine {
    paths: ProjectPaths,
    config: ArborConfig,
    docs: DocumentStore,
    store: GraphStore,
    vcs: Arc<dyn VersionControl>,
    machine: StateMachine,
    create_lock: Mutex<()>,
    batches: AtomicUsize,
}

/// Suppresses per-task commits until dropped.
///
/// Returned by [`Engine::begin_batch`]. Guards nest: commits resume once
/// every outstanding guard has dropped.
#[derive(Debug)]
pub struct BatchGuard<'a> {
    engine: &'a Engine,
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        self.engine.batches.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Engine {
    /// Opens the project rooted at `root` with its own configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the store cannot
    /// be opened.
    pub fn open(root: &Path) -> Result<Self> {
        let paths = ProjectPaths::new(root);
        let config = paths.load_config()?;
        let vcs = vcs::for_mode(config.vcs, root);
        Self::with_vcs(root, config, vcs)
    }

    /// Opens the project containing `start`, searching upwards.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no project is found.
    pub fn discover(start: &Path) -> Result<Self> {
        let root = config::find_root(start).ok_or_else(|| {
            Error::Config(format!(
                "no arbor project found at or above '{}' (run `arbor init`)",
                start.display()
            ))
        })?;
        Self::open(&root)
    }

    /// Opens the project at `root` with explicit configuration and version
    /// control.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the store cannot
    /// be opened.
    pub fn with_vcs(
        root: &Path,
        config: ArborConfig,
        vcs: Arc<dyn VersionControl>,
    ) -> Result<Self> {
        config.validate()?;
        let paths = ProjectPaths::new(root);
        let docs = DocumentStore::open(paths.tasks_dir())?;
        let store = GraphStore::open(
            &paths.db_file(),
            Duration::from_millis(config.busy_timeout_ms),
        )?;
        let machine = StateMachine::new(config.on_last_child_removed);

        debug!(root = %root.display(), "opened project");
        Ok(Self {
            paths,
            config,
            docs,
            store,
            vcs,
            machine,
            create_lock: Mutex::new(()),
            batches: AtomicUsize::new(0),
        })
    }

    /// Project paths.
    #[must_use]
    pub fn paths(&self) -> &ProjectPaths {
        &self.paths
    }

    /// Effective configuration.
    #[must_use]
    pub fn config(&self) -> &ArborConfig {
        &self.config
    }

    /// Task documents.
    #[must_use]
    pub fn documents(&self) -> &DocumentStore {
        &self.docs
    }

    /// Graph store.
    #[must_use]
    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    // === Commits ===

    /// Suppresses per-task commits until the guard drops; follow with
    /// [`Engine::commit_documents`] for one commit covering the batch.
    #[must_use]
    pub fn begin_batch(&self) -> BatchGuard<'_> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        BatchGuard { engine: self }
    }

    /// Commits the whole document directory.
    pub fn commit_documents(&self, message: &str) {
        if self.config.auto_commit {
            self.try_commit(&[self.docs.dir().to_path_buf()], message);
        }
    }

    fn commit(&self, paths: &[PathBuf], message: &str) {
        if self.config.auto_commit && self.batches.load(Ordering::SeqCst) == 0 {
            self.try_commit(paths, message);
        }
    }

    fn try_commit(&self, paths: &[PathBuf], message: &str) {
        if let Err(e) = self.vcs.commit(paths, message) {
            warn!(error = %e, message, "commit failed; documents are saved but not committed");
        }
    }

    // === Tasks ===

    /// Creates a task as `todo`.
    ///
    /// The id is one past the highest id known to either the store or the
    /// documents. A parent gaining its first child moves to `split`.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] for an empty title or a parent at max depth
    /// - [`Error::TaskNotFound`] for an unknown parent
    /// - [`Error::InvalidTransition`] for a parent that is running or finished
    pub fn create_task(&self, new: NewTask) -> Result<Task> {
        let title = new.title.trim();
        if title.is_empty() {
            return Err(Error::Validation("title must not be empty".into()));
        }

        let _guard = self
            .create_lock
            .lock()
            .map_err(|e| Error::Internal(format!("create lock poisoned: {e}")))?;

        let id = self.store.next_task_id(self.docs.max_id()?)?;
        let document = Document::new(title, TaskStatus::Todo)
            .with_parent(new.parent)
            .with_priority(new.priority)
            .with_body(&new.body);
        let mut touched = vec![self.docs.write(id, &document)?];

        let record = TaskRecord::from_document(id, &document);
        let inserted = match self.store.insert_task(&record, &self.machine, self.config.max_depth) {
            Ok(inserted) => inserted,
            Err(e) => {
                self.discard_documents(id);
                return Err(e);
            }
        };

        if let (Some(parent_id), Some(previous)) = (new.parent, inserted.parent_split_from) {
            match self.docs.update_status(parent_id, TaskStatus::Split) {
                Ok(path) => touched.push(path),
                Err(e) => {
                    self.undo_insert(id, parent_id, previous);
                    return Err(e.into());
                }
            }
        }

        let task = inserted.task;
        info!(task_id = %id, parent = ?task.parent, "created task");
        self.commit(&touched, &format!("task(#{id}): created"));
        Ok(task)
    }

    /// Takes back a child insert whose parent document could not be split.
    fn undo_insert(&self, id: TaskId, parent_id: TaskId, previous: TaskStatus) {
        if let Err(e) = self
            .store
            .delete_task(id, &StateMachine::default(), self.config.max_depth)
        {
            warn!(task_id = %id, error = %e, "could not remove row of failed task");
        }
        match self.store.restore_status(parent_id, TaskStatus::Split, previous) {
            Ok(true) => {}
            Ok(false) => warn!(task_id = %parent_id, "parent changed before it could be restored"),
            Err(e) => warn!(task_id = %parent_id, error = %e, "could not restore parent row"),
        }
        self.discard_documents(id);
    }

    fn discard_documents(&self, id: TaskId) {
        if let Err(e) = self.docs.remove(id) {
            warn!(task_id = %id, error = %e, "could not remove documents of failed task");
        }
    }

    /// Gets a task row.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskNotFound`] if it does not exist.
    pub fn get_task(&self, id: TaskId) -> Result<Task> {
        self.store.require_task(id)
    }

    /// Gets a task with its requirement, plan, report and error text.
    ///
    /// A missing primary document yields an empty body (Sync will deal with
    /// it); an invalid one is an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskNotFound`] or a document error.
    pub fn task_detail(&self, id: TaskId) -> Result<TaskDetail> {
        let task = self.store.require_task(id)?;
        let body = match self.docs.load(id) {
            Ok(document) => document.body,
            Err(arbor_doc::Error::NotFound(_)) => {
                warn!(task_id = %id, "task has no document; run sync");
                String::new()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(TaskDetail {
            task,
            body,
            plan: self.docs.read_sibling(id, Sibling::Plan)?,
            report: self.docs.read_sibling(id, Sibling::Report)?,
            error: self.docs.read_sibling(id, Sibling::Error)?,
        })
    }

    /// Lists tasks.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    pub fn list_tasks(&self, filter: &TaskFilter, page: PageRequest) -> Result<Page<Task>> {
        self.store.list_tasks(filter, page)
    }

    /// Deletes a childless task, its documents and its edges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskNotFound`] or [`Error::Conflict`] if the task has
    /// children.
    pub fn delete_task(&self, id: TaskId) -> Result<Removal> {
        self.store.require_task(id)?;
        let children = self.store.children(id)?;
        if !children.is_empty() {
            return Err(Error::Conflict(format!(
                "task #{id} has {} children; delete them first",
                children.len()
            )));
        }

        let mut touched = self.docs.remove(id)?;
        let removal = self
            .store
            .delete_task(id, &self.machine, self.config.max_depth)?;

        if let (Some(parent), Some(status)) = (removal.task.parent, removal.parent_status) {
            touched.push(self.docs.update_status(parent, status)?);
        }

        self.commit(&touched, &format!("task(#{id}): deleted"));
        Ok(removal)
    }

    /// Moves a task to `status` through the state machine and updates its
    /// document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskNotFound`], [`Error::InvalidTransition`] or a
    /// document error (the row is then put back).
    pub fn set_status(&self, id: TaskId, status: TaskStatus) -> Result<Task> {
        let previous = self.store.set_status(id, status, &self.machine)?;
        if previous == status {
            return self.store.require_task(id);
        }

        match self.docs.update_status(id, status) {
            Ok(path) => self.commit(&[path], &format!("task(#{id}): {status}")),
            Err(e) => {
                if !self.store.restore_status(id, status, previous)? {
                    warn!(task_id = %id, "row changed again before it could be restored");
                }
                return Err(e.into());
            }
        }
        self.store.require_task(id)
    }

    /// Stores a plan for a `todo` or `planned` task and marks it `planned`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an empty plan and
    /// [`Error::InvalidTransition`] for tasks in any other status.
    pub fn attach_plan(&self, id: TaskId, plan: &str) -> Result<Task> {
        if plan.trim().is_empty() {
            return Err(Error::Validation("plan must not be empty".into()));
        }
        let task = self.store.require_task(id)?;
        if !matches!(task.status, TaskStatus::Todo | TaskStatus::Planned) {
            return Err(Error::InvalidTransition {
                id,
                from: task.status,
                to: TaskStatus::Planned,
            });
        }

        let plan_path = self.docs.write_sibling(id, Sibling::Plan, plan)?;
        let task = {
            let _quiet = self.begin_batch();
            self.set_status(id, TaskStatus::Planned)?
        };
        self.commit(&[plan_path, self.docs.path(id)], &format!("task(#{id}): planned"));
        Ok(task)
    }

    /// Records an execution result for an `in_progress` task: the output
    /// goes to the report (success) or error document and the task becomes
    /// `done` or `failed`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] if the task is not in progress.
    pub fn record_outcome(&self, id: TaskId, success: bool, output: &str) -> Result<Task> {
        let task = self.store.require_task(id)?;
        let (sibling, status) = if success {
            (Sibling::Report, TaskStatus::Done)
        } else {
            (Sibling::Error, TaskStatus::Failed)
        };
        self.machine.check(id, task.status, status)?;

        let text = if output.trim().is_empty() {
            "(no output)"
        } else {
            output
        };
        let path = self.docs.write_sibling(id, sibling, text)?;
        let task = {
            let _quiet = self.begin_batch();
            self.set_status(id, status)?
        };
        self.commit(&[path, self.docs.path(id)], &format!("task(#{id}): {status}"));
        Ok(task)
    }

    /// Writes the error document of a task without changing its status.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn record_error(&self, id: TaskId, message: &str) -> Result<()> {
        let path = self.docs.write_sibling(id, Sibling::Error, message)?;
        self.commit(&[path], &format!("task(#{id}): error"));
        Ok(())
    }

    /// Tasks connected to `id` by edges or hierarchy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskNotFound`] if the task does not exist.
    pub fn related(&self, id: TaskId) -> Result<Vec<RelatedTask>> {
        self.store.related(id)
    }

    // === Edges ===

    /// Adds the dependency `from -> to`.
    ///
    /// # Errors
    ///
    /// See [`GraphStore::add_edge`].
    pub fn add_edge(&self, from: TaskId, to: TaskId) -> Result<Edge> {
        self.store.add_edge(from, to)
    }

    /// Gets one edge.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EdgeNotFound`] if it does not exist.
    pub fn get_edge(&self, from: TaskId, to: TaskId) -> Result<Edge> {
        self.store
            .get_edge(from, to)?
            .ok_or(Error::EdgeNotFound { from, to })
    }

    /// Lists edges.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    pub fn list_edges(&self, page: PageRequest) -> Result<Page<Edge>> {
        self.store.list_edges(page)
    }

    /// Removes an edge.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EdgeNotFound`] if it does not exist.
    pub fn delete_edge(&self, from: TaskId, to: TaskId) -> Result<()> {
        self.store.delete_edge(from, to)
    }

    // === Reconciliation ===

    fn reconciler(&self) -> ReconciliationEngine<'_> {
        ReconciliationEngine::new(
            &self.docs,
            &self.store,
            self.vcs.as_ref(),
            self.config.max_depth,
        )
        .with_commit(self.config.auto_commit)
    }

    /// Runs an incremental Sync.
    ///
    /// # Errors
    ///
    /// See [`ReconciliationEngine::sync`].
    pub fn sync(&self) -> Result<SyncSummary> {
        self.reconciler().sync()
    }

    /// Rebuilds the task table from the documents.
    ///
    /// # Errors
    ///
    /// See [`ReconciliationEngine::rebuild`].
    pub fn rebuild(&self, confirmation: Confirmation) -> Result<RebuildSummary> {
        self.reconciler().rebuild(confirmation)
    }

    // === Scheduling and reports ===

    /// Scheduler over the current store contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be read.
    pub fn scheduler(&self) -> Result<GraphScheduler> {
        let (tasks, edges) = self.store.snapshot()?;
        Ok(GraphScheduler::new(tasks, &edges))
    }

    /// The lowest-id task ready to run.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be read.
    pub fn next_executable(&self) -> Result<Option<Task>> {
        Ok(self.scheduler()?.next_executable().cloned())
    }

    /// All tasks with dependencies first.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be read.
    pub fn topological_order(&self) -> Result<Vec<Task>> {
        let scheduler = self.scheduler()?;
        Ok(scheduler
            .topological_order()
            .into_iter()
            .filter_map(|id| scheduler.task(id).cloned())
            .collect())
    }

    /// Dependency cycles present in the store (normally none).
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be read.
    pub fn cycles(&self) -> Result<Vec<Vec<TaskId>>> {
        Ok(self.scheduler()?.cycles())
    }

    /// Task and edge counts.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    pub fn stats(&self) -> Result<Stats> {
        self.store.stats()
    }

    /// The task tree as indented text, one task per line with its
    /// dependencies:
    ///
    /// ```text
    /// #1 [split] Build parser
    ///   #2 [done] Lexer
    ///   #3 [planned] Grammar -> depends on: #2
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be read.
    pub fn context_map(&self) -> Result<String> {
        let (tasks, edges) = self.store.snapshot()?;
        Ok(render_context_map(&tasks, &edges))
    }
}

fn render_context_map(tasks: &[Task], edges: &[Edge]) -> String {
    if tasks.is_empty() {
        return "(no tasks)\n".to_string();
    }

    let known: std::collections::HashSet<TaskId> = tasks.iter().map(|t| t.id).collect();
    let mut children: std::collections::BTreeMap<Option<TaskId>, Vec<&Task>> =
        std::collections::BTreeMap::new();
    for task in tasks {
        let parent = task.parent.filter(|p| known.contains(p));
        children.entry(parent).or_default().push(task);
    }

    let mut out = String::new();
    let mut stack: Vec<(&Task, usize)> = children
        .get(&None)
        .map(|roots| roots.iter().rev().map(|t| (*t, 0)).collect())
        .unwrap_or_default();
    let mut visited = std::collections::HashSet::new();

    while let Some((task, level)) = stack.pop() {
        if !visited.insert(task.id) {
            continue;
        }
        let _ = write!(out, "{}#{} [{}] {}", "  ".repeat(level), task.id, task.status, task.title);
        let deps: Vec<String> = edges
            .iter()
            .filter(|e| e.from == task.id)
            .map(|e| format!("#{}", e.to))
            .collect();
        if !deps.is_empty() {
            let _ = write!(out, " -> depends on: {}", deps.join(", "));
        }
        out.push('\n');

        if let Some(kids) = children.get(&Some(task.id)) {
            stack.extend(kids.iter().rev().map(|t| (*t, level + 1)));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LastChildPolicy;
    use crate::vcs::NoVcs;
    use tempfile::TempDir;

    fn id(raw: i64) -> TaskId {
        TaskId::new(raw).unwrap()
    }

    fn engine_with(config: ArborConfig) -> (TempDir, Engine) {
        let dir = tempfile::tempdir().expect("should create temp directory");
        let engine =
            Engine::with_vcs(dir.path(), config, Arc::new(NoVcs)).expect("open engine");
        (dir, engine)
    }

    fn engine() -> (TempDir, Engine) {
        engine_with(ArborConfig::default())
    }

    #[derive(Debug, Default)]
    struct RecordingVcs {
        messages: Mutex<Vec<String>>,
    }

    impl VersionControl for RecordingVcs {
        fn restore(&self, _path: &Path) -> Result<vcs::RestoreOutcome> {
            Ok(vcs::RestoreOutcome::Unavailable)
        }

        fn commit(&self, _paths: &[PathBuf], message: &str) -> Result<()> {
            self.messages.lock().unwrap().push(message.to_string());
            Ok(())
        }
    }

    #[test]
    fn create_writes_document_and_row() {
        let (_dir, engine) = engine();
        let task = engine
            .create_task(NewTask::new("Write parser").with_body("Parse it all."))
            .unwrap();

        assert_eq!(task.id, id(1));
        let document = engine.documents().load(task.id).unwrap();
        assert_eq!(document.title, "Write parser");
        assert_eq!(document.body, "Parse it all.");
        assert_eq!(document.status, TaskStatus::Todo);
    }

    #[test]
    fn first_child_splits_parent_in_both_places() {
        let (_dir, engine) = engine();
        let parent = engine.create_task(NewTask::new("Parent")).unwrap();
        let child = engine
            .create_task(NewTask::new("Child").with_parent(parent.id))
            .unwrap();

        assert_eq!(child.depth, 1);
        let parent = engine.get_task(parent.id).unwrap();
        assert_eq!(parent.status, TaskStatus::Split);
        assert!(!parent.is_leaf);
        assert_eq!(
            engine.documents().load(parent.id).unwrap().status,
            TaskStatus::Split
        );
    }

    #[test]
    fn create_rejects_bad_parents() {
        let config = ArborConfig {
            max_depth: 1,
            ..ArborConfig::default()
        };
        let (_dir, engine) = engine_with(config);
        let root = engine.create_task(NewTask::new("Root")).unwrap();
        let child = engine
            .create_task(NewTask::new("Child").with_parent(root.id))
            .unwrap();

        assert!(matches!(
            engine.create_task(NewTask::new("Too deep").with_parent(child.id)),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            engine.create_task(NewTask::new("Orphan").with_parent(id(99))),
            Err(Error::TaskNotFound(_))
        ));
        assert!(matches!(
            engine.create_task(NewTask::new("  ")),
            Err(Error::Validation(_))
        ));
        assert_eq!(engine.documents().scan().unwrap().len(), 2);
    }

    #[test]
    fn ids_skip_documents_not_yet_synced() {
        let (_dir, engine) = engine();
        let stray = Document::new("Hand written", TaskStatus::Todo);
        engine.documents().write(id(7), &stray).unwrap();

        let task = engine.create_task(NewTask::new("Next")).unwrap();
        assert_eq!(task.id, id(8));
    }

    #[test]
    fn plan_then_run_lifecycle() {
        let (_dir, engine) = engine();
        let task = engine.create_task(NewTask::new("Job")).unwrap();

        engine.attach_plan(task.id, "1. do it").unwrap();
        engine.set_status(task.id, TaskStatus::InProgress).unwrap();
        let done = engine.record_outcome(task.id, true, "did it").unwrap();

        assert_eq!(done.status, TaskStatus::Done);
        let detail = engine.task_detail(task.id).unwrap();
        assert_eq!(detail.plan.as_deref(), Some("1. do it\n"));
        assert_eq!(detail.report.as_deref(), Some("did it\n"));
        assert_eq!(
            engine.documents().load(task.id).unwrap().status,
            TaskStatus::Done
        );
    }

    #[test]
    fn outcome_requires_running_task() {
        let (_dir, engine) = engine();
        let task = engine.create_task(NewTask::new("Job")).unwrap();
        assert!(matches!(
            engine.record_outcome(task.id, true, "early"),
            Err(Error::InvalidTransition { .. })
        ));
        assert!(engine.task_detail(task.id).unwrap().report.is_none());
    }

    #[test]
    fn failed_document_write_reverts_status() {
        let (_dir, engine) = engine();
        let task = engine.create_task(NewTask::new("Job")).unwrap();
        std::fs::remove_file(engine.documents().path(task.id)).unwrap();

        assert!(engine.set_status(task.id, TaskStatus::Planned).is_err());
        assert_eq!(engine.get_task(task.id).unwrap().status, TaskStatus::Todo);
    }

    #[test]
    fn delete_removes_documents_and_applies_policy() {
        let config = ArborConfig {
            on_last_child_removed: LastChildPolicy::RevertToTodo,
            ..ArborConfig::default()
        };
        let (_dir, engine) = engine_with(config);
        let parent = engine.create_task(NewTask::new("Parent")).unwrap();
        let child = engine
            .create_task(NewTask::new("Child").with_parent(parent.id))
            .unwrap();

        assert!(matches!(engine.delete_task(parent.id), Err(Error::Conflict(_))));

        let removal = engine.delete_task(child.id).unwrap();
        assert_eq!(removal.parent_status, Some(TaskStatus::Todo));
        assert!(!engine.documents().exists(child.id));
        assert_eq!(
            engine.documents().load(parent.id).unwrap().status,
            TaskStatus::Todo
        );
    }

    #[test]
    fn context_map_is_indented_tree() {
        let (_dir, engine) = engine();
        let root = engine.create_task(NewTask::new("Root")).unwrap();
        let a = engine
            .create_task(NewTask::new("A").with_parent(root.id))
            .unwrap();
        let b = engine
            .create_task(NewTask::new("B").with_parent(root.id))
            .unwrap();
        engine.add_edge(b.id, a.id).unwrap();

        let map = engine.context_map().unwrap();
        assert_eq!(
            map,
            "#1 [split] Root\n  #2 [todo] A\n  #3 [todo] B -> depends on: #2\n"
        );
    }

    #[test]
    fn empty_context_map() {
        let (_dir, engine) = engine();
        assert_eq!(engine.context_map().unwrap(), "(no tasks)\n");
    }

    #[test]
    fn child_of_claimed_parent_is_rejected_everywhere() {
        let (_dir, engine) = engine();
        let parent = engine.create_task(NewTask::new("Parent")).unwrap();
        engine.attach_plan(parent.id, "1. do it").unwrap();
        engine.set_status(parent.id, TaskStatus::InProgress).unwrap();

        let err = engine
            .create_task(NewTask::new("Late child").with_parent(parent.id))
            .unwrap_err();

        assert!(matches!(err, Error::InvalidTransition { .. }));
        assert_eq!(engine.get_task(parent.id).unwrap().status, TaskStatus::InProgress);
        assert_eq!(
            engine.documents().load(parent.id).unwrap().status,
            TaskStatus::InProgress
        );
        assert_eq!(engine.documents().scan().unwrap(), vec![parent.id]);
        assert_eq!(engine.store().all_tasks().unwrap().len(), 1);
    }

    #[test]
    fn unwritable_parent_document_undoes_child() {
        let (_dir, engine) = engine();
        let parent = engine.create_task(NewTask::new("Parent")).unwrap();
        engine.attach_plan(parent.id, "1. do it").unwrap();
        std::fs::remove_file(engine.documents().path(parent.id)).unwrap();

        assert!(engine
            .create_task(NewTask::new("Child").with_parent(parent.id))
            .is_err());

        assert_eq!(engine.get_task(parent.id).unwrap().status, TaskStatus::Planned);
        assert!(engine.get_task(parent.id).unwrap().is_leaf);
        assert_eq!(engine.store().all_tasks().unwrap().len(), 1);
        assert!(!engine.documents().exists(id(2)));
    }

    #[test]
    fn nested_batches_hold_commits_until_the_last_guard() {
        let vcs = Arc::new(RecordingVcs::default());
        let dir = tempfile::tempdir().expect("should create temp directory");
        let engine = Engine::with_vcs(dir.path(), ArborConfig::default(), vcs.clone()).unwrap();

        let outer = engine.begin_batch();
        let task = engine.create_task(NewTask::new("Job")).unwrap();
        // Takes and drops a guard of its own.
        engine.attach_plan(task.id, "1. do it").unwrap();
        engine.create_task(NewTask::new("Another")).unwrap();
        assert!(vcs.messages.lock().unwrap().is_empty());

        drop(outer);
        engine.create_task(NewTask::new("Third")).unwrap();
        assert_eq!(*vcs.messages.lock().unwrap(), vec!["task(#3): created".to_string()]);
    }
}
