//! Parallel plan and run traversals.
//!
//! A traversal repeatedly asks the scheduler for work, hands up to
//! `parallelism` tasks to the delegate at once and records each result as it
//! arrives. Cancellation stops new launches; tasks already with the delegate
//! finish and are recorded. Per-task commits are suppressed for the duration
//! and replaced by one commit at the end.

use std::collections::HashSet;
use std::sync::Arc;

use arbor_doc::Sibling;
use serde::Serialize;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use super::{
    ChildSpec, ExecutionMode, ExecutionOutcome, ExecutionRequest, Executor, PlanReply,
    RelatedSummary, TraversalContext, TraversalKind, parse_plan_output,
};
use crate::domain::{NewTask, Task, TaskId, TaskStatus};
use crate::engine::Engine;
use crate::error::{Error, Result};

type Job = (TaskId, Result<ExecutionOutcome>);

/// Result of a finished traversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraversalReport {
    /// Traversal kind.
    pub kind: TraversalKind,
    /// Tasks planned or run successfully.
    pub completed: usize,
    /// Tasks whose planning or run failed.
    pub failed: usize,
    /// Whether the traversal stopped early on request.
    pub cancelled: bool,
    /// Planning rounds performed.
    pub plan_rounds: u32,
}

/// Feeds tasks of one project to an execution delegate.
pub struct Traversal {
    engine: Arc<Engine>,
    executor: Arc<dyn Executor>,
    context: Arc<TraversalContext>,
    parallelism: Option<usize>,
}

impl std::fmt::Debug for Traversal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Traversal")
            .field("context", &self.context)
            .field("parallelism", &self.parallelism)
            .finish_non_exhaustive()
    }
}

impl Traversal {
    /// Creates a traversal.
    #[must_use]
    pub fn new(
        engine: Arc<Engine>,
        executor: Arc<dyn Executor>,
        context: Arc<TraversalContext>,
    ) -> Self {
        Self {
            engine,
            executor,
            context,
            parallelism: None,
        }
    }

    /// Overrides the configured `parallelism` (at least 1).
    #[must_use]
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = Some(parallelism.max(1));
        self
    }

    /// Shared progress and cancellation state.
    #[must_use]
    pub fn context(&self) -> &Arc<TraversalContext> {
        &self.context
    }

    /// Plans every plannable task, including children created by splits,
    /// until none is left. Each task is attempted once.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read; tasks already with the
    /// delegate are still recorded first.
    pub async fn plan_pending(&self) -> Result<TraversalReport> {
        let batch = self.engine.begin_batch();
        let result = self.plan_pass().await.map(|_| ());
        drop(batch);
        self.finish(result, 1)
    }

    /// Runs executable tasks, including those unblocked along the way,
    /// until none is left.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read; tasks already with the
    /// delegate are still recorded first.
    pub async fn run_ready(&self) -> Result<TraversalReport> {
        let batch = self.engine.begin_batch();
        let result = self.run_pass().await;
        drop(batch);
        self.finish(result, 0)
    }

    /// Plans in rounds (at most `max-plan-rounds`, stopping early when a
    /// round finds nothing to plan), then runs.
    ///
    /// # Errors
    ///
    /// As [`Traversal::plan_pending`] and [`Traversal::run_ready`].
    pub async fn cycle(&self) -> Result<TraversalReport> {
        let max_rounds = self.engine.config().max_plan_rounds;
        let batch = self.engine.begin_batch();
        let mut rounds = 0;

        let result = async {
            while rounds < max_rounds && !self.context.is_cancelled() {
                rounds += 1;
                let attempted = self.plan_pass().await?;
                debug!(round = rounds, attempted, "planning round finished");
                if attempted == 0 {
                    break;
                }
            }
            if !self.context.is_cancelled() {
                self.run_pass().await?;
            }
            Ok(())
        }
        .await;

        drop(batch);
        self.finish(result, rounds)
    }

    fn finish(&self, result: Result<()>, plan_rounds: u32) -> Result<TraversalReport> {
        let status = self.context.status();
        self.engine.commit_documents(&format!(
            "{}: {} succeeded, {} failed",
            status.kind, status.completed, status.failed
        ));
        result?;

        info!(
            kind = %status.kind,
            completed = status.completed,
            failed = status.failed,
            cancelled = status.cancelled,
            "traversal finished"
        );
        Ok(TraversalReport {
            kind: status.kind,
            completed: status.completed,
            failed: status.failed,
            cancelled: status.cancelled,
            plan_rounds,
        })
    }

    fn parallelism(&self) -> usize {
        self.parallelism
            .unwrap_or(self.engine.config().parallelism)
            .max(1)
    }

    fn spawn(&self, set: &mut JoinSet<Job>, request: ExecutionRequest) {
        let id = request.task_id;
        let executor = Arc::clone(&self.executor);
        self.context.begin(id);
        set.spawn(async move {
            // A panicking delegate must still produce a result for its task.
            let inner = tokio::spawn(async move { executor.execute(&request).await });
            let result = match inner.await {
                Ok(result) => result,
                Err(e) => Err(Error::Execution(format!("delegate task aborted: {e}"))),
            };
            (id, result)
        });
    }

    // === Planning ===

    /// Returns the number of tasks handed to the delegate.
    async fn plan_pass(&self) -> Result<usize> {
        info!(parallelism = self.parallelism(), "planning pending tasks");
        let mut attempted = HashSet::new();
        let mut set = JoinSet::new();
        let mut failure = None;

        loop {
            while failure.is_none() && !self.context.is_cancelled() && set.len() < self.parallelism()
            {
                let task = match self.next_plannable(&attempted) {
                    Ok(Some(task)) => task,
                    Ok(None) => break,
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                };
                attempted.insert(task.id);
                match self.request_for(&task, ExecutionMode::Plan) {
                    Ok(request) => self.spawn(&mut set, request),
                    Err(e) => self.fail_plan(task.id, &format!("cannot prepare task: {e}")),
                }
            }

            let Some(joined) = set.join_next().await else {
                break;
            };
            self.reap_plan(joined);
        }

        failure.map_or(Ok(attempted.len()), Err)
    }

    fn next_plannable(&self, attempted: &HashSet<TaskId>) -> Result<Option<Task>> {
        let scheduler = self.engine.scheduler()?;
        Ok(scheduler
            .plannable()
            .into_iter()
            .find(|t| !attempted.contains(&t.id) && !self.context.is_in_flight(t.id))
            .cloned())
    }

    fn reap_plan(&self, joined: std::result::Result<Job, JoinError>) {
        let (id, outcome) = match joined {
            Ok(job) => job,
            Err(e) => {
                error!(error = %e, "planning worker failed");
                return;
            }
        };

        let applied = match outcome {
            Ok(outcome) if outcome.success => self.apply_plan(id, &outcome.output),
            Ok(outcome) => Err(Error::Execution(outcome.output)),
            Err(e) => Err(e),
        };
        match applied {
            Ok(()) => {
                info!(task_id = %id, "task planned");
                self.context.finish(id, true);
            }
            Err(e) => self.fail_plan(id, &e.to_string()),
        }
    }

    fn apply_plan(&self, id: TaskId, output: &str) -> Result<()> {
        let task = self.engine.get_task(id)?;
        match parse_plan_output(output) {
            Some(PlanReply::Planned(plan)) => {
                self.engine.attach_plan(id, &plan)?;
            }
            Some(PlanReply::Split(children)) => {
                let max_depth = self.engine.config().max_depth;
                if task.depth >= max_depth {
                    return Err(Error::Validation(format!(
                        "task #{id} is at max depth {max_depth} and cannot be split"
                    )));
                }
                let total = children.len();
                for (added, child) in children.into_iter().enumerate() {
                    if let Err(e) = self.add_child(&task, child) {
                        if added == 0 {
                            return Err(e);
                        }
                        return Err(Error::Execution(format!(
                            "split incomplete: added {added} of {total} children, then: {e}"
                        )));
                    }
                }
            }
            None => {
                return Err(Error::Validation(
                    "planning reply has no usable [SPLIT] or [PLANNED] section".into(),
                ));
            }
        }
        Ok(())
    }

    fn add_child(&self, parent: &Task, child: ChildSpec) -> Result<()> {
        if let Some(child_id) = child.id
            && let Some(existing) = self.engine.store().get_task(child_id)?
            && existing.parent == Some(parent.id)
        {
            debug!(task_id = %child_id, parent = %parent.id, "child already exists");
            return Ok(());
        }

        let created = self.engine.create_task(
            NewTask::new(child.title)
                .with_parent(parent.id)
                .with_body(child.requirement),
        )?;
        debug!(task_id = %created.id, parent = %parent.id, "created child from split");
        Ok(())
    }

    fn fail_plan(&self, id: TaskId, message: &str) {
        match self.engine.get_task(id) {
            Ok(task) if task.status == TaskStatus::Split => {
                warn!(
                    task_id = %id,
                    error = message,
                    "split incomplete; task keeps the children added so far"
                );
            }
            _ => warn!(task_id = %id, error = message, "planning failed; task stays todo"),
        }
        if let Err(e) = self.engine.record_error(id, message) {
            error!(task_id = %id, error = %e, "could not record planning error");
        }
        self.context.finish(id, false);
    }

    // === Running ===

    async fn run_pass(&self) -> Result<()> {
        info!(parallelism = self.parallelism(), "running executable tasks");
        let mut skipped = HashSet::new();
        let mut set = JoinSet::new();
        let mut failure = None;

        loop {
            while failure.is_none() && !self.context.is_cancelled() && set.len() < self.parallelism()
            {
                let task = match self.claim_runnable(&mut skipped) {
                    Ok(Some(task)) => task,
                    Ok(None) => break,
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                };
                match self.request_for(&task, ExecutionMode::Run) {
                    Ok(request) => self.spawn(&mut set, request),
                    Err(e) => {
                        self.context.begin(task.id);
                        self.finish_run(task.id, false, &format!("cannot prepare task: {e}"));
                    }
                }
            }

            let Some(joined) = set.join_next().await else {
                break;
            };
            match joined {
                Ok((id, Ok(outcome))) => self.finish_run(id, outcome.success, &outcome.output),
                Ok((id, Err(e))) => self.finish_run(id, false, &e.to_string()),
                Err(e) => error!(error = %e, "run worker failed"),
            }
        }

        failure.map_or(Ok(()), Err)
    }

    /// Moves the lowest-id executable task to `in_progress`.
    fn claim_runnable(&self, skipped: &mut HashSet<TaskId>) -> Result<Option<Task>> {
        let scheduler = self.engine.scheduler()?;
        for task in scheduler.executable() {
            if skipped.contains(&task.id) || self.context.is_in_flight(task.id) {
                continue;
            }
            match self.engine.set_status(task.id, TaskStatus::InProgress) {
                Ok(task) => return Ok(Some(task)),
                Err(Error::InvalidTransition { .. }) => {
                    debug!(task_id = %task.id, "task claimed elsewhere");
                }
                Err(e @ (Error::Store(_) | Error::Internal(_))) => return Err(e),
                Err(e) => {
                    warn!(task_id = %task.id, error = %e, "cannot start task; skipping");
                    skipped.insert(task.id);
                }
            }
        }
        Ok(None)
    }

    fn finish_run(&self, id: TaskId, success: bool, output: &str) {
        match self.engine.record_outcome(id, success, output) {
            Ok(task) => info!(task_id = %id, status = %task.status, "task finished"),
            Err(e) => error!(task_id = %id, error = %e, "could not record outcome"),
        }
        self.context.finish(id, success);
    }

    // === Requests ===

    fn request_for(&self, task: &Task, mode: ExecutionMode) -> Result<ExecutionRequest> {
        let detail = self.engine.task_detail(task.id)?;
        let docs = self.engine.documents();

        let related = self
            .engine
            .related(task.id)?
            .into_iter()
            .map(|r| {
                let text = match mode {
                    ExecutionMode::Plan => docs.load(r.task.id).map(|d| d.body).unwrap_or_default(),
                    ExecutionMode::Run => docs
                        .read_sibling(r.task.id, Sibling::Plan)
                        .ok()
                        .flatten()
                        .unwrap_or_default(),
                };
                RelatedSummary {
                    id: r.task.id,
                    title: r.task.title,
                    relation: r.relation,
                    text,
                }
            })
            .collect();

        Ok(ExecutionRequest {
            task_id: task.id,
            mode,
            title: task.title.clone(),
            requirement: detail.body,
            plan: detail.plan,
            related,
            context_map: self.engine.context_map()?,
            at_max_depth: task.depth >= self.engine.config().max_depth,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ArborConfig;
    use crate::vcs::NoVcs;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Plans by title: "Big" tasks split into two, everything else gets a
    /// plan. Runs succeed unless the title contains "fail".
    struct ScriptedExecutor {
        running: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    impl ScriptedExecutor {
        fn new() -> Self {
            Self {
                running: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Executor for ScriptedExecutor {
        async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);

            Ok(match request.mode {
                ExecutionMode::Plan if request.title.contains("Big") => ExecutionOutcome::success(
                    "[SPLIT]\n- Part one\n  First half.\n- Part two\n",
                ),
                ExecutionMode::Plan if request.title.contains("Vague") => {
                    ExecutionOutcome::success("I am not sure.")
                }
                ExecutionMode::Plan => {
                    ExecutionOutcome::success(format!("[PLANNED]\nSteps for {}", request.title))
                }
                ExecutionMode::Run if request.title.contains("fail") => {
                    ExecutionOutcome::failure("it broke")
                }
                ExecutionMode::Run => ExecutionOutcome::success(format!("Ran {}", request.title)),
            })
        }
    }

    fn setup(parallelism: usize) -> (TempDir, Arc<Engine>) {
        let dir = tempfile::tempdir().expect("should create temp directory");
        let config = ArborConfig {
            parallelism,
            ..ArborConfig::default()
        };
        let engine = Engine::with_vcs(dir.path(), config, Arc::new(NoVcs)).expect("open engine");
        (dir, Arc::new(engine))
    }

    fn traversal(
        engine: &Arc<Engine>,
        executor: &Arc<ScriptedExecutor>,
        kind: TraversalKind,
    ) -> Traversal {
        Traversal::new(
            Arc::clone(engine),
            Arc::clone(executor) as Arc<dyn Executor>,
            Arc::new(TraversalContext::new(kind)),
        )
    }

    fn status_of(engine: &Engine, id: TaskId) -> TaskStatus {
        engine.get_task(id).expect("task exists").status
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn plan_pending_plans_and_splits() {
        let (_dir, engine) = setup(2);
        let small = engine.create_task(NewTask::new("Small")).unwrap();
        let big = engine.create_task(NewTask::new("Big job")).unwrap();
        let executor = Arc::new(ScriptedExecutor::new());

        let report = traversal(&engine, &executor, TraversalKind::Plan)
            .plan_pending()
            .await
            .unwrap();

        // Small, Big job, then the two children of the split.
        assert_eq!(report.completed, 4);
        assert_eq!(report.failed, 0);
        assert_eq!(status_of(&engine, small.id), TaskStatus::Planned);
        assert_eq!(status_of(&engine, big.id), TaskStatus::Split);

        let children = engine.store().children(big.id).unwrap();
        assert_eq!(children.len(), 2);
        assert!(children.iter().all(|c| c.status == TaskStatus::Planned));
        assert_eq!(engine.task_detail(children[0].id).unwrap().body, "First half.");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unusable_plan_is_recorded_and_task_stays_todo() {
        let (_dir, engine) = setup(1);
        let vague = engine.create_task(NewTask::new("Vague idea")).unwrap();
        let executor = Arc::new(ScriptedExecutor::new());

        let report = traversal(&engine, &executor, TraversalKind::Plan)
            .plan_pending()
            .await
            .unwrap();

        assert_eq!((report.completed, report.failed), (0, 1));
        assert_eq!(status_of(&engine, vague.id), TaskStatus::Todo);
        let error = engine.task_detail(vague.id).unwrap().error.unwrap();
        assert!(error.contains("[SPLIT]"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn run_ready_follows_dependencies() {
        let (_dir, engine) = setup(4);
        let first = engine.create_task(NewTask::new("First")).unwrap();
        let second = engine.create_task(NewTask::new("Second")).unwrap();
        let broken = engine.create_task(NewTask::new("Will fail")).unwrap();
        for task in [&first, &second, &broken] {
            engine.attach_plan(task.id, "do it").unwrap();
        }
        engine.add_edge(second.id, first.id).unwrap();
        let executor = Arc::new(ScriptedExecutor::new());

        let report = traversal(&engine, &executor, TraversalKind::Run)
            .run_ready()
            .await
            .unwrap();

        assert_eq!((report.completed, report.failed), (2, 1));
        assert_eq!(status_of(&engine, first.id), TaskStatus::Done);
        assert_eq!(status_of(&engine, second.id), TaskStatus::Done);
        assert_eq!(status_of(&engine, broken.id), TaskStatus::Failed);
        assert_eq!(
            engine.task_detail(broken.id).unwrap().error.as_deref(),
            Some("it broke\n")
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn parallelism_is_respected() {
        let (_dir, engine) = setup(2);
        for n in 0..6 {
            let task = engine.create_task(NewTask::new(format!("Job {n}"))).unwrap();
            engine.attach_plan(task.id, "do it").unwrap();
        }
        let executor = Arc::new(ScriptedExecutor::new());

        let report = traversal(&engine, &executor, TraversalKind::Run)
            .run_ready()
            .await
            .unwrap();

        assert_eq!(report.completed, 6);
        assert!(executor.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancelled_traversal_starts_nothing() {
        let (_dir, engine) = setup(2);
        let task = engine.create_task(NewTask::new("Job")).unwrap();
        engine.attach_plan(task.id, "do it").unwrap();
        let executor = Arc::new(ScriptedExecutor::new());

        let traversal = traversal(&engine, &executor, TraversalKind::Run);
        traversal.context().cancel();
        let report = traversal.run_ready().await.unwrap();

        assert!(report.cancelled);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
        assert_eq!(status_of(&engine, task.id), TaskStatus::Planned);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cycle_plans_then_runs() {
        let (_dir, engine) = setup(2);
        let big = engine.create_task(NewTask::new("Big job")).unwrap();
        let executor = Arc::new(ScriptedExecutor::new());

        let report = traversal(&engine, &executor, TraversalKind::Cycle)
            .cycle()
            .await
            .unwrap();

        assert!(report.plan_rounds >= 1);
        let children = engine.store().children(big.id).unwrap();
        assert_eq!(children.len(), 2);
        assert!(children.iter().all(|c| c.status == TaskStatus::Done));
        assert_eq!(status_of(&engine, big.id), TaskStatus::Split);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn interrupted_split_is_reported_as_partial() {
        let (_dir, engine) = setup(1);
        let big = engine.create_task(NewTask::new("Big job")).unwrap();
        // The second child of the split gets id 3.
        engine
            .store()
            .connection()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER refuse_three BEFORE INSERT ON tasks WHEN NEW.id = 3
                 BEGIN SELECT RAISE(ABORT, 'refused'); END",
            )
            .unwrap();
        let executor = Arc::new(ScriptedExecutor::new());

        let report = traversal(&engine, &executor, TraversalKind::Plan)
            .plan_pending()
            .await
            .unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(status_of(&engine, big.id), TaskStatus::Split);
        assert_eq!(engine.store().children(big.id).unwrap().len(), 1);
        assert!(!engine.documents().exists(TaskId::new(3).unwrap()));
        let error = engine.task_detail(big.id).unwrap().error.unwrap();
        assert!(error.contains("split incomplete: added 1 of 2 children"));
    }
}
