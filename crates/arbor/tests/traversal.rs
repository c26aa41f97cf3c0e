//! Planning and execution traversals driven by in-process delegates.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use arbor::exec::{ExecutionMode, ExecutionOutcome, ExecutionRequest};
use arbor::{
    ArborConfig, Engine, Executor, Relation, TaskStatus, Traversal, TraversalContext,
    TraversalKind,
};
use async_trait::async_trait;
use common::{SnapshotVcs, add, id, project_with};
use tokio_util::sync::CancellationToken;

/// Remembers every request; splits tasks titled "Big ...", plans the rest
/// and reports success for every run.
#[derive(Default)]
struct RecordingExecutor {
    requests: Mutex<Vec<ExecutionRequest>>,
}

impl RecordingExecutor {
    fn requests_for(&self, title: &str) -> Vec<ExecutionRequest> {
        self.requests
            .lock()
            .expect("lock requests")
            .iter()
            .filter(|r| r.title == title)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Executor for RecordingExecutor {
    async fn execute(&self, request: &ExecutionRequest) -> arbor::Result<ExecutionOutcome> {
        self.requests
            .lock()
            .expect("lock requests")
            .push(request.clone());
        Ok(match request.mode {
            ExecutionMode::Plan if request.title.starts_with("Big") => {
                ExecutionOutcome::success("[SPLIT]\n- Part one\n  First half.\n- Part two\n")
            }
            ExecutionMode::Plan => {
                ExecutionOutcome::success(format!("[PLANNED]\n1. Do {}", request.title))
            }
            ExecutionMode::Run => ExecutionOutcome::success("all good"),
        })
    }
}

/// Cancels the traversal from inside the first call it receives.
struct CancellingExecutor {
    token: CancellationToken,
    calls: AtomicUsize,
}

#[async_trait]
impl Executor for CancellingExecutor {
    async fn execute(&self, _request: &ExecutionRequest) -> arbor::Result<ExecutionOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.token.cancel();
        Ok(ExecutionOutcome::success("finished anyway"))
    }
}

fn engine_with(config: ArborConfig) -> (tempfile::TempDir, Arc<Engine>, Arc<SnapshotVcs>) {
    let vcs = Arc::new(SnapshotVcs::default());
    let (dir, engine) = project_with(config, vcs.clone());
    (dir, Arc::new(engine), vcs)
}

fn traversal(engine: &Arc<Engine>, executor: Arc<dyn Executor>, kind: TraversalKind) -> Traversal {
    Traversal::new(
        Arc::clone(engine),
        executor,
        Arc::new(TraversalContext::new(kind)),
    )
}

// === Planning ===

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn split_children_are_planned_at_max_depth() {
    let config = ArborConfig {
        max_depth: 1,
        ..ArborConfig::default()
    };
    let (_dir, engine, _vcs) = engine_with(config);
    let root = add(&engine, "Big root");
    let executor = Arc::new(RecordingExecutor::default());

    let report = traversal(&engine, executor.clone(), TraversalKind::Plan)
        .plan_pending()
        .await
        .expect("plan traversal");

    assert_eq!(report.completed, 3);
    assert_eq!(report.failed, 0);
    assert_eq!(engine.get_task(root.id).expect("root").status, TaskStatus::Split);

    let root_request = &executor.requests_for("Big root")[0];
    assert!(!root_request.at_max_depth);
    assert_eq!(root_request.requirement, "Requirement of Big root.");

    let part_one = &executor.requests_for("Part one")[0];
    assert!(part_one.at_max_depth);
    assert_eq!(part_one.requirement, "First half.");
    let parent = part_one
        .related
        .iter()
        .find(|r| r.relation == Relation::Parent)
        .expect("parent is related");
    assert_eq!(parent.id, root.id);
    assert_eq!(parent.text, "Requirement of Big root.");
    assert!(part_one.context_map.contains("Part two"));

    for child in engine.store().children(root.id).expect("children") {
        assert_eq!(child.status, TaskStatus::Planned);
        assert!(engine.task_detail(child.id).expect("detail").plan.is_some());
    }
}

// === Running ===

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_sees_dependency_plans_and_commits_once() {
    let (_dir, engine, vcs) = engine_with(ArborConfig::default());
    let build = add(&engine, "Build");
    let ship = add(&engine, "Ship");
    engine.add_edge(ship.id, build.id).expect("ship needs build");
    engine.attach_plan(build.id, "compile it").expect("plan build");
    engine.attach_plan(ship.id, "upload it").expect("plan ship");
    let commits_before = vcs.commit_count();
    let executor = Arc::new(RecordingExecutor::default());

    let report = traversal(&engine, executor.clone(), TraversalKind::Run)
        .run_ready()
        .await
        .expect("run traversal");

    assert_eq!((report.completed, report.failed), (2, 0));
    assert!(!report.cancelled);

    let ship_request = &executor.requests_for("Ship")[0];
    assert_eq!(ship_request.plan.as_deref(), Some("upload it\n"));
    let dependency = ship_request
        .related
        .iter()
        .find(|r| r.relation == Relation::Dependency)
        .expect("dependency is related");
    assert_eq!(dependency.text, "compile it\n");

    let detail = engine.task_detail(ship.id).expect("detail");
    assert_eq!(detail.task.status, TaskStatus::Done);
    assert_eq!(detail.report.as_deref(), Some("all good\n"));

    let messages = vcs.messages.lock().expect("lock messages");
    assert_eq!(messages.len(), commits_before + 1);
    assert_eq!(
        messages.last().map(String::as_str),
        Some("run: 2 succeeded, 0 failed")
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancellation_lets_running_task_finish() {
    let config = ArborConfig {
        parallelism: 1,
        ..ArborConfig::default()
    };
    let (_dir, engine, _vcs) = engine_with(config);
    for title in ["One", "Two", "Three"] {
        let task = add(&engine, title);
        engine.attach_plan(task.id, "go").expect("plan task");
    }

    let context = Arc::new(TraversalContext::new(TraversalKind::Run));
    let executor = Arc::new(CancellingExecutor {
        token: context.token().clone(),
        calls: AtomicUsize::new(0),
    });
    let report = Traversal::new(Arc::clone(&engine), executor.clone(), Arc::clone(&context))
        .run_ready()
        .await
        .expect("run traversal");

    assert!(report.cancelled);
    assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.completed, 1);
    assert_eq!(engine.get_task(id(1)).expect("#1").status, TaskStatus::Done);
    for raw in [2, 3] {
        assert_eq!(
            engine.get_task(id(raw)).expect("task").status,
            TaskStatus::Planned
        );
    }
    assert!(context.status().in_flight.is_empty());
}

// === Full Cycle ===

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cycle_takes_todo_tree_to_done() {
    let (_dir, engine, _vcs) = engine_with(ArborConfig::default());
    let root = add(&engine, "Big feature");
    let executor = Arc::new(RecordingExecutor::default());

    let report = traversal(&engine, executor, TraversalKind::Cycle)
        .cycle()
        .await
        .expect("cycle traversal");

    assert!(report.plan_rounds >= 1);
    assert_eq!(report.failed, 0);
    let stats = engine.stats().expect("stats");
    assert_eq!(stats.leaves, 2);
    assert_eq!(stats.leaves_with(TaskStatus::Done), 2);
    assert_eq!(engine.get_task(root.id).expect("root").status, TaskStatus::Split);
}
