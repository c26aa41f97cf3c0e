//! `arbor run`, `arbor plan` and `arbor cycle` command implementations.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arbor::{CommandExecutor, Executor, Traversal, TraversalContext, TraversalKind};
use colored::Colorize;
use tracing::{info, warn};

use super::OutputMode;
use super::output::print_json;

/// Run a traversal until it finishes or Ctrl-C is pressed.
pub fn run(dir: &Path, kind: TraversalKind, parallel: Option<usize>, mode: OutputMode) -> Result<()> {
    let engine = Arc::new(super::open(dir)?);
    let executor: Arc<dyn Executor> = Arc::new(CommandExecutor::from_config(
        &engine.config().executor,
        engine.paths().root(),
    ));
    let context = Arc::new(TraversalContext::new(kind));

    let mut traversal = Traversal::new(Arc::clone(&engine), executor, Arc::clone(&context));
    if let Some(parallel) = parallel {
        traversal = traversal.with_parallelism(parallel);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("cannot start async runtime")?;

    let report = runtime.block_on(async {
        let token = context.token().clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted; waiting for running tasks to finish");
                token.cancel();
            }
        });

        info!(%kind, "traversal started");
        match kind {
            TraversalKind::Plan => traversal.plan_pending().await,
            TraversalKind::Run => traversal.run_ready().await,
            TraversalKind::Cycle => traversal.cycle().await,
        }
    })?;

    match mode {
        OutputMode::Json => print_json(&report),
        OutputMode::Text => {
            let failed = if report.failed > 0 {
                report.failed.to_string().red().bold()
            } else {
                report.failed.to_string().normal()
            };
            println!(
                "{} {}: {} succeeded, {failed} failed",
                "Finished".bold(),
                report.kind,
                report.completed.to_string().green()
            );
            if report.cancelled {
                println!("  {}", "stopped early on request".yellow());
            }
            Ok(())
        }
    }
}
