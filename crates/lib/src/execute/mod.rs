//! Running an action over all configs, level by level.
//!
//! Levels run strictly one after another. Configs within a level run
//! concurrently, bounded by [`ExecuteConfig::parallelism`]. A failure lets
//! deployments already in flight finish polling, stops configs of that level
//! that have not started yet, and skips every later level.

mod stages;
mod types;

pub use stages::{StageEntry, StagesError, StagesFormat, render_stages, stage_entries, stage_footer, stage_header};
pub use types::{
  Action, ActionOptions, ExecuteConfig, ExecuteError, NodeReport, NoopReporter, ProgressReporter, RunResult,
  StageResult,
};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::deployment::{DeployContext, Deployment, DeploymentError};
use crate::graph::{ConfigGraph, ExistenceResolver, GraphError, Levels};
use crate::types::NodeId;

/// Build the graph and compute levels.
///
/// Fails before any remote call on a cycle. External dependencies are
/// checked through `resolver`.
pub async fn plan<R>(configs: Vec<Config>, resolver: &R) -> Result<Levels, GraphError>
where
  R: ExistenceResolver + ?Sized,
{
  let graph = ConfigGraph::new(configs)?;
  Levels::compute(&graph, resolver).await
}

/// Levels in the order `action` walks them.
pub fn ordered(levels: &Levels, action: Action, options: &ActionOptions) -> Levels {
  if action.is_deletion() || options.reverse {
    levels.reversed()
  } else {
    levels.clone()
  }
}

/// Run `action` over every level.
pub async fn run(
  levels: &Levels,
  action: Action,
  options: &ActionOptions,
  ctx: Arc<DeployContext>,
  config: &ExecuteConfig,
  reporter: &dyn ProgressReporter,
) -> Result<RunResult, ExecuteError> {
  let order = ordered(levels, action, options);
  let semaphore = Arc::new(Semaphore::new(config.parallelism.max(1)));
  let halted = Arc::new(AtomicBool::new(false));
  let mut result = RunResult::default();

  info!(%action, stages = order.len(), "starting run");

  for (index, level) in order.iter().enumerate() {
    let stage = index + 1;
    reporter.stage_started(stage, level);
    info!(stage, deployments = level.len(), "starting stage");

    let mut join_set = JoinSet::new();
    for config in level {
      join_set.spawn(run_node(
        Arc::clone(config),
        action,
        *options,
        Arc::clone(&ctx),
        Arc::clone(&semaphore),
        Arc::clone(&halted),
      ));
    }

    let mut nodes = Vec::new();
    let mut failure: Option<ExecuteError> = None;
    while let Some(joined) = join_set.join_next().await {
      let err = match joined {
        Ok((_, Ok(Some(report)))) => {
          reporter.node_finished(&report);
          nodes.push(report);
          continue;
        }
        Ok((node, Ok(None))) => {
          debug!(deployment = %node, "not started after failure");
          continue;
        }
        Ok((node, Err(source))) => {
          error!(deployment = %node, error = %source, "deployment failed");
          ExecuteError::Deployment { node, source }
        }
        Err(e) => {
          error!(error = %e, "deployment task panicked");
          halted.store(true, Ordering::SeqCst);
          ExecuteError::Task(e)
        }
      };
      // An abort outranks ordinary failures.
      if failure.as_ref().is_none_or(|current| !current.is_abort() && err.is_abort()) {
        failure = Some(err);
      }
    }

    if let Some(err) = failure {
      return Err(err);
    }

    nodes.sort_by(|a, b| a.id.cmp(&b.id));
    result.stages.push(StageResult { stage, nodes });
  }

  info!(%action, deployments = result.node_count(), "run finished");
  Ok(result)
}

type NodeOutcome = (NodeId, Result<Option<NodeReport>, DeploymentError>);

async fn run_node(
  config: Arc<Config>,
  action: Action,
  options: ActionOptions,
  ctx: Arc<DeployContext>,
  semaphore: Arc<Semaphore>,
  halted: Arc<AtomicBool>,
) -> NodeOutcome {
  let id = config.id().clone();
  let Ok(_permit) = semaphore.acquire().await else {
    return (id, Ok(None));
  };
  if halted.load(Ordering::SeqCst) || ctx.is_aborted() {
    return (id, Ok(None));
  }

  let mut deployment = Deployment::new(config, ctx);
  let outcome = match action {
    Action::Apply => deployment.apply(options.preview, options.create_policy).await,
    Action::Create => deployment.create(options.preview, options.create_policy).await,
    Action::Update => deployment.update(options.preview, options.create_policy).await,
    Action::Delete => deployment.delete(options.delete_policy).await,
  };

  match outcome {
    Ok(state) => {
      let report = NodeReport {
        id: id.clone(),
        state,
        summary: deployment.summary().cloned(),
      };
      (id, Ok(Some(report)))
    }
    Err(e) => {
      halted.store(true, Ordering::SeqCst);
      (id, Err(e))
    }
  }
}
