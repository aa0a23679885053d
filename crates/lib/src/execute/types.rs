//! Types for running an action across all levels.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::config::Config;
use crate::consts::DEFAULT_PARALLELISM;
use crate::deployment::{DeploymentError, DeploymentState};
use crate::graph::GraphError;
use crate::remote::{CreatePolicy, DeletePolicy, DeploymentSummary};
use crate::types::NodeId;

/// The lifecycle operation to run on every config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
  Apply,
  Create,
  Update,
  Delete,
}

impl Action {
  /// Deletions walk the levels backwards.
  pub fn is_deletion(&self) -> bool {
    matches!(self, Action::Delete)
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Action::Apply => "apply",
      Action::Create => "create",
      Action::Update => "update",
      Action::Delete => "delete",
    }
  }
}

impl fmt::Display for Action {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Per-run flags passed to every deployment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionOptions {
  pub preview: bool,
  /// Walk the levels backwards even for non-deletions.
  pub reverse: bool,
  pub create_policy: Option<CreatePolicy>,
  pub delete_policy: Option<DeletePolicy>,
}

/// Tuning for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteConfig {
  /// Maximum deployments in flight within one level.
  pub parallelism: usize,
}

impl Default for ExecuteConfig {
  fn default() -> Self {
    Self {
      parallelism: DEFAULT_PARALLELISM,
    }
  }
}

/// Errors that stop a run.
#[derive(Debug, Error)]
pub enum ExecuteError {
  #[error(transparent)]
  Graph(#[from] GraphError),

  #[error("{node}: {source}")]
  Deployment {
    node: NodeId,
    #[source]
    source: DeploymentError,
  },

  #[error("deployment task failed: {0}")]
  Task(#[from] tokio::task::JoinError),
}

impl ExecuteError {
  /// Whether the run was stopped by an abort decision.
  pub fn is_abort(&self) -> bool {
    matches!(
      self,
      ExecuteError::Deployment {
        source: DeploymentError::PreviewAborted { .. },
        ..
      }
    )
  }
}

/// Outcome for one deployment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeReport {
  pub id: NodeId,
  pub state: DeploymentState,
  pub summary: Option<DeploymentSummary>,
}

/// Outcome for one level.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StageResult {
  /// 1-based stage number.
  pub stage: usize,
  pub nodes: Vec<NodeReport>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunResult {
  pub stages: Vec<StageResult>,
}

impl RunResult {
  pub fn node_count(&self) -> usize {
    self.stages.iter().map(|s| s.nodes.len()).sum()
  }
}

/// Receives progress while a run executes.
pub trait ProgressReporter: Send + Sync {
  /// Called before any deployment of the stage starts.
  fn stage_started(&self, stage: usize, configs: &[Arc<Config>]);

  fn node_finished(&self, report: &NodeReport);
}

/// Reporter that ignores all progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
  fn stage_started(&self, _stage: usize, _configs: &[Arc<Config>]) {}

  fn node_finished(&self, _report: &NodeReport) {}
}
