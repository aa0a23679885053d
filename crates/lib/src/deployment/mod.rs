//! Driving a single config through its remote lifecycle.
//!
//! A [`Deployment`] owns one [`Config`] and moves it through
//! `Pending -> Creating | Updating | Deleting -> (PreviewPending) -> Applied |
//! Deleted | Skipped | Failed` against the remote API held by a
//! [`DeployContext`].

mod preview;
mod resolve;
mod target;
mod wait;

pub use preview::{DecisionProvider, FixedDecision, PreviewDecision};
pub use wait::WaitConfig;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::document::DocumentError;
use crate::reference::{OutputReference, ReferenceError};
use crate::remote::{
  CreatePolicy, DeletePolicy, DeploymentApi, DeploymentRecord, DeploymentSpec, DeploymentSummary, MutationOptions,
  Operation, RemoteError, Target,
};
use crate::types::NodeId;

/// Errors that can occur while deploying one config.
#[derive(Debug, Error)]
pub enum DeploymentError {
  /// Update of a deployment that is not there.
  #[error("deployment {node} does not exist")]
  NotFound { node: NodeId },

  /// Create of a deployment that is already there. `apply` falls back to
  /// an update on this one.
  #[error("deployment {node} already exists")]
  AlreadyExists {
    node: NodeId,
    #[source]
    source: RemoteError,
  },

  /// A remote call failed, including stale-fingerprint conflicts, which are
  /// never retried.
  #[error("remote call for {node} failed: {source}")]
  Remote {
    node: NodeId,
    #[source]
    source: RemoteError,
  },

  /// The operation finished with errors.
  #[error("operation {operation} on {node} failed: {message}")]
  OperationFailed {
    node: NodeId,
    operation: String,
    message: String,
  },

  /// Polling passed the operation ceiling.
  #[error("operation {operation} on {node} did not finish within {timeout:?}")]
  OperationTimeout {
    node: NodeId,
    operation: String,
    timeout: Duration,
  },

  /// The preview was answered with abort.
  #[error("run aborted at preview of {node}")]
  PreviewAborted { node: NodeId },

  /// A referenced output is missing from the dependency's manifest.
  #[error("{node}: output {reference} not found")]
  UnresolvedOutput { node: NodeId, reference: OutputReference },

  #[error(transparent)]
  Reference(#[from] ReferenceError),

  /// A template or file listed under `imports` could not be read.
  #[error("failed to read import {path}: {source}")]
  Import {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error(transparent)]
  Document(#[from] DocumentError),

  /// The decision provider could not answer, e.g. no terminal.
  #[error("no preview decision for {node}: {source}")]
  Decision {
    node: NodeId,
    #[source]
    source: std::io::Error,
  },
}

/// Lifecycle state of a [`Deployment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeploymentState {
  Pending,
  Creating,
  Updating,
  Deleting,
  PreviewPending,
  Applied,
  Deleted,
  /// The preview was cancelled by a skip decision.
  Skipped,
  Failed,
}

impl fmt::Display for DeploymentState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      DeploymentState::Pending => "pending",
      DeploymentState::Creating => "creating",
      DeploymentState::Updating => "updating",
      DeploymentState::Deleting => "deleting",
      DeploymentState::PreviewPending => "preview pending",
      DeploymentState::Applied => "applied",
      DeploymentState::Deleted => "deleted",
      DeploymentState::Skipped => "skipped",
      DeploymentState::Failed => "failed",
    })
  }
}

/// Everything a deployment needs from the outside world.
///
/// Built once per run and shared by every [`Deployment`]. Preview decisions
/// are asked one at a time, and an abort answer is visible to every other
/// deployment of the run before it can ask.
pub struct DeployContext {
  pub api: Arc<dyn DeploymentApi>,
  pub decisions: Arc<dyn DecisionProvider>,
  pub wait: WaitConfig,
  aborted: AtomicBool,
  deciding: Mutex<()>,
}

impl DeployContext {
  pub fn new(api: Arc<dyn DeploymentApi>, decisions: Arc<dyn DecisionProvider>) -> Self {
    Self {
      api,
      decisions,
      wait: WaitConfig::default(),
      aborted: AtomicBool::new(false),
      deciding: Mutex::new(()),
    }
  }

  pub fn with_wait(mut self, wait: WaitConfig) -> Self {
    self.wait = wait;
    self
  }

  /// Set once a preview was answered with abort.
  pub fn is_aborted(&self) -> bool {
    self.aborted.load(Ordering::SeqCst)
  }

  fn abort(&self) {
    self.aborted.store(true, Ordering::SeqCst);
  }
}

impl fmt::Debug for DeployContext {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("DeployContext")
      .field("wait", &self.wait)
      .field("aborted", &self.is_aborted())
      .finish_non_exhaustive()
  }
}

/// Lifecycle controller for one config.
pub struct Deployment {
  config: Arc<Config>,
  ctx: Arc<DeployContext>,
  state: DeploymentState,
  current: Option<DeploymentRecord>,
  summary: Option<DeploymentSummary>,
}

impl Deployment {
  pub fn new(config: Arc<Config>, ctx: Arc<DeployContext>) -> Self {
    Self {
      config,
      ctx,
      state: DeploymentState::Pending,
      current: None,
      summary: None,
    }
  }

  pub fn id(&self) -> &NodeId {
    self.config.id()
  }

  pub fn state(&self) -> DeploymentState {
    self.state
  }

  /// Resources and outputs fetched after the last successful mutation.
  pub fn summary(&self) -> Option<&DeploymentSummary> {
    self.summary.as_ref()
  }

  /// Create the deployment. With `preview`, the change is only staged.
  pub async fn create(
    &mut self,
    preview: bool,
    create_policy: Option<CreatePolicy>,
  ) -> Result<DeploymentState, DeploymentError> {
    let result = match self.target().await {
      Ok(target) => self.try_create(target, preview, create_policy).await,
      Err(e) => Err(e),
    };
    self.settle(result)
  }

  /// Update an existing deployment.
  ///
  /// If a preview is already staged remotely, the update is sent as a preview
  /// too and then promoted. With `preview`, the decision provider chooses
  /// whether to confirm, skip or abort.
  pub async fn update(
    &mut self,
    preview: bool,
    create_policy: Option<CreatePolicy>,
  ) -> Result<DeploymentState, DeploymentError> {
    let result = self.try_update(None, preview, create_policy).await;
    self.settle(result)
  }

  /// Create, or update when the deployment already exists.
  ///
  /// References are resolved once and the same target is sent by both calls.
  pub async fn apply(
    &mut self,
    preview: bool,
    create_policy: Option<CreatePolicy>,
  ) -> Result<DeploymentState, DeploymentError> {
    let target = match self.target().await {
      Ok(target) => target,
      Err(e) => return self.settle(Err(e)),
    };
    let created = self.try_create(target.clone(), preview, create_policy).await;
    let result = match created {
      Err(DeploymentError::AlreadyExists { .. }) => {
        info!(deployment = %self.id(), "deployment exists, updating instead");
        self.try_update(Some(target), preview, create_policy).await
      }
      other => other,
    };
    self.settle(result)
  }

  /// Delete the deployment. A deployment that is already gone counts as
  /// deleted.
  pub async fn delete(&mut self, policy: Option<DeletePolicy>) -> Result<DeploymentState, DeploymentError> {
    let result = self.try_delete(policy).await;
    self.settle(result)
  }

  fn settle(&mut self, result: Result<DeploymentState, DeploymentError>) -> Result<DeploymentState, DeploymentError> {
    match result {
      Ok(state) => {
        self.state = state;
        Ok(state)
      }
      Err(e) => {
        self.state = DeploymentState::Failed;
        Err(e)
      }
    }
  }

  fn remote_error(&self, source: RemoteError) -> DeploymentError {
    DeploymentError::Remote {
      node: self.id().clone(),
      source,
    }
  }

  async fn try_create(
    &mut self,
    target: Target,
    preview: bool,
    create_policy: Option<CreatePolicy>,
  ) -> Result<DeploymentState, DeploymentError> {
    self.state = DeploymentState::Creating;
    let spec = DeploymentSpec {
      name: self.config.deployment().to_string(),
      target: Some(target),
      fingerprint: None,
    };
    let options = MutationOptions { preview, create_policy };

    info!(deployment = %self.id(), preview, "creating deployment");
    let operation = self
      .ctx
      .api
      .create_deployment(self.config.project(), &spec, &options)
      .await
      .map_err(|source| match source {
        RemoteError::Conflict { .. } => DeploymentError::AlreadyExists {
          node: self.id().clone(),
          source,
        },
        source => self.remote_error(source),
      })?;
    self.wait(&operation).await?;

    if preview {
      info!(deployment = %self.id(), "preview staged");
      return Ok(DeploymentState::PreviewPending);
    }
    self.fetch_summary().await;
    Ok(DeploymentState::Applied)
  }

  /// `target` is resolved here when the caller has not already done so.
  async fn try_update(
    &mut self,
    target: Option<Target>,
    preview: bool,
    create_policy: Option<CreatePolicy>,
  ) -> Result<DeploymentState, DeploymentError> {
    self.state = DeploymentState::Updating;
    let current = self.refresh().await?.ok_or_else(|| DeploymentError::NotFound {
      node: self.id().clone(),
    })?;
    let staged_remotely = current.pending_preview;

    let target = match target {
      Some(target) => target,
      None => self.target().await?,
    };
    let spec = DeploymentSpec {
      name: self.config.deployment().to_string(),
      target: Some(target),
      fingerprint: Some(current.fingerprint),
    };
    let options = MutationOptions {
      preview: preview || staged_remotely,
      create_policy,
    };

    info!(deployment = %self.id(), preview = options.preview, "updating deployment");
    let operation = self
      .ctx
      .api
      .update_deployment(self.id(), &spec, &options)
      .await
      .map_err(|source| self.remote_error(source))?;
    self.wait(&operation).await?;

    if preview {
      self.state = DeploymentState::PreviewPending;
      return self.resolve_preview().await;
    }
    if staged_remotely {
      debug!(deployment = %self.id(), "promoting previously staged preview");
      return self.confirm_preview().await;
    }
    self.fetch_summary().await;
    Ok(DeploymentState::Applied)
  }

  async fn resolve_preview(&mut self) -> Result<DeploymentState, DeploymentError> {
    let decision = {
      let _turn = self.ctx.deciding.lock().await;
      if self.ctx.is_aborted() {
        return Ok(self.leave_staged());
      }
      let decision = self
        .ctx
        .decisions
        .decide(self.id())
        .await
        .map_err(|source| DeploymentError::Decision {
          node: self.id().clone(),
          source,
        })?;
      if decision == PreviewDecision::Abort {
        self.ctx.abort();
      }
      decision
    };
    info!(deployment = %self.id(), %decision, "preview decision");

    match decision {
      PreviewDecision::Confirm => self.confirm_preview().await,
      PreviewDecision::Skip => self.cancel_preview().await,
      PreviewDecision::Abort => Err(DeploymentError::PreviewAborted {
        node: self.id().clone(),
      }),
    }
  }

  /// Promote the staged preview with an update that carries no target.
  async fn confirm_preview(&mut self) -> Result<DeploymentState, DeploymentError> {
    if self.ctx.is_aborted() {
      return Ok(self.leave_staged());
    }
    let fingerprint = self.fingerprint()?;
    let spec = DeploymentSpec {
      name: self.config.deployment().to_string(),
      target: None,
      fingerprint: Some(fingerprint),
    };
    let operation = self
      .ctx
      .api
      .update_deployment(self.id(), &spec, &MutationOptions::default())
      .await
      .map_err(|source| self.remote_error(source))?;
    self.wait(&operation).await?;
    self.fetch_summary().await;
    Ok(DeploymentState::Applied)
  }

  async fn cancel_preview(&mut self) -> Result<DeploymentState, DeploymentError> {
    if self.ctx.is_aborted() {
      return Ok(self.leave_staged());
    }
    let fingerprint = self.fingerprint()?;
    let operation = self
      .ctx
      .api
      .cancel_preview(self.id(), &fingerprint)
      .await
      .map_err(|source| self.remote_error(source))?;
    self.wait(&operation).await?;
    warn!(deployment = %self.id(), "preview cancelled, deployment left unchanged");
    Ok(DeploymentState::Skipped)
  }

  /// After an abort, staged previews are neither confirmed nor cancelled.
  fn leave_staged(&self) -> DeploymentState {
    warn!(deployment = %self.id(), "run aborted, preview left staged");
    DeploymentState::PreviewPending
  }

  async fn try_delete(&mut self, policy: Option<DeletePolicy>) -> Result<DeploymentState, DeploymentError> {
    self.state = DeploymentState::Deleting;
    info!(deployment = %self.id(), policy = ?policy, "deleting deployment");

    let deleted = self.ctx.api.delete_deployment(self.id(), policy).await;
    let operation = match deleted {
      Ok(operation) => operation,
      Err(RemoteError::NotFound { .. }) => {
        warn!(deployment = %self.id(), "deployment does not exist, nothing to delete");
        self.current = None;
        return Ok(DeploymentState::Deleted);
      }
      Err(source) => return Err(self.remote_error(source)),
    };

    wait::wait_for_operation(self.ctx.api.as_ref(), self.config.id(), &operation, &self.ctx.wait).await?;
    self.current = None;
    Ok(DeploymentState::Deleted)
  }

  /// Wait for an operation, then re-read the record for a fresh fingerprint.
  async fn wait(&mut self, operation: &Operation) -> Result<(), DeploymentError> {
    wait::wait_for_operation(self.ctx.api.as_ref(), self.config.id(), operation, &self.ctx.wait).await?;
    self.refresh().await?;
    Ok(())
  }

  async fn refresh(&mut self) -> Result<Option<DeploymentRecord>, DeploymentError> {
    let record = self
      .ctx
      .api
      .get_deployment(self.id())
      .await
      .map_err(|source| self.remote_error(source))?;
    self.current = record.clone();
    Ok(record)
  }

  fn fingerprint(&self) -> Result<String, DeploymentError> {
    self
      .current
      .as_ref()
      .map(|record| record.fingerprint.clone())
      .ok_or_else(|| DeploymentError::NotFound {
        node: self.id().clone(),
      })
  }

  /// The remote-facing document with every output reference resolved.
  async fn target(&self) -> Result<Target, DeploymentError> {
    let document = self.config.remote_document();
    let project = self.config.project();
    let references = resolve::collect_references(&document, project)?;
    let resolved = resolve::resolve_all(self.ctx.api.as_ref(), self.id(), references).await?;
    let document = resolve::substitute(&document, project, &resolved)?;
    target::build_target(&document, &self.config.base_dir())
  }

  async fn fetch_summary(&mut self) {
    let layout = self.ctx.api.get_manifest(self.id()).await;
    match layout {
      Ok(layout) => self.summary = Some(DeploymentSummary::from_layout(&layout)),
      Err(e) => warn!(deployment = %self.id(), error = %e, "could not fetch resources and outputs"),
    }
  }
}
