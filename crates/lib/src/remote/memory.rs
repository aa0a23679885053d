//! In-process fake of the [`DeploymentApi`] for unit and scenario tests.
//!
//! Deployments live in a map guarded by a mutex. Every call is recorded so
//! tests can assert on exactly which remote calls were made. Operations can be
//! scripted to take several polls, fail, never finish, or stall inside a
//! single poll. A deployment can also be marked as written to by someone else
//! between reads.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::document::Document;
use crate::types::NodeId;

use super::{
  ApiResult, DeletePolicy, DeploymentApi, DeploymentRecord, DeploymentSpec, MutationOptions, Operation,
  OperationStatus, RemoteError, Target,
};

/// A call made against [`MemoryDeploymentApi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
  GetDeployment(NodeId),
  GetManifest(NodeId),
  Create {
    id: NodeId,
    preview: bool,
  },
  Update {
    id: NodeId,
    preview: bool,
    has_target: bool,
  },
  Delete {
    id: NodeId,
    policy: Option<DeletePolicy>,
  },
  CancelPreview(NodeId),
  Poll(String),
}

impl ApiCall {
  /// Whether this call changes remote state.
  pub fn is_mutation(&self) -> bool {
    matches!(
      self,
      ApiCall::Create { .. } | ApiCall::Update { .. } | ApiCall::Delete { .. } | ApiCall::CancelPreview(_)
    )
  }

  /// The deployment the call targets, if any.
  pub fn node(&self) -> Option<&NodeId> {
    match self {
      ApiCall::GetDeployment(id) | ApiCall::GetManifest(id) | ApiCall::CancelPreview(id) => Some(id),
      ApiCall::Create { id, .. } | ApiCall::Update { id, .. } | ApiCall::Delete { id, .. } => Some(id),
      ApiCall::Poll(_) => None,
    }
  }
}

#[derive(Debug)]
struct Stored {
  record: DeploymentRecord,
  applied: Option<Target>,
  staged: Option<Target>,
}

#[derive(Debug)]
struct PendingOperation {
  remaining_polls: usize,
  outcome: OperationStatus,
  /// A poll of this operation never returns.
  stalls: bool,
}

#[derive(Debug, Default)]
struct State {
  deployments: BTreeMap<NodeId, Stored>,
  layouts: HashMap<NodeId, Document>,
  operations: HashMap<String, PendingOperation>,
  failing: HashMap<NodeId, String>,
  hanging: HashSet<NodeId>,
  stalling: HashSet<NodeId>,
  contended: HashSet<NodeId>,
  polls_until_done: usize,
  calls: Vec<ApiCall>,
  counter: u64,
}

impl State {
  fn next_id(&mut self) -> u64 {
    self.counter += 1;
    self.counter
  }

  fn fingerprint(&mut self) -> String {
    format!("fp-{}", self.next_id())
  }

  fn start_operation(&mut self, id: &NodeId, operation_type: &str) -> Operation {
    let name = format!("operation-{}-{}", self.next_id(), operation_type);
    let outcome = match self.failing.get(id) {
      Some(message) => OperationStatus::Error(message.clone()),
      None => OperationStatus::Done,
    };
    let remaining_polls = if self.hanging.contains(id) {
      usize::MAX
    } else {
      self.polls_until_done
    };
    self.operations.insert(
      name.clone(),
      PendingOperation {
        remaining_polls,
        outcome,
        stalls: self.stalling.contains(id),
      },
    );
    Operation {
      name,
      operation_type: operation_type.to_string(),
      status: OperationStatus::Pending,
    }
  }

  fn stored_mut(&mut self, id: &NodeId) -> ApiResult<&mut Stored> {
    self.deployments.get_mut(id).ok_or_else(|| RemoteError::NotFound {
      resource: id.to_string(),
    })
  }
}

/// An in-process stand-in for the remote API.
#[derive(Debug, Default)]
pub struct MemoryDeploymentApi {
  state: Mutex<State>,
}

impl MemoryDeploymentApi {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, State> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Seed a deployment that already exists remotely.
  pub fn with_deployment(self, id: NodeId) -> Self {
    self.insert_existing(id);
    self
  }

  /// Seed an existing deployment whose manifest has the given layout.
  pub fn with_layout(self, id: NodeId, layout: Document) -> Self {
    self.insert_existing(id.clone());
    self.lock().layouts.insert(id, layout);
    self
  }

  /// Seed an existing deployment with a preview already staged.
  pub fn with_pending_preview(self, id: NodeId) -> Self {
    self.insert_existing(id.clone());
    if let Some(stored) = self.lock().deployments.get_mut(&id) {
      stored.record.pending_preview = true;
      stored.staged = Some(Target {
        config: "resources: []\n".to_string(),
        imports: Vec::new(),
      });
    }
    self
  }

  /// Operations against `id` finish with an error.
  pub fn failing_operations(self, id: NodeId, message: impl Into<String>) -> Self {
    self.lock().failing.insert(id, message.into());
    self
  }

  /// Operations against `id` never finish.
  pub fn hanging_operations(self, id: NodeId) -> Self {
    self.lock().hanging.insert(id);
    self
  }

  /// A poll of any operation against `id` blocks forever, like a request
  /// whose response never arrives.
  pub fn stalling_operations(self, id: NodeId) -> Self {
    self.lock().stalling.insert(id);
    self
  }

  /// Someone else writes to `id` right after every read, so the fingerprint
  /// a reader sees is already stale.
  pub fn contended(self, id: NodeId) -> Self {
    self.lock().contended.insert(id);
    self
  }

  /// Number of pending polls before an operation reports its outcome.
  pub fn polls_until_done(self, polls: usize) -> Self {
    self.lock().polls_until_done = polls;
    self
  }

  fn insert_existing(&self, id: NodeId) {
    let mut state = self.lock();
    let fingerprint = state.fingerprint();
    let manifest = format!("manifest-{}", state.next_id());
    state.deployments.insert(
      id.clone(),
      Stored {
        record: DeploymentRecord {
          name: id.deployment.clone(),
          project: id.project.clone(),
          fingerprint,
          manifest: Some(manifest),
          pending_preview: false,
        },
        applied: None,
        staged: None,
      },
    );
  }

  /// Every call made so far, in order.
  pub fn calls(&self) -> Vec<ApiCall> {
    self.lock().calls.clone()
  }

  /// Calls that targeted `id`.
  pub fn calls_for(&self, id: &NodeId) -> Vec<ApiCall> {
    self.calls().into_iter().filter(|call| call.node() == Some(id)).collect()
  }

  pub fn mutation_count(&self) -> usize {
    self.lock().calls.iter().filter(|call| call.is_mutation()).count()
  }

  pub fn deployment(&self, id: &NodeId) -> Option<DeploymentRecord> {
    self.lock().deployments.get(id).map(|stored| stored.record.clone())
  }

  /// The config text that was last applied (not merely previewed).
  pub fn applied_config(&self, id: &NodeId) -> Option<String> {
    self
      .lock()
      .deployments
      .get(id)
      .and_then(|stored| stored.applied.as_ref())
      .map(|target| target.config.clone())
  }

  /// The full target that was last applied.
  pub fn applied_target(&self, id: &NodeId) -> Option<Target> {
    self.lock().deployments.get(id).and_then(|stored| stored.applied.clone())
  }
}

/// A manifest layout listing the resources of an applied config.
fn layout_of(target: &Target) -> Document {
  let resources = Document::parse(&target.config)
    .ok()
    .and_then(|doc| doc.get("resources").and_then(Document::as_sequence).map(<[Document]>::to_vec))
    .unwrap_or_default()
    .into_iter()
    .map(|resource| resource.select(&["name", "type", "outputs"]))
    .collect();

  Document::Mapping(BTreeMap::from([("resources".to_string(), Document::Sequence(resources))]))
}

#[async_trait]
impl DeploymentApi for MemoryDeploymentApi {
  async fn get_deployment(&self, id: &NodeId) -> ApiResult<Option<DeploymentRecord>> {
    let mut state = self.lock();
    state.calls.push(ApiCall::GetDeployment(id.clone()));
    let record = state.deployments.get(id).map(|stored| stored.record.clone());
    if record.is_some() && state.contended.contains(id) {
      let fingerprint = state.fingerprint();
      if let Some(stored) = state.deployments.get_mut(id) {
        stored.record.fingerprint = fingerprint;
      }
    }
    Ok(record)
  }

  async fn get_manifest(&self, id: &NodeId) -> ApiResult<Document> {
    let mut state = self.lock();
    state.calls.push(ApiCall::GetManifest(id.clone()));
    let stored = state.deployments.get(id).ok_or_else(|| RemoteError::NotFound {
      resource: id.to_string(),
    })?;
    if stored.record.manifest.is_none() {
      return Err(RemoteError::NotFound {
        resource: format!("manifest of {id}"),
      });
    }
    if let Some(layout) = state.layouts.get(id) {
      return Ok(layout.clone());
    }
    Ok(stored.applied.as_ref().map(layout_of).unwrap_or(Document::Null))
  }

  async fn create_deployment(
    &self,
    project: &str,
    spec: &DeploymentSpec,
    options: &MutationOptions,
  ) -> ApiResult<Operation> {
    let id = NodeId::new(project, &spec.name);
    let mut state = self.lock();
    state.calls.push(ApiCall::Create {
      id: id.clone(),
      preview: options.preview,
    });

    if state.deployments.contains_key(&id) {
      return Err(RemoteError::Conflict {
        resource: id.to_string(),
        message: format!("deployment '{}' already exists", spec.name),
      });
    }

    let fingerprint = state.fingerprint();
    let (applied, staged, manifest) = if options.preview {
      (None, spec.target.clone(), None)
    } else {
      let manifest = format!("manifest-{}", state.next_id());
      (spec.target.clone(), None, Some(manifest))
    };
    let operation = state.start_operation(&id, "insert");
    state.deployments.insert(
      id.clone(),
      Stored {
        record: DeploymentRecord {
          name: spec.name.clone(),
          project: project.to_string(),
          fingerprint,
          manifest,
          pending_preview: options.preview,
        },
        applied,
        staged,
      },
    );
    Ok(operation)
  }

  async fn update_deployment(
    &self,
    id: &NodeId,
    spec: &DeploymentSpec,
    options: &MutationOptions,
  ) -> ApiResult<Operation> {
    let mut state = self.lock();
    state.calls.push(ApiCall::Update {
      id: id.clone(),
      preview: options.preview,
      has_target: spec.target.is_some(),
    });

    let fingerprint = state.fingerprint();
    let manifest = format!("manifest-{}", state.next_id());
    let stored = state.stored_mut(id)?;
    if let Some(expected) = &spec.fingerprint
      && expected != &stored.record.fingerprint
    {
      return Err(RemoteError::Conflict {
        resource: id.to_string(),
        message: "fingerprint does not match".to_string(),
      });
    }

    match (&spec.target, options.preview) {
      (None, _) => {
        if let Some(staged) = stored.staged.take() {
          stored.applied = Some(staged);
        }
        stored.record.pending_preview = false;
        stored.record.manifest = Some(manifest);
      }
      (Some(target), true) => {
        stored.staged = Some(target.clone());
        stored.record.pending_preview = true;
      }
      (Some(target), false) => {
        stored.applied = Some(target.clone());
        stored.staged = None;
        stored.record.pending_preview = false;
        stored.record.manifest = Some(manifest);
      }
    }
    stored.record.fingerprint = fingerprint;

    Ok(state.start_operation(id, "update"))
  }

  async fn delete_deployment(&self, id: &NodeId, policy: Option<DeletePolicy>) -> ApiResult<Operation> {
    let mut state = self.lock();
    state.calls.push(ApiCall::Delete { id: id.clone(), policy });
    if state.deployments.remove(id).is_none() {
      return Err(RemoteError::NotFound {
        resource: id.to_string(),
      });
    }
    state.layouts.remove(id);
    Ok(state.start_operation(id, "delete"))
  }

  async fn cancel_preview(&self, id: &NodeId, fingerprint: &str) -> ApiResult<Operation> {
    let mut state = self.lock();
    state.calls.push(ApiCall::CancelPreview(id.clone()));
    let new_fingerprint = state.fingerprint();
    let stored = state.stored_mut(id)?;
    if stored.record.fingerprint != fingerprint {
      return Err(RemoteError::Conflict {
        resource: id.to_string(),
        message: "fingerprint does not match".to_string(),
      });
    }
    stored.staged = None;
    stored.record.pending_preview = false;
    stored.record.fingerprint = new_fingerprint;
    Ok(state.start_operation(id, "cancelPreview"))
  }

  async fn poll_operation(&self, _project: &str, operation: &str) -> ApiResult<OperationStatus> {
    let status = {
      let mut state = self.lock();
      state.calls.push(ApiCall::Poll(operation.to_string()));
      let pending = state.operations.get_mut(operation).ok_or_else(|| RemoteError::NotFound {
        resource: operation.to_string(),
      })?;
      if pending.stalls {
        None
      } else if pending.remaining_polls > 0 {
        pending.remaining_polls -= 1;
        Some(OperationStatus::Pending)
      } else {
        Some(pending.outcome.clone())
      }
    };
    match status {
      Some(status) => Ok(status),
      None => std::future::pending().await,
    }
  }
}
