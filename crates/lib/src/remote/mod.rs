//! The remote provisioning API.
//!
//! [`DeploymentApi`] is the seam between the orchestration core and the
//! service that owns deployments. [`HttpDeploymentApi`] talks to the
//! Deployment Manager REST API; [`MemoryDeploymentApi`] is an in-process fake
//! used by tests.
//!
//! Every call returns an [`ApiResult`]. Callers that want to recover from a
//! particular failure match on [`RemoteError::NotFound`] or
//! [`RemoteError::Conflict`] explicitly; everything else propagates.

mod http;
mod memory;
mod outputs;

pub use http::HttpDeploymentApi;
pub use memory::{ApiCall, MemoryDeploymentApi};
pub use outputs::{DeploymentSummary, OutputSummary, OutputValue, ResourceSummary, find_output, resolve_output};

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::Document;
use crate::types::NodeId;

pub type ApiResult<T> = Result<T, RemoteError>;

/// Errors returned by the remote API.
#[derive(Debug, Error)]
pub enum RemoteError {
  /// HTTP 404.
  #[error("{resource} not found")]
  NotFound { resource: String },

  /// HTTP 409: the deployment already exists or the fingerprint is stale.
  #[error("conflict on {resource}: {message}")]
  Conflict { resource: String, message: String },

  /// Any other non-success status, with the API's error message.
  #[error("request for {resource} failed with HTTP {status}: {message}")]
  Http {
    status: u16,
    resource: String,
    message: String,
  },

  /// The request never got a response.
  #[error("transport error: {0}")]
  Transport(#[from] reqwest::Error),

  /// The response body could not be decoded.
  #[error("invalid response for {resource}: {message}")]
  InvalidResponse { resource: String, message: String },

  /// No token was configured for a request that needs one.
  #[error("no access token; set CFT_ACCESS_TOKEN or GOOGLE_OAUTH_ACCESS_TOKEN")]
  MissingCredentials,
}

impl RemoteError {
  pub fn is_not_found(&self) -> bool {
    matches!(self, RemoteError::NotFound { .. })
  }

  pub fn is_conflict(&self) -> bool {
    matches!(self, RemoteError::Conflict { .. })
  }
}

/// A deployment as the remote side reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRecord {
  pub name: String,
  pub project: String,
  /// Optimistic concurrency token. Required on every mutation.
  pub fingerprint: String,
  /// Name of the manifest describing the applied state, if any.
  pub manifest: Option<String>,
  /// Set while a preview is staged and waiting for confirm or cancel.
  pub pending_preview: bool,
}

/// A file sent next to the main config, e.g. a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportFile {
  pub name: String,
  pub content: String,
}

/// The desired state of a deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
  /// YAML text of the config.
  pub config: String,
  pub imports: Vec<ImportFile>,
}

/// Body of a create or update call.
///
/// An update without a target promotes the staged preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentSpec {
  pub name: String,
  pub target: Option<Target>,
  pub fingerprint: Option<String>,
}

/// What to do with the underlying resources when a deployment is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletePolicy {
  /// Remove the deployment but leave its resources in place.
  Abandon,
  Delete,
}

impl DeletePolicy {
  pub fn as_api_str(&self) -> &'static str {
    match self {
      DeletePolicy::Abandon => "ABANDON",
      DeletePolicy::Delete => "DELETE",
    }
  }
}

impl FromStr for DeletePolicy {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "abandon" => Ok(DeletePolicy::Abandon),
      "delete" => Ok(DeletePolicy::Delete),
      other => Err(format!("unknown delete policy '{other}' (expected abandon or delete)")),
    }
  }
}

/// How resources named in a config are matched against existing ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatePolicy {
  /// Only adopt resources that already exist.
  Acquire,
  CreateOrAcquire,
}

impl CreatePolicy {
  pub fn as_api_str(&self) -> &'static str {
    match self {
      CreatePolicy::Acquire => "ACQUIRE",
      CreatePolicy::CreateOrAcquire => "CREATE_OR_ACQUIRE",
    }
  }
}

impl FromStr for CreatePolicy {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().replace('_', "-").as_str() {
      "acquire" => Ok(CreatePolicy::Acquire),
      "create-or-acquire" => Ok(CreatePolicy::CreateOrAcquire),
      other => Err(format!(
        "unknown create policy '{other}' (expected acquire or create-or-acquire)"
      )),
    }
  }
}

/// Flags carried by create and update calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutationOptions {
  pub preview: bool,
  pub create_policy: Option<CreatePolicy>,
}

/// A long-running remote operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
  pub name: String,
  pub operation_type: String,
  pub status: OperationStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
  Pending,
  Done,
  /// Finished unsuccessfully; carries the remote error messages.
  Error(String),
}

impl fmt::Display for OperationStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      OperationStatus::Pending => f.write_str("PENDING"),
      OperationStatus::Done => f.write_str("DONE"),
      OperationStatus::Error(message) => write!(f, "ERROR: {message}"),
    }
  }
}

/// Operations the orchestration core needs from the remote side.
#[async_trait]
pub trait DeploymentApi: Send + Sync {
  /// Fetch a deployment. A missing deployment is `Ok(None)`.
  async fn get_deployment(&self, id: &NodeId) -> ApiResult<Option<DeploymentRecord>>;

  /// Fetch the expanded layout of the deployment's current manifest.
  async fn get_manifest(&self, id: &NodeId) -> ApiResult<Document>;

  async fn create_deployment(
    &self,
    project: &str,
    spec: &DeploymentSpec,
    options: &MutationOptions,
  ) -> ApiResult<Operation>;

  async fn update_deployment(
    &self,
    id: &NodeId,
    spec: &DeploymentSpec,
    options: &MutationOptions,
  ) -> ApiResult<Operation>;

  async fn delete_deployment(&self, id: &NodeId, policy: Option<DeletePolicy>) -> ApiResult<Operation>;

  /// Discard a staged preview.
  async fn cancel_preview(&self, id: &NodeId, fingerprint: &str) -> ApiResult<Operation>;

  async fn poll_operation(&self, project: &str, operation: &str) -> ApiResult<OperationStatus>;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn delete_policy_parses_case_insensitively() {
    assert_eq!("ABANDON".parse::<DeletePolicy>(), Ok(DeletePolicy::Abandon));
    assert_eq!("delete".parse::<DeletePolicy>(), Ok(DeletePolicy::Delete));
    assert!("keep".parse::<DeletePolicy>().is_err());
  }

  #[test]
  fn create_policy_accepts_api_spelling() {
    assert_eq!("CREATE_OR_ACQUIRE".parse::<CreatePolicy>(), Ok(CreatePolicy::CreateOrAcquire));
    assert_eq!("acquire".parse::<CreatePolicy>(), Ok(CreatePolicy::Acquire));
    assert_eq!(CreatePolicy::CreateOrAcquire.as_api_str(), "CREATE_OR_ACQUIRE");
  }

  #[test]
  fn error_helpers() {
    let not_found = RemoteError::NotFound { resource: "p/d".into() };
    assert!(not_found.is_not_found());
    assert!(!not_found.is_conflict());
    let conflict = RemoteError::Conflict {
      resource: "p/d".into(),
      message: "exists".into(),
    };
    assert!(conflict.is_conflict());
  }
}
