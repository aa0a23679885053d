//! Deployment Manager v2 over HTTPS.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::consts::{ACCESS_TOKEN_ENVS, API_ENDPOINT_ENV, DEFAULT_API_ENDPOINT};
use crate::document::Document;
use crate::types::NodeId;

use super::{
  ApiResult, DeletePolicy, DeploymentApi, DeploymentRecord, DeploymentSpec, ImportFile, MutationOptions, Operation,
  OperationStatus, RemoteError,
};

/// REST client for the Deployment Manager API.
///
/// The access token is only required once a request is actually made, so
/// commands that never reach the API, like listing stages of configs without
/// external dependencies, work without credentials.
#[derive(Debug, Clone)]
pub struct HttpDeploymentApi {
  client: Client,
  endpoint: String,
  token: Option<String>,
}

impl HttpDeploymentApi {
  pub fn new(endpoint: impl Into<String>, token: Option<String>) -> Self {
    Self {
      client: Client::new(),
      endpoint: endpoint.into().trim_end_matches('/').to_string(),
      token,
    }
  }

  /// Build a client from `CFT_API_ENDPOINT` and the access token variables.
  pub fn from_env() -> Self {
    let endpoint = std::env::var(API_ENDPOINT_ENV).unwrap_or_else(|_| DEFAULT_API_ENDPOINT.to_string());
    let token = ACCESS_TOKEN_ENVS
      .iter()
      .filter_map(|key| std::env::var(key).ok())
      .find(|value| !value.is_empty());
    Self::new(endpoint, token)
  }

  pub fn endpoint(&self) -> &str {
    &self.endpoint
  }

  fn deployments_url(&self, project: &str) -> String {
    format!("{}/projects/{}/global/deployments", self.endpoint, project)
  }

  fn deployment_url(&self, id: &NodeId) -> String {
    format!("{}/{}", self.deployments_url(&id.project), id.deployment)
  }

  fn request(&self, method: Method, url: &str) -> ApiResult<RequestBuilder> {
    let token = self.token.as_deref().ok_or(RemoteError::MissingCredentials)?;
    trace!(%method, url, "remote request");
    Ok(self.client.request(method, url).bearer_auth(token))
  }

  async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder, resource: &str) -> ApiResult<T> {
    let response = builder.send().await?;
    let response = check_status(response, resource).await?;
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| RemoteError::InvalidResponse {
      resource: resource.to_string(),
      message: e.to_string(),
    })
  }
}

async fn check_status(response: Response, resource: &str) -> ApiResult<Response> {
  let status = response.status();
  if status.is_success() {
    return Ok(response);
  }

  let body = response.text().await.unwrap_or_default();
  let message = serde_json::from_str::<ErrorBody>(&body)
    .map(|e| e.error.message)
    .unwrap_or(body);
  let resource = resource.to_string();

  Err(match status {
    StatusCode::NOT_FOUND => RemoteError::NotFound { resource },
    StatusCode::CONFLICT => RemoteError::Conflict { resource, message },
    _ => RemoteError::Http {
      status: status.as_u16(),
      resource,
      message,
    },
  })
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
  error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
  #[serde(default)]
  message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeploymentResource {
  name: String,
  #[serde(default)]
  fingerprint: String,
  #[serde(default)]
  manifest: Option<String>,
  /// Present while a preview is staged.
  #[serde(default)]
  update: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationResource {
  name: String,
  #[serde(default)]
  operation_type: String,
  #[serde(default)]
  status: String,
  #[serde(default)]
  error: Option<OperationErrors>,
}

#[derive(Debug, Deserialize)]
struct OperationErrors {
  #[serde(default)]
  errors: Vec<OperationErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct OperationErrorEntry {
  #[serde(default)]
  code: String,
  #[serde(default)]
  message: String,
}

impl OperationResource {
  fn status(&self) -> OperationStatus {
    match (self.status.as_str(), &self.error) {
      ("DONE", Some(errors)) if !errors.errors.is_empty() => OperationStatus::Error(
        errors
          .errors
          .iter()
          .map(|e| format!("{}: {}", e.code, e.message))
          .collect::<Vec<_>>()
          .join("; "),
      ),
      ("DONE", _) => OperationStatus::Done,
      _ => OperationStatus::Pending,
    }
  }

  fn into_operation(self) -> Operation {
    let status = self.status();
    Operation {
      name: self.name,
      operation_type: self.operation_type,
      status,
    }
  }
}

#[derive(Debug, Deserialize)]
struct ManifestResource {
  #[serde(default)]
  layout: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeploymentBody<'a> {
  name: &'a str,
  #[serde(skip_serializing_if = "Option::is_none")]
  fingerprint: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  target: Option<TargetBody<'a>>,
}

#[derive(Debug, Serialize)]
struct TargetBody<'a> {
  config: ConfigBody<'a>,
  imports: &'a [ImportFile],
}

#[derive(Debug, Serialize)]
struct ConfigBody<'a> {
  content: &'a str,
}

#[derive(Debug, Serialize)]
struct CancelPreviewBody<'a> {
  fingerprint: &'a str,
}

impl<'a> From<&'a DeploymentSpec> for DeploymentBody<'a> {
  fn from(spec: &'a DeploymentSpec) -> Self {
    Self {
      name: &spec.name,
      fingerprint: spec.fingerprint.as_deref(),
      target: spec.target.as_ref().map(|target| TargetBody {
        config: ConfigBody {
          content: &target.config,
        },
        imports: &target.imports,
      }),
    }
  }
}

fn mutation_query(options: &MutationOptions) -> Vec<(&'static str, String)> {
  let mut query = vec![("preview", options.preview.to_string())];
  if let Some(policy) = options.create_policy {
    query.push(("createPolicy", policy.as_api_str().to_string()));
  }
  query
}

/// Manifest fields hold a full URL; the API addresses manifests by name.
fn last_segment(url: &str) -> &str {
  url.rsplit('/').next().unwrap_or(url)
}

#[async_trait]
impl DeploymentApi for HttpDeploymentApi {
  async fn get_deployment(&self, id: &NodeId) -> ApiResult<Option<DeploymentRecord>> {
    let resource = id.to_string();
    let builder = self.request(Method::GET, &self.deployment_url(id))?;
    let deployment: DeploymentResource = match self.send(builder, &resource).await {
      Ok(deployment) => deployment,
      Err(RemoteError::NotFound { .. }) => return Ok(None),
      Err(e) => return Err(e),
    };

    Ok(Some(DeploymentRecord {
      name: deployment.name,
      project: id.project.clone(),
      fingerprint: deployment.fingerprint,
      manifest: deployment.manifest.as_deref().map(last_segment).map(str::to_string),
      pending_preview: deployment.update.is_some(),
    }))
  }

  async fn get_manifest(&self, id: &NodeId) -> ApiResult<Document> {
    let record = self.get_deployment(id).await?.ok_or_else(|| RemoteError::NotFound {
      resource: id.to_string(),
    })?;
    let manifest = record.manifest.ok_or_else(|| RemoteError::NotFound {
      resource: format!("manifest of {id}"),
    })?;

    let resource = format!("{id}/manifests/{manifest}");
    let url = format!("{}/manifests/{}", self.deployment_url(id), manifest);
    let builder = self.request(Method::GET, &url)?;
    let body: ManifestResource = self.send(builder, &resource).await?;

    let layout = body.layout.unwrap_or_default();
    Document::parse(&layout).map_err(|e| RemoteError::InvalidResponse {
      resource,
      message: e.to_string(),
    })
  }

  async fn create_deployment(
    &self,
    project: &str,
    spec: &DeploymentSpec,
    options: &MutationOptions,
  ) -> ApiResult<Operation> {
    let resource = format!("{project}/{}", spec.name);
    debug!(deployment = %resource, preview = options.preview, "creating deployment");
    let builder = self
      .request(Method::POST, &self.deployments_url(project))?
      .query(&mutation_query(options))
      .json(&DeploymentBody::from(spec));
    let op: OperationResource = self.send(builder, &resource).await?;
    Ok(op.into_operation())
  }

  async fn update_deployment(
    &self,
    id: &NodeId,
    spec: &DeploymentSpec,
    options: &MutationOptions,
  ) -> ApiResult<Operation> {
    debug!(deployment = %id, preview = options.preview, "updating deployment");
    let builder = self
      .request(Method::PUT, &self.deployment_url(id))?
      .query(&mutation_query(options))
      .json(&DeploymentBody::from(spec));
    let op: OperationResource = self.send(builder, &id.to_string()).await?;
    Ok(op.into_operation())
  }

  async fn delete_deployment(&self, id: &NodeId, policy: Option<DeletePolicy>) -> ApiResult<Operation> {
    debug!(deployment = %id, policy = ?policy, "deleting deployment");
    let mut builder = self.request(Method::DELETE, &self.deployment_url(id))?;
    if let Some(policy) = policy {
      builder = builder.query(&[("deletePolicy", policy.as_api_str())]);
    }
    let op: OperationResource = self.send(builder, &id.to_string()).await?;
    Ok(op.into_operation())
  }

  async fn cancel_preview(&self, id: &NodeId, fingerprint: &str) -> ApiResult<Operation> {
    debug!(deployment = %id, "cancelling preview");
    let url = format!("{}/cancelPreview", self.deployment_url(id));
    let builder = self
      .request(Method::POST, &url)?
      .json(&CancelPreviewBody { fingerprint });
    let op: OperationResource = self.send(builder, &id.to_string()).await?;
    Ok(op.into_operation())
  }

  async fn poll_operation(&self, project: &str, operation: &str) -> ApiResult<OperationStatus> {
    let url = format!("{}/projects/{}/global/operations/{}", self.endpoint, project, operation);
    let builder = self.request(Method::GET, &url)?;
    let op: OperationResource = self.send(builder, &format!("{project}/operations/{operation}")).await?;
    Ok(op.status())
  }
}
