//! Reading outputs out of a deployment's manifest layout.
//!
//! A layout is a tree: `resources[]` entries each carry a `name`, a `type`,
//! optional `outputs[]` (`name` + `finalValue`) and, for composite resources
//! such as templates, their own nested `resources[]`.

use serde::Serialize;
use tracing::debug;

use crate::document::Document;
use crate::reference::OutputReference;

use super::{ApiResult, DeploymentApi, RemoteError};

/// Result of looking up an output. A missing output is a value, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputValue {
  Found(Document),
  NotFound,
}

fn entries<'a>(node: &'a Document, key: &str) -> &'a [Document] {
  node.get(key).and_then(Document::as_sequence).unwrap_or_default()
}

fn name_of(node: &Document) -> Option<&str> {
  node.get("name").and_then(Document::as_str)
}

/// Depth-first search of `layout` for output `name` of resource `resource`.
pub fn find_output(layout: &Document, resource: &str, name: &str) -> OutputValue {
  for candidate in entries(layout, "resources") {
    if name_of(candidate) == Some(resource) {
      let found = entries(candidate, "outputs")
        .iter()
        .find(|output| name_of(output) == Some(name))
        .and_then(|output| output.get("finalValue"));
      if let Some(value) = found {
        return OutputValue::Found(value.clone());
      }
    }

    if let OutputValue::Found(value) = find_output(candidate, resource, name) {
      return OutputValue::Found(value);
    }
  }
  OutputValue::NotFound
}

/// Fetch the live value a reference points at.
///
/// A deployment without a manifest resolves to [`OutputValue::NotFound`].
pub async fn resolve_output(api: &dyn DeploymentApi, reference: &OutputReference) -> ApiResult<OutputValue> {
  let layout = match api.get_manifest(&reference.node()).await {
    Ok(layout) => layout,
    Err(RemoteError::NotFound { .. }) => return Ok(OutputValue::NotFound),
    Err(e) => return Err(e),
  };
  let value = find_output(&layout, &reference.resource, &reference.name);
  debug!(reference = %reference, found = matches!(value, OutputValue::Found(_)), "resolved output");
  Ok(value)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceSummary {
  pub name: String,
  #[serde(rename = "type")]
  pub resource_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputSummary {
  pub name: String,
  pub value: Document,
}

/// Resources and deployment-level outputs of an applied deployment.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeploymentSummary {
  pub resources: Vec<ResourceSummary>,
  pub outputs: Vec<OutputSummary>,
}

impl DeploymentSummary {
  pub fn from_layout(layout: &Document) -> Self {
    let mut resources = Vec::new();
    collect_resources(layout, &mut resources);

    let outputs = entries(layout, "outputs")
      .iter()
      .filter_map(|output| {
        Some(OutputSummary {
          name: name_of(output)?.to_string(),
          value: output.get("finalValue").cloned().unwrap_or(Document::Null),
        })
      })
      .collect();

    Self { resources, outputs }
  }

  pub fn is_empty(&self) -> bool {
    self.resources.is_empty() && self.outputs.is_empty()
  }
}

fn collect_resources(node: &Document, into: &mut Vec<ResourceSummary>) {
  for resource in entries(node, "resources") {
    if let Some(name) = name_of(resource) {
      into.push(ResourceSummary {
        name: name.to_string(),
        resource_type: resource
          .get("type")
          .and_then(Document::as_str)
          .unwrap_or_default()
          .to_string(),
      });
    }
    collect_resources(resource, into);
  }
}
