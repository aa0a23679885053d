use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a deployable unit: the `(project, deployment)` pair.
///
/// Ordering is lexical on project, then deployment. Anything that needs a
/// deterministic tie-break between independent nodes relies on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
  pub project: String,
  pub deployment: String,
}

impl NodeId {
  pub fn new(project: impl Into<String>, deployment: impl Into<String>) -> Self {
    Self {
      project: project.into(),
      deployment: deployment.into(),
    }
  }
}

impl fmt::Display for NodeId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.project, self.deployment)
  }
}

/// Joins node identities for error messages.
pub(crate) fn join_nodes(nodes: &[NodeId]) -> String {
  nodes.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}
