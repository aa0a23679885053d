//! Splitting the graph into levels of mutually independent configs.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use petgraph::Direction;
use petgraph::graph::NodeIndex;
use tracing::{debug, info};

use crate::config::Config;
use crate::remote::{DeploymentApi, RemoteError};
use crate::types::NodeId;

use super::{ConfigGraph, GraphError};

/// Confirms that a referenced but unsupplied deployment exists remotely.
#[async_trait]
pub trait ExistenceResolver: Send + Sync {
  async fn deployment_exists(&self, id: &NodeId) -> Result<bool, RemoteError>;
}

#[async_trait]
impl<T: DeploymentApi + ?Sized> ExistenceResolver for T {
  async fn deployment_exists(&self, id: &NodeId) -> Result<bool, RemoteError> {
    Ok(self.get_deployment(id).await?.is_some())
  }
}

/// Ordered batches of configs.
///
/// Every config's in-run dependencies sit in earlier levels. Configs within a
/// level are independent of each other and sorted by identity.
#[derive(Debug, Clone, Default)]
pub struct Levels {
  levels: Vec<Vec<Arc<Config>>>,
  external: Vec<NodeId>,
}

impl Levels {
  /// Compute levels, verifying external dependencies first.
  ///
  /// Fails with [`GraphError::UnresolvedDependency`] before placing anything
  /// if an external node does not exist remotely.
  pub async fn compute<R>(graph: &ConfigGraph, resolver: &R) -> Result<Self, GraphError>
  where
    R: ExistenceResolver + ?Sized,
  {
    let external = graph.external_nodes();
    for node in &external {
      let exists = resolver
        .deployment_exists(node)
        .await
        .map_err(|source| GraphError::Remote {
          node: node.clone(),
          source,
        })?;
      if !exists {
        return Err(GraphError::UnresolvedDependency { node: node.clone() });
      }
      debug!(node = %node, "external dependency exists");
    }

    let levels = Self::place(graph, &external)?;
    info!(levels = levels.len(), external = external.len(), "computed deployment levels");

    Ok(Self {
      levels,
      external: external.into_iter().collect(),
    })
  }

  /// Kahn-style layering over the supplied nodes. External nodes count as
  /// already placed.
  fn place(graph: &ConfigGraph, external: &BTreeSet<NodeId>) -> Result<Vec<Vec<Arc<Config>>>, GraphError> {
    let dag = graph.graph();
    let placed_externally: HashSet<NodeIndex> = external.iter().filter_map(|id| graph.index_of(id)).collect();

    let mut in_degree: HashMap<NodeIndex, usize> = HashMap::new();
    let mut remaining: HashSet<NodeIndex> = HashSet::new();
    for idx in dag.node_indices() {
      if placed_externally.contains(&idx) {
        continue;
      }
      let degree = dag
        .neighbors_directed(idx, Direction::Incoming)
        .filter(|dep| !placed_externally.contains(dep))
        .count();
      in_degree.insert(idx, degree);
      remaining.insert(idx);
    }

    let mut levels = Vec::new();
    while !remaining.is_empty() {
      let mut ready: Vec<NodeIndex> = remaining.iter().filter(|idx| in_degree[*idx] == 0).copied().collect();

      if ready.is_empty() {
        let mut nodes: Vec<NodeId> = remaining.iter().map(|idx| dag[*idx].clone()).collect();
        nodes.sort();
        return Err(GraphError::CyclicDependency { nodes });
      }

      ready.sort_by(|a, b| dag[*a].cmp(&dag[*b]));

      let mut level = Vec::with_capacity(ready.len());
      for idx in &ready {
        remaining.remove(idx);
        for dependent in dag.neighbors_directed(*idx, Direction::Outgoing) {
          if let Some(degree) = in_degree.get_mut(&dependent) {
            *degree = degree.saturating_sub(1);
          }
        }
        if let Some(config) = graph.config(&dag[*idx]) {
          level.push(Arc::clone(config));
        }
      }

      if !level.is_empty() {
        levels.push(level);
      }
    }

    Ok(levels)
  }

  /// The same levels in reverse sequence, for deletion.
  pub fn reversed(&self) -> Self {
    Self {
      levels: self.levels.iter().rev().cloned().collect(),
      external: self.external.clone(),
    }
  }

  pub fn iter(&self) -> impl Iterator<Item = &[Arc<Config>]> {
    self.levels.iter().map(Vec::as_slice)
  }

  pub fn len(&self) -> usize {
    self.levels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.levels.is_empty()
  }

  /// Node identities per level.
  pub fn ids(&self) -> Vec<Vec<NodeId>> {
    self
      .levels
      .iter()
      .map(|level| level.iter().map(|config| config.id().clone()).collect())
      .collect()
  }

  /// External dependencies that were verified to exist.
  pub fn external(&self) -> &[NodeId] {
    &self.external
  }
}
