//! Dependency graph over configurations.
//!
//! Vertices are [`NodeId`]s, edges run from a dependency to its dependent.
//! Nodes referenced by a config but not supplied in the run are kept in the
//! graph as external nodes; [`levels`] checks they exist remotely.

mod levels;

pub use levels::{ExistenceResolver, Levels};

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use petgraph::Direction;
use petgraph::algo::{is_cyclic_directed, tarjan_scc};
use petgraph::graph::{DiGraph, NodeIndex};
use thiserror::Error;
use tracing::debug;

use crate::config::Config;
use crate::remote::RemoteError;
use crate::types::{NodeId, join_nodes};

/// Errors that can occur while building or levelling the graph.
#[derive(Debug, Error)]
pub enum GraphError {
  /// Adding an edge closed a cycle. `nodes` is the strongly connected
  /// component that contains it.
  #[error("cyclic dependency between: {}", join_nodes(.nodes))]
  CyclicDependency { nodes: Vec<NodeId> },

  /// An external dependency that does not exist remotely.
  #[error("unresolved dependency {node}: not among the given configs and no such deployment exists")]
  UnresolvedDependency { node: NodeId },

  /// Two configs resolve to the same project and deployment.
  #[error("duplicate config for {node}")]
  DuplicateConfig { node: NodeId },

  /// Checking whether an external dependency exists failed.
  #[error("failed to look up {node}: {source}")]
  Remote {
    node: NodeId,
    #[source]
    source: RemoteError,
  },
}

/// A directed acyclic graph of configurations.
#[derive(Debug)]
pub struct ConfigGraph {
  graph: DiGraph<NodeId, ()>,
  nodes: HashMap<NodeId, NodeIndex>,
  configs: BTreeMap<NodeId, Arc<Config>>,
}

impl ConfigGraph {
  /// Build the graph, failing on the first edge that closes a cycle.
  ///
  /// Configs are inserted in identity order so the reported cycle does not
  /// depend on argument order.
  pub fn new(configs: impl IntoIterator<Item = Config>) -> Result<Self, GraphError> {
    let mut by_id = BTreeMap::new();
    for config in configs {
      let id = config.id().clone();
      if by_id.insert(id.clone(), Arc::new(config)).is_some() {
        return Err(GraphError::DuplicateConfig { node: id });
      }
    }

    let mut graph = Self {
      graph: DiGraph::new(),
      nodes: HashMap::new(),
      configs: by_id,
    };

    let ids: Vec<NodeId> = graph.configs.keys().cloned().collect();
    for id in &ids {
      graph.node_index(id);
    }

    for id in &ids {
      let dependencies = graph.configs[id].dependencies().clone();
      let dependent = graph.node_index(id);
      for dependency in dependencies {
        let from = graph.node_index(&dependency);
        graph.graph.update_edge(from, dependent, ());
        if is_cyclic_directed(&graph.graph) {
          return Err(GraphError::CyclicDependency {
            nodes: graph.cycle_members(),
          });
        }
      }
    }

    debug!(
      nodes = graph.graph.node_count(),
      edges = graph.graph.edge_count(),
      "built dependency graph"
    );
    Ok(graph)
  }

  fn node_index(&mut self, id: &NodeId) -> NodeIndex {
    if let Some(&idx) = self.nodes.get(id) {
      return idx;
    }
    let idx = self.graph.add_node(id.clone());
    self.nodes.insert(id.clone(), idx);
    idx
  }

  /// Nodes taking part in some cycle, sorted.
  fn cycle_members(&self) -> Vec<NodeId> {
    let mut members: Vec<NodeId> = tarjan_scc(&self.graph)
      .into_iter()
      .filter(|scc| scc.len() > 1 || self.graph.contains_edge(scc[0], scc[0]))
      .flatten()
      .map(|idx| self.graph[idx].clone())
      .collect();
    members.sort();
    members
  }

  /// The supplied config for `id`, if it is not external.
  pub fn config(&self, id: &NodeId) -> Option<&Arc<Config>> {
    self.configs.get(id)
  }

  pub fn configs(&self) -> impl Iterator<Item = &Arc<Config>> {
    self.configs.values()
  }

  /// Every vertex, supplied or external, in identity order.
  pub fn node_ids(&self) -> BTreeSet<NodeId> {
    self.nodes.keys().cloned().collect()
  }

  /// Referenced nodes that were not supplied.
  pub fn external_nodes(&self) -> BTreeSet<NodeId> {
    self
      .nodes
      .keys()
      .filter(|id| !self.configs.contains_key(*id))
      .cloned()
      .collect()
  }

  pub fn is_external(&self, id: &NodeId) -> bool {
    self.nodes.contains_key(id) && !self.configs.contains_key(id)
  }

  /// Direct dependencies of `id`.
  pub fn dependencies(&self, id: &NodeId) -> BTreeSet<NodeId> {
    self.neighbors(id, Direction::Incoming)
  }

  /// Direct dependents of `id`.
  pub fn dependents(&self, id: &NodeId) -> BTreeSet<NodeId> {
    self.neighbors(id, Direction::Outgoing)
  }

  fn neighbors(&self, id: &NodeId, direction: Direction) -> BTreeSet<NodeId> {
    let Some(&idx) = self.nodes.get(id) else {
      return BTreeSet::new();
    };
    self
      .graph
      .neighbors_directed(idx, direction)
      .map(|n| self.graph[n].clone())
      .collect()
  }

  pub(crate) fn graph(&self) -> &DiGraph<NodeId, ()> {
    &self.graph
  }

  pub(crate) fn index_of(&self, id: &NodeId) -> Option<NodeIndex> {
    self.nodes.get(id).copied()
  }
}
