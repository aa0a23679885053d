//! Ordering of whole runs loaded from a config directory.

use std::sync::Arc;

use cft_lib::deployment::PreviewDecision;
use cft_lib::execute::{Action, ActionOptions, ExecuteError};
use cft_lib::graph::GraphError;
use cft_lib::remote::MemoryDeploymentApi;
use tempfile::TempDir;

use super::common::*;

fn network_dir() -> TempDir {
  let dir = TempDir::new().unwrap();
  write_configs(
    dir.path(),
    &[
      ("networks.yaml", NETWORKS),
      ("firewall.yaml", FIREWALL),
      ("instance.yml", INSTANCE),
      ("notes.txt", "not a config"),
    ],
  );
  dir
}

#[tokio::test]
async fn apply_creates_dependencies_first() {
  let dir = network_dir();
  let api = Arc::new(MemoryDeploymentApi::new());

  let result = execute(
    load_dir(&dir),
    &api,
    Action::Apply,
    ActionOptions::default(),
    PreviewDecision::Confirm,
  )
  .await
  .unwrap();

  assert_eq!(result.stages.len(), 3);
  assert_eq!(
    mutation_order(&api),
    vec![node("my-networks"), node("my-firewall"), node("my-instance")]
  );
}

#[tokio::test]
async fn delete_removes_dependents_first() {
  let dir = network_dir();
  let api = Arc::new(
    MemoryDeploymentApi::new()
      .with_deployment(node("my-networks"))
      .with_deployment(node("my-firewall"))
      .with_deployment(node("my-instance")),
  );

  execute(
    load_dir(&dir),
    &api,
    Action::Delete,
    ActionOptions::default(),
    PreviewDecision::Confirm,
  )
  .await
  .unwrap();

  assert_eq!(
    mutation_order(&api),
    vec![node("my-instance"), node("my-firewall"), node("my-networks")]
  );
  assert!(api.deployment(&node("my-networks")).is_none());
}

#[tokio::test]
async fn delete_of_absent_deployments_succeeds() {
  let dir = network_dir();
  let api = Arc::new(MemoryDeploymentApi::new().with_deployment(node("my-networks")));

  let result = execute(
    load_dir(&dir),
    &api,
    Action::Delete,
    ActionOptions::default(),
    PreviewDecision::Confirm,
  )
  .await
  .unwrap();

  assert_eq!(result.node_count(), 3);
  assert!(api.deployment(&node("my-networks")).is_none());
}

#[tokio::test]
async fn cycle_is_rejected_without_remote_calls() {
  let dir = TempDir::new().unwrap();
  write_configs(
    dir.path(),
    &[
      ("a.yaml", "name: a\nx: $(out.b.r.o)\n"),
      ("b.yaml", "name: b\nx: $(out.c.r.o)\n"),
      ("c.yaml", "name: c\nx: $(out.a.r.o)\n"),
    ],
  );
  let api = Arc::new(MemoryDeploymentApi::new());

  let err = execute(
    load_dir(&dir),
    &api,
    Action::Apply,
    ActionOptions::default(),
    PreviewDecision::Confirm,
  )
  .await
  .unwrap_err();

  match err {
    ExecuteError::Graph(GraphError::CyclicDependency { nodes }) => {
      assert_eq!(nodes, vec![node("a"), node("b"), node("c")]);
    }
    other => panic!("expected a cycle, got {other:?}"),
  }
  assert!(api.calls().is_empty());
}

#[tokio::test]
async fn missing_dependency_is_named_and_nothing_is_applied() {
  let dir = TempDir::new().unwrap();
  write_configs(dir.path(), &[("a.yaml", "name: a\nx: $(out.b.r.o)\n")]);
  let api = Arc::new(MemoryDeploymentApi::new());

  let err = execute(
    load_dir(&dir),
    &api,
    Action::Apply,
    ActionOptions::default(),
    PreviewDecision::Confirm,
  )
  .await
  .unwrap_err();

  assert!(matches!(
    err,
    ExecuteError::Graph(GraphError::UnresolvedDependency { ref node }) if *node == super::common::node("b")
  ));
  assert_eq!(api.mutation_count(), 0);
}

#[tokio::test]
async fn failed_stage_stops_later_stages() {
  let dir = network_dir();
  let api = Arc::new(MemoryDeploymentApi::new().failing_operations(node("my-networks"), "quota exceeded"));

  let err = execute(
    load_dir(&dir),
    &api,
    Action::Apply,
    ActionOptions::default(),
    PreviewDecision::Confirm,
  )
  .await
  .unwrap_err();

  assert!(err.to_string().contains("quota exceeded"));
  assert_eq!(mutation_order(&api), vec![node("my-networks")]);
}
