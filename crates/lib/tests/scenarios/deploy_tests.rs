//! Output resolution, previews and imports across a full run.

use std::sync::Arc;

use cft_lib::deployment::{DeploymentError, DeploymentState, PreviewDecision};
use cft_lib::document::Document;
use cft_lib::execute::{Action, ActionOptions, ExecuteError};
use cft_lib::remote::{ApiCall, MemoryDeploymentApi, RemoteError};
use tempfile::TempDir;

use super::common::*;

#[tokio::test]
async fn outputs_are_substituted_before_deploying() {
  let dir = TempDir::new().unwrap();
  write_configs(
    dir.path(),
    &[
      ("networks.yaml", NETWORKS),
      ("firewall.yaml", FIREWALL),
      ("instance.yaml", INSTANCE),
    ],
  );
  let api = Arc::new(MemoryDeploymentApi::new());

  execute(
    load_dir(&dir),
    &api,
    Action::Create,
    ActionOptions::default(),
    PreviewDecision::Confirm,
  )
  .await
  .unwrap();

  let instance = Document::parse(&api.applied_config(&node("my-instance")).unwrap()).unwrap();
  let props = instance.get("resources").and_then(Document::as_sequence).unwrap()[0]
    .get("properties")
    .unwrap()
    .clone();
  assert_eq!(
    props.get("network").and_then(Document::as_str),
    Some("https://compute/projects/scenario-project/global/networks/net")
  );
  assert_eq!(
    props.get("tags").and_then(Document::as_sequence),
    Some(&[Document::from("allow-ssh")][..])
  );
}

#[tokio::test]
async fn external_dependency_outputs_are_resolved() {
  let layout = Document::parse(
    r#"
resources:
  - name: vpc
    type: compute.v1.network
    outputs:
      - name: selfLink
        finalValue: https://compute/shared/vpc
"#,
  )
  .unwrap();
  let api = Arc::new(MemoryDeploymentApi::new().with_layout(node("shared-net"), layout));
  let dir = TempDir::new().unwrap();
  write_configs(
    dir.path(),
    &[("app.yaml", "name: app\nresources:\n  - name: vm\n    type: t\n    properties:\n      network: \"$(out.shared-net.vpc.selfLink)/sub\"\n")],
  );

  execute(
    load_dir(&dir),
    &api,
    Action::Apply,
    ActionOptions::default(),
    PreviewDecision::Confirm,
  )
  .await
  .unwrap();

  let applied = api.applied_config(&node("app")).unwrap();
  assert!(applied.contains("https://compute/shared/vpc/sub"));
  assert!(api.applied_config(&node("shared-net")).is_none());
}

#[tokio::test]
async fn apply_updates_existing_deployment_once() {
  let api = Arc::new(MemoryDeploymentApi::new().with_deployment(node("my-networks")));
  let dir = TempDir::new().unwrap();
  write_configs(dir.path(), &[("networks.yaml", NETWORKS)]);

  execute(
    load_dir(&dir),
    &api,
    Action::Apply,
    ActionOptions::default(),
    PreviewDecision::Confirm,
  )
  .await
  .unwrap();

  let calls = api.calls_for(&node("my-networks"));
  let creates = calls.iter().filter(|c| matches!(c, ApiCall::Create { .. })).count();
  let updates = calls.iter().filter(|c| matches!(c, ApiCall::Update { .. })).count();
  assert_eq!((creates, updates), (1, 1));
  assert!(api.applied_config(&node("my-networks")).is_some());
}

#[tokio::test]
async fn concurrent_write_fails_the_run_without_retry() {
  let api = Arc::new(
    MemoryDeploymentApi::new()
      .with_deployment(node("my-networks"))
      .contended(node("my-networks")),
  );
  let dir = TempDir::new().unwrap();
  write_configs(dir.path(), &[("networks.yaml", NETWORKS), ("firewall.yaml", FIREWALL)]);

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
    ExecuteError::Deployment {
      source: DeploymentError::Remote {
        source: RemoteError::Conflict { .. },
        ..
      },
      ..
    }
  ));
  let calls = api.calls_for(&node("my-networks"));
  let creates = calls.iter().filter(|c| matches!(c, ApiCall::Create { .. })).count();
  let updates = calls.iter().filter(|c| matches!(c, ApiCall::Update { .. })).count();
  assert_eq!((creates, updates), (1, 1));
  assert!(api.calls_for(&node("my-firewall")).is_empty());
}

#[tokio::test]
async fn confirmed_preview_is_promoted_without_target() {
  let api = Arc::new(MemoryDeploymentApi::new().with_deployment(node("my-networks")));
  let dir = TempDir::new().unwrap();
  write_configs(dir.path(), &[("networks.yaml", NETWORKS)]);
  let options = ActionOptions {
    preview: true,
    ..ActionOptions::default()
  };

  let result = execute(load_dir(&dir), &api, Action::Update, options, PreviewDecision::Confirm)
    .await
    .unwrap();

  let updates: Vec<ApiCall> = api
    .calls_for(&node("my-networks"))
    .into_iter()
    .filter(|c| matches!(c, ApiCall::Update { .. }))
    .collect();
  assert_eq!(
    updates,
    vec![
      ApiCall::Update {
        id: node("my-networks"),
        preview: true,
        has_target: true,
      },
      ApiCall::Update {
        id: node("my-networks"),
        preview: false,
        has_target: false,
      },
    ]
  );
  assert!(!api.deployment(&node("my-networks")).unwrap().pending_preview);
  assert_eq!(result.stages[0].nodes[0].state, DeploymentState::Applied);
}

#[tokio::test]
async fn aborted_preview_stops_the_run() {
  let api = Arc::new(MemoryDeploymentApi::new().with_deployment(node("my-networks")));
  let dir = TempDir::new().unwrap();
  write_configs(dir.path(), &[("networks.yaml", NETWORKS), ("firewall.yaml", FIREWALL)]);
  let options = ActionOptions {
    preview: true,
    ..ActionOptions::default()
  };

  let err = execute(load_dir(&dir), &api, Action::Apply, options, PreviewDecision::Abort)
    .await
    .unwrap_err();

  assert!(err.is_abort());
  assert!(api.calls_for(&node("my-firewall")).is_empty());
}

#[tokio::test]
async fn imports_are_sent_with_the_target() {
  let dir = TempDir::new().unwrap();
  std::fs::create_dir(dir.path().join("templates")).unwrap();
  std::fs::write(dir.path().join("templates/net.py"), "def generate_config(ctx):\n  return {}\n").unwrap();
  write_configs(
    dir.path(),
    &[(
      "templated.yaml",
      "name: templated\nimports:\n  - path: templates/net.py\nresources:\n  - name: net\n    type: templates/net.py\n",
    )],
  );
  let api = Arc::new(MemoryDeploymentApi::new());

  execute(
    load_dir(&dir),
    &api,
    Action::Create,
    ActionOptions::default(),
    PreviewDecision::Confirm,
  )
  .await
  .unwrap();

  let target = api.applied_target(&node("templated")).unwrap();
  assert_eq!(target.imports.len(), 1);
  assert_eq!(target.imports[0].name, "templates/net.py");
  assert!(target.imports[0].content.contains("generate_config"));
}

#[tokio::test]
async fn missing_output_fails_the_deployment() {
  let api = Arc::new(MemoryDeploymentApi::new().with_deployment(node("my-networks")));
  let dir = TempDir::new().unwrap();
  write_configs(dir.path(), &[("firewall.yaml", FIREWALL)]);

  let err = execute(
    load_dir(&dir),
    &api,
    Action::Create,
    ActionOptions::default(),
    PreviewDecision::Confirm,
  )
  .await
  .unwrap_err();

  assert!(matches!(err, ExecuteError::Deployment { .. }));
  assert!(err.to_string().contains("not found"));
  assert_eq!(api.mutation_count(), 0);
}
