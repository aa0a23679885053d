//! Shared helpers: write configs to disk, load them the way the CLI does, and
//! run them against the in-memory API.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use cft_lib::config::{Config, LoadOptions, collect_sources, load_configs};
use cft_lib::deployment::{DeployContext, FixedDecision, PreviewDecision, WaitConfig};
use cft_lib::execute::{Action, ActionOptions, ExecuteConfig, ExecuteError, NoopReporter, RunResult, plan, run};
use cft_lib::remote::{ApiCall, MemoryDeploymentApi};
use cft_lib::render::JinjaRenderer;
use cft_lib::types::NodeId;
use tempfile::TempDir;

pub const PROJECT: &str = "scenario-project";

pub const NETWORKS: &str = r#"
name: my-networks
resources:
  - name: net
    type: compute.v1.network
    outputs:
      - name: selfLink
        finalValue: https://compute/projects/scenario-project/global/networks/net
"#;

pub const FIREWALL: &str = r#"
name: my-firewall
resources:
  - name: allow-ssh
    type: compute.v1.firewall
    properties:
      network: $(out.my-networks.net.selfLink)
    outputs:
      - name: name
        finalValue: allow-ssh
"#;

pub const INSTANCE: &str = r#"
name: my-instance
resources:
  - name: vm
    type: compute.v1.instance
    properties:
      network: !DMOutput dm://my-networks/net/selfLink
      tags:
        - $(out.my-firewall.allow-ssh.name)
"#;

pub fn node(deployment: &str) -> NodeId {
  NodeId::new(PROJECT, deployment)
}

pub fn write_configs(dir: &Path, files: &[(&str, &str)]) {
  for (name, content) in files {
    std::fs::write(dir.join(name), content).unwrap();
  }
}

pub fn load_dir(dir: &TempDir) -> Vec<Config> {
  let sources = collect_sources(&[dir.path().to_string_lossy().to_string()]).unwrap();
  let options = LoadOptions {
    project: Some(PROJECT.to_string()),
    env: Default::default(),
  };
  load_configs(sources, &JinjaRenderer, &options).unwrap()
}

pub fn context(api: &Arc<MemoryDeploymentApi>, decision: PreviewDecision) -> Arc<DeployContext> {
  Arc::new(
    DeployContext::new(api.clone(), Arc::new(FixedDecision(decision))).with_wait(WaitConfig {
      poll_interval: Duration::from_millis(1),
      timeout: Duration::from_secs(5),
    }),
  )
}

/// Plan and run `action` over `configs`.
pub async fn execute(
  configs: Vec<Config>,
  api: &Arc<MemoryDeploymentApi>,
  action: Action,
  options: ActionOptions,
  decision: PreviewDecision,
) -> Result<RunResult, ExecuteError> {
  let levels = plan(configs, api.as_ref()).await?;
  run(
    &levels,
    action,
    &options,
    context(api, decision),
    &ExecuteConfig::default(),
    &NoopReporter,
  )
  .await
}

/// Deployments in the order they were first mutated.
pub fn mutation_order(api: &MemoryDeploymentApi) -> Vec<NodeId> {
  let mut order = Vec::new();
  for call in api.calls().into_iter().filter(ApiCall::is_mutation) {
    if let Some(node) = call.node()
      && !order.contains(node)
    {
      order.push(node.clone());
    }
  }
  order
}
