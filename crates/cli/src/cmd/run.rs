//! Shared driver for every deployment subcommand.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::info;

use cft_lib::config::{LoadOptions, collect_sources, load_configs};
use cft_lib::deployment::{DecisionProvider, DeployContext, FixedDecision, PreviewDecision, WaitConfig};
use cft_lib::execute::{Action, ActionOptions, ExecuteConfig, ordered, plan, render_stages, run, stage_footer};
use cft_lib::remote::{DeploymentApi, HttpDeploymentApi};
use cft_lib::render::JinjaRenderer;

use crate::CommonArgs;
use crate::output::{TerminalReporter, format_duration, print_info, print_stat, print_success};
use crate::prompts::TerminalDecision;

/// Load the configs named on the command line, order them, and run `action`.
///
/// With `--show-stages` the computed stages are printed and nothing is
/// changed remotely.
pub fn run_action(
  action: Action,
  project: Option<String>,
  common: &CommonArgs,
  options: ActionOptions,
  decision: Option<PreviewDecision>,
) -> Result<()> {
  let start = Instant::now();

  let sources = collect_sources(&common.config).context("Failed to collect configs")?;
  let load_options = LoadOptions::from_env(project);
  let configs = load_configs(sources, &JinjaRenderer, &load_options).context("Failed to load configs")?;
  info!(configs = configs.len(), "configs loaded");

  let api: Arc<dyn DeploymentApi> = Arc::new(HttpDeploymentApi::from_env());

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let levels = rt
    .block_on(plan(configs, api.as_ref()))
    .context("Failed to compute stages")?;

  if common.show_stages {
    let listing = render_stages(&ordered(&levels, action, &options), common.format.into())
      .context("Failed to render stages")?;
    print!("{listing}");
    return Ok(());
  }

  let decisions: Arc<dyn DecisionProvider> = match decision {
    Some(decision) => Arc::new(FixedDecision(decision)),
    None => Arc::new(TerminalDecision),
  };
  let wait = WaitConfig {
    poll_interval: common.poll_interval,
    timeout: common.timeout,
  };
  let ctx = Arc::new(DeployContext::new(api, decisions).with_wait(wait));
  let config = ExecuteConfig {
    parallelism: common.parallelism,
  };

  let result = rt
    .block_on(run(&levels, action, &options, ctx, &config, &TerminalReporter))
    .with_context(|| format!("{} failed", action))?;

  println!("{}", stage_footer());
  print_success(&format!("{} complete", action));
  print_stat("stages", &result.stages.len().to_string());
  print_stat("deployments", &result.node_count().to_string());
  if !levels.external().is_empty() {
    print_info(&format!("{} external dependencies were not modified", levels.external().len()));
  }
  print_stat("time", &format_duration(start.elapsed()));

  Ok(())
}
