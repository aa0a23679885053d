//! Implementation of the `cft create` command.

use anyhow::Result;

use cft_lib::execute::{Action, ActionOptions};

use super::run::run_action;
use crate::{CommonArgs, PreviewArgs};

/// Execute the create command. Fails for deployments that already exist.
pub fn cmd_create(project: Option<String>, common: &CommonArgs, preview: &PreviewArgs) -> Result<()> {
  let options = ActionOptions {
    preview: preview.preview,
    create_policy: preview.create_policy,
    ..ActionOptions::default()
  };
  run_action(Action::Create, project, common, options, preview.preview_decision)
}
