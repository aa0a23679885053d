//! Implementation of the `cft delete` command.

use anyhow::Result;

use cft_lib::execute::{Action, ActionOptions};
use cft_lib::remote::DeletePolicy;

use super::run::run_action;
use crate::CommonArgs;

/// Execute the delete command.
///
/// Stages run last to first so dependents go before what they consume.
/// Deployments that are already gone are skipped with a warning.
pub fn cmd_delete(project: Option<String>, common: &CommonArgs, delete_policy: Option<DeletePolicy>) -> Result<()> {
  let options = ActionOptions {
    delete_policy,
    ..ActionOptions::default()
  };
  run_action(Action::Delete, project, common, options, None)
}
