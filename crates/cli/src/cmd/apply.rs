//! Implementation of the `cft apply` command.

use anyhow::Result;

use cft_lib::execute::{Action, ActionOptions};

use super::run::run_action;
use crate::{CommonArgs, PreviewArgs};

/// Execute the apply command.
///
/// Each deployment is created when it does not exist yet and updated
/// otherwise. With `reverse` the stages are processed last to first.
pub fn cmd_apply(project: Option<String>, common: &CommonArgs, preview: &PreviewArgs, reverse: bool) -> Result<()> {
  let options = ActionOptions {
    preview: preview.preview,
    reverse,
    create_policy: preview.create_policy,
    delete_policy: None,
  };
  run_action(Action::Apply, project, common, options, preview.preview_decision)
}
