//! Implementation of the `cft update` command.

use anyhow::Result;

use cft_lib::execute::{Action, ActionOptions};

use super::run::run_action;
use crate::{CommonArgs, PreviewArgs};

/// Execute the update command.
///
/// A preview left behind by an earlier run is either confirmed or, with
/// `--preview`, offered for a decision first.
pub fn cmd_update(project: Option<String>, common: &CommonArgs, preview: &PreviewArgs) -> Result<()> {
  let options = ActionOptions {
    preview: preview.preview,
    create_policy: preview.create_policy,
    ..ActionOptions::default()
  };
  run_action(Action::Update, project, common, options, preview.preview_decision)
}
