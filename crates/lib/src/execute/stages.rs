//! Rendering computed levels without executing them.

use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use crate::graph::Levels;

const STAGE_FOOTER: &str = "------------------------------";

/// One config as shown in a stage listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageEntry {
  pub project: String,
  pub deployment: String,
  /// The config path, or the inline text.
  pub source: String,
}

/// Output format for stage listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StagesFormat {
  #[default]
  Human,
  Yaml,
  Json,
}

impl FromStr for StagesFormat {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "human" => Ok(StagesFormat::Human),
      "yaml" => Ok(StagesFormat::Yaml),
      "json" => Ok(StagesFormat::Json),
      other => Err(format!("unknown format '{other}' (expected human, yaml or json)")),
    }
  }
}

#[derive(Debug, Error)]
pub enum StagesError {
  #[error("failed to encode stages as JSON: {0}")]
  Json(#[from] serde_json::Error),

  #[error("failed to encode stages as YAML: {0}")]
  Yaml(#[from] serde_yaml::Error),
}

/// Levels as plain entries.
pub fn stage_entries(levels: &Levels) -> Vec<Vec<StageEntry>> {
  levels
    .iter()
    .map(|level| {
      level
        .iter()
        .map(|config| StageEntry {
          project: config.project().to_string(),
          deployment: config.deployment().to_string(),
          source: config.source().to_string(),
        })
        .collect()
    })
    .collect()
}

/// Banner printed before each stage.
pub fn stage_header(stage: usize) -> String {
  format!("---------- Stage {stage} ----------")
}

/// Line closing a stage listing or a run.
pub fn stage_footer() -> &'static str {
  STAGE_FOOTER
}

pub fn render_stages(levels: &Levels, format: StagesFormat) -> Result<String, StagesError> {
  let entries = stage_entries(levels);
  Ok(match format {
    StagesFormat::Json => {
      let mut out = serde_json::to_string_pretty(&entries)?;
      out.push('\n');
      out
    }
    StagesFormat::Yaml => serde_yaml::to_string(&entries)?,
    StagesFormat::Human => {
      let mut out = String::new();
      for (i, stage) in entries.iter().enumerate() {
        out.push_str(&stage_header(i + 1));
        out.push('\n');
        for entry in stage {
          out.push_str(&format!(
            " - project: {}, deployment: {}, source: {}\n",
            entry.project, entry.deployment, entry.source
          ));
        }
      }
      out.push_str(STAGE_FOOTER);
      out.push('\n');
      out
    }
  })
}
