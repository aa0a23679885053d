//! Preview confirmation decisions.

use std::fmt;
use std::io;
use std::str::FromStr;

use async_trait::async_trait;

use crate::types::NodeId;

/// What to do with a staged preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewDecision {
  /// Promote the preview.
  Confirm,
  /// Cancel the preview and move on to the next deployment.
  Skip,
  /// Stop the whole run.
  Abort,
}

impl FromStr for PreviewDecision {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "u" | "update" | "confirm" => Ok(PreviewDecision::Confirm),
      "s" | "skip" => Ok(PreviewDecision::Skip),
      "a" | "abort" => Ok(PreviewDecision::Abort),
      other => Err(format!("unknown preview decision '{other}' (expected confirm, skip or abort)")),
    }
  }
}

impl fmt::Display for PreviewDecision {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      PreviewDecision::Confirm => "confirm",
      PreviewDecision::Skip => "skip",
      PreviewDecision::Abort => "abort",
    })
  }
}

/// Source of preview decisions, e.g. a terminal prompt or a fixed policy.
#[async_trait]
pub trait DecisionProvider: Send + Sync {
  async fn decide(&self, deployment: &NodeId) -> io::Result<PreviewDecision>;
}

/// Answers every preview the same way.
#[derive(Debug, Clone, Copy)]
pub struct FixedDecision(pub PreviewDecision);

#[async_trait]
impl DecisionProvider for FixedDecision {
  async fn decide(&self, _deployment: &NodeId) -> io::Result<PreviewDecision> {
    Ok(self.0)
  }
}
