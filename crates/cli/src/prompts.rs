use std::io::{self, BufRead, IsTerminal, Write};

use async_trait::async_trait;

use cft_lib::deployment::{DecisionProvider, PreviewDecision};
use cft_lib::types::NodeId;

/// Asks on the terminal what to do with each staged preview.
///
/// The deployment context asks one deployment at a time, so prompts never
/// interleave.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalDecision;

#[async_trait]
impl DecisionProvider for TerminalDecision {
  async fn decide(&self, deployment: &NodeId) -> io::Result<PreviewDecision> {
    let label = deployment.to_string();
    tokio::task::spawn_blocking(move || ask(&label))
      .await
      .map_err(io::Error::other)?
  }
}

fn ask(deployment: &str) -> io::Result<PreviewDecision> {
  if !io::stdin().is_terminal() || !io::stderr().is_terminal() {
    return Err(io::Error::other(
      "cannot prompt for a preview decision in non-interactive mode; use --preview-decision",
    ));
  }

  let stdin = io::stdin();
  loop {
    write!(io::stderr(), "Update(u), Skip (s), or Abort(a) Deployment {deployment}? ")?;
    io::stderr().flush()?;

    let mut input = String::new();
    if stdin.lock().read_line(&mut input)? == 0 {
      return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stdin closed"));
    }
    if let Some(decision) = parse_answer(&input) {
      return Ok(decision);
    }
  }
}

fn parse_answer(input: &str) -> Option<PreviewDecision> {
  match input.trim() {
    "u" => Some(PreviewDecision::Confirm),
    "s" => Some(PreviewDecision::Skip),
    "a" => Some(PreviewDecision::Abort),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn only_single_letter_answers_are_accepted() {
    assert_eq!(parse_answer("u\n"), Some(PreviewDecision::Confirm));
    assert_eq!(parse_answer(" s "), Some(PreviewDecision::Skip));
    assert_eq!(parse_answer("a"), Some(PreviewDecision::Abort));
    assert_eq!(parse_answer("update"), None);
    assert_eq!(parse_answer(""), None);
  }
}
