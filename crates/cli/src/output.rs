//! CLI output formatting utilities.
//!
//! Provides consistent formatting for terminal output including colored status
//! messages, stage banners and deployment summaries.

use std::sync::Arc;
use std::time::Duration;

use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

use cft_lib::config::Config;
use cft_lib::deployment::DeploymentState;
use cft_lib::execute::{NodeReport, ProgressReporter, StagesFormat, stage_header};
use cft_lib::remote::DeploymentSummary;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum StagesFormatArg {
  #[default]
  Human,
  Yaml,
  Json,
}

impl From<StagesFormatArg> for StagesFormat {
  fn from(arg: StagesFormatArg) -> Self {
    match arg {
      StagesFormatArg::Human => StagesFormat::Human,
      StagesFormatArg::Yaml => StagesFormat::Yaml,
      StagesFormatArg::Json => StagesFormat::Json,
    }
  }
}

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
}

pub fn format_duration(duration: Duration) -> String {
  let secs = duration.as_secs();
  let millis = duration.subsec_millis();

  if secs >= 60 {
    let mins = secs / 60;
    let remaining_secs = secs % 60;
    format!("{}m {}s", mins, remaining_secs)
  } else if secs > 0 {
    format!("{}.{:02}s", secs, millis / 10)
  } else {
    format!("{}ms", millis)
  }
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "    {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

fn print_summary(summary: &DeploymentSummary) {
  for resource in &summary.resources {
    print_stat("resource", &format!("{} ({})", resource.name, resource.resource_type));
  }
  for output in &summary.outputs {
    print_stat(
      "output",
      &format!("{} {} {}", output.name, symbols::ARROW, output.value.to_inline_string()),
    );
  }
}

/// Prints stage banners and per-deployment results as a run progresses.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalReporter;

impl ProgressReporter for TerminalReporter {
  fn stage_started(&self, stage: usize, configs: &[Arc<Config>]) {
    println!("{}", stage_header(stage).if_supports_color(Stream::Stdout, |s| s.bold()));
    for config in configs {
      println!(" - project: {}, deployment: {}", config.project(), config.deployment());
    }
  }

  fn node_finished(&self, report: &NodeReport) {
    let message = format!("{}: {}", report.id, report.state);
    match report.state {
      DeploymentState::Skipped | DeploymentState::PreviewPending => print_warning(&message),
      _ => print_success(&message),
    }
    if let Some(summary) = &report.summary {
      print_summary(summary);
    }
  }
}
