mod cmd;
mod output;
mod prompts;

use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use cft_lib::consts::DEFAULT_PARALLELISM;
use cft_lib::deployment::PreviewDecision;
use cft_lib::remote::{CreatePolicy, DeletePolicy};

use output::StagesFormatArg;

/// cft - Deploy interdependent Deployment Manager configs in dependency order
#[derive(Parser)]
#[command(name = "cft")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Project used for configs that do not set one
  #[arg(long, global = true)]
  project: Option<String>,

  /// Log level (overridden by RUST_LOG)
  #[arg(long, global = true, value_enum, default_value_t = Verbosity::Warn)]
  verbosity: Verbosity,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Verbosity {
  Error,
  Warn,
  Info,
  Debug,
  Trace,
}

impl Verbosity {
  fn as_str(self) -> &'static str {
    match self {
      Verbosity::Error => "error",
      Verbosity::Warn => "warn",
      Verbosity::Info => "info",
      Verbosity::Debug => "debug",
      Verbosity::Trace => "trace",
    }
  }
}

/// Flags shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
  /// Config files, directories of configs, or inline YAML documents
  #[arg(required = true, num_args = 1..)]
  pub config: Vec<String>,

  /// Print the computed stages and exit without deploying
  #[arg(short = 's', long)]
  pub show_stages: bool,

  /// Format for --show-stages
  #[arg(short, long, value_enum, default_value_t = StagesFormatArg::Human)]
  pub format: StagesFormatArg,

  /// Maximum deployments processed concurrently within a stage
  #[arg(long, default_value_t = DEFAULT_PARALLELISM)]
  pub parallelism: usize,

  /// Delay between operation status checks
  #[arg(long, value_parser = humantime::parse_duration, default_value = "5s")]
  pub poll_interval: Duration,

  /// Give up on an operation after this long
  #[arg(long, value_parser = humantime::parse_duration, default_value = "20m")]
  pub timeout: Duration,
}

/// Flags for actions that can stage a preview.
#[derive(Args, Debug, Clone)]
pub struct PreviewArgs {
  /// Stage changes as a preview and ask before applying them
  #[arg(short, long)]
  pub preview: bool,

  /// Answer preview prompts without asking (confirm, skip, abort)
  #[arg(long)]
  pub preview_decision: Option<PreviewDecision>,

  /// How resources are matched on create (acquire, create-or-acquire)
  #[arg(long)]
  pub create_policy: Option<CreatePolicy>,
}

#[derive(Subcommand)]
enum Commands {
  /// Create deployments, or update the ones that already exist
  Apply {
    #[command(flatten)]
    common: CommonArgs,

    #[command(flatten)]
    preview: PreviewArgs,

    /// Process stages in reverse order
    #[arg(short, long)]
    reverse: bool,
  },

  /// Create new deployments
  Create {
    #[command(flatten)]
    common: CommonArgs,

    #[command(flatten)]
    preview: PreviewArgs,
  },

  /// Update existing deployments
  Update {
    #[command(flatten)]
    common: CommonArgs,

    #[command(flatten)]
    preview: PreviewArgs,
  },

  /// Delete deployments, dependents first
  Delete {
    #[command(flatten)]
    common: CommonArgs,

    /// Keep the underlying resources (abandon) or remove them (delete)
    #[arg(long)]
    delete_policy: Option<DeletePolicy>,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.verbosity.as_str()));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let project = cli.project;
  match cli.command {
    Commands::Apply {
      common,
      preview,
      reverse,
    } => cmd::cmd_apply(project, &common, &preview, reverse),
    Commands::Create { common, preview } => cmd::cmd_create(project, &common, &preview),
    Commands::Update { common, preview } => cmd::cmd_update(project, &common, &preview),
    Commands::Delete { common, delete_policy } => cmd::cmd_delete(project, &common, delete_policy),
  }
}
