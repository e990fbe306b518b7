use clap::Parser;
use kvbench_types::conf::Conf;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing::info;

pub mod archive;
pub mod charts;
pub mod error;
pub mod exec;
pub mod host;
pub mod pipeline;
pub mod publish;
pub mod report;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
  /// Path to the run configuration.
  #[arg(default_value = "kvbench.json")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
  tracing_subscriber::fmt::init();

  let cli = Cli::parse();

  let conf = match Conf::load(&cli.config) {
    Ok(conf) => conf,
    Err(e) => {
      error!(config = %cli.config.display(), "{e}");
      return ExitCode::FAILURE;
    }
  };

  let base_dir = std::env::current_dir().expect("resolve working directory");

  info!(
    name = %conf.name,
    benchmarks = conf.bench.len(),
    phases = conf.phase.len(),
    "starting benchmark run"
  );

  match pipeline::run(&conf, &base_dir).await {
    Ok(archive) => {
      info!(archive = %archive.display(), "benchmark run complete");
      ExitCode::SUCCESS
    }
    Err(e) => {
      error!("{e}");
      ExitCode::FAILURE
    }
  }
}
