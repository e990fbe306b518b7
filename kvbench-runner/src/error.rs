use kvbench_types::aggregate::AggregateError;
use kvbench_types::stats::StatsError;
use std::error::Error;
use std::fmt::Display;
use std::io;
use std::path::PathBuf;

/// Anything that aborts a run. Every variant maps to a non-zero exit; the
/// benchmark name is carried wherever one is to blame.
#[derive(Debug)]
pub enum RunError {
  Aggregate(AggregateError),
  Archive(io::Error),
  Execution { bench: String, attempts: u32 },
  Handshake { bench: String, detail: String },
  OutputMissing { bench: String, path: PathBuf },
  Payload { bench: String, source: StatsError },
  Report(ReportError),
}

impl Display for RunError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      RunError::Aggregate(e) => write!(f, "cannot aggregate results: {e}"),
      RunError::Archive(e) => write!(f, "cannot package artifacts: {e}"),
      RunError::Execution { bench, attempts } => {
        write!(f, "benchmark {bench} still failing after {attempts} attempts")
      }
      RunError::Handshake { bench, detail } => {
        write!(f, "benchmark {bench} failed the handshake: {detail}")
      }
      RunError::OutputMissing { bench, path } => write!(
        f,
        "benchmark {bench} exited successfully but left no statistics at {}",
        path.display()
      ),
      RunError::Payload { bench, source } => {
        write!(f, "benchmark {bench} wrote unusable statistics: {source}")
      }
      RunError::Report(e) => write!(f, "cannot produce the report: {e}"),
    }
  }
}

impl Error for RunError {}

#[derive(Debug)]
pub enum ReportError {
  Chart { file: String, detail: String },
  Io(io::Error),
  Render(minijinja::Error),
  Syntax(minijinja::Error),
  Template { path: PathBuf, source: io::Error },
}

impl Display for ReportError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ReportError::Chart { file, detail } => write!(f, "cannot render chart {file}: {detail}"),
      ReportError::Io(e) => write!(f, "cannot write report artifacts: {e}"),
      ReportError::Render(e) => write!(f, "template rendering failed: {e}"),
      ReportError::Syntax(e) => write!(f, "template is not valid: {e}"),
      ReportError::Template { path, source } => {
        write!(f, "cannot read template {}: {}", path.display(), source)
      }
    }
  }
}

impl Error for ReportError {}
