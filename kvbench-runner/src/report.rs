use crate::charts::ChartFiles;
use crate::error::ReportError;
use crate::host::HostInfo;
use chrono::Utc;
use kvbench_types::aggregate::Extreme;
use kvbench_types::aggregate::PhaseExtremes;
use kvbench_types::conf::Conf;
use kvbench_types::stats::format_latency;
use kvbench_types::stats::format_thousands;
use kvbench_types::stats::RunResult;
use minijinja::Environment;
use serde::Serialize;
use std::path::Path;
use std::process::Command;
use std::process::Stdio;
use tracing::debug;
use tracing::warn;

pub const REPORT_FILE: &str = "report.tex";

/// Everything the TeX template can reference. Numbers arrive pre-formatted;
/// the template only does layout.
#[derive(Serialize)]
pub struct ReportContext {
  pub name: String,
  pub user: String,
  pub date: String,
  pub host: HostInfo,
  pub show_duration: bool,
  pub phases: Vec<String>,
  pub benchmarks: Vec<BenchSection>,
  pub aggregates: Vec<AggregateRow>,
  pub charts: ChartFiles,
}

#[derive(Serialize)]
pub struct BenchSection {
  pub name: String,
  pub rows: Vec<StatRow>,
}

#[derive(Serialize)]
pub struct StatRow {
  pub label: String,
  pub ops: u64,
  pub throughput: String,
  pub duration_secs: String,
  pub avg_latency: String,
  pub max_latency: String,
}

#[derive(Serialize)]
pub struct AggregateRow {
  pub label: String,
  pub avg_latency: MinMaxCell,
  pub max_latency: MinMaxCell,
  pub throughput: MinMaxCell,
}

#[derive(Serialize)]
pub struct MinMaxCell {
  pub min: String,
  pub min_bench: String,
  pub max: String,
  pub max_bench: String,
}

pub fn build_context(
  conf: &Conf,
  host: &HostInfo,
  results: &[RunResult],
  aggregates: &[PhaseExtremes],
  charts: &ChartFiles,
) -> ReportContext {
  let row_label = |i: usize| -> String {
    if i == 0 {
      "Total".to_string()
    } else {
      conf.phase[i - 1].ty.to_string()
    }
  };
  ReportContext {
    name: conf.name.clone(),
    user: conf.user.clone(),
    date: Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    host: host.clone(),
    show_duration: conf.show_duration,
    phases: conf
      .phase
      .iter()
      .map(|p| format!("{} {}", p.ty, p.size))
      .collect(),
    benchmarks: results
      .iter()
      .map(|r| BenchSection {
        name: r.bench.clone(),
        rows: r
          .stats
          .iter()
          .enumerate()
          .map(|(i, s)| StatRow {
            label: row_label(i),
            ops: s.total_ops,
            throughput: s.throughput_display(),
            duration_secs: s.duration_display(),
            avg_latency: s.avg_latency_display(),
            max_latency: s.max_latency_display(),
          })
          .collect(),
      })
      .collect(),
    aggregates: aggregates
      .iter()
      .enumerate()
      .map(|(i, e)| AggregateRow {
        label: row_label(i),
        avg_latency: latency_cell(&e.avg_latency.min, &e.avg_latency.max),
        max_latency: latency_cell(&e.max_latency.min, &e.max_latency.max),
        throughput: throughput_cell(&e.throughput.min, &e.throughput.max),
      })
      .collect(),
    charts: charts.clone(),
  }
}

fn latency_cell(min: &Extreme, max: &Extreme) -> MinMaxCell {
  MinMaxCell {
    min: format_latency(min.value),
    min_bench: min.bench.clone(),
    max: format_latency(max.value),
    max_bench: max.bench.clone(),
  }
}

fn throughput_cell(min: &Extreme, max: &Extreme) -> MinMaxCell {
  MinMaxCell {
    min: format_thousands(min.value as u64),
    min_bench: min.bench.clone(),
    max: format_thousands(max.value as u64),
    max_bench: max.bench.clone(),
  }
}

/// Parses the template without rendering, so a broken one aborts the run
/// before any benchmark has started.
pub fn validate_template(source: &str) -> Result<(), ReportError> {
  let mut env = Environment::new();
  env
    .add_template(REPORT_FILE, source)
    .map_err(ReportError::Syntax)?;
  Ok(())
}

pub fn render(source: &str, ctx: &ReportContext) -> Result<String, ReportError> {
  let mut env = Environment::new();
  env
    .add_template(REPORT_FILE, source)
    .map_err(ReportError::Syntax)?;
  let template = env.get_template(REPORT_FILE).map_err(ReportError::Syntax)?;
  template.render(ctx).map_err(ReportError::Render)
}

/// Best effort; a host without pdflatex must not fail the run.
pub fn compile_tex(out_dir: &Path) -> bool {
  let status = Command::new("pdflatex")
    .arg("-interaction=nonstopmode")
    .arg("-halt-on-error")
    .arg(REPORT_FILE)
    .current_dir(out_dir)
    .stdout(Stdio::null())
    .stderr(Stdio::null())
    .status();
  match status {
    Ok(status) if status.success() => true,
    Ok(status) => {
      warn!(%status, "pdflatex failed");
      false
    }
    Err(e) => {
      warn!("cannot run pdflatex: {e}");
      false
    }
  }
}

/// Opens every rendered chart in the desktop viewer, when there is one.
pub fn show_figures(out_dir: &Path, charts: &ChartFiles) {
  for png in charts.pngs() {
    let path = out_dir.join(png);
    if let Err(e) = Command::new("xdg-open")
      .arg(&path)
      .stdout(Stdio::null())
      .stderr(Stdio::null())
      .spawn()
    {
      debug!(file = %path.display(), "cannot open figure viewer: {e}");
    };
  }
}
