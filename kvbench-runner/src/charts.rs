use crate::error::ReportError;
use charts_rs::svg_to_png;
use charts_rs::BarChart;
use charts_rs::Box as ChartBox;
use charts_rs::LegendCategory;
use charts_rs::LineChart;
use charts_rs::Series;
use kvbench_types::conf::Conf;
use kvbench_types::stats::RunResult;
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::info;

/// Line charts are thinned to at most this many points per series.
const MAX_LINE_POINTS: usize = 1000;
/// Latency axes are clamped here once any benchmark's maximum exceeds it,
/// so a single outlier cannot flatten the interesting region.
const Y_AXIS_CAP: f64 = 100.0;

const THEME: &str = "light";

/// File names of everything rendered into the report directory.
#[derive(Clone, Debug, Serialize)]
pub struct ChartFiles {
  pub average_latency: String,
  pub max_latency: String,
  pub throughput: String,
  pub phase_latency: Vec<String>,
}

impl ChartFiles {
  pub fn pngs(&self) -> Vec<&str> {
    let mut out = vec![
      self.average_latency.as_str(),
      self.max_latency.as_str(),
      self.throughput.as_str(),
    ];
    out.extend(self.phase_latency.iter().map(|f| f.as_str()));
    out
  }
}

/// Renders the three comparison bar charts plus one latency line chart per
/// phase. With `generatePGF` the SVG sources are kept alongside the PNGs.
pub fn render_all(
  conf: &Conf,
  results: &[RunResult],
  out_dir: &Path,
) -> Result<ChartFiles, ReportError> {
  let keep_svg = conf.generate_pgf;
  let phase_labels: Vec<String> = conf.phase.iter().map(|p| p.ty.to_string()).collect();
  let mut with_total = vec!["Total".to_string()];
  with_total.extend(phase_labels.iter().cloned());

  let mut files = ChartFiles {
    average_latency: "average_latency.png".to_string(),
    max_latency: "max_latency.png".to_string(),
    throughput: "throughput.png".to_string(),
    phase_latency: Vec::new(),
  };

  // The latency bars leave out the whole-run record, which only repeats the
  // phase data; throughput keeps it.
  let svg = bar_chart(
    &files.average_latency,
    "Average Latency (us)",
    phase_labels.clone(),
    series(results, |r| {
      r.stats[1..].iter().map(|s| s.avg_latency_us).collect()
    }),
  )?;
  write_chart(out_dir, &files.average_latency, &svg, keep_svg)?;

  let svg = bar_chart(
    &files.max_latency,
    "Maximum Latency (us)",
    phase_labels,
    series(results, |r| {
      r.stats[1..].iter().map(|s| s.max_latency_us).collect()
    }),
  )?;
  write_chart(out_dir, &files.max_latency, &svg, keep_svg)?;

  let svg = bar_chart(
    &files.throughput,
    "Throughput (ops/s)",
    with_total,
    series(results, |r| r.stats.iter().map(|s| s.throughput).collect()),
  )?;
  write_chart(out_dir, &files.throughput, &svg, keep_svg)?;

  for (i, phase) in conf.phase.iter().enumerate() {
    let stat_index = i + 1;
    let file = format!("phase_{stat_index}_latency.png");
    let title = format!("Phase {stat_index} {} Latency (us)", phase.ty);
    match phase_line_chart(&file, &title, results, stat_index)? {
      Some(svg) => {
        write_chart(out_dir, &file, &svg, keep_svg)?;
        files.phase_latency.push(file);
      }
      None => info!(phase = stat_index, "no latency samples, skipping line chart"),
    };
  }
  Ok(files)
}

fn series(results: &[RunResult], values: impl Fn(&RunResult) -> Vec<f64>) -> Vec<Series> {
  results
    .iter()
    .map(|r| {
      Series::new(
        r.bench.clone(),
        values(r).into_iter().map(|v| v as f32).collect(),
      )
    })
    .collect()
}

fn bar_chart(
  file: &str,
  title: &str,
  labels: Vec<String>,
  series_list: Vec<Series>,
) -> Result<String, ReportError> {
  let mut chart = BarChart::new_with_theme(series_list, labels, THEME);
  chart.title_text = title.to_string();
  chart.width = 1200.0;
  chart.height = 600.0;
  chart.legend_category = LegendCategory::Normal;
  chart.legend_margin = Some(ChartBox {
    top: chart.title_height + 10.0,
    bottom: 5.0,
    ..Default::default()
  });
  chart.svg().map_err(|e| chart_error(file, e))
}

fn phase_line_chart(
  file: &str,
  title: &str,
  results: &[RunResult],
  stat_index: usize,
) -> Result<Option<String>, ReportError> {
  let samples: Vec<&[f64]> = results
    .iter()
    .map(|r| r.stats[stat_index].samples.as_slice())
    .collect();
  // Every series is cut to the shortest sample count so the x axis lines up
  // across benchmarks.
  let cut = truncated_len(&samples);
  if cut == 0 {
    return Ok(None);
  };
  let stride = ((cut + MAX_LINE_POINTS - 1) / MAX_LINE_POINTS).max(1);
  let series_list: Vec<Series> = results
    .iter()
    .map(|r| {
      let values: Vec<f32> = r.stats[stat_index].samples[..cut]
        .iter()
        .step_by(stride)
        .map(|&v| v as f32)
        .collect();
      Series::new(r.bench.clone(), values)
    })
    .collect();
  let points = (cut + stride - 1) / stride;
  let label_every = (points / 10).max(1);
  let x_axis: Vec<String> = (0..points)
    .map(|i| {
      if i % label_every == 0 {
        (i * stride).to_string()
      } else {
        String::new()
      }
    })
    .collect();

  let mut chart = LineChart::new_with_theme(series_list, x_axis, THEME);
  chart.title_text = title.to_string();
  chart.width = 1200.0;
  chart.height = 800.0;
  chart.legend_category = LegendCategory::Normal;
  chart.legend_margin = Some(ChartBox {
    top: chart.title_height + 10.0,
    bottom: 5.0,
    ..Default::default()
  });
  let max_latencies: Vec<f64> = results
    .iter()
    .map(|r| r.stats[stat_index].max_latency_us)
    .collect();
  if let Some(cap) = y_axis_cap(&max_latencies) {
    chart.y_axis_configs[0].axis_max = Some(cap);
  };
  chart.svg().map(Some).map_err(|e| chart_error(file, e))
}

fn truncated_len(samples: &[&[f64]]) -> usize {
  samples.iter().map(|s| s.len()).min().unwrap_or(0)
}

fn y_axis_cap(max_latencies: &[f64]) -> Option<f32> {
  if max_latencies.iter().any(|&v| v > Y_AXIS_CAP) {
    Some(Y_AXIS_CAP as f32)
  } else {
    None
  }
}

fn chart_error(file: &str, e: impl ToString) -> ReportError {
  ReportError::Chart {
    file: file.to_string(),
    detail: e.to_string(),
  }
}

fn write_chart(out_dir: &Path, file: &str, svg: &str, keep_svg: bool) -> Result<(), ReportError> {
  let png = svg_to_png(svg).map_err(|e| chart_error(file, e))?;
  fs::write(out_dir.join(file), png).map_err(ReportError::Io)?;
  if keep_svg {
    let stem = file.strip_suffix(".png").unwrap_or(file);
    fs::write(out_dir.join(format!("{stem}.svg")), svg).map_err(ReportError::Io)?;
  };
  Ok(())
}
