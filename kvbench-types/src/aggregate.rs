use crate::stats::PhaseStat;
use crate::stats::RunResult;
use std::error::Error;
use std::fmt::Display;

#[derive(Clone, Debug, PartialEq)]
pub struct Extreme {
  pub value: f64,
  pub bench: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MinMax {
  pub min: Extreme,
  pub max: Extreme,
}

/// Best and worst benchmark for each metric of one statistics row.
#[derive(Clone, Debug, PartialEq)]
pub struct PhaseExtremes {
  pub avg_latency: MinMax,
  pub max_latency: MinMax,
  pub throughput: MinMax,
}

/// Folds all run results into per-row extremes. Row 0 is the whole-run
/// record; ties keep the earliest benchmark in configuration order.
pub fn aggregate(results: &[RunResult]) -> Result<Vec<PhaseExtremes>, AggregateError> {
  let first = results.first().ok_or(AggregateError::NoResults)?;
  let rows = first.stats.len();
  for result in results.iter() {
    if result.stats.len() != rows {
      return Err(AggregateError::RowCountMismatch {
        bench: result.bench.clone(),
        expected: rows,
        actual: result.stats.len(),
      });
    };
  }
  Ok(
    (0..rows)
      .map(|row| PhaseExtremes {
        avg_latency: min_max(results, row, |s| s.avg_latency_us),
        max_latency: min_max(results, row, |s| s.max_latency_us),
        throughput: min_max(results, row, |s| s.throughput),
      })
      .collect(),
  )
}

fn min_max(results: &[RunResult], row: usize, metric: impl Fn(&PhaseStat) -> f64) -> MinMax {
  let seed = Extreme {
    value: metric(&results[0].stats[row]),
    bench: results[0].bench.clone(),
  };
  let mut min = seed.clone();
  let mut max = seed;
  for result in results.iter().skip(1) {
    let value = metric(&result.stats[row]);
    if value < min.value {
      min = Extreme {
        value,
        bench: result.bench.clone(),
      };
    };
    if value > max.value {
      max = Extreme {
        value,
        bench: result.bench.clone(),
      };
    };
  }
  MinMax { min, max }
}

#[derive(Debug)]
pub enum AggregateError {
  NoResults,
  RowCountMismatch {
    bench: String,
    expected: usize,
    actual: usize,
  },
}

impl Display for AggregateError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      AggregateError::NoResults => write!(f, "no results to aggregate"),
      AggregateError::RowCountMismatch {
        bench,
        expected,
        actual,
      } => write!(
        f,
        "benchmark {bench} produced {actual} statistics rows, expected {expected}"
      ),
    }
  }
}

impl Error for AggregateError {}
