use prost::Message;
use std::error::Error;
use std::fmt::Display;

/// One statistics record as serialised by a benchmark executable. Record 0
/// covers the whole run; each configured phase follows in order. Latencies and
/// durations are in microseconds.
#[derive(Clone, PartialEq, Message)]
pub struct Stat {
  #[prost(double, tag = "1")]
  pub average_latency: f64,
  #[prost(double, tag = "2")]
  pub max_latency: f64,
  #[prost(double, tag = "3")]
  pub throughput: f64,
  #[prost(uint64, tag = "4")]
  pub total: u64,
  #[prost(double, tag = "5")]
  pub duration: f64,
  #[prost(double, repeated, tag = "6")]
  pub latency: Vec<f64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Stats {
  #[prost(message, repeated, tag = "1")]
  pub stat: Vec<Stat>,
}

#[derive(Clone, Debug)]
pub struct PhaseStat {
  pub throughput: f64,
  pub duration_us: f64,
  pub avg_latency_us: f64,
  pub max_latency_us: f64,
  pub total_ops: u64,
  /// Per-operation latency samples, in collection order.
  pub samples: Vec<f64>,
}

impl PhaseStat {
  pub fn throughput_display(&self) -> String {
    format_thousands(self.throughput as u64)
  }

  pub fn duration_display(&self) -> String {
    format_duration_secs(self.duration_us)
  }

  pub fn avg_latency_display(&self) -> String {
    format_latency(self.avg_latency_us)
  }

  pub fn max_latency_display(&self) -> String {
    format_latency(self.max_latency_us)
  }
}

#[derive(Clone, Debug)]
pub struct RunResult {
  pub bench: String,
  pub stats: Vec<PhaseStat>,
}

impl RunResult {
  /// Decodes the payload a benchmark wrote after a successful run. The record
  /// count must be exactly one more than the configured phase count.
  pub fn from_bytes(bench: String, raw: &[u8], phases: usize) -> Result<RunResult, StatsError> {
    let decoded = Stats::decode(raw).map_err(StatsError::Decode)?;
    let expected = phases + 1;
    if decoded.stat.len() != expected {
      return Err(StatsError::RecordCount {
        expected,
        actual: decoded.stat.len(),
      });
    };
    let stats = decoded
      .stat
      .into_iter()
      .map(|s| PhaseStat {
        throughput: s.throughput,
        duration_us: s.duration,
        avg_latency_us: s.average_latency,
        max_latency_us: s.max_latency,
        total_ops: s.total,
        samples: s.latency,
      })
      .collect();
    Ok(RunResult { bench, stats })
  }

  pub fn total(&self) -> &PhaseStat {
    &self.stats[0]
  }
}

/// Renders an integral operation count with thousands separators. Fractional
/// throughputs are truncated before grouping.
pub fn format_thousands(n: u64) -> String {
  let digits = n.to_string();
  let len = digits.len();
  let mut out = String::with_capacity(len + len / 3);
  for (i, c) in digits.chars().enumerate() {
    if i > 0 && (len - i) % 3 == 0 {
      out.push(',');
    };
    out.push(c);
  }
  out
}

/// Microseconds rendered as seconds with two decimal places.
pub fn format_duration_secs(us: f64) -> String {
  format!("{:.2}", us / 1_000_000.0)
}

/// Microsecond latency rendered with four decimal places.
pub fn format_latency(us: f64) -> String {
  format!("{us:.4}")
}

#[derive(Debug)]
pub enum StatsError {
  Decode(prost::DecodeError),
  RecordCount { expected: usize, actual: usize },
}

impl Display for StatsError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      StatsError::Decode(e) => write!(f, "malformed statistics payload: {e}"),
      StatsError::RecordCount { expected, actual } => {
        write!(f, "expected {expected} statistics records, found {actual}")
      }
    }
  }
}

impl Error for StatsError {}

#[cfg(test)]
mod tests {
  use crate::stats::format_duration_secs;
  use crate::stats::format_latency;
  use crate::stats::format_thousands;
  use crate::stats::PhaseStat;
  use crate::stats::RunResult;
  use crate::stats::Stat;
  use crate::stats::Stats;
  use crate::stats::StatsError;
  use prost::Message;

  fn payload(records: usize) -> Vec<u8> {
    let stat = (0..records)
      .map(|i| Stat {
        average_latency: 7.25 + i as f64,
        max_latency: 12.5,
        throughput: 1000.0 * (i + 1) as f64,
        total: 500 * (i + 1) as u64,
        duration: 2_500_000.0,
        latency: vec![1.0, 2.0, 3.0],
      })
      .collect();
    Stats { stat }.encode_to_vec()
  }

  #[test]
  fn decodes_expected_record_count() {
    let result = RunResult::from_bytes("alpha".to_string(), &payload(3), 2).unwrap();
    assert_eq!(result.bench, "alpha");
    assert_eq!(result.stats.len(), 3);
    assert_eq!(result.total().total_ops, 500);
    assert_eq!(result.stats[1].throughput, 2000.0);
    assert_eq!(result.stats[1].avg_latency_us, 8.25);
    assert_eq!(result.stats[2].samples, vec![1.0, 2.0, 3.0]);
  }

  #[test]
  fn rejects_wrong_record_count() {
    let err = RunResult::from_bytes("alpha".to_string(), &payload(3), 3).unwrap_err();
    assert!(matches!(err, StatsError::RecordCount {
      expected: 4,
      actual: 3
    }));
  }

  #[test]
  fn rejects_garbage_payload() {
    let err = RunResult::from_bytes("alpha".to_string(), b"\xff\xff\xff\xff", 1).unwrap_err();
    assert!(matches!(err, StatsError::Decode(_)));
  }

  #[test]
  fn formats_thousands() {
    assert_eq!(format_thousands(0), "0");
    assert_eq!(format_thousands(950), "950");
    assert_eq!(format_thousands(1000), "1,000");
    assert_eq!(format_thousands(1234567), "1,234,567");
  }

  #[test]
  fn truncates_fractional_throughput() {
    let stat = PhaseStat {
      throughput: 1234567.9,
      duration_us: 0.0,
      avg_latency_us: 0.0,
      max_latency_us: 0.0,
      total_ops: 0,
      samples: Vec::new(),
    };
    assert_eq!(stat.throughput_display(), "1,234,567");
  }

  #[test]
  fn formats_duration_in_seconds() {
    assert_eq!(format_duration_secs(12_345_678.0), "12.35");
    assert_eq!(format_duration_secs(0.0), "0.00");
  }

  #[test]
  fn formats_latency_with_four_decimals() {
    assert_eq!(format_latency(7.25), "7.2500");
    assert_eq!(format_latency(12.5), "12.5000");
  }
}
