use crate::error::RunError;
use kvbench_types::conf::BenchConf;
use kvbench_types::conf::Conf;
use kvbench_types::stats::RunResult;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;
use std::process::Stdio;
use std::thread::sleep;
use std::time::Duration;
use tracing::info;
use tracing::warn;

/// Every benchmark executable must answer this argument with [HANDSHAKE_ACK]
/// on stdout and nothing else.
pub const HANDSHAKE_ARG: &str = "are-you-kvbench";
pub const HANDSHAKE_ACK: &[u8] = b"YES!\n";

const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Asks every configured benchmark to identify itself. Runs before anything
/// else so a mislabelled executable cannot waste hours of machine time.
pub fn verify_benchmarks(conf: &Conf, base_dir: &Path) -> Result<(), RunError> {
  for bench in conf.bench.iter() {
    let mut argv = bench.task_argv();
    argv.push(HANDSHAKE_ARG.to_string());
    let output = Command::new(&argv[0])
      .args(&argv[1..])
      .current_dir(base_dir)
      .stderr(Stdio::inherit())
      .output()
      .map_err(|e| RunError::Handshake {
        bench: bench.name.clone(),
        detail: format!("cannot run {}: {}", argv[0], e),
      })?;
    if output.stdout != HANDSHAKE_ACK {
      return Err(RunError::Handshake {
        bench: bench.name.clone(),
        detail: format!(
          "expected YES!, got {:?}",
          String::from_utf8_lossy(&output.stdout)
        ),
      });
    };
    info!(bench = %bench.name, "handshake ok");
  }
  Ok(())
}

pub struct BenchRunner<'a> {
  conf: &'a Conf,
  base_dir: &'a Path,
  retry_delay: Duration,
}

impl<'a> BenchRunner<'a> {
  pub fn new(conf: &'a Conf, base_dir: &'a Path) -> Self {
    BenchRunner {
      conf,
      base_dir,
      retry_delay: RETRY_DELAY,
    }
  }

  /// Overrides the pause between failed attempts.
  #[allow(unused)]
  pub fn with_retry_delay(mut self, delay: Duration) -> Self {
    self.retry_delay = delay;
    self
  }

  /// Runs every benchmark in configuration order. The first one that cannot
  /// produce a result aborts the whole run.
  pub fn run_all(&self) -> Result<Vec<RunResult>, RunError> {
    let mut results = Vec::new();
    for bench in self.conf.bench.iter() {
      results.push(self.run_bench(bench)?);
    }
    Ok(results)
  }

  fn run_bench(&self, bench: &BenchConf) -> Result<RunResult, RunError> {
    let attempts = self.conf.attempts();
    for attempt in 1..=attempts {
      info!(bench = %bench.name, attempt, attempts, "running benchmark");
      self.remove_stale_payload(bench);
      let mut ok = match bench.pre_task_argv() {
        Some(argv) => self.run_stage(bench, "preTask", &argv),
        None => true,
      };
      if ok {
        ok = self.run_stage(bench, "task", &self.task_argv(bench));
      } else {
        warn!(bench = %bench.name, "preTask failed, skipping task");
      };
      if let Some(argv) = bench.after_task_argv() {
        // runs even after a failed attempt so the next one starts clean
        ok &= self.run_stage(bench, "afterTask", &argv);
      };
      if ok {
        return self.collect(bench);
      };
      if attempt < attempts {
        warn!(bench = %bench.name, attempt, "attempt failed, retrying");
        sleep(self.retry_delay);
      };
    }
    Err(RunError::Execution {
      bench: bench.name.clone(),
      attempts,
    })
  }

  /// Full command line for one measured run: the configured task command,
  /// then a `<TYPE> <size>` pair per phase, then the thread count.
  fn task_argv(&self, bench: &BenchConf) -> Vec<String> {
    let mut argv = bench.task_argv();
    for phase in self.conf.phase.iter() {
      argv.push(phase.ty.to_string());
      argv.push(phase.size.to_string());
    }
    argv.push("-thread".to_string());
    argv.push(self.conf.threads_for(bench).to_string());
    argv
  }

  fn payload_path(&self) -> PathBuf {
    self.base_dir.join(&self.conf.proto_data)
  }

  fn remove_stale_payload(&self, bench: &BenchConf) {
    if let Err(e) = fs::remove_file(self.payload_path()) {
      if e.kind() != ErrorKind::NotFound {
        warn!(bench = %bench.name, "cannot remove stale statistics: {e}");
      };
    };
  }

  fn run_stage(&self, bench: &BenchConf, stage: &str, argv: &[String]) -> bool {
    info!(bench = %bench.name, stage, command = %argv.join(" "), "running stage");
    let status = Command::new(&argv[0])
      .args(&argv[1..])
      .current_dir(self.base_dir)
      .stdout(Stdio::inherit())
      .stderr(Stdio::inherit())
      .status();
    match status {
      Ok(status) if status.success() => true,
      Ok(status) => {
        warn!(bench = %bench.name, stage, %status, "stage failed");
        false
      }
      Err(e) => {
        warn!(bench = %bench.name, stage, "cannot run stage: {e}");
        false
      }
    }
  }

  fn collect(&self, bench: &BenchConf) -> Result<RunResult, RunError> {
    let path = self.payload_path();
    let raw = fs::read(&path).map_err(|_| RunError::OutputMissing {
      bench: bench.name.clone(),
      path: path.clone(),
    })?;
    let result =
      RunResult::from_bytes(bench.name.clone(), &raw, self.conf.phase.len()).map_err(|source| {
        RunError::Payload {
          bench: bench.name.clone(),
          source,
        }
      })?;
    log_result(&result);
    Ok(result)
  }
}

fn log_result(result: &RunResult) {
  let total = result.total();
  info!(
    bench = %result.bench,
    ops = total.total_ops,
    throughput = %total.throughput_display(),
    avg_latency_us = %total.avg_latency_display(),
    max_latency_us = %total.max_latency_display(),
    "benchmark finished"
  );
  for (i, stat) in result.stats.iter().enumerate().skip(1) {
    info!(
      bench = %result.bench,
      phase = i,
      ops = stat.total_ops,
      throughput = %stat.throughput_display(),
      avg_latency_us = %stat.avg_latency_display(),
      max_latency_us = %stat.max_latency_display(),
      "phase statistics"
    );
  }
}
