use crate::archive::create_archive;
use crate::charts::render_all;
use crate::error::ReportError;
use crate::error::RunError;
use crate::exec::verify_benchmarks;
use crate::exec::BenchRunner;
use crate::host::HostInfo;
use crate::publish::publish;
use crate::report::build_context;
use crate::report::compile_tex;
use crate::report::render;
use crate::report::show_figures;
use crate::report::validate_template;
use crate::report::REPORT_FILE;
use kvbench_types::aggregate::aggregate;
use kvbench_types::conf::Conf;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use tracing::info;

pub const REPORT_DIR: &str = "kvbench-report";

/// One whole benchmark run: template check, handshake, execution, report,
/// archive, publication. Returns the archive path.
pub async fn run(conf: &Conf, base_dir: &Path) -> Result<PathBuf, RunError> {
  // The template is read and parsed first; a typo in it must not cost a
  // night of machine time.
  let template_path = base_dir.join(&conf.tex_template);
  let template = fs::read_to_string(&template_path).map_err(|source| {
    RunError::Report(ReportError::Template {
      path: template_path.clone(),
      source,
    })
  })?;
  validate_template(&template).map_err(RunError::Report)?;

  let host = HostInfo::probe(base_dir, conf.probe_disk_size);
  info!(
    cpu = %host.cpu_model,
    cores = host.cpu_cores,
    memory = %host.memory_total,
    kernel = %host.kernel,
    "probed host"
  );

  verify_benchmarks(conf, base_dir)?;
  let results = BenchRunner::new(conf, base_dir).run_all()?;
  let aggregates = aggregate(&results).map_err(RunError::Aggregate)?;

  let out_dir = base_dir.join(REPORT_DIR);
  fs::create_dir_all(&out_dir).map_err(|e| RunError::Report(ReportError::Io(e)))?;
  let charts = render_all(conf, &results, &out_dir).map_err(RunError::Report)?;
  let ctx = build_context(conf, &host, &results, &aggregates, &charts);
  let rendered = render(&template, &ctx).map_err(RunError::Report)?;
  let report_path = out_dir.join(REPORT_FILE);
  fs::write(&report_path, rendered).map_err(|e| RunError::Report(ReportError::Io(e)))?;
  info!(report = %report_path.display(), "report rendered");

  if conf.compile_tex && compile_tex(&out_dir) {
    info!("report compiled to PDF");
  };
  if conf.show_figure {
    show_figures(&out_dir, &charts);
  };

  let archive = create_archive(conf, &out_dir, base_dir).map_err(RunError::Archive)?;
  publish(conf, &archive).await;
  Ok(archive)
}

#[cfg(test)]
mod tests {
  use crate::error::ReportError;
  use crate::error::RunError;
  use crate::pipeline::run;
  use kvbench_types::conf::Conf;
  use kvbench_types::stats::Stat;
  use kvbench_types::stats::Stats;
  use prost::Message;
  use std::fs;
  use std::os::unix::fs::PermissionsExt;
  use std::path::Path;

  const HANDSHAKE_SH: &str = r#"if [ "$1" = "are-you-kvbench" ]; then echo "YES!"; exit 0; fi"#;

  const TEMPLATE: &str = "\\documentclass{article}\n\
    {{ name }} by {{ user }}\n\
    {% for b in benchmarks %}{{ b.name }}: {{ b.rows[0].throughput }}\n\
    {% endfor %}{{ charts.throughput }}\n";

  fn write_script(dir: &Path, name: &str, body: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path.to_str().unwrap().to_string()
  }

  fn write_payload(dir: &Path, file: &str, throughput: f64) {
    let stat = (0..3)
      .map(|i| Stat {
        average_latency: 6.5 + i as f64,
        max_latency: 60.0,
        throughput: throughput - i as f64,
        total: 4000,
        duration: 2_000_000.0,
        latency: (0..32).map(|s| 4.0 + (s % 5) as f64).collect(),
      })
      .collect();
    fs::write(dir.join(file), Stats { stat }.encode_to_vec()).unwrap();
  }

  fn conf(dir: &Path, benches: &str, extra: &str) -> Conf {
    fs::write(dir.join("report.tex"), TEMPLATE).unwrap();
    serde_json::from_str(&format!(
      r#"{{
        "name": "smoke run",
        "user": "ci",
        "bench": [{benches}],
        "phase": [{{"type": "LOAD", "size": 1000000}}, {{"type": "GET", "size": 500}}],
        "threadNumber": 2,
        "texTemplate": "report.tex"{extra}
      }}"#
    ))
    .unwrap()
  }

  #[tokio::test]
  async fn runs_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    write_payload(dir.path(), "stats_alpha.bin", 2001.4);
    write_payload(dir.path(), "stats_beta.bin", 5000.9);
    let alpha = write_script(
      dir.path(),
      "alpha.sh",
      &format!("{HANDSHAKE_SH}\necho \"$@\" > args_alpha\ncp stats_alpha.bin kvbench.proto.dat"),
    );
    let beta = write_script(
      dir.path(),
      "beta.sh",
      &format!("{HANDSHAKE_SH}\necho \"$@\" > args_beta\ncp stats_beta.bin kvbench.proto.dat"),
    );
    let conf = conf(
      dir.path(),
      &format!(
        r#"{{"name": "alpha", "task": "{alpha}"}}, {{"name": "beta", "task": "{beta}", "threadNumber": 8}}"#
      ),
      "",
    );
    let archive = run(&conf, dir.path()).await.unwrap();
    let archive_name = archive.file_name().unwrap().to_str().unwrap();
    assert!(archive_name.starts_with("smoke-run-ci-"));
    assert!(archive_name.ends_with(".tar.zst"));
    assert!(archive.exists());

    let report = fs::read_to_string(dir.path().join("kvbench-report/report.tex")).unwrap();
    assert!(report.contains("smoke run by ci"));
    assert!(report.contains("alpha: 2,001"));
    assert!(report.contains("beta: 5,000"));
    assert!(report.contains("throughput.png"));
    for png in [
      "average_latency.png",
      "max_latency.png",
      "throughput.png",
      "phase_1_latency.png",
      "phase_2_latency.png",
    ] {
      assert!(
        dir.path().join("kvbench-report").join(png).exists(),
        "{png} missing"
      );
    }
    assert_eq!(
      fs::read_to_string(dir.path().join("args_alpha")).unwrap(),
      "LOAD 1000000 GET 500 -thread 2\n"
    );
    assert_eq!(
      fs::read_to_string(dir.path().join("args_beta")).unwrap(),
      "LOAD 1000000 GET 500 -thread 8\n"
    );
  }

  #[tokio::test]
  async fn handshake_failure_aborts_before_any_benchmark() {
    let dir = tempfile::tempdir().unwrap();
    write_payload(dir.path(), "stats.bin", 900.0);
    let good = write_script(
      dir.path(),
      "good.sh",
      &format!("{HANDSHAKE_SH}\necho ran > args_good\ncp stats.bin kvbench.proto.dat"),
    );
    let bad = write_script(dir.path(), "bad.sh", r#"echo "NO""#);
    let conf = conf(
      dir.path(),
      &format!(r#"{{"name": "good", "task": "{good}"}}, {{"name": "bad", "task": "{bad}"}}"#),
      "",
    );
    let err = run(&conf, dir.path()).await.unwrap_err();
    assert!(matches!(err, RunError::Handshake { ref bench, .. } if bench == "bad"));
    assert!(!dir.path().join("args_good").exists());
    assert!(!dir.path().join("kvbench-report").exists());
  }

  #[tokio::test]
  async fn missing_template_fails_before_handshake() {
    let dir = tempfile::tempdir().unwrap();
    let body = "if [ \"$1\" = \"are-you-kvbench\" ]; then echo probed >> handshakes; echo \"YES!\"; exit 0; fi";
    let task = write_script(dir.path(), "probe.sh", body);
    let mut conf = conf(
      dir.path(),
      &format!(r#"{{"name": "probe", "task": "{task}"}}"#),
      "",
    );
    conf.tex_template = "does-not-exist.tex".into();
    let err = run(&conf, dir.path()).await.unwrap_err();
    assert!(matches!(err, RunError::Report(ReportError::Template { .. })));
    assert!(!dir.path().join("handshakes").exists());
  }

  #[tokio::test]
  async fn failed_run_leaves_no_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let task = write_script(dir.path(), "broken.sh", &format!("{HANDSHAKE_SH}\nexit 1"));
    let conf = conf(
      dir.path(),
      &format!(r#"{{"name": "broken", "task": "{task}"}}"#),
      r#", "tryTimes": 1"#,
    );
    let err = run(&conf, dir.path()).await.unwrap_err();
    assert!(matches!(err, RunError::Execution { attempts: 1, .. }));
    assert!(!dir.path().join("kvbench-report").exists());
    let archives: Vec<_> = fs::read_dir(dir.path())
      .unwrap()
      .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
      .filter(|n| n.ends_with(".tar.zst"))
      .collect();
    assert!(archives.is_empty());
  }
}
