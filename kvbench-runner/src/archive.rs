use chrono::Utc;
use kvbench_types::conf::Conf;
use std::fs;
use std::fs::File;
use std::io;
use std::io::BufWriter;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use tracing::info;

const ZSTD_LEVEL: i32 = 3;

/// Packs the report directory into `<name>-<user>-<stamp>.tar.zst` inside
/// `dest_dir`. The archive appears atomically via a temp file rename.
pub fn create_archive(conf: &Conf, report_dir: &Path, dest_dir: &Path) -> io::Result<PathBuf> {
  let stamp = Utc::now().format("%Y%m%d-%H%M%S");
  let file_name = format!(
    "{}-{}-{stamp}.tar.zst",
    sanitize(&conf.name),
    sanitize(&conf.user)
  );
  let path = dest_dir.join(&file_name);
  let temp = dest_dir.join(format!("{file_name}.tmp"));
  if let Err(e) = write_archive(&temp, report_dir) {
    let _ = fs::remove_file(&temp);
    return Err(e);
  };
  fs::rename(&temp, &path)?;
  info!(archive = %path.display(), "artifacts packaged");
  Ok(path)
}

fn write_archive(temp: &Path, report_dir: &Path) -> io::Result<()> {
  let file = File::create(temp)?;
  let encoder = zstd::Encoder::new(BufWriter::new(file), ZSTD_LEVEL)?;
  let mut builder = tar::Builder::new(encoder);
  let dir_name = report_dir
    .file_name()
    .map(|n| n.to_string_lossy().to_string())
    .unwrap_or_else(|| "kvbench-report".to_string());
  let mut names: Vec<String> = Vec::new();
  for entry in fs::read_dir(report_dir)? {
    let entry = entry?;
    if entry.file_type()?.is_file() {
      names.push(entry.file_name().to_string_lossy().to_string());
    };
  }
  // Stable member order keeps archives of identical runs comparable.
  names.sort();
  for name in names {
    let data = fs::read(report_dir.join(&name))?;
    let mut header = tar::Header::new_gnu();
    header.set_path(format!("{dir_name}/{name}"))?;
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_cksum();
    builder.append(&header, data.as_slice())?;
  }
  let encoder = builder.into_inner()?;
  let mut writer = encoder.finish()?;
  writer.flush()?;
  Ok(())
}

/// Keeps archive names portable: anything outside `[A-Za-z0-9._-]` becomes a
/// dash.
fn sanitize(raw: &str) -> String {
  let cleaned: String = raw
    .trim()
    .chars()
    .map(|c| {
      if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
        c
      } else {
        '-'
      }
    })
    .collect();
  if cleaned.is_empty() {
    "kvbench".to_string()
  } else {
    cleaned
  }
}

#[cfg(test)]
mod tests {
  use crate::archive::create_archive;
  use crate::archive::sanitize;
  use kvbench_types::conf::Conf;
  use std::fs;
  use std::fs::File;

  #[test]
  fn sanitizes_archive_names() {
    assert_eq!(sanitize("RECIPE run 1"), "RECIPE-run-1");
    assert_eq!(sanitize("  perf/team  "), "perf-team");
    assert_eq!(sanitize(""), "kvbench");
  }

  #[test]
  fn packs_report_directory() {
    let dir = tempfile::tempdir().unwrap();
    let report_dir = dir.path().join("kvbench-report");
    fs::create_dir(&report_dir).unwrap();
    fs::write(report_dir.join("report.tex"), "\\documentclass{article}").unwrap();
    fs::write(report_dir.join("throughput.png"), [137, 80, 78, 71]).unwrap();
    let conf: Conf = serde_json::from_str(
      r#"{
        "name": "smoke",
        "user": "perf ci",
        "bench": [{"name": "alpha", "task": "./alpha"}],
        "phase": [{"type": "PUT", "size": 10}],
        "texTemplate": "report.tex"
      }"#,
    )
    .unwrap();
    let archive = create_archive(&conf, &report_dir, dir.path()).unwrap();
    let file_name = archive.file_name().unwrap().to_str().unwrap();
    assert!(file_name.starts_with("smoke-perf-ci-"));
    assert!(file_name.ends_with(".tar.zst"));

    let decoder = zstd::Decoder::new(File::open(&archive).unwrap()).unwrap();
    let mut tar = tar::Archive::new(decoder);
    let mut members: Vec<String> = tar
      .entries()
      .unwrap()
      .map(|e| e.unwrap().path().unwrap().to_string_lossy().to_string())
      .collect();
    members.sort();
    assert_eq!(members, vec![
      "kvbench-report/report.tex",
      "kvbench-report/throughput.png"
    ]);
  }
}
