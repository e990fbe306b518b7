use bytesize::ByteSize;
use procfs::Current;
use serde::Serialize;
use std::env::consts;
use std::ffi::CString;
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::process::Command;
use tracing::debug;

const UNKNOWN: &str = "unknown";

/// Snapshot of the machine a run executed on, embedded in the report so
/// numbers stay interpretable long after the host is gone.
#[derive(Clone, Debug, Serialize)]
pub struct HostInfo {
  pub cpu_model: String,
  pub cpu_cores: usize,
  pub memory_total: String,
  pub os: String,
  pub kernel: String,
  pub disk_total: Option<String>,
}

impl HostInfo {
  /// Collects whatever the host exposes. Probing never fails; unreadable
  /// fields degrade to placeholders.
  pub fn probe(base_dir: &Path, include_disk: bool) -> HostInfo {
    let (cpu_model, cpu_cores) = cpu_info();
    HostInfo {
      cpu_model,
      cpu_cores,
      memory_total: memory_total(),
      os: os_pretty_name(),
      kernel: run_cmd("uname", &["-r"]).unwrap_or_else(|| UNKNOWN.to_string()),
      disk_total: if include_disk {
        disk_total_bytes(base_dir).map(|b| ByteSize::b(b).to_string())
      } else {
        None
      },
    }
  }
}

fn cpu_info() -> (String, usize) {
  match procfs::CpuInfo::current() {
    Ok(info) => {
      let model = info.model_name(0).unwrap_or(UNKNOWN).to_string();
      (model, info.num_cores())
    }
    Err(e) => {
      debug!("cannot read /proc/cpuinfo: {e}");
      (UNKNOWN.to_string(), 0)
    }
  }
}

fn memory_total() -> String {
  match procfs::Meminfo::current() {
    Ok(info) => ByteSize::b(info.mem_total).to_string(),
    Err(e) => {
      debug!("cannot read /proc/meminfo: {e}");
      UNKNOWN.to_string()
    }
  }
}

fn os_pretty_name() -> String {
  if let Ok(raw) = fs::read_to_string("/etc/os-release") {
    for line in raw.lines() {
      if let Some(value) = line.strip_prefix("PRETTY_NAME=") {
        return value.trim_matches('"').to_string();
      };
    }
  };
  consts::OS.to_string()
}

fn run_cmd(program: &str, args: &[&str]) -> Option<String> {
  let output = Command::new(program).args(args).output().ok()?;
  if !output.status.success() {
    return None;
  };
  let text = String::from_utf8(output.stdout).ok()?;
  let text = text.trim();
  if text.is_empty() {
    return None;
  };
  Some(text.to_string())
}

/// Capacity of the filesystem holding `dir`, where benchmarks keep their
/// data.
fn disk_total_bytes(dir: &Path) -> Option<u64> {
  let path = CString::new(dir.as_os_str().as_bytes()).ok()?;
  let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
  let rc = unsafe { libc::statvfs(path.as_ptr(), &mut stat) };
  if rc != 0 {
    debug!(dir = %dir.display(), "statvfs failed");
    return None;
  };
  Some(stat.f_blocks as u64 * stat.f_frsize as u64)
}

#[cfg(test)]
mod tests {
  use crate::host::run_cmd;
  use crate::host::HostInfo;
  use std::path::Path;

  #[test]
  fn run_cmd_captures_stdout() {
    assert_eq!(run_cmd("echo", &["hello"]), Some("hello".to_string()));
  }

  #[test]
  fn run_cmd_rejects_failures() {
    assert_eq!(run_cmd("false", &[]), None);
    assert_eq!(run_cmd("kvbench-no-such-binary", &[]), None);
  }

  #[test]
  fn probe_never_fails() {
    let info = HostInfo::probe(Path::new("."), false);
    assert!(info.disk_total.is_none());
    let with_disk = HostInfo::probe(Path::new("."), true);
    assert!(with_disk.disk_total.is_some());
    assert_eq!(with_disk.cpu_cores, info.cpu_cores);
  }
}
