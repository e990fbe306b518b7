use serde::Deserialize;
use std::error::Error;
use std::fmt::Display;
use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;

/// Workload phases understood by every benchmark executable. The wire form is
/// the uppercase name, which is also what gets passed on the command line.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum PhaseType {
  Load,
  Put,
  Get,
  Update,
  Delete,
  Scan,
}

impl Display for PhaseType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      PhaseType::Load => "LOAD",
      PhaseType::Put => "PUT",
      PhaseType::Get => "GET",
      PhaseType::Update => "UPDATE",
      PhaseType::Delete => "DELETE",
      PhaseType::Scan => "SCAN",
    };
    f.write_str(name)
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PhaseConf {
  #[serde(rename = "type")]
  pub ty: PhaseType,
  pub size: u64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BenchConf {
  pub name: String,
  /// Command line that runs the benchmark itself, before run arguments are
  /// appended. Split on whitespace.
  pub task: String,
  pub pre_task: Option<String>,
  pub after_task: Option<String>,
  /// Overrides the run-wide thread count for this benchmark only.
  pub thread_number: Option<u32>,
}

impl BenchConf {
  pub fn task_argv(&self) -> Vec<String> {
    argv(&self.task)
  }

  pub fn pre_task_argv(&self) -> Option<Vec<String>> {
    self.pre_task.as_deref().map(argv)
  }

  pub fn after_task_argv(&self) -> Option<Vec<String>> {
    self.after_task.as_deref().map(argv)
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MailConf {
  pub enable: bool,
  pub sender: String,
  pub password: String,
  pub reply_to: String,
  pub receivers: Vec<String>,
  pub sender_nick_name: String,
}

const fn default_thread_number() -> u32 {
  1
}

const fn default_show_duration() -> bool {
  true
}

fn default_proto_data() -> PathBuf {
  PathBuf::from("kvbench.proto.dat")
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Conf {
  /// Human-readable name of this run, used in the report and archive name.
  pub name: String,
  pub user: String,
  pub bench: Vec<BenchConf>,
  pub phase: Vec<PhaseConf>,
  #[serde(default = "default_thread_number")]
  pub thread_number: u32,
  /// How many times a failing benchmark is attempted before the run aborts.
  pub try_times: Option<u32>,
  /// Where each benchmark writes its statistics payload, relative to the
  /// working directory.
  #[serde(default = "default_proto_data")]
  pub proto_data: PathBuf,
  pub tex_template: PathBuf,
  #[serde(default, rename = "compileTeX")]
  pub compile_tex: bool,
  #[serde(default, rename = "generatePGF")]
  pub generate_pgf: bool,
  #[serde(default)]
  pub show_figure: bool,
  #[serde(default = "default_show_duration")]
  pub show_duration: bool,
  #[serde(default)]
  pub probe_disk_size: bool,
  #[serde(rename = "uploadURL")]
  pub upload_url: Option<String>,
  pub smtp_server: Option<String>,
  pub mail: Option<MailConf>,
}

impl Conf {
  pub fn load(path: &Path) -> Result<Conf, ConfError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let conf: Conf = serde_json::from_str(&raw).map_err(ConfError::Parse)?;
    conf.validate()?;
    Ok(conf)
  }

  pub fn validate(&self) -> Result<(), ConfError> {
    if self.name.trim().is_empty() {
      return Err(ConfError::BlankField("name"));
    };
    if self.user.trim().is_empty() {
      return Err(ConfError::BlankField("user"));
    };
    if self.bench.is_empty() {
      return Err(ConfError::NoBenchmarks);
    };
    if self.phase.is_empty() {
      return Err(ConfError::NoPhases);
    };
    if self.thread_number == 0 {
      return Err(ConfError::ZeroThreads { bench: None });
    };
    for bench in self.bench.iter() {
      if bench.name.trim().is_empty() {
        return Err(ConfError::BlankField("bench.name"));
      };
      if bench.task_argv().is_empty() {
        return Err(ConfError::EmptyCommand {
          bench: bench.name.clone(),
          stage: "task",
        });
      };
      if bench.pre_task_argv().is_some_and(|argv| argv.is_empty()) {
        return Err(ConfError::EmptyCommand {
          bench: bench.name.clone(),
          stage: "preTask",
        });
      };
      if bench.after_task_argv().is_some_and(|argv| argv.is_empty()) {
        return Err(ConfError::EmptyCommand {
          bench: bench.name.clone(),
          stage: "afterTask",
        });
      };
      if bench.thread_number == Some(0) {
        return Err(ConfError::ZeroThreads {
          bench: Some(bench.name.clone()),
        });
      };
    }
    Ok(())
  }

  /// Upper bound on attempts per benchmark. A configured value is honoured
  /// exactly, clamped to at least one; five attempts otherwise.
  pub fn attempts(&self) -> u32 {
    self.try_times.map_or(5, |t| t.max(1))
  }

  pub fn threads_for(&self, bench: &BenchConf) -> u32 {
    bench.thread_number.unwrap_or(self.thread_number)
  }

  /// SMTP relay host to submit mail through. Falls back to `smtp.<domain>`
  /// derived from the sender address when none is configured.
  pub fn smtp_relay(&self) -> Option<String> {
    if let Some(server) = &self.smtp_server {
      return Some(server.clone());
    };
    let mail = self.mail.as_ref()?;
    let (_, domain) = mail.sender.split_once('@')?;
    if domain.is_empty() {
      return None;
    };
    Some(format!("smtp.{domain}"))
  }
}

/// Splits a configured command line into argv tokens. Quoting is not
/// supported; any run of whitespace separates tokens.
pub fn argv(raw: &str) -> Vec<String> {
  raw.split_whitespace().map(|t| t.to_string()).collect()
}

#[derive(Debug)]
pub enum ConfError {
  BlankField(&'static str),
  EmptyCommand { bench: String, stage: &'static str },
  NoBenchmarks,
  NoPhases,
  Parse(serde_json::Error),
  Read { path: PathBuf, source: io::Error },
  ZeroThreads { bench: Option<String> },
}

impl Display for ConfError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ConfError::BlankField(field) => write!(f, "{field} must not be blank"),
      ConfError::EmptyCommand { bench, stage } => {
        write!(f, "benchmark {bench} has an empty {stage} command")
      }
      ConfError::NoBenchmarks => write!(f, "at least one benchmark is required"),
      ConfError::NoPhases => write!(f, "at least one phase is required"),
      ConfError::Parse(e) => write!(f, "invalid JSON: {e}"),
      ConfError::Read { path, source } => write!(f, "cannot read {}: {}", path.display(), source),
      ConfError::ZeroThreads { bench } => match bench {
        Some(bench) => write!(f, "benchmark {bench} requests zero threads"),
        None => write!(f, "threadNumber must be at least one"),
      },
    }
  }
}

impl Error for ConfError {}
