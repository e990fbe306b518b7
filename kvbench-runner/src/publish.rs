use kvbench_types::conf::Conf;
use kvbench_types::conf::MailConf;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::Message;
use lettre::SmtpTransport;
use lettre::Transport;
use reqwest::StatusCode;
use std::error::Error;
use std::fmt::Display;
use std::io;
use std::path::Path;
use tracing::info;
use tracing::warn;

/// Pushes the finished archive to the configured endpoints. Failures are
/// logged and swallowed; results already sit on disk and a flaky endpoint
/// must not fail the run.
pub async fn publish(conf: &Conf, archive_path: &Path) {
  let mut link = archive_path
    .file_name()
    .map(|n| n.to_string_lossy().to_string())
    .unwrap_or_default();
  if let Some(url) = &conf.upload_url {
    match upload(url, archive_path).await {
      Ok(remote) => {
        info!(link = %remote, "archive uploaded");
        if !remote.is_empty() {
          link = remote;
        };
      }
      Err(e) => warn!("upload failed, continuing: {e}"),
    };
  };
  if conf.mail.as_ref().is_some_and(|m| m.enable) {
    if let Err(e) = send_mail(conf, &link) {
      warn!("cannot send report mail: {e}");
    };
  };
}

async fn upload(url: &str, path: &Path) -> Result<String, PublishError> {
  let data = tokio::fs::read(path)
    .await
    .map_err(PublishError::ArchiveRead)?;
  let response = reqwest::Client::new()
    .post(url)
    .body(data)
    .send()
    .await
    .map_err(PublishError::UploadRequest)?;
  let status = response.status();
  let body = response.text().await.map_err(PublishError::UploadRequest)?;
  classify_response(status, body)
}

/// The endpoint reports failure either through the status code or through an
/// "error" marker in an otherwise-OK body. A clean body is the share link.
fn classify_response(status: StatusCode, body: String) -> Result<String, PublishError> {
  if !status.is_success() {
    return Err(PublishError::UploadStatus { status, body });
  };
  if body.to_lowercase().contains("error") {
    return Err(PublishError::UploadRejected { body });
  };
  Ok(body.trim().to_string())
}

fn send_mail(conf: &Conf, link: &str) -> Result<(), PublishError> {
  let Some(mail) = &conf.mail else {
    return Ok(());
  };
  let relay = conf.smtp_relay().ok_or_else(|| PublishError::MailRelay {
    sender: mail.sender.clone(),
  })?;
  let message = build_message(conf, mail, link)?;
  let transport = SmtpTransport::relay(&relay)
    .map_err(PublishError::MailTransport)?
    .credentials(Credentials::new(mail.sender.clone(), mail.password.clone()))
    .build();
  transport
    .send(&message)
    .map_err(PublishError::MailTransport)?;
  info!(receivers = mail.receivers.len(), "report mail sent");
  Ok(())
}

fn build_message(conf: &Conf, mail: &MailConf, link: &str) -> Result<Message, PublishError> {
  let from: Mailbox = format!("{} <{}>", mail.sender_nick_name, mail.sender)
    .parse()
    .map_err(PublishError::MailAddress)?;
  let reply_to: Mailbox = mail.reply_to.parse().map_err(PublishError::MailAddress)?;
  let mut builder = Message::builder()
    .from(from)
    .reply_to(reply_to)
    .subject(format!("kvbench report: {}", conf.name));
  for receiver in mail.receivers.iter() {
    builder = builder.to(receiver.parse().map_err(PublishError::MailAddress)?);
  }
  builder
    .body(format!(
      "Benchmark run {} by {} finished.\n\nReport: {link}\n",
      conf.name, conf.user
    ))
    .map_err(PublishError::MailBuild)
}

#[derive(Debug)]
pub enum PublishError {
  ArchiveRead(io::Error),
  MailAddress(lettre::address::AddressError),
  MailBuild(lettre::error::Error),
  MailRelay { sender: String },
  MailTransport(lettre::transport::smtp::Error),
  UploadRejected { body: String },
  UploadRequest(reqwest::Error),
  UploadStatus { status: StatusCode, body: String },
}

impl Display for PublishError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      PublishError::ArchiveRead(e) => write!(f, "cannot read archive: {e}"),
      PublishError::MailAddress(e) => write!(f, "invalid mail address: {e}"),
      PublishError::MailBuild(e) => write!(f, "cannot build mail: {e}"),
      PublishError::MailRelay { sender } => {
        write!(f, "no SMTP relay configured and none derivable from {sender}")
      }
      PublishError::MailTransport(e) => write!(f, "SMTP delivery failed: {e}"),
      PublishError::UploadRejected { body } => write!(f, "endpoint rejected the archive: {body}"),
      PublishError::UploadRequest(e) => write!(f, "upload request failed: {e}"),
      PublishError::UploadStatus { status, body } => {
        write!(f, "endpoint answered {status}: {body}")
      }
    }
  }
}

impl Error for PublishError {}
