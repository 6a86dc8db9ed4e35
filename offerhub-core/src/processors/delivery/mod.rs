//! Delivery of materialized exports to a remote intake.
//!
//! Each file is uploaded to `<name>.tmp` and then renamed to its final name,
//! so the intake never observes a partially written file. The first failure
//! aborts the remaining files; files already renamed stay delivered. The
//! session is closed on every exit path.
//!
//! Intakes that refuse to rename over an existing file get the old file moved
//! to `<name>.prev` first. It is restored if the new file cannot be renamed
//! into place and removed once it is.

pub mod local_dir;
pub mod sftp;

use kanau::processor::Processor;
use offerhub_sdk::objects::DeliveryReport;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

pub use local_dir::LocalDirConnector;
pub use sftp::{SftpConfig, SftpConnector};

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("failed to connect to {host}: {source}")]
    Connect {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to upload {file} to {host}: {source}")]
    Upload {
        file: String,
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to rename {file} on {host}: {source}")]
    Rename {
        file: String,
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("delivery task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Opens sessions against a remote file intake.
///
/// Implementations are blocking; the agent drives them on the blocking pool.
pub trait IntakeConnector: Send + Sync {
    /// Human-readable endpoint, used in logs and reports.
    fn describe(&self) -> String;

    fn connect(&self) -> io::Result<Box<dyn IntakeSession>>;
}

/// Result of a rename the intake did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameOutcome {
    Renamed,
    /// The intake reported a generic failure, typically because `to` exists
    /// and it cannot replace files.
    Refused,
}

/// One open connection to the intake.
pub trait IntakeSession: Send {
    /// Upload the local file to `remote`, replacing any existing file.
    fn put(&mut self, local: &Path, remote: &str) -> io::Result<()>;

    /// Move `from` to `to`, atomically replacing `to` where the intake allows.
    fn rename(&mut self, from: &str, to: &str) -> io::Result<RenameOutcome>;

    fn exists(&mut self, path: &str) -> io::Result<bool>;

    fn remove(&mut self, path: &str) -> io::Result<()>;

    fn close(self: Box<Self>) -> io::Result<()>;
}

fn renamed(outcome: RenameOutcome, from: &str, to: &str) -> io::Result<()> {
    match outcome {
        RenameOutcome::Renamed => Ok(()),
        RenameOutcome::Refused => Err(io::Error::other(format!(
            "intake refused to rename {from} to {to}"
        ))),
    }
}

/// Move the uploaded `temp` file over `target`.
///
/// A refused rename is only worked around when both files exist; the old
/// target is then kept at `<target>.prev` until the new file is in place.
pub fn replace_remote(
    session: &mut dyn IntakeSession,
    temp: &str,
    target: &str,
) -> io::Result<()> {
    let outcome = session.rename(temp, target)?;
    if outcome == RenameOutcome::Renamed {
        return Ok(());
    }
    if !session.exists(temp)? || !session.exists(target)? {
        return renamed(outcome, temp, target);
    }

    let backup = format!("{target}.prev");
    if session.exists(&backup)? {
        session.remove(&backup)?;
    }
    renamed(session.rename(target, &backup)?, target, &backup)?;

    match session
        .rename(temp, target)
        .and_then(|outcome| renamed(outcome, temp, target))
    {
        Ok(()) => {
            if let Err(e) = session.remove(&backup) {
                warn!(file = %backup, error = %e, "Failed to remove replaced file");
            }
            Ok(())
        }
        Err(e) => {
            if let Err(restore) = session
                .rename(&backup, target)
                .and_then(|outcome| renamed(outcome, &backup, target))
            {
                error!(file = %target, error = %restore, "Failed to restore replaced file");
            }
            Err(e)
        }
    }
}

/// Join a remote directory and a file name with `/`.
pub fn remote_path(remote_dir: &str, name: &str) -> String {
    let dir = remote_dir.trim_end_matches('/');
    if dir.is_empty() && !remote_dir.starts_with('/') {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

#[derive(Debug, Clone)]
/// Upload `files` from the export directory, in order.
pub struct DeliverFiles {
    pub files: Vec<String>,
}

#[derive(Clone)]
pub struct DeliveryAgent {
    connector: Arc<dyn IntakeConnector>,
    export_dir: PathBuf,
    remote_dir: String,
}

impl std::fmt::Debug for DeliveryAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryAgent")
            .field("intake", &self.connector.describe())
            .field("export_dir", &self.export_dir)
            .field("remote_dir", &self.remote_dir)
            .finish()
    }
}

impl DeliveryAgent {
    pub fn new(
        connector: Arc<dyn IntakeConnector>,
        export_dir: impl Into<PathBuf>,
        remote_dir: impl Into<String>,
    ) -> Self {
        Self {
            connector,
            export_dir: export_dir.into(),
            remote_dir: remote_dir.into(),
        }
    }
}

fn upload_all(
    session: &mut dyn IntakeSession,
    host: &str,
    export_dir: &Path,
    remote_dir: &str,
    files: &[String],
) -> Result<usize, DeliveryError> {
    let mut uploaded = 0;
    for file in files {
        let local = export_dir.join(file);
        let remote_temp = remote_path(remote_dir, &format!("{file}.tmp"));
        let remote_final = remote_path(remote_dir, file);

        info!(file = %file, host = %host, "Uploading export");
        session
            .put(&local, &remote_temp)
            .map_err(|source| DeliveryError::Upload {
                file: file.clone(),
                host: host.to_string(),
                source,
            })?;
        replace_remote(session, &remote_temp, &remote_final)
            .map_err(|source| DeliveryError::Rename {
                file: file.clone(),
                host: host.to_string(),
                source,
            })?;
        uploaded += 1;
    }
    Ok(uploaded)
}

/// Blocking delivery of `files`; the session is released before returning.
pub fn deliver_blocking(
    connector: &dyn IntakeConnector,
    export_dir: &Path,
    remote_dir: &str,
    files: &[String],
) -> Result<DeliveryReport, DeliveryError> {
    let host = connector.describe();
    let mut session = connector.connect().map_err(|source| DeliveryError::Connect {
        host: host.clone(),
        source,
    })?;

    let result = upload_all(session.as_mut(), &host, export_dir, remote_dir, files);

    if let Err(e) = session.close() {
        warn!(host = %host, error = %e, "Failed to close intake session");
    }

    match result {
        Ok(uploaded) => Ok(DeliveryReport { host, uploaded }),
        Err(e) => {
            error!(host = %host, error = %e, "Delivery failed");
            Err(e)
        }
    }
}

impl Processor<DeliverFiles> for DeliveryAgent {
    type Output = DeliveryReport;
    type Error = DeliveryError;

    #[tracing::instrument(skip_all, err, fields(files = cmd.files.len()))]
    async fn process(&self, cmd: DeliverFiles) -> Result<DeliveryReport, DeliveryError> {
        let connector = self.connector.clone();
        let export_dir = self.export_dir.clone();
        let remote_dir = self.remote_dir.clone();

        let report = tokio::task::spawn_blocking(move || {
            deliver_blocking(connector.as_ref(), &export_dir, &remote_dir, &cmd.files)
        })
        .await??;

        info!(host = %report.host, uploaded = report.uploaded, "Delivery complete");
        Ok(report)
    }
}
