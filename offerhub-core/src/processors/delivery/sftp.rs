use super::{IntakeConnector, IntakeSession, RenameOutcome};
use ssh2::{ErrorCode, RenameFlags, Session, Sftp};
use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const SSH_FX_NO_SUCH_FILE: i32 = 2;
const SSH_FX_FAILURE: i32 = 4;

#[derive(Debug, Clone)]
pub struct SftpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    /// Preferred over `password` when both are set.
    pub key_path: Option<PathBuf>,
    pub key_passphrase: Option<String>,
    pub password: Option<String>,
    pub connect_timeout: Duration,
    pub session_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct SftpConnector {
    config: SftpConfig,
}

impl SftpConnector {
    pub fn new(config: SftpConfig) -> Self {
        Self { config }
    }

    fn open_tcp(&self) -> io::Result<TcpStream> {
        let mut last_err = None;
        for addr in (self.config.host.as_str(), self.config.port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, self.config.connect_timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
        }))
    }

    fn authenticate(&self, session: &Session) -> io::Result<()> {
        let config = &self.config;
        if let Some(key_path) = &config.key_path {
            session.userauth_pubkey_file(
                &config.username,
                None,
                key_path,
                config.key_passphrase.as_deref(),
            )?;
        } else if let Some(password) = &config.password {
            session.userauth_password(&config.username, password)?;
        }
        if !session.authenticated() {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "no accepted credentials for intake",
            ));
        }
        Ok(())
    }
}

impl IntakeConnector for SftpConnector {
    fn describe(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    fn connect(&self) -> io::Result<Box<dyn IntakeSession>> {
        let tcp = self.open_tcp()?;
        let mut session = Session::new()?;
        session.set_tcp_stream(tcp);
        session.set_timeout(
            u32::try_from(self.config.session_timeout.as_millis()).unwrap_or(u32::MAX),
        );
        session.handshake()?;
        self.authenticate(&session)?;
        let sftp = session.sftp()?;
        debug!(host = %self.describe(), "SFTP session established");
        Ok(Box::new(SftpSession { session, sftp }))
    }
}

struct SftpSession {
    session: Session,
    sftp: Sftp,
}

impl IntakeSession for SftpSession {
    fn put(&mut self, local: &Path, remote: &str) -> io::Result<()> {
        let mut source = std::fs::File::open(local)?;
        let mut target = self.sftp.create(Path::new(remote))?;
        io::copy(&mut source, &mut target)?;
        Ok(())
    }

    fn rename(&mut self, from: &str, to: &str) -> io::Result<RenameOutcome> {
        let flags = RenameFlags::OVERWRITE | RenameFlags::ATOMIC | RenameFlags::NATIVE;
        match self.sftp.rename(Path::new(from), Path::new(to), Some(flags)) {
            Ok(()) => Ok(RenameOutcome::Renamed),
            // SFTPv3 servers answer a rename over an existing file this way.
            Err(e) if matches!(e.code(), ErrorCode::SFTP(SSH_FX_FAILURE)) => {
                Ok(RenameOutcome::Refused)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&mut self, path: &str) -> io::Result<bool> {
        match self.sftp.stat(Path::new(path)) {
            Ok(_) => Ok(true),
            Err(e) if matches!(e.code(), ErrorCode::SFTP(SSH_FX_NO_SUCH_FILE)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn remove(&mut self, path: &str) -> io::Result<()> {
        self.sftp.unlink(Path::new(path))?;
        Ok(())
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        let SftpSession { session, sftp } = *self;
        drop(sftp);
        session.disconnect(None, "delivery finished", None)?;
        Ok(())
    }
}
