use super::{IntakeConnector, IntakeSession, RenameOutcome};
use std::io;
use std::path::{Path, PathBuf};

/// An intake backed by a local directory. Remote paths resolve below `root`.
#[derive(Debug, Clone)]
pub struct LocalDirConnector {
    root: PathBuf,
}

impl LocalDirConnector {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

struct LocalDirSession {
    root: PathBuf,
}

impl LocalDirSession {
    fn resolve(&self, remote: &str) -> PathBuf {
        self.root.join(remote.trim_start_matches('/'))
    }
}

impl IntakeConnector for LocalDirConnector {
    fn describe(&self) -> String {
        format!("local:{}", self.root.display())
    }

    fn connect(&self) -> io::Result<Box<dyn IntakeSession>> {
        std::fs::create_dir_all(&self.root)?;
        Ok(Box::new(LocalDirSession {
            root: self.root.clone(),
        }))
    }
}

impl IntakeSession for LocalDirSession {
    fn put(&mut self, local: &Path, remote: &str) -> io::Result<()> {
        let target = self.resolve(remote);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(local, target)?;
        Ok(())
    }

    fn rename(&mut self, from: &str, to: &str) -> io::Result<RenameOutcome> {
        std::fs::rename(self.resolve(from), self.resolve(to))?;
        Ok(RenameOutcome::Renamed)
    }

    fn exists(&mut self, path: &str) -> io::Result<bool> {
        self.resolve(path).try_exists()
    }

    fn remove(&mut self, path: &str) -> io::Result<()> {
        std::fs::remove_file(self.resolve(path))
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        Ok(())
    }
}
