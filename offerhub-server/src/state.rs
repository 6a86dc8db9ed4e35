//! Application state shared across all request handlers.

use offerhub_core::events::StageSenders;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Debug, Clone)]
pub struct AppState {
    /// Directory the export stage writes to; the only directory served.
    pub export_dir: Arc<PathBuf>,
    /// Request channels of the stage workers.
    pub stages: StageSenders,
}

impl AppState {
    pub fn new(export_dir: impl Into<PathBuf>, stages: StageSenders) -> Self {
        Self {
            export_dir: Arc::new(export_dir.into()),
            stages,
        }
    }

    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }
}
