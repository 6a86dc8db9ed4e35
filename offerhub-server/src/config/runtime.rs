//! Validated runtime configuration.
//!
//! Built from [`FileConfig`](super::file::FileConfig) by the loader; adapter
//! sections are already converted into the core's own config types.

use offerhub_core::ingest::{GoldenSneakersConfig, ShopifyConfig, Supplier1Mode};
use offerhub_core::processors::SftpConfig;
use offerhub_core::selection::SourcePriority;
use offerhub_sdk::objects::StageName;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub listen: SocketAddr,
    pub export_dir: PathBuf,
    pub intake: IntakeTarget,
    pub shopify: Option<ShopifyConfig>,
    pub suppliers: Option<SupplierCsvSettings>,
    pub supplier1: Option<Supplier1Mode>,
    pub goldensneakers: Option<GoldenSneakersConfig>,
    pub schedule: Schedule,
    pub retry: RetryPolicy,
    pub priority: SourcePriority,
}

/// Where the export stage delivers materialized files.
#[derive(Debug, Clone)]
pub enum IntakeTarget {
    Sftp { config: SftpConfig, remote_dir: String },
    LocalDir(PathBuf),
    /// Exports are only materialized.
    Disabled,
}

#[derive(Debug, Clone)]
pub struct SupplierCsvSettings {
    pub csv_path: PathBuf,
    pub mapping_path: Option<PathBuf>,
}

/// Interval between scheduled runs per stage; `None` means unscheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Schedule {
    pub catalog: Option<Duration>,
    pub suppliers: Option<Duration>,
    pub compute: Option<Duration>,
    pub export: Option<Duration>,
}

impl Schedule {
    pub fn interval(&self, stage: StageName) -> Option<Duration> {
        match stage {
            StageName::Catalog => self.catalog,
            StageName::Suppliers => self.suppliers,
            StageName::Compute => self.compute,
            StageName::Export => self.export,
        }
    }
}

/// Job-level retry settings applied by the stage workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per job, including the first one. Never zero.
    pub max_attempts: u32,
    pub max_backoff: Duration,
}
