//! TOML file configuration structures.
//!
//! These structs directly map to the `offerhub.toml` file format. Every
//! section except `[server]` may be omitted.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub exports: ExportsConfig,
    pub sftp: Option<SftpConfig>,
    pub shopify: Option<ShopifyConfig>,
    pub suppliers: Option<SuppliersConfig>,
    pub supplier1: Option<Supplier1Config>,
    pub goldensneakers: Option<GoldenSneakersConfig>,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    /// Source name to priority rank. Replaces the built-in table when present.
    pub priority: Option<BTreeMap<String, u32>>,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportsConfig {
    /// Directory the export artifacts and unmapped-row reports are written to.
    #[serde(default = "default_export_dir")]
    pub dir: PathBuf,
    /// Deliver into this local directory when no `[sftp]` section is given.
    pub local_intake_dir: Option<PathBuf>,
}

impl Default for ExportsConfig {
    fn default() -> Self {
        Self {
            dir: default_export_dir(),
            local_intake_dir: None,
        }
    }
}

fn default_export_dir() -> PathBuf {
    PathBuf::from("./exports")
}

/// Channel intake reached over SFTP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SftpConfig {
    pub host: String,
    #[serde(default = "default_sftp_port")]
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    pub key_path: Option<PathBuf>,
    pub key_passphrase: Option<String>,
    #[serde(default = "default_remote_dir")]
    pub remote_dir: String,
    #[serde(default = "default_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub session_timeout_secs: u64,
}

fn default_sftp_port() -> u16 {
    22
}

fn default_remote_dir() -> String {
    "/uploads".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShopifyConfig {
    /// Shop domain, e.g. `example.myshopify.com`.
    pub shop: String,
    pub access_token: String,
    #[serde(default = "default_shopify_api_version")]
    pub api_version: String,
}

fn default_shopify_api_version() -> String {
    "2024-10".to_string()
}

/// The generic supplier CSV feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuppliersConfig {
    pub csv_path: PathBuf,
    pub mapping_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Supplier1ModeKind {
    Csv,
    Api,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Supplier1Config {
    pub mode: Supplier1ModeKind,
    pub csv_path: Option<PathBuf>,
    pub api_url: Option<String>,
    pub api_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoldenSneakersConfig {
    pub base_url: String,
    /// Runs are skipped while no token is configured.
    pub token: Option<String>,
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub markup_percentage: Decimal,
    #[serde(default)]
    pub vat_percentage: Decimal,
    #[serde(default = "default_rounding_type")]
    pub rounding_type: String,
    #[serde(default)]
    pub only_with_ean: bool,
}

fn default_rounding_type() -> String {
    "none".to_string()
}

/// Interval in seconds between scheduled runs of each stage. `0` disables
/// the schedule; the stage can still be triggered manually or by chaining.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_catalog_interval")]
    pub catalog_secs: u64,
    #[serde(default = "default_sync_interval")]
    pub suppliers_secs: u64,
    #[serde(default = "default_sync_interval")]
    pub compute_secs: u64,
    #[serde(default)]
    pub export_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            catalog_secs: default_catalog_interval(),
            suppliers_secs: default_sync_interval(),
            compute_secs: default_sync_interval(),
            export_secs: 0,
        }
    }
}

fn default_catalog_interval() -> u64 {
    24 * 60 * 60
}

fn default_sync_interval() -> u64 {
    2 * 60 * 60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            max_backoff_secs: default_max_backoff_secs(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_max_backoff_secs() -> u64 {
    300
}
