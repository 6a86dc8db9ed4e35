//! Configuration module for offerhub-server.
//!
//! Handles loading configuration from TOML files, CLI arguments,
//! and environment variables.

pub mod file;
pub mod runtime;

use crate::config::file::{FileConfig, Supplier1ModeKind};
use crate::config::runtime::{
    IntakeTarget, RetryPolicy, RuntimeConfig, Schedule, SupplierCsvSettings,
};
use offerhub_core::ingest::{GoldenSneakersConfig, ShopifyConfig, Supplier1Mode};
use offerhub_core::processors::SftpConfig;
use offerhub_core::selection::SourcePriority;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Read the TOML file, apply CLI overrides and validate.
    pub fn load(&self) -> Result<RuntimeConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        self.load_str(&config_content)
    }

    fn load_str(&self, content: &str) -> Result<RuntimeConfig, ConfigError> {
        let mut file_config: FileConfig = toml::from_str(content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        build_runtime_config(file_config)
    }
}

fn build_runtime_config(file: FileConfig) -> Result<RuntimeConfig, ConfigError> {
    let intake = match (file.sftp, file.exports.local_intake_dir) {
        (Some(sftp), _) => {
            if sftp.key_path.is_none() && sftp.password.is_none() {
                return Err(ConfigError::ValidationError(
                    "sftp requires either key_path or password".to_string(),
                ));
            }
            IntakeTarget::Sftp {
                config: SftpConfig {
                    host: sftp.host,
                    port: sftp.port,
                    username: sftp.username,
                    key_path: sftp.key_path,
                    key_passphrase: sftp.key_passphrase,
                    password: sftp.password,
                    connect_timeout: Duration::from_secs(sftp.connect_timeout_secs),
                    session_timeout: Duration::from_secs(sftp.session_timeout_secs),
                },
                remote_dir: sftp.remote_dir,
            }
        }
        (None, Some(dir)) => IntakeTarget::LocalDir(dir),
        (None, None) => IntakeTarget::Disabled,
    };

    let supplier1 = file
        .supplier1
        .map(|s| match s.mode {
            Supplier1ModeKind::Csv => s
                .csv_path
                .map(|path| Supplier1Mode::Csv { path })
                .ok_or_else(|| {
                    ConfigError::ValidationError(
                        "supplier1 csv mode requires csv_path".to_string(),
                    )
                }),
            Supplier1ModeKind::Api => {
                let url = s
                    .api_url
                    .filter(|u| !u.trim().is_empty())
                    .ok_or_else(|| {
                        ConfigError::ValidationError(
                            "supplier1 api mode requires api_url".to_string(),
                        )
                    })?;
                Ok(Supplier1Mode::Api {
                    url: parse_url("supplier1.api_url", &url)?,
                    token: s.api_token,
                })
            }
        })
        .transpose()?;

    let goldensneakers = file
        .goldensneakers
        .map(|g| {
            Ok::<_, ConfigError>(GoldenSneakersConfig {
                base_url: parse_url("goldensneakers.base_url", &g.base_url)?,
                token: g.token,
                search: g.search,
                markup_percentage: g.markup_percentage,
                vat_percentage: g.vat_percentage,
                rounding_type: g.rounding_type,
                only_with_ean: g.only_with_ean,
            })
        })
        .transpose()?;

    if file.jobs.max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "jobs.max_attempts must be at least 1".to_string(),
        ));
    }

    let priority = match file.priority {
        Some(ranks) => SourcePriority::from_ranks(ranks),
        None => SourcePriority::default(),
    };

    Ok(RuntimeConfig {
        listen: file.server.listen,
        export_dir: file.exports.dir,
        intake,
        shopify: file.shopify.map(|s| ShopifyConfig {
            shop: s.shop,
            access_token: s.access_token,
            api_version: s.api_version,
        }),
        suppliers: file.suppliers.map(|s| SupplierCsvSettings {
            csv_path: s.csv_path,
            mapping_path: s.mapping_path,
        }),
        supplier1,
        goldensneakers,
        schedule: Schedule {
            catalog: interval(file.schedule.catalog_secs),
            suppliers: interval(file.schedule.suppliers_secs),
            compute: interval(file.schedule.compute_secs),
            export: interval(file.schedule.export_secs),
        },
        retry: RetryPolicy {
            max_attempts: file.jobs.max_attempts,
            max_backoff: Duration::from_secs(file.jobs.max_backoff_secs),
        },
        priority,
    })
}

fn interval(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn parse_url(field: &str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value.trim())
        .map_err(|e| ConfigError::ValidationError(format!("{field} is not a valid URL: {e}")))
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loader() -> ConfigLoader {
        ConfigLoader::new("offerhub.toml", None)
    }

    #[test]
    fn sftp_without_credentials_is_rejected() {
        let err = loader()
            .load_str("[server]\n[sftp]\nhost = \"sftp.example\"\nusername = \"galaxus\"\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(msg) if msg.contains("sftp")));
    }

    #[test]
    fn sftp_with_password_builds_intake() {
        let config = loader()
            .load_str(
                "[server]\n[sftp]\nhost = \"sftp.example\"\nusername = \"galaxus\"\npassword = \"pw\"\n",
            )
            .unwrap();
        match config.intake {
            IntakeTarget::Sftp { config, remote_dir } => {
                assert_eq!(config.host, "sftp.example");
                assert_eq!(config.connect_timeout, Duration::from_secs(30));
                assert_eq!(remote_dir, "/uploads");
            }
            other => panic!("unexpected intake {other:?}"),
        }
    }

    #[test]
    fn supplier1_api_mode_requires_url() {
        let err = loader()
            .load_str("[server]\n[supplier1]\nmode = \"api\"\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(msg) if msg.contains("api_url")));
    }

    #[test]
    fn supplier1_api_mode_parses_url() {
        let config = loader()
            .load_str(
                "[server]\n[supplier1]\nmode = \"api\"\napi_url = \"https://supplier1.example.test/offers\"\n",
            )
            .unwrap();
        match config.supplier1 {
            Some(Supplier1Mode::Api { url, token }) => {
                assert_eq!(url.host_str(), Some("supplier1.example.test"));
                assert!(token.is_none());
            }
            other => panic!("unexpected mode {other:?}"),
        }
    }

    #[test]
    fn zero_interval_disables_schedule() {
        let config = loader()
            .load_str("[server]\n[schedule]\ncatalog_secs = 0\nsuppliers_secs = 60\n")
            .unwrap();
        assert_eq!(config.schedule.catalog, None);
        assert_eq!(config.schedule.suppliers, Some(Duration::from_secs(60)));
        assert_eq!(config.schedule.export, None);
    }

    #[test]
    fn priority_table_replaces_defaults() {
        let config = loader()
            .load_str("[server]\n[priority]\nWarehouse = 1\n")
            .unwrap();
        assert_eq!(config.priority.rank("warehouse"), 1);
        assert_eq!(config.priority.rank("own_stock"), 99);

        let defaults = loader().load_str("[server]\n").unwrap();
        assert_eq!(defaults.priority.rank("own_stock"), 1);
    }

    #[test]
    fn listen_override_wins() {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let config = ConfigLoader::new("offerhub.toml", Some(addr))
            .load_str("[server]\nlisten = \"0.0.0.0:8080\"\n")
            .unwrap();
        assert_eq!(config.listen, addr);
    }
}
