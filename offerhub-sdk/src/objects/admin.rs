//! Admin API request and response types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::channel::UnknownName;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Independently schedulable pipeline stages.
#[serde(rename_all = "lowercase")]
pub enum StageName {
    Catalog,
    Suppliers,
    Compute,
    Export,
}

impl StageName {
    pub const fn as_str(self) -> &'static str {
        match self {
            StageName::Catalog => "catalog",
            StageName::Suppliers => "suppliers",
            StageName::Compute => "compute",
            StageName::Export => "export",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageName {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "catalog" => Ok(StageName::Catalog),
            "suppliers" => Ok(StageName::Suppliers),
            "compute" => Ok(StageName::Compute),
            "export" => Ok(StageName::Export),
            _ => Err(UnknownName {
                kind: "stage",
                value: s.to_string(),
            }),
        }
    }
}

/// Response of `POST /admin/run/{stage}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageQueued {
    pub queued: StageName,
}

/// One materialized file in the export directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportFileInfo {
    pub name: String,
    pub size: u64,
    /// Unix timestamp (seconds) of the last modification.
    pub modified_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
