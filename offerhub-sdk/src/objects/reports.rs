//! Summaries returned by each pipeline stage.
//!
//! These are what the orchestrator logs and what the admin API hands back,
//! so they serialize with camelCase keys to match the export headers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::channel::{Channel, RequiredField};

/// A data-incomplete variant found during the compute stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationEntry {
    pub provider_key: String,
    pub missing_fields: Vec<RequiredField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeSummary {
    pub run_id: Uuid,
    pub channel: Channel,
    /// Number of variants evaluated (one channel offer written per variant).
    pub evaluated: usize,
    pub published: usize,
    pub validations: Vec<ValidationEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSummary {
    pub channel: Channel,
    pub price_rows: usize,
    pub master_rows: usize,
    pub validation_rows: usize,
    /// Artifact file names in delivery order.
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReport {
    pub host: String,
    pub uploaded: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSummary {
    pub adapter: String,
    pub rows: usize,
    pub upserted: u64,
    pub unmapped: usize,
}
