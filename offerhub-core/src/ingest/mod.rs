//! Ingestion adapters feeding the offer and master-data stores.
//!
//! Supplier adapters normalize their rows into offers, resolving
//! supplier-local SKUs to provider keys. Rows that cannot be resolved or
//! carry a malformed cost are collected and written to
//! `unmapped_<adapter>_rows.csv` in the export directory instead of being
//! dropped.

pub mod golden_sneakers;
pub mod shopify;
pub mod supplier1;
pub mod supplier_csv;

use crate::entities::offer::{OfferUpsert, UpsertOffers};
use crate::framework::Store;
use crate::utils::csv_text::render_table;
use async_trait::async_trait;
use kanau::processor::Processor;
use offerhub_sdk::objects::IngestSummary;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

pub use golden_sneakers::{GoldenSneakersConfig, GoldenSneakersFeed};
pub use shopify::{ShopifyCatalogFeed, ShopifyConfig};
pub use supplier_csv::SupplierCsvFeed;
pub use supplier1::{Supplier1Feed, Supplier1Mode};

pub const DEFAULT_CURRENCY: &str = "CHF";

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{adapter} responded with status {status}: {body}")]
    Status {
        adapter: &'static str,
        status: u16,
        body: String,
    },

    #[error("response parsing error: {0}")]
    Parse(String),

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

/// A source of offers or master data, run by the ingestion stages.
#[async_trait]
pub trait FeedAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn ingest(&self) -> Result<IngestSummary, IngestError>;
}

/// HTTP client shared by the API adapters.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// One supplier row as delivered, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SupplierRow {
    pub provider_key: Option<String>,
    pub supplier_sku: Option<String>,
    pub stock_qty: Option<String>,
    pub cost: Option<String>,
    pub currency: Option<String>,
    pub lead_time_days: Option<String>,
    pub source: Option<String>,
}

pub(crate) fn json_text(value: Option<&serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

impl SupplierRow {
    /// Read a row from a JSON object; numbers are kept as their literal text.
    pub fn from_json(value: &serde_json::Value) -> Self {
        let field = |name: &str| json_text(value.get(name));
        Self {
            provider_key: field("providerKey"),
            supplier_sku: field("supplierSku"),
            stock_qty: field("stockQty"),
            cost: field("cost"),
            currency: field("currency"),
            lead_time_days: field("leadTimeDays"),
            source: field("source"),
        }
    }

    pub fn provider_key(&self) -> Option<&str> {
        non_blank(self.provider_key.as_deref())
    }

    pub fn supplier_sku(&self) -> Option<&str> {
        non_blank(self.supplier_sku.as_deref())
    }
}

/// `None` for absent or whitespace-only text, the trimmed text otherwise.
pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

pub(crate) fn parse_number(value: &str) -> Option<Decimal> {
    let value = value.trim();
    Decimal::from_str(value)
        .or_else(|_| Decimal::from_scientific(value))
        .ok()
}

/// Stock as a non-negative integer. Missing or unparsable values become 0.
pub fn normalize_stock(value: Option<&str>) -> i32 {
    non_blank(value)
        .and_then(parse_number)
        .and_then(|n| n.trunc().to_i64())
        .map(|n| n.clamp(0, i64::from(i32::MAX)) as i32)
        .unwrap_or(0)
}

/// Lead time in days, or `None` when absent, unparsable or negative.
pub fn normalize_lead_time(value: Option<&str>) -> Option<i32> {
    non_blank(value)
        .and_then(parse_number)
        .and_then(|n| n.trunc().to_i32())
        .filter(|n| *n >= 0)
}

/// Cost as an exact decimal. A missing cost is zero; a malformed one is an
/// error so the row can be reported.
pub fn parse_cost(value: Option<&str>) -> Result<Decimal, String> {
    match non_blank(value) {
        None => Ok(Decimal::ZERO),
        Some(text) => parse_number(text).ok_or_else(|| text.to_string()),
    }
}

pub fn normalize_currency(value: Option<&str>) -> String {
    non_blank(value).unwrap_or(DEFAULT_CURRENCY).to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmappedReason {
    MissingProviderKey,
    InvalidCost,
}

impl UnmappedReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            UnmappedReason::MissingProviderKey => "missing_provider_key",
            UnmappedReason::InvalidCost => "invalid_cost",
        }
    }
}

/// A supplier row that was not turned into an offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmappedRow {
    pub row: SupplierRow,
    pub reason: UnmappedReason,
}

pub const UNMAPPED_HEADERS: [&str; 7] = [
    "providerKey",
    "supplierSku",
    "stockQty",
    "cost",
    "currency",
    "leadTimeDays",
    "reason",
];

pub fn unmapped_file_name(adapter: &str) -> String {
    format!("unmapped_{adapter}_rows.csv")
}

/// Write the unmapped-row report for `adapter`, header-only when empty.
pub async fn write_unmapped(
    export_dir: &Path,
    adapter: &str,
    rows: &[UnmappedRow],
) -> Result<PathBuf, IngestError> {
    let records: Vec<[String; 7]> = rows
        .iter()
        .map(|u| {
            let text = |v: &Option<String>| v.as_deref().map(str::trim).unwrap_or_default().to_string();
            [
                text(&u.row.provider_key),
                text(&u.row.supplier_sku),
                text(&u.row.stock_qty),
                text(&u.row.cost),
                text(&u.row.currency),
                text(&u.row.lead_time_days),
                u.reason.as_str().to_string(),
            ]
        })
        .collect();
    let body = render_table(&UNMAPPED_HEADERS, &records)?;

    tokio::fs::create_dir_all(export_dir)
        .await
        .map_err(|source| IngestError::Io {
            path: export_dir.to_path_buf(),
            source,
        })?;
    let path = export_dir.join(unmapped_file_name(adapter));
    tokio::fs::write(&path, body)
        .await
        .map_err(|source| IngestError::Io {
            path: path.clone(),
            source,
        })?;
    Ok(path)
}

/// Turn a row with a resolved provider key into an offer.
pub fn build_offer(
    row: &SupplierRow,
    provider_key: &str,
    source_id: i64,
    raw_json: serde_json::Value,
) -> Result<OfferUpsert, UnmappedRow> {
    let cost = parse_cost(row.cost.as_deref()).map_err(|_| UnmappedRow {
        row: row.clone(),
        reason: UnmappedReason::InvalidCost,
    })?;
    Ok(OfferUpsert {
        provider_key: provider_key.to_string(),
        source_id,
        supplier_sku: row.supplier_sku().map(str::to_string),
        stock_qty: normalize_stock(row.stock_qty.as_deref()),
        cost,
        currency: normalize_currency(row.currency.as_deref()),
        lead_time_days: normalize_lead_time(row.lead_time_days.as_deref()),
        raw_json,
    })
}

/// Upsert the offers of one adapter run and write its unmapped-row report.
pub(crate) async fn persist_offers(
    store: &Store,
    export_dir: &Path,
    adapter: &'static str,
    rows: usize,
    offers: Vec<OfferUpsert>,
    unmapped: Vec<UnmappedRow>,
) -> Result<IngestSummary, IngestError> {
    let upserted = store.process(UpsertOffers { offers }).await?;
    let report = write_unmapped(export_dir, adapter, &unmapped).await?;
    if !unmapped.is_empty() {
        warn!(
            adapter,
            unmapped = unmapped.len(),
            file = %report.display(),
            "Rows without a resolvable offer were reported"
        );
    }
    info!(adapter, rows, upserted, unmapped = unmapped.len(), "Supplier offers synced");

    Ok(IngestSummary {
        adapter: adapter.to_string(),
        rows,
        upserted,
        unmapped: unmapped.len(),
    })
}

/// Read a headed CSV file into rows, trimming every field.
pub async fn read_csv_file<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, IngestError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| IngestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    parse_csv(&bytes)
}

pub fn parse_csv<T: DeserializeOwned>(bytes: &[u8]) -> Result<Vec<T>, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(bytes);
    let mut rows = Vec::new();
    for record in reader.deserialize::<T>() {
        rows.push(record?);
    }
    Ok(rows)
}

/// Rows of a JSON payload that is either an array or `{ "results": [...] }`.
pub fn payload_items(payload: serde_json::Value) -> Vec<serde_json::Value> {
    match payload {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut map) => match map.remove("results") {
            Some(serde_json::Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn stock_is_clamped_and_defaults_to_zero() {
        assert_eq!(normalize_stock(Some("5")), 5);
        assert_eq!(normalize_stock(Some(" 7.9 ")), 7);
        assert_eq!(normalize_stock(Some("-3")), 0);
        assert_eq!(normalize_stock(Some("lots")), 0);
        assert_eq!(normalize_stock(None), 0);
    }

    #[test]
    fn lead_time_is_optional() {
        assert_eq!(normalize_lead_time(Some("3")), Some(3));
        assert_eq!(normalize_lead_time(Some("")), None);
        assert_eq!(normalize_lead_time(Some("soon")), None);
    }

    #[test]
    fn cost_is_exact_and_malformed_cost_is_rejected() {
        assert_eq!(parse_cost(Some("80.10")).unwrap().to_string(), "80.10");
        assert_eq!(parse_cost(None).unwrap(), Decimal::ZERO);
        assert_eq!(parse_cost(Some("1e2")).unwrap(), dec!(100));
        assert_eq!(parse_cost(Some("12,50")), Err("12,50".to_string()));
    }

    #[test]
    fn json_numbers_keep_their_literal_text() {
        let row = SupplierRow::from_json(&serde_json::json!({
            "supplierSku": "SUP-1",
            "stockQty": 2,
            "cost": 80.5,
            "leadTimeDays": null
        }));
        assert_eq!(row.supplier_sku(), Some("SUP-1"));
        assert_eq!(row.stock_qty.as_deref(), Some("2"));
        assert_eq!(row.cost.as_deref(), Some("80.5"));
        assert_eq!(row.lead_time_days, None);
        assert_eq!(row.provider_key(), None);
    }

    #[test]
    fn csv_rows_tolerate_missing_columns() {
        let rows: Vec<SupplierRow> =
            parse_csv(b"providerKey,stockQty,cost\nSKU-1, 5 ,100\n,2,80\n").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].provider_key(), Some("SKU-1"));
        assert_eq!(rows[0].stock_qty.as_deref(), Some("5"));
        assert_eq!(rows[1].provider_key(), None);
        assert_eq!(rows[1].currency, None);
    }

    #[test]
    fn payload_accepts_array_or_results() {
        assert_eq!(payload_items(serde_json::json!([{"a": 1}])).len(), 1);
        assert_eq!(payload_items(serde_json::json!({"results": [{}, {}]})).len(), 2);
        assert!(payload_items(serde_json::json!({"data": []})).is_empty());
    }

    #[test]
    fn build_offer_reports_invalid_cost() {
        let row = SupplierRow {
            cost: Some("n/a".to_string()),
            ..Default::default()
        };
        let unmapped = build_offer(&row, "PK", 1, serde_json::Value::Null).unwrap_err();
        assert_eq!(unmapped.reason, UnmappedReason::InvalidCost);

        let row = SupplierRow {
            cost: Some("19.90".to_string()),
            currency: Some(" EUR ".to_string()),
            ..Default::default()
        };
        let offer = build_offer(&row, "PK", 1, serde_json::Value::Null).unwrap();
        assert_eq!(offer.cost, dec!(19.90));
        assert_eq!(offer.currency, "EUR");
        assert_eq!(offer.stock_qty, 0);
    }

    #[tokio::test]
    async fn unmapped_report_is_written_even_when_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_unmapped(dir.path(), "supplier1", &[]).await.unwrap();
        assert_eq!(path.file_name().unwrap(), "unmapped_supplier1_rows.csv");
        assert_eq!(
            std::fs::read_to_string(path).unwrap(),
            "providerKey,supplierSku,stockQty,cost,currency,leadTimeDays,reason\n"
        );
    }
}
