//! Supplier1 feed, read from a CSV export or from its JSON API.
//!
//! Rows without a provider key are resolved through the `supplier_sku_map`
//! table in a single lookup.

use super::{
    FeedAdapter, IngestError, SupplierRow, UnmappedReason, UnmappedRow, build_offer, http_client,
    payload_items, persist_offers, read_csv_file,
};
use crate::entities::SourceType;
use crate::entities::source::UpsertSource;
use crate::entities::supplier_sku_map::ResolveSupplierSkus;
use crate::framework::Store;
use async_trait::async_trait;
use kanau::processor::Processor;
use offerhub_sdk::objects::IngestSummary;
use std::path::PathBuf;
use tracing::{error, info};
use url::Url;

pub const SOURCE_NAME: &str = "supplier1";

#[derive(Debug, Clone)]
pub enum Supplier1Mode {
    Csv { path: PathBuf },
    Api { url: Url, token: Option<String> },
}

#[derive(Debug, Clone)]
pub struct Supplier1Feed {
    store: Store,
    mode: Supplier1Mode,
    export_dir: PathBuf,
    http_client: reqwest::Client,
}

impl Supplier1Feed {
    pub fn new(store: Store, mode: Supplier1Mode, export_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            mode,
            export_dir: export_dir.into(),
            http_client: http_client(),
        }
    }

    async fn fetch_api_rows(
        &self,
        url: &Url,
        token: Option<&str>,
    ) -> Result<Vec<(SupplierRow, serde_json::Value)>, IngestError> {
        let mut request = self
            .http_client
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), body = %body, "Supplier1 API fetch failed");
            return Err(IngestError::Status {
                adapter: SOURCE_NAME,
                status: status.as_u16(),
                body,
            });
        }

        let payload: serde_json::Value = response.json().await?;
        Ok(payload_items(payload)
            .into_iter()
            .map(|item| (SupplierRow::from_json(&item), item))
            .collect())
    }

    async fn load_rows(&self) -> Result<Vec<(SupplierRow, serde_json::Value)>, IngestError> {
        match &self.mode {
            Supplier1Mode::Api { url, token } => self.fetch_api_rows(url, token.as_deref()).await,
            Supplier1Mode::Csv { path } => {
                let rows: Vec<SupplierRow> = read_csv_file(path).await?;
                rows.into_iter()
                    .map(|row| {
                        let raw = serde_json::to_value(&row)
                            .map_err(|e| IngestError::Parse(e.to_string()))?;
                        Ok((row, raw))
                    })
                    .collect()
            }
        }
    }

    fn mode_name(&self) -> &'static str {
        match self.mode {
            Supplier1Mode::Csv { .. } => "csv",
            Supplier1Mode::Api { .. } => "api",
        }
    }
}

#[async_trait]
impl FeedAdapter for Supplier1Feed {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    #[tracing::instrument(skip_all, err, fields(mode = self.mode_name()))]
    async fn ingest(&self) -> Result<IngestSummary, IngestError> {
        let source = self
            .store
            .process(UpsertSource {
                name: SOURCE_NAME.into(),
                source_type: SourceType::Api,
            })
            .await?;

        let rows = self.load_rows().await?;
        info!(rows = rows.len(), "Supplier1 rows loaded");

        let skus = rows
            .iter()
            .filter(|(row, _)| row.provider_key().is_none())
            .filter_map(|(row, _)| row.supplier_sku().map(str::to_string))
            .collect();
        let resolved = self
            .store
            .process(ResolveSupplierSkus {
                source_id: source.id,
                skus,
            })
            .await?;

        let row_count = rows.len();
        let mut offers = Vec::with_capacity(row_count);
        let mut unmapped = Vec::new();
        for (row, raw) in rows {
            let provider_key = row.provider_key().map(str::to_string).or_else(|| {
                row.supplier_sku()
                    .and_then(|sku| resolved.get(sku))
                    .cloned()
            });
            let Some(provider_key) = provider_key else {
                unmapped.push(UnmappedRow {
                    row,
                    reason: UnmappedReason::MissingProviderKey,
                });
                continue;
            };
            match build_offer(&row, &provider_key, source.id, raw) {
                Ok(offer) => offers.push(offer),
                Err(u) => unmapped.push(u),
            }
        }

        persist_offers(
            &self.store,
            &self.export_dir,
            SOURCE_NAME,
            row_count,
            offers,
            unmapped,
        )
        .await
    }
}
