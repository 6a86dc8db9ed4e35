//! Generic supplier CSV feed.
//!
//! Rows carry their own source name (default `supplierA`); a separate mapping
//! CSV resolves supplier SKUs for rows without a provider key.

use super::{
    FeedAdapter, IngestError, SupplierRow, UnmappedReason, UnmappedRow, build_offer,
    non_blank, persist_offers, read_csv_file,
};
use crate::entities::SourceType;
use crate::entities::source::UpsertSource;
use crate::framework::Store;
use async_trait::async_trait;
use compact_str::CompactString;
use kanau::processor::Processor;
use offerhub_sdk::objects::IngestSummary;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

pub const DEFAULT_SOURCE: &str = "supplierA";

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct MappingRow {
    supplier_sku: Option<String>,
    provider_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SupplierCsvFeed {
    store: Store,
    csv_path: PathBuf,
    mapping_path: Option<PathBuf>,
    export_dir: PathBuf,
}

impl SupplierCsvFeed {
    const NAME: &'static str = "supplier";

    pub fn new(
        store: Store,
        csv_path: impl Into<PathBuf>,
        mapping_path: Option<PathBuf>,
        export_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            csv_path: csv_path.into(),
            mapping_path,
            export_dir: export_dir.into(),
        }
    }

    /// SKU mapping from the mapping CSV. An unreadable file yields no mapping.
    async fn load_mapping(&self) -> HashMap<String, String> {
        let Some(path) = &self.mapping_path else {
            return HashMap::new();
        };
        match read_csv_file::<MappingRow>(path).await {
            Ok(rows) => rows
                .into_iter()
                .filter_map(|row| {
                    let sku = non_blank(row.supplier_sku.as_deref())?.to_string();
                    let key = non_blank(row.provider_key.as_deref())?.to_string();
                    Some((sku, key))
                })
                .collect(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Supplier mapping unavailable");
                HashMap::new()
            }
        }
    }

    async fn source_id(
        &self,
        cache: &mut HashMap<String, i64>,
        name: &str,
    ) -> Result<i64, IngestError> {
        let cache_key = name.to_ascii_lowercase();
        if let Some(id) = cache.get(&cache_key) {
            return Ok(*id);
        }
        let source = self
            .store
            .process(UpsertSource {
                name: CompactString::from(name),
                source_type: SourceType::Csv,
            })
            .await?;
        cache.insert(cache_key, source.id);
        Ok(source.id)
    }
}

#[async_trait]
impl FeedAdapter for SupplierCsvFeed {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    #[tracing::instrument(skip_all, err, fields(path = %self.csv_path.display()))]
    async fn ingest(&self) -> Result<IngestSummary, IngestError> {
        info!("Importing supplier CSV");
        let rows: Vec<SupplierRow> = read_csv_file(&self.csv_path).await?;
        let mapping = self.load_mapping().await;
        debug!(rows = rows.len(), mappings = mapping.len(), "Supplier CSV loaded");

        let mut sources = HashMap::new();
        let mut offers = Vec::with_capacity(rows.len());
        let mut unmapped = Vec::new();

        for row in &rows {
            let provider_key = row
                .provider_key()
                .or_else(|| row.supplier_sku().and_then(|sku| mapping.get(sku).map(String::as_str)));
            let Some(provider_key) = provider_key else {
                unmapped.push(UnmappedRow {
                    row: row.clone(),
                    reason: UnmappedReason::MissingProviderKey,
                });
                continue;
            };

            let source_name = non_blank(row.source.as_deref()).unwrap_or(DEFAULT_SOURCE);
            let source_id = self.source_id(&mut sources, source_name).await?;
            let raw = serde_json::to_value(row).map_err(|e| IngestError::Parse(e.to_string()))?;
            match build_offer(row, provider_key, source_id, raw) {
                Ok(offer) => offers.push(offer),
                Err(u) => unmapped.push(u),
            }
        }

        persist_offers(
            &self.store,
            &self.export_dir,
            Self::NAME,
            rows.len(),
            offers,
            unmapped,
        )
        .await
    }
}
