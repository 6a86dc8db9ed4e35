//! GoldenSneakers partner API.

use super::{
    FeedAdapter, IngestError, SupplierRow, UnmappedReason, UnmappedRow, build_offer, http_client,
    json_text, parse_number, payload_items, persist_offers,
};
use crate::entities::SourceType;
use crate::entities::source::UpsertSource;
use crate::framework::Store;
use async_trait::async_trait;
use kanau::processor::Processor;
use offerhub_sdk::objects::IngestSummary;
use rust_decimal::Decimal;
use std::path::PathBuf;
use tracing::{error, info, warn};
use url::Url;

pub const SOURCE_NAME: &str = "goldensneakers";

/// Fields tried in order for the offer cost.
const COST_FIELDS: [&str; 5] = ["cost", "price", "price_chf", "wholesale_price", "supplier_price"];

#[derive(Debug, Clone)]
pub struct GoldenSneakersConfig {
    pub base_url: Url,
    pub token: Option<String>,
    pub search: String,
    pub markup_percentage: Decimal,
    pub vat_percentage: Decimal,
    pub rounding_type: String,
    pub only_with_ean: bool,
}

impl GoldenSneakersConfig {
    pub fn request_url(&self) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("search", &self.search)
            .append_pair("markup_percentage", &self.markup_percentage.to_string())
            .append_pair("vat_percentage", &self.vat_percentage.to_string())
            .append_pair("rounding_type", &self.rounding_type)
            .append_pair(
                "show_only_products_with_ean",
                if self.only_with_ean { "true" } else { "false" },
            );
        url
    }
}

/// Map one API item onto the common supplier row shape.
pub fn item_row(item: &serde_json::Value) -> SupplierRow {
    let cost = COST_FIELDS.iter().find_map(|field| {
        json_text(item.get(*field)).filter(|text| parse_number(text).is_some())
    });
    SupplierRow {
        provider_key: json_text(item.get("sku")),
        supplier_sku: json_text(item.get("sku")),
        stock_qty: json_text(item.get("available_summary_quantity")),
        cost,
        currency: json_text(item.get("currency")),
        lead_time_days: None,
        source: Some(SOURCE_NAME.to_string()),
    }
}

#[derive(Debug, Clone)]
pub struct GoldenSneakersFeed {
    store: Store,
    config: GoldenSneakersConfig,
    export_dir: PathBuf,
    http_client: reqwest::Client,
}

impl GoldenSneakersFeed {
    pub fn new(store: Store, config: GoldenSneakersConfig, export_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            config,
            export_dir: export_dir.into(),
            http_client: http_client(),
        }
    }

    async fn fetch_items(&self, token: &str) -> Result<Vec<serde_json::Value>, IngestError> {
        let response = self
            .http_client
            .get(self.config.request_url())
            .header(reqwest::header::ACCEPT, "application/json")
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), body = %body, "GoldenSneakers fetch failed");
            return Err(IngestError::Status {
                adapter: SOURCE_NAME,
                status: status.as_u16(),
                body,
            });
        }

        Ok(payload_items(response.json().await?))
    }
}

#[async_trait]
impl FeedAdapter for GoldenSneakersFeed {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    #[tracing::instrument(skip_all, err)]
    async fn ingest(&self) -> Result<IngestSummary, IngestError> {
        let Some(token) = self
            .config
            .token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
        else {
            warn!("GoldenSneakers token missing; skipping fetch");
            return Ok(IngestSummary {
                adapter: SOURCE_NAME.to_string(),
                rows: 0,
                upserted: 0,
                unmapped: 0,
            });
        };

        let items = self.fetch_items(token).await?;
        info!(items = items.len(), "GoldenSneakers items fetched");

        let source = self
            .store
            .process(UpsertSource {
                name: SOURCE_NAME.into(),
                source_type: SourceType::Api,
            })
            .await?;

        let row_count = items.len();
        let mut offers = Vec::with_capacity(row_count);
        let mut unmapped = Vec::new();
        for item in items {
            let row = item_row(&item);
            let Some(provider_key) = row.provider_key().map(str::to_string) else {
                unmapped.push(UnmappedRow {
                    row,
                    reason: UnmappedReason::MissingProviderKey,
                });
                continue;
            };
            match build_offer(&row, &provider_key, source.id, item) {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    #[test]
    fn request_url_carries_every_parameter() {
        let config = GoldenSneakersConfig {
            base_url: Url::parse("https://api.example.test/products/").unwrap(),
            token: None,
            search: "dunk low".to_string(),
            markup_percentage: dec!(12.5),
            vat_percentage: dec!(8.1),
            rounding_type: "whole".to_string(),
            only_with_ean: true,
        };
        assert_eq!(
            config.request_url().as_str(),
            "https://api.example.test/products/?search=dunk+low&markup_percentage=12.5\
             &vat_percentage=8.1&rounding_type=whole&show_only_products_with_ean=true"
        );
    }

    #[test]
    fn cost_comes_from_the_first_numeric_candidate() {
        let row = item_row(&serde_json::json!({
            "sku": " DD1391-100 ",
            "available_summary_quantity": 6,
            "cost": "",
            "price": "n/a",
            "price_chf": 149.9,
            "supplier_price": 120
        }));
        assert_eq!(row.provider_key(), Some("DD1391-100"));
        assert_eq!(row.cost.as_deref(), Some("149.9"));
        assert_eq!(row.stock_qty.as_deref(), Some("6"));
        assert_eq!(row.currency, None);
    }

    #[tokio::test]
    async fn missing_token_skips_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let feed = GoldenSneakersFeed::new(
            Store::memory(Arc::new(MemoryStore::new())),
            GoldenSneakersConfig {
                base_url: Url::parse("http://127.0.0.1:9/").unwrap(),
                token: Some("  ".to_string()),
                search: String::new(),
                markup_percentage: Decimal::ZERO,
                vat_percentage: Decimal::ZERO,
                rounding_type: "none".to_string(),
                only_with_ean: false,
            },
            dir.path(),
        );
        let summary = feed.ingest().await.unwrap();
        assert_eq!(summary.rows, 0);
        assert!(!dir.path().join("unmapped_goldensneakers_rows.csv").exists());
    }
}
