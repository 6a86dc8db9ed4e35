//! Export materialization.
//!
//! Reads every channel offer for a channel together with the referenced
//! master data and renders three artifacts: the price/stock feed, the
//! master-data feed and the validation report. Row order follows the channel
//! offer scan. Artifacts are written to temporary names first and renamed
//! into place only after all of them were written. Replaced artifacts are
//! kept as `<name>.prev` until every rename succeeded, so a failed run
//! restores the previous export set.

use crate::eligibility::missing_fields;
use crate::entities::SalesChannel;
use crate::entities::channel_offer::{ChannelOffer, ListChannelOffers};
use crate::entities::product_variant::{GetProductVariantsByKeys, ProductVariant};
use crate::framework::Store;
use crate::utils::csv_text::{encode_field, opt_text, render_table};
use kanau::processor::Processor;
use offerhub_sdk::objects::{Channel, ExportSummary, RequiredField, UnknownName};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info, warn};

pub const PRICE_STOCK_HEADERS: [&str; 5] =
    ["providerKey", "price", "currency", "stockQty", "leadTimeDays"];

pub const MASTER_HEADERS: [&str; 9] = [
    "providerKey",
    "title",
    "brand",
    "gtin",
    "imageUrl",
    "weightGrams",
    "originCountry",
    "size",
    "color",
];

pub const VALIDATION_HEADERS: [&str; 3] = ["providerKey", "missingFields", "notes"];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to write {file}: {source}")]
    Io {
        file: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to render csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("channel offer {provider_key} has {source}")]
    UnknownField {
        provider_key: String,
        #[source]
        source: UnknownName,
    },
}

/// Why a product appears in the validation report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationNote {
    NotPublished,
    MissingMasterFields,
    MissingVariant,
}

impl ValidationNote {
    pub const fn as_str(self) -> &'static str {
        match self {
            ValidationNote::NotPublished => "publish=false",
            ValidationNote::MissingMasterFields => "missing_master_fields",
            ValidationNote::MissingVariant => "missing_variant",
        }
    }
}

impl fmt::Display for ValidationNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationRow {
    pub provider_key: String,
    pub missing_fields: Vec<RequiredField>,
    pub note: ValidationNote,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportRows {
    pub price_stock: Vec<[String; 5]>,
    pub master: Vec<[String; 9]>,
    pub validation: Vec<ValidationRow>,
}

fn price_stock_row(offer: &ChannelOffer) -> [String; 5] {
    [
        offer.provider_key.clone(),
        opt_text(offer.sell_price.or(offer.computed_cost)),
        offer.sell_currency.clone().unwrap_or_default(),
        opt_text(offer.computed_stock_qty),
        opt_text(offer.computed_lead_time_days),
    ]
}

fn master_row(variant: &ProductVariant) -> [String; 9] {
    [
        variant.provider_key.clone(),
        variant.title.clone().unwrap_or_default(),
        variant.brand.clone().unwrap_or_default(),
        variant.gtin.clone().unwrap_or_default(),
        variant.image_url.clone().unwrap_or_default(),
        opt_text(variant.weight_grams),
        variant.origin_country.clone().unwrap_or_default(),
        variant.size.clone().unwrap_or_default(),
        variant.color.clone().unwrap_or_default(),
    ]
}

/// Split channel offers into feed and validation rows, preserving order.
pub fn build_export_rows(
    offers: &[ChannelOffer],
    variants: &HashMap<&str, &ProductVariant>,
) -> Result<ExportRows, ExportError> {
    let mut rows = ExportRows::default();

    for offer in offers {
        if !offer.publish {
            let recorded = offer
                .missing_fields()
                .map_err(|source| ExportError::UnknownField {
                    provider_key: offer.provider_key.clone(),
                    source,
                })?;
            rows.validation.push(ValidationRow {
                provider_key: offer.provider_key.clone(),
                missing_fields: recorded.to_vec(),
                note: ValidationNote::NotPublished,
            });
            continue;
        }

        let Some(variant) = variants.get(offer.provider_key.as_str()) else {
            warn!(
                provider_key = %offer.provider_key,
                "Published channel offer has no product variant"
            );
            rows.validation.push(ValidationRow {
                provider_key: offer.provider_key.clone(),
                missing_fields: Vec::new(),
                note: ValidationNote::MissingVariant,
            });
            continue;
        };

        rows.master.push(master_row(variant));
        rows.price_stock.push(price_stock_row(offer));

        let missing = missing_fields(variant);
        if !missing.is_empty() {
            rows.validation.push(ValidationRow {
                provider_key: offer.provider_key.clone(),
                missing_fields: missing.to_vec(),
                note: ValidationNote::MissingMasterFields,
            });
        }
    }

    Ok(rows)
}

/// Render the validation report. The missing-field list is always quoted
/// and joined with `;`.
pub fn render_validation(rows: &[ValidationRow]) -> Result<Vec<u8>, csv::Error> {
    let mut out = VALIDATION_HEADERS.join(",");
    out.push('\n');
    for row in rows {
        let missing = row
            .missing_fields
            .iter()
            .map(|f| f.as_str())
            .collect::<Vec<_>>()
            .join(";");
        out.push_str(&encode_field(&row.provider_key, csv::QuoteStyle::Necessary)?);
        out.push(',');
        out.push_str(&encode_field(&missing, csv::QuoteStyle::Always)?);
        out.push(',');
        out.push_str(row.note.as_str());
        out.push('\n');
    }
    Ok(out.into_bytes())
}

/// Artifact file names for a channel, in delivery order.
pub fn export_file_names(channel: Channel) -> [String; 3] {
    let prefix = channel.file_prefix();
    [
        format!("{prefix}_price_stock.csv"),
        format!("{prefix}_master.csv"),
        format!("{prefix}_validation_report.csv"),
    ]
}

fn temp_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.tmp"))
}

fn backup_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.prev"))
}

/// Progress of moving one artifact into place.
struct Swap<'a> {
    name: &'a str,
    backed_up: bool,
    placed: bool,
}

#[derive(Debug, Clone, Copy)]
/// Render and write the export artifacts for `channel`.
pub struct MaterializeExports {
    pub channel: Channel,
}

#[derive(Debug, Clone)]
pub struct ExportMaterializer {
    store: Store,
    export_dir: PathBuf,
}

impl ExportMaterializer {
    pub fn new(store: Store, export_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            export_dir: export_dir.into(),
        }
    }

    async fn write_all(&self, artifacts: &[(String, Vec<u8>)]) -> Result<(), ExportError> {
        tokio::fs::create_dir_all(&self.export_dir)
            .await
            .map_err(|source| ExportError::Io {
                file: self.export_dir.display().to_string(),
                source,
            })?;

        for (name, body) in artifacts {
            tokio::fs::write(temp_path(&self.export_dir, name), body)
                .await
                .map_err(|source| ExportError::Io {
                    file: name.clone(),
                    source,
                })?;
        }

        self.swap_in(artifacts).await
    }

    async fn swap_in(&self, artifacts: &[(String, Vec<u8>)]) -> Result<(), ExportError> {
        let mut swaps = Vec::with_capacity(artifacts.len());
        for (name, _) in artifacts {
            let mut swap = Swap {
                name: name.as_str(),
                backed_up: false,
                placed: false,
            };
            let result = self.swap_one(&mut swap).await;
            swaps.push(swap);
            if let Err(e) = result {
                self.roll_back(&swaps).await;
                return Err(e);
            }
        }

        for swap in swaps.iter().filter(|s| s.backed_up) {
            let path = backup_path(&self.export_dir, swap.name);
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!(file = %path.display(), error = %e, "Failed to remove previous export");
            }
        }
        Ok(())
    }

    async fn swap_one(&self, swap: &mut Swap<'_>) -> Result<(), ExportError> {
        let name = swap.name;
        let io_err = |source: std::io::Error| ExportError::Io {
            file: name.to_string(),
            source,
        };
        let final_path = self.export_dir.join(name);

        match tokio::fs::symlink_metadata(&final_path).await {
            Ok(meta) if meta.is_file() => {
                tokio::fs::rename(&final_path, backup_path(&self.export_dir, name))
                    .await
                    .map_err(io_err)?;
                swap.backed_up = true;
            }
            // Anything but a regular file is left for the rename below to reject.
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_err(e)),
        }

        tokio::fs::rename(temp_path(&self.export_dir, name), &final_path)
            .await
            .map_err(io_err)?;
        swap.placed = true;
        Ok(())
    }

    async fn roll_back(&self, swaps: &[Swap<'_>]) {
        for swap in swaps.iter().rev() {
            let final_path = self.export_dir.join(swap.name);
            let result = if swap.backed_up {
                tokio::fs::rename(backup_path(&self.export_dir, swap.name), &final_path).await
            } else if swap.placed {
                tokio::fs::remove_file(&final_path).await
            } else {
                continue;
            };
            if let Err(e) = result {
                error!(file = %swap.name, error = %e, "Failed to restore previous export");
            }
        }
    }

    async fn remove_temp_files(&self, artifacts: &[(String, Vec<u8>)]) {
        for (name, _) in artifacts {
            let path = temp_path(&self.export_dir, name);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Failed to remove temporary export");
                }
            }
        }
    }
}

impl Processor<MaterializeExports> for ExportMaterializer {
    type Output = ExportSummary;
    type Error = ExportError;

    #[tracing::instrument(skip_all, err, fields(channel = %cmd.channel))]
    async fn process(&self, cmd: MaterializeExports) -> Result<ExportSummary, ExportError> {
        let offers = self
            .store
            .process(ListChannelOffers {
                channel: SalesChannel::from(cmd.channel),
            })
            .await?;
        let keys = offers.iter().map(|o| o.provider_key.clone()).collect();
        let variants = self.store.process(GetProductVariantsByKeys { keys }).await?;
        let variant_map: HashMap<&str, &ProductVariant> = variants
            .iter()
            .map(|v| (v.provider_key.as_str(), v))
            .collect();

        let rows = build_export_rows(&offers, &variant_map)?;
        let [price_name, master_name, validation_name] = export_file_names(cmd.channel);
        let artifacts = vec![
            (price_name, render_table(&PRICE_STOCK_HEADERS, &rows.price_stock)?),
            (master_name, render_table(&MASTER_HEADERS, &rows.master)?),
            (validation_name, render_validation(&rows.validation)?),
        ];

        if let Err(e) = self.write_all(&artifacts).await {
            error!(error = %e, "Export write failed, discarding temporary files");
            self.remove_temp_files(&artifacts).await;
            return Err(e);
        }

        info!(
            channel = %cmd.channel,
            price_rows = rows.price_stock.len(),
            master_rows = rows.master.len(),
            validation_rows = rows.validation.len(),
            "Exports materialized"
        );

        Ok(ExportSummary {
            channel: cmd.channel,
            price_rows: rows.price_stock.len(),
            master_rows: rows.master.len(),
            validation_rows: rows.validation.len(),
            files: artifacts.into_iter().map(|(name, _)| name).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::channel_offer::{ChannelOfferUpsert, StockPolicy, UpsertChannelOffers};
    use crate::entities::product_variant::{ProductVariantUpsert, UpsertProductVariants};
    use crate::memory::MemoryStore;
    use rust_decimal_macros::dec;
    use smallvec::smallvec;
    use std::sync::Arc;
    use time::macros::datetime;

    fn variant(key: &str) -> ProductVariant {
        ProductVariant {
            provider_key: key.to_string(),
            catalog_variant_id: None,
            title: Some(format!("Sneaker {key}")),
            brand: Some("Acme".to_string()),
            gtin: Some("7610000000001".to_string()),
            sku: None,
            weight_grams: Some(900),
            origin_country: Some("VN".to_string()),
            image_url: None,
            size: Some("43".to_string()),
            color: None,
            attributes: serde_json::json!({}),
            updated_at: datetime!(2024-01-01 00:00),
        }
    }

    fn channel_offer(id: i64, key: &str, publish: bool, missing: &[&str]) -> ChannelOffer {
        ChannelOffer {
            id,
            provider_key: key.to_string(),
            channel: SalesChannel::Galaxus,
            publish,
            sell_price: publish.then_some(dec!(129.90)),
            sell_currency: Some("CHF".to_string()),
            stock_policy: None,
            computed_stock_qty: Some(3),
            computed_lead_time_days: None,
            computed_cost: Some(dec!(129.90)),
            missing_fields: missing.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn feed_rows_match_published_offers_only() {
        let a = variant("A");
        let c = variant("C");
        let variants = HashMap::from([("A", &a), ("C", &c)]);
        let offers = [
            channel_offer(1, "C", true, &[]),
            channel_offer(2, "B", false, &["weightGrams", "title"]),
            channel_offer(3, "A", true, &[]),
        ];

        let rows = build_export_rows(&offers, &variants).unwrap();
        let price_keys: Vec<_> = rows.price_stock.iter().map(|r| r[0].as_str()).collect();
        let master_keys: Vec<_> = rows.master.iter().map(|r| r[0].as_str()).collect();
        assert_eq!(price_keys, vec!["C", "A"]);
        assert_eq!(master_keys, vec!["C", "A"]);
        assert_eq!(
            rows.validation,
            vec![ValidationRow {
                provider_key: "B".to_string(),
                missing_fields: vec![RequiredField::WeightGrams, RequiredField::Title],
                note: ValidationNote::NotPublished,
            }]
        );
    }

    #[test]
    fn published_offer_with_incomplete_variant_also_reports() {
        let mut a = variant("A");
        a.gtin = None;
        let variants = HashMap::from([("A", &a)]);
        let rows = build_export_rows(&[channel_offer(1, "A", true, &[])], &variants).unwrap();
        assert_eq!(rows.price_stock.len(), 1);
        assert_eq!(rows.master.len(), 1);
        assert_eq!(rows.validation[0].note, ValidationNote::MissingMasterFields);
        assert_eq!(rows.validation[0].missing_fields, vec![RequiredField::Gtin]);
    }

    #[test]
    fn published_offer_without_variant_is_reported() {
        let rows =
            build_export_rows(&[channel_offer(1, "Z", true, &[])], &HashMap::new()).unwrap();
        assert!(rows.price_stock.is_empty());
        assert_eq!(rows.validation[0].note, ValidationNote::MissingVariant);
    }

    #[test]
    fn unknown_persisted_field_is_an_error() {
        let err = build_export_rows(&[channel_offer(1, "A", false, &["colour"])], &HashMap::new())
            .unwrap_err();
        assert!(matches!(err, ExportError::UnknownField { .. }));
    }

    #[test]
    fn absent_values_render_as_empty_fields() {
        let a = variant("A");
        assert_eq!(
            master_row(&a),
            [
                "A", "Sneaker A", "Acme", "7610000000001", "", "900", "VN", "43", ""
            ]
            .map(String::from)
        );

        let mut offer = channel_offer(1, "A", true, &[]);
        offer.sell_price = None;
        assert_eq!(
            price_stock_row(&offer),
            ["A", "129.90", "CHF", "3", ""].map(String::from)
        );
    }

    #[test]
    fn validation_report_quotes_missing_fields() {
        let out = render_validation(&[
            ValidationRow {
                provider_key: "B".to_string(),
                missing_fields: vec![RequiredField::WeightGrams, RequiredField::Title],
                note: ValidationNote::NotPublished,
            },
            ValidationRow {
                provider_key: "Z".to_string(),
                missing_fields: Vec::new(),
                note: ValidationNote::MissingVariant,
            },
            ValidationRow {
                provider_key: "K,1".to_string(),
                missing_fields: vec![RequiredField::Gtin],
                note: ValidationNote::MissingMasterFields,
            },
        ])
        .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "providerKey,missingFields,notes\n\
             B,\"weightGrams;title\",publish=false\n\
             Z,\"\",missing_variant\n\
             \"K,1\",\"gtin\",missing_master_fields\n"
        );
    }

    async fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store
            .process(UpsertProductVariants {
                variants: vec![ProductVariantUpsert {
                    provider_key: "A".to_string(),
                    title: Some("Sneaker A".to_string()),
                    gtin: Some("7610000000001".to_string()),
                    weight_grams: Some(900),
                    origin_country: Some("VN".to_string()),
                    attributes: serde_json::json!({}),
                    ..Default::default()
                }],
            })
            .await
            .unwrap();
        store
            .process(UpsertChannelOffers {
                offers: vec![
                    ChannelOfferUpsert {
                        provider_key: "A".to_string(),
                        channel: SalesChannel::Galaxus,
                        publish: true,
                        sell_price: Some(dec!(99.5)),
                        sell_currency: Some("CHF".to_string()),
                        stock_policy: Some(StockPolicy {
                            selected_source: "own_stock".to_string(),
                        }),
                        computed_stock_qty: Some(2),
                        computed_lead_time_days: Some(1),
                        computed_cost: Some(dec!(99.5)),
                        missing_fields: smallvec![],
                    },
                    ChannelOfferUpsert {
                        provider_key: "B".to_string(),
                        channel: SalesChannel::Galaxus,
                        publish: false,
                        sell_price: None,
                        sell_currency: None,
                        stock_policy: None,
                        computed_stock_qty: None,
                        computed_lead_time_days: None,
                        computed_cost: None,
                        missing_fields: smallvec![RequiredField::Title],
                    },
                ],
            })
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn writes_three_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let materializer = ExportMaterializer::new(Store::memory(seeded_store().await), dir.path());

        let summary = materializer
            .process(MaterializeExports {
                channel: Channel::Galaxus,
            })
            .await
            .unwrap();
        assert_eq!(
            summary.files,
            vec![
                "galaxus_price_stock.csv",
                "galaxus_master.csv",
                "galaxus_validation_report.csv"
            ]
        );
        assert_eq!((summary.price_rows, summary.master_rows, summary.validation_rows), (1, 1, 1));

        let price = std::fs::read_to_string(dir.path().join("galaxus_price_stock.csv")).unwrap();
        assert_eq!(price, "providerKey,price,currency,stockQty,leadTimeDays\nA,99.5,CHF,2,1\n");
        let master = std::fs::read_to_string(dir.path().join("galaxus_master.csv")).unwrap();
        assert_eq!(
            master,
            "providerKey,title,brand,gtin,imageUrl,weightGrams,originCountry,size,color\n\
             A,Sneaker A,,7610000000001,,900,VN,,\n"
        );
        let validation =
            std::fs::read_to_string(dir.path().join("galaxus_validation_report.csv")).unwrap();
        assert_eq!(validation, "providerKey,missingFields,notes\nB,\"title\",publish=false\n");
        assert!(!dir.path().join("galaxus_master.csv.tmp").exists());
    }

    #[tokio::test]
    async fn failed_write_keeps_previous_export_set() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("galaxus_price_stock.csv"), "old price").unwrap();
        // A directory in place of the last temp file makes its write fail.
        std::fs::create_dir(dir.path().join("galaxus_validation_report.csv.tmp")).unwrap();

        let materializer = ExportMaterializer::new(Store::memory(seeded_store().await), dir.path());
        let err = materializer
            .process(MaterializeExports {
                channel: Channel::Galaxus,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::Io { .. }));

        let price = std::fs::read_to_string(dir.path().join("galaxus_price_stock.csv")).unwrap();
        assert_eq!(price, "old price");
        assert!(!dir.path().join("galaxus_price_stock.csv.tmp").exists());
        assert!(!dir.path().join("galaxus_master.csv").exists());
    }

    #[tokio::test]
    async fn failed_rename_restores_previous_export_set() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("galaxus_price_stock.csv"), "old price").unwrap();
        std::fs::write(dir.path().join("galaxus_validation_report.csv"), "old report").unwrap();
        // A directory at the master name rejects the rename of its artifact.
        std::fs::create_dir_all(dir.path().join("galaxus_master.csv/nested")).unwrap();

        let materializer = ExportMaterializer::new(Store::memory(seeded_store().await), dir.path());
        let err = materializer
            .process(MaterializeExports {
                channel: Channel::Galaxus,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::Io { ref file, .. } if file == "galaxus_master.csv"));

        let price = std::fs::read_to_string(dir.path().join("galaxus_price_stock.csv")).unwrap();
        assert_eq!(price, "old price");
        let report =
            std::fs::read_to_string(dir.path().join("galaxus_validation_report.csv")).unwrap();
        assert_eq!(report, "old report");
        for leftover in [
            "galaxus_price_stock.csv.prev",
            "galaxus_price_stock.csv.tmp",
            "galaxus_master.csv.tmp",
            "galaxus_validation_report.csv.tmp",
        ] {
            assert!(!dir.path().join(leftover).exists(), "{leftover} left behind");
        }
    }

    #[tokio::test]
    async fn new_artifact_is_removed_when_a_later_rename_fails() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("galaxus_validation_report.csv/nested")).unwrap();

        let materializer = ExportMaterializer::new(Store::memory(seeded_store().await), dir.path());
        materializer
            .process(MaterializeExports {
                channel: Channel::Galaxus,
            })
            .await
            .unwrap_err();

        assert!(!dir.path().join("galaxus_price_stock.csv").exists());
        assert!(!dir.path().join("galaxus_master.csv").exists());
    }

    #[tokio::test]
    async fn successful_run_replaces_previous_files_without_backups() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("galaxus_master.csv"), "old master").unwrap();

        let materializer = ExportMaterializer::new(Store::memory(seeded_store().await), dir.path());
        materializer
            .process(MaterializeExports {
                channel: Channel::Galaxus,
            })
            .await
            .unwrap();

        let master = std::fs::read_to_string(dir.path().join("galaxus_master.csv")).unwrap();
        assert!(master.starts_with("providerKey,title"));
        assert!(!dir.path().join("galaxus_master.csv.prev").exists());
    }
}
