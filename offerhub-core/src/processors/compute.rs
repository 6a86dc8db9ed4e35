//! The compute stage: select a winner per product and record the channel
//! decision for every variant.

use crate::eligibility::evaluate;
use crate::entities::SalesChannel;
use crate::entities::channel_offer::UpsertChannelOffers;
use crate::entities::offer::{ListOffersWithSource, OfferWithSource};
use crate::entities::product_variant::ListProductVariants;
use crate::framework::Store;
use crate::selection::OfferSelector;
use itertools::Itertools;
use kanau::processor::Processor;
use offerhub_sdk::objects::{Channel, ComputeSummary, ValidationEntry};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy)]
/// Recompute every channel offer of `channel` from the current offers and
/// master data.
pub struct ComputeChannelOffers {
    pub channel: Channel,
}

#[derive(Debug, Clone)]
pub struct ChannelOfferComputer {
    store: Store,
    selector: OfferSelector,
}

impl ChannelOfferComputer {
    pub fn new(store: Store, selector: OfferSelector) -> Self {
        Self { store, selector }
    }
}

fn group_by_provider_key(offers: Vec<OfferWithSource>) -> HashMap<String, Vec<OfferWithSource>> {
    // Offers arrive ordered by provider key, so each key forms one run.
    let mut grouped = HashMap::new();
    for (key, group) in &offers.into_iter().chunk_by(|o| o.provider_key.clone()) {
        grouped.insert(key, group.collect::<Vec<_>>());
    }
    grouped
}

impl Processor<ComputeChannelOffers> for ChannelOfferComputer {
    type Output = ComputeSummary;
    type Error = ComputeError;

    #[tracing::instrument(skip_all, err, fields(channel = %cmd.channel))]
    async fn process(&self, cmd: ComputeChannelOffers) -> Result<ComputeSummary, ComputeError> {
        let run_id = Uuid::now_v7();
        let channel = SalesChannel::from(cmd.channel);

        let variants = self.store.process(ListProductVariants).await?;
        let offers = group_by_provider_key(self.store.process(ListOffersWithSource).await?);

        let mut upserts = Vec::with_capacity(variants.len());
        let mut validations = Vec::new();
        let mut published = 0;

        for variant in &variants {
            let candidates = offers
                .get(&variant.provider_key)
                .map(Vec::as_slice)
                .unwrap_or_default();
            let winner = self.selector.select_best(candidates);
            let decision = evaluate(variant, winner);

            debug!(
                provider_key = %variant.provider_key,
                offers = candidates.len(),
                selected_source = winner.map(|w| w.source_name.as_str()),
                publish = decision.publish,
                "Evaluated variant"
            );

            if decision.publish {
                published += 1;
            }
            if !decision.is_data_complete() {
                validations.push(ValidationEntry {
                    provider_key: variant.provider_key.clone(),
                    missing_fields: decision.missing_fields.to_vec(),
                });
            }
            upserts.push(decision.into_upsert(variant.provider_key.clone(), channel));
        }

        self.store
            .process(UpsertChannelOffers { offers: upserts })
            .await?;

        info!(
            run_id = %run_id,
            channel = %cmd.channel,
            evaluated = variants.len(),
            published,
            incomplete = validations.len(),
            "Channel offers computed"
        );

        Ok(ComputeSummary {
            run_id,
            channel: cmd.channel,
            evaluated: variants.len(),
            published,
            validations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::SourceType;
    use crate::entities::channel_offer::ListChannelOffers;
    use crate::entities::offer::{OfferUpsert, UpsertOffers};
    use crate::entities::product_variant::{ProductVariantUpsert, UpsertProductVariants};
    use crate::entities::source::UpsertSource;
    use crate::memory::MemoryStore;
    use crate::selection::SourcePriority;
    use offerhub_sdk::objects::RequiredField;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn variant(key: &str, complete: bool) -> ProductVariantUpsert {
        ProductVariantUpsert {
            provider_key: key.to_string(),
            title: complete.then(|| format!("Title {key}")),
            gtin: Some(format!("76100000{key}")),
            weight_grams: complete.then_some(500),
            origin_country: Some("CH".to_string()),
            attributes: serde_json::json!({}),
            ..Default::default()
        }
    }

    async fn seed_source(store: &MemoryStore, name: &str) -> i64 {
        store
            .process(UpsertSource {
                name: name.into(),
                source_type: SourceType::Csv,
            })
            .await
            .unwrap()
            .id
    }

    fn offer(key: &str, source_id: i64, stock: i32, cost: Decimal) -> OfferUpsert {
        OfferUpsert {
            provider_key: key.to_string(),
            source_id,
            supplier_sku: None,
            stock_qty: stock,
            cost,
            currency: "CHF".to_string(),
            lead_time_days: Some(3),
            raw_json: serde_json::Value::Null,
        }
    }

    async fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let own = seed_source(&store, "own_stock").await;
        let supplier = seed_source(&store, "supplierA").await;
        store
            .process(UpsertProductVariants {
                variants: vec![variant("A", true), variant("B", false), variant("C", true)],
            })
            .await
            .unwrap();
        store
            .process(UpsertOffers {
                offers: vec![
                    offer("A", supplier, 20, dec!(50)),
                    offer("A", own, 1, dec!(60)),
                    offer("B", supplier, 4, dec!(12.5)),
                ],
            })
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn every_variant_gets_one_decision() {
        let store = seeded_store().await;
        let computer =
            ChannelOfferComputer::new(Store::memory(store.clone()), OfferSelector::default());

        let summary = computer
            .process(ComputeChannelOffers {
                channel: Channel::Galaxus,
            })
            .await
            .unwrap();
        assert_eq!(summary.evaluated, 3);
        assert_eq!(summary.published, 1);
        assert_eq!(summary.validations.len(), 1);
        assert_eq!(summary.validations[0].provider_key, "B");
        assert_eq!(
            summary.validations[0].missing_fields,
            vec![RequiredField::WeightGrams, RequiredField::Title]
        );

        let rows = store
            .process(ListChannelOffers {
                channel: SalesChannel::Galaxus,
            })
            .await
            .unwrap();
        let a = rows.iter().find(|r| r.provider_key == "A").unwrap();
        assert!(a.publish);
        assert_eq!(a.selected_source(), Some("own_stock"));
        assert_eq!(a.sell_price, Some(dec!(60)));

        let b = rows.iter().find(|r| r.provider_key == "B").unwrap();
        assert!(!b.publish);
        assert_eq!(b.computed_cost, Some(dec!(12.5)));
        assert_eq!(b.missing_fields, vec!["weightGrams", "title"]);

        let c = rows.iter().find(|r| r.provider_key == "C").unwrap();
        assert!(!c.publish);
        assert_eq!(c.sell_price, None);
        assert!(c.missing_fields.is_empty());
    }

    #[tokio::test]
    async fn recompute_is_idempotent() {
        let store = seeded_store().await;
        let computer =
            ChannelOfferComputer::new(Store::memory(store.clone()), OfferSelector::default());
        let cmd = ComputeChannelOffers {
            channel: Channel::Galaxus,
        };
        let list = ListChannelOffers {
            channel: SalesChannel::Galaxus,
        };

        computer.process(cmd).await.unwrap();
        let first = store.process(list).await.unwrap();
        computer.process(cmd).await.unwrap();
        let second = store.process(list).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn injected_priority_changes_selected_source() {
        let store = seeded_store().await;
        let computer =
            ChannelOfferComputer::new(Store::memory(store.clone()), OfferSelector::default());
        let cmd = ComputeChannelOffers {
            channel: Channel::Galaxus,
        };
        computer.process(cmd).await.unwrap();

        let reranked = ChannelOfferComputer::new(
            Store::memory(store.clone()),
            OfferSelector::new(SourcePriority::from_ranks([("supplierA", 1)])),
        );
        reranked.process(cmd).await.unwrap();
        let rows = store
            .process(ListChannelOffers {
                channel: SalesChannel::Galaxus,
            })
            .await
            .unwrap();
        let a = rows.iter().find(|r| r.provider_key == "A").unwrap();
        assert_eq!(a.selected_source(), Some("supplierA"));
        assert_eq!(a.computed_stock_qty, Some(20));
    }
}
