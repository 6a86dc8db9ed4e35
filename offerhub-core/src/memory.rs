//! An in-process store implementing every query the database backend
//! implements, with the same ordering and upsert semantics.

use crate::entities::channel_offer::{
    ChannelOffer, ListChannelOffers, UpsertChannelOffers, dedup_channel_offers,
};
use crate::entities::offer::{
    ListOffersWithSource, Offer, OfferWithSource, UpsertOffers, dedup_offers,
};
use crate::entities::product_variant::{
    GetProductVariantsByKeys, ListProductVariants, ProductVariant, UpsertProductVariants,
    dedup_variants,
};
use crate::entities::source::{Source, UpsertSource};
use crate::entities::supplier_sku_map::ResolveSupplierSkus;
use crate::utils::clock::now_utc;
use kanau::processor::Processor;
use sqlx::types::Json;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct Tables {
    sources: Vec<Source>,
    offers: Vec<Offer>,
    sku_map: HashMap<(i64, String), String>,
    variants: BTreeMap<String, ProductVariant>,
    channel_offers: Vec<ChannelOffer>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a supplier SKU mapping for a source.
    pub fn insert_sku_mapping(
        &self,
        source_id: i64,
        supplier_sku: impl Into<String>,
        provider_key: impl Into<String>,
    ) {
        self.write()
            .sku_map
            .insert((source_id, supplier_sku.into()), provider_key.into());
    }
}

impl Processor<UpsertSource> for MemoryStore {
    type Output = Source;
    type Error = sqlx::Error;
    async fn process(&self, query: UpsertSource) -> Result<Source, sqlx::Error> {
        let mut tables = self.write();
        if let Some(existing) = tables
            .sources
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(&query.name))
        {
            return Ok(existing.clone());
        }
        let source = Source {
            id: tables.next_id(),
            name: query.name,
            source_type: query.source_type,
            created_at: now_utc(),
        };
        tables.sources.push(source.clone());
        Ok(source)
    }
}

impl Processor<UpsertOffers> for MemoryStore {
    type Output = u64;
    type Error = sqlx::Error;
    async fn process(&self, upsert: UpsertOffers) -> Result<u64, sqlx::Error> {
        let offers = dedup_offers(upsert.offers);
        let mut tables = self.write();
        let now = now_utc();
        let mut affected = 0;
        for offer in offers {
            let position = tables
                .offers
                .iter()
                .position(|o| o.provider_key == offer.provider_key && o.source_id == offer.source_id);
            let id = match position {
                Some(index) => tables.offers[index].id,
                None => tables.next_id(),
            };
            let row = Offer {
                id,
                provider_key: offer.provider_key,
                source_id: offer.source_id,
                supplier_sku: offer.supplier_sku,
                stock_qty: offer.stock_qty,
                cost: offer.cost,
                currency: offer.currency,
                lead_time_days: offer.lead_time_days,
                last_seen_at: now,
                raw_json: offer.raw_json,
            };
            match position {
                Some(index) => tables.offers[index] = row,
                None => tables.offers.push(row),
            }
            affected += 1;
        }
        Ok(affected)
    }
}

impl Processor<ListOffersWithSource> for MemoryStore {
    type Output = Vec<OfferWithSource>;
    type Error = sqlx::Error;
    async fn process(&self, _: ListOffersWithSource) -> Result<Vec<OfferWithSource>, sqlx::Error> {
        let tables = self.read();
        let names: HashMap<i64, _> = tables
            .sources
            .iter()
            .map(|s| (s.id, s.name.clone()))
            .collect();
        let mut offers: Vec<OfferWithSource> = tables
            .offers
            .iter()
            .filter_map(|o| {
                let source_name = names.get(&o.source_id)?.clone();
                Some(OfferWithSource {
                    id: o.id,
                    provider_key: o.provider_key.clone(),
                    source_id: o.source_id,
                    source_name,
                    stock_qty: o.stock_qty,
                    cost: o.cost,
                    currency: o.currency.clone(),
                    lead_time_days: o.lead_time_days,
                    last_seen_at: o.last_seen_at,
                })
            })
            .collect();
        offers.sort_by(|a, b| {
            a.provider_key
                .cmp(&b.provider_key)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(offers)
    }
}

impl Processor<ResolveSupplierSkus> for MemoryStore {
    type Output = HashMap<String, String>;
    type Error = sqlx::Error;
    async fn process(
        &self,
        query: ResolveSupplierSkus,
    ) -> Result<HashMap<String, String>, sqlx::Error> {
        let tables = self.read();
        Ok(query
            .skus
            .into_iter()
            .filter_map(|sku| {
                let key = tables.sku_map.get(&(query.source_id, sku.clone()))?;
                Some((sku, key.clone()))
            })
            .collect())
    }
}

impl Processor<UpsertProductVariants> for MemoryStore {
    type Output = u64;
    type Error = sqlx::Error;
    async fn process(&self, upsert: UpsertProductVariants) -> Result<u64, sqlx::Error> {
        let variants = dedup_variants(upsert.variants);
        let mut tables = self.write();
        let now = now_utc();
        let mut affected = 0;
        for v in variants {
            let row = ProductVariant {
                provider_key: v.provider_key.clone(),
                catalog_variant_id: v.catalog_variant_id,
                title: v.title,
                brand: v.brand,
                gtin: v.gtin,
                sku: v.sku,
                weight_grams: v.weight_grams,
                origin_country: v.origin_country,
                image_url: v.image_url,
                size: v.size,
                color: v.color,
                attributes: v.attributes,
                updated_at: now,
            };
            tables.variants.insert(v.provider_key, row);
            affected += 1;
        }
        Ok(affected)
    }
}

impl Processor<ListProductVariants> for MemoryStore {
    type Output = Vec<ProductVariant>;
    type Error = sqlx::Error;
    async fn process(&self, _: ListProductVariants) -> Result<Vec<ProductVariant>, sqlx::Error> {
        Ok(self.read().variants.values().cloned().collect())
    }
}

impl Processor<GetProductVariantsByKeys> for MemoryStore {
    type Output = Vec<ProductVariant>;
    type Error = sqlx::Error;
    async fn process(
        &self,
        query: GetProductVariantsByKeys,
    ) -> Result<Vec<ProductVariant>, sqlx::Error> {
        let wanted: HashSet<&str> = query.keys.iter().map(String::as_str).collect();
        Ok(self
            .read()
            .variants
            .values()
            .filter(|v| wanted.contains(v.provider_key.as_str()))
            .cloned()
            .collect())
    }
}

impl Processor<UpsertChannelOffers> for MemoryStore {
    type Output = u64;
    type Error = sqlx::Error;
    async fn process(&self, upsert: UpsertChannelOffers) -> Result<u64, sqlx::Error> {
        let offers = dedup_channel_offers(upsert.offers);
        let mut tables = self.write();
        let mut affected = 0;
        for offer in offers {
            let missing_fields = offer.missing_field_names();
            let position = tables
                .channel_offers
                .iter()
                .position(|o| o.provider_key == offer.provider_key && o.channel == offer.channel);
            let id = match position {
                Some(index) => tables.channel_offers[index].id,
                None => tables.next_id(),
            };
            let row = ChannelOffer {
                id,
                provider_key: offer.provider_key,
                channel: offer.channel,
                publish: offer.publish,
                sell_price: offer.sell_price,
                sell_currency: offer.sell_currency,
                stock_policy: offer.stock_policy.map(Json),
                computed_stock_qty: offer.computed_stock_qty,
                computed_lead_time_days: offer.computed_lead_time_days,
                computed_cost: offer.computed_cost,
                missing_fields,
            };
            match position {
                Some(index) => tables.channel_offers[index] = row,
                None => tables.channel_offers.push(row),
            }
            affected += 1;
        }
        Ok(affected)
    }
}

impl Processor<ListChannelOffers> for MemoryStore {
    type Output = Vec<ChannelOffer>;
    type Error = sqlx::Error;
    async fn process(&self, query: ListChannelOffers) -> Result<Vec<ChannelOffer>, sqlx::Error> {
        Ok(self
            .read()
            .channel_offers
            .iter()
            .filter(|o| o.channel == query.channel)
            .cloned()
            .collect())
    }
}
