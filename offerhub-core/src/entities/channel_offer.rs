use crate::entities::SalesChannel;
use crate::entities::offer::UPSERT_CHUNK;
use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use offerhub_sdk::objects::{MissingFields, RequiredField, UnknownName};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use std::collections::HashMap;

/// Provenance of a computed channel offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockPolicy {
    pub selected_source: String,
}

/// The recorded publish decision for one product on one channel.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ChannelOffer {
    pub id: i64,
    pub provider_key: String,
    pub channel: SalesChannel,
    pub publish: bool,
    pub sell_price: Option<Decimal>,
    pub sell_currency: Option<String>,
    pub stock_policy: Option<Json<StockPolicy>>,
    pub computed_stock_qty: Option<i32>,
    pub computed_lead_time_days: Option<i32>,
    pub computed_cost: Option<Decimal>,
    pub missing_fields: Vec<String>,
}

impl ChannelOffer {
    /// The persisted missing-field list, in the order it was recorded.
    pub fn missing_fields(&self) -> Result<MissingFields, UnknownName> {
        self.missing_fields
            .iter()
            .map(|name| name.parse::<RequiredField>())
            .collect()
    }

    pub fn selected_source(&self) -> Option<&str> {
        self.stock_policy
            .as_ref()
            .map(|policy| policy.selected_source.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOfferUpsert {
    pub provider_key: String,
    pub channel: SalesChannel,
    pub publish: bool,
    pub sell_price: Option<Decimal>,
    pub sell_currency: Option<String>,
    pub stock_policy: Option<StockPolicy>,
    pub computed_stock_qty: Option<i32>,
    pub computed_lead_time_days: Option<i32>,
    pub computed_cost: Option<Decimal>,
    pub missing_fields: MissingFields,
}

impl ChannelOfferUpsert {
    pub(crate) fn missing_field_names(&self) -> Vec<String> {
        self.missing_fields
            .iter()
            .map(|field| field.as_str().to_string())
            .collect()
    }
}

pub(crate) fn dedup_channel_offers(offers: Vec<ChannelOfferUpsert>) -> Vec<ChannelOfferUpsert> {
    let mut slots: HashMap<(String, SalesChannel), usize> = HashMap::with_capacity(offers.len());
    let mut out: Vec<ChannelOfferUpsert> = Vec::with_capacity(offers.len());
    for offer in offers {
        let key = (offer.provider_key.clone(), offer.channel);
        match slots.get(&key) {
            Some(&slot) => out[slot] = offer,
            None => {
                slots.insert(key, out.len());
                out.push(offer);
            }
        }
    }
    out
}

#[derive(Debug, Clone)]
/// Write one decision per (provider_key, channel), replacing every field.
///
/// A row without a winner clears its computed columns, so each write is a
/// complete recomputation.
pub struct UpsertChannelOffers {
    pub offers: Vec<ChannelOfferUpsert>,
}

impl Processor<UpsertChannelOffers> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:UpsertChannelOffers")]
    async fn process(&self, upsert: UpsertChannelOffers) -> Result<u64, sqlx::Error> {
        let offers = dedup_channel_offers(upsert.offers);
        if offers.is_empty() {
            return Ok(0);
        }

        let mut affected = 0;
        for chunk in offers.chunks(UPSERT_CHUNK) {
            let mut query_builder = sqlx::QueryBuilder::new(
                "INSERT INTO channel_offers \
                (provider_key, channel, publish, sell_price, sell_currency, stock_policy, \
                computed_stock_qty, computed_lead_time_days, computed_cost, missing_fields) ",
            );

            query_builder.push_values(chunk, |mut b, offer| {
                b.push_bind(&offer.provider_key)
                    .push_bind(offer.channel)
                    .push_bind(offer.publish)
                    .push_bind(offer.sell_price)
                    .push_bind(&offer.sell_currency)
                    .push_bind(offer.stock_policy.clone().map(Json))
                    .push_bind(offer.computed_stock_qty)
                    .push_bind(offer.computed_lead_time_days)
                    .push_bind(offer.computed_cost)
                    .push_bind(offer.missing_field_names());
            });

            query_builder.push(
                " ON CONFLICT (provider_key, channel) DO UPDATE SET \
                publish = EXCLUDED.publish, \
                sell_price = EXCLUDED.sell_price, \
                sell_currency = EXCLUDED.sell_currency, \
                stock_policy = EXCLUDED.stock_policy, \
                computed_stock_qty = EXCLUDED.computed_stock_qty, \
                computed_lead_time_days = EXCLUDED.computed_lead_time_days, \
                computed_cost = EXCLUDED.computed_cost, \
                missing_fields = EXCLUDED.missing_fields",
            );

            let result = query_builder.build().execute(&self.pool).await?;
            affected += result.rows_affected();
        }
        Ok(affected)
    }
}

#[derive(Debug, Clone, Copy)]
/// Every channel offer for a channel, in insertion order.
pub struct ListChannelOffers {
    pub channel: SalesChannel,
}

impl Processor<ListChannelOffers> for DatabaseProcessor {
    type Output = Vec<ChannelOffer>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListChannelOffers")]
    async fn process(&self, query: ListChannelOffers) -> Result<Vec<ChannelOffer>, sqlx::Error> {
        let offers = sqlx::query_as::<_, ChannelOffer>(
            r#"
            SELECT
                id,
                provider_key,
                channel,
                publish,
                sell_price,
                sell_currency,
                stock_policy,
                computed_stock_qty,
                computed_lead_time_days,
                computed_cost,
                missing_fields
            FROM channel_offers
            WHERE channel = $1
            ORDER BY id ASC
            "#,
        )
        .bind(query.channel)
        .fetch_all(&self.pool)
        .await?;
        Ok(offers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn stock_policy_serializes_camel_case() {
        let policy = StockPolicy {
            selected_source: "own_stock".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&policy).unwrap(),
            r#"{"selectedSource":"own_stock"}"#
        );
    }

    #[test]
    fn missing_fields_round_trip_through_names() {
        let upsert = ChannelOfferUpsert {
            provider_key: "A".to_string(),
            channel: SalesChannel::Galaxus,
            publish: false,
            sell_price: None,
            sell_currency: None,
            stock_policy: None,
            computed_stock_qty: None,
            computed_lead_time_days: None,
            computed_cost: None,
            missing_fields: smallvec![RequiredField::WeightGrams, RequiredField::Title],
        };
        let names = upsert.missing_field_names();
        assert_eq!(names, vec!["weightGrams", "title"]);

        let offer = ChannelOffer {
            id: 1,
            provider_key: "A".to_string(),
            channel: SalesChannel::Galaxus,
            publish: false,
            sell_price: None,
            sell_currency: None,
            stock_policy: None,
            computed_stock_qty: None,
            computed_lead_time_days: None,
            computed_cost: None,
            missing_fields: names,
        };
        assert_eq!(offer.missing_fields().unwrap(), upsert.missing_fields);
    }
}
