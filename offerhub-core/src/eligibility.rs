//! Channel publish eligibility.

use crate::entities::SalesChannel;
use crate::entities::channel_offer::{ChannelOfferUpsert, StockPolicy};
use crate::entities::offer::OfferWithSource;
use crate::entities::product_variant::ProductVariant;
use offerhub_sdk::objects::{MissingFields, RequiredField};
use rust_decimal::Decimal;

fn present(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

/// Required master-data fields the variant lacks, in check order.
pub fn missing_fields(variant: &ProductVariant) -> MissingFields {
    RequiredField::ALL
        .into_iter()
        .filter(|field| match field {
            RequiredField::Gtin => !present(variant.gtin.as_deref()),
            RequiredField::WeightGrams => !variant.weight_grams.is_some_and(|w| w > 0),
            RequiredField::OriginCountry => !present(variant.origin_country.as_deref()),
            RequiredField::Title => !present(variant.title.as_deref()),
        })
        .collect()
}

/// Price and stock snapshot taken from the winning offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputedOffer {
    pub sell_price: Decimal,
    pub currency: String,
    pub stock_qty: i32,
    pub lead_time_days: Option<i32>,
    pub cost: Decimal,
    pub selected_source: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDecision {
    pub publish: bool,
    pub missing_fields: MissingFields,
    /// Present whenever a winner existed, even if the row cannot publish.
    pub computed: Option<ComputedOffer>,
}

impl ChannelDecision {
    pub fn is_data_complete(&self) -> bool {
        self.missing_fields.is_empty()
    }

    /// The row to persist. Without a winner every computed column is cleared.
    pub fn into_upsert(self, provider_key: String, channel: SalesChannel) -> ChannelOfferUpsert {
        let ChannelDecision {
            publish,
            missing_fields,
            computed,
        } = self;
        match computed {
            Some(c) => ChannelOfferUpsert {
                provider_key,
                channel,
                publish,
                sell_price: Some(c.sell_price),
                sell_currency: Some(c.currency),
                stock_policy: Some(StockPolicy {
                    selected_source: c.selected_source,
                }),
                computed_stock_qty: Some(c.stock_qty),
                computed_lead_time_days: c.lead_time_days,
                computed_cost: Some(c.cost),
                missing_fields,
            },
            None => ChannelOfferUpsert {
                provider_key,
                channel,
                publish,
                sell_price: None,
                sell_currency: None,
                stock_policy: None,
                computed_stock_qty: None,
                computed_lead_time_days: None,
                computed_cost: None,
                missing_fields,
            },
        }
    }
}

/// Decide whether `variant` may publish given the winning offer.
pub fn evaluate(variant: &ProductVariant, winner: Option<&OfferWithSource>) -> ChannelDecision {
    let missing_fields = missing_fields(variant);
    let computed = winner.map(|offer| ComputedOffer {
        sell_price: offer.cost,
        currency: offer.currency.clone(),
        stock_qty: offer.stock_qty,
        lead_time_days: offer.lead_time_days,
        cost: offer.cost,
        selected_source: offer.source_name.to_string(),
    });
    ChannelDecision {
        publish: computed.is_some() && missing_fields.is_empty(),
        missing_fields,
        computed,
    }
}
