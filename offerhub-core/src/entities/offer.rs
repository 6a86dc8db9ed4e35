use crate::framework::DatabaseProcessor;
use compact_str::CompactString;
use kanau::processor::Processor;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Postgres caps bind parameters per statement; eight columns per row keeps
/// this well under the limit.
pub(crate) const UPSERT_CHUNK: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Offer {
    pub id: i64,
    pub provider_key: String,
    pub source_id: i64,
    pub supplier_sku: Option<String>,
    pub stock_qty: i32,
    pub cost: Decimal,
    pub currency: String,
    pub lead_time_days: Option<i32>,
    pub last_seen_at: time::PrimitiveDateTime,
    pub raw_json: serde_json::Value,
}

/// An offer joined with the name of the source that made it.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct OfferWithSource {
    pub id: i64,
    pub provider_key: String,
    pub source_id: i64,
    pub source_name: CompactString,
    pub stock_qty: i32,
    pub cost: Decimal,
    pub currency: String,
    pub lead_time_days: Option<i32>,
    pub last_seen_at: time::PrimitiveDateTime,
}

/// Data for inserting or replacing one source's offer for one product.
#[derive(Debug, Clone, PartialEq)]
pub struct OfferUpsert {
    pub provider_key: String,
    pub source_id: i64,
    pub supplier_sku: Option<String>,
    pub stock_qty: i32,
    pub cost: Decimal,
    pub currency: String,
    pub lead_time_days: Option<i32>,
    pub raw_json: serde_json::Value,
}

/// Keep the last row per (provider key, source), preserving first-seen order.
pub(crate) fn dedup_offers(offers: Vec<OfferUpsert>) -> Vec<OfferUpsert> {
    let mut slots: HashMap<(String, i64), usize> = HashMap::with_capacity(offers.len());
    let mut out: Vec<OfferUpsert> = Vec::with_capacity(offers.len());
    for offer in offers {
        let key = (offer.provider_key.clone(), offer.source_id);
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
/// Insert or replace offers keyed by (provider_key, source_id).
///
/// Offers absent from the batch are left untouched; staleness is tracked
/// through `last_seen_at`. Returns the number of rows written.
pub struct UpsertOffers {
    pub offers: Vec<OfferUpsert>,
}

impl Processor<UpsertOffers> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:UpsertOffers")]
    async fn process(&self, upsert: UpsertOffers) -> Result<u64, sqlx::Error> {
        let offers = dedup_offers(upsert.offers);
        if offers.is_empty() {
            return Ok(0);
        }

        let mut affected = 0;
        for chunk in offers.chunks(UPSERT_CHUNK) {
            let mut query_builder = sqlx::QueryBuilder::new(
                "INSERT INTO offers \
                (provider_key, source_id, supplier_sku, stock_qty, cost, currency, lead_time_days, raw_json) ",
            );

            query_builder.push_values(chunk, |mut b, offer| {
                b.push_bind(&offer.provider_key)
                    .push_bind(offer.source_id)
                    .push_bind(&offer.supplier_sku)
                    .push_bind(offer.stock_qty)
                    .push_bind(offer.cost)
                    .push_bind(&offer.currency)
                    .push_bind(offer.lead_time_days)
                    .push_bind(&offer.raw_json);
            });

            query_builder.push(
                " ON CONFLICT (provider_key, source_id) DO UPDATE SET \
                supplier_sku = EXCLUDED.supplier_sku, \
                stock_qty = EXCLUDED.stock_qty, \
                cost = EXCLUDED.cost, \
                currency = EXCLUDED.currency, \
                lead_time_days = EXCLUDED.lead_time_days, \
                raw_json = EXCLUDED.raw_json, \
                last_seen_at = NOW()",
            );

            let result = query_builder.build().execute(&self.pool).await?;
            affected += result.rows_affected();
        }
        Ok(affected)
    }
}

#[derive(Debug, Clone, Copy)]
/// Every offer joined with its source name, in stable id order.
pub struct ListOffersWithSource;

impl Processor<ListOffersWithSource> for DatabaseProcessor {
    type Output = Vec<OfferWithSource>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListOffersWithSource")]
    async fn process(&self, _: ListOffersWithSource) -> Result<Vec<OfferWithSource>, sqlx::Error> {
        let offers = sqlx::query_as::<_, OfferWithSource>(
            r#"
            SELECT
                o.id,
                o.provider_key,
                o.source_id,
                s.name AS source_name,
                o.stock_qty,
                o.cost,
                o.currency,
                o.lead_time_days,
                o.last_seen_at
            FROM offers o
            JOIN sources s ON s.id = o.source_id
            ORDER BY o.provider_key ASC, o.id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(offers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn upsert(key: &str, source_id: i64, stock: i32) -> OfferUpsert {
        OfferUpsert {
            provider_key: key.to_string(),
            source_id,
            supplier_sku: None,
            stock_qty: stock,
            cost: dec!(10),
            currency: "CHF".to_string(),
            lead_time_days: None,
            raw_json: serde_json::Value::Null,
        }
    }

    #[test]
    fn dedup_keeps_last_row_in_first_position() {
        let deduped = dedup_offers(vec![
            upsert("A", 1, 1),
            upsert("B", 1, 2),
            upsert("A", 1, 3),
            upsert("A", 2, 4),
        ]);
        let stocks: Vec<_> = deduped
            .iter()
            .map(|o| (o.provider_key.as_str(), o.source_id, o.stock_qty))
            .collect();
        assert_eq!(stocks, vec![("A", 1, 3), ("B", 1, 2), ("A", 2, 4)]);
    }
}
