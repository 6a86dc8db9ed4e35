use crate::entities::offer::UPSERT_CHUNK;
use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use std::collections::HashMap;

/// Master data for one sellable unit, keyed by provider key.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ProductVariant {
    pub provider_key: String,
    pub catalog_variant_id: Option<String>,
    pub title: Option<String>,
    pub brand: Option<String>,
    pub gtin: Option<String>,
    pub sku: Option<String>,
    pub weight_grams: Option<i32>,
    pub origin_country: Option<String>,
    pub image_url: Option<String>,
    pub size: Option<String>,
    pub color: Option<String>,
    pub attributes: serde_json::Value,
    pub updated_at: time::PrimitiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProductVariantUpsert {
    pub provider_key: String,
    pub catalog_variant_id: Option<String>,
    pub title: Option<String>,
    pub brand: Option<String>,
    pub gtin: Option<String>,
    pub sku: Option<String>,
    pub weight_grams: Option<i32>,
    pub origin_country: Option<String>,
    pub image_url: Option<String>,
    pub size: Option<String>,
    pub color: Option<String>,
    pub attributes: serde_json::Value,
}

pub(crate) fn dedup_variants(variants: Vec<ProductVariantUpsert>) -> Vec<ProductVariantUpsert> {
    let mut slots: HashMap<String, usize> = HashMap::with_capacity(variants.len());
    let mut out: Vec<ProductVariantUpsert> = Vec::with_capacity(variants.len());
    for variant in variants {
        match slots.get(&variant.provider_key) {
            Some(&slot) => out[slot] = variant,
            None => {
                slots.insert(variant.provider_key.clone(), out.len());
                out.push(variant);
            }
        }
    }
    out
}

#[derive(Debug, Clone)]
/// Insert or replace product variants keyed by provider key.
pub struct UpsertProductVariants {
    pub variants: Vec<ProductVariantUpsert>,
}

impl Processor<UpsertProductVariants> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:UpsertProductVariants")]
    async fn process(&self, upsert: UpsertProductVariants) -> Result<u64, sqlx::Error> {
        let variants = dedup_variants(upsert.variants);
        if variants.is_empty() {
            return Ok(0);
        }

        let mut affected = 0;
        for chunk in variants.chunks(UPSERT_CHUNK) {
            let mut query_builder = sqlx::QueryBuilder::new(
                "INSERT INTO product_variants \
                (provider_key, catalog_variant_id, title, brand, gtin, sku, weight_grams, \
                origin_country, image_url, size, color, attributes) ",
            );

            query_builder.push_values(chunk, |mut b, v| {
                b.push_bind(&v.provider_key)
                    .push_bind(&v.catalog_variant_id)
                    .push_bind(&v.title)
                    .push_bind(&v.brand)
                    .push_bind(&v.gtin)
                    .push_bind(&v.sku)
                    .push_bind(v.weight_grams)
                    .push_bind(&v.origin_country)
                    .push_bind(&v.image_url)
                    .push_bind(&v.size)
                    .push_bind(&v.color)
                    .push_bind(&v.attributes);
            });

            query_builder.push(
                " ON CONFLICT (provider_key) DO UPDATE SET \
                catalog_variant_id = EXCLUDED.catalog_variant_id, \
                title = EXCLUDED.title, \
                brand = EXCLUDED.brand, \
                gtin = EXCLUDED.gtin, \
                sku = EXCLUDED.sku, \
                weight_grams = EXCLUDED.weight_grams, \
                origin_country = EXCLUDED.origin_country, \
                image_url = EXCLUDED.image_url, \
                size = EXCLUDED.size, \
                color = EXCLUDED.color, \
                attributes = EXCLUDED.attributes, \
                updated_at = NOW()",
            );

            let result = query_builder.build().execute(&self.pool).await?;
            affected += result.rows_affected();
        }
        Ok(affected)
    }
}

const VARIANT_COLUMNS: &str = "provider_key, catalog_variant_id, title, brand, gtin, sku, \
    weight_grams, origin_country, image_url, size, color, attributes, updated_at";

#[derive(Debug, Clone, Copy)]
/// Every product variant, ordered by provider key.
pub struct ListProductVariants;

impl Processor<ListProductVariants> for DatabaseProcessor {
    type Output = Vec<ProductVariant>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListProductVariants")]
    async fn process(&self, _: ListProductVariants) -> Result<Vec<ProductVariant>, sqlx::Error> {
        let sql = format!("SELECT {VARIANT_COLUMNS} FROM product_variants ORDER BY provider_key ASC");
        let variants = sqlx::query_as::<_, ProductVariant>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(variants)
    }
}

#[derive(Debug, Clone)]
/// Fetch the variants among `keys` in one round trip.
///
/// Keys without a variant are simply absent from the result.
pub struct GetProductVariantsByKeys {
    pub keys: Vec<String>,
}

impl Processor<GetProductVariantsByKeys> for DatabaseProcessor {
    type Output = Vec<ProductVariant>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetProductVariantsByKeys")]
    async fn process(
        &self,
        query: GetProductVariantsByKeys,
    ) -> Result<Vec<ProductVariant>, sqlx::Error> {
        if query.keys.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {VARIANT_COLUMNS} FROM product_variants \
            WHERE provider_key = ANY($1) ORDER BY provider_key ASC"
        );
        let variants = sqlx::query_as::<_, ProductVariant>(&sql)
            .bind(&query.keys)
            .fetch_all(&self.pool)
            .await?;
        Ok(variants)
    }
}
