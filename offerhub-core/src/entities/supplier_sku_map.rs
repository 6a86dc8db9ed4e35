use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use std::collections::HashMap;

/// Maps a supplier-local SKU to the canonical provider key.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct SupplierSkuMap {
    pub source_id: i64,
    pub supplier_sku: String,
    pub provider_key: String,
}

#[derive(Debug, Clone)]
/// Resolve many supplier SKUs of one source in a single query.
///
/// SKUs without a mapping are absent from the returned map.
pub struct ResolveSupplierSkus {
    pub source_id: i64,
    pub skus: Vec<String>,
}

impl Processor<ResolveSupplierSkus> for DatabaseProcessor {
    type Output = HashMap<String, String>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ResolveSupplierSkus")]
    async fn process(
        &self,
        query: ResolveSupplierSkus,
    ) -> Result<HashMap<String, String>, sqlx::Error> {
        if query.skus.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, SupplierSkuMap>(
            r#"
            SELECT source_id, supplier_sku, provider_key
            FROM supplier_sku_map
            WHERE source_id = $1 AND supplier_sku = ANY($2)
            "#,
        )
        .bind(query.source_id)
        .bind(&query.skus)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.supplier_sku, row.provider_key))
            .collect())
    }
}
