//! Shopify catalog snapshot.
//!
//! Pages through the Admin GraphQL `productVariants` connection and upserts
//! one product variant per Shopify variant that carries a provider key.

use super::{FeedAdapter, IngestError, http_client, json_text, non_blank, parse_number};
use crate::entities::product_variant::{ProductVariantUpsert, UpsertProductVariants};
use crate::framework::Store;
use async_trait::async_trait;
use kanau::processor::Processor;
use offerhub_sdk::objects::IngestSummary;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, error, info};

const NAME: &str = "shopify";

const PRODUCT_VARIANTS_QUERY: &str = r#"
query productVariants($cursor: String) {
  productVariants(first: 100, after: $cursor) {
    edges {
      node {
        id
        sku
        barcode
        title
        weight
        weightUnit
        image { url }
        product {
          title
          vendor
          metafields(first: 20) { edges { node { namespace key value } } }
        }
        selectedOptions { name value }
        metafields(first: 20) { edges { node { namespace key value } } }
      }
    }
    pageInfo { hasNextPage endCursor }
  }
}
"#;

const PROVIDER_KEY_FIELDS: [&str; 3] = ["custom.provider_key", "custom.providerKey", "provider_key"];
const ORIGIN_COUNTRY_FIELDS: [&str; 3] =
    ["custom.origin_country", "origin_country", "originCountry"];

#[derive(Debug, Clone)]
pub struct ShopifyConfig {
    pub shop: String,
    pub access_token: String,
    pub api_version: String,
}

impl ShopifyConfig {
    pub fn endpoint(&self) -> String {
        format!(
            "https://{}/admin/api/{}/graphql.json",
            self.shop, self.api_version
        )
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<GraphQlData>,
    errors: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphQlData {
    product_variants: VariantConnection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VariantConnection {
    edges: Vec<Edge<VariantNode>>,
    page_info: PageInfo,
}

#[derive(Debug, Deserialize)]
struct Edge<T> {
    node: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct MetafieldConnection {
    #[serde(default)]
    edges: Vec<Edge<Metafield>>,
}

#[derive(Debug, Deserialize)]
struct Metafield {
    namespace: String,
    key: String,
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Image {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SelectedOption {
    name: String,
    value: String,
}

#[derive(Debug, Default, Deserialize)]
struct ProductNode {
    title: Option<String>,
    vendor: Option<String>,
    #[serde(default)]
    metafields: Option<MetafieldConnection>,
}

/// A Shopify product variant as returned by the Admin API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantNode {
    id: String,
    sku: Option<String>,
    barcode: Option<String>,
    title: Option<String>,
    weight: Option<serde_json::Value>,
    weight_unit: Option<String>,
    image: Option<Image>,
    product: Option<ProductNode>,
    #[serde(default)]
    selected_options: Vec<SelectedOption>,
    metafields: Option<MetafieldConnection>,
}

/// Both `namespace.key` and bare `key` map to the value.
fn metafield_map(connection: Option<&MetafieldConnection>) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for Edge { node } in connection.map(|c| c.edges.as_slice()).unwrap_or_default() {
        let Some(value) = node.value.clone() else {
            continue;
        };
        map.insert(format!("{}.{}", node.namespace, node.key), value.clone());
        map.insert(node.key.clone(), value);
    }
    map
}

fn first_present(map: &HashMap<String, String>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| non_blank(map.get(*key).map(String::as_str)))
        .map(str::to_string)
}

fn weight_unit_factor(unit: &str) -> Decimal {
    match unit.to_ascii_uppercase().as_str() {
        "KG" | "KILOGRAMS" => dec!(1000),
        "LB" | "POUNDS" => dec!(453.592),
        "OZ" | "OUNCES" => dec!(28.35),
        _ => Decimal::ONE,
    }
}

/// Weight in whole grams. Zero or absent weights and missing units yield `None`.
pub fn to_grams(weight: Option<Decimal>, unit: Option<&str>) -> Option<i32> {
    let weight = weight.filter(|w| !w.is_zero())?;
    let unit = non_blank(unit)?;
    (weight * weight_unit_factor(unit))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i32()
}

fn option_value(options: &[SelectedOption], needle: &str) -> Option<String> {
    options
        .iter()
        .find(|o| o.name.to_lowercase().contains(needle))
        .map(|o| o.value.clone())
}

/// Convert a Shopify variant into a product variant, or `None` when it
/// carries no provider key.
pub fn normalize_variant(node: &VariantNode) -> Option<ProductVariantUpsert> {
    let provider_key = match non_blank(node.sku.as_deref()) {
        Some(sku) => sku.to_string(),
        None => first_present(&metafield_map(node.metafields.as_ref()), &PROVIDER_KEY_FIELDS)?,
    };

    let product = node.product.as_ref();
    let product_meta = metafield_map(product.and_then(|p| p.metafields.as_ref()));
    let weight = json_text(node.weight.as_ref()).and_then(|w| parse_number(&w));
    let attributes: serde_json::Map<String, serde_json::Value> = node
        .selected_options
        .iter()
        .map(|o| (o.name.clone(), serde_json::Value::String(o.value.clone())))
        .collect();

    Some(ProductVariantUpsert {
        catalog_variant_id: Some(node.id.clone()),
        title: product
            .and_then(|p| p.title.clone())
            .or_else(|| node.title.clone())
            .or_else(|| Some(provider_key.clone())),
        brand: product.and_then(|p| p.vendor.clone()),
        gtin: node.barcode.clone(),
        sku: node.sku.clone(),
        weight_grams: to_grams(weight, node.weight_unit.as_deref()),
        origin_country: first_present(&product_meta, &ORIGIN_COUNTRY_FIELDS),
        image_url: node.image.as_ref().and_then(|i| i.url.clone()),
        size: option_value(&node.selected_options, "size"),
        color: option_value(&node.selected_options, "color"),
        attributes: serde_json::Value::Object(attributes),
        provider_key,
    })
}

#[derive(Debug, Clone)]
pub struct ShopifyCatalogFeed {
    store: Store,
    config: ShopifyConfig,
    http_client: reqwest::Client,
}

impl ShopifyCatalogFeed {
    pub fn new(store: Store, config: ShopifyConfig) -> Self {
        Self {
            store,
            config,
            http_client: http_client(),
        }
    }

    async fn fetch_page(&self, cursor: Option<&str>) -> Result<VariantConnection, IngestError> {
        let response = self
            .http_client
            .post(self.config.endpoint())
            .header("X-Shopify-Access-Token", &self.config.access_token)
            .json(&serde_json::json!({
                "query": PRODUCT_VARIANTS_QUERY,
                "variables": { "cursor": cursor },
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), body = %body, "Shopify request failed");
            return Err(IngestError::Status {
                adapter: NAME,
                status: status.as_u16(),
                body,
            });
        }

        let payload: GraphQlResponse = response.json().await?;
        if let Some(errors) = payload.errors {
            error!(errors = %errors, "Shopify GraphQL error");
            return Err(IngestError::Parse(format!("GraphQL errors: {errors}")));
        }
        payload
            .data
            .map(|d| d.product_variants)
            .ok_or_else(|| IngestError::Parse("GraphQL response without data".to_string()))
    }
}

#[async_trait]
impl FeedAdapter for ShopifyCatalogFeed {
    fn name(&self) -> &'static str {
        NAME
    }

    #[tracing::instrument(skip_all, err, fields(shop = %self.config.shop))]
    async fn ingest(&self) -> Result<IngestSummary, IngestError> {
        let mut cursor: Option<String> = None;
        let mut rows = 0;
        let mut upserted = 0;
        let mut unmapped = 0;

        loop {
            let page = self.fetch_page(cursor.as_deref()).await?;
            rows += page.edges.len();

            let mut variants = Vec::with_capacity(page.edges.len());
            for Edge { node } in &page.edges {
                match normalize_variant(node) {
                    Some(variant) => variants.push(variant),
                    None => {
                        debug!(variant_id = %node.id, "Variant without provider key skipped");
                        unmapped += 1;
                    }
                }
            }
            upserted += self.store.process(UpsertProductVariants { variants }).await?;

            match (page.page_info.has_next_page, page.page_info.end_cursor) {
                (true, Some(next)) => cursor = Some(next),
                _ => break,
            }
        }

        info!(rows, upserted, unmapped, "Shopify snapshot complete");
        Ok(IngestSummary {
            adapter: NAME.to_string(),
            rows,
            upserted,
            unmapped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(value: serde_json::Value) -> VariantNode {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn weights_convert_to_grams_exactly() {
        assert_eq!(to_grams(Some(dec!(0.85)), Some("KILOGRAMS")), Some(850));
        assert_eq!(to_grams(Some(dec!(2)), Some("lb")), Some(907));
        assert_eq!(to_grams(Some(dec!(10)), Some("OZ")), Some(284));
        assert_eq!(to_grams(Some(dec!(500)), Some("G")), Some(500));
        assert_eq!(to_grams(Some(Decimal::ZERO), Some("KG")), None);
        assert_eq!(to_grams(Some(dec!(1)), None), None);
    }

    #[test]
    fn variant_maps_master_data() {
        let variant = normalize_variant(&node(serde_json::json!({
            "id": "gid://shopify/ProductVariant/1",
            "sku": "DD1391-100-42",
            "barcode": "0195866123456",
            "title": "42 / White",
            "weight": 1.2,
            "weightUnit": "KILOGRAMS",
            "image": { "url": "https://cdn.example.test/1.jpg" },
            "product": {
                "title": "Dunk Low",
                "vendor": "Nike",
                "metafields": { "edges": [
                    { "node": { "namespace": "custom", "key": "origin_country", "value": "VN" } }
                ] }
            },
            "selectedOptions": [
                { "name": "Shoe Size", "value": "42" },
                { "name": "Color", "value": "White" }
            ],
            "metafields": { "edges": [] }
        })))
        .unwrap();

        assert_eq!(variant.provider_key, "DD1391-100-42");
        assert_eq!(variant.title.as_deref(), Some("Dunk Low"));
        assert_eq!(variant.brand.as_deref(), Some("Nike"));
        assert_eq!(variant.gtin.as_deref(), Some("0195866123456"));
        assert_eq!(variant.weight_grams, Some(1200));
        assert_eq!(variant.origin_country.as_deref(), Some("VN"));
        assert_eq!(variant.size.as_deref(), Some("42"));
        assert_eq!(variant.color.as_deref(), Some("White"));
        assert_eq!(
            variant.attributes,
            serde_json::json!({ "Shoe Size": "42", "Color": "White" })
        );
    }

    #[test]
    fn provider_key_falls_back_to_metafields() {
        let variant = normalize_variant(&node(serde_json::json!({
            "id": "gid://shopify/ProductVariant/2",
            "sku": "",
            "metafields": { "edges": [
                { "node": { "namespace": "custom", "key": "providerKey", "value": "PK-2" } }
            ] }
        })))
        .unwrap();
        assert_eq!(variant.provider_key, "PK-2");
        assert_eq!(variant.title.as_deref(), Some("PK-2"));
        assert_eq!(variant.weight_grams, None);
    }

    #[test]
    fn variant_without_any_key_is_skipped() {
        let skipped = normalize_variant(&node(serde_json::json!({
            "id": "gid://shopify/ProductVariant/3",
            "sku": null
        })));
        assert!(skipped.is_none());
    }
}
