pub mod channel_offer;
pub mod offer;
pub mod product_variant;
pub mod source;
pub mod supplier_sku_map;

use offerhub_sdk::objects::Channel as SdkChannel;

/// How a source delivers its offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "source_type")]
pub enum SourceType {
    Csv,
    Api,
}

/// Sales channel for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `offerhub_sdk::objects::Channel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, sqlx::Type)]
#[sqlx(rename_all = "UPPERCASE", type_name = "sales_channel")]
pub enum SalesChannel {
    Galaxus,
}

impl From<SalesChannel> for SdkChannel {
    fn from(value: SalesChannel) -> Self {
        match value {
            SalesChannel::Galaxus => SdkChannel::Galaxus,
        }
    }
}

impl From<SdkChannel> for SalesChannel {
    fn from(value: SdkChannel) -> Self {
        match value {
            SdkChannel::Galaxus => SalesChannel::Galaxus,
        }
    }
}
