use crate::entities::channel_offer::{ListChannelOffers, UpsertChannelOffers};
use crate::entities::offer::{ListOffersWithSource, UpsertOffers};
use crate::entities::product_variant::{
    GetProductVariantsByKeys, ListProductVariants, UpsertProductVariants,
};
use crate::entities::source::UpsertSource;
use crate::entities::supplier_sku_map::ResolveSupplierSkus;
use crate::memory::MemoryStore;
use kanau::processor::Processor;
use sqlx::PgPool;
use std::sync::Arc;

/// Runs store queries against PostgreSQL.
#[derive(Debug, Clone)]
pub struct DatabaseProcessor {
    pub pool: PgPool,
}

/// The store backend a stage reads from and writes to.
///
/// Every query is implemented for both backends; this enum dispatches so that
/// stage code is written once.
#[derive(Debug, Clone)]
pub enum Store {
    Database(DatabaseProcessor),
    Memory(Arc<MemoryStore>),
}

impl Store {
    pub fn database(pool: PgPool) -> Self {
        Store::Database(DatabaseProcessor { pool })
    }

    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Store::Memory(store)
    }
}

macro_rules! dispatch_query {
    ($($query:ty),* $(,)?) => {
        $(
            impl Processor<$query> for Store {
                type Output = <DatabaseProcessor as Processor<$query>>::Output;
                type Error = sqlx::Error;

                async fn process(&self, query: $query) -> Result<Self::Output, sqlx::Error> {
                    match self {
                        Store::Database(db) => db.process(query).await,
                        Store::Memory(memory) => memory.as_ref().process(query).await,
                    }
                }
            }
        )*
    };
}

dispatch_query!(
    UpsertSource,
    UpsertOffers,
    ListOffersWithSource,
    ResolveSupplierSkus,
    UpsertProductVariants,
    ListProductVariants,
    GetProductVariantsByKeys,
    UpsertChannelOffers,
    ListChannelOffers,
);
