//! Best-offer selection.
//!
//! Offers for one product are ranked by source priority (lower rank first),
//! then stock (higher first), then cost (cheaper first). A complete tie keeps
//! the offer encountered first.

use crate::entities::offer::OfferWithSource;
use compact_str::CompactString;
use std::cmp::{Ordering, Reverse};
use std::collections::HashMap;

/// Rank given to any source missing from the priority table.
pub const UNKNOWN_SOURCE_RANK: u32 = 99;

const DEFAULT_PRIORITY: [(&str, u32); 7] = [
    ("own_stock", 1),
    ("supplier1", 2),
    ("own", 3),
    ("friend", 4),
    ("suppliera", 5),
    ("supplierb", 6),
    ("stockx", 7),
];

/// Immutable source name to rank table. Lookups ignore ASCII case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePriority {
    ranks: HashMap<CompactString, u32>,
}

impl Default for SourcePriority {
    fn default() -> Self {
        Self::from_ranks(DEFAULT_PRIORITY)
    }
}

impl SourcePriority {
    pub fn from_ranks<I, S>(ranks: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: AsRef<str>,
    {
        let ranks = ranks
            .into_iter()
            .map(|(name, rank)| (CompactString::from(name.as_ref().to_ascii_lowercase()), rank))
            .collect();
        Self { ranks }
    }

    pub fn rank(&self, source_name: &str) -> u32 {
        self.ranks
            .get(source_name.to_ascii_lowercase().as_str())
            .copied()
            .unwrap_or(UNKNOWN_SOURCE_RANK)
    }
}

#[derive(Debug, Clone, Default)]
pub struct OfferSelector {
    priority: SourcePriority,
}

impl OfferSelector {
    pub fn new(priority: SourcePriority) -> Self {
        Self { priority }
    }

    pub fn priority(&self) -> &SourcePriority {
        &self.priority
    }

    fn sort_key<'a>(&self, offer: &'a OfferWithSource) -> (u32, Reverse<i32>, &'a rust_decimal::Decimal) {
        (
            self.priority.rank(&offer.source_name),
            Reverse(offer.stock_qty),
            &offer.cost,
        )
    }

    /// `Less` when `a` is preferred over `b`.
    pub fn preference(&self, a: &OfferWithSource, b: &OfferWithSource) -> Ordering {
        self.sort_key(a).cmp(&self.sort_key(b))
    }

    /// The winning offer among `offers`, or `None` when there are none.
    pub fn select_best<'a>(&self, offers: &'a [OfferWithSource]) -> Option<&'a OfferWithSource> {
        // `min_by` returns the first of several equal minima.
        offers.iter().min_by(|a, b| self.preference(a, b))
    }
}
