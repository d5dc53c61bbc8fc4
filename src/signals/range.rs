//! Range bucketizer.
//!
//! Partitions symbols by intraday percentage move into three tiers per side.
//! Tier boundaries are symmetric: T1 `|pct| >= 2.0`, T2 `1.5..2.0`,
//! T3 `0.8..1.5`. Anything inside ±0.8 is left out.

use serde::{Deserialize, Serialize};
use std::fmt;

const TIER1_MIN: f64 = 2.0;
const TIER2_MIN: f64 = 1.5;
const TIER3_MIN: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    T1,
    T2,
    T3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Tier and side for a percentage move, or `None` when below tier 3.
pub fn tier_of(pct_change: f64) -> Option<(Tier, Side)> {
    if !pct_change.is_finite() {
        return None;
    }
    let side = if pct_change > 0.0 { Side::Buy } else { Side::Sell };
    let mag = pct_change.abs();

    let tier = if mag >= TIER1_MIN {
        Tier::T1
    } else if mag >= TIER2_MIN {
        Tier::T2
    } else if mag >= TIER3_MIN {
        Tier::T3
    } else {
        return None;
    };
    Some((tier, side))
}

/// Six lists, one per tier and side, most extreme move first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeBuckets<T> {
    pub t1_buy: Vec<T>,
    pub t1_sell: Vec<T>,
    pub t2_buy: Vec<T>,
    pub t2_sell: Vec<T>,
    pub t3_buy: Vec<T>,
    pub t3_sell: Vec<T>,
}

impl<T> Default for RangeBuckets<T> {
    fn default() -> Self {
        Self {
            t1_buy: Vec::new(),
            t1_sell: Vec::new(),
            t2_buy: Vec::new(),
            t2_sell: Vec::new(),
            t3_buy: Vec::new(),
            t3_sell: Vec::new(),
        }
    }
}

impl<T> RangeBuckets<T> {
    pub fn list(&self, tier: Tier, side: Side) -> &[T] {
        match (tier, side) {
            (Tier::T1, Side::Buy) => &self.t1_buy,
            (Tier::T1, Side::Sell) => &self.t1_sell,
            (Tier::T2, Side::Buy) => &self.t2_buy,
            (Tier::T2, Side::Sell) => &self.t2_sell,
            (Tier::T3, Side::Buy) => &self.t3_buy,
            (Tier::T3, Side::Sell) => &self.t3_sell,
        }
    }

    fn list_mut(&mut self, tier: Tier, side: Side) -> &mut Vec<T> {
        match (tier, side) {
            (Tier::T1, Side::Buy) => &mut self.t1_buy,
            (Tier::T1, Side::Sell) => &mut self.t1_sell,
            (Tier::T2, Side::Buy) => &mut self.t2_buy,
            (Tier::T2, Side::Sell) => &mut self.t2_sell,
            (Tier::T3, Side::Buy) => &mut self.t3_buy,
            (Tier::T3, Side::Sell) => &mut self.t3_sell,
        }
    }

    /// Total number of bucketed entries.
    pub fn len(&self) -> usize {
        self.t1_buy.len()
            + self.t1_sell.len()
            + self.t2_buy.len()
            + self.t2_sell.len()
            + self.t3_buy.len()
            + self.t3_sell.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Bucket `items` by the percentage move returned from `pct`.
///
/// Input order is the tie-break: each list is sorted by descending
/// `|pct|` with a stable sort.
pub fn bucketize<T, F>(items: impl IntoIterator<Item = T>, pct: F) -> RangeBuckets<T>
where
    F: Fn(&T) -> f64,
{
    let mut buckets = RangeBuckets::default();

    for item in items {
        if let Some((tier, side)) = tier_of(pct(&item)) {
            buckets.list_mut(tier, side).push(item);
        }
    }

    for tier in [Tier::T1, Tier::T2, Tier::T3] {
        for side in [Side::Buy, Side::Sell] {
            buckets
                .list_mut(tier, side)
                .sort_by(|a, b| pct(b).abs().total_cmp(&pct(a).abs()));
        }
    }

    buckets
}
