//! Immutable order book snapshot
//!
//! A [`Snapshot`] is only ever built through a validating constructor or by
//! the reconciler, so every value in circulation satisfies:
//!
//! - bids strictly descending, asks strictly ascending (no duplicate prices)
//! - best bid strictly below best ask when both sides are present
//! - no negative price or quantity
//!
//! The depth bound is enforced by whoever builds the snapshot
//! ([`Snapshot::from_depth`] truncates, the reconciler truncates after merge).

use crate::error::Inconsistency;
use binance_types::{DepthSnapshot, PriceLevel};
use rust_decimal::Decimal;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

/// Side of the book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BookSide {
    /// Buy side, best (highest) price first
    Bid,
    /// Sell side, best (lowest) price first
    Ask,
}

impl BookSide {
    /// Position of a resting level relative to a target price, in this
    /// side's sort order. `Less` means the level sorts before the target.
    pub fn order(&self, level_price: &Decimal, target: &Decimal) -> Ordering {
        match self {
            Self::Bid => target.cmp(level_price),
            Self::Ask => level_price.cmp(target),
        }
    }

    /// Check a side is strictly ordered, returning the first offending index
    pub fn check_sorted(&self, levels: &[PriceLevel]) -> Result<(), Inconsistency> {
        match levels
            .windows(2)
            .position(|pair| self.order(&pair[0].price, &pair[1].price) != Ordering::Less)
        {
            Some(i) => Err(Inconsistency::Unsorted {
                side: *self,
                index: i + 1,
            }),
            None => Ok(()),
        }
    }
}

impl fmt::Display for BookSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bid => f.write_str("bid"),
            Self::Ask => f.write_str("ask"),
        }
    }
}

/// Full, self-consistent order book state tagged with a sequence number
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    /// Sequence number the book is consistent with
    last_update_id: u64,
    /// Bid levels (highest first)
    bids: Vec<PriceLevel>,
    /// Ask levels (lowest first)
    asks: Vec<PriceLevel>,
}

impl Snapshot {
    /// Build a snapshot, checking ordering and crossing
    pub fn new(
        last_update_id: u64,
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
    ) -> Result<Self, Inconsistency> {
        let snapshot = Self {
            last_update_id,
            bids,
            asks,
        };
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// An empty book at a given sequence number
    pub fn empty(last_update_id: u64) -> Self {
        Self {
            last_update_id,
            bids: Vec::new(),
            asks: Vec::new(),
        }
    }

    /// Normalise a REST snapshot: drop zero-quantity levels, keep the best
    /// `depth` levels per side, then validate.
    pub fn from_depth(depth_snapshot: DepthSnapshot, depth: usize) -> Result<Self, Inconsistency> {
        let DepthSnapshot {
            last_update_id,
            bids,
            asks,
        } = depth_snapshot;

        let keep = |levels: Vec<PriceLevel>| -> Vec<PriceLevel> {
            levels
                .into_iter()
                .filter(|l| !l.is_zero())
                .take(depth)
                .collect()
        };

        Self::new(last_update_id, keep(bids), keep(asks))
    }

    /// Internal constructor for merge results, validated by the caller
    pub(crate) fn from_parts(
        last_update_id: u64,
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
    ) -> Self {
        Self {
            last_update_id,
            bids,
            asks,
        }
    }

    /// Check the ordering, sign and non-crossing invariants
    pub fn validate(&self) -> Result<(), Inconsistency> {
        for (side, levels) in [(BookSide::Bid, &self.bids), (BookSide::Ask, &self.asks)] {
            side.check_sorted(levels)?;
            if let Some(level) = levels.iter().find(|l| !l.is_non_negative()) {
                return Err(Inconsistency::NegativeLevel {
                    side,
                    price: level.price,
                    quantity: level.quantity,
                });
            }
        }

        if let (Some(bid), Some(ask)) = (self.best_bid(), self.best_ask()) {
            if bid.price >= ask.price {
                return Err(Inconsistency::Crossed {
                    best_bid: bid.price,
                    best_ask: ask.price,
                });
            }
        }

        Ok(())
    }

    /// Sequence number
    pub fn last_update_id(&self) -> u64 {
        self.last_update_id
    }

    /// Bid levels, best first
    pub fn bids(&self) -> &[PriceLevel] {
        &self.bids
    }

    /// Ask levels, best first
    pub fn asks(&self) -> &[PriceLevel] {
        &self.asks
    }

    /// Levels for one side
    pub fn side(&self, side: BookSide) -> &[PriceLevel] {
        match side {
            BookSide::Bid => &self.bids,
            BookSide::Ask => &self.asks,
        }
    }

    /// Get the best bid
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.first()
    }

    /// Get the best ask
    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.first()
    }

    /// Get the spread (ask - bid)
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_ask(), self.best_bid()) {
            (Some(ask), Some(bid)) => Some(ask.price - bid.price),
            _ => None,
        }
    }

    /// Get the mid price ((ask + bid) / 2)
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_ask(), self.best_bid()) {
            (Some(ask), Some(bid)) => Some((ask.price + bid.price) / Decimal::TWO),
            _ => None,
        }
    }

    /// Total resting quantity on one side
    pub fn total_quantity(&self, side: BookSide) -> Decimal {
        self.side(side).iter().map(|l| l.quantity).sum()
    }

    /// Number of bid levels
    pub fn bid_count(&self) -> usize {
        self.bids.len()
    }

    /// Number of ask levels
    pub fn ask_count(&self) -> usize {
        self.asks.len()
    }

    /// Check if both sides are empty
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}
