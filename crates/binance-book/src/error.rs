//! Book validity failures

use crate::snapshot::BookSide;
use rust_decimal::Decimal;
use thiserror::Error;

/// Reason a snapshot or merge result cannot be published
///
/// Always recoverable: the caller discards the attempt and resynchronizes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Inconsistency {
    /// Best bid is not strictly below best ask
    #[error("crossed book: best bid {best_bid} >= best ask {best_ask}")]
    Crossed { best_bid: Decimal, best_ask: Decimal },

    /// A side is not strictly ordered (or holds a duplicate price)
    #[error("{side} side out of order at index {index}")]
    Unsorted { side: BookSide, index: usize },

    /// The diff does not continue from the book's sequence number
    #[error("sequence gap: expected update {expected}, diff covers {first}..={last}")]
    SequenceGap { expected: u64, first: u64, last: u64 },

    /// A level carries a negative price or quantity
    #[error("{side} level [{price}, {quantity}] is negative")]
    NegativeLevel {
        side: BookSide,
        price: Decimal,
        quantity: Decimal,
    },
}

impl Inconsistency {
    /// True when the failure came from sequence numbers rather than book contents
    pub fn is_sequence_gap(&self) -> bool {
        matches!(self, Self::SequenceGap { .. })
    }
}
