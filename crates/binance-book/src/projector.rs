//! Cumulative depth ladder for rendering
//!
//! Rows pair the i-th bid with the i-th ask. Each side's fraction is the
//! running quantity up to that row over the total quantity of the rows
//! shown, so the deepest present row on a side reads exactly one.

use crate::snapshot::Snapshot;
use binance_types::PriceLevel;
use rust_decimal::Decimal;
use serde::Serialize;

/// One rendered row of the depth ladder
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DepthRow {
    /// Bid at this depth, if the book is that deep
    pub bid: Option<PriceLevel>,
    /// Ask at this depth, if the book is that deep
    pub ask: Option<PriceLevel>,
    /// Running bid quantity / total bid quantity; zero without a bid
    pub bid_cumulative_fraction: Decimal,
    /// Running ask quantity / total ask quantity; zero without an ask
    pub ask_cumulative_fraction: Decimal,
}

impl DepthRow {
    /// Row with neither side present (placeholder row)
    pub fn is_empty(&self) -> bool {
        self.bid.is_none() && self.ask.is_none()
    }
}

/// Projects snapshots onto a fixed number of ladder rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthProjector {
    rows: usize,
}

impl DepthProjector {
    /// Create a projector producing `rows` rows
    pub fn new(rows: usize) -> Self {
        Self { rows }
    }

    /// Number of rows produced
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Project a snapshot
    pub fn project(&self, snapshot: &Snapshot) -> Vec<DepthRow> {
        project(snapshot, self.rows)
    }
}

/// Build `rows` ladder rows from a snapshot
pub fn project(snapshot: &Snapshot, rows: usize) -> Vec<DepthRow> {
    let bids = snapshot.bids();
    let asks = snapshot.asks();

    let total_bid: Decimal = bids.iter().take(rows).map(|l| l.quantity).sum();
    let total_ask: Decimal = asks.iter().take(rows).map(|l| l.quantity).sum();

    let mut acc_bid = Decimal::ZERO;
    let mut acc_ask = Decimal::ZERO;

    (0..rows)
        .map(|i| {
            let bid = bids.get(i).copied();
            let ask = asks.get(i).copied();

            let bid_cumulative_fraction = match bid {
                Some(level) => {
                    acc_bid += level.quantity;
                    fraction(acc_bid, total_bid)
                }
                None => Decimal::ZERO,
            };
            let ask_cumulative_fraction = match ask {
                Some(level) => {
                    acc_ask += level.quantity;
                    fraction(acc_ask, total_ask)
                }
                None => Decimal::ZERO,
            };

            DepthRow {
                bid,
                ask,
                bid_cumulative_fraction,
                ask_cumulative_fraction,
            }
        })
        .collect()
}

fn fraction(running: Decimal, total: Decimal) -> Decimal {
    if total.is_zero() {
        Decimal::ZERO
    } else {
        running / total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn snapshot(bids: &[(Decimal, Decimal)], asks: &[(Decimal, Decimal)]) -> Snapshot {
        let to_levels = |pairs: &[(Decimal, Decimal)]| {
            pairs
                .iter()
                .map(|&(p, q)| PriceLevel::new(p, q))
                .collect::<Vec<_>>()
        };
        Snapshot::new(1, to_levels(bids), to_levels(asks)).unwrap()
    }

    #[test]
    fn test_single_level_fills_first_row() {
        let book = snapshot(&[(dec!(18267.22), dec!(0.32345))], &[(dec!(18723.23), dec!(84.3))]);
        let rows = project(&book, 25);

        assert_eq!(rows.len(), 25);
        assert_eq!(rows[0].bid_cumulative_fraction, Decimal::ONE);
        assert_eq!(rows[0].ask_cumulative_fraction, Decimal::ONE);
        for row in &rows[1..] {
            assert!(row.is_empty());
            assert_eq!(row.bid_cumulative_fraction, Decimal::ZERO);
            assert_eq!(row.ask_cumulative_fraction, Decimal::ZERO);
        }
    }

    #[test]
    fn test_cumulative_fractions() {
        let book = snapshot(
            &[(dec!(100), dec!(1)), (dec!(99), dec!(1)), (dec!(98), dec!(2))],
            &[(dec!(101), dec!(3)), (dec!(102), dec!(1))],
        );
        let rows = DepthProjector::new(4).project(&book);

        assert_eq!(rows[0].bid_cumulative_fraction, dec!(0.25));
        assert_eq!(rows[1].bid_cumulative_fraction, dec!(0.5));
        assert_eq!(rows[2].bid_cumulative_fraction, Decimal::ONE);
        assert_eq!(rows[0].ask_cumulative_fraction, dec!(0.75));
        assert_eq!(rows[1].ask_cumulative_fraction, Decimal::ONE);
        assert_eq!(rows[2].ask, None);
        assert_eq!(rows[2].ask_cumulative_fraction, Decimal::ZERO);
        assert!(rows[3].is_empty());
    }

    #[test]
    fn test_total_counts_only_projected_rows() {
        let book = snapshot(&[(dec!(100), dec!(1)), (dec!(99), dec!(3))], &[]);
        let rows = project(&book, 1);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].bid_cumulative_fraction, Decimal::ONE);
    }

    #[test]
    fn test_empty_book() {
        let rows = project(&Snapshot::empty(0), 3);
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(DepthRow::is_empty));
    }

    #[test]
    fn test_projection_is_deterministic() {
        let book = snapshot(&[(dec!(10), dec!(3))], &[(dec!(11), dec!(7))]);
        assert_eq!(project(&book, 5), project(&book, 5));
    }
}
