//! Snapshot + diff merge
//!
//! # Algorithm
//!
//! 1. Stale check: `u <= lastUpdateId` leaves the snapshot untouched.
//! 2. Per side, each change in arrival order is located by binary search in
//!    the side's sort order. Changes landing at index `>= depth` are skipped.
//!    An existing price is replaced (or removed on quantity 0); a new price
//!    is inserted (quantity 0 is a no-op). The side is then truncated.
//! 3. Ordering and crossing are re-checked; a failure discards the result.
//! 4. The new snapshot takes `lastUpdateId = u`.
//!
//! Changes are applied in arrival order, not sorted first, so several edits
//! to one price inside a single diff resolve to the last one.

use crate::error::Inconsistency;
use crate::snapshot::{BookSide, Snapshot};
use binance_types::{DiffEvent, PriceLevel};
use std::sync::Arc;

/// Default number of tracked levels per side
pub const DEFAULT_DEPTH: usize = 25;

/// Result of merging one diff into a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Diff applied; a new snapshot to publish
    Updated(Arc<Snapshot>),
    /// Diff already covered by the snapshot; the same snapshot, unchanged
    Stale(Arc<Snapshot>),
    /// Diff produced an invalid book; the pre-merge snapshot stands
    Inconsistent(Inconsistency),
}

impl MergeOutcome {
    /// Snapshot to keep after this outcome, if any
    pub fn snapshot(&self) -> Option<&Arc<Snapshot>> {
        match self {
            Self::Updated(s) | Self::Stale(s) => Some(s),
            Self::Inconsistent(_) => None,
        }
    }

    /// Check if the diff was applied
    pub fn is_updated(&self) -> bool {
        matches!(self, Self::Updated(_))
    }
}

/// Pure merge/validate logic for one symbol's book
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciler {
    depth: usize,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(DEFAULT_DEPTH)
    }
}

impl Reconciler {
    /// Create a reconciler tracking `depth` levels per side
    pub fn new(depth: usize) -> Self {
        Self { depth }
    }

    /// Tracked levels per side
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Merge a diff into the current snapshot
    pub fn merge(&self, current: &Arc<Snapshot>, diff: &DiffEvent) -> MergeOutcome {
        if diff.final_update_id <= current.last_update_id() {
            return MergeOutcome::Stale(Arc::clone(current));
        }

        let mut bids = current.bids().to_vec();
        let mut asks = current.asks().to_vec();

        merge_side(&mut bids, &diff.bid_changes, BookSide::Bid, self.depth);
        merge_side(&mut asks, &diff.ask_changes, BookSide::Ask, self.depth);

        let merged = Snapshot::from_parts(diff.final_update_id, bids, asks);
        match merged.validate() {
            Ok(()) => MergeOutcome::Updated(Arc::new(merged)),
            Err(reason) => MergeOutcome::Inconsistent(reason),
        }
    }

    /// First diff after a (re)snapshot must straddle the snapshot:
    /// `U <= lastUpdateId + 1 <= u`.
    pub fn check_bootstrap(&self, snapshot: &Snapshot, diff: &DiffEvent) -> Result<(), Inconsistency> {
        let Some(expected) = next_update_id(snapshot) else {
            return Err(Inconsistency::SequenceGap {
                expected: u64::MAX,
                first: diff.first_update_id,
                last: diff.final_update_id,
            });
        };
        if diff.covers(expected) {
            Ok(())
        } else {
            Err(Inconsistency::SequenceGap {
                expected,
                first: diff.first_update_id,
                last: diff.final_update_id,
            })
        }
    }

    /// Later diffs must not skip ahead: `U <= lastUpdateId + 1`.
    ///
    /// Stale diffs pass; the merge itself drops them.
    pub fn check_continuity(&self, snapshot: &Snapshot, diff: &DiffEvent) -> Result<(), Inconsistency> {
        // Nothing can follow u64::MAX, so every diff is stale
        let Some(expected) = next_update_id(snapshot) else {
            return Ok(());
        };
        if diff.first_update_id > expected {
            Err(Inconsistency::SequenceGap {
                expected,
                first: diff.first_update_id,
                last: diff.final_update_id,
            })
        } else {
            Ok(())
        }
    }
}

fn next_update_id(snapshot: &Snapshot) -> Option<u64> {
    snapshot.last_update_id().checked_add(1)
}

fn merge_side(levels: &mut Vec<PriceLevel>, changes: &[PriceLevel], side: BookSide, depth: usize) {
    for change in changes {
        let (index, found) = match levels.binary_search_by(|l| side.order(&l.price, &change.price)) {
            Ok(i) => (i, true),
            Err(i) => (i, false),
        };

        // Outside the tracked window
        if index >= depth {
            continue;
        }

        match (found, change.is_zero()) {
            (true, true) => {
                levels.remove(index);
            }
            (true, false) => levels[index] = *change,
            (false, false) => levels.insert(index, *change),
            (false, true) => {}
        }
    }

    levels.truncate(depth);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn levels(pairs: &[(Decimal, Decimal)]) -> Vec<PriceLevel> {
        pairs.iter().map(|&(p, q)| PriceLevel::new(p, q)).collect()
    }

    fn base_snapshot(last_update_id: u64) -> Arc<Snapshot> {
        Arc::new(
            Snapshot::new(
                last_update_id,
                levels(&[(dec!(1000), dec!(2)), (dec!(995), dec!(2))]),
                levels(&[(dec!(1100), dec!(4)), (dec!(1120), dec!(4))]),
            )
            .unwrap(),
        )
    }

    fn updated(outcome: MergeOutcome) -> Arc<Snapshot> {
        match outcome {
            MergeOutcome::Updated(s) => s,
            other => panic!("Expected Updated, got {:?}", other),
        }
    }

    #[test]
    fn test_merge_inserts_levels() {
        let reconciler = Reconciler::default();
        let diff = DiffEvent::new(
            1,
            2,
            levels(&[(dec!(1010), dec!(2)), (dec!(996), dec!(2))]),
            levels(&[(dec!(1090), dec!(2)), (dec!(1110), dec!(2))]),
        );

        let merged = updated(reconciler.merge(&base_snapshot(1), &diff));

        assert_eq!(merged.last_update_id(), 2);
        assert_eq!(
            merged.bids(),
            levels(&[
                (dec!(1010), dec!(2)),
                (dec!(1000), dec!(2)),
                (dec!(996), dec!(2)),
                (dec!(995), dec!(2)),
            ])
            .as_slice()
        );
        assert_eq!(
            merged.asks(),
            levels(&[
                (dec!(1090), dec!(2)),
                (dec!(1100), dec!(4)),
                (dec!(1110), dec!(2)),
                (dec!(1120), dec!(4)),
            ])
            .as_slice()
        );
    }

    #[test]
    fn test_merge_deletes_levels() {
        let reconciler = Reconciler::default();
        let diff = DiffEvent::new(
            1,
            2,
            levels(&[(dec!(995), dec!(0))]),
            levels(&[(dec!(1100), dec!(0))]),
        );

        let merged = updated(reconciler.merge(&base_snapshot(1), &diff));

        assert_eq!(merged.last_update_id(), 2);
        assert_eq!(merged.bids(), levels(&[(dec!(1000), dec!(2))]).as_slice());
        assert_eq!(merged.asks(), levels(&[(dec!(1120), dec!(4))]).as_slice());
    }

    #[test]
    fn test_merge_replaces_quantity() {
        let reconciler = Reconciler::default();
        let diff = DiffEvent::new(2, 2, levels(&[(dec!(1000), dec!(7.5))]), vec![]);

        let merged = updated(reconciler.merge(&base_snapshot(1), &diff));
        assert_eq!(merged.bids()[0], PriceLevel::new(dec!(1000), dec!(7.5)));
        assert_eq!(merged.bid_count(), 2);
    }

    #[test]
    fn test_delete_of_missing_level_is_noop() {
        let reconciler = Reconciler::default();
        let diff = DiffEvent::new(2, 3, levels(&[(dec!(997), dec!(0))]), vec![]);

        let merged = updated(reconciler.merge(&base_snapshot(1), &diff));
        assert_eq!(merged.bids(), base_snapshot(1).bids());
        assert_eq!(merged.last_update_id(), 3);
    }

    #[test]
    fn test_stale_diff_returns_same_snapshot() {
        let reconciler = Reconciler::default();
        let current = base_snapshot(2);
        let diff = DiffEvent::new(1, 1, levels(&[(dec!(1050), dec!(9))]), vec![]);

        match reconciler.merge(&current, &diff) {
            MergeOutcome::Stale(same) => {
                assert!(Arc::ptr_eq(&same, &current));
                assert_eq!(*same, *base_snapshot(2));
            }
            other => panic!("Expected Stale, got {:?}", other),
        }
    }

    #[test]
    fn test_diff_ending_at_snapshot_id_is_stale() {
        let reconciler = Reconciler::default();
        let diff = DiffEvent::new(1, 2, vec![], vec![]);
        assert!(matches!(
            reconciler.merge(&base_snapshot(2), &diff),
            MergeOutcome::Stale(_)
        ));
    }

    #[test]
    fn test_crossed_result_is_inconsistent() {
        let reconciler = Reconciler::default();
        let current = base_snapshot(1);
        let diff = DiffEvent::new(2, 2, levels(&[(dec!(1100), dec!(1))]), vec![]);

        let outcome = reconciler.merge(&current, &diff);
        assert_eq!(
            outcome,
            MergeOutcome::Inconsistent(Inconsistency::Crossed {
                best_bid: dec!(1100),
                best_ask: dec!(1100),
            })
        );
        assert!(outcome.snapshot().is_none());
        // Pre-merge snapshot untouched
        assert_eq!(current.last_update_id(), 1);
        assert_eq!(current.best_bid().unwrap().price, dec!(1000));
    }

    #[test]
    fn test_depth_window_skip_and_truncate() {
        let reconciler = Reconciler::new(3);
        let current = Arc::new(
            Snapshot::new(
                1,
                levels(&[(dec!(100), dec!(1)), (dec!(99), dec!(1)), (dec!(98), dec!(1))]),
                vec![],
            )
            .unwrap(),
        );

        // 97 would land at index 3: outside the window
        let diff = DiffEvent::new(2, 2, levels(&[(dec!(97), dec!(5))]), vec![]);
        let merged = updated(reconciler.merge(&current, &diff));
        assert_eq!(merged.bid_count(), 3);
        assert_eq!(merged.bids()[2].price, dec!(98));

        // A better price pushes the worst level out
        let diff = DiffEvent::new(3, 3, levels(&[(dec!(101), dec!(5))]), vec![]);
        let merged = updated(reconciler.merge(&merged, &diff));
        assert_eq!(merged.bid_count(), 3);
        assert_eq!(merged.bids()[0].price, dec!(101));
        assert_eq!(merged.bids()[2].price, dec!(99));
    }

    #[test]
    fn test_repeated_price_in_one_diff_applies_in_order() {
        let reconciler = Reconciler::default();
        let diff = DiffEvent::new(
            2,
            2,
            levels(&[(dec!(1001), dec!(3)), (dec!(1001), dec!(0)), (dec!(1001), dec!(4))]),
            vec![],
        );

        let merged = updated(reconciler.merge(&base_snapshot(1), &diff));
        assert_eq!(merged.bids()[0], PriceLevel::new(dec!(1001), dec!(4)));
        assert_eq!(merged.bid_count(), 3);
    }

    #[test]
    fn test_bootstrap_check() {
        let reconciler = Reconciler::default();
        let snapshot = base_snapshot(100);

        assert!(reconciler
            .check_bootstrap(&snapshot, &DiffEvent::new(95, 101, vec![], vec![]))
            .is_ok());
        assert!(reconciler
            .check_bootstrap(&snapshot, &DiffEvent::new(101, 101, vec![], vec![]))
            .is_ok());
        assert_eq!(
            reconciler.check_bootstrap(&snapshot, &DiffEvent::new(102, 110, vec![], vec![])),
            Err(Inconsistency::SequenceGap {
                expected: 101,
                first: 102,
                last: 110
            })
        );
        assert!(reconciler
            .check_bootstrap(&snapshot, &DiffEvent::new(90, 100, vec![], vec![]))
            .is_err());
    }

    #[test]
    fn test_continuity_check() {
        let reconciler = Reconciler::default();
        let snapshot = base_snapshot(100);

        assert!(reconciler
            .check_continuity(&snapshot, &DiffEvent::new(101, 105, vec![], vec![]))
            .is_ok());
        assert!(reconciler
            .check_continuity(&snapshot, &DiffEvent::new(50, 60, vec![], vec![]))
            .is_ok());
        assert!(reconciler
            .check_continuity(&snapshot, &DiffEvent::new(102, 105, vec![], vec![]))
            .unwrap_err()
            .is_sequence_gap());
    }

    #[test]
    fn test_sequence_checks_at_id_ceiling() {
        let reconciler = Reconciler::default();
        let snapshot = Snapshot::empty(u64::MAX);
        let diff = DiffEvent::new(u64::MAX, u64::MAX, vec![], vec![]);

        assert!(reconciler
            .check_bootstrap(&snapshot, &diff)
            .unwrap_err()
            .is_sequence_gap());
        assert!(reconciler.check_continuity(&snapshot, &diff).is_ok());
        assert!(matches!(
            reconciler.merge(&Arc::new(snapshot), &diff),
            MergeOutcome::Stale(_)
        ));
    }

    #[test]
    fn test_negative_quantity_is_inconsistent() {
        let reconciler = Reconciler::default();
        let current = Arc::new(
            Snapshot::new(
                1,
                levels(&[(dec!(1000), dec!(2))]),
                levels(&[(dec!(1100), dec!(4))]),
            )
            .unwrap(),
        );
        let diff = DiffEvent::new(2, 2, levels(&[(dec!(999), dec!(-3))]), vec![]);

        assert_eq!(
            reconciler.merge(&current, &diff),
            MergeOutcome::Inconsistent(Inconsistency::NegativeLevel {
                side: BookSide::Bid,
                price: dec!(999),
                quantity: dec!(-3),
            })
        );
        assert_eq!(current.bid_count(), 1);
    }

    // ------------------------------------------------------------------------
    // Long diff sequences against a reference book
    // ------------------------------------------------------------------------

    /// Exchange-side book: price -> quantity
    #[derive(Default)]
    struct ReferenceBook {
        bids: BTreeMap<Decimal, Decimal>,
        asks: BTreeMap<Decimal, Decimal>,
    }

    impl ReferenceBook {
        fn apply(&mut self, side: BookSide, change: PriceLevel) {
            let levels = match side {
                BookSide::Bid => &mut self.bids,
                BookSide::Ask => &mut self.asks,
            };
            if change.is_zero() {
                levels.remove(&change.price);
            } else {
                levels.insert(change.price, change.quantity);
            }
        }

        fn quantity(&self, side: BookSide, price: &Decimal) -> Option<Decimal> {
            match side {
                BookSide::Bid => self.bids.get(price).copied(),
                BookSide::Ask => self.asks.get(price).copied(),
            }
        }

        fn best_first(&self, side: BookSide) -> Vec<PriceLevel> {
            let to_level = |(&p, &q): (&Decimal, &Decimal)| PriceLevel::new(p, q);
            match side {
                BookSide::Bid => self.bids.iter().rev().map(to_level).collect(),
                BookSide::Ask => self.asks.iter().map(to_level).collect(),
            }
        }

        fn snapshot(&self, last_update_id: u64) -> Arc<Snapshot> {
            Arc::new(
                Snapshot::new(
                    last_update_id,
                    self.best_first(BookSide::Bid),
                    self.best_first(BookSide::Ask),
                )
                .unwrap(),
            )
        }
    }

    /// Random change: bids on 80..=100, asks on 101..=120, a third of them removals
    fn random_change(rng: &mut StdRng) -> (BookSide, PriceLevel) {
        let side = if rng.gen_bool(0.5) {
            BookSide::Bid
        } else {
            BookSide::Ask
        };
        let price = match side {
            BookSide::Bid => Decimal::from(rng.gen_range(80..=100)),
            BookSide::Ask => Decimal::from(rng.gen_range(101..=120)),
        };
        let quantity = if rng.gen_range(0..3) == 0 {
            Decimal::ZERO
        } else {
            Decimal::new(rng.gen_range(1..=5000), 2)
        };
        (side, PriceLevel::new(price, quantity))
    }

    /// Draw the next diff, applying it to the reference as the exchange would
    fn next_diff(rng: &mut StdRng, reference: &mut ReferenceBook, last_update_id: u64) -> DiffEvent {
        let mut bids = Vec::new();
        let mut asks = Vec::new();
        for _ in 0..rng.gen_range(1..=6) {
            let (side, change) = random_change(rng);
            reference.apply(side, change);
            match side {
                BookSide::Bid => bids.push(change),
                BookSide::Ask => asks.push(change),
            }
        }
        let changes = (bids.len() + asks.len()) as u64;
        DiffEvent::new(last_update_id + 1, last_update_id + changes, bids, asks)
    }

    fn assert_strictly_ordered(snapshot: &Snapshot) {
        for side in [BookSide::Bid, BookSide::Ask] {
            let levels = snapshot.side(side);
            assert!(
                levels
                    .windows(2)
                    .all(|pair| side.order(&pair[0].price, &pair[1].price) == std::cmp::Ordering::Less),
                "{} side out of order: {:?}",
                side,
                levels
            );
        }
    }

    #[test]
    fn test_diff_sequence_converges_to_reference() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut reference = ReferenceBook::default();
        for _ in 0..15 {
            let (side, change) = random_change(&mut rng);
            reference.apply(side, change);
        }

        // Wide enough that no change ever falls outside the window
        let reconciler = Reconciler::new(100);
        let mut current = reference.snapshot(1000);

        for _ in 0..500 {
            let diff = next_diff(&mut rng, &mut reference, current.last_update_id());
            current = updated(reconciler.merge(&current, &diff));

            assert_eq!(current.bids(), reference.best_first(BookSide::Bid).as_slice());
            assert_eq!(current.asks(), reference.best_first(BookSide::Ask).as_slice());
        }

        assert_eq!(*current, *reference.snapshot(current.last_update_id()));
    }

    #[test]
    fn test_bounded_book_stays_ordered_over_long_sequence() {
        const DEPTH: usize = 5;

        let mut rng = StdRng::seed_from_u64(42);
        let mut reference = ReferenceBook::default();
        let reconciler = Reconciler::new(DEPTH);
        let mut current = Arc::new(Snapshot::empty(1));
        let mut skipped = 0;

        for _ in 0..1000 {
            let diff = next_diff(&mut rng, &mut reference, current.last_update_id());
            current = updated(reconciler.merge(&current, &diff));

            assert_strictly_ordered(&current);
            assert!(current.bid_count() <= DEPTH && current.ask_count() <= DEPTH);

            // Every tracked level carries the exchange's current quantity
            for side in [BookSide::Bid, BookSide::Ask] {
                for level in current.side(side) {
                    assert_eq!(
                        reference.quantity(side, &level.price),
                        Some(level.quantity),
                        "{} {} diverged",
                        side,
                        level.price
                    );
                }
                skipped += reference.best_first(side).len() - current.side(side).len();
            }
        }

        // The window was actually exercised
        assert!(skipped > 0);
    }
}
