//! Order book reconciliation engine for Binance depth data
//!
//! This crate holds the pure part of the local order book: merging a diff
//! into a snapshot, validating the result, and projecting it into a
//! cumulative depth ladder. It performs no I/O and never blocks.
//!
//! # Example
//!
//! ```
//! use binance_book::{MergeOutcome, Reconciler, Snapshot};
//! use binance_types::{DiffEvent, PriceLevel};
//! use rust_decimal_macros::dec;
//! use std::sync::Arc;
//!
//! let snapshot = Arc::new(
//!     Snapshot::new(
//!         1,
//!         vec![PriceLevel::new(dec!(1000), dec!(2))],
//!         vec![PriceLevel::new(dec!(1100), dec!(4))],
//!     )
//!     .unwrap(),
//! );
//!
//! let diff = DiffEvent::new(1, 2, vec![PriceLevel::new(dec!(1010), dec!(2))], vec![]);
//! let outcome = Reconciler::default().merge(&snapshot, &diff);
//! assert!(matches!(outcome, MergeOutcome::Updated(ref s) if s.last_update_id() == 2));
//! ```

pub mod error;
pub mod projector;
pub mod reconciler;
pub mod snapshot;

// Re-export main types
pub use error::Inconsistency;
pub use projector::{project, DepthProjector, DepthRow};
pub use reconciler::{MergeOutcome, Reconciler, DEFAULT_DEPTH};
pub use snapshot::{BookSide, Snapshot};
