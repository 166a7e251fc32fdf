//! Book status and events
//!
//! Callers see a book through two channels: the latest [`BookView`] on a
//! `watch` channel, and an ordered [`BookEvent`] log on an `mpsc` channel.
//! Sequence numbers stay internal; [`BookStatus`] is all a UI needs to pick
//! between a spinner, the ladder, and an error banner.

use crate::error::BookError;
use binance_book::{DepthRow, Inconsistency, Snapshot};
use binance_types::{PriceLevel, Symbol};
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;

/// Why a book is loading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadKind {
    /// First load after subscribing
    #[default]
    Initial,
    /// Caller-requested reload of a running or failed book
    Refresh,
}

impl LoadKind {
    /// Status line shown while loading
    pub fn message(&self) -> &'static str {
        match self {
            Self::Initial => "Loading order book ...",
            Self::Refresh => "Refreshing order book ...",
        }
    }
}

/// Coarse book state for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookStatus {
    /// Waiting for the first snapshot
    Loading { kind: LoadKind },
    /// Snapshot installed, diffs being merged
    Live,
    /// Discarded an inconsistent state, fetching a fresh snapshot
    Resyncing,
    /// Stopped on a transport failure; restart with `DepthClient::refresh`
    Error(String),
}

impl BookStatus {
    /// Check if the book is live
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }

    /// Check if the book has stopped on an error
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Live or failed, i.e. not waiting on a snapshot
    pub fn is_settled(&self) -> bool {
        self.is_live() || self.is_error()
    }
}

impl fmt::Display for BookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loading { kind } => f.write_str(kind.message()),
            Self::Live => f.write_str("Live"),
            Self::Resyncing => f.write_str("Resyncing order book ..."),
            Self::Error(message) => write!(f, "Error: {}", message),
        }
    }
}

/// Latest published state of one book
///
/// Cheap to clone; the snapshot and rows are shared.
#[derive(Debug, Clone)]
pub struct BookView {
    /// Symbol
    pub symbol: Symbol,
    /// Current status
    pub status: BookStatus,
    /// Last published snapshot (kept through resyncs and failures)
    pub snapshot: Option<Arc<Snapshot>>,
    /// Depth ladder projected from `snapshot`
    pub rows: Arc<[DepthRow]>,
}

impl BookView {
    /// View of a book that has not loaded yet
    pub fn loading(symbol: Symbol, kind: LoadKind) -> Self {
        Self {
            symbol,
            status: BookStatus::Loading { kind },
            snapshot: None,
            rows: Arc::from(Vec::new()),
        }
    }

    /// Sequence number of the published snapshot
    pub fn last_update_id(&self) -> Option<u64> {
        self.snapshot.as_ref().map(|s| s.last_update_id())
    }

    /// Best bid level
    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.snapshot.as_ref().and_then(|s| s.best_bid().copied())
    }

    /// Best ask level
    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.snapshot.as_ref().and_then(|s| s.best_ask().copied())
    }

    /// Spread (ask - bid)
    pub fn spread(&self) -> Option<Decimal> {
        self.snapshot.as_ref().and_then(|s| s.spread())
    }

    /// Mid price
    pub fn mid_price(&self) -> Option<Decimal> {
        self.snapshot.as_ref().and_then(|s| s.mid_price())
    }
}

/// Book lifecycle events, in the order they happened
#[derive(Debug, Clone)]
pub enum BookEvent {
    /// Status changed
    Status { symbol: Symbol, status: BookStatus },
    /// New snapshot published
    Updated {
        symbol: Symbol,
        snapshot: Arc<Snapshot>,
    },
    /// Inconsistency detected, resync started
    Resync {
        symbol: Symbol,
        reason: Inconsistency,
    },
    /// Book stopped
    Failed { symbol: Symbol, error: BookError },
}

impl BookEvent {
    /// Symbol the event belongs to
    pub fn symbol(&self) -> &Symbol {
        match self {
            Self::Status { symbol, .. }
            | Self::Updated { symbol, .. }
            | Self::Resync { symbol, .. }
            | Self::Failed { symbol, .. } => symbol,
        }
    }
}
