//! Re-exports for convenience
//!
//! Import everything you need with:
//! ```
//! use binance_sdk::prelude::*;
//! ```

// Client
pub use crate::builder::{BookConfig, ConfigError, DepthClientBuilder};
pub use crate::client::{BookEventReceiver, DepthClient};
pub use crate::controller::{BookSync, ResyncController, SyncState, SyncStep};
pub use crate::error::BookError;
pub use crate::events::{BookEvent, BookStatus, BookView, LoadKind};
pub use crate::trades::{TapeStatus, TradeTape, TradeTapeController, TradeView, DEFAULT_TRADE_ROWS};

// Types from binance-types
pub use binance_types::{AggTrade, DepthSnapshot, DiffEvent, PriceLevel, Symbol, TradeSide, UpdateSpeed};

// Reconciliation
pub use binance_book::{project, BookSide, DepthRow, Inconsistency, MergeOutcome, Snapshot};

// Sources
pub use binance_rest::{BinanceRestClient, RestError, SnapshotFetcher, TradeFetcher};
pub use binance_ws::{
    BinanceDiffStream, DiffStreamSource, DiffSubscription, Endpoint, ReconnectConfig, StreamError,
    TradeStreamSource, TradeSubscription,
};

// Decimal for prices/quantities
pub use rust_decimal::Decimal;
