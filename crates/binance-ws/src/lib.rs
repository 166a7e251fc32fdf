//! WebSocket stream client for Binance spot depth and trades
//!
//! This crate delivers `<symbol>@depth` diff events and `<symbol>@aggTrade`
//! trades over Binance's combined-stream endpoint. It only moves and decodes
//! frames; keeping a consistent book is `binance-sdk`'s job.
//!
//! # Features
//!
//! - Subscribe-then-acknowledge handshake before a subscription is handed out
//! - One connection per subscription, released on unsubscribe or drop
//! - Malformed frames dropped and logged, never surfaced as diffs
//! - Transport abstraction with a `MockTransport` (feature `test-utils`)
//!
//! # Example
//!
//! ```no_run
//! use binance_ws::{BinanceDiffStream, DiffStreamSource, StreamConfig};
//! use binance_types::Symbol;
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = BinanceDiffStream::new(StreamConfig::default());
//!     let mut diffs = source.subscribe(&Symbol::new("BTCUSDT")).await?;
//!
//!     while let Some(diff) = diffs.next().await {
//!         let diff = diff?;
//!         println!("U={} u={}", diff.first_update_id, diff.final_update_id);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod endpoint;
pub mod reconnect;
pub mod stream;
pub mod transport;

// Re-export main types
pub use endpoint::Endpoint;
pub use reconnect::ReconnectConfig;
pub use stream::{
    BinanceDiffStream, DiffResult, DiffStreamSource, DiffSubscription, StreamConfig, StreamError,
    StreamPayload, Subscription, TradeResult, TradeStreamSource, TradeSubscription,
    TransportFactory,
};
pub use transport::{Transport, TransportError, WsTransport};

#[cfg(any(test, feature = "test-utils"))]
pub use transport::{MockTransport, SentLog};
