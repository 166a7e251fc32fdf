//! Self-healing Binance order book replica
//!
//! Keeps a local copy of the top of a Binance spot order book by combining a
//! REST depth snapshot with the `<symbol>@depth` diff stream. Subscribes
//! first, buffers while the snapshot loads, drains the buffer, and resyncs
//! from a fresh snapshot whenever the merged book stops making sense.
//! Optionally keeps a short tape of recent aggregate trades per symbol.
//!
//! # Quick Start
//!
//! ```no_run
//! use binance_sdk::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = DepthClient::builder(["BTCUSDT", "ETHUSDT"])
//!         .with_rows(10)
//!         .connect()
//!         .await?;
//!
//!     let mut events = client.events().unwrap();
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             BookEvent::Updated { symbol, snapshot } => {
//!                 println!("{}: mid = {:?}", symbol, snapshot.mid_price());
//!             }
//!             BookEvent::Failed { symbol, error } => {
//!                 eprintln!("{} failed: {}", symbol, error);
//!                 client.refresh(symbol.as_str()).await?;
//!             }
//!             _ => {}
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Failure model
//!
//! - Inconsistent merges (crossed book, bad ordering, sequence gaps) resync
//!   automatically and keep the last good snapshot visible.
//! - Transport failures stop the book with `BookStatus::Error`; restarting is
//!   up to the caller, e.g. `DepthClient::refresh` driven by a
//!   `ReconnectConfig` backoff.

pub mod builder;
pub mod client;
pub mod controller;
pub mod error;
pub mod events;
pub mod prelude;
pub mod trades;

// Re-export main types
pub use builder::{BookConfig, ConfigError, DepthClientBuilder};
pub use client::DepthClient;
pub use controller::{ResyncController, SyncState};
pub use error::BookError;
pub use events::{BookEvent, BookStatus, BookView, LoadKind};
pub use trades::{TapeStatus, TradeTape, TradeTapeController, TradeView};

// Re-export commonly used types from dependencies
pub use binance_book::{DepthRow, Snapshot};
pub use binance_types::{AggTrade, PriceLevel, Symbol, TradeSide};
pub use binance_ws::{Endpoint, ReconnectConfig};
