//! REST client for Binance spot depth snapshots
//!
//! Provides the one-shot `/api/v3/depth` request the order book controller
//! uses to (re)anchor a book, behind the [`SnapshotFetcher`] trait, and the
//! `/api/v3/aggTrades` request seeding a trade tape, behind [`TradeFetcher`].
//!
//! # Example
//!
//! ```no_run
//! use binance_rest::{BinanceRestClient, SnapshotFetcher};
//! use binance_types::Symbol;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = BinanceRestClient::new()?;
//!     let snapshot = client.fetch(&Symbol::new("BTCUSDT"), 50).await?;
//!     println!("{} bids", snapshot.bids.len());
//!     Ok(())
//! }
//! ```
//!
//! # Rate Limiting
//!
//! `/api/v3/depth` weight grows with `limit` (5 up to 100 levels). A 429 or
//! 418 comes back as [`RestError::Status`]; see [`RestError::is_rate_limited`].

pub mod client;
pub mod endpoints;
pub mod error;
pub mod fetcher;

// Re-export main types
pub use client::{BinanceRestClient, ClientConfig, DEFAULT_BASE_URL};
pub use error::{RestError, RestResult};
pub use fetcher::{SnapshotFetcher, TradeFetcher};
