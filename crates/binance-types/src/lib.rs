//! Shared types for Binance spot depth and trade data
//!
//! This crate provides the wire and value types used across the workspace.
//! It has minimal dependencies and performs no I/O.
//!
//! # Key Types
//!
//! - [`PriceLevel`] - Orderbook price level with exact decimal values
//! - [`DiffEvent`] - Incremental depth update (`<symbol>@depth` stream)
//! - [`DepthSnapshot`] - REST `/api/v3/depth` response
//! - [`AggTrade`], [`TradeSide`] - Aggregate trades (`<symbol>@aggTrade`, `/api/v3/aggTrades`)
//! - [`StreamEnvelope`], [`StreamRequest`] - Combined-stream framing
//! - [`Symbol`], [`UpdateSpeed`] - Stream naming
//! - [`DecodeError`] - Payload decoding failures

pub mod enums;
pub mod error;
pub mod level;
pub mod messages;
pub mod symbol;

// Re-export commonly used types
pub use enums::*;
pub use error::*;
pub use level::*;
pub use messages::*;
pub use symbol::*;

// Re-export rust_decimal for users
pub use rust_decimal::Decimal;
