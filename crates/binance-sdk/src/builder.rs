//! Client Builder Pattern
//!
//! Fluent configuration for [`DepthClient`](crate::DepthClient), validated
//! before anything connects.
//!
//! # Example
//!
//! ```
//! use binance_sdk::builder::DepthClientBuilder;
//! use binance_types::UpdateSpeed;
//!
//! let builder = DepthClientBuilder::new(["BTCUSDT", "ETHUSDT"])
//!     .with_rows(20)
//!     .with_snapshot_limit(100)
//!     .with_update_speed(UpdateSpeed::Ms100);
//! assert!(builder.validate().is_ok());
//! ```

use crate::events::LoadKind;
use binance_book::DEFAULT_DEPTH;
use binance_rest::endpoints::market::MAX_AGG_TRADES_LIMIT;
use binance_rest::{SnapshotFetcher, TradeFetcher};
use binance_types::{Symbol, UpdateSpeed};
use binance_ws::{DiffStreamSource, Endpoint, StreamConfig, TradeStreamSource};
use std::sync::Arc;
use std::time::Duration;

/// Largest snapshot the REST depth endpoint serves
pub const MAX_SNAPSHOT_LIMIT: u16 = binance_rest::endpoints::market::MAX_DEPTH_LIMIT;

/// Default snapshot request size
pub const DEFAULT_SNAPSHOT_LIMIT: u16 = 50;

/// Configuration validation error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// No symbols specified
    #[error("at least one symbol must be specified")]
    NoSymbols,

    /// Invalid symbol format
    #[error("invalid symbol {symbol:?}: {reason}")]
    InvalidSymbol { symbol: String, reason: String },

    /// Row count out of range
    #[error("invalid row count: {rows} (must be 1..={max})")]
    InvalidRows { rows: usize, max: u16 },

    /// Snapshot limit out of range
    #[error("invalid snapshot limit: {limit} (must be 1..={max})")]
    InvalidSnapshotLimit { limit: u16, max: u16 },

    /// Snapshot would not fill the tracked rows
    #[error("snapshot limit {limit} is below row count {rows}")]
    SnapshotLimitBelowRows { limit: u16, rows: usize },

    /// Trade tape size out of range
    #[error("invalid trade row count: {rows} (must be 1..={max})")]
    InvalidTradeRows { rows: usize, max: u16 },

    /// Timeout too short
    #[error("connection timeout must be at least 1 second")]
    TimeoutTooShort,
}

/// Per-book reconciliation settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookConfig {
    /// Levels tracked and projected per side
    pub rows: usize,
    /// Levels requested per side in each snapshot
    pub snapshot_limit: u16,
    /// Initial load or forced refresh (status text only)
    pub load_kind: LoadKind,
    /// Resync when a streaming diff skips ahead of the book
    pub gap_detection: bool,
    /// Diffs held while waiting for a snapshot; the oldest go first
    pub max_buffered_diffs: usize,
    /// Resyncs allowed in a row before the book fails
    pub max_consecutive_resyncs: u32,
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            rows: DEFAULT_DEPTH,
            snapshot_limit: DEFAULT_SNAPSHOT_LIMIT,
            load_kind: LoadKind::Initial,
            gap_detection: true,
            max_buffered_diffs: 1000,
            max_consecutive_resyncs: 5,
        }
    }
}

impl BookConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set tracked rows per side
    pub fn with_rows(mut self, rows: usize) -> Self {
        self.rows = rows;
        self
    }

    /// Set snapshot request size
    pub fn with_snapshot_limit(mut self, limit: u16) -> Self {
        self.snapshot_limit = limit;
        self
    }

    /// Set load kind
    pub fn with_load_kind(mut self, kind: LoadKind) -> Self {
        self.load_kind = kind;
        self
    }

    /// Enable or disable streaming gap detection
    pub fn with_gap_detection(mut self, enabled: bool) -> Self {
        self.gap_detection = enabled;
        self
    }

    /// Set the bootstrap buffer bound
    pub fn with_max_buffered_diffs(mut self, max: usize) -> Self {
        self.max_buffered_diffs = max.max(1);
        self
    }

    /// Set the consecutive resync ceiling
    pub fn with_max_consecutive_resyncs(mut self, max: u32) -> Self {
        self.max_consecutive_resyncs = max;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rows == 0 || self.rows > MAX_SNAPSHOT_LIMIT as usize {
            return Err(ConfigError::InvalidRows {
                rows: self.rows,
                max: MAX_SNAPSHOT_LIMIT,
            });
        }

        if self.snapshot_limit == 0 || self.snapshot_limit > MAX_SNAPSHOT_LIMIT {
            return Err(ConfigError::InvalidSnapshotLimit {
                limit: self.snapshot_limit,
                max: MAX_SNAPSHOT_LIMIT,
            });
        }

        if (self.snapshot_limit as usize) < self.rows {
            return Err(ConfigError::SnapshotLimitBelowRows {
                limit: self.snapshot_limit,
                rows: self.rows,
            });
        }

        Ok(())
    }
}

/// Builder for configuring a depth client
///
/// Covers:
/// - Symbols to track
/// - Book settings (rows, snapshot size, resync behaviour)
/// - Stream settings (endpoint, update speed, timeout)
/// - Recent trades tape per symbol (off by default)
/// - Custom snapshot, diff and trade sources
#[derive(Clone)]
pub struct DepthClientBuilder {
    /// Symbols to track
    pub symbols: Vec<String>,

    /// Per-book settings
    pub book: BookConfig,

    /// WebSocket endpoint
    pub endpoint: Endpoint,

    /// Diff push interval
    pub update_speed: UpdateSpeed,

    /// Connection timeout (WebSocket connect and REST requests)
    pub connect_timeout: Duration,

    /// REST base URL; defaults to the endpoint's matching REST host
    pub rest_base_url: Option<String>,

    /// Snapshot source replacing the REST client
    pub fetcher: Option<Arc<dyn SnapshotFetcher>>,

    /// Diff source replacing the WebSocket stream
    pub source: Option<Arc<dyn DiffStreamSource>>,

    /// Trades kept per symbol; `None` runs no trade tape
    pub trade_rows: Option<usize>,

    /// Trade history source replacing the REST client
    pub trade_fetcher: Option<Arc<dyn TradeFetcher>>,

    /// Trade source replacing the WebSocket stream
    pub trade_source: Option<Arc<dyn TradeStreamSource>>,
}

impl Default for DepthClientBuilder {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
            book: BookConfig::default(),
            endpoint: Endpoint::Public,
            update_speed: UpdateSpeed::Ms1000,
            connect_timeout: Duration::from_secs(10),
            rest_base_url: None,
            fetcher: None,
            source: None,
            trade_rows: None,
            trade_fetcher: None,
            trade_source: None,
        }
    }
}

impl std::fmt::Debug for DepthClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DepthClientBuilder")
            .field("symbols", &self.symbols)
            .field("book", &self.book)
            .field("endpoint", &self.endpoint)
            .field("update_speed", &self.update_speed)
            .field("connect_timeout", &self.connect_timeout)
            .field("rest_base_url", &self.rest_base_url)
            .field("custom_fetcher", &self.fetcher.is_some())
            .field("custom_source", &self.source.is_some())
            .field("trade_rows", &self.trade_rows)
            .field("custom_trade_fetcher", &self.trade_fetcher.is_some())
            .field("custom_trade_source", &self.trade_source.is_some())
            .finish()
    }
}

impl DepthClientBuilder {
    /// Create a new builder with the specified symbols
    ///
    /// # Example
    ///
    /// ```
    /// use binance_sdk::builder::DepthClientBuilder;
    ///
    /// let builder = DepthClientBuilder::new(["BTCUSDT", "ETHUSDT"]);
    /// assert_eq!(builder.symbols.len(), 2);
    /// ```
    pub fn new(symbols: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            symbols: symbols.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Add a single symbol
    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbols.push(symbol.into());
        self
    }

    /// Add multiple symbols
    pub fn with_symbols(mut self, symbols: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.symbols.extend(symbols.into_iter().map(Into::into));
        self
    }

    /// Replace the per-book settings
    pub fn with_book_config(mut self, config: BookConfig) -> Self {
        self.book = config;
        self
    }

    /// Set tracked rows per side
    pub fn with_rows(mut self, rows: usize) -> Self {
        self.book.rows = rows;
        self
    }

    /// Set snapshot request size
    pub fn with_snapshot_limit(mut self, limit: u16) -> Self {
        self.book.snapshot_limit = limit;
        self
    }

    /// Enable or disable streaming gap detection
    pub fn with_gap_detection(mut self, enabled: bool) -> Self {
        self.book.gap_detection = enabled;
        self
    }

    /// Set the consecutive resync ceiling
    pub fn with_max_consecutive_resyncs(mut self, max: u32) -> Self {
        self.book.max_consecutive_resyncs = max;
        self
    }

    /// Set the WebSocket endpoint
    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Set the diff push interval
    pub fn with_update_speed(mut self, speed: UpdateSpeed) -> Self {
        self.update_speed = speed;
        self
    }

    /// Set the connection timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Override the REST base URL
    pub fn with_rest_base_url(mut self, url: impl Into<String>) -> Self {
        self.rest_base_url = Some(url.into());
        self
    }

    /// Use a custom snapshot source
    pub fn with_snapshot_fetcher(mut self, fetcher: Arc<dyn SnapshotFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Use a custom diff source
    pub fn with_diff_source(mut self, source: Arc<dyn DiffStreamSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Keep the latest `rows` aggregate trades for every symbol
    pub fn with_recent_trades(mut self, rows: usize) -> Self {
        self.trade_rows = Some(rows);
        self
    }

    /// Use a custom trade history source
    pub fn with_trade_fetcher(mut self, fetcher: Arc<dyn TradeFetcher>) -> Self {
        self.trade_fetcher = Some(fetcher);
        self
    }

    /// Use a custom trade source
    pub fn with_trade_source(mut self, source: Arc<dyn TradeStreamSource>) -> Self {
        self.trade_source = Some(source);
        self
    }

    /// Validate the configuration
    ///
    /// Returns `Ok(())` if the configuration is valid, otherwise returns
    /// a `ConfigError` describing the problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.parsed_symbols()?;
        self.book.validate()?;

        if let Some(rows) = self.trade_rows {
            if rows == 0 || rows > MAX_AGG_TRADES_LIMIT as usize {
                return Err(ConfigError::InvalidTradeRows {
                    rows,
                    max: MAX_AGG_TRADES_LIMIT,
                });
            }
        }

        if self.connect_timeout < Duration::from_secs(1) {
            return Err(ConfigError::TimeoutTooShort);
        }

        Ok(())
    }

    /// Parse the configured symbols, dropping duplicates
    pub fn parsed_symbols(&self) -> Result<Vec<Symbol>, ConfigError> {
        if self.symbols.is_empty() {
            return Err(ConfigError::NoSymbols);
        }

        let mut parsed: Vec<Symbol> = Vec::with_capacity(self.symbols.len());
        for raw in &self.symbols {
            let symbol: Symbol = raw.parse().map_err(|e: binance_types::SymbolParseError| {
                ConfigError::InvalidSymbol {
                    symbol: raw.clone(),
                    reason: e.to_string(),
                }
            })?;
            if !parsed.contains(&symbol) {
                parsed.push(symbol);
            }
        }
        Ok(parsed)
    }

    /// Stream settings derived from this builder
    pub fn to_stream_config(&self) -> StreamConfig {
        StreamConfig::new()
            .with_endpoint(self.endpoint)
            .with_update_speed(self.update_speed)
            .with_timeout(self.connect_timeout)
    }

    /// REST base URL to fetch snapshots from
    pub fn rest_base_url(&self) -> &str {
        self.rest_base_url
            .as_deref()
            .unwrap_or_else(|| self.endpoint.rest_base_url())
    }
}
