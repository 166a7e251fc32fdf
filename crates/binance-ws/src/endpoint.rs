//! WebSocket endpoint definitions

use std::fmt;

/// Binance spot combined-stream endpoints
///
/// All of them speak the `/stream` framing (`{"stream", "data"}`) and accept
/// `SUBSCRIBE` / `UNSUBSCRIBE` control messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endpoint {
    /// Production spot streams (default)
    #[default]
    Public,
    /// Production spot streams on port 9443
    Public9443,
    /// Market-data-only host
    MarketData,
    /// Spot testnet
    Testnet,
}

impl Endpoint {
    /// Get the WebSocket URL for this endpoint
    pub fn url(&self) -> &'static str {
        match self {
            Self::Public => "wss://stream.binance.com/stream",
            Self::Public9443 => "wss://stream.binance.com:9443/stream",
            Self::MarketData => "wss://data-stream.binance.vision/stream",
            Self::Testnet => "wss://testnet.binance.vision/stream",
        }
    }

    /// Matching REST base URL for depth snapshots
    ///
    /// Snapshot and stream must come from the same venue or their sequence
    /// numbers never line up.
    pub fn rest_base_url(&self) -> &'static str {
        match self {
            Self::Public | Self::Public9443 => "https://api.binance.com",
            Self::MarketData => "https://data-api.binance.vision",
            Self::Testnet => "https://testnet.binance.vision",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url())
    }
}
