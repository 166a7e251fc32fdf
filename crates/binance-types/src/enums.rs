//! Stream method, update speed and trade side enums

use serde::{Deserialize, Serialize};
use std::fmt;

/// Control method for combined-stream subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StreamMethod {
    /// Start receiving the named streams
    Subscribe,
    /// Stop receiving the named streams
    Unsubscribe,
}

impl StreamMethod {
    /// Returns the method name as used in API messages
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
        }
    }
}

impl fmt::Display for StreamMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Push interval of the diff depth stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UpdateSpeed {
    /// One event per second (`<symbol>@depth`)
    #[default]
    Ms1000,
    /// One event per 100ms (`<symbol>@depth@100ms`)
    Ms100,
}

impl UpdateSpeed {
    /// Stream name suffix for this speed
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Ms1000 => "",
            Self::Ms100 => "@100ms",
        }
    }

    /// Interval in milliseconds
    pub fn as_millis(&self) -> u64 {
        match self {
            Self::Ms1000 => 1000,
            Self::Ms100 => 100,
        }
    }
}

/// Taker side of a trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    /// Taker bought (lifted an ask)
    Buy,
    /// Taker sold (hit a bid)
    Sell,
}

impl TradeSide {
    /// Side from Binance's "buyer is the maker" flag
    pub fn from_buyer_maker(is_buyer_maker: bool) -> Self {
        if is_buyer_maker {
            Self::Sell
        } else {
            Self::Buy
        }
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => f.write_str("buy"),
            Self::Sell => f.write_str("sell"),
        }
    }
}
