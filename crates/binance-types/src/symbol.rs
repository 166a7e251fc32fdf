//! Trading pair symbols (BTCUSDT format)

use crate::UpdateSpeed;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Binance spot symbol (uppercase, no separator: `BTCUSDT`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// BTC/USDT trading pair
    pub const BTC_USDT: &'static str = "BTCUSDT";
    /// ETH/USDT trading pair
    pub const ETH_USDT: &'static str = "ETHUSDT";
    /// BNB/USDT trading pair
    pub const BNB_USDT: &'static str = "BNBUSDT";

    /// Create a new symbol, normalising to uppercase
    pub fn new(s: impl AsRef<str>) -> Self {
        Self(s.as_ref().to_ascii_uppercase())
    }

    /// Get the symbol as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the diff depth stream for this symbol
    ///
    /// ```
    /// use binance_types::{Symbol, UpdateSpeed};
    ///
    /// let symbol = Symbol::new("BTCUSDT");
    /// assert_eq!(symbol.depth_stream(UpdateSpeed::Ms1000), "btcusdt@depth");
    /// assert_eq!(symbol.depth_stream(UpdateSpeed::Ms100), "btcusdt@depth@100ms");
    /// ```
    pub fn depth_stream(&self, speed: UpdateSpeed) -> String {
        format!("{}@depth{}", self.0.to_ascii_lowercase(), speed.suffix())
    }

    /// Name of the aggregate trade stream for this symbol
    ///
    /// ```
    /// use binance_types::Symbol;
    ///
    /// assert_eq!(Symbol::new("ethusdt").agg_trade_stream(), "ethusdt@aggTrade");
    /// ```
    pub fn agg_trade_stream(&self) -> String {
        format!("{}@aggTrade", self.0.to_ascii_lowercase())
    }
}

impl FromStr for Symbol {
    type Err = SymbolParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(SymbolParseError::Empty);
        }

        if let Some(c) = s.chars().find(|c| !c.is_ascii_alphanumeric()) {
            return Err(SymbolParseError::InvalidCharacter {
                symbol: s.to_string(),
                character: c,
            });
        }

        Ok(Self::new(s))
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Error parsing a symbol
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SymbolParseError {
    #[error("Symbol is empty")]
    Empty,

    #[error("Invalid character {character:?} in symbol: {symbol}")]
    InvalidCharacter { symbol: String, character: char },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_parse() {
        let symbol: Symbol = "btcusdt".parse().unwrap();
        assert_eq!(symbol.as_str(), "BTCUSDT");
        assert_eq!(symbol.to_string(), Symbol::BTC_USDT);
    }

    #[test]
    fn test_symbol_parse_error() {
        assert_eq!("".parse::<Symbol>(), Err(SymbolParseError::Empty));
        assert!("BTC/USD".parse::<Symbol>().is_err());
        assert!("BTC USDT".parse::<Symbol>().is_err());
    }

    #[test]
    fn test_depth_stream_name() {
        let symbol = Symbol::from("ethusdt");
        assert_eq!(symbol.depth_stream(UpdateSpeed::Ms1000), "ethusdt@depth");
        assert_eq!(symbol.depth_stream(UpdateSpeed::Ms100), "ethusdt@depth@100ms");
    }
}
