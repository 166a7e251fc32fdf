//! Public market data endpoints
//!
//! These endpoints don't require authentication.

use crate::error::{RestError, RestResult};
use binance_types::{AggTrade, DepthSnapshot, Symbol};
use reqwest::Client;
use tracing::{debug, instrument};

/// Largest `limit` the depth endpoint accepts
pub const MAX_DEPTH_LIMIT: u16 = 5000;

/// Largest `limit` the aggregate trades endpoint accepts
pub const MAX_AGG_TRADES_LIMIT: u16 = 1000;

/// Public market data endpoints
pub struct MarketEndpoints<'a> {
    client: &'a Client,
    base_url: &'a str,
}

impl<'a> MarketEndpoints<'a> {
    pub fn new(client: &'a Client, base_url: &'a str) -> Self {
        Self { client, base_url }
    }

    /// Get orderbook depth
    ///
    /// # Arguments
    /// * `symbol` - Trading pair (e.g., "BTCUSDT")
    /// * `limit` - Levels per side (1-5000)
    #[instrument(skip(self), fields(symbol = %symbol))]
    pub async fn get_depth(&self, symbol: &Symbol, limit: u16) -> RestResult<DepthSnapshot> {
        if limit == 0 || limit > MAX_DEPTH_LIMIT {
            return Err(RestError::InvalidParameter(format!(
                "depth limit {} outside 1..={}",
                limit, MAX_DEPTH_LIMIT
            )));
        }

        let url = depth_url(self.base_url, symbol, limit);
        debug!("Fetching depth snapshot");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(RestError::from_status(status.as_u16(), &body));
        }

        let snapshot = parse_depth(&body)?;
        debug!(
            last_update_id = snapshot.last_update_id,
            bids = snapshot.bids.len(),
            asks = snapshot.asks.len(),
            "Depth snapshot received"
        );
        Ok(snapshot)
    }

    /// Get the most recent aggregate trades, oldest first
    ///
    /// # Arguments
    /// * `symbol` - Trading pair
    /// * `limit` - Number of trades (1-1000)
    #[instrument(skip(self), fields(symbol = %symbol))]
    pub async fn get_agg_trades(&self, symbol: &Symbol, limit: u16) -> RestResult<Vec<AggTrade>> {
        if limit == 0 || limit > MAX_AGG_TRADES_LIMIT {
            return Err(RestError::InvalidParameter(format!(
                "aggTrades limit {} outside 1..={}",
                limit, MAX_AGG_TRADES_LIMIT
            )));
        }

        let url = market_url(self.base_url, "aggTrades", symbol, limit);
        debug!("Fetching aggregate trades");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(RestError::from_status(status.as_u16(), &body));
        }

        let trades = parse_agg_trades(&body)?;
        debug!(count = trades.len(), "Aggregate trades received");
        Ok(trades)
    }
}

fn market_url(base_url: &str, path: &str, symbol: &Symbol, limit: u16) -> String {
    format!(
        "{}/api/v3/{}?symbol={}&limit={}",
        base_url.trim_end_matches('/'),
        path,
        symbol,
        limit
    )
}

fn depth_url(base_url: &str, symbol: &Symbol, limit: u16) -> String {
    market_url(base_url, "depth", symbol, limit)
}

/// Decode a `/api/v3/depth` body
pub fn parse_depth(body: &str) -> RestResult<DepthSnapshot> {
    serde_json::from_str(body).map_err(|e| RestError::Parse(e.to_string()))
}

/// Decode a `/api/v3/aggTrades` body, rejecting malformed trades
pub fn parse_agg_trades(body: &str) -> RestResult<Vec<AggTrade>> {
    let trades: Vec<AggTrade> =
        serde_json::from_str(body).map_err(|e| RestError::Parse(e.to_string()))?;
    match trades.iter().find(|t| !t.is_well_formed()) {
        Some(bad) => Err(RestError::Parse(format!(
            "malformed aggregate trade {}",
            bad.agg_id
        ))),
        None => Ok(trades),
    }
}
