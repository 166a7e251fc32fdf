//! Snapshot source seams
//!
//! The book controller only needs "give me a depth snapshot for this symbol",
//! and the trade tape only "give me the latest trades".
//! [`BinanceRestClient`](crate::BinanceRestClient) is the production
//! implementation of both; tests substitute canned responses.

use crate::error::RestResult;
use async_trait::async_trait;
use binance_types::{AggTrade, DepthSnapshot, Symbol};
use std::sync::Arc;

/// One-shot full depth snapshot request
#[async_trait]
pub trait SnapshotFetcher: Send + Sync {
    /// Fetch up to `limit` levels per side for `symbol`
    async fn fetch(&self, symbol: &Symbol, limit: u16) -> RestResult<DepthSnapshot>;
}

#[async_trait]
impl<T: SnapshotFetcher + ?Sized> SnapshotFetcher for Arc<T> {
    async fn fetch(&self, symbol: &Symbol, limit: u16) -> RestResult<DepthSnapshot> {
        (**self).fetch(symbol, limit).await
    }
}

/// One-shot recent aggregate trades request
#[async_trait]
pub trait TradeFetcher: Send + Sync {
    /// Fetch the latest `limit` trades for `symbol`, oldest first
    async fn fetch_trades(&self, symbol: &Symbol, limit: u16) -> RestResult<Vec<AggTrade>>;
}

#[async_trait]
impl<T: TradeFetcher + ?Sized> TradeFetcher for Arc<T> {
    async fn fetch_trades(&self, symbol: &Symbol, limit: u16) -> RestResult<Vec<AggTrade>> {
        (**self).fetch_trades(symbol, limit).await
    }
}
