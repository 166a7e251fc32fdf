//! Integration tests against Binance's public stream endpoint
//!
//! These tests make real WebSocket connections.
//! Run with: cargo test -p binance-ws --test integration_tests -- --ignored

use binance_types::{Symbol, UpdateSpeed};
use binance_ws::{BinanceDiffStream, DiffStreamSource, Endpoint, StreamConfig, TradeStreamSource};
use futures::StreamExt;
use std::time::Duration;
use tokio::time::timeout;

#[tokio::test]
#[ignore = "Makes real WebSocket connection"]
async fn test_live_diff_stream() {
    let source = BinanceDiffStream::new(
        StreamConfig::new()
            .with_endpoint(Endpoint::Public)
            .with_update_speed(UpdateSpeed::Ms100),
    );

    let mut diffs = source
        .subscribe(&Symbol::new("BTCUSDT"))
        .await
        .expect("Should subscribe");

    let first = timeout(Duration::from_secs(10), diffs.next())
        .await
        .expect("Diff timed out")
        .expect("Stream ended")
        .expect("Stream error");
    assert!(first.first_update_id <= first.final_update_id);

    let second = timeout(Duration::from_secs(10), diffs.next())
        .await
        .expect("Diff timed out")
        .expect("Stream ended")
        .expect("Stream error");
    assert!(second.first_update_id > first.final_update_id);

    diffs.unsubscribe().await;
}

#[tokio::test]
#[ignore = "Makes real WebSocket connection"]
async fn test_live_unknown_symbol_is_silent() {
    // Binance acknowledges subscriptions to unknown streams and never pushes
    let source = BinanceDiffStream::new(StreamConfig::default());
    let mut diffs = source
        .subscribe(&Symbol::new("NOSUCHPAIR"))
        .await
        .expect("Should subscribe");

    assert!(timeout(Duration::from_secs(3), diffs.next()).await.is_err());
    diffs.unsubscribe().await;
}

#[tokio::test]
#[ignore = "Makes real WebSocket connection"]
async fn test_live_trade_stream() {
    let source = BinanceDiffStream::new(StreamConfig::default());
    let mut trades = source
        .subscribe_trades(&Symbol::new("BTCUSDT"))
        .await
        .expect("Should subscribe");

    let trade = timeout(Duration::from_secs(30), trades.next())
        .await
        .expect("Trade timed out")
        .expect("Stream ended")
        .expect("Stream error");
    assert!(trade.is_well_formed());
    assert_eq!(trade.symbol.as_deref(), Some("BTCUSDT"));

    trades.unsubscribe().await;
}
