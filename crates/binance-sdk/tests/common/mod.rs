//! Common test utilities for integration tests
//!
//! Scripted snapshot, trade and diff sources: the test decides when each
//! REST response and each stream item is delivered.

#![allow(dead_code)]

use async_trait::async_trait;
use binance_rest::{RestError, RestResult, SnapshotFetcher, TradeFetcher};
use binance_sdk::{BookEvent, BookView, TradeView};
use binance_types::{AggTrade, DepthSnapshot, DiffEvent, PriceLevel, Symbol};
use binance_ws::{
    DiffResult, DiffStreamSource, DiffSubscription, StreamError, TradeResult, TradeStreamSource,
    TradeSubscription,
};
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// How long any single wait may take before the test fails
pub const WAIT: Duration = Duration::from_secs(5);

/// Call order shared by the fetcher and the source
pub type CallLog = Arc<Mutex<Vec<String>>>;

// ============================================================================
// Snapshot source
// ============================================================================

struct Script {
    tx: mpsc::UnboundedSender<RestResult<DepthSnapshot>>,
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<RestResult<DepthSnapshot>>>>,
}

impl Script {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
        }
    }
}

/// Snapshot source answering each request with the next scripted response
///
/// A request blocks until the test pushes a response for that symbol.
pub struct ScriptedFetcher {
    scripts: Mutex<HashMap<Symbol, Script>>,
    log: CallLog,
}

impl ScriptedFetcher {
    pub fn new(log: CallLog) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            log,
        }
    }

    /// Queue the response to the next request for `symbol`
    pub fn respond(&self, symbol: &str, response: RestResult<DepthSnapshot>) {
        let mut scripts = self.scripts.lock();
        let script = scripts.entry(Symbol::new(symbol)).or_insert_with(Script::new);
        let _ = script.tx.send(response);
    }

    /// Number of requests made for `symbol`
    pub fn calls(&self, symbol: &str) -> usize {
        let prefix = format!("fetch {}", Symbol::new(symbol));
        self.log.lock().iter().filter(|c| c.starts_with(&prefix)).count()
    }
}

#[async_trait]
impl SnapshotFetcher for ScriptedFetcher {
    async fn fetch(&self, symbol: &Symbol, limit: u16) -> RestResult<DepthSnapshot> {
        self.log.lock().push(format!("fetch {} {}", symbol, limit));
        let rx = {
            let mut scripts = self.scripts.lock();
            let script = scripts.entry(symbol.clone()).or_insert_with(Script::new);
            Arc::clone(&script.rx)
        };
        let mut rx = rx.lock().await;
        rx.recv()
            .await
            .unwrap_or_else(|| Err(RestError::Parse("script exhausted".into())))
    }
}

// ============================================================================
// Diff source
// ============================================================================

/// Sending half of one subscription
pub struct Feed {
    pub symbol: Symbol,
    pub tx: mpsc::UnboundedSender<DiffResult>,
}

impl Feed {
    pub fn diff(&self, diff: DiffEvent) {
        self.tx.send(Ok(diff)).expect("subscription dropped");
    }

    pub fn error(&self, error: StreamError) {
        self.tx.send(Err(error)).expect("subscription dropped");
    }

    /// Wait until the subscriber has released the subscription
    pub async fn closed(&self) {
        tokio::time::timeout(WAIT, self.tx.closed())
            .await
            .expect("subscription was not released");
    }
}

/// Diff source backed by channels; every subscription is handed to the test
pub struct ChannelSource {
    feeds: mpsc::UnboundedSender<Feed>,
    reject: Mutex<Option<StreamError>>,
    log: CallLog,
}

impl ChannelSource {
    pub fn new(log: CallLog) -> (Self, mpsc::UnboundedReceiver<Feed>) {
        let (feeds, rx) = mpsc::unbounded_channel();
        let source = Self {
            feeds,
            reject: Mutex::new(None),
            log,
        };
        (source, rx)
    }

    /// Fail the next subscribe call
    pub fn reject_next(&self, error: StreamError) {
        *self.reject.lock() = Some(error);
    }
}

#[async_trait]
impl DiffStreamSource for ChannelSource {
    async fn subscribe(&self, symbol: &Symbol) -> Result<DiffSubscription, StreamError> {
        self.log.lock().push(format!("subscribe {}", symbol));
        if let Some(error) = self.reject.lock().take() {
            return Err(error);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = self.feeds.send(Feed {
            symbol: symbol.clone(),
            tx,
        });
        Ok(DiffSubscription::from_channel(symbol.clone(), rx))
    }
}

// ============================================================================
// Trade sources
// ============================================================================

/// Trade history source answering each request with the next scripted list
pub struct ScriptedTradeFetcher {
    tx: mpsc::UnboundedSender<RestResult<Vec<AggTrade>>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<RestResult<Vec<AggTrade>>>>,
    log: CallLog,
}

impl ScriptedTradeFetcher {
    pub fn new(log: CallLog) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: tokio::sync::Mutex::new(rx),
            log,
        }
    }

    /// Queue the response to the next request
    pub fn respond(&self, response: RestResult<Vec<AggTrade>>) {
        let _ = self.tx.send(response);
    }

    pub fn calls(&self) -> Vec<String> {
        self.log
            .lock()
            .iter()
            .filter(|c| c.starts_with("trades"))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TradeFetcher for ScriptedTradeFetcher {
    async fn fetch_trades(&self, symbol: &Symbol, limit: u16) -> RestResult<Vec<AggTrade>> {
        self.log.lock().push(format!("trades {} {}", symbol, limit));
        self.rx
            .lock()
            .await
            .recv()
            .await
            .unwrap_or_else(|| Err(RestError::Parse("script exhausted".into())))
    }
}

/// Sending half of one trade subscription
pub struct TradeFeed {
    pub symbol: Symbol,
    pub tx: mpsc::UnboundedSender<TradeResult>,
}

impl TradeFeed {
    pub fn trade(&self, trade: AggTrade) {
        self.tx.send(Ok(trade)).expect("subscription dropped");
    }

    pub fn error(&self, error: StreamError) {
        self.tx.send(Err(error)).expect("subscription dropped");
    }

    pub async fn closed(&self) {
        tokio::time::timeout(WAIT, self.tx.closed())
            .await
            .expect("subscription was not released");
    }
}

/// Trade source backed by channels; every subscription is handed to the test
pub struct TradeChannelSource {
    feeds: mpsc::UnboundedSender<TradeFeed>,
    log: CallLog,
}

impl TradeChannelSource {
    pub fn new(log: CallLog) -> (Self, mpsc::UnboundedReceiver<TradeFeed>) {
        let (feeds, rx) = mpsc::unbounded_channel();
        (Self { feeds, log }, rx)
    }
}

#[async_trait]
impl TradeStreamSource for TradeChannelSource {
    async fn subscribe_trades(&self, symbol: &Symbol) -> Result<TradeSubscription, StreamError> {
        self.log.lock().push(format!("subscribe trades {}", symbol));
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = self.feeds.send(TradeFeed {
            symbol: symbol.clone(),
            tx,
        });
        Ok(TradeSubscription::from_channel(symbol.clone(), rx))
    }
}

/// Next subscription handed out by a [`TradeChannelSource`]
pub async fn next_trade_feed(feeds: &mut mpsc::UnboundedReceiver<TradeFeed>) -> TradeFeed {
    tokio::time::timeout(WAIT, feeds.recv())
        .await
        .expect("timed out waiting for a trade subscription")
        .expect("source dropped")
}

/// Next subscription handed out by a [`ChannelSource`]
pub async fn next_feed(feeds: &mut mpsc::UnboundedReceiver<Feed>) -> Feed {
    tokio::time::timeout(WAIT, feeds.recv())
        .await
        .expect("timed out waiting for a subscription")
        .expect("source dropped")
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn level(price: Decimal, quantity: Decimal) -> PriceLevel {
    PriceLevel::new(price, quantity)
}

/// Snapshot with bids 1000/995 and asks 1100/1120
pub fn depth(last_update_id: u64) -> DepthSnapshot {
    DepthSnapshot {
        last_update_id,
        bids: vec![level(dec!(1000), dec!(2)), level(dec!(995), dec!(2))],
        asks: vec![level(dec!(1100), dec!(4)), level(dec!(1120), dec!(4))],
    }
}

/// Aggregate trade at 1050, one second apart per ID
pub fn agg_trade(agg_id: u64) -> AggTrade {
    AggTrade {
        event_type: None,
        event_time: None,
        symbol: None,
        agg_id,
        price: dec!(1050),
        quantity: dec!(0.25),
        first_trade_id: agg_id * 10,
        last_trade_id: agg_id * 10 + 1,
        trade_time: Utc
            .timestamp_millis_opt(1_700_000_000_000 + agg_id as i64 * 1000)
            .unwrap(),
        is_buyer_maker: agg_id % 2 == 1,
    }
}

pub fn trade_ids(trades: &[AggTrade]) -> Vec<u64> {
    trades.iter().map(|t| t.agg_id).collect()
}

pub fn bid_diff(first: u64, last: u64, price: Decimal, quantity: Decimal) -> DiffEvent {
    DiffEvent::new(first, last, vec![level(price, quantity)], vec![])
}

pub fn ask_diff(first: u64, last: u64, price: Decimal, quantity: Decimal) -> DiffEvent {
    DiffEvent::new(first, last, vec![], vec![level(price, quantity)])
}

// ============================================================================
// Waiting
// ============================================================================

/// Receive events until one matches `predicate`
pub async fn wait_for_event<F>(rx: &mut mpsc::UnboundedReceiver<BookEvent>, mut predicate: F) -> BookEvent
where
    F: FnMut(&BookEvent) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Wait for the `Updated` event carrying `last_update_id`
pub async fn wait_for_update(rx: &mut mpsc::UnboundedReceiver<BookEvent>, last_update_id: u64) {
    wait_for_event(rx, |event| {
        matches!(event, BookEvent::Updated { snapshot, .. } if snapshot.last_update_id() == last_update_id)
    })
    .await;
}

/// Wait until the published view matches `predicate`
pub async fn wait_for_view<F>(rx: &mut watch::Receiver<BookView>, mut predicate: F) -> BookView
where
    F: FnMut(&BookView) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            {
                let view = rx.borrow_and_update();
                if predicate(&view) {
                    return view.clone();
                }
            }
            rx.changed().await.expect("view sender dropped");
        }
    })
    .await
    .expect("timed out waiting for view")
}

/// Wait until the published trade view matches `predicate`
pub async fn wait_for_trades<F>(rx: &mut watch::Receiver<TradeView>, mut predicate: F) -> TradeView
where
    F: FnMut(&TradeView) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            {
                let view = rx.borrow_and_update();
                if predicate(&view) {
                    return view.clone();
                }
            }
            rx.changed().await.expect("trade view sender dropped");
        }
    })
    .await
    .expect("timed out waiting for trades")
}

/// Install a subscriber printing controller logs when `RUST_LOG` is set
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
