//! Recent trades tape
//!
//! The aggregate trade stream is subscribed first, then the latest trades are
//! fetched over REST. Stream trades arriving during the fetch are held and
//! replayed on top of the fetched list. The tape is newest first, holds at
//! most `rows` trades, and drops any trade whose aggregate ID is not above
//! the newest one it already has.
//!
//! Trades carry no sequence range, so there is nothing to resync: a
//! transport failure stops the tape like it stops a book.

use crate::error::BookError;
use crate::events::LoadKind;
use binance_rest::endpoints::market::MAX_AGG_TRADES_LIMIT;
use binance_rest::TradeFetcher;
use binance_types::{AggTrade, Symbol};
use binance_ws::{StreamError, TradeStreamSource, TradeSubscription};
use futures::StreamExt;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, instrument};

/// Default number of trades kept per symbol
pub const DEFAULT_TRADE_ROWS: usize = 25;

/// Coarse tape state for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TapeStatus {
    /// Waiting for the REST trades
    Loading { kind: LoadKind },
    /// Seeded, stream trades being prepended
    Live,
    /// Stopped on a transport failure
    Error(String),
}

impl TapeStatus {
    /// Check if the tape is live
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }

    /// Live or failed
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Live | Self::Error(_))
    }
}

impl fmt::Display for TapeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loading {
                kind: LoadKind::Initial,
            } => f.write_str("Loading market history ..."),
            Self::Loading {
                kind: LoadKind::Refresh,
            } => f.write_str("Refreshing market history ..."),
            Self::Live => f.write_str("Live"),
            Self::Error(message) => write!(f, "Error: {}", message),
        }
    }
}

/// Latest published state of one tape
#[derive(Debug, Clone)]
pub struct TradeView {
    /// Symbol
    pub symbol: Symbol,
    /// Current status
    pub status: TapeStatus,
    /// Trades, newest first
    pub trades: Arc<[AggTrade]>,
}

impl TradeView {
    /// View of a tape that has not loaded yet
    pub fn loading(symbol: Symbol, kind: LoadKind) -> Self {
        Self {
            symbol,
            status: TapeStatus::Loading { kind },
            trades: Arc::from(Vec::new()),
        }
    }

    /// Most recent trade
    pub fn last_trade(&self) -> Option<&AggTrade> {
        self.trades.first()
    }
}

/// Bounded, newest-first list of aggregate trades
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeTape {
    rows: usize,
    trades: VecDeque<AggTrade>,
}

impl TradeTape {
    /// Empty tape holding at most `rows` trades
    pub fn new(rows: usize) -> Self {
        let rows = rows.max(1);
        Self {
            rows,
            trades: VecDeque::with_capacity(rows),
        }
    }

    /// Capacity
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of trades held
    pub fn len(&self) -> usize {
        self.trades.len()
    }

    /// Check if no trade is held
    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    /// Most recent trade
    pub fn newest(&self) -> Option<&AggTrade> {
        self.trades.front()
    }

    /// Replace the contents with a REST response
    ///
    /// Binance lists trades oldest first; the order is not relied on.
    pub fn seed(&mut self, trades: Vec<AggTrade>) {
        let mut trades = trades;
        trades.sort_by(|a, b| b.agg_id.cmp(&a.agg_id));
        trades.dedup_by_key(|t| t.agg_id);
        trades.truncate(self.rows);
        self.trades = trades.into();
    }

    /// Prepend a trade newer than everything held, dropping the oldest past
    /// capacity. Returns `false` for a trade already covered.
    pub fn push(&mut self, trade: AggTrade) -> bool {
        if let Some(newest) = self.trades.front() {
            if trade.agg_id <= newest.agg_id {
                return false;
            }
        }
        self.trades.push_front(trade);
        self.trades.truncate(self.rows);
        true
    }

    /// Shared copy for publishing
    pub fn to_shared(&self) -> Arc<[AggTrade]> {
        self.trades.iter().cloned().collect()
    }
}

/// Drives one symbol's trade tape from a REST source and the trade stream
pub struct TradeTapeController {
    symbol: Symbol,
    rows: usize,
    fetcher: Arc<dyn TradeFetcher>,
    source: Arc<dyn TradeStreamSource>,
    view_tx: watch::Sender<TradeView>,
}

impl TradeTapeController {
    /// Create a controller; nothing happens until [`run`](Self::run)
    pub fn new(
        symbol: Symbol,
        rows: usize,
        kind: LoadKind,
        fetcher: Arc<dyn TradeFetcher>,
        source: Arc<dyn TradeStreamSource>,
    ) -> Self {
        let (view_tx, _) = watch::channel(TradeView::loading(symbol.clone(), kind));
        Self {
            symbol,
            rows: rows.clamp(1, usize::from(MAX_AGG_TRADES_LIMIT)),
            fetcher,
            source,
            view_tx,
        }
    }

    /// Receiver for the published view
    pub fn subscribe_view(&self) -> watch::Receiver<TradeView> {
        self.view_tx.subscribe()
    }

    /// Run until `shutdown` fires (or its sender is dropped) or the tape fails
    ///
    /// The subscription is released before this returns either way.
    #[instrument(skip_all, fields(symbol = %self.symbol))]
    pub async fn run(self, mut shutdown: oneshot::Receiver<()>) -> Result<(), BookError> {
        info!("{}", self.view_tx.borrow().status);

        let subscribed = tokio::select! {
            _ = &mut shutdown => return Ok(()),
            result = self.source.subscribe_trades(&self.symbol) => result,
        };
        let mut subscription = match subscribed {
            Ok(subscription) => subscription,
            Err(e) => return Err(self.fail(e.into())),
        };

        let outcome = self.drive(&mut subscription, &mut shutdown).await;
        subscription.unsubscribe().await;

        match outcome {
            Ok(()) => {
                info!("Trade tape stopped");
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn drive(
        &self,
        subscription: &mut TradeSubscription,
        shutdown: &mut oneshot::Receiver<()>,
    ) -> Result<(), BookError> {
        let mut tape = TradeTape::new(self.rows);
        let mut early = VecDeque::new();

        let limit = u16::try_from(self.rows).unwrap_or(MAX_AGG_TRADES_LIMIT);
        let fetch = self.fetcher.fetch_trades(&self.symbol, limit);
        tokio::pin!(fetch);

        let fetched = loop {
            tokio::select! {
                biased;
                _ = &mut *shutdown => return Ok(()),
                item = subscription.next() => {
                    early.push_back(item.ok_or(StreamError::Closed)??);
                    // Only the newest `rows` can survive the replay
                    if early.len() > self.rows {
                        early.pop_front();
                    }
                }
                result = &mut fetch => break result?,
            }
        };

        tape.seed(fetched);
        let held = early.len();
        let replayed = early.into_iter().map(|trade| tape.push(trade)).filter(|&kept| kept).count();
        debug!(held, replayed, "Trade tape seeded");
        self.publish(&tape);

        loop {
            tokio::select! {
                biased;
                _ = &mut *shutdown => return Ok(()),
                item = subscription.next() => {
                    let trade = item.ok_or(StreamError::Closed)??;
                    let agg_id = trade.agg_id;
                    if tape.push(trade) {
                        self.publish(&tape);
                    } else {
                        debug!(agg_id, "Dropping trade already on the tape");
                    }
                }
            }
        }
    }

    fn publish(&self, tape: &TradeTape) {
        let trades = tape.to_shared();
        let mut became_live = false;
        self.view_tx.send_modify(|view| {
            became_live = !view.status.is_live();
            view.status = TapeStatus::Live;
            view.trades = trades;
        });
        if became_live {
            info!(trades = tape.len(), "Trade tape live");
        }
    }

    fn fail(&self, err: BookError) -> BookError {
        error!("Trade tape failed: {}", err);
        self.view_tx
            .send_modify(|view| view.status = TapeStatus::Error(err.to_string()));
        err
    }
}

impl fmt::Debug for TradeTapeController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TradeTapeController")
            .field("symbol", &self.symbol)
            .field("rows", &self.rows)
            .finish()
    }
}
