//! High-level multi-symbol depth client

use crate::builder::{BookConfig, DepthClientBuilder};
use crate::controller::ResyncController;
use crate::error::BookError;
use crate::events::{BookEvent, BookStatus, BookView, LoadKind};
use crate::trades::{TradeTapeController, TradeView};
use binance_book::{DepthRow, Snapshot};
use binance_rest::{BinanceRestClient, ClientConfig, SnapshotFetcher, TradeFetcher};
use binance_types::{AggTrade, Symbol};
use binance_ws::{BinanceDiffStream, DiffStreamSource, TradeStreamSource};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

/// Receiver for book lifecycle events
pub type BookEventReceiver = mpsc::UnboundedReceiver<BookEvent>;

/// Where trade tapes get their data
struct TradeSources {
    rows: usize,
    fetcher: Arc<dyn TradeFetcher>,
    source: Arc<dyn TradeStreamSource>,
}

/// One running controller publishing `V`
struct Handle<V> {
    view: watch::Receiver<V>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<Result<(), BookError>>,
}

impl<V> Handle<V> {
    /// Signal the controller and wait for it to release its subscription
    async fn stop(self, symbol: &Symbol) -> Result<(), BookError> {
        let _ = self.shutdown.send(());
        match self.task.await {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(%symbol, "Controller task did not exit cleanly: {}", e);
                Err(BookError::ChannelClosed(symbol.clone()))
            }
        }
    }
}

/// Client maintaining one self-healing order book per symbol
///
/// Each symbol gets its own diff subscription, snapshot and
/// [`ResyncController`] task. Reads never block on the network; they return
/// whatever the controller last published.
///
/// With [`with_recent_trades`](DepthClientBuilder::with_recent_trades) each
/// symbol also gets a [`TradeTapeController`] keeping its latest trades.
///
/// # Example
///
/// ```no_run
/// use binance_sdk::DepthClient;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = DepthClient::builder(["BTCUSDT"])
///         .with_rows(10)
///         .connect()
///         .await?;
///
///     client.wait_until_settled("BTCUSDT").await?;
///     if let Some(rows) = client.depth_rows("BTCUSDT") {
///         for row in rows.iter() {
///             println!("{:?}", row);
///         }
///     }
///     Ok(())
/// }
/// ```
pub struct DepthClient {
    books: DashMap<Symbol, Handle<BookView>>,
    tapes: DashMap<Symbol, Handle<TradeView>>,
    config: BookConfig,
    fetcher: Arc<dyn SnapshotFetcher>,
    source: Arc<dyn DiffStreamSource>,
    trades: Option<TradeSources>,
    event_tx: mpsc::UnboundedSender<BookEvent>,
    event_rx: Option<BookEventReceiver>,
}

impl DepthClient {
    /// Create a new client builder
    pub fn builder(symbols: impl IntoIterator<Item = impl Into<String>>) -> DepthClientBuilder {
        DepthClientBuilder::new(symbols)
    }

    /// Symbols currently tracked, sorted
    pub fn symbols(&self) -> Vec<Symbol> {
        let mut symbols: Vec<Symbol> = self.books.iter().map(|e| e.key().clone()).collect();
        symbols.sort();
        symbols
    }

    /// Latest view of a book
    pub fn view(&self, symbol: &str) -> Option<BookView> {
        self.books
            .get(&Symbol::new(symbol))
            .map(|handle| handle.view.borrow().clone())
    }

    /// Receiver notified on every publish for a book
    pub fn watch(&self, symbol: &str) -> Option<watch::Receiver<BookView>> {
        self.books
            .get(&Symbol::new(symbol))
            .map(|handle| handle.view.clone())
    }

    /// Latest snapshot for a symbol
    pub fn snapshot(&self, symbol: &str) -> Option<Arc<Snapshot>> {
        self.view(symbol).and_then(|view| view.snapshot)
    }

    /// Depth ladder for a symbol
    pub fn depth_rows(&self, symbol: &str) -> Option<Arc<[DepthRow]>> {
        self.view(symbol).map(|view| view.rows)
    }

    /// Status of a symbol's book
    pub fn status(&self, symbol: &str) -> Option<BookStatus> {
        self.view(symbol).map(|view| view.status)
    }

    /// Get the best bid for a symbol
    pub fn best_bid(&self, symbol: &str) -> Option<Decimal> {
        self.view(symbol)
            .and_then(|view| view.best_bid().map(|l| l.price))
    }

    /// Get the best ask for a symbol
    pub fn best_ask(&self, symbol: &str) -> Option<Decimal> {
        self.view(symbol)
            .and_then(|view| view.best_ask().map(|l| l.price))
    }

    /// Get the spread for a symbol
    pub fn spread(&self, symbol: &str) -> Option<Decimal> {
        self.view(symbol).and_then(|view| view.spread())
    }

    /// Get the mid price for a symbol
    pub fn mid_price(&self, symbol: &str) -> Option<Decimal> {
        self.view(symbol).and_then(|view| view.mid_price())
    }

    /// Latest trade tape of a symbol, if recent trades are enabled
    pub fn trade_view(&self, symbol: &str) -> Option<TradeView> {
        self.tapes
            .get(&Symbol::new(symbol))
            .map(|handle| handle.view.borrow().clone())
    }

    /// Receiver notified whenever a symbol's trade tape changes
    pub fn watch_trades(&self, symbol: &str) -> Option<watch::Receiver<TradeView>> {
        self.tapes
            .get(&Symbol::new(symbol))
            .map(|handle| handle.view.clone())
    }

    /// Recent trades for a symbol, newest first
    pub fn recent_trades(&self, symbol: &str) -> Option<Arc<[AggTrade]>> {
        self.trade_view(symbol).map(|view| view.trades)
    }

    /// Check if a symbol's book is live
    pub fn is_live(&self, symbol: &str) -> bool {
        self.status(symbol)
            .map(|status| status.is_live())
            .unwrap_or(false)
    }

    /// Take the event receiver (can only be called once)
    ///
    /// Events queue up until the receiver is taken; take it early or drop
    /// the client if they are not wanted.
    pub fn events(&mut self) -> Option<BookEventReceiver> {
        self.event_rx.take()
    }

    /// Wait until a book is live or has failed
    pub async fn wait_until_settled(&self, symbol: &str) -> Result<BookStatus, BookError> {
        let symbol = Symbol::new(symbol);
        let mut rx = self
            .books
            .get(&symbol)
            .map(|handle| handle.view.clone())
            .ok_or_else(|| BookError::UnknownSymbol(symbol.clone()))?;

        loop {
            let status = rx.borrow_and_update().status.clone();
            if status.is_settled() {
                return Ok(status);
            }
            if rx.changed().await.is_err() {
                let status = rx.borrow().status.clone();
                return if status.is_settled() {
                    Ok(status)
                } else {
                    Err(BookError::ChannelClosed(symbol))
                };
            }
        }
    }

    /// Restart a symbol from a fresh subscription and snapshot
    ///
    /// Works on live, resyncing and failed books alike; the status shows
    /// "Refreshing order book ..." until the new snapshot is installed.
    #[instrument(skip(self))]
    pub async fn refresh(&self, symbol: &str) -> Result<(), BookError> {
        let symbol = Symbol::new(symbol);
        let (_, handle) = self
            .books
            .remove(&symbol)
            .ok_or_else(|| BookError::UnknownSymbol(symbol.clone()))?;
        handle.stop(&symbol).await?;
        if let Some((_, tape)) = self.tapes.remove(&symbol) {
            tape.stop(&symbol).await?;
        }

        info!("Refreshing book");
        self.spawn(symbol, LoadKind::Refresh);
        Ok(())
    }

    /// Stop tracking a symbol and release its subscription
    #[instrument(skip(self))]
    pub async fn unsubscribe(&self, symbol: &str) -> Result<(), BookError> {
        let symbol = Symbol::new(symbol);
        let (_, handle) = self
            .books
            .remove(&symbol)
            .ok_or_else(|| BookError::UnknownSymbol(symbol.clone()))?;
        handle.stop(&symbol).await?;
        if let Some((_, tape)) = self.tapes.remove(&symbol) {
            tape.stop(&symbol).await?;
        }
        info!("Unsubscribed");
        Ok(())
    }

    /// Request shutdown of every book
    ///
    /// Controllers release their subscriptions in the background.
    #[instrument(skip(self))]
    pub fn shutdown(&self) {
        let symbols = self.symbols();
        for symbol in symbols {
            if let Some((_, handle)) = self.books.remove(&symbol) {
                let _ = handle.shutdown.send(());
            }
            if let Some((_, handle)) = self.tapes.remove(&symbol) {
                let _ = handle.shutdown.send(());
            }
        }
        info!("Depth client shut down");
    }

    fn spawn(&self, symbol: Symbol, kind: LoadKind) {
        if let Some(trades) = &self.trades {
            let controller = TradeTapeController::new(
                symbol.clone(),
                trades.rows,
                kind,
                Arc::clone(&trades.fetcher),
                Arc::clone(&trades.source),
            );
            let view = controller.subscribe_view();
            let (shutdown, shutdown_rx) = oneshot::channel();
            let task = tokio::spawn(controller.run(shutdown_rx));
            self.tapes.insert(
                symbol.clone(),
                Handle {
                    view,
                    shutdown,
                    task,
                },
            );
        }

        let handle = self.spawn_book(symbol.clone(), kind);
        self.books.insert(symbol, handle);
    }

    fn spawn_book(&self, symbol: Symbol, kind: LoadKind) -> Handle<BookView> {
        let config = self.config.clone().with_load_kind(kind);
        let controller = ResyncController::new(
            symbol,
            config,
            Arc::clone(&self.fetcher),
            Arc::clone(&self.source),
        )
        .with_events(self.event_tx.clone());

        let view = controller.subscribe_view();
        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(controller.run(shutdown_rx));

        Handle {
            view,
            shutdown,
            task,
        }
    }
}

impl std::fmt::Debug for DepthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DepthClient")
            .field("symbols", &self.symbols())
            .field("config", &self.config)
            .field("trade_rows", &self.trades.as_ref().map(|t| t.rows))
            .finish()
    }
}

impl DepthClientBuilder {
    /// Start one book per symbol and return the client
    ///
    /// Returns once the controllers are spawned; use
    /// [`DepthClient::wait_until_settled`] to wait for the first snapshot.
    #[instrument(skip(self), fields(symbols = ?self.symbols))]
    pub async fn connect(self) -> Result<DepthClient, BookError> {
        self.validate()?;
        let symbols = self.parsed_symbols()?;

        // Books and tapes share one REST client and one stream unless replaced
        let mut rest = None;
        let stream = Arc::new(BinanceDiffStream::new(self.to_stream_config()));

        let fetcher: Arc<dyn SnapshotFetcher> = match &self.fetcher {
            Some(fetcher) => Arc::clone(fetcher),
            None => self.shared_rest_client(&mut rest)?,
        };
        let source: Arc<dyn DiffStreamSource> = match &self.source {
            Some(source) => Arc::clone(source),
            None => stream.clone(),
        };
        let trades = match self.trade_rows {
            Some(rows) => {
                let fetcher: Arc<dyn TradeFetcher> = match &self.trade_fetcher {
                    Some(fetcher) => Arc::clone(fetcher),
                    None => self.shared_rest_client(&mut rest)?,
                };
                let source: Arc<dyn TradeStreamSource> = match &self.trade_source {
                    Some(source) => Arc::clone(source),
                    None => stream,
                };
                Some(TradeSources {
                    rows,
                    fetcher,
                    source,
                })
            }
            None => None,
        };

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let client = DepthClient {
            books: DashMap::new(),
            tapes: DashMap::new(),
            config: self.book,
            fetcher,
            source,
            trades,
            event_tx,
            event_rx: Some(event_rx),
        };

        for symbol in symbols {
            client.spawn(symbol, client.config.load_kind);
        }

        info!("Depth client started for {:?}", client.symbols());
        Ok(client)
    }

    fn shared_rest_client(
        &self,
        cached: &mut Option<Arc<BinanceRestClient>>,
    ) -> Result<Arc<BinanceRestClient>, BookError> {
        if let Some(client) = cached {
            return Ok(Arc::clone(client));
        }
        let config = ClientConfig::new()
            .with_base_url(self.rest_base_url())
            .with_timeout(self.connect_timeout.as_secs());
        let client = Arc::new(BinanceRestClient::with_config(config)?);
        *cached = Some(Arc::clone(&client));
        Ok(client)
    }
}
