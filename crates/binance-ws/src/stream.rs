//! Diff depth and trade subscriptions
//!
//! [`DiffStreamSource::subscribe`] returns a [`DiffSubscription`]: an ordered,
//! cancellable sequence of [`DiffEvent`]s for one symbol. It resolves only
//! after the exchange acknowledged the `SUBSCRIBE`, so a snapshot fetched
//! afterwards can never predate the first delivered diff.
//! [`TradeStreamSource::subscribe_trades`] does the same for aggregate trades.
//!
//! [`BinanceDiffStream`] opens one combined-stream connection per
//! subscription. A background reader task decodes frames and forwards
//! payloads; undecodable frames are logged and dropped. Any transport failure
//! is delivered once as an `Err` item and ends the subscription.

use crate::endpoint::Endpoint;
use crate::transport::{Transport, TransportError, WsTransport};
use async_trait::async_trait;
use binance_types::{AggTrade, DiffEvent, StreamMessage, StreamRequest, Symbol, UpdateSpeed};
use futures::Stream;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

/// Stream failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// Underlying connection failed
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Exchange refused a control request
    #[error("subscription rejected ({code}): {message}")]
    Rejected { code: i64, message: String },

    /// Stream ended
    #[error("stream closed")]
    Closed,

    /// Control request could not be encoded
    #[error("encode error: {0}")]
    Encode(String),
}

/// Configuration for subscriptions
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// WebSocket endpoint
    pub endpoint: Endpoint,
    /// Diff push interval
    pub update_speed: UpdateSpeed,
    /// Bound on connect and on waiting for the subscribe acknowledgement
    pub connect_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::Public,
            update_speed: UpdateSpeed::Ms1000,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl StreamConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the endpoint
    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Set the diff push interval
    pub fn with_update_speed(mut self, speed: UpdateSpeed) -> Self {
        self.update_speed = speed;
        self
    }

    /// Set connection timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// Payload a subscription can deliver
pub trait StreamPayload: Sized + Send + 'static {
    /// Take this payload out of a decoded message, with the stream name it
    /// came through; hand the message back when it carries something else
    fn extract(message: StreamMessage) -> Result<(Option<String>, Self), StreamMessage>;
}

impl StreamPayload for DiffEvent {
    fn extract(message: StreamMessage) -> Result<(Option<String>, Self), StreamMessage> {
        match message {
            StreamMessage::Depth { stream, event } => Ok((stream, event)),
            other => Err(other),
        }
    }
}

impl StreamPayload for AggTrade {
    fn extract(message: StreamMessage) -> Result<(Option<String>, Self), StreamMessage> {
        match message {
            StreamMessage::Trade { stream, trade } => Ok((stream, trade)),
            other => Err(other),
        }
    }
}

/// Item delivered by a [`DiffSubscription`]
pub type DiffResult = Result<DiffEvent, StreamError>;

/// Item delivered by a [`TradeSubscription`]
pub type TradeResult = Result<AggTrade, StreamError>;

/// Source of per-symbol diff subscriptions
#[async_trait]
pub trait DiffStreamSource: Send + Sync {
    /// Open a subscription; diffs arrive in exchange order
    async fn subscribe(&self, symbol: &Symbol) -> Result<DiffSubscription, StreamError>;
}

#[async_trait]
impl<T: DiffStreamSource + ?Sized> DiffStreamSource for Arc<T> {
    async fn subscribe(&self, symbol: &Symbol) -> Result<DiffSubscription, StreamError> {
        (**self).subscribe(symbol).await
    }
}

/// Source of per-symbol aggregate trade subscriptions
#[async_trait]
pub trait TradeStreamSource: Send + Sync {
    /// Open a subscription; trades arrive in exchange order
    async fn subscribe_trades(&self, symbol: &Symbol) -> Result<TradeSubscription, StreamError>;
}

#[async_trait]
impl<T: TradeStreamSource + ?Sized> TradeStreamSource for Arc<T> {
    async fn subscribe_trades(&self, symbol: &Symbol) -> Result<TradeSubscription, StreamError> {
        (**self).subscribe_trades(symbol).await
    }
}

/// Live subscription to one symbol's stream
///
/// Dropping it cancels delivery; [`unsubscribe`](Self::unsubscribe) does the
/// same and also waits until the connection is released.
pub struct Subscription<T> {
    symbol: Symbol,
    rx: mpsc::UnboundedReceiver<Result<T, StreamError>>,
    cancel: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

/// Depth diff subscription
pub type DiffSubscription = Subscription<DiffEvent>;

/// Aggregate trade subscription
pub type TradeSubscription = Subscription<AggTrade>;

impl<T> Subscription<T> {
    /// Subscription fed by a background reader task
    pub fn new(
        symbol: Symbol,
        rx: mpsc::UnboundedReceiver<Result<T, StreamError>>,
        cancel: oneshot::Sender<()>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            symbol,
            rx,
            cancel: Some(cancel),
            task: Some(task),
        }
    }

    /// Subscription over a plain channel; closing it is the only teardown
    pub fn from_channel(symbol: Symbol, rx: mpsc::UnboundedReceiver<Result<T, StreamError>>) -> Self {
        Self {
            symbol,
            rx,
            cancel: None,
            task: None,
        }
    }

    /// Symbol this subscription delivers
    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Next item, or `None` once delivery has ended
    pub async fn next_item(&mut self) -> Option<Result<T, StreamError>> {
        self.rx.recv().await
    }

    /// Stop delivery and release the connection
    ///
    /// Once this returns no further item is produced for this subscription.
    pub async fn unsubscribe(mut self) {
        self.rx.close();
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(symbol = %self.symbol, "Reader task ended abnormally: {}", e);
            }
        }
        debug!(symbol = %self.symbol, "Unsubscribed");
    }
}

impl DiffSubscription {
    /// Next diff, or `None` once delivery has ended
    pub async fn next_diff(&mut self) -> Option<DiffResult> {
        self.next_item().await
    }
}

impl<T> Stream for Subscription<T> {
    type Item = Result<T, StreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("symbol", &self.symbol)
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

/// Builds a fresh transport for a URL
pub type TransportFactory = Arc<dyn Fn(&str) -> Box<dyn Transport> + Send + Sync>;

/// Binance combined-stream source for depth diffs and aggregate trades
#[derive(Clone)]
pub struct BinanceDiffStream {
    config: StreamConfig,
    factory: TransportFactory,
    next_id: Arc<AtomicU64>,
}

impl BinanceDiffStream {
    /// Source backed by real WebSocket connections
    pub fn new(config: StreamConfig) -> Self {
        let connect_timeout = config.connect_timeout;
        Self::with_transport_factory(config, move |url| {
            Box::new(WsTransport::new(url).with_timeout(connect_timeout))
        })
    }

    /// Source using a custom transport per subscription
    pub fn with_transport_factory<F>(config: StreamConfig, factory: F) -> Self
    where
        F: Fn(&str) -> Box<dyn Transport> + Send + Sync + 'static,
    {
        Self {
            config,
            factory: Arc::new(factory),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Current configuration
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Connect, subscribe to `stream_name` and wait for the acknowledgement
    async fn open<T: StreamPayload>(
        &self,
        symbol: &Symbol,
        stream_name: String,
    ) -> Result<Subscription<T>, StreamError> {
        let mut transport = (self.factory)(self.config.endpoint.url());

        transport.connect().await?;

        let request_id = self.next_request_id();
        let request = StreamRequest::subscribe(vec![stream_name.clone()], request_id);
        send_request(transport.as_mut(), &request).await?;

        let wait = self.config.connect_timeout;
        let early = match timeout(wait, await_ack::<T>(transport.as_mut(), request_id, &stream_name)).await {
            Ok(Ok(early)) => early,
            Ok(Err(e)) => {
                let _ = transport.close().await;
                return Err(e);
            }
            Err(_) => {
                let _ = transport.close().await;
                return Err(TransportError::Timeout(wait).into());
            }
        };

        info!(stream = %stream_name, "Subscribed");

        let (tx, rx) = mpsc::unbounded_channel();
        for item in early {
            let _ = tx.send(Ok(item));
        }

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let reader = Reader {
            transport,
            stream_name,
            unsubscribe_id: self.next_request_id(),
            tx,
        };
        let task = tokio::spawn(reader.run(cancel_rx));

        Ok(Subscription::new(symbol.clone(), rx, cancel_tx, task))
    }
}

impl std::fmt::Debug for BinanceDiffStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceDiffStream")
            .field("config", &self.config)
            .finish()
    }
}

#[async_trait]
impl DiffStreamSource for BinanceDiffStream {
    #[instrument(skip(self), fields(symbol = %symbol))]
    async fn subscribe(&self, symbol: &Symbol) -> Result<DiffSubscription, StreamError> {
        self.open(symbol, symbol.depth_stream(self.config.update_speed))
            .await
    }
}

#[async_trait]
impl TradeStreamSource for BinanceDiffStream {
    #[instrument(skip(self), fields(symbol = %symbol))]
    async fn subscribe_trades(&self, symbol: &Symbol) -> Result<TradeSubscription, StreamError> {
        self.open(symbol, symbol.agg_trade_stream()).await
    }
}

async fn send_request(
    transport: &mut dyn Transport,
    request: &StreamRequest,
) -> Result<(), StreamError> {
    let json = serde_json::to_string(request).map_err(|e| StreamError::Encode(e.to_string()))?;
    debug!("Sending {}", json);
    transport.send(&json).await?;
    Ok(())
}

/// Read until the subscribe request is acknowledged, keeping any payload that
/// raced ahead of the acknowledgement
async fn await_ack<T: StreamPayload>(
    transport: &mut dyn Transport,
    request_id: u64,
    stream_name: &str,
) -> Result<Vec<T>, StreamError> {
    let mut early = Vec::new();
    loop {
        let text = transport.recv().await?.ok_or(StreamError::Closed)?;
        match decode_frame::<T>(&text, stream_name) {
            Frame::Item(item) => early.push(item),
            Frame::Ack(Some(id)) if id == request_id => return Ok(early),
            Frame::Rejected { code, message } => {
                return Err(StreamError::Rejected { code, message })
            }
            Frame::Ack(_) | Frame::Skip => {}
        }
    }
}

enum Frame<T> {
    Item(T),
    Ack(Option<u64>),
    Rejected { code: i64, message: String },
    Skip,
}

fn decode_frame<T: StreamPayload>(text: &str, stream_name: &str) -> Frame<T> {
    let message = match StreamMessage::parse(text) {
        Ok(message) => message,
        Err(e) => {
            warn!("Dropping malformed payload: {}", e);
            return Frame::Skip;
        }
    };

    match T::extract(message) {
        Ok((Some(name), _)) if name != stream_name => {
            debug!(stream = %name, "Ignoring payload for another stream");
            Frame::Skip
        }
        Ok((_, item)) => Frame::Item(item),
        Err(StreamMessage::Ack(ack)) => {
            debug!(id = ?ack.id, "Control request acknowledged");
            Frame::Ack(ack.id)
        }
        Err(StreamMessage::Error(reply)) => Frame::Rejected {
            code: reply.error.code,
            message: reply.error.msg,
        },
        Err(StreamMessage::Unknown(value)) => {
            debug!("Unknown message: {}", value);
            Frame::Skip
        }
        Err(StreamMessage::Depth { stream, .. } | StreamMessage::Trade { stream, .. }) => {
            debug!(stream = ?stream, "Ignoring payload of another kind");
            Frame::Skip
        }
    }
}

struct Reader<T> {
    transport: Box<dyn Transport>,
    stream_name: String,
    unsubscribe_id: u64,
    tx: mpsc::UnboundedSender<Result<T, StreamError>>,
}

impl<T: StreamPayload> Reader<T> {
    async fn run(mut self, mut cancel: oneshot::Receiver<()>) {
        loop {
            tokio::select! {
                // Fires on explicit cancel and when the subscription is dropped
                _ = &mut cancel => {
                    self.shutdown().await;
                    return;
                }
                received = self.transport.recv() => match received {
                    Ok(Some(text)) => match decode_frame::<T>(&text, &self.stream_name) {
                        Frame::Item(item) => {
                            if self.tx.send(Ok(item)).is_err() {
                                self.shutdown().await;
                                return;
                            }
                        }
                        Frame::Rejected { code, message } => {
                            error!(stream = %self.stream_name, code, "Stream error: {}", message);
                            let _ = self.tx.send(Err(StreamError::Rejected { code, message }));
                            let _ = self.transport.close().await;
                            return;
                        }
                        Frame::Ack(_) | Frame::Skip => {}
                    },
                    Ok(None) => {
                        info!(stream = %self.stream_name, "Stream closed by server");
                        let _ = self.tx.send(Err(StreamError::Closed));
                        return;
                    }
                    Err(e) => {
                        error!(stream = %self.stream_name, "Stream failed: {}", e);
                        let _ = self.tx.send(Err(e.into()));
                        return;
                    }
                }
            }
        }
    }

    async fn shutdown(&mut self) {
        let request = StreamRequest::unsubscribe(vec![self.stream_name.clone()], self.unsubscribe_id);
        if let Err(e) = send_request(self.transport.as_mut(), &request).await {
            debug!("Unsubscribe not sent: {}", e);
        }
        if let Err(e) = self.transport.close().await {
            debug!("Close failed: {}", e);
        }
        debug!(stream = %self.stream_name, "Reader stopped");
    }
}
