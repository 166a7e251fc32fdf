//! Snapshot/stream resynchronization
//!
//! # Bootstrapping
//!
//! The diff subscription is opened before the snapshot is requested. Diffs
//! arriving while the request is in flight are buffered. When the snapshot
//! lands, buffered diffs it already covers (`u <= lastUpdateId`) are dropped
//! and the rest are merged in arrival order. The first diff merged after any
//! snapshot must straddle it: `U <= lastUpdateId + 1 <= u`.
//!
//! # Recovery
//!
//! An inconsistent merge, a gap, or an invalid snapshot moves the book to
//! `Resyncing`: the last good snapshot stays published, buffering restarts on
//! the same subscription, and a fresh snapshot is fetched. Transport failures
//! are terminal for the session; the caller decides whether to restart.
//!
//! [`BookSync`] holds the state machine and the current snapshot behind one
//! mutex; [`ResyncController`] drives it from the two async sources and
//! publishes while still holding the lock.

use crate::builder::BookConfig;
use crate::error::BookError;
use crate::events::{BookEvent, BookStatus, BookView};
use binance_book::{project, Inconsistency, MergeOutcome, Reconciler, Snapshot};
use binance_rest::SnapshotFetcher;
use binance_types::{DepthSnapshot, DiffEvent, Symbol};
use binance_ws::{DiffStreamSource, DiffSubscription, StreamError};
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, instrument, warn};

/// Synchronization state of one book
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Subscribed, waiting for the first snapshot
    Bootstrapping,
    /// Merging diffs into the published snapshot
    Streaming,
    /// Discarded an inconsistent state, waiting for a fresh snapshot
    Resyncing,
    /// Stopped on a transport failure or exhausted resync budget
    Failed,
}

/// What happened to one diff or snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStep {
    /// Held until a snapshot arrives
    Buffered,
    /// New snapshot to publish
    Published(Arc<Snapshot>),
    /// Ignored (stale, or the book has failed)
    Dropped,
    /// Inconsistent; a fresh snapshot is needed
    Resync(Inconsistency),
    /// Inconsistent again with no resyncs left
    Exhausted { attempts: u32, reason: Inconsistency },
}

/// Mutex-guarded book state machine
#[derive(Debug)]
pub struct BookSync {
    state: SyncState,
    snapshot: Option<Arc<Snapshot>>,
    buffer: VecDeque<DiffEvent>,
    /// Next merged diff must straddle the snapshot
    awaiting_first: bool,
    consecutive_resyncs: u32,
    reconciler: Reconciler,
    gap_detection: bool,
    max_buffered: usize,
    max_resyncs: u32,
}

impl BookSync {
    /// Fresh state machine in `Bootstrapping`
    pub fn new(config: &BookConfig) -> Self {
        Self {
            state: SyncState::Bootstrapping,
            snapshot: None,
            buffer: VecDeque::new(),
            awaiting_first: true,
            consecutive_resyncs: 0,
            reconciler: Reconciler::new(config.rows),
            gap_detection: config.gap_detection,
            max_buffered: config.max_buffered_diffs.max(1),
            max_resyncs: config.max_consecutive_resyncs,
        }
    }

    /// Current state
    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Last published snapshot
    pub fn snapshot(&self) -> Option<&Arc<Snapshot>> {
        self.snapshot.as_ref()
    }

    /// Diffs waiting for a snapshot
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Feed one diff from the stream
    pub fn push_diff(&mut self, diff: DiffEvent) -> SyncStep {
        match self.state {
            SyncState::Bootstrapping | SyncState::Resyncing => {
                if self.buffer.len() >= self.max_buffered {
                    // A gap left by this is caught by the straddle check
                    if let Some(dropped) = self.buffer.pop_front() {
                        warn!(
                            first = dropped.first_update_id,
                            last = dropped.final_update_id,
                            "Bootstrap buffer full, dropping oldest diff"
                        );
                    }
                }
                self.buffer.push_back(diff);
                SyncStep::Buffered
            }
            SyncState::Streaming => self.apply(&diff),
            SyncState::Failed => SyncStep::Dropped,
        }
    }

    /// Install a fetched snapshot and drain the buffer into it
    ///
    /// Returns `Published` with the resulting snapshot, or the resync step
    /// if the snapshot or a buffered diff is inconsistent.
    pub fn install_snapshot(&mut self, depth: DepthSnapshot) -> SyncStep {
        if self.state == SyncState::Failed {
            return SyncStep::Dropped;
        }

        let snapshot = match Snapshot::from_depth(depth, self.reconciler.depth()) {
            Ok(snapshot) => Arc::new(snapshot),
            Err(reason) => return self.begin_resync(reason),
        };

        let last_update_id = snapshot.last_update_id();
        debug!(
            last_update_id,
            buffered = self.buffer.len(),
            "Installing snapshot"
        );

        self.snapshot = Some(snapshot);
        self.awaiting_first = true;
        self.state = SyncState::Streaming;

        let buffered = std::mem::take(&mut self.buffer);
        for diff in buffered {
            if diff.final_update_id <= last_update_id {
                debug!(final_update_id = diff.final_update_id, "Discarding buffered diff covered by snapshot");
                continue;
            }
            match self.apply(&diff) {
                step @ (SyncStep::Resync(_) | SyncStep::Exhausted { .. }) => return step,
                _ => {}
            }
        }

        match &self.snapshot {
            Some(snapshot) => SyncStep::Published(Arc::clone(snapshot)),
            None => SyncStep::Dropped,
        }
    }

    /// Stop processing; nothing is merged afterwards
    pub fn fail(&mut self) {
        self.state = SyncState::Failed;
        self.buffer.clear();
    }

    fn apply(&mut self, diff: &DiffEvent) -> SyncStep {
        let current = match &self.snapshot {
            Some(snapshot) => Arc::clone(snapshot),
            None => return SyncStep::Dropped,
        };

        if diff.final_update_id <= current.last_update_id() {
            debug!(
                final_update_id = diff.final_update_id,
                last_update_id = current.last_update_id(),
                "Dropping stale diff"
            );
            return SyncStep::Dropped;
        }

        let sequencing = if self.awaiting_first {
            self.reconciler.check_bootstrap(&current, diff)
        } else if self.gap_detection {
            self.reconciler.check_continuity(&current, diff)
        } else {
            Ok(())
        };
        if let Err(reason) = sequencing {
            return self.begin_resync(reason);
        }

        match self.reconciler.merge(&current, diff) {
            MergeOutcome::Updated(snapshot) => {
                self.snapshot = Some(Arc::clone(&snapshot));
                self.awaiting_first = false;
                self.consecutive_resyncs = 0;
                SyncStep::Published(snapshot)
            }
            MergeOutcome::Stale(_) => SyncStep::Dropped,
            MergeOutcome::Inconsistent(reason) => self.begin_resync(reason),
        }
    }

    fn begin_resync(&mut self, reason: Inconsistency) -> SyncStep {
        self.buffer.clear();
        self.consecutive_resyncs += 1;

        if self.consecutive_resyncs > self.max_resyncs {
            self.fail();
            return SyncStep::Exhausted {
                attempts: self.consecutive_resyncs,
                reason,
            };
        }

        self.state = SyncState::Resyncing;
        SyncStep::Resync(reason)
    }
}

enum Flow {
    Live,
    Resync,
    Stop,
}

/// Drives one symbol's book from a snapshot source and a diff source
pub struct ResyncController {
    symbol: Symbol,
    config: BookConfig,
    fetcher: Arc<dyn SnapshotFetcher>,
    source: Arc<dyn DiffStreamSource>,
    sync: Arc<Mutex<BookSync>>,
    view_tx: watch::Sender<BookView>,
    event_tx: Option<mpsc::UnboundedSender<BookEvent>>,
}

impl ResyncController {
    /// Create a controller; nothing happens until [`run`](Self::run)
    pub fn new(
        symbol: Symbol,
        config: BookConfig,
        fetcher: Arc<dyn SnapshotFetcher>,
        source: Arc<dyn DiffStreamSource>,
    ) -> Self {
        let (view_tx, _) = watch::channel(BookView::loading(symbol.clone(), config.load_kind));
        Self {
            sync: Arc::new(Mutex::new(BookSync::new(&config))),
            symbol,
            config,
            fetcher,
            source,
            view_tx,
            event_tx: None,
        }
    }

    /// Also report lifecycle events on `tx`
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<BookEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Symbol this controller maintains
    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Receiver for the published view
    pub fn subscribe_view(&self) -> watch::Receiver<BookView> {
        self.view_tx.subscribe()
    }

    /// Shared handle on the state machine
    pub fn sync(&self) -> Arc<Mutex<BookSync>> {
        Arc::clone(&self.sync)
    }

    /// Run until `shutdown` fires (or its sender is dropped) or the book fails
    ///
    /// The subscription is released before this returns either way.
    #[instrument(skip_all, fields(symbol = %self.symbol))]
    pub async fn run(self, mut shutdown: oneshot::Receiver<()>) -> Result<(), BookError> {
        let kind = self.config.load_kind;
        self.emit(BookEvent::Status {
            symbol: self.symbol.clone(),
            status: BookStatus::Loading { kind },
        });
        info!("{}", kind.message());

        let subscribed = tokio::select! {
            _ = &mut shutdown => return Ok(()),
            result = self.source.subscribe(&self.symbol) => result,
        };
        let mut subscription = match subscribed {
            Ok(subscription) => subscription,
            Err(e) => return Err(self.fail(e.into())),
        };

        let outcome = self.drive(&mut subscription, &mut shutdown).await;
        subscription.unsubscribe().await;

        match outcome {
            Ok(()) => {
                info!("Book stopped");
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn drive(
        &self,
        subscription: &mut DiffSubscription,
        shutdown: &mut oneshot::Receiver<()>,
    ) -> Result<(), BookError> {
        loop {
            match self.bootstrap(subscription, shutdown).await? {
                Flow::Stop => return Ok(()),
                Flow::Resync => continue,
                Flow::Live => {}
            }
            match self.stream(subscription, shutdown).await? {
                Flow::Stop => return Ok(()),
                Flow::Resync | Flow::Live => continue,
            }
        }
    }

    /// Fetch a snapshot while buffering diffs, then install it
    async fn bootstrap(
        &self,
        subscription: &mut DiffSubscription,
        shutdown: &mut oneshot::Receiver<()>,
    ) -> Result<Flow, BookError> {
        let fetch = self.fetcher.fetch(&self.symbol, self.config.snapshot_limit);
        tokio::pin!(fetch);

        let depth = loop {
            tokio::select! {
                biased;
                _ = &mut *shutdown => return Ok(Flow::Stop),
                item = subscription.next() => {
                    let diff = item.ok_or(StreamError::Closed)??;
                    self.sync.lock().push_diff(diff);
                }
                result = &mut fetch => break result?,
            }
        };

        let step = {
            let mut sync = self.sync.lock();
            let step = sync.install_snapshot(depth);
            self.publish(&step);
            step
        };
        self.flow_after(step)
    }

    /// Merge diffs until shutdown or an inconsistency
    async fn stream(
        &self,
        subscription: &mut DiffSubscription,
        shutdown: &mut oneshot::Receiver<()>,
    ) -> Result<Flow, BookError> {
        loop {
            tokio::select! {
                biased;
                _ = &mut *shutdown => return Ok(Flow::Stop),
                item = subscription.next() => {
                    let diff = item.ok_or(StreamError::Closed)??;
                    let step = {
                        let mut sync = self.sync.lock();
                        let step = sync.push_diff(diff);
                        self.publish(&step);
                        step
                    };
                    match self.flow_after(step)? {
                        Flow::Live => {}
                        other => return Ok(other),
                    }
                }
            }
        }
    }

    fn flow_after(&self, step: SyncStep) -> Result<Flow, BookError> {
        match step {
            SyncStep::Resync(_) => Ok(Flow::Resync),
            SyncStep::Exhausted { attempts, reason } => Err(BookError::ResyncLimit {
                attempts,
                last: reason,
            }),
            SyncStep::Published(_) | SyncStep::Buffered | SyncStep::Dropped => Ok(Flow::Live),
        }
    }

    /// Publish the result of a step; called with the sync lock held
    fn publish(&self, step: &SyncStep) {
        match step {
            SyncStep::Published(snapshot) => {
                let rows = project(snapshot, self.config.rows);
                let mut became_live = false;
                self.view_tx.send_modify(|view| {
                    became_live = !view.status.is_live();
                    view.status = BookStatus::Live;
                    view.snapshot = Some(Arc::clone(snapshot));
                    view.rows = Arc::from(rows);
                });
                if became_live {
                    info!(last_update_id = snapshot.last_update_id(), "Book live");
                    self.emit(BookEvent::Status {
                        symbol: self.symbol.clone(),
                        status: BookStatus::Live,
                    });
                }
                self.emit(BookEvent::Updated {
                    symbol: self.symbol.clone(),
                    snapshot: Arc::clone(snapshot),
                });
            }
            SyncStep::Resync(reason) => {
                warn!("Resyncing: {}", reason);
                self.view_tx.send_modify(|view| view.status = BookStatus::Resyncing);
                self.emit(BookEvent::Resync {
                    symbol: self.symbol.clone(),
                    reason: reason.clone(),
                });
                self.emit(BookEvent::Status {
                    symbol: self.symbol.clone(),
                    status: BookStatus::Resyncing,
                });
            }
            SyncStep::Buffered | SyncStep::Dropped | SyncStep::Exhausted { .. } => {}
        }
    }

    /// Enter `Failed`, publish the error, and hand it back
    fn fail(&self, err: BookError) -> BookError {
        let mut sync = self.sync.lock();
        sync.fail();
        error!("Book failed: {}", err);
        self.view_tx
            .send_modify(|view| view.status = BookStatus::Error(err.to_string()));
        self.emit(BookEvent::Failed {
            symbol: self.symbol.clone(),
            error: err.clone(),
        });
        err
    }

    fn emit(&self, event: BookEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }
}

impl std::fmt::Debug for ResyncController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResyncController")
            .field("symbol", &self.symbol)
            .field("config", &self.config)
            .field("state", &self.sync.lock().state())
            .finish()
    }
}
