//! Book lifecycle errors

use crate::builder::ConfigError;
use binance_book::Inconsistency;
use binance_rest::RestError;
use binance_types::Symbol;
use binance_ws::StreamError;
use std::sync::Arc;
use thiserror::Error;

/// Errors that end a book's session
///
/// Inconsistent merges never show up here on their own; they resync. Only
/// transport failures, an exhausted resync budget, or misuse of the client
/// are reported.
#[derive(Error, Debug, Clone)]
pub enum BookError {
    /// Invalid client configuration
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Snapshot request failed
    #[error("snapshot fetch failed: {0}")]
    Fetch(Arc<RestError>),

    /// Diff subscription failed or ended
    #[error("diff stream failed: {0}")]
    Stream(#[from] StreamError),

    /// Too many resyncs in a row without a successful merge
    #[error("gave up after {attempts} consecutive resyncs, last: {last}")]
    ResyncLimit { attempts: u32, last: Inconsistency },

    /// The book's controller is no longer running
    #[error("book controller for {0} is not running")]
    ChannelClosed(Symbol),

    /// Symbol is not tracked by this client
    #[error("unknown symbol: {0}")]
    UnknownSymbol(Symbol),
}

impl From<RestError> for BookError {
    fn from(err: RestError) -> Self {
        Self::Fetch(Arc::new(err))
    }
}

impl BookError {
    /// Check if this error came from the network
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Fetch(_) | Self::Stream(_))
    }

    /// Check if restarting the book could help
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Fetch(err) => err.is_retryable(),
            Self::Stream(StreamError::Rejected { .. }) => false,
            Self::Stream(_) | Self::ResyncLimit { .. } => true,
            Self::Config(_) | Self::ChannelClosed(_) | Self::UnknownSymbol(_) => false,
        }
    }
}
