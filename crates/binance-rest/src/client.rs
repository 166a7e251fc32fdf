//! Main REST client implementation

use crate::endpoints::MarketEndpoints;
use crate::error::RestResult;
use crate::fetcher::{SnapshotFetcher, TradeFetcher};
use async_trait::async_trait;
use binance_types::{AggTrade, DepthSnapshot, Symbol};
use reqwest::Client;
use std::time::Duration;
use tracing::info;

/// Production REST endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.binance.com";

/// Default request timeout
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Binance REST API client
///
/// Only the public market endpoints are covered.
///
/// # Example
///
/// ```no_run
/// use binance_rest::BinanceRestClient;
/// use binance_types::Symbol;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = BinanceRestClient::new()?;
///     let depth = client.get_depth(&Symbol::new("BTCUSDT"), 50).await?;
///     println!("lastUpdateId {}", depth.last_update_id);
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct BinanceRestClient {
    http_client: Client,
    base_url: String,
}

impl BinanceRestClient {
    /// Create a client for the production endpoint
    pub fn new() -> RestResult<Self> {
        Self::with_config(ClientConfig::default())
    }

    /// Create a new client with custom configuration
    pub fn with_config(config: ClientConfig) -> RestResult<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.as_deref().unwrap_or("binance-rest/0.1.0"))
            .build()?;

        info!(base_url = %config.base_url, "Created Binance REST client");

        Ok(Self {
            http_client,
            base_url: config.base_url,
        })
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get market endpoints
    pub fn market(&self) -> MarketEndpoints<'_> {
        MarketEndpoints::new(&self.http_client, &self.base_url)
    }

    /// Get orderbook depth for a symbol
    ///
    /// # Arguments
    /// * `symbol` - Trading pair
    /// * `limit` - Number of price levels per side (1-5000)
    pub async fn get_depth(&self, symbol: &Symbol, limit: u16) -> RestResult<DepthSnapshot> {
        self.market().get_depth(symbol, limit).await
    }

    /// Get the latest aggregate trades for a symbol, oldest first
    ///
    /// # Arguments
    /// * `symbol` - Trading pair
    /// * `limit` - Number of trades (1-1000)
    pub async fn get_agg_trades(&self, symbol: &Symbol, limit: u16) -> RestResult<Vec<AggTrade>> {
        self.market().get_agg_trades(symbol, limit).await
    }
}

#[async_trait]
impl SnapshotFetcher for BinanceRestClient {
    async fn fetch(&self, symbol: &Symbol, limit: u16) -> RestResult<DepthSnapshot> {
        self.get_depth(symbol, limit).await
    }
}

#[async_trait]
impl TradeFetcher for BinanceRestClient {
    async fn fetch_trades(&self, symbol: &Symbol, limit: u16) -> RestResult<Vec<AggTrade>> {
        self.get_agg_trades(symbol, limit).await
    }
}

impl std::fmt::Debug for BinanceRestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceRestClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// REST base URL
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Custom user agent
    pub user_agent: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: None,
        }
    }
}

impl ClientConfig {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set base URL (e.g. the testnet or a local mock)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set timeout
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Set user agent
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}
