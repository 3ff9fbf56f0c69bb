//! Binance spot adapter.
//!
//! Implements [`ExchangeClient`](crate::ExchangeClient) over the Binance spot
//! REST API:
//!
//! ```text
//! BinanceSpot
//! └── SpotClient   (REST, HMAC-SHA256 or Ed25519 signed)
//! ```
//!
//! The adapter only translates. Munging, retries and order-context
//! bookkeeping happen in the [`ExecutionEngine`](crate::ExecutionEngine).

pub mod auth;
pub mod config;
pub mod spot;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use stopline_core::{Balance, Money, OcoOrderRequest, OcoOrderResult, OrderId, OrderRequest, OrderResult};
use tracing::{info, warn};

use self::config::BinanceConfig;
use self::spot::SpotClient;
use crate::ExchangeClient;
use crate::error::ExchangeError;
use crate::rules::ExchangeInfo;

/// Binance spot exchange client.
#[derive(Debug, Clone)]
pub struct BinanceSpot {
    spot: Arc<SpotClient>,
}

impl BinanceSpot {
    pub fn new(config: &BinanceConfig) -> anyhow::Result<Self> {
        let spot = SpotClient::new(config)?;
        let signing = if config.ed25519_key_path.is_some() { "ed25519" } else { "hmac" };
        info!("[binance] spot client for {} ({signing} signing)", config.rest_url);
        Ok(Self { spot: Arc::new(spot) })
    }
}

#[async_trait]
impl ExchangeClient for BinanceSpot {
    async fn exchange_info(&self) -> Result<ExchangeInfo, ExchangeError> {
        self.spot.get_exchange_info().await
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderResult, ExchangeError> {
        self.spot.new_order(order).await.inspect_err(|e| {
            warn!("[binance] {} {:?} {} failed: {e}", order.symbol, order.order_type, order.side.as_str())
        })
    }

    async fn place_oco_order(&self, order: &OcoOrderRequest) -> Result<OcoOrderResult, ExchangeError> {
        self.spot.new_oco_order(order).await.inspect_err(|e| warn!("[binance] {} OCO failed: {e}", order.symbol))
    }

    async fn cancel_order(&self, symbol: &str, order_id: &OrderId) -> Result<(), ExchangeError> {
        self.spot.cancel_order(symbol, order_id).await
    }

    async fn cancel_oco_order(&self, symbol: &str, order_list_id: &OrderId) -> Result<(), ExchangeError> {
        self.spot.cancel_order_list(symbol, order_list_id).await
    }

    async fn account_balances(&self) -> Result<Vec<Balance>, ExchangeError> {
        self.spot.get_balances().await
    }

    async fn prices(&self) -> Result<HashMap<String, Money>, ExchangeError> {
        self.spot.get_ticker_prices().await
    }
}
