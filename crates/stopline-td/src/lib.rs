//! # stopline-td
//!
//! Exchange-facing half of the stopline system.
//!
//! - [`ExchangeClient`]: the abstract exchange capability every component
//!   receives by injection (no global client).
//! - [`binance`]: Binance spot REST implementation.
//! - [`rules`]: per-symbol trading rules, price/quantity munging and a TTL cache.
//! - [`retry`]: bounded retry on exchange rate limits.
//! - [`engine`]: the Execution Engine: typed order operations with bookkeeping.
//! - [`event`]: best-effort execution event channel.
//! - `mock`: scripted in-memory exchange (feature `test-util`).
//!
//! ## Supported exchanges
//!
//! | Exchange | Module    | Accounts | Order channel |
//! |----------|-----------|----------|---------------|
//! | Binance  | `binance` | Spot     | REST          |

pub mod binance;
pub mod engine;
pub mod error;
pub mod event;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod retry;
pub mod rules;

use std::collections::HashMap;

use async_trait::async_trait;
use stopline_core::{Balance, Money, OcoOrderRequest, OcoOrderResult, OrderId, OrderRequest, OrderResult};

pub use self::engine::ExecutionEngine;
pub use self::error::ExchangeError;
use self::rules::ExchangeInfo;

/// Exchange operations consumed by the execution layer.
///
/// Implementations only translate to and from the wire; they never retry,
/// round or validate. That is the job of [`ExecutionEngine`].
///
/// All methods take `&self` so one client can be shared (`Arc<dyn ExchangeClient>`)
/// across concurrent commands.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Symbol metadata including trading-rule filters.
    async fn exchange_info(&self) -> Result<ExchangeInfo, ExchangeError>;

    /// Submit a single order.
    async fn place_order(&self, order: &OrderRequest) -> Result<OrderResult, ExchangeError>;

    /// Submit a one-cancels-other order pair.
    async fn place_oco_order(&self, order: &OcoOrderRequest) -> Result<OcoOrderResult, ExchangeError>;

    /// Cancel a single order by exchange id.
    async fn cancel_order(&self, symbol: &str, order_id: &OrderId) -> Result<(), ExchangeError>;

    /// Cancel an OCO order list by list id.
    async fn cancel_oco_order(&self, symbol: &str, order_list_id: &OrderId) -> Result<(), ExchangeError>;

    /// All non-zero account balances.
    async fn account_balances(&self) -> Result<Vec<Balance>, ExchangeError>;

    /// Last traded price of every symbol, keyed by exchange symbol.
    async fn prices(&self) -> Result<HashMap<String, Money>, ExchangeError>;
}
