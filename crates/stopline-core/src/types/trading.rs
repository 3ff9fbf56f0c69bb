//! Trading-related data structures: order requests, exchange acknowledgements
//! and balances.
//!
//! These flow between the execution engine and an
//! `ExchangeClient` implementation. All amounts are [`Money`].

use serde::{Deserialize, Serialize};

use super::context::{ClientOrderId, OrderId};
use super::enums::{OrderStatus, OrderType, Side, TimeInForce};
use crate::error::MoneyError;
use crate::money::Money;

// ---------------------------------------------------------------------------
// Order request (engine → exchange)
// ---------------------------------------------------------------------------

/// A single order submission. Prices and quantities must already be munged
/// to the symbol's trading rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Exchange symbol (e.g. `"BTCUSDT"`).
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    /// Base-asset quantity.
    pub quantity: Money,
    /// Limit price (`None` for market orders).
    pub price: Option<Money>,
    /// Trigger price for stop / take-profit orders.
    pub stop_price: Option<Money>,
    pub time_in_force: Option<TimeInForce>,
    pub client_order_id: Option<ClientOrderId>,
}

/// One-cancels-other sell: a take-profit limit leg and a stop-limit leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcoOrderRequest {
    pub symbol: String,
    pub side: Side,
    pub quantity: Money,
    /// Take-profit limit price.
    pub price: Money,
    /// Stop trigger price.
    pub stop_price: Money,
    /// Limit price of the stop leg once triggered.
    pub stop_limit_price: Money,
    pub stop_limit_time_in_force: TimeInForce,
    pub list_client_order_id: ClientOrderId,
    pub limit_client_order_id: ClientOrderId,
    pub stop_client_order_id: ClientOrderId,
}

// ---------------------------------------------------------------------------
// Exchange acknowledgements (exchange → engine)
// ---------------------------------------------------------------------------

/// Result of a single order submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub symbol: String,
    pub order_id: OrderId,
    pub client_order_id: Option<ClientOrderId>,
    pub status: OrderStatus,
    /// Filled base quantity.
    pub executed_qty: Money,
    /// Quote quantity spent/received by the filled part.
    pub cummulative_quote_qty: Money,
    /// Exchange transaction time (ms since epoch).
    pub transact_time_ms: u64,
}

/// Result of an OCO submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcoOrderResult {
    pub symbol: String,
    pub order_list_id: OrderId,
    pub list_client_order_id: ClientOrderId,
    /// Ids of the individual legs.
    pub order_ids: Vec<OrderId>,
    pub transact_time_ms: u64,
}

// ---------------------------------------------------------------------------
// Balances
// ---------------------------------------------------------------------------

/// Balance of a single asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub asset: String,
    /// Available (unlocked) amount.
    pub free: Money,
    /// Amount reserved by open orders.
    pub locked: Money,
}

impl Balance {
    pub fn total(&self) -> Result<Money, MoneyError> {
        self.free.checked_add(self.locked)
    }
}
