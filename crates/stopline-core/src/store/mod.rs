//! Position and order-context persistence contract.
//!
//! The execution layer records two kinds of state:
//!
//! - **Order contexts**: `(exchange, order id) → OrderContext`, written before
//!   an order is submitted so an out-of-band fill can be attributed.
//! - **Positions**: keyed by [`SpotPositionIdentifier`]: size, owning trade,
//!   protective stop / OCO order ids and the stop price.
//!
//! Implementations must be read-after-write consistent for a single position
//! within one process. Nothing here is atomic across calls: "is there already
//! a position" followed by an entry is a read-then-act sequence, and two
//! concurrent entries for the same position can both pass the check.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use self::memory::MemoryStore;
use crate::error::StoreError;
use crate::money::Money;
use crate::types::{ExchangeIdentifier, OrderContext, OrderId, SpotPositionIdentifier, TradeContext};

/// Everything persisted about one open position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub id: SpotPositionIdentifier,
    /// Base-asset quantity held. Zero means "not in position".
    pub size: Money,
    pub trade: Option<TradeContext>,
    pub stop_order_id: Option<OrderId>,
    pub oco_order_id: Option<OrderId>,
    pub stop_price: Option<Money>,
}

impl PositionRecord {
    pub fn empty(id: SpotPositionIdentifier) -> Self {
        Self { id, size: Money::ZERO, trade: None, stop_order_id: None, oco_order_id: None, stop_price: None }
    }
}

/// Persistence operations consumed by the execution layer.
#[async_trait]
pub trait PositionStore: Send + Sync {
    /// Record the attribution of an order, keyed by its client or exchange id.
    async fn set_order_context(
        &self,
        exchange: &ExchangeIdentifier,
        order_id: &str,
        context: &OrderContext,
    ) -> Result<(), StoreError>;

    /// Look up the attribution recorded for an order.
    async fn get_order_context_for_order(
        &self,
        exchange: &ExchangeIdentifier,
        order_id: &str,
    ) -> Result<Option<OrderContext>, StoreError>;

    async fn stop_order_id(&self, position: &SpotPositionIdentifier) -> Result<Option<OrderId>, StoreError>;

    async fn set_stop_order_id(
        &self,
        position: &SpotPositionIdentifier,
        order_id: Option<OrderId>,
    ) -> Result<(), StoreError>;

    async fn oco_order_id(&self, position: &SpotPositionIdentifier) -> Result<Option<OrderId>, StoreError>;

    async fn set_oco_order_id(
        &self,
        position: &SpotPositionIdentifier,
        order_id: Option<OrderId>,
    ) -> Result<(), StoreError>;

    async fn stop_price(&self, position: &SpotPositionIdentifier) -> Result<Option<Money>, StoreError>;

    async fn set_stop_price(&self, position: &SpotPositionIdentifier, price: Money) -> Result<(), StoreError>;

    /// `true` when a non-zero position is recorded for `(exchange, base_asset, edge)`.
    async fn in_position(&self, position: &SpotPositionIdentifier) -> Result<bool, StoreError>;

    /// Recorded base-asset size, zero when not in position.
    async fn position_size(&self, position: &SpotPositionIdentifier) -> Result<Money, StoreError>;

    /// Trade that opened the position, if recorded.
    async fn trade_context(&self, position: &SpotPositionIdentifier) -> Result<Option<TradeContext>, StoreError>;

    /// Record a freshly filled entry.
    async fn open_position(
        &self,
        position: &SpotPositionIdentifier,
        size: Money,
        trade: &TradeContext,
    ) -> Result<(), StoreError>;

    /// Forget a position and its exit orders.
    async fn close_position(&self, position: &SpotPositionIdentifier) -> Result<(), StoreError>;

    /// All positions with a non-zero size.
    async fn open_positions(&self) -> Result<Vec<PositionRecord>, StoreError>;

    /// Find the position whose stop or OCO order has the given id.
    async fn position_for_exit_order(&self, order_id: &str) -> Result<Option<PositionRecord>, StoreError>;
}
