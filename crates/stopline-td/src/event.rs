//! Execution events emitted by the engine and executors to downstream
//! consumers (metrics exporters, dashboards).
//!
//! The channel is a best-effort side channel: senders ignore a closed or
//! missing receiver, so no consumer can influence a trading outcome.

use stopline_core::{EdgeId, Money, OrderId, TradeId};

/// A typed event describing one execution step.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecEvent {
    /// An order was accepted by the exchange.
    OrderPlaced {
        trade_id: TradeId,
        symbol: String,
        /// `"limit_buy"`, `"stop_market_sell"`, `"oco_sell"`, `"market_sell"`.
        kind: &'static str,
        order_id: OrderId,
    },

    /// The IOC entry filled (fully or partially).
    EntryFilled {
        trade_id: TradeId,
        edge: EdgeId,
        symbol: String,
        executed_base_quantity: Money,
        executed_price: Money,
    },

    /// The IOC entry expired without any fill.
    EntryNotFilled { trade_id: TradeId, symbol: String },

    /// A protective order was canceled (or was already gone).
    OrderCanceled { trade_id: Option<TradeId>, symbol: String, order_id: OrderId },

    /// A position was liquidated because its exit orders could not be placed.
    PositionDumped { trade_id: TradeId, symbol: String, base_quantity: Money },

    /// Liquidation after an exit-order failure also failed. The position may
    /// still be open without protection.
    DumpFailed { trade_id: TradeId, symbol: String, base_quantity: Money, error: String },

    /// A call was rejected for rate limiting after all retries.
    RateLimited { trade_id: TradeId, operation: &'static str },
}

/// Sender half of the execution event channel.
pub type ExecEventSender = tokio::sync::mpsc::UnboundedSender<ExecEvent>;

/// Receiver half of the execution event channel.
pub type ExecEventReceiver = tokio::sync::mpsc::UnboundedReceiver<ExecEvent>;

/// Create a new event channel.
pub fn channel() -> (ExecEventSender, ExecEventReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}

/// Send `event` if a sender is configured; a dropped receiver is ignored.
pub fn emit(sender: Option<&ExecEventSender>, event: ExecEvent) {
    if let Some(tx) = sender {
        let _ = tx.send(event);
    }
}
