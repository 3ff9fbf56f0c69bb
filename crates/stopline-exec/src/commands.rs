//! Typed command inputs of the Trade Abstraction Service.
//!
//! Transport-agnostic: whatever front end receives a signal (HTTP, queue,
//! CLI) deserializes it into one of these.

use serde::{Deserialize, Serialize};
use stopline_core::{EdgeId, Money, TradeContext, TradeId};

/// Open a long position on `base_asset` for `edge`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenLongCommand {
    pub base_asset: String,
    pub edge: EdgeId,
    /// Signal-time reference price. The current market price is used when absent.
    #[serde(default)]
    pub trigger_price: Option<Money>,
    #[serde(default = "TradeId::generate")]
    pub trade_id: TradeId,
    pub signal_timestamp_ms: u64,
}

/// Close the position held by `edge` on `base_asset`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseCommand {
    pub base_asset: String,
    pub edge: EdgeId,
    pub signal_timestamp_ms: u64,
}

/// Replace the protective stop of an open position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveStopCommand {
    pub trade_context: TradeContext,
    pub new_stop_price: Money,
    pub signal_timestamp_ms: u64,
}
