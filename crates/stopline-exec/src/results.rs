//! Closed result enums of the three service operations.
//!
//! Every variant is one terminal status. [`CommandOutcome`] attaches the
//! transport-level metadata (HTTP-equivalent status, operator message,
//! notification severity); [`CommandResponse`] is the serialized envelope:
//!
//! ```json
//! {"status": "SUCCESS", "trade_id": "...", ..., "http_status": 200,
//!  "msg": "...", "severity": "info", "execution_timestamp_ms": 1700000000000}
//! ```

use serde::Serialize;
use stopline_core::notify::{Notification, Severity};
use stopline_core::time_util::now_ms;
use stopline_core::{Money, OrderId, TradeId};

/// Metadata every terminal result carries.
pub trait CommandOutcome {
    /// Wire name of the variant (`"SUCCESS"`, `"ALREADY_IN_POSITION"`, ...).
    fn status(&self) -> &'static str;
    fn http_status(&self) -> u16;
    /// Human-readable message, suitable for the operator channel.
    fn msg(&self) -> String;
    fn severity(&self) -> Severity;
    fn trade_id(&self) -> Option<&TradeId>;

    fn is_success(&self) -> bool {
        self.status() == "SUCCESS"
    }

    fn notification(&self) -> Notification {
        let n = Notification::new(self.severity(), format!("{}: {}", self.status(), self.msg()));
        match self.trade_id() {
            Some(trade_id) => n.with_trade_id(trade_id.clone()),
            None => n,
        }
    }
}

/// Serialized envelope of a terminal result.
#[derive(Debug, Clone, Serialize)]
pub struct CommandResponse<R> {
    #[serde(flatten)]
    pub result: R,
    pub http_status: u16,
    pub msg: String,
    pub severity: Severity,
    pub execution_timestamp_ms: u64,
}

impl<R: CommandOutcome> CommandResponse<R> {
    pub fn new(result: R) -> Self {
        Self {
            http_status: result.http_status(),
            msg: result.msg(),
            severity: result.severity(),
            execution_timestamp_ms: now_ms(),
            result,
        }
    }
}

impl<R: CommandOutcome> From<R> for CommandResponse<R> {
    fn from(result: R) -> Self {
        Self::new(result)
    }
}

// ---------------------------------------------------------------------------
// open_long
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OpenLongResult {
    /// Entry filled and protected.
    Success {
        trade_id: TradeId,
        executed_base_quantity: Money,
        executed_quote_quantity: Money,
        executed_price: Money,
        stop_price: Money,
        #[serde(skip_serializing_if = "Option::is_none")]
        stop_order_id: Option<OrderId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        oco_order_id: Option<OrderId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        take_profit_price: Option<Money>,
    },
    /// IOC entry expired with nothing bought.
    EntryFailedToFill { trade_id: TradeId },
    InsufficientBalance { trade_id: TradeId, reason: String },
    TooManyRequests { trade_id: TradeId, retry_after_seconds: u64 },
    BadInputs { trade_id: TradeId, reason: String },
    Unauthorised { trade_id: TradeId, reason: String },
    AlreadyInPosition { trade_id: TradeId },
    /// Exit orders could not be placed; the fill was sold back at market.
    AbortedFailedToCreateExitOrders { trade_id: TradeId, executed_base_quantity: Money, reason: String },
    /// Exit orders could not be placed and the market sell failed too. The
    /// position is open without protection.
    AbortedDumpFailed { trade_id: TradeId, unprotected_base_quantity: Money, reason: String },
    InternalServerError { trade_id: TradeId, reason: String },
}

impl CommandOutcome for OpenLongResult {
    fn status(&self) -> &'static str {
        match self {
            Self::Success { .. } => "SUCCESS",
            Self::EntryFailedToFill { .. } => "ENTRY_FAILED_TO_FILL",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::TooManyRequests { .. } => "TOO_MANY_REQUESTS",
            Self::BadInputs { .. } => "BAD_INPUTS",
            Self::Unauthorised { .. } => "UNAUTHORISED",
            Self::AlreadyInPosition { .. } => "ALREADY_IN_POSITION",
            Self::AbortedFailedToCreateExitOrders { .. } => "ABORTED_FAILED_TO_CREATE_EXIT_ORDERS",
            Self::AbortedDumpFailed { .. } => "ABORTED_DUMP_FAILED",
            Self::InternalServerError { .. } => "INTERNAL_SERVER_ERROR",
        }
    }

    fn http_status(&self) -> u16 {
        match self {
            Self::Success { .. } | Self::EntryFailedToFill { .. } => 200,
            Self::InsufficientBalance { .. } | Self::BadInputs { .. } => 400,
            Self::Unauthorised { .. } => 403,
            Self::AlreadyInPosition { .. } => 409,
            Self::TooManyRequests { .. } => 429,
            Self::AbortedFailedToCreateExitOrders { .. }
            | Self::AbortedDumpFailed { .. }
            | Self::InternalServerError { .. } => 500,
        }
    }

    fn msg(&self) -> String {
        match self {
            Self::Success { executed_base_quantity, executed_price, stop_price, take_profit_price, .. } => {
                match take_profit_price {
                    Some(tp) => format!(
                        "bought {executed_base_quantity} @ {executed_price}, stop {stop_price}, take profit {tp}"
                    ),
                    None => format!("bought {executed_base_quantity} @ {executed_price}, stop {stop_price}"),
                }
            }
            Self::EntryFailedToFill { .. } => "entry order expired unfilled".into(),
            Self::InsufficientBalance { reason, .. } => format!("insufficient balance: {reason}"),
            Self::TooManyRequests { retry_after_seconds, .. } => {
                format!("rate limited by the exchange, retry after {retry_after_seconds}s")
            }
            Self::BadInputs { reason, .. } => format!("bad inputs: {reason}"),
            Self::Unauthorised { reason, .. } => format!("unauthorised: {reason}"),
            Self::AlreadyInPosition { .. } => "already in position".into(),
            Self::AbortedFailedToCreateExitOrders { reason, .. } => {
                format!("could not create exit orders ({reason}); position was dumped")
            }
            Self::AbortedDumpFailed { unprotected_base_quantity, reason, .. } => format!(
                "could not create exit orders and the dump failed ({reason}); \
                 {unprotected_base_quantity} held WITHOUT a stop"
            ),
            Self::InternalServerError { reason, .. } => format!("internal error: {reason}"),
        }
    }

    fn severity(&self) -> Severity {
        match self {
            Self::Success { .. } => Severity::Info,
            Self::EntryFailedToFill { .. }
            | Self::TooManyRequests { .. }
            | Self::BadInputs { .. }
            | Self::Unauthorised { .. }
            | Self::AlreadyInPosition { .. } => Severity::Warn,
            Self::InsufficientBalance { .. }
            | Self::AbortedFailedToCreateExitOrders { .. }
            | Self::InternalServerError { .. } => Severity::Error,
            Self::AbortedDumpFailed { .. } => Severity::Critical,
        }
    }

    fn trade_id(&self) -> Option<&TradeId> {
        match self {
            Self::Success { trade_id, .. }
            | Self::EntryFailedToFill { trade_id }
            | Self::InsufficientBalance { trade_id, .. }
            | Self::TooManyRequests { trade_id, .. }
            | Self::BadInputs { trade_id, .. }
            | Self::Unauthorised { trade_id, .. }
            | Self::AlreadyInPosition { trade_id }
            | Self::AbortedFailedToCreateExitOrders { trade_id, .. }
            | Self::AbortedDumpFailed { trade_id, .. }
            | Self::InternalServerError { trade_id, .. } => Some(trade_id),
        }
    }
}

// ---------------------------------------------------------------------------
// close
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CloseResult {
    Success {
        #[serde(skip_serializing_if = "Option::is_none")]
        trade_id: Option<TradeId>,
        executed_base_quantity: Money,
        executed_quote_quantity: Money,
    },
    NotInPosition,
    Unauthorised { reason: String },
    TooManyRequests {
        #[serde(skip_serializing_if = "Option::is_none")]
        trade_id: Option<TradeId>,
        retry_after_seconds: u64,
    },
    InternalServerError {
        #[serde(skip_serializing_if = "Option::is_none")]
        trade_id: Option<TradeId>,
        reason: String,
    },
}

impl CommandOutcome for CloseResult {
    fn status(&self) -> &'static str {
        match self {
            Self::Success { .. } => "SUCCESS",
            Self::NotInPosition => "NOT_IN_POSITION",
            Self::Unauthorised { .. } => "UNAUTHORISED",
            Self::TooManyRequests { .. } => "TOO_MANY_REQUESTS",
            Self::InternalServerError { .. } => "INTERNAL_SERVER_ERROR",
        }
    }

    fn http_status(&self) -> u16 {
        match self {
            Self::Success { .. } | Self::NotInPosition => 200,
            Self::Unauthorised { .. } => 403,
            Self::TooManyRequests { .. } => 429,
            Self::InternalServerError { .. } => 500,
        }
    }

    fn msg(&self) -> String {
        match self {
            Self::Success { executed_base_quantity, executed_quote_quantity, .. } => {
                format!("sold {executed_base_quantity} for {executed_quote_quantity}")
            }
            Self::NotInPosition => "not in position".into(),
            Self::Unauthorised { reason } => format!("unauthorised: {reason}"),
            Self::TooManyRequests { retry_after_seconds, .. } => {
                format!("rate limited by the exchange, retry after {retry_after_seconds}s")
            }
            Self::InternalServerError { reason, .. } => format!("close failed: {reason}"),
        }
    }

    fn severity(&self) -> Severity {
        match self {
            Self::Success { .. } => Severity::Info,
            Self::NotInPosition | Self::Unauthorised { .. } | Self::TooManyRequests { .. } => Severity::Warn,
            Self::InternalServerError { .. } => Severity::Error,
        }
    }

    fn trade_id(&self) -> Option<&TradeId> {
        match self {
            Self::Success { trade_id, .. }
            | Self::TooManyRequests { trade_id, .. }
            | Self::InternalServerError { trade_id, .. } => trade_id.as_ref(),
            Self::NotInPosition | Self::Unauthorised { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// move_stop
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MoveStopResult {
    Success { trade_id: TradeId, stop_order_id: OrderId, stop_price: Money },
    NotInPosition { trade_id: TradeId },
    /// The position is protected by an OCO list, which cannot be moved.
    OcoExitNotSupported { trade_id: TradeId, oco_order_id: OrderId },
    /// The old stop was canceled but the new one was rejected: the position
    /// is unprotected.
    FailedToPlaceNewStop { trade_id: TradeId, reason: String },
    /// The new stop violates the symbol's trading rules. The old stop is untouched.
    BadInputs { trade_id: TradeId, reason: String },
    Unauthorised { trade_id: TradeId, reason: String },
    TooManyRequests { trade_id: TradeId, retry_after_seconds: u64 },
    InternalServerError { trade_id: TradeId, reason: String },
}

impl CommandOutcome for MoveStopResult {
    fn status(&self) -> &'static str {
        match self {
            Self::Success { .. } => "SUCCESS",
            Self::NotInPosition { .. } => "NOT_IN_POSITION",
            Self::OcoExitNotSupported { .. } => "OCO_EXIT_NOT_SUPPORTED",
            Self::FailedToPlaceNewStop { .. } => "FAILED_TO_PLACE_NEW_STOP",
            Self::BadInputs { .. } => "BAD_INPUTS",
            Self::Unauthorised { .. } => "UNAUTHORISED",
            Self::TooManyRequests { .. } => "TOO_MANY_REQUESTS",
            Self::InternalServerError { .. } => "INTERNAL_SERVER_ERROR",
        }
    }

    fn http_status(&self) -> u16 {
        match self {
            Self::Success { .. } | Self::NotInPosition { .. } => 200,
            Self::OcoExitNotSupported { .. } | Self::BadInputs { .. } => 400,
            Self::Unauthorised { .. } => 403,
            Self::TooManyRequests { .. } => 429,
            Self::FailedToPlaceNewStop { .. } | Self::InternalServerError { .. } => 500,
        }
    }

    fn msg(&self) -> String {
        match self {
            Self::Success { stop_order_id, stop_price, .. } => format!("stop moved to {stop_price} ({stop_order_id})"),
            Self::NotInPosition { .. } => "not in position".into(),
            Self::OcoExitNotSupported { oco_order_id, .. } => {
                format!("position is protected by OCO list {oco_order_id}; only plain stops can be moved")
            }
            Self::FailedToPlaceNewStop { reason, .. } => {
                format!("old stop canceled but the new stop was rejected ({reason}); position has NO stop")
            }
            Self::BadInputs { reason, .. } => format!("bad inputs: {reason}"),
            Self::Unauthorised { reason, .. } => format!("unauthorised: {reason}"),
            Self::TooManyRequests { retry_after_seconds, .. } => {
                format!("rate limited by the exchange, retry after {retry_after_seconds}s")
            }
            Self::InternalServerError { reason, .. } => format!("move stop failed: {reason}"),
        }
    }

    fn severity(&self) -> Severity {
        match self {
            Self::Success { .. } => Severity::Info,
            Self::NotInPosition { .. }
            | Self::OcoExitNotSupported { .. }
            | Self::BadInputs { .. }
            | Self::Unauthorised { .. }
            | Self::TooManyRequests { .. } => Severity::Warn,
            Self::InternalServerError { .. } => Severity::Error,
            Self::FailedToPlaceNewStop { .. } => Severity::Critical,
        }
    }

    fn trade_id(&self) -> Option<&TradeId> {
        match self {
            Self::Success { trade_id, .. }
            | Self::NotInPosition { trade_id }
            | Self::OcoExitNotSupported { trade_id, .. }
            | Self::FailedToPlaceNewStop { trade_id, .. }
            | Self::BadInputs { trade_id, .. }
            | Self::Unauthorised { trade_id, .. }
            | Self::TooManyRequests { trade_id, .. }
            | Self::InternalServerError { trade_id, .. } => Some(trade_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aborted_entry_serializes_zero_quantity_string() {
        let result = OpenLongResult::AbortedFailedToCreateExitOrders {
            trade_id: TradeId::from("t-1"),
            executed_base_quantity: Money::ZERO,
            reason: "stop rejected".into(),
        };
        let json = serde_json::to_value(CommandResponse::new(result)).unwrap();
        assert_eq!(json["status"], "ABORTED_FAILED_TO_CREATE_EXIT_ORDERS");
        assert_eq!(json["executed_base_quantity"], "0");
        assert_eq!(json["http_status"], 500);
        assert_eq!(json["severity"], "error");
        assert!(json["execution_timestamp_ms"].as_u64().unwrap() > 0);
    }

    #[test]
    fn status_matches_serialized_tag() {
        let results = [
            OpenLongResult::AlreadyInPosition { trade_id: TradeId::from("t") },
            OpenLongResult::AbortedDumpFailed {
                trade_id: TradeId::from("t"),
                unprotected_base_quantity: Money::from(1),
                reason: "down".into(),
            },
            OpenLongResult::TooManyRequests { trade_id: TradeId::from("t"), retry_after_seconds: 11 },
        ];
        for result in results {
            let json = serde_json::to_value(&result).unwrap();
            assert_eq!(json["status"], result.status());
        }
        let json = serde_json::to_value(CloseResult::NotInPosition).unwrap();
        assert_eq!(json["status"], "NOT_IN_POSITION");
    }

    #[test]
    fn unprotected_positions_are_critical() {
        let dump_failed = OpenLongResult::AbortedDumpFailed {
            trade_id: TradeId::from("t"),
            unprotected_base_quantity: Money::from(1),
            reason: "down".into(),
        };
        assert_eq!(dump_failed.severity(), Severity::Critical);
        assert_eq!(dump_failed.notification().trade_id, Some(TradeId::from("t")));

        let no_stop = MoveStopResult::FailedToPlaceNewStop { trade_id: TradeId::from("t"), reason: "x".into() };
        assert_eq!(no_stop.severity(), Severity::Critical);
        assert!(!no_stop.is_success());
    }
}
