//! Exchange error type and failure classification.
//!
//! The engine needs to tell a handful of failure classes apart (rate limit,
//! insufficient balance, order already gone) without caring which exchange
//! produced them. [`ExchangeError`] keeps the raw code and message and exposes
//! predicates for each class.

use stopline_core::error::MoneyError;
use thiserror::Error;

/// Binance: "Too many requests queued" / "Too much request weight used".
const CODE_TOO_MANY_REQUESTS: i64 = -1003;
/// Binance: "Too many new orders".
const CODE_TOO_MANY_ORDERS: i64 = -1015;
/// Binance: new order rejected.
const CODE_NEW_ORDER_REJECTED: i64 = -2010;
/// Binance: cancel rejected.
const CODE_CANCEL_REJECTED: i64 = -2011;
/// Binance: order does not exist.
const CODE_NO_SUCH_ORDER: i64 = -2013;

/// Failure of a single exchange call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExchangeError {
    /// The exchange answered with an error payload.
    #[error("exchange api error {code} (http {http_status}): {msg}")]
    Api { code: i64, msg: String, http_status: u16 },

    /// The request never produced an exchange answer (connect, timeout, TLS).
    #[error("transport error: {0}")]
    Transport(String),

    /// The exchange answered but the payload could not be understood.
    #[error("decode error: {0}")]
    Decode(String),

    /// A request could not be signed.
    #[error("signing error: {0}")]
    Signing(String),

    /// Symbol missing from exchange metadata.
    #[error("unknown symbol {0}")]
    UnknownSymbol(String),

    /// A monetary value in a response was not an exact decimal.
    #[error("money error: {0}")]
    Money(#[from] MoneyError),
}

impl ExchangeError {
    pub fn api(code: i64, msg: impl Into<String>, http_status: u16) -> Self {
        Self::Api { code, msg: msg.into(), http_status }
    }

    /// Rate-limit rejection as Binance reports it on HTTP 429.
    pub fn rate_limited() -> Self {
        Self::api(CODE_TOO_MANY_REQUESTS, "Too many requests; current limit is 1200 request weight per 1 MINUTE", 429)
    }

    /// Insufficient-balance rejection as Binance reports it.
    pub fn insufficient_balance() -> Self {
        Self::api(CODE_NEW_ORDER_REJECTED, "Account has insufficient balance for requested action.", 400)
    }

    /// Cancel of an order that is no longer open.
    pub fn unknown_order() -> Self {
        Self::api(CODE_CANCEL_REJECTED, "Unknown order sent.", 400)
    }

    /// `true` for "too many requests" style failures that clear after a pause.
    pub fn is_rate_limit(&self) -> bool {
        match self {
            Self::Api { code, msg, http_status } => {
                matches!(*http_status, 429 | 418)
                    || matches!(*code, CODE_TOO_MANY_REQUESTS | CODE_TOO_MANY_ORDERS)
                    || message_matches(msg, &["too many", "request weight"])
            }
            Self::Transport(msg) => message_matches(msg, &["429", "too many"]),
            _ => false,
        }
    }

    /// `true` when the account cannot fund the order.
    pub fn is_insufficient_balance(&self) -> bool {
        match self {
            Self::Api { code, msg, .. } => {
                *code == CODE_NEW_ORDER_REJECTED && message_matches(msg, &["insufficient balance"])
            }
            _ => false,
        }
    }

    /// `true` when a cancel failed because the order is already filled,
    /// canceled or expired. Cancels treat this as success.
    pub fn is_order_gone(&self) -> bool {
        match self {
            Self::Api { code, msg, .. } => {
                matches!(*code, CODE_CANCEL_REJECTED | CODE_NO_SUCH_ORDER)
                    && message_matches(msg, &["unknown order", "does not exist", "canceled", "expired", "filled"])
            }
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() { Self::Decode(e.to_string()) } else { Self::Transport(e.to_string()) }
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

fn message_matches(msg: &str, needles: &[&str]) -> bool {
    let msg = msg.to_ascii_lowercase();
    needles.iter().any(|n| msg.contains(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_rate_limits() {
        assert!(ExchangeError::rate_limited().is_rate_limit());
        let too_many_orders = ExchangeError::api(-1015, "Too many new orders; current limit is 50 orders per 10 SECOND.", 400);
        assert!(too_many_orders.is_rate_limit());
        assert!(ExchangeError::api(0, "whatever", 418).is_rate_limit());
        assert!(!ExchangeError::insufficient_balance().is_rate_limit());
        assert!(!ExchangeError::Transport("connection reset".into()).is_rate_limit());
    }

    #[test]
    fn classifies_insufficient_balance() {
        assert!(ExchangeError::insufficient_balance().is_insufficient_balance());
        assert!(!ExchangeError::api(-2010, "Filter failure: LOT_SIZE", 400).is_insufficient_balance());
    }

    #[test]
    fn classifies_gone_orders() {
        assert!(ExchangeError::unknown_order().is_order_gone());
        assert!(ExchangeError::api(-2013, "Order does not exist.", 400).is_order_gone());
        assert!(!ExchangeError::rate_limited().is_order_gone());
    }
}
