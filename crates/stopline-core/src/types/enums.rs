//! Enumerations used throughout the stopline system.
//!
//! These are exchange-neutral; each exchange adapter maps them to its own
//! wire strings.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Exchange identifiers
// ---------------------------------------------------------------------------

/// Supported cryptocurrency exchanges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Exchange {
    Binance,
}

impl std::fmt::Display for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Binance => write!(f, "binance"),
        }
    }
}

/// Market category on an exchange.
///
/// Only spot markets carry positions today; the discriminator is still part
/// of every persisted key so futures state can never collide with spot state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeType {
    #[default]
    Spot,
    Futures,
}

impl std::fmt::Display for ExchangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spot => write!(f, "spot"),
            Self::Futures => write!(f, "futures"),
        }
    }
}

// ---------------------------------------------------------------------------
// Order / trading enums
// ---------------------------------------------------------------------------

/// Order status, unified across all exchanges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    #[serde(alias = "EXPIRED_IN_MATCH")]
    Expired,
    PendingCancel,
}

/// Buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Buy,
    Sell,
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
    Limit,
    /// Stop order whose triggered leg is a limit order.
    StopLossLimit,
}

/// Time in force for limit orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeInForce {
    #[default]
    Gtc,
    /// Immediate-or-cancel: fill what is possible now, cancel the rest.
    Ioc,
}

// ---------------------------------------------------------------------------
// Wire names (the upper-case strings shared by the REST APIs)
// ---------------------------------------------------------------------------

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Market => "MARKET",
            Self::Limit => "LIMIT",
            Self::StopLossLimit => "STOP_LOSS_LIMIT",
        }
    }
}

impl TimeInForce {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gtc => "GTC",
            Self::Ioc => "IOC",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_match_serde_names() {
        for t in [OrderType::Market, OrderType::Limit, OrderType::StopLossLimit] {
            assert_eq!(serde_json::to_value(t).unwrap(), t.as_str());
        }
        assert_eq!(serde_json::to_value(TimeInForce::Ioc).unwrap(), "IOC");
        assert_eq!(Side::Sell.as_str(), "SELL");
    }

    #[test]
    fn expired_in_match_is_expired() {
        let status: OrderStatus = serde_json::from_str("\"EXPIRED_IN_MATCH\"").unwrap();
        assert_eq!(status, OrderStatus::Expired);
    }
}
