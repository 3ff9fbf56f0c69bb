//! Identity threaded through a trade: strategy edge, trade id, order ids and
//! the persisted position key.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::market::ExchangeIdentifier;

/// Current [`OrderContext`] schema version.
pub const ORDER_CONTEXT_VERSION: u32 = 1;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Strategy / signal-source identifier (e.g. `edge60`).
    EdgeId
);
string_id!(
    /// Identifier of one round-trip trade (entry + exit).
    TradeId
);
string_id!(
    /// Exchange-assigned order id (or order-list id for OCO orders).
    OrderId
);
string_id!(
    /// Locally generated client order id, sent with the order.
    ClientOrderId
);

impl TradeId {
    /// Fresh random trade id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl ClientOrderId {
    /// Fresh client order id: 32 lowercase hex chars, accepted by every
    /// supported exchange's client-id pattern.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }
}

/// Attribution stored for every order before it is submitted, so an
/// out-of-band fill can be traced back to the edge and trade that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderContext {
    pub edge: EdgeId,
    pub trade_id: TradeId,
    pub version: u32,
}

impl OrderContext {
    pub fn new(edge: EdgeId, trade_id: TradeId) -> Self {
        Self { edge, trade_id, version: ORDER_CONTEXT_VERSION }
    }
}

/// Identifying info for one round-trip trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeContext {
    pub base_asset: String,
    pub quote_asset: String,
    pub edge: EdgeId,
    pub trade_id: TradeId,
}

impl TradeContext {
    pub fn order_context(&self) -> OrderContext {
        OrderContext::new(self.edge.clone(), self.trade_id.clone())
    }
}

/// Key of persisted spot position state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpotPositionIdentifier {
    pub exchange_identifier: ExchangeIdentifier,
    pub base_asset: String,
    pub edge: EdgeId,
}

impl SpotPositionIdentifier {
    pub fn new(exchange_identifier: ExchangeIdentifier, base_asset: &str, edge: EdgeId) -> Self {
        Self { exchange_identifier, base_asset: base_asset.trim().to_uppercase(), edge }
    }
}

impl std::fmt::Display for SpotPositionIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.exchange_identifier, self.base_asset, self.edge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_order_ids_are_unique_and_short() {
        let a = ClientOrderId::generate();
        let b = ClientOrderId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }

    #[test]
    fn position_key_is_stable() {
        let pos = SpotPositionIdentifier::new(ExchangeIdentifier::binance_spot(), "eth", EdgeId::from("edge60"));
        assert_eq!(pos.to_string(), "binance:spot:default:ETH:edge60");
    }
}
