//! Exchange and market identifiers.
//!
//! Exchanges quote spot pairs as a concatenated symbol (`BTCUSDT`) while the
//! rest of the system reasons in `(base, quote)` pairs. [`MarketIdentifier`]
//! carries both, derived once at construction.

use serde::{Deserialize, Serialize};

use super::enums::{Exchange, ExchangeType};

/// Which exchange account an operation runs against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExchangeIdentifier {
    pub exchange: Exchange,
    pub exchange_type: ExchangeType,
    /// Account label, for deployments trading several sub-accounts.
    #[serde(default = "default_account")]
    pub account: String,
}

fn default_account() -> String {
    "default".into()
}

impl ExchangeIdentifier {
    pub fn new(exchange: Exchange, exchange_type: ExchangeType) -> Self {
        Self { exchange, exchange_type, account: default_account() }
    }

    /// Binance spot, default account.
    pub fn binance_spot() -> Self {
        Self::new(Exchange::Binance, ExchangeType::Spot)
    }
}

impl std::fmt::Display for ExchangeIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.exchange, self.exchange_type, self.account)
    }
}

/// A tradable market on a specific exchange account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarketIdentifier {
    pub exchange_identifier: ExchangeIdentifier,
    /// Exchange symbol (e.g. `BTCUSDT`).
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
}

impl MarketIdentifier {
    /// Derive the market from its assets. Asset names are upper-cased.
    pub fn new(exchange_identifier: ExchangeIdentifier, base_asset: &str, quote_asset: &str) -> Self {
        let base_asset = base_asset.trim().to_uppercase();
        let quote_asset = quote_asset.trim().to_uppercase();
        Self { symbol: format!("{base_asset}{quote_asset}"), exchange_identifier, base_asset, quote_asset }
    }
}

impl std::fmt::Display for MarketIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}@{}", self.base_asset, self.quote_asset, self.exchange_identifier)
    }
}
