//! Per-symbol trading rules and the munging gate.
//!
//! Every price and quantity sent to the exchange passes through
//! [`ExchangeFilters`] exactly once, right before submission:
//!
//! | Operation          | Rounding                    | Failure                   |
//! |--------------------|-----------------------------|---------------------------|
//! | `munge_quantity`   | down to a `step_size` multiple | `LotSizeViolation`     |
//! | `munge_price`      | nearest `tick_size` multiple (half up) | `PriceFilterViolation` |
//! | `check_notional`   | none                        | `MinNotionalViolation`    |
//!
//! A price of exactly zero is the market-order sentinel: it passes
//! `munge_price` untouched and disables the notional check. Limit and stop
//! prices go through `munge_order_price`, which refuses it.
//!
//! Rules are loaded from `exchange_info()` and held by [`RulesCache`] for a
//! configurable TTL.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stopline_core::error::MoneyError;
use stopline_core::{Money, RoundingMode};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::ExchangeClient;
use crate::error::ExchangeError;

// ---------------------------------------------------------------------------
// Exchange metadata (wire shape of `GET /api/v3/exchangeInfo`)
// ---------------------------------------------------------------------------

/// Symbol metadata returned by the exchange.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExchangeInfo {
    pub symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    #[serde(default)]
    pub filters: Vec<SymbolFilter>,
}

/// The filters this system enforces. Everything else is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "filterType")]
pub enum SymbolFilter {
    #[serde(rename = "PRICE_FILTER", rename_all = "camelCase")]
    Price { min_price: Money, tick_size: Money },

    #[serde(rename = "LOT_SIZE", rename_all = "camelCase")]
    LotSize { min_qty: Money, step_size: Money },

    #[serde(rename = "MIN_NOTIONAL", alias = "NOTIONAL", rename_all = "camelCase")]
    MinNotional { min_notional: Money },

    #[serde(other)]
    Other,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A price or quantity the exchange would reject.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    #[error("{symbol}: quantity {quantity} rounds to {munged}, below min_qty {min_qty} (step {step_size})")]
    LotSizeViolation { symbol: String, quantity: Money, munged: Money, min_qty: Money, step_size: Money },

    #[error("{symbol}: price {price} rounds to {munged}, below min_price {min_price} (tick {tick_size})")]
    PriceFilterViolation { symbol: String, price: Money, munged: Money, min_price: Money, tick_size: Money },

    #[error("{symbol}: order price must be positive, got {price}")]
    NonPositivePrice { symbol: String, price: Money },

    #[error("{symbol}: notional {notional} below min_notional {min_notional}")]
    MinNotionalViolation { symbol: String, notional: Money, min_notional: Money },

    #[error("no trading rules for symbol {0}")]
    UnknownSymbol(String),

    #[error(transparent)]
    Money(#[from] MoneyError),
}

// ---------------------------------------------------------------------------
// TradingRules
// ---------------------------------------------------------------------------

/// Trading rules of one symbol. A zero limit means "unconstrained".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingRules {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub step_size: Money,
    pub min_qty: Money,
    pub tick_size: Money,
    pub min_price: Money,
    pub min_notional: Money,
}

impl TradingRules {
    fn from_symbol_info(info: &SymbolInfo) -> Self {
        let mut rules = Self {
            symbol: info.symbol.clone(),
            base_asset: info.base_asset.clone(),
            quote_asset: info.quote_asset.clone(),
            step_size: Money::ZERO,
            min_qty: Money::ZERO,
            tick_size: Money::ZERO,
            min_price: Money::ZERO,
            min_notional: Money::ZERO,
        };
        for filter in &info.filters {
            match *filter {
                SymbolFilter::Price { min_price, tick_size } => {
                    rules.min_price = min_price;
                    rules.tick_size = tick_size;
                }
                SymbolFilter::LotSize { min_qty, step_size } => {
                    rules.min_qty = min_qty;
                    rules.step_size = step_size;
                }
                SymbolFilter::MinNotional { min_notional } => rules.min_notional = min_notional,
                SymbolFilter::Other => {}
            }
        }
        rules
    }

    /// Round `quantity` down to the step grid and enforce `min_qty`.
    pub fn munge_quantity(&self, quantity: Money) -> Result<Money, FilterError> {
        let munged = quantity.round_down_to_step(self.step_size)?;
        if !munged.is_positive() || munged < self.min_qty {
            return Err(FilterError::LotSizeViolation {
                symbol: self.symbol.clone(),
                quantity,
                munged,
                min_qty: self.min_qty,
                step_size: self.step_size,
            });
        }
        Ok(munged)
    }

    /// Round `price` to the nearest tick and enforce `min_price`. Zero passes through.
    pub fn munge_price(&self, price: Money) -> Result<Money, FilterError> {
        if price.is_zero() {
            return Ok(price);
        }
        let munged = price.round_to_step(self.tick_size, RoundingMode::HalfUp)?;
        if !munged.is_positive() || munged < self.min_price {
            return Err(FilterError::PriceFilterViolation {
                symbol: self.symbol.clone(),
                price,
                munged,
                min_price: self.min_price,
                tick_size: self.tick_size,
            });
        }
        Ok(munged)
    }

    /// [`munge_price`](Self::munge_price) for a limit or stop price, where
    /// zero is not the market sentinel but an invalid price.
    pub fn munge_order_price(&self, price: Money) -> Result<Money, FilterError> {
        if !price.is_positive() {
            return Err(FilterError::NonPositivePrice { symbol: self.symbol.clone(), price });
        }
        self.munge_price(price)
    }

    /// Enforce `price × quantity ≥ min_notional`. Skipped for the zero price.
    pub fn check_notional(&self, price: Money, quantity: Money) -> Result<(), FilterError> {
        if price.is_zero() {
            return Ok(());
        }
        let notional = price.checked_mul(quantity)?;
        if notional < self.min_notional {
            return Err(FilterError::MinNotionalViolation {
                symbol: self.symbol.clone(),
                notional,
                min_notional: self.min_notional,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ExchangeFilters
// ---------------------------------------------------------------------------

/// Trading rules for every symbol of an exchange, plus a `(base, quote)` index.
#[derive(Debug, Clone, Default)]
pub struct ExchangeFilters {
    rules: HashMap<String, TradingRules>,
    by_assets: HashMap<(String, String), String>,
}

impl ExchangeFilters {
    pub fn from_exchange_info(info: &ExchangeInfo) -> Self {
        let mut filters = Self::default();
        for symbol in &info.symbols {
            filters.insert(TradingRules::from_symbol_info(symbol));
        }
        filters
    }

    pub fn insert(&mut self, rules: TradingRules) {
        self.by_assets.insert((rules.base_asset.clone(), rules.quote_asset.clone()), rules.symbol.clone());
        self.rules.insert(rules.symbol.clone(), rules);
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self, symbol: &str) -> Result<&TradingRules, FilterError> {
        self.rules.get(symbol).ok_or_else(|| FilterError::UnknownSymbol(symbol.to_string()))
    }

    /// Exchange symbol trading `base` against `quote`, if listed.
    pub fn symbol_for(&self, base: &str, quote: &str) -> Option<&str> {
        self.by_assets.get(&(base.to_string(), quote.to_string())).map(String::as_str)
    }

    pub fn munge_quantity(&self, symbol: &str, quantity: Money) -> Result<Money, FilterError> {
        self.rules(symbol)?.munge_quantity(quantity)
    }

    pub fn munge_price(&self, symbol: &str, price: Money) -> Result<Money, FilterError> {
        self.rules(symbol)?.munge_price(price)
    }

    pub fn munge_order_price(&self, symbol: &str, price: Money) -> Result<Money, FilterError> {
        self.rules(symbol)?.munge_order_price(price)
    }

    pub fn check_notional(&self, symbol: &str, price: Money, quantity: Money) -> Result<(), FilterError> {
        self.rules(symbol)?.check_notional(price, quantity)
    }
}

// ---------------------------------------------------------------------------
// RulesCache
// ---------------------------------------------------------------------------

/// Lazily fetched, TTL-bounded [`ExchangeFilters`].
pub struct RulesCache {
    client: Arc<dyn ExchangeClient>,
    ttl: Duration,
    cached: RwLock<Option<(Instant, Arc<ExchangeFilters>)>>,
}

impl RulesCache {
    pub fn new(client: Arc<dyn ExchangeClient>, ttl: Duration) -> Self {
        Self { client, ttl, cached: RwLock::new(None) }
    }

    /// Current filters, refetching when missing or older than the TTL.
    pub async fn filters(&self) -> Result<Arc<ExchangeFilters>, ExchangeError> {
        if let Some((fetched_at, ref filters)) = *self.cached.read().await {
            if fetched_at.elapsed() < self.ttl {
                return Ok(Arc::clone(filters));
            }
        }

        let mut guard = self.cached.write().await;
        // Another task may have refreshed while we waited for the write lock.
        if let Some((fetched_at, ref filters)) = *guard {
            if fetched_at.elapsed() < self.ttl {
                return Ok(Arc::clone(filters));
            }
        }

        debug!("[rules] fetching exchange info");
        let info = self.client.exchange_info().await?;
        let filters = Arc::new(ExchangeFilters::from_exchange_info(&info));
        info!("[rules] loaded trading rules for {} symbols", filters.len());
        *guard = Some((Instant::now(), Arc::clone(&filters)));
        Ok(filters)
    }

    /// Drop the cached rules; the next call refetches.
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }
}
