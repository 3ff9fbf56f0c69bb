//! Configuration parsing for the stopline system.
//!
//! Everything is read from a single JSON file. The top-level object holds
//! runner metadata, account-wide trading settings and an `edges` array where
//! each entry describes one strategy: how it exits a position and how it sizes
//! one. Exchange credentials live under an exchange-specific key (e.g.
//! `binance`) that is parsed by the adapter crate, not here.
//!
//! # Example config
//!
//! ```json
//! {
//!   "Runner": { "module_name": "stopline", "log_path": "/tmp/log" },
//!   "quote_asset": "USDT",
//!   "rate_limit": { "retry_after_secs": 11, "max_attempts": 3 },
//!   "edges": [{
//!     "name": "edge60",
//!     "slippage_percentage": "0.5",
//!     "exit": { "type": "stop_limit", "stop_percentage": "15" },
//!     "sizing": { "type": "risk", "max_allowed_portfolio_loss_percentage_per_trade": "0.5" }
//!   }],
//!   "binance": { "api_key": "...", "secret_key": "..." }
//! }
//! ```
//!
//! Decimal values must be JSON strings or integers; float literals are rejected.

use std::collections::HashSet;

use serde::Deserialize;

use crate::error::CoreError;
use crate::money::Money;
use crate::notify::Severity;
use crate::types::{EdgeId, ExchangeIdentifier, ExchangeType};

/// Limit leg of a stop-market-sell, as a fraction of the trigger price (0.8).
pub const DEFAULT_STOP_LIMIT_PRICE_RATIO: Money = Money::from_decimal(rust_decimal::Decimal::from_parts(8, 0, 0, false, 1));

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Module metadata (name, log path).
    #[serde(rename = "Runner")]
    pub runner: Option<ModuleMeta>,

    /// Exchange account every command runs against.
    #[serde(default = "ExchangeIdentifier::binance_spot")]
    pub exchange: ExchangeIdentifier,

    /// Quote asset positions are bought with (e.g. `USDT`).
    #[serde(default = "default_quote_asset")]
    pub quote_asset: String,

    /// How long fetched exchange trading rules stay valid.
    #[serde(default = "default_exchange_info_ttl_secs")]
    pub exchange_info_ttl_secs: u64,

    /// Base assets that may never be bought (stablecoins by default).
    #[serde(default = "default_denied_base_assets")]
    pub denied_base_assets: Vec<String>,

    /// Exchange rate-limit retry policy.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Limit price of a stop-market-sell as a fraction of its trigger price.
    #[serde(default = "default_stop_limit_price_ratio")]
    pub stop_limit_price_ratio: Money,

    /// Operator alert webhook. Alerts only reach the log when absent.
    #[serde(default)]
    pub notifications: Option<NotificationConfig>,

    /// Authorized strategies.
    pub edges: Vec<EdgeConfig>,
}

/// Chat / pager webhook for operator alerts.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    pub webhook_url: String,

    /// Lowest severity posted to the webhook.
    #[serde(default = "default_min_severity")]
    pub min_severity: Severity,

    #[serde(default = "default_notification_timeout_ms")]
    pub timeout_ms: u64,
}

/// Module metadata block.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleMeta {
    pub module_name: Option<String>,
    pub log_path: Option<String>,
}

/// Retry policy for "too many requests" exchange rejections.
///
/// The defaults were tuned against Binance's order-placement window; other
/// exchanges may need different values.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Fixed pause between attempts.
    #[serde(default = "default_retry_after_secs")]
    pub retry_after_secs: u64,

    /// Total attempts, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { retry_after_secs: default_retry_after_secs(), max_attempts: default_max_attempts() }
    }
}

/// A single strategy configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EdgeConfig {
    pub name: EdgeId,

    /// Premium over the trigger price accepted on the IOC entry order.
    #[serde(default = "default_slippage_percentage")]
    pub slippage_percentage: Money,

    pub exit: ExitConfig,

    pub sizing: SizingConfig,
}

/// Protective exit structure placed after an entry fill.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExitConfig {
    /// A single stop order `stop_percentage` below the executed entry price.
    StopLimit { stop_percentage: Money },

    /// Stop + take-profit pair, all percentages relative to the trigger price.
    Oco { stop_percentage: Money, stop_limit_percentage: Money, take_profit_percentage: Money },
}

impl ExitConfig {
    /// Stop distance used for risk-based sizing.
    pub fn stop_percentage(&self) -> Money {
        match self {
            Self::StopLimit { stop_percentage } | Self::Oco { stop_percentage, .. } => *stop_percentage,
        }
    }
}

/// How much quote asset to spend on an entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SizingConfig {
    /// Fixed quote amount, clipped to the available balance.
    Fixed { quote_amount: Money },

    /// Size so that hitting the stop loses at most the given share of the portfolio.
    Risk {
        max_allowed_portfolio_loss_percentage_per_trade: Money,
        #[serde(default)]
        allowed_to_trade_without_stop: bool,
        #[serde(default)]
        max_quote_amount: Option<Money>,
    },
}

impl AppConfig {
    /// Deserialize from an already-parsed JSON document and validate.
    pub fn from_value(value: serde_json::Value) -> anyhow::Result<Self> {
        let config: AppConfig = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field invariants serde cannot express.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.exchange.exchange_type != ExchangeType::Spot {
            return Err(CoreError::Config(format!("unsupported exchange type '{}'", self.exchange.exchange_type)));
        }
        if self.quote_asset.trim().is_empty() {
            return Err(CoreError::Config("quote_asset must not be empty".into()));
        }
        if self.rate_limit.max_attempts == 0 {
            return Err(CoreError::Config("rate_limit.max_attempts must be at least 1".into()));
        }
        if !self.stop_limit_price_ratio.is_positive() || self.stop_limit_price_ratio > Money::ONE {
            return Err(CoreError::Config(format!(
                "stop_limit_price_ratio must be in (0, 1], got {}",
                self.stop_limit_price_ratio
            )));
        }
        if let Some(notifications) = &self.notifications {
            if notifications.webhook_url.trim().is_empty() {
                return Err(CoreError::Config("notifications.webhook_url must not be empty".into()));
            }
        }
        if self.edges.is_empty() {
            return Err(CoreError::Config("at least one edge must be configured".into()));
        }

        let mut seen = HashSet::new();
        for edge in &self.edges {
            if !seen.insert(edge.name.clone()) {
                return Err(CoreError::Config(format!("duplicate edge '{}'", edge.name)));
            }
            edge.validate()?;
        }
        Ok(())
    }

    /// Returns the module name, defaulting to `stopline`.
    pub fn module_name(&self) -> String {
        self.runner.as_ref().and_then(|m| m.module_name.clone()).unwrap_or_else(|| "stopline".into())
    }

    /// Returns the log path.
    pub fn log_path(&self) -> Option<String> {
        self.runner.as_ref().and_then(|m| m.log_path.clone())
    }
}

impl EdgeConfig {
    fn validate(&self) -> Result<(), CoreError> {
        let name = &self.name;
        if self.slippage_percentage.is_negative() {
            return Err(CoreError::Config(format!("{name}: slippage_percentage must not be negative")));
        }
        match &self.exit {
            ExitConfig::StopLimit { stop_percentage } => check_percentage(name, "stop_percentage", *stop_percentage)?,
            ExitConfig::Oco { stop_percentage, stop_limit_percentage, take_profit_percentage } => {
                check_percentage(name, "stop_percentage", *stop_percentage)?;
                check_percentage(name, "stop_limit_percentage", *stop_limit_percentage)?;
                if stop_limit_percentage < stop_percentage {
                    return Err(CoreError::Config(format!(
                        "{name}: stop_limit_percentage must be >= stop_percentage"
                    )));
                }
                if !take_profit_percentage.is_positive() {
                    return Err(CoreError::Config(format!("{name}: take_profit_percentage must be positive")));
                }
            }
        }
        match &self.sizing {
            SizingConfig::Fixed { quote_amount } if !quote_amount.is_positive() => {
                Err(CoreError::Config(format!("{name}: quote_amount must be positive")))
            }
            SizingConfig::Risk { max_allowed_portfolio_loss_percentage_per_trade: pct, .. } => {
                check_percentage(name, "max_allowed_portfolio_loss_percentage_per_trade", *pct)
            }
            SizingConfig::Fixed { .. } => Ok(()),
        }
    }
}

fn check_percentage(edge: &EdgeId, field: &str, value: Money) -> Result<(), CoreError> {
    if !value.is_positive() || value >= Money::HUNDRED {
        return Err(CoreError::Config(format!("{edge}: {field} must be in (0, 100), got {value}")));
    }
    Ok(())
}

fn default_min_severity() -> Severity {
    Severity::Warn
}

fn default_notification_timeout_ms() -> u64 {
    5_000
}

fn default_quote_asset() -> String {
    "USDT".into()
}

fn default_exchange_info_ttl_secs() -> u64 {
    3600
}

fn default_denied_base_assets() -> Vec<String> {
    ["USDT", "USDC", "BUSD", "TUSD", "FDUSD", "DAI", "USDP"].iter().map(|s| s.to_string()).collect()
}

fn default_retry_after_secs() -> u64 {
    11 // clears a 10 s sliding order-rate window
}

fn default_max_attempts() -> u32 {
    3
}

fn default_stop_limit_price_ratio() -> Money {
    DEFAULT_STOP_LIMIT_PRICE_RATIO
}

fn default_slippage_percentage() -> Money {
    Money::from_decimal(rust_decimal::Decimal::new(5, 1))
}

/// Read a JSON config file into a raw document, so adapter crates can pick
/// out their own sections.
pub fn load_config_value(path: &std::path::Path) -> anyhow::Result<serde_json::Value> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Load, parse and validate a JSON config file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<AppConfig> {
    AppConfig::from_value(load_config_value(path)?)
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use serde_json::json;

    use super::*;

    fn sample() -> serde_json::Value {
        json!({
            "Runner": { "module_name": "stopline-test" },
            "edges": [
                {
                    "name": "edge60",
                    "exit": { "type": "stop_limit", "stop_percentage": "15" },
                    "sizing": { "type": "risk", "max_allowed_portfolio_loss_percentage_per_trade": "0.5" }
                },
                {
                    "name": "edge70",
                    "slippage_percentage": "1",
                    "exit": {
                        "type": "oco",
                        "stop_percentage": "5",
                        "stop_limit_percentage": "6",
                        "take_profit_percentage": "20"
                    },
                    "sizing": { "type": "fixed", "quote_amount": 100 }
                }
            ]
        })
    }

    #[test]
    fn parses_edges_and_defaults() {
        let config = AppConfig::from_value(sample()).unwrap();
        assert_eq!(config.module_name(), "stopline-test");
        assert_eq!(config.quote_asset, "USDT");
        assert_eq!(config.rate_limit.retry_after_secs, 11);
        assert_eq!(config.rate_limit.max_attempts, 3);
        assert_eq!(config.stop_limit_price_ratio.as_decimal(), dec!(0.8));
        assert!(config.denied_base_assets.iter().any(|a| a == "USDC"));

        let edge60 = &config.edges[0];
        assert_eq!(edge60.slippage_percentage.as_decimal(), dec!(0.5));
        assert_eq!(edge60.exit.stop_percentage().as_decimal(), dec!(15));
        assert!(matches!(edge60.sizing, SizingConfig::Risk { allowed_to_trade_without_stop: false, .. }));

        let edge70 = &config.edges[1];
        assert!(matches!(edge70.exit, ExitConfig::Oco { .. }));
        assert_eq!(edge70.sizing, SizingConfig::Fixed { quote_amount: Money::from(100) });
    }

    #[test]
    fn float_percentages_are_rejected() {
        let mut value = sample();
        value["edges"][0]["exit"]["stop_percentage"] = json!(15.5);
        assert!(AppConfig::from_value(value).is_err());
    }

    #[test]
    fn duplicate_edges_are_rejected() {
        let mut value = sample();
        value["edges"][1]["name"] = json!("edge60");
        let err = AppConfig::from_value(value).unwrap_err();
        assert!(err.to_string().contains("duplicate edge"));
    }

    #[test]
    fn empty_webhook_url_is_rejected() {
        let mut value = sample();
        value["notifications"] = json!({ "webhook_url": " ", "min_severity": "critical" });
        let err = AppConfig::from_value(value).unwrap_err();
        assert!(err.to_string().contains("webhook_url"), "{err}");
    }

    #[test]
    fn only_spot_exchanges_are_accepted() {
        let mut value = sample();
        value["exchange"] = json!({ "exchange": "binance", "exchange_type": "futures" });
        let err = AppConfig::from_value(value).unwrap_err();
        assert!(err.to_string().contains("unsupported exchange type 'futures'"), "{err}");
    }

    #[test]
    fn oco_stop_limit_must_sit_below_stop() {
        let mut value = sample();
        value["edges"][1]["exit"]["stop_limit_percentage"] = json!("4");
        assert!(AppConfig::from_value(value).is_err());
    }
}
