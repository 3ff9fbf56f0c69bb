//! Position sizer.
//!
//! Turns an edge's [`SizingConfig`] into the quote amount to spend on an
//! entry:
//!
//! - **Fixed**: the configured amount, clipped to the free quote balance.
//! - **Risk**: spend so that a stop-out loses at most
//!   `max_allowed_portfolio_loss_percentage_per_trade` of the portfolio:
//!
//! ```text
//! stop %      = (buy − stop) / buy × 100
//! portfolio % = max loss % / stop % × 100
//! amount      = min(portfolio value × portfolio % / 100, free quote, max_quote_amount)
//! ```
//!
//! Portfolio value is every balance converted to the quote asset at last
//! price. Assets without a direct `<asset><quote>` market are skipped with a
//! warning.

use std::sync::Arc;

use stopline_core::config::SizingConfig;
use stopline_core::error::MoneyError;
use stopline_core::{Balance, Money, RoundingMode, TradeId};
use stopline_td::rules::RulesCache;
use stopline_td::{ExchangeClient, ExchangeError};
use thiserror::Error;
use tracing::{info, warn};

/// Why no entry size could be computed.
#[derive(Debug, Error)]
pub enum SizingError {
    /// The edge requires a stop price and none was given.
    #[error("trading rules violation: {0}")]
    TradingRulesViolation(String),

    /// The stop sits at or above the buy price.
    #[error("stop price {stop_price} is not below buy price {buy_price}")]
    InvalidStop { buy_price: Money, stop_price: Money },

    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error(transparent)]
    Money(#[from] MoneyError),
}

/// Computes entry sizes from live account balances.
#[derive(Clone)]
pub struct PositionSizer {
    client: Arc<dyn ExchangeClient>,
    rules: Arc<RulesCache>,
    quote_asset: String,
}

impl PositionSizer {
    pub fn new(client: Arc<dyn ExchangeClient>, rules: Arc<RulesCache>, quote_asset: impl Into<String>) -> Self {
        Self { client, rules, quote_asset: quote_asset.into().trim().to_uppercase() }
    }

    pub fn quote_asset(&self) -> &str {
        &self.quote_asset
    }

    /// Quote amount to spend buying at `buy_price` with a protective stop at
    /// `stop_price`. Zero when nothing is available.
    pub async fn quote_amount(
        &self,
        sizing: &SizingConfig,
        trade_id: &TradeId,
        buy_price: Money,
        stop_price: Option<Money>,
    ) -> Result<Money, SizingError> {
        match sizing {
            SizingConfig::Fixed { quote_amount } => {
                let balances = self.client.account_balances().await?;
                let available = self.free_quote(&balances)?;
                let amount = (*quote_amount).min(available);
                info!(trade_id = %trade_id, "[sizer] fixed {quote_amount} (available {available}) -> {amount}");
                Ok(amount)
            }
            SizingConfig::Risk {
                max_allowed_portfolio_loss_percentage_per_trade: max_loss,
                allowed_to_trade_without_stop,
                max_quote_amount,
            } => {
                let stop_percentage = match stop_price {
                    Some(stop_price) => stop_percentage(buy_price, stop_price)?,
                    None if *allowed_to_trade_without_stop => Money::HUNDRED,
                    None => {
                        return Err(SizingError::TradingRulesViolation(
                            "no stop price supplied and trading without a stop is not allowed".into(),
                        ));
                    }
                };
                let portfolio_percentage = max_loss.checked_mul(Money::HUNDRED)?.div(stop_percentage, RoundingMode::Down)?;

                let balances = self.client.account_balances().await?;
                let available = self.free_quote(&balances)?;
                let portfolio = self.portfolio_value(trade_id, &balances).await?;
                let at_risk = portfolio.percent(portfolio_percentage)?;

                let mut amount = at_risk.min(available);
                if let Some(cap) = max_quote_amount {
                    amount = amount.min(*cap);
                }
                info!(
                    trade_id = %trade_id,
                    "[sizer] risk: stop {stop_percentage}% -> {portfolio_percentage}% of portfolio {portfolio} = {at_risk}, \
                     available {available} -> {amount}"
                );
                Ok(amount)
            }
        }
    }

    fn free_quote(&self, balances: &[Balance]) -> Result<Money, MoneyError> {
        Money::checked_sum(balances.iter().filter(|b| b.asset == self.quote_asset).map(|b| b.free))
    }

    /// Sum of all balances (free + locked) valued in the quote asset.
    async fn portfolio_value(&self, trade_id: &TradeId, balances: &[Balance]) -> Result<Money, SizingError> {
        let filters = self.rules.filters().await?;
        let prices = self.client.prices().await?;

        let mut total = Money::ZERO;
        for balance in balances {
            let amount = balance.total()?;
            if amount.is_zero() {
                continue;
            }
            if balance.asset == self.quote_asset {
                total = total.checked_add(amount)?;
                continue;
            }
            let price = filters.symbol_for(&balance.asset, &self.quote_asset).and_then(|symbol| prices.get(symbol));
            match price {
                Some(price) => total = total.checked_add(amount.checked_mul(*price)?)?,
                None => warn!(
                    trade_id = %trade_id,
                    "[sizer] no {}{} price, {} {} left out of portfolio value",
                    balance.asset, self.quote_asset, amount, balance.asset
                ),
            }
        }
        Ok(total)
    }
}

/// `(buy − stop) / buy × 100`, which must be positive.
pub fn stop_percentage(buy_price: Money, stop_price: Money) -> Result<Money, SizingError> {
    if !buy_price.is_positive() || stop_price >= buy_price {
        return Err(SizingError::InvalidStop { buy_price, stop_price });
    }
    let pct = buy_price.checked_sub(stop_price)?.checked_mul(Money::HUNDRED)?.div(buy_price, RoundingMode::HalfEven)?;
    if !pct.is_positive() {
        return Err(SizingError::InvalidStop { buy_price, stop_price });
    }
    Ok(pct)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use stopline_td::mock::{MockCall, MockExchange};
    use stopline_td::rules::TradingRules;

    use super::*;

    fn m(s: &str) -> Money {
        s.parse().unwrap()
    }

    fn rules(base: &str) -> TradingRules {
        TradingRules {
            symbol: format!("{base}USDT"),
            base_asset: base.into(),
            quote_asset: "USDT".into(),
            step_size: m("0.0001"),
            min_qty: m("0.0001"),
            tick_size: m("0.01"),
            min_price: m("0.01"),
            min_notional: m("5"),
        }
    }

    fn sizer(mock: MockExchange) -> (Arc<MockExchange>, PositionSizer) {
        let mock = Arc::new(mock);
        let cache = Arc::new(RulesCache::new(mock.clone(), Duration::from_secs(60)));
        (mock.clone(), PositionSizer::new(mock, cache, "usdt"))
    }

    fn risk(max_loss: &str, without_stop: bool, cap: Option<&str>) -> SizingConfig {
        SizingConfig::Risk {
            max_allowed_portfolio_loss_percentage_per_trade: m(max_loss),
            allowed_to_trade_without_stop: without_stop,
            max_quote_amount: cap.map(m),
        }
    }

    #[test]
    fn stop_percentage_is_exact() {
        assert_eq!(stop_percentage(m("100"), m("85")).unwrap(), m("15"));
        assert!(matches!(stop_percentage(m("100"), m("100")), Err(SizingError::InvalidStop { .. })));
        assert!(matches!(stop_percentage(m("100"), m("101")), Err(SizingError::InvalidStop { .. })));
    }

    #[tokio::test]
    async fn overflowing_balances_are_an_error() {
        let max = m("79228162514264337593543950335");
        let (_, sizer) =
            sizer(MockExchange::new().with_balance("USDT", max, Money::ZERO).with_balance("USDT", max, Money::ZERO));
        let fixed = SizingConfig::Fixed { quote_amount: m("100") };
        let err = sizer.quote_amount(&fixed, &TradeId::from("t"), m("100"), None).await.unwrap_err();
        assert!(matches!(err, SizingError::Money(MoneyError::NotANumber(_))), "{err:?}");
    }

    #[tokio::test]
    async fn fixed_amount_is_clipped_to_free_balance() {
        let (_, sizer) = sizer(MockExchange::new().with_balance("USDT", m("60"), m("500")));
        let fixed = SizingConfig::Fixed { quote_amount: m("100") };
        let amount = sizer.quote_amount(&fixed, &TradeId::from("t"), m("100"), None).await.unwrap();
        assert_eq!(amount, m("60"));
    }

    #[tokio::test]
    async fn risk_sizing_values_the_whole_portfolio() {
        // 1000 USDT + 0.1 BTC @ 20000 = 3000; 15% stop at 0.5% max loss -> 3.33..% of 3000.
        let (_, sizer) = sizer(
            MockExchange::new()
                .with_symbol(rules("BTC"))
                .with_price("BTCUSDT", m("20000"))
                .with_balance("USDT", m("1000"), Money::ZERO)
                .with_balance("BTC", m("0.05"), m("0.05")),
        );
        let amount = sizer.quote_amount(&risk("0.5", false, None), &TradeId::from("t"), m("100"), Some(m("85"))).await;
        let amount = amount.unwrap();
        assert!(amount > m("99.99") && amount <= m("100"), "{amount}");
    }

    #[tokio::test]
    async fn unpriced_assets_are_skipped() {
        let (mock, sizer) = sizer(
            MockExchange::new().with_balance("USDT", m("1000"), Money::ZERO).with_balance("XYZ", m("50"), Money::ZERO),
        );
        // 1% loss at a 50% stop: 2% of 1000.
        let amount = sizer.quote_amount(&risk("1", false, None), &TradeId::from("t"), m("10"), Some(m("5"))).await;
        assert_eq!(amount.unwrap(), m("20"));
        assert!(mock.calls().contains(&MockCall::Prices));
    }

    #[tokio::test]
    async fn risk_amount_never_exceeds_free_quote_or_cap() {
        let (_, sizer) = sizer(MockExchange::new().with_balance("USDT", m("50"), m("950")));
        // A 1% stop at 5% max loss would allow 500% of the portfolio.
        let amount = sizer.quote_amount(&risk("5", false, None), &TradeId::from("t"), m("100"), Some(m("99"))).await;
        assert_eq!(amount.unwrap(), m("50"));

        let capped =
            sizer.quote_amount(&risk("5", false, Some("20")), &TradeId::from("t"), m("100"), Some(m("99"))).await;
        assert_eq!(capped.unwrap(), m("20"));
    }

    #[tokio::test]
    async fn missing_stop_needs_permission() {
        let (mock, sizer) = sizer(MockExchange::new().with_balance("USDT", m("1000"), Money::ZERO));
        let err = sizer.quote_amount(&risk("1", false, None), &TradeId::from("t"), m("100"), None).await.unwrap_err();
        assert!(matches!(err, SizingError::TradingRulesViolation(_)));
        assert!(mock.calls().is_empty());

        // Without a stop the whole position is at risk: 1% of 1000.
        let amount = sizer.quote_amount(&risk("1", true, None), &TradeId::from("t"), m("100"), None).await;
        assert_eq!(amount.unwrap(), m("10"));
    }
}
