//! OCO-Exit: stop-limit plus take-profit pair, priced off the trigger.

use async_trait::async_trait;
use stopline_core::error::MoneyError;
use stopline_core::{MarketIdentifier, Money, OrderContext};
use stopline_td::ExecutionEngine;
use stopline_td::engine::{BuyFill, EngineError, OcoPrices};
use tracing::info;

use super::{ExitOrders, ExitStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OcoExit {
    stop_percentage: Money,
    stop_limit_percentage: Money,
    take_profit_percentage: Money,
}

impl OcoExit {
    pub fn new(stop_percentage: Money, stop_limit_percentage: Money, take_profit_percentage: Money) -> Self {
        Self { stop_percentage, stop_limit_percentage, take_profit_percentage }
    }

    /// Leg prices relative to `trigger_price`, before munging.
    pub fn prices(&self, trigger_price: Money) -> Result<OcoPrices, MoneyError> {
        Ok(OcoPrices {
            stop_price: trigger_price.decrease_by_percent(self.stop_percentage)?,
            stop_limit_price: trigger_price.decrease_by_percent(self.stop_limit_percentage)?,
            take_profit_price: trigger_price.increase_by_percent(self.take_profit_percentage)?,
        })
    }
}

#[async_trait]
impl ExitStrategy for OcoExit {
    fn name(&self) -> &'static str {
        "oco"
    }

    fn stop_percentage(&self) -> Money {
        self.stop_percentage
    }

    async fn place_exit_orders(
        &self,
        engine: &ExecutionEngine,
        ctx: &OrderContext,
        market: &MarketIdentifier,
        trigger_price: Money,
        fill: &BuyFill,
    ) -> Result<ExitOrders, EngineError> {
        let prices = self.prices(trigger_price)?;
        info!(
            trade_id = %ctx.trade_id,
            "[oco-exit] {} stop {} / {} take-profit {} off trigger {trigger_price}",
            market.symbol, prices.stop_price, prices.stop_limit_price, prices.take_profit_price
        );
        let placed = engine.oco_sell_order(ctx, market, fill.executed_base_quantity, prices).await?;
        Ok(ExitOrders::Oco(placed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legs_are_priced_off_the_trigger() {
        let exit = OcoExit::new(Money::from(5), Money::from(6), Money::from(20));
        let prices = exit.prices(Money::from(200)).unwrap();
        assert_eq!(prices.stop_price, Money::from(190));
        assert_eq!(prices.stop_limit_price, Money::from(188));
        assert_eq!(prices.take_profit_price, Money::from(240));
    }
}
