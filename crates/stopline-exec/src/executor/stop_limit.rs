//! Stop-Limit-Exit: one protective stop below the executed entry price.

use async_trait::async_trait;
use stopline_core::{MarketIdentifier, Money, OrderContext};
use stopline_td::ExecutionEngine;
use stopline_td::engine::{BuyFill, EngineError};
use tracing::info;

use super::{ExitOrders, ExitStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopLimitExit {
    stop_percentage: Money,
}

impl StopLimitExit {
    pub fn new(stop_percentage: Money) -> Self {
        Self { stop_percentage }
    }

    /// `executed_price × (1 − stop% / 100)`.
    pub fn stop_price(&self, executed_price: Money) -> Result<Money, EngineError> {
        Ok(executed_price.decrease_by_percent(self.stop_percentage)?)
    }
}

#[async_trait]
impl ExitStrategy for StopLimitExit {
    fn name(&self) -> &'static str {
        "stop_limit"
    }

    fn stop_percentage(&self) -> Money {
        self.stop_percentage
    }

    async fn place_exit_orders(
        &self,
        engine: &ExecutionEngine,
        ctx: &OrderContext,
        market: &MarketIdentifier,
        _trigger_price: Money,
        fill: &BuyFill,
    ) -> Result<ExitOrders, EngineError> {
        let stop_price = self.stop_price(fill.executed_price)?;
        info!(
            trade_id = %ctx.trade_id,
            "[stop-limit-exit] {} stop {stop_price} ({}% below fill {})",
            market.symbol, self.stop_percentage, fill.executed_price
        );
        let placed = engine.stop_market_sell(ctx, market, fill.executed_base_quantity, stop_price).await?;
        Ok(ExitOrders::Stop(placed))
    }
}
