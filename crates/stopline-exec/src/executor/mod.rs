//! Entry executors.
//!
//! One [`EntryExecutor`] per edge runs the open-long flow:
//!
//! ```text
//! trigger price → size → IOC limit buy ──(not filled / rejected)──► result as-is
//!                                      └─(filled)─► place exit orders ─► SUCCESS
//!                                                        │ (fails)
//!                                                        ▼
//!                                                   market sell ─► ABORTED_FAILED_TO_CREATE_EXIT_ORDERS
//!                                                        │ (fails)
//!                                                        ▼
//!                                                   ABORTED_DUMP_FAILED (critical)
//! ```
//!
//! Steps run strictly in sequence. The exit structure is an [`ExitStrategy`]:
//! [`StopLimitExit`] or [`OcoExit`].

mod oco;
mod stop_limit;

use async_trait::async_trait;
use stopline_core::config::{EdgeConfig, ExitConfig};
use stopline_core::error::StoreError;
use stopline_core::{
    MarketIdentifier, Money, OrderContext, RoundingMode, SpotPositionIdentifier, TimeInForce, TradeContext, TradeId,
};
use stopline_td::ExecutionEngine;
use stopline_td::engine::{BuyFill, EngineError, LimitBuyResult, OcoOrderPlaced, StopOrderPlaced};
use stopline_td::event::ExecEvent;
use tracing::{error, info, warn};

pub use self::oco::OcoExit;
pub use self::stop_limit::StopLimitExit;
use crate::commands::OpenLongCommand;
use crate::results::OpenLongResult;
use crate::sizer::{PositionSizer, SizingError};

/// Protective orders placed after an entry fill.
#[derive(Debug, Clone, PartialEq)]
pub enum ExitOrders {
    Stop(StopOrderPlaced),
    Oco(OcoOrderPlaced),
}

impl ExitOrders {
    pub fn stop_price(&self) -> Money {
        match self {
            Self::Stop(stop) => stop.stop_price,
            Self::Oco(oco) => oco.prices.stop_price,
        }
    }
}

/// The exit structure of an edge.
#[async_trait]
pub trait ExitStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Distance of the protective stop below the reference price, in percent.
    fn stop_percentage(&self) -> Money;

    /// Place the protective orders for a filled entry.
    async fn place_exit_orders(
        &self,
        engine: &ExecutionEngine,
        ctx: &OrderContext,
        market: &MarketIdentifier,
        trigger_price: Money,
        fill: &BuyFill,
    ) -> Result<ExitOrders, EngineError>;
}

/// Exit strategy configured for an edge.
pub fn exit_strategy(exit: &ExitConfig) -> Box<dyn ExitStrategy> {
    match exit {
        ExitConfig::StopLimit { stop_percentage } => Box::new(StopLimitExit::new(*stop_percentage)),
        ExitConfig::Oco { stop_percentage, stop_limit_percentage, take_profit_percentage } => {
            Box::new(OcoExit::new(*stop_percentage, *stop_limit_percentage, *take_profit_percentage))
        }
    }
}

// ---------------------------------------------------------------------------
// EntryExecutor
// ---------------------------------------------------------------------------

/// Opens protected long positions for one edge.
pub struct EntryExecutor {
    engine: ExecutionEngine,
    sizer: PositionSizer,
    edge: EdgeConfig,
    exit: Box<dyn ExitStrategy>,
}

impl EntryExecutor {
    pub fn new(engine: ExecutionEngine, sizer: PositionSizer, edge: EdgeConfig, exit: Box<dyn ExitStrategy>) -> Self {
        Self { engine, sizer, edge, exit }
    }

    pub fn for_edge(engine: ExecutionEngine, sizer: PositionSizer, edge: EdgeConfig) -> Self {
        let exit = exit_strategy(&edge.exit);
        Self::new(engine, sizer, edge, exit)
    }

    /// Run the open-long flow to exactly one terminal result.
    pub async fn open_long(&self, cmd: &OpenLongCommand) -> OpenLongResult {
        let trade_id = cmd.trade_id.clone();
        let market = self.engine.market(&cmd.base_asset, self.sizer.quote_asset());
        let trade = TradeContext {
            base_asset: market.base_asset.clone(),
            quote_asset: market.quote_asset.clone(),
            edge: self.edge.name.clone(),
            trade_id: trade_id.clone(),
        };
        let ctx = trade.order_context();

        let trigger_price = match cmd.trigger_price {
            Some(price) => price,
            None => match self.engine.current_price(&market).await {
                Ok(price) => {
                    warn!(
                        trade_id = %trade_id,
                        "[executor] no trigger price, using current {} price {price}", market.symbol
                    );
                    price
                }
                Err(e) => return self.engine_failure(trade_id, e),
            },
        };

        if !trigger_price.is_positive() {
            warn!(trade_id = %trade_id, "[executor] refusing {} with trigger price {trigger_price}", market.symbol);
            return OpenLongResult::BadInputs {
                trade_id,
                reason: format!("trigger price must be positive, got {trigger_price}"),
            };
        }

        let (limit_price, base_amount) = match self.size_entry(&trade_id, &market, trigger_price).await {
            Ok(Some(sized)) => sized,
            Ok(None) => {
                return OpenLongResult::InsufficientBalance {
                    trade_id,
                    reason: format!("no {} available to buy {}", market.quote_asset, market.base_asset),
                };
            }
            Err(e) => return self.sizing_failure(trade_id, e),
        };

        info!(
            trade_id = %trade_id,
            "[executor] {} open long {} trigger {trigger_price} limit {limit_price} amount {base_amount} ({} exit)",
            self.edge.name, market.symbol, self.exit.name()
        );
        let fill = match self.engine.limit_buy(&ctx, &market, base_amount, limit_price, TimeInForce::Ioc).await {
            LimitBuyResult::Filled(fill) => fill,
            LimitBuyResult::EntryFailedToFill { .. } => return OpenLongResult::EntryFailedToFill { trade_id },
            LimitBuyResult::InsufficientBalance { msg } => {
                return OpenLongResult::InsufficientBalance { trade_id, reason: msg };
            }
            LimitBuyResult::TooManyRequests { retry_after_seconds } => {
                return OpenLongResult::TooManyRequests { trade_id, retry_after_seconds };
            }
            LimitBuyResult::BadInputs { msg } => return OpenLongResult::BadInputs { trade_id, reason: msg },
            LimitBuyResult::InternalServerError { error } => {
                return OpenLongResult::InternalServerError { trade_id, reason: error.to_string() };
            }
        };

        let position =
            SpotPositionIdentifier::new(self.engine.exchange().clone(), &market.base_asset, self.edge.name.clone());
        if let Err(e) = self.engine.store().open_position(&position, fill.executed_base_quantity, &trade).await {
            return self.dump(&ctx, &market, &position, &fill, format!("failed to record position: {e}")).await;
        }

        let exits = match self.exit.place_exit_orders(&self.engine, &ctx, &market, trigger_price, &fill).await {
            Ok(exits) => exits,
            Err(e) => return self.dump(&ctx, &market, &position, &fill, e.to_string()).await,
        };

        if let Err(e) = self.record_exits(&position, &exits).await {
            error!(trade_id = %trade_id, "[executor] exit orders placed but not recorded for {position}: {e}");
        }

        let (stop_order_id, oco_order_id, take_profit_price) = match &exits {
            ExitOrders::Stop(stop) => (Some(stop.order_id.clone()), None, None),
            ExitOrders::Oco(oco) => (None, Some(oco.order_list_id.clone()), Some(oco.prices.take_profit_price)),
        };
        OpenLongResult::Success {
            trade_id,
            executed_base_quantity: fill.executed_base_quantity,
            executed_quote_quantity: fill.executed_quote_quantity,
            executed_price: fill.executed_price,
            stop_price: exits.stop_price(),
            stop_order_id,
            oco_order_id,
            take_profit_price,
        }
    }

    /// Limit price and base amount of the entry, `None` when there is nothing
    /// to spend.
    async fn size_entry(
        &self,
        trade_id: &TradeId,
        market: &MarketIdentifier,
        trigger_price: Money,
    ) -> Result<Option<(Money, Money)>, SizingError> {
        let limit_price = trigger_price.increase_by_percent(self.edge.slippage_percentage)?;
        let stop_price = trigger_price.decrease_by_percent(self.exit.stop_percentage())?;
        let quote_amount = self.sizer.quote_amount(&self.edge.sizing, trade_id, trigger_price, Some(stop_price)).await?;
        if !quote_amount.is_positive() {
            warn!(trade_id = %trade_id, "[executor] sized {} to zero", market.symbol);
            return Ok(None);
        }
        let base_amount = quote_amount.div(limit_price, RoundingMode::Down)?;
        Ok(Some((limit_price, base_amount)))
    }

    async fn record_exits(
        &self,
        position: &SpotPositionIdentifier,
        exits: &ExitOrders,
    ) -> Result<(), StoreError> {
        let store = self.engine.store();
        match exits {
            ExitOrders::Stop(stop) => store.set_stop_order_id(position, Some(stop.order_id.clone())).await?,
            ExitOrders::Oco(oco) => store.set_oco_order_id(position, Some(oco.order_list_id.clone())).await?,
        }
        store.set_stop_price(position, exits.stop_price()).await
    }

    /// Sell an unprotected fill back at market.
    async fn dump(
        &self,
        ctx: &OrderContext,
        market: &MarketIdentifier,
        position: &SpotPositionIdentifier,
        fill: &BuyFill,
        reason: String,
    ) -> OpenLongResult {
        let trade_id = ctx.trade_id.clone();
        let quantity = fill.executed_base_quantity;
        error!(trade_id = %trade_id, "[executor] no exit orders for {quantity} {}: {reason}; dumping", market.base_asset);

        match self.engine.market_sell(ctx, market, quantity).await {
            Ok(sold) => {
                warn!(
                    trade_id = %trade_id,
                    "[executor] dumped {} {} for {}",
                    sold.executed_base_quantity, market.base_asset, sold.executed_quote_quantity
                );
                if let Err(e) = self.engine.store().close_position(position).await {
                    error!(trade_id = %trade_id, "[executor] failed to clear dumped position {position}: {e}");
                }
                self.engine.emit(ExecEvent::PositionDumped {
                    trade_id: trade_id.clone(),
                    symbol: market.symbol.clone(),
                    base_quantity: sold.executed_base_quantity,
                });
                OpenLongResult::AbortedFailedToCreateExitOrders {
                    trade_id,
                    executed_base_quantity: Money::ZERO,
                    reason,
                }
            }
            Err(e) => {
                error!(
                    trade_id = %trade_id,
                    critical = true,
                    "[executor] DUMP FAILED, {quantity} {} held without a stop: {e}",
                    market.base_asset
                );
                self.engine.emit(ExecEvent::DumpFailed {
                    trade_id: trade_id.clone(),
                    symbol: market.symbol.clone(),
                    base_quantity: quantity,
                    error: e.to_string(),
                });
                OpenLongResult::AbortedDumpFailed {
                    trade_id,
                    unprotected_base_quantity: quantity,
                    reason: format!("{reason}; market sell failed: {e}"),
                }
            }
        }
    }

    fn engine_failure(&self, trade_id: TradeId, e: EngineError) -> OpenLongResult {
        match e {
            e if e.is_rate_limit() => OpenLongResult::TooManyRequests {
                trade_id,
                retry_after_seconds: self.engine.config().rate_limit.retry_after_seconds(),
            },
            EngineError::Filter(e) => OpenLongResult::BadInputs { trade_id, reason: e.to_string() },
            e => OpenLongResult::InternalServerError { trade_id, reason: e.to_string() },
        }
    }

    fn sizing_failure(&self, trade_id: TradeId, e: SizingError) -> OpenLongResult {
        warn!(trade_id = %trade_id, "[executor] sizing failed: {e}");
        match e {
            SizingError::TradingRulesViolation(_) | SizingError::InvalidStop { .. } => {
                OpenLongResult::BadInputs { trade_id, reason: e.to_string() }
            }
            SizingError::Exchange(e) => self.engine_failure(trade_id, e.into()),
            SizingError::Money(e) => OpenLongResult::InternalServerError { trade_id, reason: e.to_string() },
        }
    }
}
