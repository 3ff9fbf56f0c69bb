//! Trade Abstraction Service: the `open_long` / `close` / `move_stop`
//! dispatcher.
//!
//! On top of delegation it authorizes every command (edge known, base asset
//! not denylisted) before any exchange call, guards against double entries,
//! and relays every terminal result to the [`Notifier`].
//!
//! The already-in-position guard is a read-then-act check against the
//! store. Two concurrent `open_long` commands for the same position can both
//! pass it.

use std::collections::HashMap;
use std::sync::Arc;

use stopline_core::config::AppConfig;
use stopline_core::error::StoreError;
use stopline_core::notify::{Notification, Notifier, Severity, notify_best_effort};
use stopline_core::store::{PositionRecord, PositionStore};
use stopline_core::time_util::signal_age_ms;
use stopline_core::{
    EdgeId, ExchangeIdentifier, MarketIdentifier, Money, OrderContext, OrderId, SpotPositionIdentifier, TradeId,
};
use stopline_td::ExecutionEngine;
use stopline_td::engine::EngineError;
use tracing::{debug, error, info, warn};

use crate::commands::{CloseCommand, MoveStopCommand, OpenLongCommand};
use crate::edges::EdgeRegistry;
use crate::executor::EntryExecutor;
use crate::results::{CloseResult, CommandOutcome, MoveStopResult, OpenLongResult};
use crate::sizer::PositionSizer;

pub struct TradeAbstractionService {
    engine: ExecutionEngine,
    edges: EdgeRegistry,
    executors: HashMap<EdgeId, EntryExecutor>,
    quote_asset: String,
    notifier: Arc<dyn Notifier>,
}

impl TradeAbstractionService {
    pub fn new(config: &AppConfig, engine: ExecutionEngine, notifier: Arc<dyn Notifier>) -> Self {
        let sizer = PositionSizer::new(engine.client().clone(), engine.rules().clone(), config.quote_asset.as_str());
        let executors = config
            .edges
            .iter()
            .map(|edge| (edge.name.clone(), EntryExecutor::for_edge(engine.clone(), sizer.clone(), edge.clone())))
            .collect();
        Self {
            edges: EdgeRegistry::from_config(config),
            executors,
            quote_asset: sizer.quote_asset().to_string(),
            engine,
            notifier,
        }
    }

    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    fn store(&self) -> &Arc<dyn PositionStore> {
        self.engine.store()
    }

    fn position_id(&self, base_asset: &str, edge: &EdgeId) -> SpotPositionIdentifier {
        SpotPositionIdentifier::new(self.engine.exchange().clone(), base_asset, edge.clone())
    }

    async fn relay<R: CommandOutcome>(&self, result: R) -> R {
        notify_best_effort(self.notifier.as_ref(), result.notification()).await;
        result
    }

    // -----------------------------------------------------------------------
    // open_long
    // -----------------------------------------------------------------------

    pub async fn open_long(&self, cmd: &OpenLongCommand) -> OpenLongResult {
        info!(
            trade_id = %cmd.trade_id,
            "[service] open_long {} edge {} (signal age {}ms)",
            cmd.base_asset, cmd.edge, signal_age_ms(cmd.signal_timestamp_ms)
        );
        let result = self.try_open_long(cmd).await;
        info!(trade_id = %cmd.trade_id, "[service] open_long {} -> {}", cmd.base_asset, result.status());
        self.relay(result).await
    }

    async fn try_open_long(&self, cmd: &OpenLongCommand) -> OpenLongResult {
        let trade_id = cmd.trade_id.clone();
        if let Err(e) = self.edges.authorize(&cmd.edge, &cmd.base_asset) {
            warn!(trade_id = %trade_id, "[service] open_long refused: {e}");
            return OpenLongResult::Unauthorised { trade_id, reason: e.to_string() };
        }
        let Some(executor) = self.executors.get(&cmd.edge) else {
            return OpenLongResult::Unauthorised { trade_id, reason: format!("no executor for edge '{}'", cmd.edge) };
        };

        let position = self.position_id(&cmd.base_asset, &cmd.edge);
        match self.store().in_position(&position).await {
            Ok(true) => return OpenLongResult::AlreadyInPosition { trade_id },
            Ok(false) => {}
            Err(e) => return OpenLongResult::InternalServerError { trade_id, reason: e.to_string() },
        }
        executor.open_long(cmd).await
    }

    // -----------------------------------------------------------------------
    // close
    // -----------------------------------------------------------------------

    /// Cancel the position's exit orders (best-effort) and sell the tracked
    /// size at market.
    pub async fn close(&self, cmd: &CloseCommand) -> CloseResult {
        info!(
            "[service] close {} edge {} (signal age {}ms)",
            cmd.base_asset, cmd.edge, signal_age_ms(cmd.signal_timestamp_ms)
        );
        let result = match self.try_close(cmd).await {
            Ok(result) => result,
            Err(e) => CloseResult::InternalServerError { trade_id: None, reason: e.to_string() },
        };
        info!("[service] close {} -> {}", cmd.base_asset, result.status());
        self.relay(result).await
    }

    async fn try_close(&self, cmd: &CloseCommand) -> Result<CloseResult, StoreError> {
        if let Err(e) = self.edges.authorize(&cmd.edge, &cmd.base_asset) {
            warn!("[service] close refused: {e}");
            return Ok(CloseResult::Unauthorised { reason: e.to_string() });
        }

        let position = self.position_id(&cmd.base_asset, &cmd.edge);
        let size = self.store().position_size(&position).await?;
        if !size.is_positive() {
            return Ok(CloseResult::NotInPosition);
        }

        let (ctx, quote_asset) = match self.store().trade_context(&position).await? {
            Some(trade) => (trade.order_context(), trade.quote_asset),
            None => {
                let ctx = OrderContext::new(cmd.edge.clone(), TradeId::generate());
                warn!(
                    trade_id = %ctx.trade_id,
                    "[service] {position} has no trade context, closing under a new trade id"
                );
                (ctx, self.quote_asset.clone())
            }
        };
        let trade_id = ctx.trade_id.clone();
        let market = self.engine.market(&cmd.base_asset, &quote_asset);

        // Once an exit order is canceled the sell must go out, so store
        // failures from here on are logged, not returned.
        if let Some(stop_order_id) = self.store().stop_order_id(&position).await? {
            match self.engine.cancel_order(Some(&trade_id), &market, &stop_order_id).await {
                Ok(_) => {
                    if let Err(e) = self.store().set_stop_order_id(&position, None).await {
                        error!(trade_id = %trade_id, "[service] stop {stop_order_id} canceled but not cleared: {e}");
                    }
                }
                Err(e) => self.exit_cancel_failed(&trade_id, "stop", &stop_order_id, &e).await,
            }
        }
        if let Some(oco_order_id) = self.store().oco_order_id(&position).await? {
            match self.engine.cancel_oco_order(Some(&trade_id), &market, &oco_order_id).await {
                Ok(_) => {
                    if let Err(e) = self.store().set_oco_order_id(&position, None).await {
                        error!(trade_id = %trade_id, "[service] OCO {oco_order_id} canceled but not cleared: {e}");
                    }
                }
                Err(e) => self.exit_cancel_failed(&trade_id, "OCO", &oco_order_id, &e).await,
            }
        }

        match self.engine.market_sell(&ctx, &market, size).await {
            Ok(sold) => {
                if let Err(e) = self.store().close_position(&position).await {
                    error!(trade_id = %trade_id, "[service] sold {position} but failed to clear it: {e}");
                }
                Ok(CloseResult::Success {
                    trade_id: Some(trade_id),
                    executed_base_quantity: sold.executed_base_quantity,
                    executed_quote_quantity: sold.executed_quote_quantity,
                })
            }
            Err(e) if e.is_rate_limit() => Ok(CloseResult::TooManyRequests {
                trade_id: Some(trade_id),
                retry_after_seconds: self.engine.config().rate_limit.retry_after_seconds(),
            }),
            Err(e) => {
                error!(trade_id = %trade_id, "[service] close of {position} failed: {e}");
                Ok(CloseResult::InternalServerError { trade_id: Some(trade_id), reason: e.to_string() })
            }
        }
    }

    async fn exit_cancel_failed(
        &self,
        trade_id: &TradeId,
        kind: &str,
        order_id: &OrderId,
        e: &EngineError,
    ) {
        warn!(trade_id = %trade_id, "[service] failed to cancel {kind} order {order_id}: {e}; selling anyway");
        let notification =
            Notification::new(Severity::Warn, format!("close: failed to cancel {kind} order {order_id}: {e}"))
                .with_trade_id(trade_id.clone());
        notify_best_effort(self.notifier.as_ref(), notification).await;
    }

    // -----------------------------------------------------------------------
    // move_stop
    // -----------------------------------------------------------------------

    /// Replace the plain stop of an open position. Positions protected by an
    /// OCO list are refused.
    pub async fn move_stop(&self, cmd: &MoveStopCommand) -> MoveStopResult {
        let trade_id = cmd.trade_context.trade_id.clone();
        info!(
            trade_id = %trade_id,
            "[service] move_stop {} edge {} to {} (signal age {}ms)",
            cmd.trade_context.base_asset,
            cmd.trade_context.edge,
            cmd.new_stop_price,
            signal_age_ms(cmd.signal_timestamp_ms)
        );
        let result = match self.try_move_stop(cmd).await {
            Ok(result) => result,
            Err(e) => MoveStopResult::InternalServerError { trade_id: trade_id.clone(), reason: e.to_string() },
        };
        info!(trade_id = %trade_id, "[service] move_stop -> {}", result.status());
        self.relay(result).await
    }

    async fn try_move_stop(&self, cmd: &MoveStopCommand) -> Result<MoveStopResult, StoreError> {
        let trade = &cmd.trade_context;
        let trade_id = trade.trade_id.clone();
        if let Err(e) = self.edges.authorize(&trade.edge, &trade.base_asset) {
            warn!(trade_id = %trade_id, "[service] move_stop refused: {e}");
            return Ok(MoveStopResult::Unauthorised { trade_id, reason: e.to_string() });
        }

        let position = self.position_id(&trade.base_asset, &trade.edge);
        let size = self.store().position_size(&position).await?;
        if !size.is_positive() {
            return Ok(MoveStopResult::NotInPosition { trade_id });
        }
        if let Some(oco_order_id) = self.store().oco_order_id(&position).await? {
            return Ok(MoveStopResult::OcoExitNotSupported { trade_id, oco_order_id });
        }

        let market = self.engine.market(&trade.base_asset, &trade.quote_asset);
        if let Err(e) = self.check_stop(&market, size, cmd).await {
            return Ok(match e {
                e if e.is_rate_limit() => self.move_stop_rate_limited(trade_id),
                e @ (EngineError::Filter(_) | EngineError::Money(_)) => {
                    MoveStopResult::BadInputs { trade_id, reason: e.to_string() }
                }
                e => MoveStopResult::InternalServerError { trade_id, reason: e.to_string() },
            });
        }

        if let Some(old_stop) = self.store().stop_order_id(&position).await? {
            if let Err(e) = self.engine.cancel_order(Some(&trade_id), &market, &old_stop).await {
                warn!(trade_id = %trade_id, "[service] could not cancel stop {old_stop}, leaving it in place: {e}");
                return Ok(if e.is_rate_limit() {
                    self.move_stop_rate_limited(trade_id)
                } else {
                    MoveStopResult::InternalServerError { trade_id, reason: e.to_string() }
                });
            }
        }

        match self.engine.stop_market_sell(&trade.order_context(), &market, size, cmd.new_stop_price).await {
            Ok(placed) => {
                if let Err(e) = self.record_stop(&position, &placed.order_id, placed.stop_price).await {
                    error!(trade_id = %trade_id, "[service] new stop {} placed but not recorded: {e}", placed.order_id);
                }
                Ok(MoveStopResult::Success { trade_id, stop_order_id: placed.order_id, stop_price: placed.stop_price })
            }
            Err(e) => {
                error!(trade_id = %trade_id, critical = true, "[service] {position} has NO stop: {e}");
                if let Err(e) = self.store().set_stop_order_id(&position, None).await {
                    error!(trade_id = %trade_id, "[service] failed to clear canceled stop of {position}: {e}");
                }
                Ok(MoveStopResult::FailedToPlaceNewStop { trade_id, reason: e.to_string() })
            }
        }
    }

    /// Reject a new stop the exchange would refuse, before the old one is canceled.
    async fn check_stop(
        &self,
        market: &MarketIdentifier,
        size: Money,
        cmd: &MoveStopCommand,
    ) -> Result<(), EngineError> {
        let filters = self.engine.rules().filters().await?;
        let quantity = filters.munge_quantity(&market.symbol, size)?;
        filters.munge_order_price(&market.symbol, cmd.new_stop_price)?;
        let limit_price = cmd.new_stop_price.checked_mul(self.engine.config().stop_limit_price_ratio)?;
        let limit_price = filters.munge_order_price(&market.symbol, limit_price)?;
        filters.check_notional(&market.symbol, limit_price, quantity)?;
        Ok(())
    }

    async fn record_stop(
        &self,
        position: &SpotPositionIdentifier,
        order_id: &OrderId,
        stop_price: Money,
    ) -> Result<(), StoreError> {
        self.store().set_stop_order_id(position, Some(order_id.clone())).await?;
        self.store().set_stop_price(position, stop_price).await
    }

    fn move_stop_rate_limited(&self, trade_id: TradeId) -> MoveStopResult {
        MoveStopResult::TooManyRequests {
            trade_id,
            retry_after_seconds: self.engine.config().rate_limit.retry_after_seconds(),
        }
    }

    // -----------------------------------------------------------------------
    // Exit fills and inspection
    // -----------------------------------------------------------------------

    /// A protective order with `order_id` filled: attribute it and forget the
    /// position. Returns the closed position, `None` if the order is not a
    /// tracked exit order.
    pub async fn record_exit_fill(
        &self,
        exchange: &ExchangeIdentifier,
        order_id: &str,
    ) -> Result<Option<PositionRecord>, StoreError> {
        let ctx = self.store().get_order_context_for_order(exchange, order_id).await?;
        let record = self
            .store()
            .position_for_exit_order(order_id)
            .await?
            .filter(|record| record.id.exchange_identifier == *exchange);
        let Some(record) = record else {
            debug!("[service] fill of {order_id} on {exchange} is not a tracked exit order (context {ctx:?})");
            return Ok(None);
        };

        let trade_id = ctx
            .map(|c| c.trade_id)
            .or_else(|| record.trade.as_ref().map(|t| t.trade_id.clone()))
            .unwrap_or_else(|| TradeId::from("-"));
        info!(trade_id = %trade_id, "[service] exit order {order_id} filled, {} size {} closed", record.id, record.size);
        self.store().close_position(&record.id).await?;

        let notification =
            Notification::new(Severity::Info, format!("exit order {order_id} filled, {} closed", record.id))
                .with_trade_id(trade_id);
        notify_best_effort(self.notifier.as_ref(), notification).await;
        Ok(Some(record))
    }

    /// Every open position.
    pub async fn positions(&self) -> Result<Vec<PositionRecord>, StoreError> {
        self.store().open_positions().await
    }
}
