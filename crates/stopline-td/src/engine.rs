//! Execution Engine.
//!
//! Each public operation is one exchange round-trip plus its bookkeeping:
//!
//! ```text
//! munge (rules cache) → persist OrderContext(s) → submit → map response
//! ```
//!
//! | Operation          | Result                            | Retry on rate limit |
//! |--------------------|-----------------------------------|---------------------|
//! | `limit_buy`        | [`LimitBuyResult`] (never errors) | no                  |
//! | `stop_market_sell` | [`StopOrderPlaced`]               | yes                 |
//! | `oco_sell_order`   | [`OcoOrderPlaced`]                | yes                 |
//! | `market_sell`      | [`MarketSellFilled`]              | no                  |
//! | `cancel_order`     | [`CancelOutcome`]                 | no                  |
//! | `cancel_oco_order` | [`CancelOutcome`]                 | no                  |
//!
//! Routine entry outcomes (IOC not filled, insufficient balance, rate limit)
//! are variants of [`LimitBuyResult`]. Exit operations return
//! `Result<_, EngineError>`: their callers react to any failure the same way,
//! by dumping the position.
//!
//! The client order id of an order is generated once and reused across
//! retries, so a resubmission after a rate limit cannot open a second order.

use std::sync::Arc;

use stopline_core::config::{AppConfig, DEFAULT_STOP_LIMIT_PRICE_RATIO};
use stopline_core::error::{MoneyError, StoreError};
use stopline_core::store::PositionStore;
use stopline_core::{
    ClientOrderId, ExchangeIdentifier, MarketIdentifier, Money, OcoOrderRequest, OrderContext, OrderId, OrderRequest,
    OrderResult, OrderType, RoundingMode, Side, TimeInForce, TradeId,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::ExchangeClient;
use crate::error::ExchangeError;
use crate::event::{self, ExecEvent, ExecEventSender};
use crate::retry::{RateLimitPolicy, retry_on_rate_limit};
use crate::rules::{ExchangeFilters, FilterError, RulesCache};

// ---------------------------------------------------------------------------
// Errors and configuration
// ---------------------------------------------------------------------------

/// Failure of an engine operation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Money(#[from] MoneyError),
}

impl EngineError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::Exchange(e) if e.is_rate_limit())
    }
}

/// Tunables of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub rate_limit: RateLimitPolicy,
    /// Limit price of a stop-market-sell as a fraction of its trigger.
    pub stop_limit_price_ratio: Money,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { rate_limit: RateLimitPolicy::default(), stop_limit_price_ratio: DEFAULT_STOP_LIMIT_PRICE_RATIO }
    }
}

impl From<&AppConfig> for EngineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            rate_limit: RateLimitPolicy::from(&config.rate_limit),
            stop_limit_price_ratio: config.stop_limit_price_ratio,
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// A (possibly partial) IOC entry fill.
#[derive(Debug, Clone, PartialEq)]
pub struct BuyFill {
    pub order_id: OrderId,
    pub client_order_id: ClientOrderId,
    pub executed_quote_quantity: Money,
    pub executed_base_quantity: Money,
    /// Average fill price, `quote / base`.
    pub executed_price: Money,
    pub execution_timestamp_ms: u64,
}

/// Terminal outcome of [`ExecutionEngine::limit_buy`]. Exactly one per call.
#[derive(Debug, Clone)]
pub enum LimitBuyResult {
    Filled(BuyFill),
    /// The IOC order expired without any fill. Expected, not an error.
    EntryFailedToFill { order_id: OrderId },
    InsufficientBalance { msg: String },
    TooManyRequests { retry_after_seconds: u64 },
    /// The order could not be made to satisfy the symbol's trading rules.
    BadInputs { msg: String },
    InternalServerError { error: Arc<EngineError> },
}

/// An accepted stop-limit sell.
#[derive(Debug, Clone, PartialEq)]
pub struct StopOrderPlaced {
    pub order_id: OrderId,
    pub client_order_id: ClientOrderId,
    pub quantity: Money,
    pub stop_price: Money,
    pub limit_price: Money,
}

/// Prices of an OCO sell. Munged before submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OcoPrices {
    pub stop_price: Money,
    pub stop_limit_price: Money,
    pub take_profit_price: Money,
}

/// An accepted OCO sell.
#[derive(Debug, Clone, PartialEq)]
pub struct OcoOrderPlaced {
    pub order_list_id: OrderId,
    pub list_client_order_id: ClientOrderId,
    pub stop_client_order_id: ClientOrderId,
    pub limit_client_order_id: ClientOrderId,
    pub order_ids: Vec<OrderId>,
    pub quantity: Money,
    pub prices: OcoPrices,
}

/// An executed market sell.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketSellFilled {
    pub order_id: OrderId,
    pub client_order_id: ClientOrderId,
    pub executed_base_quantity: Money,
    pub executed_quote_quantity: Money,
    pub execution_timestamp_ms: u64,
}

/// Outcome of a cancel. Both variants are success for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Canceled,
    /// The order was already filled, canceled or expired.
    AlreadyGone,
}

// ---------------------------------------------------------------------------
// ExecutionEngine
// ---------------------------------------------------------------------------

/// Places orders against one exchange account.
#[derive(Clone)]
pub struct ExecutionEngine {
    client: Arc<dyn ExchangeClient>,
    store: Arc<dyn PositionStore>,
    rules: Arc<RulesCache>,
    exchange: ExchangeIdentifier,
    config: EngineConfig,
    events: Option<ExecEventSender>,
}

impl ExecutionEngine {
    pub fn new(
        client: Arc<dyn ExchangeClient>,
        store: Arc<dyn PositionStore>,
        rules: Arc<RulesCache>,
        exchange: ExchangeIdentifier,
        config: EngineConfig,
    ) -> Self {
        Self { client, store, rules, exchange, config, events: None }
    }

    /// Attach an execution event channel.
    pub fn with_events(mut self, events: ExecEventSender) -> Self {
        self.events = Some(events);
        self
    }

    pub fn client(&self) -> &Arc<dyn ExchangeClient> {
        &self.client
    }

    pub fn store(&self) -> &Arc<dyn PositionStore> {
        &self.store
    }

    pub fn rules(&self) -> &Arc<RulesCache> {
        &self.rules
    }

    pub fn exchange(&self) -> &ExchangeIdentifier {
        &self.exchange
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Send an execution event (best-effort).
    pub fn emit(&self, event: ExecEvent) {
        event::emit(self.events.as_ref(), event);
    }

    /// Market for `base`/`quote` on this engine's exchange account.
    pub fn market(&self, base_asset: &str, quote_asset: &str) -> MarketIdentifier {
        MarketIdentifier::new(self.exchange.clone(), base_asset, quote_asset)
    }

    /// Last traded price of `market`.
    pub async fn current_price(&self, market: &MarketIdentifier) -> Result<Money, EngineError> {
        let prices = self.client.prices().await?;
        prices.get(&market.symbol).copied().ok_or_else(|| ExchangeError::UnknownSymbol(market.symbol.clone()).into())
    }

    // -----------------------------------------------------------------------
    // Entry
    // -----------------------------------------------------------------------

    /// Submit a limit buy (normally IOC) for `base_amount` at `limit_price`.
    ///
    /// The order context is persisted under the client order id before the
    /// order reaches the exchange. Never fails: every outcome is a variant.
    pub async fn limit_buy(
        &self,
        ctx: &OrderContext,
        market: &MarketIdentifier,
        base_amount: Money,
        limit_price: Money,
        time_in_force: TimeInForce,
    ) -> LimitBuyResult {
        match self.try_limit_buy(ctx, market, base_amount, limit_price, time_in_force).await {
            Ok(result) => result,
            Err(e) => self.classify_buy_failure(&ctx.trade_id, market, e),
        }
    }

    async fn try_limit_buy(
        &self,
        ctx: &OrderContext,
        market: &MarketIdentifier,
        base_amount: Money,
        limit_price: Money,
        time_in_force: TimeInForce,
    ) -> Result<LimitBuyResult, EngineError> {
        let filters = self.rules.filters().await?;
        let quantity = filters.munge_quantity(&market.symbol, base_amount)?;
        let price = filters.munge_order_price(&market.symbol, limit_price)?;
        filters.check_notional(&market.symbol, price, quantity)?;

        let client_order_id = ClientOrderId::generate();
        self.store.set_order_context(&market.exchange_identifier, client_order_id.as_str(), ctx).await?;

        info!(
            trade_id = %ctx.trade_id,
            "[engine] limit buy {} {quantity} @ {price} ({time_in_force:?}) cid={client_order_id}",
            market.symbol
        );
        let order = OrderRequest {
            symbol: market.symbol.clone(),
            side: Side::Buy,
            order_type: OrderType::Limit,
            quantity,
            price: Some(price),
            stop_price: None,
            time_in_force: Some(time_in_force),
            client_order_id: Some(client_order_id.clone()),
        };
        let ack = self.client.place_order(&order).await?;
        self.record_exchange_order_id(ctx, market, &ack).await?;
        self.emit(ExecEvent::OrderPlaced {
            trade_id: ctx.trade_id.clone(),
            symbol: market.symbol.clone(),
            kind: "limit_buy",
            order_id: ack.order_id.clone(),
        });

        if ack.executed_qty.is_zero() {
            info!(trade_id = %ctx.trade_id, "[engine] limit buy {} not filled ({:?})", market.symbol, ack.status);
            self.emit(ExecEvent::EntryNotFilled { trade_id: ctx.trade_id.clone(), symbol: market.symbol.clone() });
            return Ok(LimitBuyResult::EntryFailedToFill { order_id: ack.order_id });
        }

        let executed_price = ack.cummulative_quote_qty.div(ack.executed_qty, RoundingMode::HalfEven)?;
        info!(
            trade_id = %ctx.trade_id,
            "[engine] limit buy {} filled {} for {} (avg {executed_price})",
            market.symbol, ack.executed_qty, ack.cummulative_quote_qty
        );
        self.emit(ExecEvent::EntryFilled {
            trade_id: ctx.trade_id.clone(),
            edge: ctx.edge.clone(),
            symbol: market.symbol.clone(),
            executed_base_quantity: ack.executed_qty,
            executed_price,
        });
        Ok(LimitBuyResult::Filled(BuyFill {
            order_id: ack.order_id,
            client_order_id,
            executed_quote_quantity: ack.cummulative_quote_qty,
            executed_base_quantity: ack.executed_qty,
            executed_price,
            execution_timestamp_ms: ack.transact_time_ms,
        }))
    }

    fn classify_buy_failure(&self, trade_id: &TradeId, market: &MarketIdentifier, e: EngineError) -> LimitBuyResult {
        match e {
            EngineError::Filter(e) => {
                warn!(trade_id = %trade_id, "[engine] limit buy {} rejected by trading rules: {e}", market.symbol);
                LimitBuyResult::BadInputs { msg: e.to_string() }
            }
            EngineError::Exchange(ref x) if x.is_rate_limit() => {
                warn!(trade_id = %trade_id, "[engine] limit buy {} rate limited: {x}", market.symbol);
                self.emit(ExecEvent::RateLimited { trade_id: trade_id.clone(), operation: "limit_buy" });
                LimitBuyResult::TooManyRequests { retry_after_seconds: self.config.rate_limit.retry_after_seconds() }
            }
            EngineError::Exchange(ref x) if x.is_insufficient_balance() => {
                warn!(trade_id = %trade_id, "[engine] limit buy {} insufficient balance: {x}", market.symbol);
                LimitBuyResult::InsufficientBalance { msg: x.to_string() }
            }
            other => {
                warn!(trade_id = %trade_id, "[engine] limit buy {} failed: {other}", market.symbol);
                LimitBuyResult::InternalServerError { error: Arc::new(other) }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Exits
    // -----------------------------------------------------------------------

    /// Protective stop: a stop-limit sell triggered at `trigger_price` with its
    /// limit at `trigger_price × stop_limit_price_ratio`. Retried on rate limits.
    pub async fn stop_market_sell(
        &self,
        ctx: &OrderContext,
        market: &MarketIdentifier,
        base_amount: Money,
        trigger_price: Money,
    ) -> Result<StopOrderPlaced, EngineError> {
        let filters = self.rules.filters().await?;
        let quantity = filters.munge_quantity(&market.symbol, base_amount)?;
        let stop_price = filters.munge_order_price(&market.symbol, trigger_price)?;
        let limit_price =
            filters.munge_order_price(&market.symbol, trigger_price.checked_mul(self.config.stop_limit_price_ratio)?)?;
        filters.check_notional(&market.symbol, limit_price, quantity)?;

        let client_order_id = ClientOrderId::generate();
        self.store.set_order_context(&market.exchange_identifier, client_order_id.as_str(), ctx).await?;

        info!(
            trade_id = %ctx.trade_id,
            "[engine] stop sell {} {quantity} trigger {stop_price} limit {limit_price} cid={client_order_id}",
            market.symbol
        );
        let order = OrderRequest {
            symbol: market.symbol.clone(),
            side: Side::Sell,
            order_type: OrderType::StopLossLimit,
            quantity,
            price: Some(limit_price),
            stop_price: Some(stop_price),
            time_in_force: Some(TimeInForce::Gtc),
            client_order_id: Some(client_order_id.clone()),
        };
        let ack = self
            .retrying(ctx, "stop_market_sell", || self.client.place_order(&order))
            .await?;
        self.record_exchange_order_id(ctx, market, &ack).await?;
        self.emit(ExecEvent::OrderPlaced {
            trade_id: ctx.trade_id.clone(),
            symbol: market.symbol.clone(),
            kind: "stop_market_sell",
            order_id: ack.order_id.clone(),
        });
        Ok(StopOrderPlaced { order_id: ack.order_id, client_order_id, quantity, stop_price, limit_price })
    }

    /// One-cancels-other sell: take-profit limit plus stop-limit. The three
    /// client ids (list, limit leg, stop leg) are persisted before submission.
    /// Retried on rate limits.
    pub async fn oco_sell_order(
        &self,
        ctx: &OrderContext,
        market: &MarketIdentifier,
        base_amount: Money,
        prices: OcoPrices,
    ) -> Result<OcoOrderPlaced, EngineError> {
        let filters = self.rules.filters().await?;
        let quantity = filters.munge_quantity(&market.symbol, base_amount)?;
        let prices = munge_oco_prices(&filters, &market.symbol, prices)?;
        filters.check_notional(&market.symbol, prices.stop_limit_price, quantity)?;
        filters.check_notional(&market.symbol, prices.take_profit_price, quantity)?;

        let list_client_order_id = ClientOrderId::generate();
        let limit_client_order_id = ClientOrderId::generate();
        let stop_client_order_id = ClientOrderId::generate();
        for cid in [&list_client_order_id, &limit_client_order_id, &stop_client_order_id] {
            self.store.set_order_context(&market.exchange_identifier, cid.as_str(), ctx).await?;
        }

        info!(
            trade_id = %ctx.trade_id,
            "[engine] oco sell {} {quantity} stop {} / {} take-profit {} list={list_client_order_id}",
            market.symbol, prices.stop_price, prices.stop_limit_price, prices.take_profit_price
        );
        let order = OcoOrderRequest {
            symbol: market.symbol.clone(),
            side: Side::Sell,
            quantity,
            price: prices.take_profit_price,
            stop_price: prices.stop_price,
            stop_limit_price: prices.stop_limit_price,
            stop_limit_time_in_force: TimeInForce::Gtc,
            list_client_order_id: list_client_order_id.clone(),
            limit_client_order_id: limit_client_order_id.clone(),
            stop_client_order_id: stop_client_order_id.clone(),
        };
        let ack = self
            .retrying(ctx, "oco_sell_order", || self.client.place_oco_order(&order))
            .await?;
        self.store.set_order_context(&market.exchange_identifier, ack.order_list_id.as_str(), ctx).await?;
        self.emit(ExecEvent::OrderPlaced {
            trade_id: ctx.trade_id.clone(),
            symbol: market.symbol.clone(),
            kind: "oco_sell",
            order_id: ack.order_list_id.clone(),
        });
        Ok(OcoOrderPlaced {
            order_list_id: ack.order_list_id,
            list_client_order_id,
            stop_client_order_id,
            limit_client_order_id,
            order_ids: ack.order_ids,
            quantity,
            prices,
        })
    }

    /// Unconditional liquidation. Only the quantity is munged; not retried.
    pub async fn market_sell(
        &self,
        ctx: &OrderContext,
        market: &MarketIdentifier,
        base_amount: Money,
    ) -> Result<MarketSellFilled, EngineError> {
        let filters = self.rules.filters().await?;
        let quantity = filters.munge_quantity(&market.symbol, base_amount)?;

        let client_order_id = ClientOrderId::generate();
        self.store.set_order_context(&market.exchange_identifier, client_order_id.as_str(), ctx).await?;

        warn!(trade_id = %ctx.trade_id, "[engine] market sell {} {quantity} cid={client_order_id}", market.symbol);
        let order = OrderRequest {
            symbol: market.symbol.clone(),
            side: Side::Sell,
            order_type: OrderType::Market,
            quantity,
            price: None,
            stop_price: None,
            time_in_force: None,
            client_order_id: Some(client_order_id.clone()),
        };
        let ack = self.client.place_order(&order).await?;
        self.record_exchange_order_id(ctx, market, &ack).await?;
        self.emit(ExecEvent::OrderPlaced {
            trade_id: ctx.trade_id.clone(),
            symbol: market.symbol.clone(),
            kind: "market_sell",
            order_id: ack.order_id.clone(),
        });
        Ok(MarketSellFilled {
            order_id: ack.order_id,
            client_order_id,
            executed_base_quantity: ack.executed_qty,
            executed_quote_quantity: ack.cummulative_quote_qty,
            execution_timestamp_ms: ack.transact_time_ms,
        })
    }

    // -----------------------------------------------------------------------
    // Cancels
    // -----------------------------------------------------------------------

    /// Cancel a single order. An order that is already gone counts as success.
    pub async fn cancel_order(
        &self,
        trade_id: Option<&TradeId>,
        market: &MarketIdentifier,
        order_id: &OrderId,
    ) -> Result<CancelOutcome, EngineError> {
        let result = self.client.cancel_order(&market.symbol, order_id).await;
        self.finish_cancel(trade_id, market, order_id, result)
    }

    /// Cancel an OCO order list. A list that is already gone counts as success.
    pub async fn cancel_oco_order(
        &self,
        trade_id: Option<&TradeId>,
        market: &MarketIdentifier,
        order_list_id: &OrderId,
    ) -> Result<CancelOutcome, EngineError> {
        let result = self.client.cancel_oco_order(&market.symbol, order_list_id).await;
        self.finish_cancel(trade_id, market, order_list_id, result)
    }

    fn finish_cancel(
        &self,
        trade_id: Option<&TradeId>,
        market: &MarketIdentifier,
        order_id: &OrderId,
        result: Result<(), ExchangeError>,
    ) -> Result<CancelOutcome, EngineError> {
        let trade = trade_id.map(TradeId::as_str).unwrap_or("-");
        let outcome = match result {
            Ok(()) => CancelOutcome::Canceled,
            Err(e) if e.is_order_gone() => {
                debug!(trade_id = trade, "[engine] cancel {} {order_id}: already gone ({e})", market.symbol);
                CancelOutcome::AlreadyGone
            }
            Err(e) => return Err(e.into()),
        };
        info!(trade_id = trade, "[engine] cancel {} {order_id}: {outcome:?}", market.symbol);
        self.emit(ExecEvent::OrderCanceled {
            trade_id: trade_id.cloned(),
            symbol: market.symbol.clone(),
            order_id: order_id.clone(),
        });
        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    async fn retrying<T, F, Fut>(&self, ctx: &OrderContext, operation: &'static str, call: F) -> Result<T, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, ExchangeError>>,
    {
        let result = retry_on_rate_limit(&self.config.rate_limit, operation, call).await;
        if let Err(ref e) = result {
            if e.is_rate_limit() {
                self.emit(ExecEvent::RateLimited { trade_id: ctx.trade_id.clone(), operation });
            }
        }
        result.map_err(Into::into)
    }

    /// Also key the context by the exchange-assigned id, which is what fill
    /// events and exit-order lookups carry.
    async fn record_exchange_order_id(
        &self,
        ctx: &OrderContext,
        market: &MarketIdentifier,
        ack: &OrderResult,
    ) -> Result<(), StoreError> {
        self.store.set_order_context(&market.exchange_identifier, ack.order_id.as_str(), ctx).await
    }
}

fn munge_oco_prices(filters: &ExchangeFilters, symbol: &str, prices: OcoPrices) -> Result<OcoPrices, FilterError> {
    Ok(OcoPrices {
        stop_price: filters.munge_order_price(symbol, prices.stop_price)?,
        stop_limit_price: filters.munge_order_price(symbol, prices.stop_limit_price)?,
        take_profit_price: filters.munge_order_price(symbol, prices.take_profit_price)?,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use stopline_core::store::MemoryStore;
    use stopline_core::EdgeId;
    use tokio::time::Instant;

    use super::*;
    use crate::mock::{MockCall, MockExchange};
    use crate::rules::TradingRules;

    fn m(s: &str) -> Money {
        s.parse().unwrap()
    }

    fn ethusdt() -> TradingRules {
        TradingRules {
            symbol: "ETHUSDT".into(),
            base_asset: "ETH".into(),
            quote_asset: "USDT".into(),
            step_size: m("0.0001"),
            min_qty: m("0.0001"),
            tick_size: m("0.01"),
            min_price: m("0.01"),
            min_notional: m("5"),
        }
    }

    struct Fixture {
        mock: Arc<MockExchange>,
        store: Arc<MemoryStore>,
        engine: ExecutionEngine,
        market: MarketIdentifier,
        ctx: OrderContext,
    }

    fn fixture() -> Fixture {
        let mock = Arc::new(MockExchange::new().with_symbol(ethusdt()).with_price("ETHUSDT", m("100")));
        let store = Arc::new(MemoryStore::new());
        let rules = Arc::new(RulesCache::new(mock.clone(), Duration::from_secs(3600)));
        let exchange = ExchangeIdentifier::binance_spot();
        let engine = ExecutionEngine::new(mock.clone(), store.clone(), rules, exchange.clone(), EngineConfig::default());
        let market = MarketIdentifier::new(exchange, "ETH", "USDT");
        let ctx = OrderContext::new(EdgeId::from("edge60"), TradeId::from("trade-1"));
        Fixture { mock, store, engine, market, ctx }
    }

    #[tokio::test]
    async fn limit_buy_fill_reports_average_price_and_persists_context_first() {
        let f = fixture();
        f.mock.push_order_result(Ok(MockExchange::fill("ETHUSDT", "77", m("1.2"), m("120"))));

        let result = f.engine.limit_buy(&f.ctx, &f.market, m("1.23456"), m("100.004"), TimeInForce::Ioc).await;
        let LimitBuyResult::Filled(fill) = result else { panic!("expected fill, got {result:?}") };
        assert_eq!(fill.executed_base_quantity, m("1.2"));
        assert_eq!(fill.executed_price, m("100"));

        let sent = f.mock.placed_orders();
        assert_eq!(sent[0].quantity, m("1.2345"));
        assert_eq!(sent[0].price, Some(m("100")));
        assert_eq!(sent[0].time_in_force, Some(TimeInForce::Ioc));
        let exchange = f.engine.exchange();
        let by_cid = f.store.get_order_context_for_order(exchange, fill.client_order_id.as_str()).await.unwrap();
        assert_eq!(by_cid, Some(f.ctx.clone()));
        let by_id = f.store.get_order_context_for_order(exchange, "77").await.unwrap();
        assert_eq!(by_id, Some(f.ctx.clone()));
    }

    #[tokio::test]
    async fn unfilled_ioc_is_entry_failed_to_fill() {
        let f = fixture();
        f.mock.push_order_result(Ok(MockExchange::fill("ETHUSDT", "78", Money::ZERO, Money::ZERO)));
        let result = f.engine.limit_buy(&f.ctx, &f.market, m("1"), m("100"), TimeInForce::Ioc).await;
        assert!(matches!(result, LimitBuyResult::EntryFailedToFill { .. }), "{result:?}");
    }

    #[tokio::test]
    async fn limit_buy_maps_exchange_failures() {
        let f = fixture();
        f.mock.push_order_result(Err(ExchangeError::rate_limited()));
        f.mock.push_order_result(Err(ExchangeError::insufficient_balance()));
        f.mock.push_order_result(Err(ExchangeError::Transport("connection reset".into())));

        let rate_limited = f.engine.limit_buy(&f.ctx, &f.market, m("1"), m("100"), TimeInForce::Ioc).await;
        assert!(matches!(rate_limited, LimitBuyResult::TooManyRequests { retry_after_seconds: 11 }));
        let broke = f.engine.limit_buy(&f.ctx, &f.market, m("1"), m("100"), TimeInForce::Ioc).await;
        assert!(matches!(broke, LimitBuyResult::InsufficientBalance { .. }));
        let other = f.engine.limit_buy(&f.ctx, &f.market, m("1"), m("100"), TimeInForce::Ioc).await;
        let LimitBuyResult::InternalServerError { error } = other else { panic!("expected internal error") };
        assert!(matches!(*error, EngineError::Exchange(ExchangeError::Transport(_))));
        // No retry on entries.
        assert_eq!(f.mock.placed_orders().len(), 3);
    }

    #[tokio::test]
    async fn filter_violations_never_reach_the_exchange() {
        let f = fixture();
        let result = f.engine.limit_buy(&f.ctx, &f.market, m("0.01"), m("100"), TimeInForce::Ioc).await;
        assert!(matches!(result, LimitBuyResult::BadInputs { .. }), "{result:?}");
        assert!(f.mock.trading_calls().is_empty());
    }

    #[tokio::test]
    async fn zero_prices_are_refused_for_limit_and_stop_orders() {
        let f = fixture();
        let buy = f.engine.limit_buy(&f.ctx, &f.market, m("1"), Money::ZERO, TimeInForce::Ioc).await;
        assert!(matches!(buy, LimitBuyResult::BadInputs { .. }), "{buy:?}");
        let stop = f.engine.stop_market_sell(&f.ctx, &f.market, m("1.2"), Money::ZERO).await.unwrap_err();
        assert!(matches!(stop, EngineError::Filter(FilterError::NonPositivePrice { .. })), "{stop:?}");
        assert!(f.mock.trading_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_sell_limit_leg_and_retry_reuses_client_order_id() {
        let f = fixture();
        f.mock.push_order_result(Err(ExchangeError::rate_limited()));
        f.mock.push_order_result(Err(ExchangeError::rate_limited()));

        let started = Instant::now();
        let placed = f.engine.stop_market_sell(&f.ctx, &f.market, m("1.2"), m("85")).await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(22));
        assert_eq!(placed.stop_price, m("85"));
        assert_eq!(placed.limit_price, m("68"));

        let sent = f.mock.placed_orders();
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|o| o.client_order_id == sent[0].client_order_id));
        assert_eq!(sent[0].order_type, OrderType::StopLossLimit);
        assert_eq!(sent[0].stop_price, Some(m("85")));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_sell_gives_up_after_three_rate_limits() {
        let f = fixture();
        for _ in 0..4 {
            f.mock.push_order_result(Err(ExchangeError::rate_limited()));
        }
        let err = f.engine.stop_market_sell(&f.ctx, &f.market, m("1.2"), m("85")).await.unwrap_err();
        assert!(err.is_rate_limit());
        assert_eq!(f.mock.placed_orders().len(), 3);
    }

    #[tokio::test]
    async fn oco_persists_all_three_client_ids() {
        let f = fixture();
        let prices = OcoPrices { stop_price: m("85"), stop_limit_price: m("84.999"), take_profit_price: m("130") };
        let placed = f.engine.oco_sell_order(&f.ctx, &f.market, m("1.2"), prices).await.unwrap();
        assert_eq!(placed.prices.stop_limit_price, m("85"));

        let exchange = f.engine.exchange();
        for cid in [&placed.list_client_order_id, &placed.limit_client_order_id, &placed.stop_client_order_id] {
            let ctx = f.store.get_order_context_for_order(exchange, cid.as_str()).await.unwrap();
            assert_eq!(ctx, Some(f.ctx.clone()));
        }
    }

    #[tokio::test]
    async fn oco_failure_is_an_error() {
        let f = fixture();
        f.mock.push_oco_result(Err(ExchangeError::api(-1013, "Filter failure: PERCENT_PRICE", 400)));
        let prices = OcoPrices { stop_price: m("85"), stop_limit_price: m("85"), take_profit_price: m("130") };
        let err = f.engine.oco_sell_order(&f.ctx, &f.market, m("1.2"), prices).await.unwrap_err();
        assert!(matches!(err, EngineError::Exchange(ExchangeError::Api { code: -1013, .. })));
    }

    #[tokio::test]
    async fn market_sell_munges_quantity_only() {
        let f = fixture();
        let sold = f.engine.market_sell(&f.ctx, &f.market, m("1.20009")).await.unwrap();
        assert_eq!(sold.executed_base_quantity, m("1.2"));
        let sent = f.mock.placed_orders();
        assert_eq!(sent[0].order_type, OrderType::Market);
        assert_eq!(sent[0].price, None);
    }

    #[tokio::test]
    async fn cancelling_a_gone_order_is_success() {
        let f = fixture();
        f.mock.push_cancel_result(Err(ExchangeError::unknown_order()));
        f.mock.push_cancel_result(Err(ExchangeError::rate_limited()));
        let order_id = OrderId::from("42");

        let gone = f.engine.cancel_order(None, &f.market, &order_id).await.unwrap();
        assert_eq!(gone, CancelOutcome::AlreadyGone);
        assert!(f.engine.cancel_oco_order(None, &f.market, &order_id).await.is_err());
        assert_eq!(f.engine.cancel_order(None, &f.market, &order_id).await.unwrap(), CancelOutcome::Canceled);
        assert!(matches!(f.mock.calls().last(), Some(MockCall::CancelOrder { .. })));
    }

    #[tokio::test]
    async fn current_price_of_unknown_symbol_fails() {
        let f = fixture();
        assert_eq!(f.engine.current_price(&f.market).await.unwrap(), m("100"));
        let doge = f.engine.market("DOGE", "USDT");
        assert!(matches!(
            f.engine.current_price(&doge).await,
            Err(EngineError::Exchange(ExchangeError::UnknownSymbol(_)))
        ));
    }
}
