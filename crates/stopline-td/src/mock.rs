//! Scripted in-memory [`ExchangeClient`] for tests.
//!
//! `MockExchange` records every call and answers from per-operation queues of
//! scripted results. When a queue is empty it falls back to a default:
//!
//! - limit / market orders fill completely (limit at their price, market at
//!   the configured last price),
//! - stop and take-profit orders are accepted as `NEW`,
//! - OCO orders are accepted, cancels succeed.
//!
//! Enabled for this crate's own tests and, for downstream crates, through the
//! `test-util` feature.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use stopline_core::time_util::now_ms;
use stopline_core::{
    Balance, Money, OcoOrderRequest, OcoOrderResult, OrderId, OrderRequest, OrderResult, OrderStatus, OrderType,
};

use crate::ExchangeClient;
use crate::error::ExchangeError;
use crate::rules::{ExchangeInfo, SymbolFilter, SymbolInfo, TradingRules};

/// A call received by the mock, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    ExchangeInfo,
    PlaceOrder(OrderRequest),
    PlaceOcoOrder(OcoOrderRequest),
    CancelOrder { symbol: String, order_id: OrderId },
    CancelOcoOrder { symbol: String, order_list_id: OrderId },
    AccountBalances,
    Prices,
}

#[derive(Default)]
struct MockState {
    info: ExchangeInfo,
    prices: HashMap<String, Money>,
    balances: Vec<Balance>,
    order_results: VecDeque<Result<OrderResult, ExchangeError>>,
    oco_results: VecDeque<Result<OcoOrderResult, ExchangeError>>,
    cancel_results: VecDeque<Result<(), ExchangeError>>,
    calls: Vec<MockCall>,
    next_id: u64,
}

impl MockState {
    fn next_order_id(&mut self) -> OrderId {
        self.next_id += 1;
        OrderId::new(self.next_id.to_string())
    }
}

/// Scripted exchange double.
#[derive(Default)]
pub struct MockExchange {
    state: Mutex<MockState>,
}

impl MockExchange {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -----------------------------------------------------------------------
    // Builders
    // -----------------------------------------------------------------------

    /// List a symbol with the given trading rules.
    pub fn with_symbol(self, rules: TradingRules) -> Self {
        self.lock().info.symbols.push(SymbolInfo {
            symbol: rules.symbol,
            base_asset: rules.base_asset,
            quote_asset: rules.quote_asset,
            filters: vec![
                SymbolFilter::Price { min_price: rules.min_price, tick_size: rules.tick_size },
                SymbolFilter::LotSize { min_qty: rules.min_qty, step_size: rules.step_size },
                SymbolFilter::MinNotional { min_notional: rules.min_notional },
            ],
        });
        self
    }

    pub fn with_price(self, symbol: &str, price: Money) -> Self {
        self.lock().prices.insert(symbol.to_string(), price);
        self
    }

    pub fn with_balance(self, asset: &str, free: Money, locked: Money) -> Self {
        self.lock().balances.push(Balance { asset: asset.to_string(), free, locked });
        self
    }

    // -----------------------------------------------------------------------
    // Scripting
    // -----------------------------------------------------------------------

    /// Queue the answer of the next `place_order` call.
    pub fn push_order_result(&self, result: Result<OrderResult, ExchangeError>) {
        self.lock().order_results.push_back(result);
    }

    /// Queue the answer of the next `place_oco_order` call.
    pub fn push_oco_result(&self, result: Result<OcoOrderResult, ExchangeError>) {
        self.lock().oco_results.push_back(result);
    }

    /// Queue the answer of the next `cancel_order` / `cancel_oco_order` call.
    pub fn push_cancel_result(&self, result: Result<(), ExchangeError>) {
        self.lock().cancel_results.push_back(result);
    }

    /// An order acknowledgement with the given fill.
    pub fn fill(symbol: &str, order_id: &str, executed_qty: Money, quote_qty: Money) -> OrderResult {
        let status = if executed_qty.is_zero() { OrderStatus::Expired } else { OrderStatus::Filled };
        OrderResult {
            symbol: symbol.to_string(),
            order_id: OrderId::from(order_id),
            client_order_id: None,
            status,
            executed_qty,
            cummulative_quote_qty: quote_qty,
            transact_time_ms: now_ms(),
        }
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    /// Calls that would have touched the exchange's order book or account.
    pub fn trading_calls(&self) -> Vec<MockCall> {
        self.calls().into_iter().filter(|c| !matches!(c, MockCall::ExchangeInfo | MockCall::Prices)).collect()
    }

    /// Every `place_order` request, in order.
    pub fn placed_orders(&self) -> Vec<OrderRequest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                MockCall::PlaceOrder(order) => Some(order),
                _ => None,
            })
            .collect()
    }

    pub fn exchange_info_calls(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, MockCall::ExchangeInfo)).count()
    }
}

#[async_trait]
impl ExchangeClient for MockExchange {
    async fn exchange_info(&self) -> Result<ExchangeInfo, ExchangeError> {
        let mut state = self.lock();
        state.calls.push(MockCall::ExchangeInfo);
        Ok(state.info.clone())
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderResult, ExchangeError> {
        let mut state = self.lock();
        state.calls.push(MockCall::PlaceOrder(order.clone()));
        if let Some(scripted) = state.order_results.pop_front() {
            return scripted.map(|mut r| {
                r.client_order_id = r.client_order_id.or_else(|| order.client_order_id.clone());
                r
            });
        }

        let order_id = state.next_order_id();
        let fill_price = match order.order_type {
            OrderType::Market => state.prices.get(&order.symbol).copied(),
            OrderType::Limit => order.price,
            OrderType::StopLossLimit => None,
        };
        let (status, executed_qty, quote_qty) = match fill_price {
            Some(price) => (OrderStatus::Filled, order.quantity, price.checked_mul(order.quantity)?),
            None => (OrderStatus::New, Money::ZERO, Money::ZERO),
        };
        Ok(OrderResult {
            symbol: order.symbol.clone(),
            order_id,
            client_order_id: order.client_order_id.clone(),
            status,
            executed_qty,
            cummulative_quote_qty: quote_qty,
            transact_time_ms: now_ms(),
        })
    }

    async fn place_oco_order(&self, order: &OcoOrderRequest) -> Result<OcoOrderResult, ExchangeError> {
        let mut state = self.lock();
        state.calls.push(MockCall::PlaceOcoOrder(order.clone()));
        if let Some(scripted) = state.oco_results.pop_front() {
            return scripted;
        }
        let order_list_id = state.next_order_id();
        let order_ids = vec![state.next_order_id(), state.next_order_id()];
        Ok(OcoOrderResult {
            symbol: order.symbol.clone(),
            order_list_id,
            list_client_order_id: order.list_client_order_id.clone(),
            order_ids,
            transact_time_ms: now_ms(),
        })
    }

    async fn cancel_order(&self, symbol: &str, order_id: &OrderId) -> Result<(), ExchangeError> {
        let mut state = self.lock();
        state.calls.push(MockCall::CancelOrder { symbol: symbol.to_string(), order_id: order_id.clone() });
        state.cancel_results.pop_front().unwrap_or(Ok(()))
    }

    async fn cancel_oco_order(&self, symbol: &str, order_list_id: &OrderId) -> Result<(), ExchangeError> {
        let mut state = self.lock();
        state.calls.push(MockCall::CancelOcoOrder { symbol: symbol.to_string(), order_list_id: order_list_id.clone() });
        state.cancel_results.pop_front().unwrap_or(Ok(()))
    }

    async fn account_balances(&self) -> Result<Vec<Balance>, ExchangeError> {
        let mut state = self.lock();
        state.calls.push(MockCall::AccountBalances);
        Ok(state.balances.clone())
    }

    async fn prices(&self) -> Result<HashMap<String, Money>, ExchangeError> {
        let mut state = self.lock();
        state.calls.push(MockCall::Prices);
        Ok(state.prices.clone())
    }
}
