#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use stopline_core::config::AppConfig;
use stopline_core::error::StoreError;
use stopline_core::notify::{Notification, Notifier, Severity};
use stopline_core::store::{MemoryStore, PositionRecord, PositionStore};
use stopline_core::{
    EdgeId, ExchangeIdentifier, Money, OrderContext, OrderId, SpotPositionIdentifier, TradeContext, TradeId,
};
use stopline_exec::{OpenLongCommand, TradeAbstractionService};
use stopline_td::ExecutionEngine;
use stopline_td::engine::EngineConfig;
use stopline_td::event::{self, ExecEvent, ExecEventReceiver};
use stopline_td::mock::MockExchange;
use stopline_td::rules::{RulesCache, TradingRules};

pub fn m(s: &str) -> Money {
    s.parse().unwrap()
}

pub fn btcusdt() -> TradingRules {
    TradingRules {
        symbol: "BTCUSDT".into(),
        base_asset: "BTC".into(),
        quote_asset: "USDT".into(),
        step_size: m("0.0001"),
        min_qty: m("0.0001"),
        tick_size: m("0.01"),
        min_price: m("0.01"),
        min_notional: m("5"),
    }
}

/// BTC listed at 100, 1000 USDT free.
pub fn exchange() -> MockExchange {
    MockExchange::new()
        .with_symbol(btcusdt())
        .with_price("BTCUSDT", m("100"))
        .with_balance("USDT", m("1000"), Money::ZERO)
}

pub fn config() -> AppConfig {
    AppConfig::from_value(serde_json::json!({
        "edges": [
            {
                "name": "edge60",
                "exit": { "type": "stop_limit", "stop_percentage": "15" },
                "sizing": { "type": "fixed", "quote_amount": "120" }
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
                "sizing": { "type": "fixed", "quote_amount": "100" }
            }
        ]
    }))
    .unwrap()
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn with_severity(&self, severity: Severity) -> Vec<Notification> {
        self.sent().into_iter().filter(|n| n.severity == severity).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// [`MemoryStore`] whose exit-order id writes can be made to fail.
pub struct FlakyStore {
    inner: Arc<MemoryStore>,
    fail_exit_writes: AtomicBool,
}

impl FlakyStore {
    fn exit_write(&self) -> Result<(), StoreError> {
        if self.fail_exit_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::other("disk full")));
        }
        Ok(())
    }
}

#[async_trait]
impl PositionStore for FlakyStore {
    async fn set_order_context(
        &self,
        exchange: &ExchangeIdentifier,
        order_id: &str,
        context: &OrderContext,
    ) -> Result<(), StoreError> {
        self.inner.set_order_context(exchange, order_id, context).await
    }

    async fn get_order_context_for_order(
        &self,
        exchange: &ExchangeIdentifier,
        order_id: &str,
    ) -> Result<Option<OrderContext>, StoreError> {
        self.inner.get_order_context_for_order(exchange, order_id).await
    }

    async fn stop_order_id(&self, position: &SpotPositionIdentifier) -> Result<Option<OrderId>, StoreError> {
        self.inner.stop_order_id(position).await
    }

    async fn set_stop_order_id(
        &self,
        position: &SpotPositionIdentifier,
        order_id: Option<OrderId>,
    ) -> Result<(), StoreError> {
        self.exit_write()?;
        self.inner.set_stop_order_id(position, order_id).await
    }

    async fn oco_order_id(&self, position: &SpotPositionIdentifier) -> Result<Option<OrderId>, StoreError> {
        self.inner.oco_order_id(position).await
    }

    async fn set_oco_order_id(
        &self,
        position: &SpotPositionIdentifier,
        order_id: Option<OrderId>,
    ) -> Result<(), StoreError> {
        self.exit_write()?;
        self.inner.set_oco_order_id(position, order_id).await
    }

    async fn stop_price(&self, position: &SpotPositionIdentifier) -> Result<Option<Money>, StoreError> {
        self.inner.stop_price(position).await
    }

    async fn set_stop_price(&self, position: &SpotPositionIdentifier, price: Money) -> Result<(), StoreError> {
        self.inner.set_stop_price(position, price).await
    }

    async fn in_position(&self, position: &SpotPositionIdentifier) -> Result<bool, StoreError> {
        self.inner.in_position(position).await
    }

    async fn position_size(&self, position: &SpotPositionIdentifier) -> Result<Money, StoreError> {
        self.inner.position_size(position).await
    }

    async fn trade_context(&self, position: &SpotPositionIdentifier) -> Result<Option<TradeContext>, StoreError> {
        self.inner.trade_context(position).await
    }

    async fn open_position(
        &self,
        position: &SpotPositionIdentifier,
        size: Money,
        trade: &TradeContext,
    ) -> Result<(), StoreError> {
        self.inner.open_position(position, size, trade).await
    }

    async fn close_position(&self, position: &SpotPositionIdentifier) -> Result<(), StoreError> {
        self.inner.close_position(position).await
    }

    async fn open_positions(&self) -> Result<Vec<PositionRecord>, StoreError> {
        self.inner.open_positions().await
    }

    async fn position_for_exit_order(&self, order_id: &str) -> Result<Option<PositionRecord>, StoreError> {
        self.inner.position_for_exit_order(order_id).await
    }
}

pub struct Harness {
    pub mock: Arc<MockExchange>,
    pub store: Arc<MemoryStore>,
    flaky: Arc<FlakyStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub events: ExecEventReceiver,
    pub service: TradeAbstractionService,
}

impl Harness {
    pub fn new(mock: MockExchange) -> Self {
        let config = config();
        let mock = Arc::new(mock);
        let store = Arc::new(MemoryStore::new());
        let flaky = Arc::new(FlakyStore { inner: store.clone(), fail_exit_writes: AtomicBool::new(false) });
        let notifier = Arc::new(RecordingNotifier::default());
        let rules = Arc::new(RulesCache::new(mock.clone(), Duration::from_secs(3600)));
        let (tx, events) = event::channel();
        let engine = ExecutionEngine::new(
            mock.clone(),
            flaky.clone(),
            rules,
            ExchangeIdentifier::binance_spot(),
            EngineConfig::from(&config),
        )
        .with_events(tx);
        let service = TradeAbstractionService::new(&config, engine, notifier.clone());
        Self { mock, store, flaky, notifier, events, service }
    }

    pub fn position(&self, base_asset: &str, edge: &str) -> SpotPositionIdentifier {
        SpotPositionIdentifier::new(ExchangeIdentifier::binance_spot(), base_asset, EdgeId::from(edge))
    }

    /// From now on every stop / OCO id write fails.
    pub fn fail_exit_writes(&self) {
        self.flaky.fail_exit_writes.store(true, Ordering::SeqCst);
    }

    pub fn drain_events(&mut self) -> Vec<ExecEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

pub fn open_long(base_asset: &str, edge: &str, trigger_price: Option<&str>) -> OpenLongCommand {
    OpenLongCommand {
        base_asset: base_asset.into(),
        edge: EdgeId::from(edge),
        trigger_price: trigger_price.map(m),
        trade_id: TradeId::from(format!("{edge}-{base_asset}-1")),
        signal_timestamp_ms: 1_700_000_000_000,
    }
}
