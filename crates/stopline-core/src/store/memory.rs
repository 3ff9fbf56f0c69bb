//! In-process [`PositionStore`] with optional JSON snapshotting.
//!
//! All state sits behind one [`tokio::sync::RwLock`]. When a snapshot path is
//! configured, every write rewrites the snapshot (temp file + rename) while the
//! write lock is held, so the file always reflects a consistent state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{PositionRecord, PositionStore};
use crate::error::StoreError;
use crate::money::Money;
use crate::types::{ExchangeIdentifier, OrderContext, OrderId, SpotPositionIdentifier, TradeContext};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    /// `"{exchange}:{order id}"` → context.
    order_contexts: HashMap<String, OrderContext>,
    /// `SpotPositionIdentifier` display string → record.
    positions: HashMap<String, PositionRecord>,
}

/// Memory-backed position store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
    snapshot_path: Option<PathBuf>,
}

impl MemoryStore {
    /// Empty, non-persistent store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store backed by a JSON snapshot file. An existing snapshot is loaded;
    /// a missing one starts empty and is created on the first write.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let state: StoreState = serde_json::from_slice(&bytes)?;
                info!("[store] loaded snapshot {}, {} position(s)", path.display(), state.positions.len());
                state
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreState::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { state: RwLock::new(state), snapshot_path: Some(path) })
    }

    async fn persist(&self, state: &StoreState) -> Result<(), StoreError> {
        let Some(ref path) = self.snapshot_path else {
            return Ok(());
        };
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(state)?).await?;
        tokio::fs::rename(&tmp, path).await?;
        debug!("[store] snapshot written to {}", path.display());
        Ok(())
    }

    /// Apply `f` to the position record (creating an empty one if needed) and persist.
    async fn update_position<F>(&self, position: &SpotPositionIdentifier, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut PositionRecord),
    {
        let mut state = self.state.write().await;
        let record =
            state.positions.entry(position.to_string()).or_insert_with(|| PositionRecord::empty(position.clone()));
        f(record);
        self.persist(&state).await
    }

    async fn read_position<T, F>(&self, position: &SpotPositionIdentifier, f: F) -> Option<T>
    where
        F: FnOnce(&PositionRecord) -> Option<T>,
    {
        let state = self.state.read().await;
        state.positions.get(&position.to_string()).and_then(f)
    }
}

fn order_key(exchange: &ExchangeIdentifier, order_id: &str) -> String {
    format!("{exchange}:{order_id}")
}

#[async_trait]
impl PositionStore for MemoryStore {
    async fn set_order_context(
        &self,
        exchange: &ExchangeIdentifier,
        order_id: &str,
        context: &OrderContext,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.order_contexts.insert(order_key(exchange, order_id), context.clone());
        self.persist(&state).await
    }

    async fn get_order_context_for_order(
        &self,
        exchange: &ExchangeIdentifier,
        order_id: &str,
    ) -> Result<Option<OrderContext>, StoreError> {
        Ok(self.state.read().await.order_contexts.get(&order_key(exchange, order_id)).cloned())
    }

    async fn stop_order_id(&self, position: &SpotPositionIdentifier) -> Result<Option<OrderId>, StoreError> {
        Ok(self.read_position(position, |r| r.stop_order_id.clone()).await)
    }

    async fn set_stop_order_id(
        &self,
        position: &SpotPositionIdentifier,
        order_id: Option<OrderId>,
    ) -> Result<(), StoreError> {
        self.update_position(position, |r| r.stop_order_id = order_id).await
    }

    async fn oco_order_id(&self, position: &SpotPositionIdentifier) -> Result<Option<OrderId>, StoreError> {
        Ok(self.read_position(position, |r| r.oco_order_id.clone()).await)
    }

    async fn set_oco_order_id(
        &self,
        position: &SpotPositionIdentifier,
        order_id: Option<OrderId>,
    ) -> Result<(), StoreError> {
        self.update_position(position, |r| r.oco_order_id = order_id).await
    }

    async fn stop_price(&self, position: &SpotPositionIdentifier) -> Result<Option<Money>, StoreError> {
        Ok(self.read_position(position, |r| r.stop_price).await)
    }

    async fn set_stop_price(&self, position: &SpotPositionIdentifier, price: Money) -> Result<(), StoreError> {
        self.update_position(position, |r| r.stop_price = Some(price)).await
    }

    async fn in_position(&self, position: &SpotPositionIdentifier) -> Result<bool, StoreError> {
        Ok(self.position_size(position).await?.is_positive())
    }

    async fn position_size(&self, position: &SpotPositionIdentifier) -> Result<Money, StoreError> {
        Ok(self.read_position(position, |r| Some(r.size)).await.unwrap_or(Money::ZERO))
    }

    async fn trade_context(&self, position: &SpotPositionIdentifier) -> Result<Option<TradeContext>, StoreError> {
        Ok(self.read_position(position, |r| r.trade.clone()).await)
    }

    async fn open_position(
        &self,
        position: &SpotPositionIdentifier,
        size: Money,
        trade: &TradeContext,
    ) -> Result<(), StoreError> {
        let trade = trade.clone();
        self.update_position(position, move |r| {
            r.size = size;
            r.trade = Some(trade);
            r.stop_order_id = None;
            r.oco_order_id = None;
            r.stop_price = None;
        })
        .await
    }

    async fn close_position(&self, position: &SpotPositionIdentifier) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.positions.remove(&position.to_string());
        self.persist(&state).await
    }

    async fn open_positions(&self) -> Result<Vec<PositionRecord>, StoreError> {
        let state = self.state.read().await;
        let mut records: Vec<_> = state.positions.values().filter(|r| r.size.is_positive()).cloned().collect();
        records.sort_by_key(|r| r.id.to_string());
        Ok(records)
    }

    async fn position_for_exit_order(&self, order_id: &str) -> Result<Option<PositionRecord>, StoreError> {
        let state = self.state.read().await;
        let is_exit = |id: &Option<OrderId>| id.as_ref().is_some_and(|id| id.as_str() == order_id);
        Ok(state.positions.values().find(|r| is_exit(&r.stop_order_id) || is_exit(&r.oco_order_id)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EdgeId, TradeId};

    fn position() -> SpotPositionIdentifier {
        SpotPositionIdentifier::new(ExchangeIdentifier::binance_spot(), "BTC", EdgeId::from("edge60"))
    }

    fn trade() -> TradeContext {
        TradeContext {
            base_asset: "BTC".into(),
            quote_asset: "USDT".into(),
            edge: EdgeId::from("edge60"),
            trade_id: TradeId::from("t-1"),
        }
    }

    #[tokio::test]
    async fn position_lifecycle() {
        let store = MemoryStore::new();
        let pos = position();
        assert!(!store.in_position(&pos).await.unwrap());
        assert_eq!(store.position_size(&pos).await.unwrap(), Money::ZERO);

        store.open_position(&pos, Money::from(2), &trade()).await.unwrap();
        store.set_stop_order_id(&pos, Some(OrderId::from("42"))).await.unwrap();
        store.set_stop_price(&pos, Money::from(85)).await.unwrap();

        assert!(store.in_position(&pos).await.unwrap());
        assert_eq!(store.stop_order_id(&pos).await.unwrap(), Some(OrderId::from("42")));
        assert_eq!(store.stop_price(&pos).await.unwrap(), Some(Money::from(85)));
        assert_eq!(store.trade_context(&pos).await.unwrap(), Some(trade()));
        assert_eq!(store.position_for_exit_order("42").await.unwrap().map(|r| r.id), Some(pos.clone()));
        assert_eq!(store.open_positions().await.unwrap().len(), 1);

        store.close_position(&pos).await.unwrap();
        assert!(!store.in_position(&pos).await.unwrap());
        assert_eq!(store.stop_order_id(&pos).await.unwrap(), None);
    }

    #[tokio::test]
    async fn order_context_lookup_is_scoped_by_exchange() {
        let store = MemoryStore::new();
        let exchange = ExchangeIdentifier::binance_spot();
        let ctx = trade().order_context();
        store.set_order_context(&exchange, "abc", &ctx).await.unwrap();

        assert_eq!(store.get_order_context_for_order(&exchange, "abc").await.unwrap(), Some(ctx));
        let mut other = exchange.clone();
        other.account = "sub-1".into();
        assert_eq!(store.get_order_context_for_order(&other, "abc").await.unwrap(), None);
    }

    #[tokio::test]
    async fn snapshot_survives_reopen() {
        let path = std::env::temp_dir().join(format!("stopline-store-{}.json", TradeId::generate()));
        {
            let store = MemoryStore::open(&path).await.unwrap();
            store.open_position(&position(), Money::from(3), &trade()).await.unwrap();
        }
        let reopened = MemoryStore::open(&path).await.unwrap();
        assert_eq!(reopened.position_size(&position()).await.unwrap(), Money::from(3));
        let _ = std::fs::remove_file(&path);
    }
}
