mod common;

use common::{Harness, exchange, m, open_long};
use stopline_core::notify::Severity;
use stopline_core::store::PositionStore;
use stopline_core::{EdgeId, ExchangeIdentifier, OrderId, OrderType, TradeContext, TradeId};
use stopline_exec::{CloseCommand, CloseResult, MoveStopCommand, MoveStopResult, OpenLongResult};
use stopline_td::ExchangeError;
use stopline_td::mock::{MockCall, MockExchange};

/// Open a stop-protected 1.2 BTC position at 100 and return its stop order id.
async fn open_btc(h: &Harness) -> OrderId {
    h.mock.push_order_result(Ok(MockExchange::fill("BTCUSDT", "1001", m("1.2"), m("120"))));
    match h.service.open_long(&open_long("BTC", "edge60", Some("100"))).await {
        OpenLongResult::Success { stop_order_id: Some(id), .. } => id,
        other => panic!("expected success, got {other:?}"),
    }
}

fn close_cmd(edge: &str) -> CloseCommand {
    CloseCommand { base_asset: "BTC".into(), edge: EdgeId::from(edge), signal_timestamp_ms: 1_700_000_000_000 }
}

fn move_stop_cmd(edge: &str, price: &str) -> MoveStopCommand {
    MoveStopCommand {
        trade_context: TradeContext {
            base_asset: "BTC".into(),
            quote_asset: "USDT".into(),
            edge: EdgeId::from(edge),
            trade_id: TradeId::from(format!("{edge}-BTC-1")),
        },
        new_stop_price: m(price),
        signal_timestamp_ms: 1_700_000_000_000,
    }
}

// ---------------------------------------------------------------------------
// close
// ---------------------------------------------------------------------------

#[tokio::test]
async fn close_cancels_the_stop_and_sells_the_tracked_size() {
    let h = Harness::new(exchange());
    let stop_id = open_btc(&h).await;

    let result = h.service.close(&close_cmd("edge60")).await;
    let CloseResult::Success { trade_id, executed_base_quantity, .. } = &result else {
        panic!("expected success, got {result:?}");
    };
    assert_eq!(trade_id.as_ref(), Some(&TradeId::from("edge60-BTC-1")));
    assert_eq!(*executed_base_quantity, m("1.2"));

    let calls = h.mock.trading_calls();
    let cancel_at = calls
        .iter()
        .position(|c| matches!(c, MockCall::CancelOrder { order_id, .. } if *order_id == stop_id));
    let sell_at = calls
        .iter()
        .rposition(|c| matches!(c, MockCall::PlaceOrder(o) if o.order_type == OrderType::Market));
    assert!(cancel_at.unwrap() < sell_at.unwrap());
    assert!(!h.store.in_position(&h.position("BTC", "edge60")).await.unwrap());
}

#[tokio::test]
async fn close_proceeds_when_the_cancel_fails() {
    let h = Harness::new(exchange());
    open_btc(&h).await;
    h.mock.push_cancel_result(Err(ExchangeError::Transport("timeout".into())));

    let result = h.service.close(&close_cmd("edge60")).await;
    assert!(matches!(result, CloseResult::Success { .. }), "{result:?}");
    let warnings = h.notifier.with_severity(Severity::Warn);
    assert!(warnings.iter().any(|n| n.msg.contains("failed to cancel stop")), "{warnings:?}");
}

#[tokio::test]
async fn close_of_an_oco_position_cancels_the_list_before_selling() {
    let h = Harness::new(exchange());
    let opened = h.service.open_long(&open_long("BTC", "edge70", Some("200"))).await;
    let OpenLongResult::Success { oco_order_id: Some(list_id), .. } = &opened else {
        panic!("expected OCO success, got {opened:?}");
    };

    let result = h.service.close(&close_cmd("edge70")).await;
    let CloseResult::Success { executed_base_quantity, .. } = &result else {
        panic!("expected success, got {result:?}");
    };
    assert_eq!(*executed_base_quantity, m("0.495"));

    let calls = h.mock.trading_calls();
    let cancel_at = calls
        .iter()
        .position(|c| matches!(c, MockCall::CancelOcoOrder { order_list_id, .. } if order_list_id == list_id));
    let sell_at = calls
        .iter()
        .rposition(|c| matches!(c, MockCall::PlaceOrder(o) if o.order_type == OrderType::Market));
    assert!(cancel_at.unwrap() < sell_at.unwrap());
    assert!(!calls.iter().any(|c| matches!(c, MockCall::CancelOrder { .. })));
    assert!(!h.store.in_position(&h.position("BTC", "edge70")).await.unwrap());
}

#[tokio::test]
async fn close_sells_when_the_oco_cancel_fails() {
    let h = Harness::new(exchange());
    h.service.open_long(&open_long("BTC", "edge70", Some("200"))).await;
    h.mock.push_cancel_result(Err(ExchangeError::Transport("timeout".into())));

    let result = h.service.close(&close_cmd("edge70")).await;
    assert!(matches!(result, CloseResult::Success { .. }), "{result:?}");
    let last = h.mock.placed_orders().pop().unwrap();
    assert_eq!(last.order_type, OrderType::Market);
    assert_eq!(last.quantity, m("0.495"));
    let warnings = h.notifier.with_severity(Severity::Warn);
    assert!(warnings.iter().any(|n| n.msg.contains("failed to cancel OCO")), "{warnings:?}");
}

#[tokio::test]
async fn close_sells_when_the_canceled_stop_cannot_be_cleared() {
    let h = Harness::new(exchange());
    open_btc(&h).await;
    h.fail_exit_writes();

    let result = h.service.close(&close_cmd("edge60")).await;
    let CloseResult::Success { executed_base_quantity, .. } = &result else {
        panic!("expected success, got {result:?}");
    };
    assert_eq!(*executed_base_quantity, m("1.2"));
    assert!(h.mock.calls().iter().any(|c| matches!(c, MockCall::CancelOrder { .. })));
    assert_eq!(h.mock.placed_orders().pop().unwrap().order_type, OrderType::Market);
    assert!(!h.store.in_position(&h.position("BTC", "edge60")).await.unwrap());
}

#[tokio::test]
async fn close_without_position_is_not_in_position() {
    let h = Harness::new(exchange());
    let result = h.service.close(&close_cmd("edge60")).await;
    assert_eq!(result, CloseResult::NotInPosition);
    assert!(h.mock.calls().is_empty());
}

// ---------------------------------------------------------------------------
// move_stop
// ---------------------------------------------------------------------------

#[tokio::test]
async fn move_stop_replaces_the_stop() {
    let h = Harness::new(exchange());
    let old_stop = open_btc(&h).await;

    let result = h.service.move_stop(&move_stop_cmd("edge60", "90")).await;
    let MoveStopResult::Success { stop_order_id, stop_price, .. } = &result else {
        panic!("expected success, got {result:?}");
    };
    assert_ne!(*stop_order_id, old_stop);
    assert_eq!(*stop_price, m("90"));

    assert!(h.mock.calls().contains(&MockCall::CancelOrder { symbol: "BTCUSDT".into(), order_id: old_stop }));
    let new_stop = h.mock.placed_orders().pop().unwrap();
    assert_eq!(new_stop.stop_price, Some(m("90")));
    assert_eq!(new_stop.price, Some(m("72")));
    assert_eq!(new_stop.quantity, m("1.2"));

    let position = h.position("BTC", "edge60");
    assert_eq!(h.store.stop_order_id(&position).await.unwrap(), Some(stop_order_id.clone()));
    assert_eq!(h.store.stop_price(&position).await.unwrap(), Some(m("90")));
}

#[tokio::test]
async fn move_stop_refuses_oco_positions() {
    let h = Harness::new(exchange());
    let opened = h.service.open_long(&open_long("BTC", "edge70", Some("200"))).await;
    assert!(matches!(opened, OpenLongResult::Success { .. }), "{opened:?}");
    let calls_before = h.mock.calls().len();

    let result = h.service.move_stop(&move_stop_cmd("edge70", "195")).await;
    assert!(matches!(result, MoveStopResult::OcoExitNotSupported { .. }), "{result:?}");
    assert_eq!(h.mock.calls().len(), calls_before);
}

#[tokio::test]
async fn rejected_new_stop_leaves_the_position_unprotected_and_says_so() {
    let h = Harness::new(exchange());
    open_btc(&h).await;
    h.mock.push_order_result(Err(ExchangeError::api(-2010, "Stop price would trigger immediately.", 400)));

    let result = h.service.move_stop(&move_stop_cmd("edge60", "90")).await;
    assert!(matches!(result, MoveStopResult::FailedToPlaceNewStop { .. }), "{result:?}");
    assert_eq!(h.notifier.with_severity(Severity::Critical).len(), 1);
    assert_eq!(h.store.stop_order_id(&h.position("BTC", "edge60")).await.unwrap(), None);
}

#[tokio::test]
async fn invalid_new_stop_keeps_the_old_one() {
    let h = Harness::new(exchange());
    let old_stop = open_btc(&h).await;
    let calls_before = h.mock.calls().len();

    // 1.2 × (4 × 0.8) is below the 5 USDT minimum notional.
    let result = h.service.move_stop(&move_stop_cmd("edge60", "4")).await;
    assert!(matches!(result, MoveStopResult::BadInputs { .. }), "{result:?}");
    assert!(!h.mock.calls()[calls_before..].iter().any(|c| matches!(c, MockCall::CancelOrder { .. })));
    assert_eq!(h.store.stop_order_id(&h.position("BTC", "edge60")).await.unwrap(), Some(old_stop));
}

#[tokio::test]
async fn zero_stop_is_rejected_and_the_old_stop_kept() {
    let h = Harness::new(exchange());
    let old_stop = open_btc(&h).await;
    let calls_before = h.mock.calls().len();

    let result = h.service.move_stop(&move_stop_cmd("edge60", "0")).await;
    assert!(matches!(result, MoveStopResult::BadInputs { .. }), "{result:?}");
    assert_eq!(h.mock.calls().len(), calls_before);
    let position = h.position("BTC", "edge60");
    assert_eq!(h.store.stop_order_id(&position).await.unwrap(), Some(old_stop));
    assert_eq!(h.store.stop_price(&position).await.unwrap(), Some(m("85")));
}

#[tokio::test]
async fn move_stop_without_position() {
    let h = Harness::new(exchange());
    let result = h.service.move_stop(&move_stop_cmd("edge60", "90")).await;
    assert!(matches!(result, MoveStopResult::NotInPosition { .. }), "{result:?}");
}

// ---------------------------------------------------------------------------
// exit fills
// ---------------------------------------------------------------------------

#[tokio::test]
async fn exit_fill_closes_the_position() {
    let h = Harness::new(exchange());
    let stop_id = open_btc(&h).await;
    let exchange = ExchangeIdentifier::binance_spot();

    assert!(h.service.record_exit_fill(&exchange, "no-such-order").await.unwrap().is_none());
    let closed = h.service.record_exit_fill(&exchange, stop_id.as_str()).await.unwrap().unwrap();
    assert_eq!(closed.size, m("1.2"));
    assert_eq!(closed.trade.map(|t| t.trade_id), Some(TradeId::from("edge60-BTC-1")));
    assert!(h.service.positions().await.unwrap().is_empty());
}
