//! End-to-end lifecycle scenarios: decision in, orders and audit events out.

mod common;

use rust_decimal_macros::dec;

use sentinel_bot::SignalSnapshot;
use sentinel_core::{
    Decision, EventType, OrderId, OrderStatus, OrderType, Price, ReasonCode, Side, Size, Symbol,
};
use sentinel_exchange::{AdapterError, MockStep, Priority};
use sentinel_executor::OrderOutcome;

use common::{config, config_with_pct, TestApp};

fn buy(symbol: &str, price: rust_decimal::Decimal) -> SignalSnapshot {
    SignalSnapshot::new(symbol, Decision::Buy, Price::new(price))
}

#[tokio::test]
async fn happy_path_places_confirms_and_protects() {
    let mut t = TestApp::new(config("trading", &[("BTCUSDT", true)]));
    t.exchange.queue_script(vec![
        MockStep::active(),
        MockStep::filled(dec!(10), dec!(10)),
    ]);
    t.signals(vec![buy("BTCUSDT", dec!(10))]);

    let report = t.app.run_cycle().await;

    assert_eq!(report.errors, 0);
    let outcome = report.outcome(&Symbol::from("BTCUSDT")).unwrap();
    assert_eq!(
        outcome.order,
        Some(OrderOutcome::Protected {
            order_id: OrderId::from(42u64)
        })
    );

    // Fill confirmed on the second poll, one sleep in between
    assert_eq!(t.exchange.open_orders_calls(), 2);
    assert_eq!(t.clock.sleep_count(), 1);

    let placed = t.exchange.placed();
    assert_eq!(placed.len(), 3);
    assert_eq!(placed[0].qty.to_string(), "10.000");
    assert!(!placed[0].reduce_only);

    let stop_loss = &placed[1];
    assert_eq!(stop_loss.side, Side::Sell);
    assert_eq!(stop_loss.order_type, OrderType::StopLoss);
    assert_eq!(stop_loss.trigger_price, Some(Price::new(dec!(9.8))));
    assert_eq!(stop_loss.qty.to_string(), "10.000");

    let take_profit = &placed[2];
    assert_eq!(take_profit.order_type, OrderType::Limit);
    assert_eq!(take_profit.price, Price::new(dec!(10.4)));
    assert!(take_profit.reduce_only);

    assert_eq!(t.count(EventType::AlertSent), 1);
    assert_eq!(t.count(EventType::OrderCreated), 1);
    assert_eq!(t.count(EventType::OrderFilled), 1);
    assert_eq!(t.count(EventType::SltpCreated), 1);
    assert_eq!(t.count(EventType::SltpFailed), 0);

    let primary = t
        .app
        .store()
        .find_by_order_id(&OrderId::from(42u64))
        .unwrap();
    assert_eq!(primary.status, OrderStatus::Filled);
}

#[tokio::test]
async fn trade_disabled_alerts_without_ordering() {
    let mut t = TestApp::new(config("trading", &[("BTCUSDT", false)]));
    t.signals(vec![buy("BTCUSDT", dec!(10))]);

    let report = t.app.run_cycle().await;

    let outcome = report.outcome(&Symbol::from("BTCUSDT")).unwrap();
    assert!(outcome.alert.as_ref().unwrap().is_emit());
    assert!(!outcome.trade.as_ref().unwrap().is_exec());
    assert!(t.exchange.placed().is_empty());
    assert!(t.app.store().is_empty());

    assert_eq!(t.count(EventType::AlertSent), 1);
    assert_eq!(
        t.reasons(EventType::TradeBlocked),
        vec![ReasonCode::SkipDisabledTrade]
    );
}

#[tokio::test]
async fn observation_mode_never_trades() {
    let mut t = TestApp::new(config("observation", &[("BTCUSDT", true)]));
    t.signals(vec![buy("BTCUSDT", dec!(10))]);

    t.app.run_cycle().await;

    assert_eq!(t.count(EventType::AlertSent), 1);
    assert_eq!(t.count(EventType::TradeBlocked), 0);
    assert!(t.exchange.placed().is_empty());
}

#[tokio::test]
async fn reconciler_resolves_fill_the_poller_missed() {
    let mut t = TestApp::new(config("trading", &[("BTCUSDT", true)]));
    let mut script = vec![MockStep::active(); 10];
    script.push(MockStep::filled(dec!(10), dec!(10)));
    t.exchange.queue_script(script);
    t.signals(vec![buy("BTCUSDT", dec!(10))]);

    let report = t.app.run_cycle().await;
    assert_eq!(
        report.outcome(&Symbol::from("BTCUSDT")).unwrap().order,
        Some(OrderOutcome::Deferred {
            order_id: OrderId::from(42u64)
        })
    );
    assert_eq!(t.count(EventType::SltpCreated), 0);

    let reconciled = t.app.reconciler().run_once().await;
    assert_eq!(reconciled.transitions, 1);
    assert_eq!(reconciled.protected, 1);

    assert_eq!(t.count(EventType::OrderFilled), 1);
    assert_eq!(t.count(EventType::OrderCancelled), 0);
    assert_eq!(t.count(EventType::SltpCreated), 1);
}

#[tokio::test]
async fn vanished_order_stays_open_until_history_explains_it() {
    let mut t = TestApp::new(config("trading", &[("BTCUSDT", true)]));
    t.exchange.queue_script(vec![MockStep::Vanished]);
    t.signals(vec![buy("BTCUSDT", dec!(10))]);

    t.app.run_cycle().await;
    let reconciled = t.app.reconciler().run_once().await;

    assert_eq!(reconciled.deferred, 1);
    let order = t
        .app
        .store()
        .find_by_order_id(&OrderId::from(42u64))
        .unwrap();
    assert_eq!(order.status, OrderStatus::Active);
    assert_eq!(t.count(EventType::OrderCancelled), 0);
}

#[tokio::test]
async fn failing_symbol_does_not_halt_cycle() {
    let mut t = TestApp::new(config(
        "trading",
        &[("BTCUSDT", true), ("ETHUSDT", true)],
    ));
    t.exchange.set_open_orders_error(
        &Symbol::from("ETHUSDT"),
        Some(AdapterError::Terminal("invalid api key".to_string())),
    );
    t.signals(vec![buy("ETHUSDT", dec!(10)), buy("BTCUSDT", dec!(10))]);

    let report = t.app.run_cycle().await;

    assert_eq!(report.errors, 1);
    assert_eq!(report.evaluated, 1);
    let btc = report.outcome(&Symbol::from("BTCUSDT")).unwrap();
    assert!(matches!(btc.order, Some(OrderOutcome::Deferred { .. })));
    assert!(report.outcome(&Symbol::from("ETHUSDT")).is_none());
    assert_eq!(t.count(EventType::OrderCreated), 2);
}

#[tokio::test]
async fn protection_failure_is_recorded_and_escalated() {
    let mut t = TestApp::new(config("trading", &[("BTCUSDT", true)]));
    t.exchange.queue_script(vec![MockStep::filled(dec!(10), dec!(10))]);
    t.exchange.queue_place_result(Ok(OrderStatus::New));
    t.exchange.queue_place_result(Ok(OrderStatus::New));
    t.exchange
        .queue_place_result(Err(AdapterError::Terminal("reduce only rejected".to_string())));
    t.signals(vec![buy("BTCUSDT", dec!(10))]);

    let report = t.app.run_cycle().await;

    assert!(matches!(
        report.outcome(&Symbol::from("BTCUSDT")).unwrap().order,
        Some(OrderOutcome::ProtectionFailed { .. })
    ));
    assert_eq!(
        t.reasons(EventType::SltpFailed),
        vec![ReasonCode::TakeProfitFailed]
    );
    assert_eq!(t.count(EventType::SltpCreated), 0);

    let escalations = t.notifier.high_priority();
    assert_eq!(escalations.len(), 1);
    assert_eq!(escalations[0].priority, Priority::High);
    assert!(escalations[0].message.contains("BTCUSDT"));
}

#[tokio::test]
async fn second_signal_inside_cooldowns_is_throttled_twice() {
    let mut t = TestApp::new(config("trading", &[("BTCUSDT", true)]));
    t.exchange.queue_script(vec![MockStep::filled(dec!(10), dec!(10))]);
    t.signals(vec![buy("BTCUSDT", dec!(10))]);
    t.app.run_cycle().await;

    t.clock.advance_secs(30);
    t.app.run_cycle().await;

    assert_eq!(
        t.reasons(EventType::AlertBlocked),
        vec![ReasonCode::ThrottledTimeGate]
    );
    // Filled and protected: the position still holds the symbol's slot
    assert_eq!(
        t.reasons(EventType::TradeBlocked),
        vec![ReasonCode::OrderBlockedMaxPositions]
    );
    assert_eq!(t.count(EventType::OrderCreated), 1);
}

#[tokio::test]
async fn throttled_alert_still_places_order() {
    let mut t = TestApp::new(config("trading", &[("BTCUSDT", true)]));
    t.exchange
        .queue_script(vec![MockStep::Closed(OrderStatus::Rejected)]);
    t.signals(vec![buy("BTCUSDT", dec!(10))]);

    let first = t.app.run_cycle().await;
    assert!(matches!(
        first.outcome(&Symbol::from("BTCUSDT")).unwrap().order,
        Some(OrderOutcome::Closed {
            status: OrderStatus::Rejected,
            ..
        })
    ));

    t.clock.advance_secs(30);
    let second = t.app.run_cycle().await;

    let outcome = second.outcome(&Symbol::from("BTCUSDT")).unwrap();
    assert!(!outcome.alert.as_ref().unwrap().is_emit());
    assert!(outcome.trade.as_ref().unwrap().is_exec());
    assert_eq!(
        t.reasons(EventType::AlertBlocked),
        vec![ReasonCode::ThrottledTimeGate]
    );
    assert_eq!(t.count(EventType::TradeBlocked), 0);
    assert_eq!(t.count(EventType::OrderCreated), 2);
}

#[tokio::test]
async fn partial_fill_cancelled_by_exchange_is_protected() {
    let mut t = TestApp::new(config("trading", &[("BTCUSDT", true)]));
    t.exchange.queue_script(vec![
        MockStep::partial(Size::new(dec!(4))),
        MockStep::Closed(OrderStatus::Cancelled),
    ]);
    t.signals(vec![buy("BTCUSDT", dec!(10))]);

    let report = t.app.run_cycle().await;

    assert_eq!(
        report.outcome(&Symbol::from("BTCUSDT")).unwrap().order,
        Some(OrderOutcome::Protected {
            order_id: OrderId::from(42u64)
        })
    );
    assert_eq!(t.count(EventType::OrderCancelled), 1);
    assert_eq!(t.count(EventType::SltpCreated), 1);
    let legs: Vec<String> = t.exchange.placed()[1..]
        .iter()
        .map(|leg| leg.qty.to_string())
        .collect();
    assert_eq!(legs, vec!["4.000", "4.000"]);
    assert!(t.notifier.high_priority().is_empty());

    // The partial position still holds the symbol's slot
    t.clock.advance_secs(120);
    t.app.run_cycle().await;
    assert_eq!(
        t.reasons(EventType::TradeBlocked),
        vec![ReasonCode::OrderBlockedMaxPositions]
    );
}

#[tokio::test]
async fn strategy_change_forces_next_signal() {
    let mut t = TestApp::new(config("observation", &[("BTCUSDT", false)]));
    t.signals(vec![buy("BTCUSDT", dec!(10))]);

    t.app.run_cycle().await;
    t.app.run_cycle().await;
    assert_eq!(t.count(EventType::AlertSent), 1);
    assert_eq!(t.count(EventType::AlertBlocked), 1);

    t.app
        .apply_config(config_with_pct("observation", &[("BTCUSDT", false)], "2.5"));
    t.app.run_cycle().await;

    let sent = t.reasons(EventType::AlertSent);
    assert_eq!(sent, vec![ReasonCode::FirstSignal, ReasonCode::ForcedSignal]);

    // Flag cleared after one use
    t.app.run_cycle().await;
    assert_eq!(t.count(EventType::AlertSent), 2);
}
