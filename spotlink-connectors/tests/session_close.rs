//! Closing an adapter shuts down every stream it opened.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use spotlink_connectors::{GateExchange, VenueConfig};
use spotlink_domain::{Credentials, Exchange, ExchangeError, Order, Quote};
use spotlink_testkit::{wait_until, MockRestServer, MockWsServer};

const WAIT: Duration = Duration::from_secs(5);

async fn gate_with_ws(frames: Vec<String>) -> (MockRestServer, MockWsServer, GateExchange) {
    let rest = MockRestServer::start().await.unwrap();
    let ws = MockWsServer::start(frames).await.unwrap();
    let config = VenueConfig::new(rest.base_url(), ws.url());
    let gate = GateExchange::with_config("btc.usdt", Credentials::new("k", "s"), config).unwrap();
    (rest, ws, gate)
}

#[tokio::test]
async fn test_close_shuts_every_stream() {
    let (_rest, ws, gate) = gate_with_ws(Vec::new()).await;

    gate.subscribe_quote(Box::new(|_: &Quote| {})).await.unwrap();
    gate.subscribe_order(Box::new(|_: &Order| {})).await.unwrap();
    assert_eq!(gate.open_connections(), 2);

    gate.close();

    assert_eq!(gate.open_connections(), 0);
    assert!(wait_until(WAIT, || ws.closed_connections() == 2).await);
}

#[tokio::test]
async fn test_close_is_idempotent_and_refuses_new_streams() {
    let (_rest, ws, gate) = gate_with_ws(Vec::new()).await;

    gate.close();
    gate.close();

    let result = gate.subscribe_quote(Box::new(|_: &Quote| {})).await;

    assert!(matches!(result, Err(ExchangeError::SessionClosed)));
    assert_eq!(gate.open_connections(), 0);
    // The refused socket is dropped rather than leaked.
    assert!(wait_until(WAIT, || ws.closed_connections() == ws.connections()).await);
}

#[tokio::test]
async fn test_no_events_after_close() {
    let frames = (0..50)
        .map(|i| {
            json!({
                "time": 1,
                "channel": "spot.book_ticker",
                "event": "update",
                "result": {"t": 1_700_000_000_000_i64 + i, "s": "BTC_USDT", "b": "1", "a": "2"}
            })
            .to_string()
        })
        .collect();
    let (_rest, ws, gate) = gate_with_ws(frames).await;

    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = delivered.clone();
    gate.subscribe_quote(Box::new(move |_: &Quote| {
        counter.fetch_add(1, Ordering::SeqCst);
    }))
    .await
    .unwrap();

    gate.close();
    assert!(wait_until(WAIT, || ws.closed_connections() == 1).await);

    let after_close = delivered.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(delivered.load(Ordering::SeqCst), after_close);
}

#[tokio::test]
async fn test_close_racing_subscribe_leaves_no_open_socket() {
    let (_rest, ws, gate) = gate_with_ws(Vec::new()).await;
    let gate = Arc::new(gate);

    let subscribers: Vec<_> = (0..8)
        .map(|_| {
            let gate = gate.clone();
            tokio::spawn(async move { gate.subscribe_quote(Box::new(|_: &Quote| {})).await })
        })
        .collect();
    tokio::task::yield_now().await;
    gate.close();

    for subscriber in subscribers {
        match subscriber.await.unwrap() {
            Ok(()) | Err(ExchangeError::SessionClosed) => {},
            Err(e) => panic!("unexpected subscribe error: {:?}", e),
        }
    }

    assert_eq!(gate.open_connections(), 0);
    assert!(
        wait_until(WAIT, || ws.connections() > 0 && ws.closed_connections() == ws.connections())
            .await
            || ws.connections() == 0
    );
}

#[tokio::test]
async fn test_dropping_adapter_closes_streams() {
    let (_rest, ws, gate) = gate_with_ws(Vec::new()).await;

    gate.subscribe_quote(Box::new(|_: &Quote| {})).await.unwrap();
    drop(gate);

    assert!(wait_until(WAIT, || ws.closed_connections() == 1).await);
}
