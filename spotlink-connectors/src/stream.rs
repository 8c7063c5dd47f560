//! WebSocket stream subscriber.
//!
//! A subscription goes `Connecting -> Subscribed -> Streaming -> Closed`:
//!
//! ```text
//! connect_async ──► register ──► send subscribe ──► spawn read loop
//!                                                 └► spawn ping loop (optional)
//! ```
//!
//! Only the steps before the spawn can fail the caller. The read loop decodes
//! every text frame, hands normalized events to the callback in arrival order
//! and ends silently on the first read error, remote close or registry close.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::{interval_at, timeout, Instant};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WebSocketMessage, MaybeTlsStream, WebSocketStream,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use spotlink_domain::{ExchangeError, ExchangeResult, Order};

use crate::registry::{ConnectionRegistry, Registration};

/// Type alias for the WebSocket stream (with auto TLS).
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half, shared between the subscribe step, the ping loop and the
/// read loop's close handshake.
type WsSink = Arc<Mutex<SplitSink<WsStream, WebSocketMessage>>>;

/// Upper bound on the close handshake after cancellation
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Callback receiving decoded events.
pub type EventHandler<E> = Box<dyn FnMut(&E) + Send + 'static>;

// =============================================================================
// Frame decoding
// =============================================================================

/// Turns raw venue frames into canonical events.
///
/// Frames that are not updates for the subscribed topic (acks, welcome
/// messages, pongs, other symbols) decode to nothing.
pub trait FrameDecoder: Send + 'static {
    /// Canonical event type
    type Event: Send + 'static;

    /// Decode one JSON frame into zero or more events.
    fn decode(&mut self, frame: &Value) -> Vec<Self::Event>;
}

/// Remembers which orders already reached a terminal state on this stream.
///
/// Venues occasionally deliver a late non-terminal update after the terminal
/// one; admitting it would flip `closed` back to false.
#[derive(Debug)]
pub struct TerminalOrders {
    ids: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl TerminalOrders {
    /// Track up to `capacity` closed order ids, forgetting the oldest first.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ids: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Returns false for a non-terminal update of an order already seen closed.
    pub fn admit(&mut self, order: &Order) -> bool {
        if !order.closed {
            return !self.ids.contains(&order.id);
        }

        if self.ids.insert(order.id.clone()) {
            self.order.push_back(order.id.clone());
            if self.order.len() > self.capacity {
                if let Some(oldest) = self.order.pop_front() {
                    self.ids.remove(&oldest);
                }
            }
        }
        true
    }
}

impl Default for TerminalOrders {
    fn default() -> Self {
        Self::with_capacity(4096)
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// What to connect to and how to subscribe.
#[derive(Debug, Clone)]
pub struct StreamSpec {
    /// Topic or channel name, used for logging and the registry
    pub topic: String,
    /// WebSocket URL, including any connect token
    pub url: String,
    /// Subscribe control message sent right after connecting
    pub subscribe: Value,
    /// Application-level ping interval, for venues that require one
    pub keepalive: Option<Duration>,
}

/// Open a stream and start delivering decoded events to `handler`.
///
/// Returns once the subscribe message is sent. Errors cover only the dial,
/// registration and subscribe send; everything after is silent.
pub async fn subscribe<D: FrameDecoder>(
    registry: &Arc<ConnectionRegistry>,
    spec: StreamSpec,
    decoder: D,
    handler: EventHandler<D::Event>,
) -> ExchangeResult<()> {
    info!(url = %spec.url, topic = %spec.topic, "Connecting to WebSocket");

    let (ws_stream, _) = connect_async(spec.url.as_str())
        .await
        .map_err(|e| ExchangeError::Transport(format!("WebSocket connect failed: {}", e)))?;

    // Refused registration drops the fresh socket here.
    let registration = registry.register(&spec.topic)?;

    let (sink, stream) = ws_stream.split();
    let sink: WsSink = Arc::new(Mutex::new(sink));

    send_json(&sink, &spec.subscribe).await?;

    info!(topic = %spec.topic, id = registration.id(), "Subscribed");

    if let Some(interval) = spec.keepalive {
        tokio::spawn(ping_loop(
            Arc::clone(&sink),
            registration.token().clone(),
            interval,
            spec.topic.clone(),
        ));
    }

    tokio::spawn(read_loop(stream, sink, registration, decoder, handler, spec.topic));

    Ok(())
}

/// Minimal ping control frame.
pub fn ping_frame() -> Value {
    json!({
        "id": Utc::now().timestamp_nanos_opt().unwrap_or_default().to_string(),
        "type": "ping",
    })
}

async fn send_json(sink: &WsSink, value: &Value) -> ExchangeResult<()> {
    sink.lock()
        .await
        .send(WebSocketMessage::Text(value.to_string()))
        .await
        .map_err(|e| ExchangeError::Transport(format!("WebSocket send failed: {}", e)))
}

async fn read_loop<D: FrameDecoder>(
    mut stream: SplitStream<WsStream>,
    sink: WsSink,
    registration: Registration,
    mut decoder: D,
    mut handler: EventHandler<D::Event>,
    topic: String,
) {
    let token = registration.token().clone();

    loop {
        let message = tokio::select! {
            _ = token.cancelled() => {
                debug!(%topic, "Closing stream");
                close_sink(&sink).await;
                break;
            },
            message = stream.next() => message,
        };

        match message {
            Some(Ok(WebSocketMessage::Text(text))) => {
                let frame: Value = match serde_json::from_str(&text) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(%topic, error = %e, "Discarding non-JSON frame");
                        continue;
                    },
                };
                for event in decoder.decode(&frame) {
                    handler(&event);
                }
            },
            Some(Ok(WebSocketMessage::Close(frame))) => {
                debug!(%topic, ?frame, "Remote closed stream");
                break;
            },
            Some(Ok(_)) => {
                // Ping/pong/binary: nothing to deliver
            },
            Some(Err(e)) => {
                debug!(%topic, error = %e, "Stream read failed");
                break;
            },
            None => break,
        }
    }

    info!(%topic, "Stream ended");
    drop(registration);
}

/// Send a close frame, giving up after `CLOSE_TIMEOUT` if the sink is busy
/// or the peer stops reading.
async fn close_sink(sink: &WsSink) {
    let close = async { sink.lock().await.close().await };
    match timeout(CLOSE_TIMEOUT, close).await {
        Ok(Ok(())) => {},
        Ok(Err(e)) => debug!(error = %e, "Close handshake failed"),
        Err(_) => debug!("Close handshake timed out"),
    }
}

async fn ping_loop(sink: WsSink, token: CancellationToken, interval: Duration, topic: String) {
    let mut ticker = interval_at(Instant::now() + interval, interval);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let frame = ping_frame();
                let result = tokio::select! {
                    _ = token.cancelled() => break,
                    result = send_json(&sink, &frame) => result,
                };
                if let Err(e) = result {
                    debug!(%topic, error = %e, "Ping failed");
                    break;
                }
            },
        }
    }

    debug!(%topic, "Keep-alive ended");
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use spotlink_domain::OrderSide;

    fn order(id: &str, closed: bool) -> Order {
        Order::new(id, OrderSide::Buy, Decimal::ONE, Decimal::ONE, Decimal::ZERO, closed)
    }

    #[test]
    fn test_terminal_orders_never_reopen() {
        let mut terminal = TerminalOrders::default();

        assert!(terminal.admit(&order("1", false)));
        assert!(terminal.admit(&order("1", true)));
        assert!(!terminal.admit(&order("1", false)));
        // Repeated terminal updates still pass
        assert!(terminal.admit(&order("1", true)));
        // Other ids unaffected
        assert!(terminal.admit(&order("2", false)));
    }

    #[test]
    fn test_terminal_orders_capacity() {
        let mut terminal = TerminalOrders::with_capacity(2);

        terminal.admit(&order("a", true));
        terminal.admit(&order("b", true));
        terminal.admit(&order("c", true));

        // "a" was forgotten, "b" and "c" remembered
        assert!(terminal.admit(&order("a", false)));
        assert!(!terminal.admit(&order("b", false)));
        assert!(!terminal.admit(&order("c", false)));
    }

    #[tokio::test]
    async fn test_close_sink_gives_up_on_busy_sink() {
        let server = spotlink_testkit::MockWsServer::start(Vec::new()).await.unwrap();
        let (ws_stream, _) = connect_async(server.url()).await.unwrap();
        let (sink, _stream) = ws_stream.split();
        let sink: WsSink = Arc::new(Mutex::new(sink));

        // A stuck keep-alive send holds the lock indefinitely
        let _held = sink.lock().await;

        let finished = tokio::time::timeout(Duration::from_secs(5), close_sink(&sink)).await;
        assert!(finished.is_ok());
    }

    #[tokio::test]
    async fn test_close_sink_sends_close_frame() {
        let server = spotlink_testkit::MockWsServer::start(Vec::new()).await.unwrap();
        let (ws_stream, _) = connect_async(server.url()).await.unwrap();
        let (sink, _stream) = ws_stream.split();
        let sink: WsSink = Arc::new(Mutex::new(sink));

        close_sink(&sink).await;

        assert!(
            spotlink_testkit::wait_until(Duration::from_secs(5), || server.closed_connections() == 1)
                .await
        );
    }

    #[test]
    fn test_ping_frame_shape() {
        let frame = ping_frame();

        assert_eq!(frame["type"], "ping");
        assert!(frame["id"].as_str().is_some_and(|id| !id.is_empty()));
    }
}
