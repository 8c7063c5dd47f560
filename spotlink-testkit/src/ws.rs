//! Mock WebSocket venue.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::debug;

#[derive(Default)]
struct WsState {
    /// Text frames received from clients, in arrival order
    received: Mutex<Vec<String>>,
    /// Connections accepted
    connections: AtomicUsize,
    /// Connections whose read side ended
    closed: AtomicUsize,
}

/// Local WebSocket server replaying scripted frames.
///
/// Per connection: send the optional greeting, wait for the first client
/// frame (the subscribe request), send every scripted frame, then keep
/// reading until the client goes away.
pub struct MockWsServer {
    url: String,
    state: Arc<WsState>,
    handle: JoinHandle<()>,
}

impl MockWsServer {
    /// Start a server that replays `frames` after the subscribe request.
    pub async fn start(frames: Vec<String>) -> Result<Self> {
        Self::start_with_greeting(None, frames).await
    }

    /// Start a server that also sends `greeting` as soon as a client connects.
    pub async fn start_with_greeting(greeting: Option<String>, frames: Vec<String>) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = Arc::new(WsState::default());

        let accept_state = state.clone();
        let handle = tokio::spawn(async move {
            while let Ok((stream, peer)) = listener.accept().await {
                debug!(%peer, "Mock WebSocket client connected");
                let state = accept_state.clone();
                let greeting = greeting.clone();
                let frames = frames.clone();
                tokio::spawn(async move {
                    serve_client(stream, state, greeting, frames).await;
                });
            }
        });

        Ok(Self {
            url: format!("ws://{}", addr),
            state,
            handle,
        })
    }

    /// URL to point an adapter at.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Text frames received from clients so far.
    pub fn received(&self) -> Vec<String> {
        self.state.received.lock().unwrap().clone()
    }

    /// Connections accepted so far.
    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Connections that have been closed or dropped by the client.
    pub fn closed_connections(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }
}

impl Drop for MockWsServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve_client(
    stream: TcpStream,
    state: Arc<WsState>,
    greeting: Option<String>,
    frames: Vec<String>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws_stream) => ws_stream,
        Err(e) => {
            debug!(error = %e, "Mock WebSocket handshake failed");
            return;
        },
    };
    state.connections.fetch_add(1, Ordering::SeqCst);

    let (mut write, mut read) = ws_stream.split();

    if let Some(greeting) = greeting {
        if write.send(Message::Text(greeting)).await.is_err() {
            state.closed.fetch_add(1, Ordering::SeqCst);
            return;
        }
    }

    let mut subscribed = false;
    while let Some(Ok(message)) = read.next().await {
        match message {
            Message::Text(text) => {
                state.received.lock().unwrap().push(text);
                if !subscribed {
                    subscribed = true;
                    for frame in &frames {
                        if write.send(Message::Text(frame.clone())).await.is_err() {
                            break;
                        }
                    }
                }
            },
            Message::Close(_) => break,
            _ => {},
        }
    }

    state.closed.fetch_add(1, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_tungstenite::connect_async;

    #[tokio::test]
    async fn test_replays_frames_after_subscribe() {
        let server = MockWsServer::start(vec!["one".to_string(), "two".to_string()])
            .await
            .unwrap();

        let (mut socket, _) = connect_async(server.url()).await.unwrap();
        socket.send(Message::Text("subscribe".to_string())).await.unwrap();

        let mut replies = Vec::new();
        while replies.len() < 2 {
            if let Some(Ok(Message::Text(text))) = socket.next().await {
                replies.push(text);
            }
        }
        socket.close(None).await.unwrap();

        assert_eq!(replies, vec!["one", "two"]);
        assert!(crate::wait_until(Duration::from_secs(2), || server.closed_connections() == 1).await);
        assert_eq!(server.connections(), 1);
        assert_eq!(server.received(), vec!["subscribe"]);
    }
}
