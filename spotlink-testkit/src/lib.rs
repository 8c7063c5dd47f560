//! Test helpers for Spotlink venue adapters.
//!
//! Provides local stand-ins for venue endpoints:
//! - `MockRestServer`: records signed requests, serves canned JSON
//! - `MockWsServer`: accepts WebSocket clients, replays scripted frames

mod rest;
mod ws;

pub use rest::{MockRestServer, RecordedRequest};
pub use ws::MockWsServer;

use std::time::Duration;

/// Poll `condition` every 10ms until it holds or `limit` elapses.
///
/// Returns whether the condition held.
pub async fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
