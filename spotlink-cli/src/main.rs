//! Spotlink probe
//!
//! Connects to one venue, prints the base-currency balance and open orders,
//! then streams quotes and order updates until Ctrl-C.
//!
//! # Usage
//!
//! ```bash
//! SPOTLINK_VENUE=kucoin SPOTLINK_PAIR=btc.usdt \
//! SPOTLINK_KUCOIN_KEY=... SPOTLINK_KUCOIN_SECRET=... SPOTLINK_KUCOIN_PASSPHRASE=... \
//! cargo run -p spotlink-cli
//! ```
//!
//! # Environment Variables
//!
//! - `SPOTLINK_VENUE`: `gate` or `kucoin` (default: gate)
//! - `SPOTLINK_PAIR`: Dot-separated pair (default: btc.usdt)
//! - `SPOTLINK_<VENUE>_KEY`, `_SECRET`, `_PASSPHRASE`: API credentials
//! - `SPOTLINK_<VENUE>_REST_URL`, `_WS_URL`, `_TIMEOUT_SECS`, `_PING_INTERVAL_SECS`:
//!   endpoint overrides

use std::env;

use spotlink_connectors::{connect_from_env, Venue};
use spotlink_domain::{Credentials, Order, Quote};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("spotlink=info".parse()?))
        .init();

    let venue: Venue = env::var("SPOTLINK_VENUE")
        .unwrap_or_else(|_| "gate".to_string())
        .parse()?;
    let pair = env::var("SPOTLINK_PAIR").unwrap_or_else(|_| "btc.usdt".to_string());
    let credentials = Credentials::from_env(venue.env_prefix())?;

    info!(version = env!("CARGO_PKG_VERSION"), %venue, %pair, "Spotlink probe");

    let exchange = connect_from_env(venue, &pair, credentials)?;

    let balance = exchange.get_info().await?;
    println!("balance: {}", balance);

    let orders = exchange.get_orders().await?;
    println!("open orders: {}", orders.len());
    for order in &orders {
        println!(
            "  {} {} {} @ {} (filled {})",
            order.id, order.side, order.amount, order.price, order.filled
        );
    }

    exchange
        .subscribe_quote(Box::new(|quote: &Quote| {
            info!(bid = %quote.bid, ask = %quote.ask, ts = quote.timestamp_micros, "Quote");
        }))
        .await?;
    exchange
        .subscribe_order(Box::new(|order: &Order| {
            info!(
                order_id = %order.id,
                side = %order.side,
                filled = %order.filled,
                closed = order.closed,
                "Order update"
            );
        }))
        .await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    exchange.close();

    Ok(())
}
