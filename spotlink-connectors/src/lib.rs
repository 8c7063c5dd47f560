//! Spotlink Exchange Connectors
//!
//! Venue adapters (REST + WebSocket) implementing the `Exchange` trait.
//! Normalizes venue-specific wire formats to domain types.
//!
//! # Components
//!
//! - **Signer**: per-venue canonical string + HMAC
//! - **REST**: one signed round trip, envelope unwrapping
//! - **Stream**: WebSocket subscribe, read loop, keep-alive loop
//! - **Registry**: every socket an adapter opened, closed together
//! - **Adapters**: `GateExchange`, `KucoinExchange`
//!
//! # Example
//!
//! ```rust,ignore
//! use spotlink_connectors::{connect, Venue};
//! use spotlink_domain::{Credentials, LimitOrder, OrderSide};
//!
//! let exchange = connect(Venue::Gate, "btc.usdt", Credentials::new(key, secret))?;
//! let balance = exchange.get_info().await?;
//! exchange.subscribe_quote(Box::new(|quote| println!("{:?}", quote))).await?;
//! let id = exchange.place_order(&LimitOrder::maker(OrderSide::Buy, dec!(5000), dec!(0.01))).await?;
//! exchange.close();
//! ```

#![warn(clippy::all)]

// Public modules
pub mod config;
pub mod gate;
pub mod kucoin;
pub mod registry;
pub mod rest;
pub mod signer;
pub mod stream;
pub mod venue;

// Re-exports
pub use config::VenueConfig;
pub use gate::{GateAccount, GateExchange};
pub use kucoin::KucoinExchange;
pub use registry::{ConnectionRegistry, Registration};
pub use rest::{Envelope, Payload, RestClient};
pub use signer::{GateSigner, KeyVersion, KucoinSigner, RequestSigner, SignInput, SignedHeaders};
pub use stream::{FrameDecoder, StreamSpec, TerminalOrders};
pub use venue::{connect, connect_from_env, Venue};
