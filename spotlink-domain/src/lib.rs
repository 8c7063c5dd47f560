//! Spotlink Domain Layer
//!
//! Exchange-agnostic types shared by every venue adapter: quotes, orders,
//! credentials, trading pairs and the `Exchange` capability trait.
//! No I/O lives here.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod credentials;
pub mod error;
pub mod exchange;
pub mod market_data;
pub mod order;
pub mod pair;

// Re-export commonly used types
pub use credentials::Credentials;
pub use error::{ExchangeError, ExchangeResult};
pub use exchange::{Exchange, OrderCallback, QuoteCallback};
pub use market_data::{Quote, TimeUnit};
pub use order::{LimitOrder, Order, OrderSide};
pub use pair::TradingPair;
