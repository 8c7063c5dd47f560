//! Exchange capability trait.
//!
//! Every venue adapter implements `Exchange`. Callers hold adapters as
//! `Box<dyn Exchange>` and never see venue wire formats.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::ExchangeResult;
use crate::market_data::Quote;
use crate::order::{LimitOrder, Order};

/// Callback invoked with each normalized quote.
///
/// Runs on the stream's background task, one message at a time. A callback
/// that blocks stalls its own subscription only.
pub type QuoteCallback = Box<dyn FnMut(&Quote) + Send + 'static>;

/// Callback invoked with each normalized order update.
pub type OrderCallback = Box<dyn FnMut(&Order) + Send + 'static>;

/// Authenticated access to one venue's order and quote primitives for a
/// single trading pair.
///
/// Implementations:
/// - `GateExchange` - Gate.io spot
/// - `KucoinExchange` - KuCoin spot
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Available plus on-hold balance of the pair's base currency.
    ///
    /// Fails with `ExchangeError::ProtocolMismatch` if the venue answers for a
    /// different currency.
    async fn get_info(&self) -> ExchangeResult<Decimal>;

    /// Currently open orders for the configured pair.
    async fn get_orders(&self) -> ExchangeResult<Vec<Order>>;

    /// Submit a limit order and return the venue order id.
    async fn place_order(&self, order: &LimitOrder) -> ExchangeResult<String>;

    /// Cancel an order. An order the venue no longer knows as open is not an
    /// error.
    async fn cancel_order(&self, order_id: &str) -> ExchangeResult<()>;

    /// Start streaming best bid/ask quotes.
    ///
    /// Only setup failures are returned. Once streaming, a broken connection
    /// ends the stream silently and the callback stops being called.
    async fn subscribe_quote(&self, callback: QuoteCallback) -> ExchangeResult<()>;

    /// Start streaming order updates for the configured pair.
    ///
    /// Same error contract as `subscribe_quote`.
    async fn subscribe_order(&self, callback: OrderCallback) -> ExchangeResult<()>;

    /// Close every socket this adapter opened. Idempotent, does not wait for
    /// the background loops to finish.
    fn close(&self);
}
