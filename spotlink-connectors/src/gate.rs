//! Gate.io spot adapter.
//!
//! REST: APIv4 with HMAC-SHA512 signatures, payload returned bare.
//! WebSocket: `spot.book_ticker` for quotes, authenticated `spot.orders` for
//! order updates. Gate needs no application-level keep-alive.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use spotlink_domain::{
    Credentials, Exchange, ExchangeError, ExchangeResult, LimitOrder, Order, OrderCallback,
    OrderSide, Quote, QuoteCallback, TimeUnit, TradingPair,
};

use crate::config::VenueConfig;
use crate::registry::ConnectionRegistry;
use crate::rest::{Envelope, RestClient};
use crate::signer::GateSigner;
use crate::stream::{self, FrameDecoder, StreamSpec, TerminalOrders};

// =============================================================================
// Constants
// =============================================================================

/// Separator between base and quote in Gate symbols
const SYMBOL_SEPARATOR: char = '_';

/// Best bid/ask channel
const QUOTE_CHANNEL: &str = "spot.book_ticker";

/// Private order update channel
const ORDER_CHANNEL: &str = "spot.orders";

/// Order event marking a terminal state
const TERMINAL_EVENT: &str = "finish";

/// Labels meaning the order is no longer open
const NOT_FOUND_LABELS: [&str; 3] = ["ORDER_NOT_FOUND", "ORDER_CLOSED", "ORDER_CANCELLED"];

/// Orders requested per page (venue maximum)
const ORDERS_PAGE_LIMIT: usize = 100;

/// Pages followed when listing open orders
const MAX_ORDER_PAGES: usize = 20;

const ACCOUNTS_PATH: &str = "/api/v4/spot/accounts";
const ORDERS_PATH: &str = "/api/v4/spot/orders";

/// Gate trading account orders are placed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GateAccount {
    /// Spot account
    #[default]
    Spot,
    /// Cross margin account
    CrossMargin,
}

impl GateAccount {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            GateAccount::Spot => "spot",
            GateAccount::CrossMargin => "cross_margin",
        }
    }

    /// Parse the wire name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "spot" => Some(GateAccount::Spot),
            "cross_margin" => Some(GateAccount::CrossMargin),
            _ => None,
        }
    }
}

// =============================================================================
// Gate Exchange
// =============================================================================

/// Gate.io spot adapter bound to one trading pair.
pub struct GateExchange {
    /// Trading pair
    pair: TradingPair,
    /// Venue symbol (e.g. `BTC_USDT`)
    symbol: String,
    /// Endpoints
    config: VenueConfig,
    /// Account orders are placed against
    account: GateAccount,
    /// Signer, also used for channel authentication
    signer: Arc<GateSigner>,
    /// Signed REST client
    rest: RestClient,
    /// Open sockets
    registry: Arc<ConnectionRegistry>,
}

impl GateExchange {
    /// Create an adapter against the production endpoints.
    ///
    /// # Arguments
    ///
    /// * `pair` - Dot-separated pair identifier (e.g. `btc.usdt`)
    /// * `credentials` - API key and secret
    pub fn new(pair: &str, credentials: Credentials) -> ExchangeResult<Self> {
        Self::with_config(pair, credentials, VenueConfig::gate())
    }

    /// Create an adapter against custom endpoints.
    pub fn with_config(
        pair: &str,
        credentials: Credentials,
        config: VenueConfig,
    ) -> ExchangeResult<Self> {
        let pair = TradingPair::parse(pair)?;
        let signer = Arc::new(GateSigner::new(credentials));
        let rest = RestClient::new(
            config.rest_url.clone(),
            signer.clone(),
            Envelope::Bare,
            config.request_timeout,
        );

        Ok(Self {
            symbol: pair.symbol(SYMBOL_SEPARATOR),
            pair,
            config,
            account: GateAccount::default(),
            signer,
            rest,
            registry: ConnectionRegistry::new(),
        })
    }

    /// Place and list orders against the given account.
    pub fn with_account(mut self, account: GateAccount) -> Self {
        self.account = account;
        self
    }

    /// Venue symbol (e.g. `BTC_USDT`).
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Sockets currently open.
    pub fn open_connections(&self) -> usize {
        self.registry.open_connections()
    }

    fn subscribe_message(&self, channel: &str, time: i64) -> Value {
        json!({
            "time": time,
            "channel": channel,
            "event": "subscribe",
            "payload": [self.symbol],
        })
    }
}

#[async_trait]
impl Exchange for GateExchange {
    async fn get_info(&self) -> ExchangeResult<Decimal> {
        let query = format!("currency={}", self.pair.base());
        let (balances, raw): (Vec<GateBalance>, String) =
            self.rest.call_raw(Method::GET, ACCOUNTS_PATH, &query, None).await?;

        let mut total = Decimal::ZERO;
        for balance in &balances {
            if balance.currency != self.pair.base() {
                return Err(ExchangeError::ProtocolMismatch(format!(
                    "expected currency {}, got {}: {}",
                    self.pair.base(),
                    balance.currency,
                    raw
                )));
            }
            total += balance.available + balance.locked;
        }

        debug!(currency = %self.pair.base(), %total, "Fetched balance");
        Ok(total)
    }

    async fn get_orders(&self) -> ExchangeResult<Vec<Order>> {
        let mut orders = Vec::new();
        let mut page = 1;

        loop {
            let query = format!(
                "currency_pair={}&status=open&account={}&page={}&limit={}",
                self.symbol,
                self.account.as_str(),
                page,
                ORDERS_PAGE_LIMIT
            );
            let batch: Vec<GateOrder> =
                self.rest.call(Method::GET, ORDERS_PATH, &query, None).await?;
            let last_page = batch.len() < ORDERS_PAGE_LIMIT;

            orders.extend(
                batch
                    .into_iter()
                    .filter(|order| order.currency_pair == self.symbol)
                    .map(|order| {
                        let closed = !order.status.is_empty() && order.status != "open";
                        order.into_order(closed)
                    })
                    .filter(|order| !order.closed),
            );

            if last_page {
                break;
            }
            if page >= MAX_ORDER_PAGES {
                warn!(pages = page, "Open order listing truncated");
                break;
            }
            page += 1;
        }

        Ok(orders)
    }

    async fn place_order(&self, order: &LimitOrder) -> ExchangeResult<String> {
        let body = json!({
            "currency_pair": self.symbol,
            "type": "limit",
            "account": self.account.as_str(),
            "side": order.side.as_str(),
            "price": order.price.normalize().to_string(),
            "amount": order.amount.normalize().to_string(),
            "time_in_force": if order.post_only { "poc" } else { "gtc" },
        });

        let placed: GatePlacedOrder =
            self.rest.call(Method::POST, ORDERS_PATH, "", Some(&body)).await?;

        info!(order_id = %placed.id, symbol = %self.symbol, side = %order.side, "Order placed");
        Ok(placed.id)
    }

    async fn cancel_order(&self, order_id: &str) -> ExchangeResult<()> {
        let path = format!("{}/{}", ORDERS_PATH, order_id);
        let query = format!("currency_pair={}&account={}", self.symbol, self.account.as_str());

        match self.rest.execute(Method::DELETE, &path, &query, None).await {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => {
                debug!(order_id, "Order already closed, nothing to cancel");
                Ok(())
            },
            Err(e) => Err(e),
        }
    }

    async fn subscribe_quote(&self, callback: QuoteCallback) -> ExchangeResult<()> {
        let time = chrono::Utc::now().timestamp();
        let spec = StreamSpec {
            topic: QUOTE_CHANNEL.to_string(),
            url: self.config.ws_url.clone(),
            subscribe: self.subscribe_message(QUOTE_CHANNEL, time),
            keepalive: None,
        };

        let decoder = GateQuoteDecoder {
            symbol: self.symbol.clone(),
        };
        stream::subscribe(&self.registry, spec, decoder, callback).await
    }

    async fn subscribe_order(&self, callback: OrderCallback) -> ExchangeResult<()> {
        let time = chrono::Utc::now().timestamp();
        let sign = self.signer.sign_channel(ORDER_CHANNEL, "subscribe", time)?;

        let mut subscribe = self.subscribe_message(ORDER_CHANNEL, time);
        subscribe["auth"] = json!({
            "method": "api_key",
            "KEY": self.signer.key(),
            "SIGN": sign,
        });

        let spec = StreamSpec {
            topic: ORDER_CHANNEL.to_string(),
            url: self.config.ws_url.clone(),
            subscribe,
            keepalive: None,
        };

        let decoder = GateOrderDecoder {
            symbol: self.symbol.clone(),
            terminal: TerminalOrders::default(),
        };
        stream::subscribe(&self.registry, spec, decoder, callback).await
    }

    fn close(&self) {
        self.registry.close();
    }
}

impl Drop for GateExchange {
    fn drop(&mut self) {
        self.registry.close();
    }
}

fn is_not_found(error: &ExchangeError) -> bool {
    error
        .remote_code()
        .is_some_and(|code| NOT_FOUND_LABELS.contains(&code))
}

// =============================================================================
// Stream decoders
// =============================================================================

fn is_update(frame: &Value, channel: &str) -> bool {
    frame.get("event").and_then(Value::as_str) == Some("update")
        && frame.get("channel").and_then(Value::as_str) == Some(channel)
}

/// `spot.book_ticker` updates to `Quote`.
struct GateQuoteDecoder {
    symbol: String,
}

impl FrameDecoder for GateQuoteDecoder {
    type Event = Quote;

    fn decode(&mut self, frame: &Value) -> Vec<Quote> {
        if !is_update(frame, QUOTE_CHANNEL) {
            return Vec::new();
        }

        match GateBookTicker::deserialize(&frame["result"]) {
            Ok(ticker) if ticker.s.is_empty() || ticker.s == self.symbol => {
                vec![Quote::new(ticker.b, ticker.a, TimeUnit::Millis.to_micros(ticker.t))]
            },
            Ok(ticker) => {
                debug!(symbol = %ticker.s, "Ignoring ticker for other symbol");
                Vec::new()
            },
            Err(e) => {
                warn!(error = %e, "Malformed book ticker");
                Vec::new()
            },
        }
    }
}

/// `spot.orders` updates to `Order`, filtered to the adapter's pair.
struct GateOrderDecoder {
    symbol: String,
    terminal: TerminalOrders,
}

impl FrameDecoder for GateOrderDecoder {
    type Event = Order;

    fn decode(&mut self, frame: &Value) -> Vec<Order> {
        if !is_update(frame, ORDER_CHANNEL) {
            return Vec::new();
        }

        let Some(entries) = frame["result"].as_array() else {
            warn!("Order update without result array");
            return Vec::new();
        };

        let mut orders = Vec::with_capacity(entries.len());
        for entry in entries {
            let update = match GateOrder::deserialize(entry) {
                Ok(update) => update,
                Err(e) => {
                    warn!(error = %e, "Malformed order update");
                    continue;
                },
            };
            if update.currency_pair != self.symbol {
                continue;
            }

            let closed = update.event == TERMINAL_EVENT;
            let order = update.into_order(closed);
            if self.terminal.admit(&order) {
                orders.push(order);
            } else {
                debug!(order_id = %order.id, "Dropping stale update for closed order");
            }
        }
        orders
    }
}

// =============================================================================
// Gate Types (from API responses)
// =============================================================================

/// Spot account balance.
#[derive(Debug, Deserialize)]
struct GateBalance {
    currency: String,
    available: Decimal,
    locked: Decimal,
}

/// Order as listed by REST and pushed on `spot.orders`.
#[derive(Debug, Deserialize)]
struct GateOrder {
    id: String,
    currency_pair: String,
    side: String,
    price: Decimal,
    amount: Decimal,
    /// Unfilled size; absent means nothing filled
    #[serde(default)]
    left: Option<Decimal>,
    /// REST status (`open`, `closed`, `cancelled`)
    #[serde(default)]
    status: String,
    /// Stream event (`put`, `update`, `finish`)
    #[serde(default)]
    event: String,
}

impl GateOrder {
    fn into_order(self, closed: bool) -> Order {
        let left = self.left.unwrap_or(self.amount);
        Order::from_remaining(
            self.id,
            OrderSide::from_venue(&self.side),
            self.price,
            self.amount,
            left,
            closed,
        )
    }
}

/// Place order response.
#[derive(Debug, Deserialize)]
struct GatePlacedOrder {
    id: String,
}

/// `spot.book_ticker` result.
#[derive(Debug, Deserialize)]
struct GateBookTicker {
    /// Update time in milliseconds
    t: i64,
    /// Symbol
    #[serde(default)]
    s: String,
    /// Best bid
    b: Decimal,
    /// Best ask
    a: Decimal,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order_decoder() -> GateOrderDecoder {
        GateOrderDecoder {
            symbol: "BTC_USDT".to_string(),
            terminal: TerminalOrders::default(),
        }
    }

    fn order_frame(entries: Value) -> Value {
        json!({
            "time": 1_700_000_000,
            "channel": "spot.orders",
            "event": "update",
            "result": entries,
        })
    }

    #[test]
    fn test_symbol_and_account() {
        let gate = GateExchange::new("btc.usdt", Credentials::new("k", "s")).unwrap();

        assert_eq!(gate.symbol(), "BTC_USDT");
        assert_eq!(gate.account, GateAccount::Spot);
        assert_eq!(gate.with_account(GateAccount::CrossMargin).account.as_str(), "cross_margin");
        assert_eq!(GateAccount::parse("spot"), Some(GateAccount::Spot));
        assert_eq!(GateAccount::parse("futures"), None);
    }

    #[test]
    fn test_invalid_pair_rejected() {
        assert!(matches!(
            GateExchange::new("btcusdt", Credentials::new("k", "s")),
            Err(ExchangeError::InvalidPair(_))
        ));
    }

    #[test]
    fn test_quote_decoder() {
        let mut decoder = GateQuoteDecoder {
            symbol: "BTC_USDT".to_string(),
        };
        let frame = json!({
            "time": 1_606_292_218,
            "channel": "spot.book_ticker",
            "event": "update",
            "result": {
                "t": 1_606_292_218_213_i64,
                "u": 48733182,
                "s": "BTC_USDT",
                "b": "19177.79",
                "B": "0.0003341504",
                "a": "19179.38",
                "A": "0.09"
            }
        });

        let quotes = decoder.decode(&frame);

        assert_eq!(
            quotes,
            vec![Quote::new(dec!(19177.79), dec!(19179.38), 1_606_292_218_213_000)]
        );
    }

    #[test]
    fn test_quote_decoder_ignores_acks() {
        let mut decoder = GateQuoteDecoder {
            symbol: "BTC_USDT".to_string(),
        };
        let ack = json!({
            "time": 1_606_292_218,
            "channel": "spot.book_ticker",
            "event": "subscribe",
            "result": {"status": "success"}
        });

        assert!(decoder.decode(&ack).is_empty());
    }

    #[test]
    fn test_order_decoder_terminal_and_filled() {
        let mut decoder = order_decoder();
        let frame = order_frame(json!([
            {
                "id": "42", "currency_pair": "BTC_USDT", "side": "buy",
                "price": "5000", "amount": "0.01", "left": "0.00", "event": "finish"
            },
            {
                "id": "43", "currency_pair": "BTC_USDT", "side": "sell",
                "price": "6000", "amount": "0.02", "left": "0.015", "event": "update"
            }
        ]));

        let orders = decoder.decode(&frame);

        assert_eq!(orders.len(), 2);
        assert_eq!(
            orders[0],
            Order::new("42", OrderSide::Buy, dec!(5000), dec!(0.01), dec!(0.01), true)
        );
        assert!(!orders[1].closed);
        assert_eq!(orders[1].filled, dec!(0.005));
        assert_eq!(orders[1].side, OrderSide::Sell);
    }

    #[test]
    fn test_order_decoder_filters_other_pairs() {
        let mut decoder = order_decoder();
        let frame = order_frame(json!([
            {
                "id": "1", "currency_pair": "ETH_USDT", "side": "buy",
                "price": "2000", "amount": "1", "left": "1", "event": "put"
            }
        ]));

        assert!(decoder.decode(&frame).is_empty());
    }

    #[test]
    fn test_order_decoder_never_reopens() {
        let mut decoder = order_decoder();
        let finish = order_frame(json!([{
            "id": "7", "currency_pair": "BTC_USDT", "side": "buy",
            "price": "1", "amount": "1", "left": "0", "event": "finish"
        }]));
        let late = order_frame(json!([{
            "id": "7", "currency_pair": "BTC_USDT", "side": "buy",
            "price": "1", "amount": "1", "left": "0.5", "event": "update"
        }]));

        assert_eq!(decoder.decode(&finish).len(), 1);
        assert!(decoder.decode(&late).is_empty());
    }

    #[test]
    fn test_not_found_labels() {
        let not_found = ExchangeError::RemoteApi {
            status: 404,
            code: "ORDER_NOT_FOUND".to_string(),
            body: String::new(),
        };
        let other = ExchangeError::RemoteApi {
            status: 401,
            code: "INVALID_SIGNATURE".to_string(),
            body: String::new(),
        };

        assert!(is_not_found(&not_found));
        assert!(!is_not_found(&other));
        assert!(!is_not_found(&ExchangeError::Timeout));
    }
}
