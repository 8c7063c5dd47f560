//! KuCoin spot adapter.
//!
//! REST: HMAC-SHA256/base64 signatures, `{code, data}` envelope.
//! WebSocket: a bullet token is fetched over REST before every connection
//! (public for market data, private for orders), and the connection needs an
//! application-level ping every 20 seconds.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Method, Url};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use spotlink_domain::{
    Credentials, Exchange, ExchangeError, ExchangeResult, LimitOrder, Order, OrderCallback,
    OrderSide, Quote, QuoteCallback, TimeUnit, TradingPair,
};

use crate::config::VenueConfig;
use crate::registry::ConnectionRegistry;
use crate::rest::{Envelope, RestClient, KUCOIN_SUCCESS_CODE};
use crate::signer::{KeyVersion, KucoinSigner};
use crate::stream::{self, FrameDecoder, StreamSpec, TerminalOrders};

// =============================================================================
// Constants
// =============================================================================

/// Separator between base and quote in KuCoin symbols
const SYMBOL_SEPARATOR: char = '-';

/// Top-5 depth topic prefix, followed by the symbol
const QUOTE_TOPIC_PREFIX: &str = "/spotMarket/level2Depth5:";

/// Private order change topic
const ORDER_TOPIC: &str = "/spotMarket/tradeOrders";

/// Order status marking a terminal state
const TERMINAL_STATUS: &str = "done";

/// Error code returned when cancelling an unknown or finished order
const NOT_FOUND_CODE: &str = "400100";

/// Message fragment accompanying `NOT_FOUND_CODE` for cancels
const NOT_FOUND_MESSAGE: &str = "order_not_exist";

/// Orders requested per page (venue maximum)
const ORDERS_PAGE_SIZE: u32 = 500;

/// Pages followed when listing open orders
const MAX_ORDER_PAGES: u32 = 20;

const ACCOUNTS_PATH: &str = "/api/v1/accounts";
const ORDERS_PATH: &str = "/api/v1/orders";
const BULLET_PUBLIC_PATH: &str = "/api/v1/bullet-public";
const BULLET_PRIVATE_PATH: &str = "/api/v1/bullet-private";

// =============================================================================
// KuCoin Exchange
// =============================================================================

/// KuCoin spot adapter bound to one trading pair.
pub struct KucoinExchange {
    /// Trading pair
    pair: TradingPair,
    /// Venue symbol (e.g. `BTC-USDT`)
    symbol: String,
    /// Endpoints and keep-alive interval
    config: VenueConfig,
    /// Signed REST client
    rest: RestClient,
    /// Open sockets
    registry: Arc<ConnectionRegistry>,
}

impl KucoinExchange {
    /// Create an adapter against the production endpoints.
    ///
    /// # Arguments
    ///
    /// * `pair` - Dot-separated pair identifier (e.g. `btc.usdt`)
    /// * `credentials` - API key, secret and passphrase
    pub fn new(pair: &str, credentials: Credentials) -> ExchangeResult<Self> {
        Self::with_config(pair, credentials, VenueConfig::kucoin())
    }

    /// Create an adapter against custom endpoints, for a version 1 key.
    pub fn with_config(
        pair: &str,
        credentials: Credentials,
        config: VenueConfig,
    ) -> ExchangeResult<Self> {
        Self::with_options(pair, credentials, config, KeyVersion::V1)
    }

    /// Create an adapter against custom endpoints for the given key version.
    pub fn with_options(
        pair: &str,
        credentials: Credentials,
        config: VenueConfig,
        key_version: KeyVersion,
    ) -> ExchangeResult<Self> {
        let pair = TradingPair::parse(pair)?;
        let signer = Arc::new(KucoinSigner::with_key_version(credentials, key_version));
        let rest = RestClient::new(
            config.rest_url.clone(),
            signer,
            Envelope::Coded {
                success: KUCOIN_SUCCESS_CODE,
            },
            config.request_timeout,
        );

        Ok(Self {
            symbol: pair.symbol(SYMBOL_SEPARATOR),
            pair,
            config,
            rest,
            registry: ConnectionRegistry::new(),
        })
    }

    /// Venue symbol (e.g. `BTC-USDT`).
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Sockets currently open.
    pub fn open_connections(&self) -> usize {
        self.registry.open_connections()
    }

    /// Fetch a bullet token and build the connect URL.
    ///
    /// The bullet also advertises a `pingInterval`; it is ignored and the
    /// keep-alive runs at `VenueConfig::ping_interval` instead.
    async fn connect_url(&self, private: bool) -> ExchangeResult<String> {
        let path = if private {
            BULLET_PRIVATE_PATH
        } else {
            BULLET_PUBLIC_PATH
        };
        let bullet: KucoinBullet = self.rest.call(Method::POST, path, "", None).await?;

        let endpoint = bullet
            .instance_servers
            .first()
            .map(|server| server.endpoint.as_str())
            .unwrap_or(self.config.ws_url.as_str());

        bullet_url(endpoint, &bullet.token, &Uuid::now_v7().simple().to_string())
    }

    fn subscribe_message(topic: &str, private: bool) -> Value {
        json!({
            "id": Utc::now().timestamp_nanos_opt().unwrap_or_default().to_string(),
            "type": "subscribe",
            "topic": topic,
            "privateChannel": private,
            "response": true,
        })
    }
}

#[async_trait]
impl Exchange for KucoinExchange {
    async fn get_info(&self) -> ExchangeResult<Decimal> {
        let query = format!("currency={}&type=trade", self.pair.base());
        let (accounts, raw): (Vec<KucoinAccount>, String) =
            self.rest.call_raw(Method::GET, ACCOUNTS_PATH, &query, None).await?;

        let mut total = Decimal::ZERO;
        for account in &accounts {
            if account.currency != self.pair.base() {
                return Err(ExchangeError::ProtocolMismatch(format!(
                    "expected currency {}, got {}: {}",
                    self.pair.base(),
                    account.currency,
                    raw
                )));
            }
            total += account.available + account.holds;
        }

        debug!(currency = %self.pair.base(), %total, "Fetched balance");
        Ok(total)
    }

    async fn get_orders(&self) -> ExchangeResult<Vec<Order>> {
        let mut orders = Vec::new();
        let mut current_page = 1;

        loop {
            let query = format!(
                "status=active&symbol={}&currentPage={}&pageSize={}",
                self.symbol, current_page, ORDERS_PAGE_SIZE
            );
            let page: KucoinOrderPage =
                self.rest.call(Method::GET, ORDERS_PATH, &query, None).await?;
            let last_page = page.items.is_empty() || current_page >= page.total_page;

            orders.extend(
                page.items
                    .into_iter()
                    .filter(|order| order.symbol == self.symbol && order.is_active)
                    .map(|order| {
                        Order::new(
                            order.id,
                            OrderSide::from_venue(&order.side),
                            order.price,
                            order.size,
                            order.deal_size,
                            false,
                        )
                    }),
            );

            if last_page {
                break;
            }
            if current_page >= MAX_ORDER_PAGES {
                warn!(
                    pages = current_page,
                    total_pages = page.total_page,
                    "Open order listing truncated"
                );
                break;
            }
            current_page += 1;
        }

        Ok(orders)
    }

    async fn place_order(&self, order: &LimitOrder) -> ExchangeResult<String> {
        let body = json!({
            "clientOid": Uuid::now_v7().simple().to_string(),
            "side": order.side.as_str(),
            "symbol": self.symbol,
            "type": "limit",
            "price": order.price.normalize().to_string(),
            "size": order.amount.normalize().to_string(),
            "postOnly": order.post_only,
        });

        let placed: KucoinPlacedOrder =
            self.rest.call(Method::POST, ORDERS_PATH, "", Some(&body)).await?;

        info!(order_id = %placed.order_id, symbol = %self.symbol, side = %order.side, "Order placed");
        Ok(placed.order_id)
    }

    async fn cancel_order(&self, order_id: &str) -> ExchangeResult<()> {
        let path = format!("{}/{}", ORDERS_PATH, order_id);

        match self.rest.execute(Method::DELETE, &path, "", None).await {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => {
                debug!(order_id, "Order already closed, nothing to cancel");
                Ok(())
            },
            Err(e) => Err(e),
        }
    }

    async fn subscribe_quote(&self, callback: QuoteCallback) -> ExchangeResult<()> {
        let url = self.connect_url(false).await?;
        let topic = format!("{}{}", QUOTE_TOPIC_PREFIX, self.symbol);

        let spec = StreamSpec {
            subscribe: Self::subscribe_message(&topic, false),
            topic: topic.clone(),
            url,
            keepalive: Some(self.config.ping_interval),
        };

        stream::subscribe(&self.registry, spec, KucoinQuoteDecoder { topic }, callback).await
    }

    async fn subscribe_order(&self, callback: OrderCallback) -> ExchangeResult<()> {
        let url = self.connect_url(true).await?;

        let spec = StreamSpec {
            topic: ORDER_TOPIC.to_string(),
            url,
            subscribe: Self::subscribe_message(ORDER_TOPIC, true),
            keepalive: Some(self.config.ping_interval),
        };

        let decoder = KucoinOrderDecoder {
            symbol: self.symbol.clone(),
            terminal: TerminalOrders::default(),
        };
        stream::subscribe(&self.registry, spec, decoder, callback).await
    }

    fn close(&self) {
        self.registry.close();
    }
}

impl Drop for KucoinExchange {
    fn drop(&mut self) {
        self.registry.close();
    }
}

/// `endpoint` with `token` and `connectId` appended as query parameters.
fn bullet_url(endpoint: &str, token: &str, connect_id: &str) -> ExchangeResult<String> {
    let mut url = Url::parse(endpoint).map_err(|e| {
        ExchangeError::ProtocolMismatch(format!("invalid bullet endpoint {}: {}", endpoint, e))
    })?;
    url.query_pairs_mut()
        .append_pair("token", token)
        .append_pair("connectId", connect_id);
    Ok(url.into())
}

fn is_not_found(error: &ExchangeError) -> bool {
    match error {
        ExchangeError::RemoteApi { code, body, .. } => {
            code == NOT_FOUND_CODE && body.contains(NOT_FOUND_MESSAGE)
        },
        _ => false,
    }
}

// =============================================================================
// Stream decoders
// =============================================================================

fn topic_of(frame: &Value) -> Option<&str> {
    frame.get("topic").and_then(Value::as_str)
}

/// Top of `level2Depth5` to `Quote`.
struct KucoinQuoteDecoder {
    topic: String,
}

impl FrameDecoder for KucoinQuoteDecoder {
    type Event = Quote;

    fn decode(&mut self, frame: &Value) -> Vec<Quote> {
        if topic_of(frame) != Some(self.topic.as_str()) {
            return Vec::new();
        }

        let depth = match KucoinDepth::deserialize(&frame["data"]) {
            Ok(depth) => depth,
            Err(e) => {
                warn!(error = %e, "Malformed depth snapshot");
                return Vec::new();
            },
        };

        match (depth.bids.first(), depth.asks.first()) {
            (Some(bid), Some(ask)) => {
                vec![Quote::new(bid.0, ask.0, TimeUnit::Millis.to_micros(depth.timestamp))]
            },
            _ => {
                debug!("Depth snapshot with an empty side");
                Vec::new()
            },
        }
    }
}

/// `tradeOrders` changes to `Order`, filtered to the adapter's symbol.
struct KucoinOrderDecoder {
    symbol: String,
    terminal: TerminalOrders,
}

impl FrameDecoder for KucoinOrderDecoder {
    type Event = Order;

    fn decode(&mut self, frame: &Value) -> Vec<Order> {
        if topic_of(frame) != Some(ORDER_TOPIC) {
            return Vec::new();
        }

        let change = match KucoinOrderChange::deserialize(&frame["data"]) {
            Ok(change) => change,
            Err(e) => {
                warn!(error = %e, "Malformed order change");
                return Vec::new();
            },
        };
        if change.symbol != self.symbol {
            return Vec::new();
        }

        let order = change.into_order();
        if self.terminal.admit(&order) {
            vec![order]
        } else {
            debug!(order_id = %order.id, "Dropping stale update for closed order");
            Vec::new()
        }
    }
}

// =============================================================================
// KuCoin Types (from API responses)
// =============================================================================

/// Trade account balance.
#[derive(Debug, Deserialize)]
struct KucoinAccount {
    currency: String,
    available: Decimal,
    holds: Decimal,
}

/// Page of orders.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KucoinOrderPage {
    #[serde(default)]
    total_page: u32,
    #[serde(default)]
    items: Vec<KucoinOrder>,
}

/// Order as listed by REST.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KucoinOrder {
    id: String,
    symbol: String,
    side: String,
    price: Decimal,
    size: Decimal,
    #[serde(default)]
    deal_size: Decimal,
    #[serde(default = "default_true")]
    is_active: bool,
}

fn default_true() -> bool {
    true
}

/// Place order response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KucoinPlacedOrder {
    order_id: String,
}

/// Bullet token response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KucoinBullet {
    token: String,
    #[serde(default)]
    instance_servers: Vec<KucoinInstanceServer>,
}

#[derive(Debug, Deserialize)]
struct KucoinInstanceServer {
    endpoint: String,
}

/// One `[price, size]` book level.
#[derive(Debug, Deserialize)]
struct KucoinLevel(Decimal, #[allow(dead_code)] Decimal);

/// `level2Depth5` payload.
#[derive(Debug, Deserialize)]
struct KucoinDepth {
    asks: Vec<KucoinLevel>,
    bids: Vec<KucoinLevel>,
    /// Snapshot time in milliseconds
    timestamp: i64,
}

/// `orderChange` payload.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KucoinOrderChange {
    order_id: String,
    symbol: String,
    side: String,
    #[serde(default)]
    price: Decimal,
    #[serde(default)]
    size: Decimal,
    filled_size: Option<Decimal>,
    remain_size: Option<Decimal>,
    status: String,
}

impl KucoinOrderChange {
    fn into_order(self) -> Order {
        let filled = match (self.filled_size, self.remain_size) {
            (Some(filled), _) => filled,
            (None, Some(remain)) => self.size - remain,
            (None, None) => Decimal::ZERO,
        };
        Order::new(
            self.order_id,
            OrderSide::from_venue(&self.side),
            self.price,
            self.size,
            filled,
            self.status == TERMINAL_STATUS,
        )
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order_decoder() -> KucoinOrderDecoder {
        KucoinOrderDecoder {
            symbol: "BTC-USDT".to_string(),
            terminal: TerminalOrders::default(),
        }
    }

    fn order_frame(data: Value) -> Value {
        json!({
            "type": "message",
            "topic": "/spotMarket/tradeOrders",
            "subject": "orderChange",
            "channelType": "private",
            "data": data,
        })
    }

    #[test]
    fn test_bullet_url_without_path() {
        let url = bullet_url("ws://127.0.0.1:9000", "tok+/=", "abc").unwrap();
        assert_eq!(url, "ws://127.0.0.1:9000/?token=tok%2B%2F%3D&connectId=abc");
    }

    #[test]
    fn test_bullet_url_keeps_endpoint_path() {
        let url = bullet_url("wss://ws-api-spot.kucoin.com/", "tok", "abc").unwrap();
        assert_eq!(url, "wss://ws-api-spot.kucoin.com/?token=tok&connectId=abc");

        let url = bullet_url("wss://ws-api.kucoin.com/endpoint", "tok", "abc").unwrap();
        assert_eq!(url, "wss://ws-api.kucoin.com/endpoint?token=tok&connectId=abc");
    }

    #[test]
    fn test_bullet_url_rejects_garbage() {
        assert!(matches!(
            bullet_url("not a url", "tok", "abc"),
            Err(ExchangeError::ProtocolMismatch(_))
        ));
    }

    #[test]
    fn test_symbol() {
        let kucoin = KucoinExchange::new("btc.usdt", Credentials::new("k", "s")).unwrap();
        assert_eq!(kucoin.symbol(), "BTC-USDT");
    }

    #[test]
    fn test_quote_decoder() {
        let mut decoder = KucoinQuoteDecoder {
            topic: "/spotMarket/level2Depth5:BTC-USDT".to_string(),
        };
        let frame = json!({
            "type": "message",
            "topic": "/spotMarket/level2Depth5:BTC-USDT",
            "subject": "level2",
            "data": {
                "asks": [["9989", "8"], ["9990", "32"]],
                "bids": [["9988", "56"], ["9987", "15"]],
                "timestamp": 1_586_948_108_193_i64
            }
        });

        let quotes = decoder.decode(&frame);

        assert_eq!(quotes, vec![Quote::new(dec!(9988), dec!(9989), 1_586_948_108_193_000)]);
    }

    #[test]
    fn test_quote_decoder_ignores_control_frames() {
        let mut decoder = KucoinQuoteDecoder {
            topic: "/spotMarket/level2Depth5:BTC-USDT".to_string(),
        };

        assert!(decoder.decode(&json!({"id": "1", "type": "welcome"})).is_empty());
        assert!(decoder.decode(&json!({"id": "2", "type": "ack"})).is_empty());
        assert!(decoder.decode(&json!({"id": "3", "type": "pong"})).is_empty());
    }

    #[test]
    fn test_order_decoder_terminal() {
        let mut decoder = order_decoder();
        let frame = order_frame(json!({
            "symbol": "BTC-USDT",
            "orderType": "limit",
            "side": "buy",
            "orderId": "42",
            "type": "filled",
            "price": "5000",
            "size": "0.01",
            "filledSize": "0.01",
            "remainSize": "0",
            "status": "done"
        }));

        let orders = decoder.decode(&frame);

        assert_eq!(
            orders,
            vec![Order::new("42", OrderSide::Buy, dec!(5000), dec!(0.01), dec!(0.01), true)]
        );
    }

    #[test]
    fn test_order_decoder_open_uses_remaining_when_filled_missing() {
        let mut decoder = order_decoder();
        let frame = order_frame(json!({
            "symbol": "BTC-USDT",
            "side": "sell",
            "orderId": "9",
            "type": "match",
            "price": "5100",
            "size": "1",
            "remainSize": "0.25",
            "status": "match"
        }));

        let orders = decoder.decode(&frame);

        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].filled, dec!(0.75));
        assert!(!orders[0].closed);
        assert_eq!(orders[0].side, OrderSide::Sell);
    }

    #[test]
    fn test_order_decoder_filters_other_symbols() {
        let mut decoder = order_decoder();
        let frame = order_frame(json!({
            "symbol": "ETH-USDT",
            "side": "buy",
            "orderId": "1",
            "price": "2000",
            "size": "1",
            "filledSize": "0",
            "status": "open"
        }));

        assert!(decoder.decode(&frame).is_empty());
    }

    #[test]
    fn test_not_found_cancel() {
        let not_found = ExchangeError::RemoteApi {
            status: 200,
            code: "400100".to_string(),
            body: r#"{"code":"400100","msg":"order_not_exist_or_not_allow_to_cancel"}"#.to_string(),
        };
        let bad_param = ExchangeError::RemoteApi {
            status: 200,
            code: "400100".to_string(),
            body: r#"{"code":"400100","msg":"Parameter error"}"#.to_string(),
        };

        assert!(is_not_found(&not_found));
        assert!(!is_not_found(&bad_param));
    }
}
