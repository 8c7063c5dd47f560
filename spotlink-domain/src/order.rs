//! Order Types
//!
//! Canonical order snapshot shared by REST listings and order streams, plus
//! the limit-order request submitted through `Exchange::place_order`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Order Side
// =============================================================================

/// Direction of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    /// Buy the base currency
    Buy,
    /// Sell the base currency
    Sell,
}

impl OrderSide {
    /// Map a venue side string. Anything other than `buy` is a sell.
    pub fn from_venue(side: &str) -> Self {
        if side.eq_ignore_ascii_case("buy") {
            OrderSide::Buy
        } else {
            OrderSide::Sell
        }
    }

    /// Lowercase wire name used by both supported venues.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }

    /// True for buy orders.
    pub fn is_buy(&self) -> bool {
        matches!(self, OrderSide::Buy)
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Order
// =============================================================================

/// Snapshot of an order as last reported by the venue.
///
/// # Invariants
/// - `0 <= filled <= amount`
/// - Updates replace the whole snapshot; fields are never patched in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Venue order id
    pub id: String,
    /// Order side
    pub side: OrderSide,
    /// Limit price
    pub price: Decimal,
    /// Original size
    pub amount: Decimal,
    /// Executed size
    pub filled: Decimal,
    /// Venue reported a terminal state (fully filled or cancelled)
    pub closed: bool,
}

impl Order {
    /// Create an order snapshot, clamping `filled` into `[0, amount]`.
    pub fn new(
        id: impl Into<String>,
        side: OrderSide,
        price: Decimal,
        amount: Decimal,
        filled: Decimal,
        closed: bool,
    ) -> Self {
        let amount = amount.max(Decimal::ZERO);
        let filled = filled.max(Decimal::ZERO).min(amount);
        Self {
            id: id.into(),
            side,
            price,
            amount,
            filled,
            closed,
        }
    }

    /// Create a snapshot from the venue's remaining size instead of its filled size.
    pub fn from_remaining(
        id: impl Into<String>,
        side: OrderSide,
        price: Decimal,
        amount: Decimal,
        remaining: Decimal,
        closed: bool,
    ) -> Self {
        Self::new(id, side, price, amount, amount - remaining, closed)
    }

    /// True for buy orders.
    pub fn is_buy(&self) -> bool {
        self.side.is_buy()
    }

    /// Size still open on the book.
    pub fn remaining(&self) -> Decimal {
        self.amount - self.filled
    }
}

// =============================================================================
// Limit Order Request
// =============================================================================

/// Limit order submitted through `Exchange::place_order`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitOrder {
    /// Order side
    pub side: OrderSide,
    /// Limit price
    pub price: Decimal,
    /// Size in base currency
    pub amount: Decimal,
    /// Reject instead of taking liquidity (maker only)
    pub post_only: bool,
}

impl LimitOrder {
    /// Maker-only limit order.
    pub fn maker(side: OrderSide, price: Decimal, amount: Decimal) -> Self {
        Self {
            side,
            price,
            amount,
            post_only: true,
        }
    }

    /// Good-till-cancelled limit order that may take liquidity.
    pub fn taker(side: OrderSide, price: Decimal, amount: Decimal) -> Self {
        Self {
            side,
            price,
            amount,
            post_only: false,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
