//! Market Data Types
//!
//! Canonical best-bid/best-ask snapshot delivered by quote streams.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Quote
// =============================================================================

/// Best bid / best ask snapshot.
///
/// Built fresh for every inbound market-data frame; no history is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Best bid price
    pub bid: Decimal,
    /// Best ask price
    pub ask: Decimal,
    /// Venue timestamp in microseconds since the Unix epoch
    pub timestamp_micros: i64,
}

impl Quote {
    /// Create a new quote.
    pub fn new(bid: Decimal, ask: Decimal, timestamp_micros: i64) -> Self {
        Self {
            bid,
            ask,
            timestamp_micros,
        }
    }

    /// Midpoint between bid and ask.
    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }

    /// Venue timestamp as a `DateTime`, if representable.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_micros(self.timestamp_micros)
    }
}

// =============================================================================
// Time Unit
// =============================================================================

/// Native resolution of a venue timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    /// Whole seconds
    Seconds,
    /// Milliseconds
    Millis,
    /// Microseconds
    Micros,
}

impl TimeUnit {
    /// Scale a timestamp in this unit to microseconds.
    pub fn to_micros(self, value: i64) -> i64 {
        match self {
            TimeUnit::Seconds => value.saturating_mul(1_000_000),
            TimeUnit::Millis => value.saturating_mul(1_000),
            TimeUnit::Micros => value,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_time_unit_scaling() {
        assert_eq!(TimeUnit::Seconds.to_micros(1_700_000_000), 1_700_000_000_000_000);
        assert_eq!(TimeUnit::Millis.to_micros(1_700_000_000_123), 1_700_000_000_123_000);
        assert_eq!(TimeUnit::Micros.to_micros(42), 42);
    }

    #[test]
    fn test_quote_mid_and_timestamp() {
        let quote = Quote::new(dec!(99), dec!(101), 1_700_000_000_123_000);

        assert_eq!(quote.mid(), dec!(100));
        let ts = quote.timestamp().unwrap();
        assert_eq!(ts.timestamp_millis(), 1_700_000_000_123);
    }
}
