//! Trading pair identifiers.
//!
//! Callers name pairs as `base.quote` (e.g. `btc.usdt`). Each venue renders
//! the pair uppercase with its own separator.

use std::fmt;
use std::str::FromStr;

use crate::error::ExchangeError;

/// A validated `base.quote` trading pair, stored uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TradingPair {
    base: String,
    quote: String,
}

impl TradingPair {
    /// Parse a dot-separated pair identifier.
    ///
    /// # Errors
    /// Returns `ExchangeError::InvalidPair` unless the input is exactly two
    /// non-empty parts separated by `.`.
    pub fn parse(identifier: &str) -> Result<Self, ExchangeError> {
        let mut parts = identifier.trim().split('.');
        let (base, quote) = match (parts.next(), parts.next(), parts.next()) {
            (Some(base), Some(quote), None) if !base.is_empty() && !quote.is_empty() => {
                (base, quote)
            },
            _ => return Err(ExchangeError::InvalidPair(identifier.to_string())),
        };

        Ok(Self {
            base: base.to_uppercase(),
            quote: quote.to_uppercase(),
        })
    }

    /// Base currency token (e.g. `BTC`).
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Quote currency token (e.g. `USDT`).
    pub fn quote(&self) -> &str {
        &self.quote
    }

    /// Venue symbol using the given separator (e.g. `BTC_USDT`).
    pub fn symbol(&self, separator: char) -> String {
        format!("{}{}{}", self.base, separator, self.quote)
    }
}

impl FromStr for TradingPair {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TradingPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.base, self.quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_render() {
        let pair = TradingPair::parse("btc.usdt").unwrap();

        assert_eq!(pair.base(), "BTC");
        assert_eq!(pair.quote(), "USDT");
        assert_eq!(pair.symbol('_'), "BTC_USDT");
        assert_eq!(pair.symbol('-'), "BTC-USDT");
        assert_eq!(pair.to_string(), "BTC.USDT");
    }

    #[test]
    fn test_rejects_malformed_identifiers() {
        for bad in ["btcusdt", "btc.", ".usdt", "btc.usdt.eth", ""] {
            assert!(
                matches!(TradingPair::parse(bad), Err(ExchangeError::InvalidPair(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_from_str() {
        let pair: TradingPair = "eth.btc".parse().unwrap();
        assert_eq!(pair.symbol('_'), "ETH_BTC");
    }
}
