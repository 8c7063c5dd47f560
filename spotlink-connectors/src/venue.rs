//! Venue selection and adapter construction.

use std::env;
use std::fmt;
use std::str::FromStr;

use spotlink_domain::{Credentials, Exchange, ExchangeError, ExchangeResult};

use crate::config::VenueConfig;
use crate::gate::{GateAccount, GateExchange};
use crate::kucoin::KucoinExchange;
use crate::signer::KeyVersion;

/// Supported venues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Venue {
    /// Gate.io spot
    Gate,
    /// KuCoin spot
    Kucoin,
}

impl Venue {
    /// Get the venue name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Venue::Gate => "gate",
            Venue::Kucoin => "kucoin",
        }
    }

    /// Prefix of this venue's environment variables.
    pub fn env_prefix(&self) -> &'static str {
        match self {
            Venue::Gate => "SPOTLINK_GATE",
            Venue::Kucoin => "SPOTLINK_KUCOIN",
        }
    }

    /// Production endpoints.
    pub fn default_config(&self) -> VenueConfig {
        match self {
            Venue::Gate => VenueConfig::gate(),
            Venue::Kucoin => VenueConfig::kucoin(),
        }
    }
}

impl FromStr for Venue {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gate" | "gateio" => Ok(Venue::Gate),
            "kucoin" => Ok(Venue::Kucoin),
            other => Err(ExchangeError::Config(format!(
                "Unknown venue: {}. Expected: gate, kucoin",
                other
            ))),
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build an adapter against the venue's production endpoints.
pub fn connect(
    venue: Venue,
    pair: &str,
    credentials: Credentials,
) -> ExchangeResult<Box<dyn Exchange>> {
    Ok(match venue {
        Venue::Gate => Box::new(GateExchange::new(pair, credentials)?),
        Venue::Kucoin => Box::new(KucoinExchange::new(pair, credentials)?),
    })
}

/// Build an adapter with endpoint and account overrides read from the
/// environment.
///
/// Besides the `VenueConfig::from_env` variables this reads
/// `SPOTLINK_GATE_ACCOUNT` (`spot`, `cross_margin`) and
/// `SPOTLINK_KUCOIN_KEY_VERSION` (`1`, `2`).
pub fn connect_from_env(
    venue: Venue,
    pair: &str,
    credentials: Credentials,
) -> ExchangeResult<Box<dyn Exchange>> {
    let prefix = venue.env_prefix();
    let config = VenueConfig::from_env(prefix, venue.default_config())?;

    Ok(match venue {
        Venue::Gate => {
            let account = match env::var(format!("{}_ACCOUNT", prefix)) {
                Ok(name) => GateAccount::parse(&name).ok_or_else(|| {
                    ExchangeError::Config(format!("Invalid {}_ACCOUNT: {}", prefix, name))
                })?,
                Err(_) => GateAccount::default(),
            };
            Box::new(GateExchange::with_config(pair, credentials, config)?.with_account(account))
        },
        Venue::Kucoin => {
            let key_version = match env::var(format!("{}_KEY_VERSION", prefix)).as_deref() {
                Ok("1") | Err(_) => KeyVersion::V1,
                Ok("2") => KeyVersion::V2,
                Ok(other) => {
                    return Err(ExchangeError::Config(format!(
                        "Invalid {}_KEY_VERSION: {}",
                        prefix, other
                    )))
                },
            };
            Box::new(KucoinExchange::with_options(pair, credentials, config, key_version)?)
        },
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_venue_parse_and_display() {
        assert_eq!("gate".parse::<Venue>().unwrap(), Venue::Gate);
        assert_eq!("KuCoin".parse::<Venue>().unwrap(), Venue::Kucoin);
        assert!(matches!("binance".parse::<Venue>(), Err(ExchangeError::Config(_))));
        assert_eq!(Venue::Kucoin.to_string(), "kucoin");
    }

    #[test]
    fn test_connect_builds_both_venues() {
        let gate = connect(Venue::Gate, "btc.usdt", Credentials::new("k", "s"));
        let kucoin = connect(Venue::Kucoin, "btc.usdt", Credentials::new("k", "s"));

        assert!(gate.is_ok());
        assert!(kucoin.is_ok());
    }

    #[test]
    fn test_connect_rejects_bad_pair() {
        assert!(matches!(
            connect(Venue::Kucoin, "btc-usdt", Credentials::new("k", "s")),
            Err(ExchangeError::InvalidPair(_))
        ));
    }
}
