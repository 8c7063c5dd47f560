//! Exchange API credentials.
//!
//! # Security Model
//!
//! - Secret and passphrase are zeroized when dropped
//! - `Debug` output never prints secret material
//! - Credentials are owned by a single adapter instance

use std::env;
use std::fmt;

use zeroize::Zeroizing;

use crate::error::ExchangeError;

/// API key, secret and optional passphrase for one venue account.
#[derive(Clone)]
pub struct Credentials {
    /// API Key (public identifier)
    pub key: String,
    /// API Secret (HMAC key)
    pub secret: Zeroizing<String>,
    /// Passphrase chosen when the key was created (venue-specific)
    pub passphrase: Option<Zeroizing<String>>,
}

impl Credentials {
    /// Create credentials without a passphrase.
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secret: Zeroizing::new(secret.into()),
            passphrase: None,
        }
    }

    /// Attach a passphrase.
    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(Zeroizing::new(passphrase.into()));
        self
    }

    /// Passphrase, or an empty string when none was supplied.
    pub fn passphrase(&self) -> &str {
        self.passphrase.as_deref().map(String::as_str).unwrap_or("")
    }

    /// Load credentials from `{prefix}_KEY`, `{prefix}_SECRET` and the optional
    /// `{prefix}_PASSPHRASE` environment variables.
    ///
    /// A `.env` file is loaded first if present.
    ///
    /// # Errors
    /// Returns `ExchangeError::Config` if key or secret is missing.
    pub fn from_env(prefix: &str) -> Result<Self, ExchangeError> {
        let _ = dotenvy::dotenv();

        let read = |name: &str| -> Result<String, ExchangeError> {
            let var = format!("{}_{}", prefix, name);
            env::var(&var).map_err(|_| ExchangeError::Config(format!("Missing {}", var)))
        };

        let credentials = Self::new(read("KEY")?, read("SECRET")?);
        Ok(match env::var(format!("{}_PASSPHRASE", prefix)) {
            Ok(passphrase) => credentials.with_passphrase(passphrase),
            Err(_) => credentials,
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("key", &self.key)
            .field("secret", &"***")
            .field("passphrase", &self.passphrase.as_ref().map(|_| "***"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secret() {
        let creds = Credentials::new("my_key", "my_secret").with_passphrase("my_pass");
        let printed = format!("{:?}", creds);

        assert!(printed.contains("my_key"));
        assert!(!printed.contains("my_secret"));
        assert!(!printed.contains("my_pass"));
    }

    #[test]
    fn test_passphrase_defaults_to_empty() {
        let creds = Credentials::new("k", "s");
        assert_eq!(creds.passphrase(), "");
        assert_eq!(creds.with_passphrase("p").passphrase(), "p");
    }

    #[test]
    fn test_from_env() {
        env::set_var("SPOTLINK_TEST_CREDS_KEY", "env_key");
        env::set_var("SPOTLINK_TEST_CREDS_SECRET", "env_secret");
        env::set_var("SPOTLINK_TEST_CREDS_PASSPHRASE", "env_pass");

        let creds = Credentials::from_env("SPOTLINK_TEST_CREDS").unwrap();
        assert_eq!(creds.key, "env_key");
        assert_eq!(creds.secret.as_str(), "env_secret");
        assert_eq!(creds.passphrase(), "env_pass");
    }

    #[test]
    fn test_from_env_missing_key() {
        let err = Credentials::from_env("SPOTLINK_TEST_ABSENT").unwrap_err();
        assert!(matches!(err, ExchangeError::Config(_)));
    }
}
