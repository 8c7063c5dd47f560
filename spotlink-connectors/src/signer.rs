//! Venue request signers.
//!
//! Each venue signs a different canonical string with a different MAC:
//!
//! | Venue  | Canonical string                                   | MAC         | Encoding | Clock |
//! |--------|----------------------------------------------------|-------------|----------|-------|
//! | Gate   | `METHOD\nPATH\nQUERY\nhex(SHA512(body))\nTS`       | HMAC-SHA512 | hex      | s     |
//! | KuCoin | `TS + METHOD + PATH[?QUERY] + BODY`                | HMAC-SHA256 | base64   | ms    |
//!
//! Any deviation in the canonical string invalidates the signature, and the
//! venue then rejects the request as unauthenticated.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha512};

use spotlink_domain::{Credentials, ExchangeError, ExchangeResult};

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

/// Header name/value pairs produced by a signer.
pub type SignedHeaders = Vec<(&'static str, String)>;

/// Everything that goes into a request signature.
#[derive(Debug, Clone, Copy)]
pub struct SignInput<'a> {
    /// Uppercase HTTP method
    pub method: &'a str,
    /// Request path, including the API version prefix
    pub path: &'a str,
    /// Raw query string without the leading `?`
    pub query: &'a str,
    /// Exact body bytes that will be sent
    pub body: &'a str,
    /// Timestamp in the venue's resolution
    pub timestamp: i64,
}

/// Turns a request description into authentication headers.
pub trait RequestSigner: Send + Sync {
    /// Current time in the venue's expected resolution.
    fn timestamp(&self) -> i64;

    /// The exact string the venue expects to be signed.
    fn canonical_string(&self, input: &SignInput<'_>) -> String;

    /// Authentication headers for the request.
    fn sign(&self, input: &SignInput<'_>) -> ExchangeResult<SignedHeaders>;
}

fn hmac_sha512_hex(secret: &str, message: &str) -> ExchangeResult<String> {
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
        .map_err(|e| ExchangeError::Signing(format!("HMAC error: {}", e)))?;
    mac.update(message.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn hmac_sha256_base64(secret: &str, message: &str) -> ExchangeResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ExchangeError::Signing(format!("HMAC error: {}", e)))?;
    mac.update(message.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

// =============================================================================
// Gate
// =============================================================================

/// Gate.io APIv4 signer.
pub struct GateSigner {
    credentials: Credentials,
}

impl GateSigner {
    /// Create a signer owning the given credentials.
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    /// API key sent alongside signatures.
    pub fn key(&self) -> &str {
        &self.credentials.key
    }

    /// Signature for an authenticated WebSocket channel request.
    ///
    /// Signs `channel=<channel>&event=<event>&time=<time>`.
    pub fn sign_channel(&self, channel: &str, event: &str, time: i64) -> ExchangeResult<String> {
        let message = format!("channel={}&event={}&time={}", channel, event, time);
        hmac_sha512_hex(&self.credentials.secret, &message)
    }
}

impl RequestSigner for GateSigner {
    fn timestamp(&self) -> i64 {
        Utc::now().timestamp()
    }

    fn canonical_string(&self, input: &SignInput<'_>) -> String {
        let hashed_body = hex::encode(Sha512::digest(input.body.as_bytes()));
        format!(
            "{}\n{}\n{}\n{}\n{}",
            input.method, input.path, input.query, hashed_body, input.timestamp
        )
    }

    fn sign(&self, input: &SignInput<'_>) -> ExchangeResult<SignedHeaders> {
        let signature = hmac_sha512_hex(&self.credentials.secret, &self.canonical_string(input))?;

        Ok(vec![
            ("KEY", self.credentials.key.clone()),
            ("Timestamp", input.timestamp.to_string()),
            ("SIGN", signature),
        ])
    }
}

// =============================================================================
// KuCoin
// =============================================================================

/// KuCoin API key version.
///
/// Version 2 keys send the passphrase HMAC-signed with the secret instead of
/// in clear text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyVersion {
    /// Plain passphrase
    #[default]
    V1,
    /// Signed passphrase, `KC-API-KEY-VERSION: 2`
    V2,
}

/// KuCoin REST signer.
pub struct KucoinSigner {
    credentials: Credentials,
    key_version: KeyVersion,
}

impl KucoinSigner {
    /// Create a signer for a version 1 key.
    pub fn new(credentials: Credentials) -> Self {
        Self::with_key_version(credentials, KeyVersion::V1)
    }

    /// Create a signer for the given key version.
    pub fn with_key_version(credentials: Credentials, key_version: KeyVersion) -> Self {
        Self {
            credentials,
            key_version,
        }
    }

    fn passphrase_header(&self) -> ExchangeResult<String> {
        match self.key_version {
            KeyVersion::V1 => Ok(self.credentials.passphrase().to_string()),
            KeyVersion::V2 => {
                hmac_sha256_base64(&self.credentials.secret, self.credentials.passphrase())
            },
        }
    }
}

impl RequestSigner for KucoinSigner {
    fn timestamp(&self) -> i64 {
        Utc::now().timestamp_millis()
    }

    fn canonical_string(&self, input: &SignInput<'_>) -> String {
        let mut message = format!("{}{}{}", input.timestamp, input.method, input.path);
        if !input.query.is_empty() {
            message.push('?');
            message.push_str(input.query);
        }
        message.push_str(input.body);
        message
    }

    fn sign(&self, input: &SignInput<'_>) -> ExchangeResult<SignedHeaders> {
        let signature =
            hmac_sha256_base64(&self.credentials.secret, &self.canonical_string(input))?;

        let mut headers = vec![
            ("KC-API-KEY", self.credentials.key.clone()),
            ("KC-API-SIGN", signature),
            ("KC-API-TIMESTAMP", input.timestamp.to_string()),
            ("KC-API-PASSPHRASE", self.passphrase_header()?),
        ];
        if self.key_version == KeyVersion::V2 {
            headers.push(("KC-API-KEY-VERSION", "2".to_string()));
        }
        Ok(headers)
    }
}

// =============================================================================
// Tests
// =============================================================================
