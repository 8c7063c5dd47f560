//! Signed REST executor.
//!
//! One call is one HTTP round trip: sign, send, read the full body, unwrap
//! the venue envelope. Nothing is retried. The client holds no mutable state
//! and can be shared across tasks.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tokio::time::timeout;
use tracing::debug;

use spotlink_domain::{ExchangeError, ExchangeResult};

use crate::signer::{RequestSigner, SignInput};

/// KuCoin success code
pub const KUCOIN_SUCCESS_CODE: &str = "200000";

/// How a venue wraps its response payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Envelope {
    /// Payload at top level; failures signalled by HTTP status and an
    /// optional `label` field.
    Bare,
    /// `{code, msg, data}`; any `code` other than `success` is a failure.
    Coded {
        /// Code that marks success
        success: &'static str,
    },
}

/// Unwrapped payload of a successful response.
#[derive(Debug, Clone)]
pub struct Payload {
    /// Payload with the envelope removed
    pub data: Value,
    /// Response body exactly as received
    pub raw: String,
}

impl Payload {
    /// Deserialize the payload; failures quote the raw body.
    pub fn decode<T: DeserializeOwned>(&self) -> ExchangeResult<T> {
        T::deserialize(&self.data)
            .map_err(|e| ExchangeError::Parse(format!("{}: {}", e, self.raw)))
    }
}

/// Signed REST client for a single venue.
#[derive(Clone)]
pub struct RestClient {
    /// HTTP client
    client: Client,
    /// Base URL, no trailing slash
    base_url: String,
    /// Venue signer
    signer: Arc<dyn RequestSigner>,
    /// Response envelope
    envelope: Envelope,
    /// Per-request timeout
    request_timeout: Duration,
}

impl RestClient {
    /// Create a client for the given base URL.
    pub fn new(
        base_url: impl Into<String>,
        signer: Arc<dyn RequestSigner>,
        envelope: Envelope,
        request_timeout: Duration,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            signer,
            envelope,
            request_timeout,
        }
    }

    /// Base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send one signed request and return the unwrapped payload.
    ///
    /// # Arguments
    ///
    /// * `method` - HTTP method
    /// * `path` - Path including API version (e.g. `/api/v4/spot/orders`)
    /// * `query` - Raw query string without `?`, may be empty
    /// * `body` - JSON body, serialized once so the signed bytes are the sent bytes
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        query: &str,
        body: Option<&Value>,
    ) -> ExchangeResult<Value> {
        self.fetch(method, path, query, body).await.map(|payload| payload.data)
    }

    /// Like `execute`, but also hands back the raw response body.
    pub async fn fetch(
        &self,
        method: Method,
        path: &str,
        query: &str,
        body: Option<&Value>,
    ) -> ExchangeResult<Payload> {
        let body = match body {
            Some(value) => serde_json::to_string(value)
                .map_err(|e| ExchangeError::Parse(format!("Failed to encode body: {}", e)))?,
            None => String::new(),
        };

        let headers = self.signer.sign(&SignInput {
            method: method.as_str(),
            path,
            query,
            body: &body,
            timestamp: self.signer.timestamp(),
        })?;

        let url = if query.is_empty() {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}{}?{}", self.base_url, path, query)
        };

        debug!(%method, %url, "Sending signed request");

        let mut request = self
            .client
            .request(method, &url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json");
        for (name, value) in headers {
            request = request.header(name, value);
        }
        if !body.is_empty() {
            request = request.body(body);
        }

        let response = timeout(self.request_timeout, request.send())
            .await
            .map_err(|_| ExchangeError::Timeout)?
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let text = timeout(self.request_timeout, response.text())
            .await
            .map_err(|_| ExchangeError::Timeout)?
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;

        debug!(status, bytes = text.len(), "Received response");

        let data = unwrap_envelope(self.envelope, status, &text)?;
        Ok(Payload { data, raw: text })
    }

    /// `execute` and deserialize the payload into `T`.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &str,
        body: Option<&Value>,
    ) -> ExchangeResult<T> {
        self.call_raw(method, path, query, body)
            .await
            .map(|(value, _)| value)
    }

    /// `call`, keeping the raw body for error reporting by the caller.
    pub async fn call_raw<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &str,
        body: Option<&Value>,
    ) -> ExchangeResult<(T, String)> {
        let payload = self.fetch(method, path, query, body).await?;
        let value = payload.decode()?;
        Ok((value, payload.raw))
    }
}

// =============================================================================
// Envelope handling
// =============================================================================

/// Gate-style error body.
#[derive(Debug, Deserialize)]
struct LabelledError {
    label: String,
}

/// KuCoin-style envelope.
#[derive(Debug, Deserialize)]
struct CodedEnvelope {
    code: String,
    #[serde(default)]
    data: Value,
}

fn unwrap_envelope(envelope: Envelope, status: u16, text: &str) -> ExchangeResult<Value> {
    let success_status = (200..300).contains(&status);

    match envelope {
        Envelope::Bare => {
            if !success_status {
                let code = serde_json::from_str::<LabelledError>(text)
                    .map(|e| e.label)
                    .unwrap_or_else(|_| status.to_string());
                return Err(ExchangeError::RemoteApi {
                    status,
                    code,
                    body: text.to_string(),
                });
            }
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            serde_json::from_str(text).map_err(|e| ExchangeError::Parse(format!("{}: {}", e, text)))
        },
        Envelope::Coded { success } => {
            let parsed = match serde_json::from_str::<CodedEnvelope>(text) {
                Ok(parsed) => parsed,
                Err(e) if success_status => {
                    return Err(ExchangeError::Parse(format!("{}: {}", e, text)))
                },
                Err(_) => {
                    return Err(ExchangeError::RemoteApi {
                        status,
                        code: status.to_string(),
                        body: text.to_string(),
                    })
                },
            };
            if parsed.code != success {
                return Err(ExchangeError::RemoteApi {
                    status,
                    code: parsed.code,
                    body: text.to_string(),
                });
            }
            Ok(parsed.data)
        },
    }
}

// =============================================================================
// Tests
// =============================================================================
