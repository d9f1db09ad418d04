//! Marketplace REST collaborators
//!
//! The engines see only a byte channel and a status lookup; everything
//! HTTP-shaped lives here.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::Stream;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use sonar_core::{OperationId, OperationState, PollError, StatusReport, StatusSource};

use crate::config::CliConfig;

/// Total budget for one-shot requests; the chat stream is exempt and
/// bounded by the session's idle timeout instead
const ONESHOT_TIMEOUT: Duration = Duration::from_secs(10);

/// REST client for the endpoints the commands use
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: String,
    api_key: Option<String>,
}

impl ApiClient {
    pub fn new(config: &CliConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            http,
            base: config.server.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut request = self.http.request(method, format!("{}{}", self.base, path));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        request
    }

    /// POST the prompt and return the raw event-stream byte channel
    pub async fn open_chat_stream(
        &self,
        prompt: &str,
    ) -> Result<impl Stream<Item = reqwest::Result<bytes::Bytes>> + Unpin> {
        let response = self
            .request(reqwest::Method::POST, "/api/chat/stream")
            .json(&json!({ "message": prompt }))
            .send()
            .await
            .context("opening generation stream")?
            .error_for_status()
            .context("generation request rejected")?;
        Ok(response.bytes_stream())
    }

    /// Create a recharge order; `request_id` de-duplicates retries server-side
    pub async fn create_order(
        &self,
        amount_cents: u64,
        method: &str,
        request_id: &str,
    ) -> Result<OrderCreated> {
        let response = self
            .request(reqwest::Method::POST, "/api/orders")
            .timeout(ONESHOT_TIMEOUT)
            .json(&json!({
                "amount_cents": amount_cents,
                "method": method,
                "request_id": request_id,
            }))
            .send()
            .await
            .context("creating order")?
            .error_for_status()
            .context("order request rejected")?;
        response.json().await.context("decoding order response")
    }
}

/// Response to order creation
#[derive(Debug, Deserialize)]
pub struct OrderCreated {
    pub order_id: String,
    /// Link the payer scans, when the method uses a QR code
    #[serde(default)]
    pub qr_url: Option<String>,
}

/// Status payload returned by the order status endpoint
#[derive(Debug, Deserialize)]
struct WireStatus {
    status: String,
    #[serde(default)]
    message: Option<String>,
}

#[async_trait]
impl StatusSource for ApiClient {
    async fn fetch(&self, id: &OperationId) -> Result<StatusReport, PollError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/api/orders/{}/status", id),
            )
            .timeout(ONESHOT_TIMEOUT)
            .send()
            .await
            .map_err(|e| PollError::transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PollError::Http {
                status: status.as_u16(),
            });
        }

        let wire: WireStatus = response
            .json()
            .await
            .map_err(|e| PollError::decode(e.to_string()))?;

        debug!("Order {} reported `{}`", id, wire.status);
        let state = OperationState::from_wire(&wire.status)
            .ok_or_else(|| PollError::UnknownStatus(wire.status.clone()))?;

        Ok(StatusReport {
            state,
            detail: wire.message,
        })
    }
}
