//! HTTP transport for the control endpoint.
//!
//! Every call is one JSON-RPC 2.0 POST with a fresh numeric id. Anything
//! other than a well-formed, correlated response comes back as a transport
//! failure.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, trace};
use reqwest::Client;
use serde_json::Value;
use url::Url;

use super::envelope::{JsonRpcRequest, JsonRpcResponse};
use super::outcome::Failure;
use super::ControlRpc;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default connect timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Parse an endpoint, assuming `http://` when no scheme is given.
pub fn parse_endpoint(address: &str) -> anyhow::Result<Url> {
    let url = if address.starts_with("http://") || address.starts_with("https://") {
        Url::parse(address)?
    } else {
        Url::parse(&format!("http://{}", address))?
    };
    Ok(url)
}

/// JSON-RPC 2.0 client over HTTP POST.
///
/// Does not retry: every call maps to exactly one HTTP exchange.
pub struct JsonRpcClient {
    client: Client,
    url: Url,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    /// Create a client with the default request timeout.
    pub fn new(address: &str) -> anyhow::Result<Self> {
        Self::with_timeout(address, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a client with a custom request timeout.
    pub fn with_timeout(address: &str, request_timeout: Duration) -> anyhow::Result<Self> {
        let url = parse_endpoint(address)?;
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(request_timeout))
            .build()?;

        Ok(Self {
            client,
            url,
            next_id: AtomicU64::new(1),
        })
    }

    /// Endpoint this client posts to.
    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn exchange(&self, request: &JsonRpcRequest) -> Result<Value, Failure> {
        let response = self
            .client
            .post(self.url.clone())
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Failure::transport(format!("request timeout: {}", e))
                } else if e.is_connect() {
                    Failure::transport(format!("connection failed: {}", e))
                } else {
                    Failure::transport(format!("network error: {}", e))
                }
            })?;

        // JSON-RPC servers may report errors with non-2xx statuses; the body
        // still decides the outcome when it parses.
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| Failure::transport(format!("failed to read response body: {}", e)))?;

        let envelope: JsonRpcResponse = serde_json::from_slice(&body).map_err(|e| {
            Failure::transport(format!(
                "HTTP {} with unparsable JSON-RPC body: {}",
                status.as_u16(),
                e
            ))
        })?;

        envelope.into_result(request.id)
    }
}

#[async_trait]
impl ControlRpc for JsonRpcClient {
    async fn call(&self, method: &str, params: Value) -> Result<Value, Failure> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(id, method, params);
        debug!("JSON-RPC -> {} #{} {}", self.url, id, method);
        trace!("JSON-RPC params: {}", request.params);

        let result = self.exchange(&request).await;
        match &result {
            Ok(_) => debug!("JSON-RPC <- #{} {} ok", id, method),
            Err(failure) => debug!("JSON-RPC <- #{} {} {}", id, method, failure),
        }
        result
    }
}
