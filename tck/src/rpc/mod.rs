//! Control-protocol client.
//!
//! The SUT is driven over JSON-RPC 2.0. [`ProtocolClient`] turns a typed
//! [`OperationRequest`] into exactly one call and normalizes the reply into an
//! [`OperationOutcome`]. The wire itself sits behind [`ControlRpc`] so the same
//! client works against an HTTP endpoint or an in-process ledger.

pub mod client;
pub mod envelope;
pub mod outcome;
pub mod request;
pub mod transfer;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

pub use client::JsonRpcClient;
pub use outcome::{Failure, FailureKind, OperationOutcome, OperationResult};
pub use request::{Method, OperationRequest};
pub use transfer::TransferBuilder;

use outcome::INVALID_PARAMS_CODE;

/// One request/response exchange with a JSON-RPC endpoint.
///
/// Implementations never retry and never interpret business statuses; errors
/// come back already normalized into a [`Failure`].
#[async_trait]
pub trait ControlRpc: Send + Sync {
    /// Invoke `method` with `params` and return the `result` payload.
    async fn call(&self, method: &str, params: Value) -> Result<Value, Failure>;
}

#[async_trait]
impl<T: ControlRpc + ?Sized> ControlRpc for Arc<T> {
    async fn call(&self, method: &str, params: Value) -> Result<Value, Failure> {
        (**self).call(method, params).await
    }
}

/// Typed client for the SUT's control protocol.
#[derive(Clone)]
pub struct ProtocolClient {
    transport: Arc<dyn ControlRpc>,
}

impl ProtocolClient {
    /// Wrap a transport.
    pub fn new(transport: Arc<dyn ControlRpc>) -> Self {
        Self { transport }
    }

    /// HTTP client for `address`.
    pub fn connect(address: &str, request_timeout: std::time::Duration) -> anyhow::Result<Self> {
        let client = JsonRpcClient::with_timeout(address, request_timeout)?;
        Ok(Self::new(Arc::new(client)))
    }

    /// Underlying transport.
    pub fn transport(&self) -> Arc<dyn ControlRpc> {
        Arc::clone(&self.transport)
    }

    /// Submit one operation.
    pub async fn submit(&self, request: &OperationRequest) -> OperationOutcome {
        let params = match request.to_params() {
            Ok(params) => params,
            Err(e) => {
                return OperationOutcome::Failure(Failure::internal(
                    INVALID_PARAMS_CODE,
                    format!("cannot encode {} parameters: {}", request.method_name(), e),
                ))
            }
        };
        self.submit_raw(request.method_name(), params).await
    }

    /// Submit an arbitrary method with a raw parameter bag.
    pub async fn submit_raw(&self, method: &str, params: Value) -> OperationOutcome {
        self.transport.call(method, params).await.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outcome::BUSINESS_ERROR_CODE;
    use parking_lot::Mutex;
    use serde_json::json;

    struct Recording {
        calls: Mutex<Vec<(String, Value)>>,
        reply: Result<Value, Failure>,
    }

    #[async_trait]
    impl ControlRpc for Recording {
        async fn call(&self, method: &str, params: Value) -> Result<Value, Failure> {
            self.calls.lock().push((method.to_string(), params));
            self.reply.clone()
        }
    }

    #[tokio::test]
    async fn test_submit_sends_single_call() {
        let transport = Arc::new(Recording {
            calls: Mutex::new(Vec::new()),
            reply: Ok(json!({ "status": "SUCCESS" })),
        });
        let client = ProtocolClient::new(transport.clone());

        let transfer = TransferBuilder::new()
            .hbar("0.0.1001", -5)
            .hbar("0.0.1002", 5)
            .build();
        let outcome = client
            .submit(&OperationRequest::TransferCrypto(transfer))
            .await;

        assert!(outcome.is_success());
        let calls = transport.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "transferCrypto");
        assert_eq!(calls[0].1["transfers"][0]["hbar"]["amount"], "-5");
    }

    #[tokio::test]
    async fn test_failure_passes_through_unchanged() {
        let transport = Arc::new(Recording {
            calls: Mutex::new(Vec::new()),
            reply: Err(Failure::business("INVALID_SIGNATURE", "missing signer")),
        });
        let client = ProtocolClient::new(transport);

        let outcome = client.submit(&OperationRequest::Reset).await;
        let failure = outcome.failure().unwrap();
        assert!(failure.is_business("INVALID_SIGNATURE"));
        assert_eq!(failure.code(), BUSINESS_ERROR_CODE);
    }
}
