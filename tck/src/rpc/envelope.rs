//! JSON-RPC 2.0 envelopes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::outcome::Failure;

/// Protocol version carried by every envelope.
pub const JSON_RPC_VERSION: &str = "2.0";

/// JSON-RPC request structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Always `2.0`
    pub jsonrpc: String,
    /// Correlation id
    pub id: u64,
    /// Method name
    pub method: String,
    /// Method parameters
    #[serde(default)]
    pub params: Value,
}

impl JsonRpcRequest {
    /// Build a request envelope.
    pub fn new(id: u64, method: &str, params: Value) -> Self {
        Self {
            jsonrpc: JSON_RPC_VERSION.to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC error structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code
    pub code: i64,
    /// Short description
    pub message: String,
    /// Structured detail (`status` for business rejections)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// JSON-RPC response structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Protocol version
    #[serde(default)]
    pub jsonrpc: Option<String>,
    /// Correlation id echoed by the server
    #[serde(default)]
    pub id: Option<Value>,
    /// Success payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Successful response envelope.
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            jsonrpc: Some(JSON_RPC_VERSION.to_string()),
            id: Some(Value::from(id)),
            result: Some(result),
            error: None,
        }
    }

    /// Error response envelope.
    pub fn failure(id: u64, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: Some(JSON_RPC_VERSION.to_string()),
            id: Some(Value::from(id)),
            result: None,
            error: Some(error),
        }
    }

    /// Whether the echoed id matches the request id.
    ///
    /// Servers may echo numeric ids as strings.
    pub fn correlates_with(&self, request_id: u64) -> bool {
        match &self.id {
            Some(Value::Number(n)) => n.as_u64() == Some(request_id),
            Some(Value::String(s)) => s.parse::<u64>().ok() == Some(request_id),
            _ => false,
        }
    }

    /// Resolve the envelope for the request with `request_id`.
    pub fn into_result(self, request_id: u64) -> Result<Value, Failure> {
        // Error responses to unparsable requests may legitimately carry a null id.
        let id_is_null = self.id.as_ref().map_or(true, Value::is_null);
        let correlated = self.correlates_with(request_id);

        if let Some(error) = self.error {
            if !id_is_null && !correlated {
                return Err(Failure::transport(format!(
                    "response id {:?} does not match request id {}",
                    self.id, request_id
                )));
            }
            return Err(Failure::from_rpc_error(
                error.code,
                &error.message,
                error.data.as_ref(),
            ));
        }

        if !correlated {
            return Err(Failure::transport(format!(
                "response id {:?} does not match request id {}",
                self.id, request_id
            )));
        }

        self.result
            .ok_or_else(|| Failure::transport("response carried neither result nor error"))
    }
}
