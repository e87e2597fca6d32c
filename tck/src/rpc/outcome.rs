//! Normalized outcome of a control-protocol call.
//!
//! Every exchange with the SUT ends in exactly one [`OperationOutcome`]. Business
//! rejections (the SUT evaluated the request and refused it with a named status)
//! and everything that failed before business validation (shape errors,
//! transport errors, protocol errors) share the single [`Failure`] shape so
//! scenarios have one assertion pattern.

use std::fmt;

use serde_json::Value;

/// JSON-RPC error code the SUT uses for business rejections.
pub const BUSINESS_ERROR_CODE: i64 = -32001;

/// JSON-RPC internal error.
pub const INTERNAL_ERROR_CODE: i64 = -32603;

/// JSON-RPC invalid params.
pub const INVALID_PARAMS_CODE: i64 = -32602;

/// JSON-RPC method not found.
pub const METHOD_NOT_FOUND_CODE: i64 = -32601;

/// Code assigned to failures that never produced a JSON-RPC response.
pub const TRANSPORT_ERROR_CODE: i64 = -32098;

/// Status string the SUT reports for an accepted operation.
pub const SUCCESS_STATUS: &str = "SUCCESS";

/// Where a request was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// The SUT evaluated the request and refused it for a named reason
    Business {
        /// Stable status string, e.g. `INSUFFICIENT_ACCOUNT_BALANCE`
        status: String,
    },
    /// The request never reached business validation
    Internal {
        /// JSON-RPC error code, or [`TRANSPORT_ERROR_CODE`]
        code: i64,
    },
}

/// Normalized rejection of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// Rejection category with its status or code
    pub kind: FailureKind,
    /// Human readable detail, not part of any assertion
    pub message: String,
}

impl Failure {
    /// Business rejection with a named status.
    pub fn business(status: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Business {
                status: status.into(),
            },
            message: message.into(),
        }
    }

    /// Rejection before business validation.
    pub fn internal(code: i64, message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Internal { code },
            message: message.into(),
        }
    }

    /// Transport-level failure (no usable JSON-RPC response).
    pub fn transport(message: impl Into<String>) -> Self {
        Self::internal(TRANSPORT_ERROR_CODE, message)
    }

    /// Normalize a JSON-RPC error object.
    ///
    /// Only [`BUSINESS_ERROR_CODE`] carrying a `data.status` string counts as a
    /// business rejection. Anything else is internal.
    pub fn from_rpc_error(code: i64, message: &str, data: Option<&Value>) -> Self {
        let status = data
            .and_then(|d| d.get("status"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty());

        let detail = data
            .and_then(|d| d.get("message"))
            .and_then(Value::as_str)
            .map(|m| format!("{}: {}", message, m))
            .unwrap_or_else(|| message.to_string());

        match (code, status) {
            (BUSINESS_ERROR_CODE, Some(status)) => Self::business(status, detail),
            _ => Self::internal(code, detail),
        }
    }

    /// Business status, if this is a business rejection.
    pub fn status(&self) -> Option<&str> {
        match &self.kind {
            FailureKind::Business { status } => Some(status),
            FailureKind::Internal { .. } => None,
        }
    }

    /// JSON-RPC code of this failure.
    pub fn code(&self) -> i64 {
        match &self.kind {
            FailureKind::Business { .. } => BUSINESS_ERROR_CODE,
            FailureKind::Internal { code } => *code,
        }
    }

    /// Whether this is a business rejection with the given status.
    pub fn is_business(&self, expected: &str) -> bool {
        self.status() == Some(expected)
    }

    /// Whether this failure happened before business validation.
    pub fn is_internal(&self) -> bool {
        matches!(self.kind, FailureKind::Internal { .. })
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FailureKind::Business { status } => {
                write!(f, "rejected with status {} ({})", status, self.message)
            }
            FailureKind::Internal { code } => {
                write!(f, "internal error {} ({})", code, self.message)
            }
        }
    }
}

impl std::error::Error for Failure {}

/// Result fields of an accepted operation.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationResult(Value);

impl OperationResult {
    /// Wrap a raw JSON-RPC `result`.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Raw result value.
    pub fn value(&self) -> &Value {
        &self.0
    }

    /// Consume into the raw result value.
    pub fn into_value(self) -> Value {
        self.0
    }

    /// String field of the result object.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// Receipt status (`SUCCESS` for accepted operations).
    pub fn status(&self) -> Option<&str> {
        self.str_field("status")
    }

    /// Account id created by the operation.
    pub fn account_id(&self) -> Option<&str> {
        self.str_field("accountId")
    }

    /// Token id created by the operation.
    pub fn token_id(&self) -> Option<&str> {
        self.str_field("tokenId")
    }

    /// Key returned by `generateKey`.
    pub fn key(&self) -> Option<&str> {
        self.str_field("key")
    }

    /// Serial numbers minted by the operation.
    ///
    /// Accepts decimal strings and JSON numbers.
    pub fn serial_numbers(&self) -> Vec<u64> {
        self.0
            .get("serialNumbers")
            .and_then(Value::as_array)
            .map(|serials| {
                serials
                    .iter()
                    .filter_map(|s| match s {
                        Value::String(s) => s.parse().ok(),
                        other => other.as_u64(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Tagged outcome of exactly one submitted operation.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutcome {
    /// Operation accepted
    Success(OperationResult),
    /// Operation rejected
    Failure(Failure),
}

impl OperationOutcome {
    /// Whether the operation was accepted.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Failure detail, if the operation was rejected.
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Success(_) => None,
            Self::Failure(failure) => Some(failure),
        }
    }

    /// Convert into a standard `Result`.
    pub fn into_result(self) -> Result<OperationResult, Failure> {
        match self {
            Self::Success(result) => Ok(result),
            Self::Failure(failure) => Err(failure),
        }
    }
}

impl From<Result<Value, Failure>> for OperationOutcome {
    fn from(result: Result<Value, Failure>) -> Self {
        match result {
            Ok(value) => Self::Success(OperationResult::new(value)),
            Err(failure) => Self::Failure(failure),
        }
    }
}

impl fmt::Display for OperationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(result) => write!(
                f,
                "succeeded with status {}",
                result.status().unwrap_or(SUCCESS_STATUS)
            ),
            Self::Failure(failure) => write!(f, "failed: {}", failure),
        }
    }
}
