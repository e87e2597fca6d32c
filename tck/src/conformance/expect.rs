//! Outcome assertions

use super::{Expected, ExpectedStatus};
use crate::error::{Result, TckError};
use crate::rpc::outcome::TRANSPORT_ERROR_CODE;
use crate::rpc::{FailureKind, OperationOutcome};

fn describe_expected(expected: &Expected) -> String {
    match (expected.status, &expected.error, expected.code) {
        (ExpectedStatus::Success, _, _) => "success".to_string(),
        (ExpectedStatus::Business, Some(status), _) => format!("business failure {}", status),
        (ExpectedStatus::Business, None, _) => "business failure".to_string(),
        (ExpectedStatus::Internal, _, Some(code)) => format!("internal error {}", code),
        (ExpectedStatus::Internal, _, None) => "internal error".to_string(),
    }
}

fn describe_actual(outcome: &OperationOutcome) -> String {
    match outcome {
        OperationOutcome::Success(_) => "success".to_string(),
        OperationOutcome::Failure(failure) => match &failure.kind {
            FailureKind::Business { status } => format!("business failure {}", status),
            FailureKind::Internal { code } => {
                format!("internal error {} ({})", code, failure.message)
            }
        },
    }
}

fn matches(outcome: &OperationOutcome, expected: &Expected) -> bool {
    match (expected.status, outcome) {
        (ExpectedStatus::Success, OperationOutcome::Success(_)) => true,
        (ExpectedStatus::Business, OperationOutcome::Failure(failure)) => match &failure.kind {
            FailureKind::Business { status } => expected.error.as_deref() == Some(status.as_str()),
            FailureKind::Internal { .. } => false,
        },
        (ExpectedStatus::Internal, OperationOutcome::Failure(failure)) => match failure.kind {
            FailureKind::Internal { code } => match expected.code {
                Some(c) => c == code,
                None => code != TRANSPORT_ERROR_CODE,
            },
            FailureKind::Business { .. } => false,
        },
        _ => false,
    }
}

/// Check that `outcome` of `operation` is the declared one.
///
/// Business failures match on the exact status string, internal failures on
/// the code when one is declared. A bare `internal` expectation never accepts
/// a transport failure; an undeclared transport failure is a harness error,
/// not an assertion failure.
pub fn assert_outcome(
    operation: &str,
    outcome: &OperationOutcome,
    expected: &Expected,
) -> Result<()> {
    if matches(outcome, expected) {
        return Ok(());
    }
    if let Some(failure) = outcome.failure() {
        if failure.kind == (FailureKind::Internal { code: TRANSPORT_ERROR_CODE }) {
            return Err(TckError::Transport {
                operation: operation.to_string(),
                failure: failure.clone(),
            });
        }
    }
    Err(TckError::UnexpectedOutcome {
        operation: operation.to_string(),
        expected: describe_expected(expected),
        actual: describe_actual(outcome),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{Failure, OperationResult};
    use serde_json::json;

    fn business(status: &str) -> Expected {
        Expected {
            status: ExpectedStatus::Business,
            error: Some(status.to_string()),
            code: None,
        }
    }

    fn success() -> OperationOutcome {
        OperationOutcome::Success(OperationResult::new(json!({"status": "SUCCESS"})))
    }

    #[test]
    fn test_success_matches_default() {
        assert!(assert_outcome("transferCrypto", &success(), &Expected::default()).is_ok());
    }

    #[test]
    fn test_business_status_must_match_exactly() {
        let outcome =
            OperationOutcome::Failure(Failure::business("INSUFFICIENT_ACCOUNT_BALANCE", ""));
        let declared = business("INSUFFICIENT_ACCOUNT_BALANCE");
        assert!(assert_outcome("transferCrypto", &outcome, &declared).is_ok());

        let err = assert_outcome("transferCrypto", &outcome, &business("INVALID_SIGNATURE"))
            .unwrap_err();
        match err {
            TckError::UnexpectedOutcome {
                operation,
                expected,
                actual,
            } => {
                assert_eq!(operation, "transferCrypto");
                assert_eq!(expected, "business failure INVALID_SIGNATURE");
                assert_eq!(actual, "business failure INSUFFICIENT_ACCOUNT_BALANCE");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_internal_is_not_business() {
        let outcome = OperationOutcome::Failure(Failure::internal(-32603, "bad id"));
        let declared = business("INVALID_ACCOUNT_ID");
        assert!(assert_outcome("transferCrypto", &outcome, &declared).is_err());

        let internal = Expected {
            status: ExpectedStatus::Internal,
            ..Default::default()
        };
        assert!(assert_outcome("transferCrypto", &outcome, &internal).is_ok());

        let wrong_code = Expected {
            status: ExpectedStatus::Internal,
            error: None,
            code: Some(-32602),
        };
        assert!(assert_outcome("transferCrypto", &outcome, &wrong_code).is_err());
    }

    #[test]
    fn test_bare_internal_rejects_transport_failure() {
        let outcome = OperationOutcome::Failure(Failure::transport("connection refused"));
        let internal = Expected {
            status: ExpectedStatus::Internal,
            ..Default::default()
        };

        let err = assert_outcome("transferCrypto", &outcome, &internal).unwrap_err();
        assert!(matches!(err, TckError::Transport { .. }));
        assert!(err.to_string().contains("connection refused"));

        let declared = Expected {
            status: ExpectedStatus::Internal,
            error: None,
            code: Some(TRANSPORT_ERROR_CODE),
        };
        assert!(assert_outcome("transferCrypto", &outcome, &declared).is_ok());
    }

    #[test]
    fn test_transport_failure_is_not_business_mismatch() {
        let outcome = OperationOutcome::Failure(Failure::transport("timed out"));
        let err = assert_outcome("transferCrypto", &outcome, &business("INVALID_SIGNATURE"))
            .unwrap_err();
        assert!(matches!(err, TckError::Transport { .. }));
    }

    #[test]
    fn test_unexpected_success_fails() {
        let err = assert_outcome("transferCrypto", &success(), &business("INVALID_SIGNATURE"))
            .unwrap_err();
        assert!(err.to_string().contains("got success"));
    }
}
