//! Error taxonomy of the harness.
//!
//! Business and shape rejections of the operation under test are outcomes,
//! carried by [`crate::rpc::OperationOutcome`]. Everything here fails a test.

use std::time::Duration;

use thiserror::Error;

use crate::rpc::Failure;
use crate::verifier::Mismatch;

/// Errors that fail a test.
#[derive(Debug, Error)]
pub enum TckError {
    /// A precondition could not be established
    #[error("fixture setup failed during {operation}: {failure}")]
    FixtureSetup {
        /// Fixture step that failed, e.g. `createAccount`
        operation: String,
        /// What the SUT reported
        failure: Failure,
    },

    /// The read sources never agreed with the expected state
    #[error("state did not converge after {attempts} attempts: {last}")]
    ConvergenceTimeout {
        /// Attempts made
        attempts: u32,
        /// Final mismatch with both sources' observations
        last: Mismatch,
    },

    /// The operation under test did not end as declared
    #[error("{operation}: expected {expected}, got {actual}")]
    UnexpectedOutcome {
        /// Method under test
        operation: String,
        /// Declared outcome
        expected: String,
        /// Observed outcome
        actual: String,
    },

    /// The SUT could not be reached or answered outside the protocol
    #[error("{operation}: transport failure: {failure}")]
    Transport {
        /// Method under test
        operation: String,
        /// Normalized transport failure
        failure: Failure,
    },

    /// The per-test wall clock ran out
    #[error("test exceeded its {0:?} time limit")]
    Timeout(Duration),

    /// Missing or invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid scenario definition
    #[error("invalid scenario: {0}")]
    Scenario(String),

    /// I/O and read-side failures
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TckError {
    /// Fixture failure for `operation`.
    pub fn fixture(operation: impl Into<String>, failure: Failure) -> Self {
        Self::FixtureSetup {
            operation: operation.into(),
            failure,
        }
    }

    /// Whether this is a per-test timeout rather than an assertion failure.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = TckError> = std::result::Result<T, E>;
