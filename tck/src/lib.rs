//! # Ledger TCK: Technology Compatibility Kit
//!
//! Black-box conformance suite for ledger client implementations that speak a
//! JSON-RPC 2.0 control protocol. The harness drives the system under test
//! (SUT), then reads ledger state back from two independent sources and
//! checks that both agree with the declared outcome.
//!
//! ## Architecture Overview
//!
//! - **rpc**: typed requests, JSON-RPC transport, outcome normalization
//! - **fixtures**: keys, accounts and tokens created per test and cleaned up
//! - **sources**: consensus query gateway (strong) and mirror REST (eventual)
//! - **verifier**: dual-source checks with bounded retry for mirror lag
//! - **conformance**: YAML scenarios, execution and reports
//! - **test_utils**: in-process ledger and mirror doubles
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ledger_tck::prelude::*;
//!
//! let ctx = SuiteContext::connect(TckConfig::from_env()?).await?;
//! ctx.run_test("hbar transfer", |fixtures| async move {
//!     let alice = fixtures.create_funded_account(1_000).await?;
//!     let bob = fixtures.create_funded_account(0).await?;
//!     let transfer = TransferBuilder::new()
//!         .hbar(&alice.account_id, -10)
//!         .hbar(&bob.account_id, 10)
//!         .signed_by(&alice.key)
//!         .build();
//!     let outcome = fixtures
//!         .client()
//!         .submit(&OperationRequest::TransferCrypto(transfer))
//!         .await;
//!     assert!(outcome.is_success());
//!     ctx.verifier().verify_hbar_balance(&bob.account_id, 10).await
//! })
//! .await?;
//! ```
//!
//! ## Design Principles
//!
//! 1. **Deterministic**: seeded key generation, reproducible with `TCK_KEY_SEED`
//! 2. **Isolation**: every test gets fresh accounts and tokens
//! 3. **Two sources of truth**: a check passes only when both views agree

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Harness configuration (env vars, YAML file)
pub mod config;

/// Error taxonomy
pub mod error;

/// Ledger entity identifiers
pub mod identity;

/// Deterministic infrastructure (seeded RNG)
pub mod orchestrator;

/// Control protocol: requests, transport and outcomes
pub mod rpc;

/// Read-side data sources
pub mod sources;

/// Dual-source state verification
pub mod verifier;

/// Per-test fixtures: keys, accounts, tokens
pub mod fixtures;

/// Suite context shared by all tests of a run
pub mod suite;

/// TCK Conformance Testing - scenario-driven tests
///
/// Scenarios are defined in YAML format for readability.
///
/// ```ignore
/// use ledger_tck::conformance::{Category, ConformanceRunner};
///
/// let runner = ConformanceRunner::load_from_dir(Path::new("specs/transfer_crypto"))?;
/// let report = runner.run_category(&ctx, Category::TransferCrypto).await;
/// assert_eq!(report.failed, 0);
/// ```
pub mod conformance;

/// In-process doubles of the SUT and its read paths
pub mod test_utils;

/// Convenient re-exports for common usage
pub mod prelude;

// Re-export commonly used types at crate root
pub use config::TckConfig;
pub use error::{Result, TckError};
pub use orchestrator::TestRng;
pub use suite::SuiteContext;

/// TCK version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
