//! Prelude module for convenient imports
//!
//! Import everything you need with:
//! ```rust,ignore
//! use ledger_tck::prelude::*;
//! ```

pub use crate::config::TckConfig;
pub use crate::error::{Result as TckResult, TckError};
pub use crate::fixtures::{
    AccountOptions, Fixtures, KeyMaterial, KeyScheme, TestAccount, TestToken, TokenOptions,
};
pub use crate::orchestrator::TestRng;
pub use crate::rpc::{Failure, OperationOutcome, OperationRequest, ProtocolClient, TransferBuilder};
pub use crate::sources::{LedgerStateSource, SourceKind};
pub use crate::suite::SuiteContext;
pub use crate::verifier::{DualSourceVerifier, Expectation, RetryPolicy};

// Re-export commonly used external types
pub use anyhow::{anyhow, Context, Result};
pub use std::sync::Arc;
pub use tokio::time::Duration;
