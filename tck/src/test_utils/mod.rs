//! In-process doubles for the system under test.
//!
//! [`MockLedger`] plays the SUT control endpoint and the consensus gateway;
//! [`MockMirror`] plays a mirror node that trails it. Together they let the
//! whole harness run without a network:
//!
//! ```ignore
//! let ledger = Arc::new(MockLedger::new());
//! let ctx = mock_suite(&ledger, 2).await?;
//! ConformanceRunner::load_from_dir(Path::new("specs"))?.run_all(&ctx).await;
//! ```

pub mod ledger;
pub mod mirror;

use std::sync::Arc;

use crate::config::TckConfig;
use crate::error::Result;
use crate::suite::SuiteContext;

pub use ledger::{status, MockLedger, OPERATOR_ACCOUNT_ID, OPERATOR_GENESIS_BALANCE};
pub use mirror::MockMirror;

/// Configuration pointing at `ledger`'s operator, with fast verifier retries.
pub fn mock_config(ledger: &MockLedger) -> TckConfig {
    TckConfig {
        json_rpc_server_url: "mock://ledger".to_string(),
        mirror_node_rest_url: "mock://mirror".to_string(),
        operator_account_id: Some(ledger.operator_id().to_string()),
        operator_private_key: Some(ledger.operator_key().private_der.clone()),
        verify_max_attempts: 15,
        verify_retry_delay_ms: 5,
        test_timeout_secs: 30,
        ..Default::default()
    }
}

/// Suite wired to `ledger`, with a mirror that trails it by `mirror_lag` reads.
pub async fn mock_suite(ledger: &Arc<MockLedger>, mirror_lag: u32) -> Result<SuiteContext> {
    let mirror = Arc::new(MockMirror::new(Arc::clone(ledger), mirror_lag));
    SuiteContext::with_transports(
        mock_config(ledger),
        ledger.clone(),
        ledger.clone(),
        mirror,
    )
    .await
}
