//! Test fixtures: keys, accounts, tokens and their cleanup.
//!
//! Fixture operations build the preconditions of a scenario. They are not the
//! operation under test: any rejection aborts the test with
//! [`TckError::FixtureSetup`](crate::error::TckError::FixtureSetup) instead of
//! being interpreted as a scenario outcome.
//!
//! ```rust,ignore
//! let fixtures = ctx.fixtures();
//! let sender = fixtures.create_funded_account(10).await?;
//! let receiver = fixtures.create_funded_account(0).await?;
//!
//! let outcome = ctx.client().submit(&OperationRequest::TransferCrypto(
//!     TransferBuilder::new()
//!         .hbar(&sender.account_id, -10)
//!         .hbar(&receiver.account_id, 10)
//!         .signed_by(&sender.key)
//!         .build(),
//! )).await;
//! ```

pub mod accounts;
pub mod keys;
pub mod scope;
pub mod tokens;

use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::config::OperatorCredentials;
use crate::error::{Result, TckError};
use crate::orchestrator::TestRng;
use crate::rpc::{OperationRequest, OperationResult, ProtocolClient};

pub use accounts::{AccountOptions, TestAccount};
pub use keys::{KeyError, KeyMaterial, KeyScheme};
pub use scope::run_scoped;
pub use tokens::{TestToken, TokenOptions};

/// Fixture operations bound to one test.
///
/// Accounts created through this value are tracked and deleted, with their
/// remaining balance going to the operator, when the test's scope ends.
#[derive(Clone)]
pub struct Fixtures {
    client: ProtocolClient,
    operator: OperatorCredentials,
    rng: Arc<TestRng>,
    created: Arc<Mutex<Vec<TestAccount>>>,
}

impl Fixtures {
    /// Fixtures over a client and the suite's operator.
    pub fn new(client: ProtocolClient, operator: OperatorCredentials, rng: Arc<TestRng>) -> Self {
        Self {
            client,
            operator,
            rng,
            created: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Control-protocol client.
    pub fn client(&self) -> &ProtocolClient {
        &self.client
    }

    /// Suite operator.
    pub fn operator(&self) -> &OperatorCredentials {
        &self.operator
    }

    /// Random source for local key generation.
    pub fn rng(&self) -> &TestRng {
        &self.rng
    }

    /// Accounts still awaiting cleanup.
    pub fn tracked_accounts(&self) -> Vec<TestAccount> {
        self.created.lock().clone()
    }

    pub(crate) fn track(&self, account: &TestAccount) {
        self.created.lock().push(account.clone());
    }

    pub(crate) fn untrack(&self, account_id: &str) {
        self.created.lock().retain(|a| a.account_id != account_id);
    }

    pub(crate) fn take_tracked(&self) -> Vec<TestAccount> {
        std::mem::take(&mut *self.created.lock())
    }

    /// Submit a precondition; any rejection becomes a fixture failure.
    pub(crate) async fn require(&self, request: OperationRequest) -> Result<OperationResult> {
        let operation = request.method_name().to_string();
        debug!("fixture {}", operation);
        self.client
            .submit(&request)
            .await
            .into_result()
            .map_err(|failure| TckError::fixture(operation, failure))
    }
}
