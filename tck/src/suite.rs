//! Suite-wide context.
//!
//! Everything a test needs is reachable from an explicit [`SuiteContext`]:
//! configuration, the control client, the verifier and the operator. It is
//! created once per suite (which configures the SUT's operator session) and
//! reset once at the end.

use std::future::Future;
use std::sync::Arc;

use log::info;

use crate::config::{OperatorCredentials, TckConfig};
use crate::error::{Result, TckError};
use crate::fixtures::{run_scoped, Fixtures};
use crate::orchestrator::TestRng;
use crate::rpc::request::SetupParams;
use crate::rpc::{ControlRpc, JsonRpcClient, OperationRequest, ProtocolClient};
use crate::sources::{ConsensusSource, LedgerStateSource, MirrorSource};
use crate::verifier::DualSourceVerifier;

/// Shared state of one suite run.
#[derive(Clone)]
pub struct SuiteContext {
    config: TckConfig,
    client: ProtocolClient,
    verifier: DualSourceVerifier,
    operator: OperatorCredentials,
    rng: Arc<TestRng>,
}

impl SuiteContext {
    /// Connect to the endpoints in `config` and set up the operator session.
    pub async fn connect(config: TckConfig) -> Result<Self> {
        let timeout = config.request_timeout();
        let control = JsonRpcClient::with_timeout(&config.json_rpc_server_url, timeout)
            .map_err(|e| TckError::Config(format!("JSON-RPC server URL: {:#}", e)))?;
        let consensus = JsonRpcClient::with_timeout(config.consensus_url(), timeout)
            .map_err(|e| TckError::Config(format!("consensus query URL: {:#}", e)))?;
        let mirror = MirrorSource::new(&config.mirror_node_rest_url, timeout)
            .map_err(|e| TckError::Config(format!("mirror URL: {:#}", e)))?;

        Self::with_transports(config, Arc::new(control), Arc::new(consensus), Arc::new(mirror))
            .await
    }

    /// Build over explicit transports and set up the operator session.
    pub async fn with_transports(
        config: TckConfig,
        control: Arc<dyn ControlRpc>,
        consensus: Arc<dyn ControlRpc>,
        mirror: Arc<dyn LedgerStateSource>,
    ) -> Result<Self> {
        let operator = config.operator()?;
        let strong: Arc<dyn LedgerStateSource> = Arc::new(ConsensusSource::new(consensus));
        let verifier = DualSourceVerifier::new(strong, mirror, config.retry_policy());

        let ctx = Self {
            client: ProtocolClient::new(control),
            verifier,
            operator,
            rng: Arc::new(TestRng::new_from_env_or_random()),
            config,
        };
        ctx.setup().await?;
        Ok(ctx)
    }

    async fn setup(&self) -> Result<()> {
        let request = OperationRequest::Setup(SetupParams {
            operator_account_id: self.operator.account_id.clone(),
            operator_private_key: self.operator.private_key.clone(),
            node_ip: self.config.node_ip.clone(),
            node_account_id: self.config.node_account_id.clone(),
            mirror_network_ip: Some(self.config.mirror_node_rest_url.clone()),
        });
        self.client
            .submit(&request)
            .await
            .into_result()
            .map_err(|failure| TckError::fixture("setup", failure))?;
        info!("operator session ready for {}", self.operator.account_id);
        Ok(())
    }

    /// Tear down the operator session.
    pub async fn reset(&self) -> Result<()> {
        self.client
            .submit(&OperationRequest::Reset)
            .await
            .into_result()
            .map_err(|failure| TckError::fixture("reset", failure))?;
        info!("operator session reset");
        Ok(())
    }

    /// Active configuration.
    pub fn config(&self) -> &TckConfig {
        &self.config
    }

    /// Control-protocol client.
    pub fn client(&self) -> &ProtocolClient {
        &self.client
    }

    /// Dual-source verifier.
    pub fn verifier(&self) -> &DualSourceVerifier {
        &self.verifier
    }

    /// Suite operator.
    pub fn operator(&self) -> &OperatorCredentials {
        &self.operator
    }

    /// Fresh fixture scope for one test.
    pub fn fixtures(&self) -> Fixtures {
        Fixtures::new(
            self.client.clone(),
            self.operator.clone(),
            Arc::clone(&self.rng),
        )
    }

    /// Run one test body with its own fixtures, time limit and cleanup.
    pub async fn run_test<T, F, Fut>(&self, name: &str, body: F) -> Result<T>
    where
        F: FnOnce(Fixtures) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        info!("running {}", name);
        let result = run_scoped(self.fixtures(), self.config.test_timeout(), body).await;
        match &result {
            Ok(_) => info!("{} passed", name),
            Err(e) => info!("{} failed: {}", name, e),
        }
        result
    }
}
