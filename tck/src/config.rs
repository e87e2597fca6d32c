//! Harness configuration.
//!
//! An optional YAML file named by `TCK_CONFIG` forms the base layer;
//! environment variables override individual fields.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TckError};
use crate::verifier::RetryPolicy;

/// Environment variable names.
pub mod env {
    /// Path of a YAML base configuration
    pub const CONFIG_FILE: &str = "TCK_CONFIG";
    /// SUT control endpoint
    pub const JSON_RPC_SERVER_URL: &str = "JSON_RPC_SERVER_URL";
    /// Consensus query gateway endpoint
    pub const CONSENSUS_QUERY_URL: &str = "CONSENSUS_QUERY_URL";
    /// Mirror REST endpoint
    pub const MIRROR_NODE_REST_URL: &str = "MIRROR_NODE_REST_URL";
    /// Operator account id
    pub const OPERATOR_ACCOUNT_ID: &str = "OPERATOR_ACCOUNT_ID";
    /// Operator private key (DER hex)
    pub const OPERATOR_ACCOUNT_PRIVATE_KEY: &str = "OPERATOR_ACCOUNT_PRIVATE_KEY";
    /// Consensus node address handed to the SUT
    pub const NODE_IP: &str = "NODE_IP";
    /// Consensus node account handed to the SUT
    pub const NODE_ACCOUNT_ID: &str = "NODE_ACCOUNT_ID";
    /// Verifier attempt budget
    pub const VERIFY_MAX_ATTEMPTS: &str = "VERIFY_MAX_ATTEMPTS";
    /// Verifier delay between attempts, in milliseconds
    pub const VERIFY_RETRY_DELAY_MS: &str = "VERIFY_RETRY_DELAY_MS";
    /// Per-test wall clock limit, in seconds
    pub const TEST_TIMEOUT_SECS: &str = "TEST_TIMEOUT_SECS";
    /// Per-request HTTP timeout, in seconds
    pub const REQUEST_TIMEOUT_SECS: &str = "REQUEST_TIMEOUT_SECS";
}

/// Per-test wall clock limit.
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-request HTTP timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Harness configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TckConfig {
    /// SUT control endpoint
    pub json_rpc_server_url: String,
    /// Consensus gateway; the control endpoint when unset
    pub consensus_query_url: Option<String>,
    /// Mirror REST endpoint
    pub mirror_node_rest_url: String,
    /// Operator account id
    pub operator_account_id: Option<String>,
    /// Operator private key (DER hex)
    pub operator_private_key: Option<String>,
    /// Consensus node address handed to the SUT on setup
    pub node_ip: Option<String>,
    /// Consensus node account handed to the SUT on setup
    pub node_account_id: Option<String>,
    /// Verifier attempt budget
    pub verify_max_attempts: u32,
    /// Verifier delay between attempts
    pub verify_retry_delay_ms: u64,
    /// Per-test wall clock limit
    pub test_timeout_secs: u64,
    /// Per-request HTTP timeout
    pub request_timeout_secs: u64,
}

impl Default for TckConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            json_rpc_server_url: "http://localhost:8544".to_string(),
            consensus_query_url: None,
            mirror_node_rest_url: "http://localhost:5551".to_string(),
            operator_account_id: None,
            operator_private_key: None,
            node_ip: None,
            node_account_id: None,
            verify_max_attempts: policy.max_attempts,
            verify_retry_delay_ms: policy.delay.as_millis() as u64,
            test_timeout_secs: DEFAULT_TEST_TIMEOUT.as_secs(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
        }
    }
}

/// Operator identity funding and signing fixture operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorCredentials {
    /// Account id
    pub account_id: String,
    /// DER-hex private key
    pub private_key: String,
}

fn parse_var<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| TckError::Config(format!("{}='{}': {}", name, raw, e)))
}

impl TckConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Load from an explicit variable map.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let get = |name: &str| vars.get(name).filter(|v| !v.trim().is_empty());

        let mut config = match get(env::CONFIG_FILE) {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Some(v) = get(env::JSON_RPC_SERVER_URL) {
            config.json_rpc_server_url = v.clone();
        }
        if let Some(v) = get(env::CONSENSUS_QUERY_URL) {
            config.consensus_query_url = Some(v.clone());
        }
        if let Some(v) = get(env::MIRROR_NODE_REST_URL) {
            config.mirror_node_rest_url = v.clone();
        }
        if let Some(v) = get(env::OPERATOR_ACCOUNT_ID) {
            config.operator_account_id = Some(v.clone());
        }
        if let Some(v) = get(env::OPERATOR_ACCOUNT_PRIVATE_KEY) {
            config.operator_private_key = Some(v.clone());
        }
        if let Some(v) = get(env::NODE_IP) {
            config.node_ip = Some(v.clone());
        }
        if let Some(v) = get(env::NODE_ACCOUNT_ID) {
            config.node_account_id = Some(v.clone());
        }
        if let Some(v) = get(env::VERIFY_MAX_ATTEMPTS) {
            config.verify_max_attempts = parse_var(env::VERIFY_MAX_ATTEMPTS, v)?;
        }
        if let Some(v) = get(env::VERIFY_RETRY_DELAY_MS) {
            config.verify_retry_delay_ms = parse_var(env::VERIFY_RETRY_DELAY_MS, v)?;
        }
        if let Some(v) = get(env::TEST_TIMEOUT_SECS) {
            config.test_timeout_secs = parse_var(env::TEST_TIMEOUT_SECS, v)?;
        }
        if let Some(v) = get(env::REQUEST_TIMEOUT_SECS) {
            config.request_timeout_secs = parse_var(env::REQUEST_TIMEOUT_SECS, v)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| TckError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_yaml(&content)
    }

    /// Parse YAML.
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| TckError::Config(e.to_string()))
    }

    fn validate(&self) -> Result<()> {
        if self.json_rpc_server_url.trim().is_empty() {
            return Err(TckError::Config("JSON-RPC server URL is empty".to_string()));
        }
        if self.test_timeout_secs == 0 {
            return Err(TckError::Config("test timeout must be positive".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(TckError::Config("request timeout must be positive".to_string()));
        }
        Ok(())
    }

    /// Operator credentials, required before any suite runs.
    pub fn operator(&self) -> Result<OperatorCredentials> {
        match (&self.operator_account_id, &self.operator_private_key) {
            (Some(account_id), Some(private_key)) => Ok(OperatorCredentials {
                account_id: account_id.clone(),
                private_key: private_key.clone(),
            }),
            _ => Err(TckError::Config(format!(
                "{} and {} must be set",
                env::OPERATOR_ACCOUNT_ID,
                env::OPERATOR_ACCOUNT_PRIVATE_KEY
            ))),
        }
    }

    /// Consensus gateway endpoint.
    pub fn consensus_url(&self) -> &str {
        self.consensus_query_url
            .as_deref()
            .unwrap_or(&self.json_rpc_server_url)
    }

    /// Verifier retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.verify_max_attempts,
            Duration::from_millis(self.verify_retry_delay_ms),
        )
    }

    /// Per-test wall clock limit.
    pub fn test_timeout(&self) -> Duration {
        Duration::from_secs(self.test_timeout_secs)
    }

    /// Per-request HTTP timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = TckConfig::from_vars(&HashMap::new()).unwrap();
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.test_timeout(), Duration::from_secs(30));
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.consensus_url(), "http://localhost:8544");
        assert!(matches!(config.operator(), Err(TckError::Config(_))));
    }

    #[test]
    fn test_env_overrides() {
        let config = TckConfig::from_vars(&vars(&[
            (env::OPERATOR_ACCOUNT_ID, "0.0.2"),
            (env::OPERATOR_ACCOUNT_PRIVATE_KEY, "302e0201"),
            (env::CONSENSUS_QUERY_URL, "http://localhost:8545"),
            (env::VERIFY_MAX_ATTEMPTS, "3"),
            (env::VERIFY_RETRY_DELAY_MS, "250"),
        ]))
        .unwrap();

        let operator = config.operator().unwrap();
        assert_eq!(operator.account_id, "0.0.2");
        assert_eq!(config.consensus_url(), "http://localhost:8545");
        assert_eq!(
            config.retry_policy(),
            RetryPolicy::new(3, Duration::from_millis(250))
        );
    }

    #[test]
    fn test_invalid_number_is_config_error() {
        let err = TckConfig::from_vars(&vars(&[(env::TEST_TIMEOUT_SECS, "soon")])).unwrap_err();
        assert!(err.to_string().contains(env::TEST_TIMEOUT_SECS));
    }

    #[test]
    fn test_yaml_base_layer() {
        let config = TckConfig::from_yaml(
            "json_rpc_server_url: http://sut:8544\n\
             mirror_node_rest_url: http://mirror:5551\n\
             verify_max_attempts: 20\n",
        )
        .unwrap();
        assert_eq!(config.json_rpc_server_url, "http://sut:8544");
        assert_eq!(config.verify_max_attempts, 20);
        assert_eq!(config.verify_retry_delay_ms, 1000);
    }

    #[test]
    fn test_unknown_yaml_field_rejected() {
        assert!(TckConfig::from_yaml("operator: 0.0.2\n").is_err());
    }
}
