//! Strong read path: the consensus query gateway.
//!
//! The gateway speaks the same JSON-RPC dialect as the SUT's control endpoint
//! and answers from consensus-committed state.

use std::sync::Arc;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::rpc::ControlRpc;

use super::{parse_quantity, LedgerStateSource, NftRecord, SourceKind, TokenRelationship};

/// Consensus gateway method names.
pub mod methods {
    /// Hbar and token balances of an account
    pub const GET_ACCOUNT_BALANCE: &str = "getAccountBalance";
    /// Account details including token relationships
    pub const GET_ACCOUNT_INFO: &str = "getAccountInfo";
    /// Owner lookup for one NFT serial
    pub const GET_TOKEN_NFT_INFO: &str = "getTokenNftInfo";
}

/// [`LedgerStateSource`] backed by the consensus query gateway.
pub struct ConsensusSource {
    rpc: Arc<dyn ControlRpc>,
}

impl ConsensusSource {
    /// Source over an existing transport.
    pub fn new(rpc: Arc<dyn ControlRpc>) -> Self {
        Self { rpc }
    }

    async fn query(&self, method: &str, params: Value) -> anyhow::Result<Value> {
        self.rpc
            .call(method, params)
            .await
            .map_err(|failure| anyhow!(failure))
            .with_context(|| format!("consensus query {} failed", method))
    }
}

fn status_flag(value: Option<&Value>, set: &str) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case(set),
        _ => false,
    }
}

fn parse_relationship(token_id: &str, entry: &Value) -> anyhow::Result<TokenRelationship> {
    let balance = entry
        .get("balance")
        .map(parse_quantity)
        .transpose()?
        .unwrap_or(0);

    Ok(TokenRelationship {
        token_id: token_id.to_string(),
        balance,
        frozen: status_flag(entry.get("freezeStatus"), "FROZEN"),
        kyc_granted: status_flag(entry.get("kycStatus"), "GRANTED"),
        automatic_association: entry
            .get("automaticAssociation")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

fn parse_nft(entry: &Value) -> anyhow::Result<NftRecord> {
    let field = |name: &str| {
        entry
            .get(name)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| anyhow!("NFT record missing {}", name))
    };
    let serial = entry
        .get("serialNumber")
        .ok_or_else(|| anyhow!("NFT record missing serialNumber"))
        .and_then(parse_quantity)?;

    Ok(NftRecord {
        account_id: field("accountId")?,
        token_id: field("tokenId")?,
        serial: u64::try_from(serial).context("negative NFT serial")?,
    })
}

#[async_trait]
impl LedgerStateSource for ConsensusSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Consensus
    }

    async fn hbar_balance(&self, account_id: &str) -> anyhow::Result<i64> {
        let result = self
            .query(methods::GET_ACCOUNT_BALANCE, json!({ "accountId": account_id }))
            .await?;
        let hbars = result
            .get("hbars")
            .ok_or_else(|| anyhow!("balance of {} has no hbars field", account_id))?;
        parse_quantity(hbars)
    }

    async fn token_relationships(
        &self,
        account_id: &str,
    ) -> anyhow::Result<Vec<TokenRelationship>> {
        let result = self
            .query(methods::GET_ACCOUNT_INFO, json!({ "accountId": account_id }))
            .await?;

        let Some(relationships) = result.get("tokenRelationships") else {
            return Ok(Vec::new());
        };
        match relationships {
            Value::Object(map) => map
                .iter()
                .map(|(token_id, entry)| parse_relationship(token_id, entry))
                .collect(),
            Value::Array(list) => list
                .iter()
                .map(|entry| {
                    let token_id = entry
                        .get("tokenId")
                        .and_then(Value::as_str)
                        .ok_or_else(|| anyhow!("token relationship missing tokenId"))?;
                    parse_relationship(token_id, entry)
                })
                .collect(),
            Value::Null => Ok(Vec::new()),
            other => Err(anyhow!("unexpected tokenRelationships shape: {}", other)),
        }
    }

    async fn account_nfts(&self, account_id: &str) -> anyhow::Result<Vec<NftRecord>> {
        anyhow::bail!(
            "consensus gateway has no account NFT listing (account {}); use nft_info",
            account_id
        )
    }

    async fn nft_info(&self, token_id: &str, serial: u64) -> anyhow::Result<Vec<NftRecord>> {
        let result = self
            .query(
                methods::GET_TOKEN_NFT_INFO,
                json!({ "tokenId": token_id, "serialNumber": serial.to_string() }),
            )
            .await?;

        result
            .get("nfts")
            .and_then(Value::as_array)
            .map(|nfts| nfts.iter().map(parse_nft).collect())
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}
