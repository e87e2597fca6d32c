//! Read-side data sources.
//!
//! Two independent views of ledger state exist: the consensus query gateway
//! (strong, low lag) and the mirror REST API (eventual, indexing lag). Both sit
//! behind [`LedgerStateSource`] so the verifier treats them uniformly.

pub mod consensus;
pub mod mirror;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use consensus::ConsensusSource;
pub use mirror::MirrorSource;

/// Which read path produced an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Consensus query gateway
    Consensus,
    /// Mirror node REST API
    Mirror,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Consensus => write!(f, "consensus"),
            Self::Mirror => write!(f, "mirror"),
        }
    }
}

/// Account-to-token association as reported by a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRelationship {
    /// Token id
    pub token_id: String,
    /// Fungible balance (or owned serial count for NFTs)
    pub balance: i64,
    /// Account is frozen for this token
    pub frozen: bool,
    /// KYC granted
    pub kyc_granted: bool,
    /// Created through an automatic association slot
    pub automatic_association: bool,
}

/// NFT ownership record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NftRecord {
    /// Current owner
    pub account_id: String,
    /// Token id
    pub token_id: String,
    /// Serial number
    pub serial: u64,
}

impl NftRecord {
    /// Whether this record is the (owner, token, serial) triple.
    pub fn matches(&self, owner: &str, token_id: &str, serial: u64) -> bool {
        self.account_id == owner && self.token_id == token_id && self.serial == serial
    }
}

/// Airdrop offer waiting for the receiver to claim it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAirdrop {
    /// Offering account
    pub sender_id: String,
    /// Receiving account
    pub receiver_id: String,
    /// Token id
    pub token_id: String,
    /// Fungible amount, `None` for NFT offers
    pub amount: Option<i64>,
    /// Serial number for NFT offers
    pub serial: Option<u64>,
}

/// Query-by-identity read API over one view of ledger state.
///
/// Every method performs a fresh read. A missing entity is an error, never a
/// default value, so the verifier can retry reads that race entity creation.
#[async_trait]
pub trait LedgerStateSource: Send + Sync {
    /// Which read path this is.
    fn kind(&self) -> SourceKind;

    /// Native currency balance of an account.
    async fn hbar_balance(&self, account_id: &str) -> anyhow::Result<i64>;

    /// All token relationships the source reports for an account.
    ///
    /// Zero-balance relationships may or may not be included.
    async fn token_relationships(&self, account_id: &str) -> anyhow::Result<Vec<TokenRelationship>>;

    /// NFTs owned by an account.
    async fn account_nfts(&self, account_id: &str) -> anyhow::Result<Vec<NftRecord>>;

    /// Ownership records for one (token, serial) lookup.
    async fn nft_info(&self, token_id: &str, serial: u64) -> anyhow::Result<Vec<NftRecord>>;

    /// Offers this account has sent that are not yet claimed.
    async fn outstanding_airdrops(&self, account_id: &str) -> anyhow::Result<Vec<PendingAirdrop>> {
        anyhow::bail!(
            "{} source does not list outstanding airdrops for {}",
            self.kind(),
            account_id
        )
    }

    /// Offers waiting for this account to claim.
    async fn pending_airdrops(&self, account_id: &str) -> anyhow::Result<Vec<PendingAirdrop>> {
        anyhow::bail!(
            "{} source does not list pending airdrops for {}",
            self.kind(),
            account_id
        )
    }
}

/// Parse a quantity the way the read APIs emit it: decimal string or number.
pub(crate) fn parse_quantity(value: &serde_json::Value) -> anyhow::Result<i64> {
    match value {
        serde_json::Value::String(s) => s
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid quantity '{}': {}", s, e)),
        serde_json::Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| anyhow::anyhow!("quantity {} out of range", n)),
        other => anyhow::bail!("expected quantity, got {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_quantity_forms() {
        assert_eq!(parse_quantity(&json!("10")).unwrap(), 10);
        assert_eq!(parse_quantity(&json!(-3)).unwrap(), -3);
        assert!(parse_quantity(&json!("ten")).is_err());
        assert!(parse_quantity(&json!(null)).is_err());
    }

    #[test]
    fn test_nft_record_matches_triple() {
        let record = NftRecord {
            account_id: "0.0.5".to_string(),
            token_id: "0.0.9".to_string(),
            serial: 2,
        };
        assert!(record.matches("0.0.5", "0.0.9", 2));
        assert!(!record.matches("0.0.5", "0.0.9", 3));
        assert!(!record.matches("0.0.6", "0.0.9", 2));
    }
}
