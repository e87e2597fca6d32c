//! Single-attempt checks against both read sources.

use std::fmt;

use futures::join;
use serde::{Deserialize, Serialize};

use crate::identity::NftId;
use crate::sources::{LedgerStateSource, PendingAirdrop, SourceKind};

use super::mismatch::{Mismatch, Observed};

/// State a test expects once an operation has settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "check")]
pub enum Expectation {
    /// Native currency balance
    HbarBalance {
        /// Account id
        account_id: String,
        /// Expected balance
        amount: i64,
    },
    /// Fungible token balance; a missing relationship counts as zero
    TokenBalance {
        /// Account id
        account_id: String,
        /// Token id
        token_id: String,
        /// Expected balance
        amount: i64,
    },
    /// Whether `owner` holds one NFT serial
    NftPossession {
        /// Account id
        owner: String,
        /// Token and serial
        nft: NftId,
        /// Expected possession
        held: bool,
    },
    /// Whether an unclaimed airdrop offer exists
    PendingAirdrop {
        /// Offering account
        sender: String,
        /// Receiving account
        receiver: String,
        /// Token id
        token_id: String,
        /// Fungible amount, `None` for NFT offers
        amount: Option<i64>,
        /// Serial for NFT offers
        serial: Option<u64>,
        /// Expected presence
        present: bool,
    },
}

impl Expectation {
    /// Hbar balance expectation.
    pub fn hbar(account_id: impl Into<String>, amount: i64) -> Self {
        Self::HbarBalance {
            account_id: account_id.into(),
            amount,
        }
    }

    /// Token balance expectation.
    pub fn token(account_id: impl Into<String>, token_id: impl Into<String>, amount: i64) -> Self {
        Self::TokenBalance {
            account_id: account_id.into(),
            token_id: token_id.into(),
            amount,
        }
    }

    /// NFT possession expectation.
    pub fn nft(
        owner: impl Into<String>,
        token_id: impl Into<String>,
        serial: u64,
        held: bool,
    ) -> Self {
        Self::NftPossession {
            owner: owner.into(),
            nft: NftId::new(token_id, serial),
            held,
        }
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HbarBalance { account_id, amount } => {
                write!(f, "{} holds {} tinybar", account_id, amount)
            }
            Self::TokenBalance {
                account_id,
                token_id,
                amount,
            } => write!(f, "{} holds {} of {}", account_id, amount, token_id),
            Self::NftPossession { owner, nft, held } => {
                let verb = if *held { "holds" } else { "does not hold" };
                write!(f, "{} {} {}", owner, verb, nft)
            }
            Self::PendingAirdrop {
                sender,
                receiver,
                token_id,
                present,
                ..
            } => {
                let verb = if *present { "has" } else { "has no" };
                write!(f, "{} {} pending {} offer to {}", sender, verb, token_id, receiver)
            }
        }
    }
}

/// Compare every source's reading with `expected`.
fn judge<T>(
    subject: String,
    expected: &T,
    readings: Vec<(SourceKind, anyhow::Result<T>)>,
) -> Result<(), Mismatch>
where
    T: PartialEq + fmt::Display,
{
    let mut mismatch = Mismatch::new(subject, expected);
    let mut agreed = true;

    for (source, reading) in readings {
        let observed = match reading {
            Ok(value) => {
                agreed &= &value == expected;
                Observed::Value(value.to_string())
            }
            Err(e) => {
                agreed = false;
                Observed::ReadError(format!("{:#}", e))
            }
        };
        mismatch = mismatch.observe(source, observed);
    }

    if agreed {
        Ok(())
    } else {
        Err(mismatch)
    }
}

async fn token_balance(
    source: &dyn LedgerStateSource,
    account_id: &str,
    token_id: &str,
) -> anyhow::Result<i64> {
    let relationships = source.token_relationships(account_id).await?;
    // Zero-balance associations are not reliably echoed; absence reads as 0.
    Ok(relationships
        .iter()
        .find(|r| r.token_id == token_id)
        .map(|r| r.balance)
        .unwrap_or(0))
}

async fn holds_nft(
    source: &dyn LedgerStateSource,
    owner: &str,
    nft: &NftId,
) -> anyhow::Result<bool> {
    let records = match source.kind() {
        SourceKind::Consensus => source.nft_info(&nft.token_id, nft.serial).await?,
        SourceKind::Mirror => source.account_nfts(owner).await?,
    };
    Ok(records
        .iter()
        .any(|r| r.matches(owner, &nft.token_id, nft.serial)))
}

fn offer_matches(
    offer: &PendingAirdrop,
    receiver: &str,
    token_id: &str,
    amount: Option<i64>,
    serial: Option<u64>,
) -> bool {
    offer.receiver_id == receiver
        && offer.token_id == token_id
        && (amount.is_none() || offer.amount == amount)
        && (serial.is_none() || offer.serial == serial)
}

/// Native balance on both sources.
pub async fn check_hbar_balance(
    strong: &dyn LedgerStateSource,
    eventual: &dyn LedgerStateSource,
    account_id: &str,
    expected: i64,
) -> Result<(), Mismatch> {
    let (s, e) = join!(strong.hbar_balance(account_id), eventual.hbar_balance(account_id));
    judge(
        format!("hbar balance of {}", account_id),
        &expected,
        vec![(strong.kind(), s), (eventual.kind(), e)],
    )
}

/// Token balance on both sources.
pub async fn check_token_balance(
    strong: &dyn LedgerStateSource,
    eventual: &dyn LedgerStateSource,
    account_id: &str,
    token_id: &str,
    expected: i64,
) -> Result<(), Mismatch> {
    let (s, e) = join!(
        token_balance(strong, account_id, token_id),
        token_balance(eventual, account_id, token_id)
    );
    judge(
        format!("{} balance of {}", token_id, account_id),
        &expected,
        vec![(strong.kind(), s), (eventual.kind(), e)],
    )
}

/// NFT possession on both sources, each scanned independently.
pub async fn check_nft_possession(
    strong: &dyn LedgerStateSource,
    eventual: &dyn LedgerStateSource,
    owner: &str,
    nft: &NftId,
    held: bool,
) -> Result<(), Mismatch> {
    let (s, e) = join!(holds_nft(strong, owner, nft), holds_nft(eventual, owner, nft));
    judge(
        format!("possession of {} by {}", nft, owner),
        &held,
        vec![(strong.kind(), s), (eventual.kind(), e)],
    )
}

/// Unclaimed airdrop offer, read from the sender's outstanding list.
///
/// Only the eventual source lists offers, so only it is consulted.
pub async fn check_pending_airdrop(
    eventual: &dyn LedgerStateSource,
    sender: &str,
    receiver: &str,
    token_id: &str,
    amount: Option<i64>,
    serial: Option<u64>,
    present: bool,
) -> Result<(), Mismatch> {
    let found = eventual.outstanding_airdrops(sender).await.map(|offers| {
        offers
            .iter()
            .any(|o| offer_matches(o, receiver, token_id, amount, serial))
    });
    judge(
        format!("pending {} offer from {} to {}", token_id, sender, receiver),
        &present,
        vec![(eventual.kind(), found)],
    )
}

/// Run one expectation once.
pub async fn check(
    strong: &dyn LedgerStateSource,
    eventual: &dyn LedgerStateSource,
    expectation: &Expectation,
) -> Result<(), Mismatch> {
    match expectation {
        Expectation::HbarBalance { account_id, amount } => {
            check_hbar_balance(strong, eventual, account_id, *amount).await
        }
        Expectation::TokenBalance {
            account_id,
            token_id,
            amount,
        } => check_token_balance(strong, eventual, account_id, token_id, *amount).await,
        Expectation::NftPossession { owner, nft, held } => {
            check_nft_possession(strong, eventual, owner, nft, *held).await
        }
        Expectation::PendingAirdrop {
            sender,
            receiver,
            token_id,
            amount,
            serial,
            present,
        } => {
            check_pending_airdrop(eventual, sender, receiver, token_id, *amount, *serial, *present)
                .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{NftRecord, TokenRelationship};
    use async_trait::async_trait;

    struct Snapshot {
        kind: SourceKind,
        hbar: Option<i64>,
        tokens: Vec<TokenRelationship>,
        nfts: Vec<NftRecord>,
    }

    impl Snapshot {
        fn new(kind: SourceKind) -> Self {
            Self {
                kind,
                hbar: Some(0),
                tokens: Vec::new(),
                nfts: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl LedgerStateSource for Snapshot {
        fn kind(&self) -> SourceKind {
            self.kind
        }

        async fn hbar_balance(&self, account_id: &str) -> anyhow::Result<i64> {
            self.hbar
                .ok_or_else(|| anyhow::anyhow!("no account {}", account_id))
        }

        async fn token_relationships(
            &self,
            _account_id: &str,
        ) -> anyhow::Result<Vec<TokenRelationship>> {
            Ok(self.tokens.clone())
        }

        async fn account_nfts(&self, account_id: &str) -> anyhow::Result<Vec<NftRecord>> {
            Ok(self
                .nfts
                .iter()
                .filter(|n| n.account_id == account_id)
                .cloned()
                .collect())
        }

        async fn nft_info(&self, token_id: &str, serial: u64) -> anyhow::Result<Vec<NftRecord>> {
            Ok(self
                .nfts
                .iter()
                .filter(|n| n.token_id == token_id && n.serial == serial)
                .cloned()
                .collect())
        }
    }

    fn relationship(token_id: &str, balance: i64) -> TokenRelationship {
        TokenRelationship {
            token_id: token_id.to_string(),
            balance,
            frozen: false,
            kyc_granted: false,
            automatic_association: false,
        }
    }

    #[tokio::test]
    async fn test_hbar_agreement() {
        let mut strong = Snapshot::new(SourceKind::Consensus);
        let mut eventual = Snapshot::new(SourceKind::Mirror);
        strong.hbar = Some(10);
        eventual.hbar = Some(10);
        assert!(check_hbar_balance(&strong, &eventual, "0.0.5", 10).await.is_ok());
    }

    #[tokio::test]
    async fn test_hbar_lagging_source_reported() {
        let mut strong = Snapshot::new(SourceKind::Consensus);
        let eventual = Snapshot::new(SourceKind::Mirror);
        strong.hbar = Some(10);

        let mismatch = check_hbar_balance(&strong, &eventual, "0.0.5", 10)
            .await
            .unwrap_err();
        assert_eq!(
            mismatch.observed_by(SourceKind::Consensus),
            Some(&Observed::Value("10".to_string()))
        );
        assert_eq!(
            mismatch.observed_by(SourceKind::Mirror),
            Some(&Observed::Value("0".to_string()))
        );
    }

    #[tokio::test]
    async fn test_read_error_is_mismatch() {
        let strong = Snapshot::new(SourceKind::Consensus);
        let mut eventual = Snapshot::new(SourceKind::Mirror);
        eventual.hbar = None;

        let mismatch = check_hbar_balance(&strong, &eventual, "0.0.5", 0)
            .await
            .unwrap_err();
        assert!(matches!(
            mismatch.observed_by(SourceKind::Mirror),
            Some(Observed::ReadError(_))
        ));
    }

    #[tokio::test]
    async fn test_absent_relationship_counts_as_zero() {
        let mut strong = Snapshot::new(SourceKind::Consensus);
        let eventual = Snapshot::new(SourceKind::Mirror);
        strong.tokens.push(relationship("0.0.9", 0));

        // Strong echoes the zero association, eventual omits it.
        assert!(check_token_balance(&strong, &eventual, "0.0.5", "0.0.9", 0)
            .await
            .is_ok());
        assert!(check_token_balance(&strong, &eventual, "0.0.5", "0.0.9", 1)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_nft_possession_scanned_on_both() {
        let record = NftRecord {
            account_id: "0.0.6".to_string(),
            token_id: "0.0.9".to_string(),
            serial: 1,
        };
        let mut strong = Snapshot::new(SourceKind::Consensus);
        let mut eventual = Snapshot::new(SourceKind::Mirror);
        strong.nfts.push(record.clone());
        eventual.nfts.push(NftRecord {
            account_id: "0.0.5".to_string(),
            ..record
        });

        let nft = NftId::new("0.0.9", 1);
        // Strong already moved the serial, eventual still shows the old owner.
        let mismatch = check_nft_possession(&strong, &eventual, "0.0.6", &nft, true)
            .await
            .unwrap_err();
        assert_eq!(
            mismatch.observed_by(SourceKind::Consensus),
            Some(&Observed::Value("true".to_string()))
        );
        assert_eq!(
            mismatch.observed_by(SourceKind::Mirror),
            Some(&Observed::Value("false".to_string()))
        );
        assert!(check_nft_possession(&strong, &eventual, "0.0.7", &nft, false)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_pending_airdrop_unsupported_source_is_read_error() {
        let eventual = Snapshot::new(SourceKind::Mirror);
        let mismatch =
            check_pending_airdrop(&eventual, "0.0.5", "0.0.6", "0.0.9", None, None, false)
                .await
                .unwrap_err();
        assert!(matches!(
            mismatch.observed_by(SourceKind::Mirror),
            Some(Observed::ReadError(_))
        ));
    }

    #[test]
    fn test_expectation_display() {
        assert_eq!(Expectation::hbar("0.0.5", 10).to_string(), "0.0.5 holds 10 tinybar");
        assert_eq!(
            Expectation::nft("0.0.5", "0.0.9", 2, false).to_string(),
            "0.0.5 does not hold 0.0.9/2"
        );
    }
}
