//! Mirror double with configurable indexing lag.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;

use super::ledger::{LedgerState, MockLedger};
use crate::sources::{LedgerStateSource, NftRecord, PendingAirdrop, SourceKind, TokenRelationship};

struct View {
    latest: u64,
    served: LedgerState,
    stale_reads: u32,
}

/// Eventual read path over a [`MockLedger`].
///
/// After every committed change the mirror keeps answering from its previous
/// snapshot for `lag` more reads, then catches up.
pub struct MockMirror {
    ledger: Arc<MockLedger>,
    lag: u32,
    view: Mutex<View>,
}

impl MockMirror {
    /// Mirror of `ledger` that trails each change by `lag` reads.
    pub fn new(ledger: Arc<MockLedger>, lag: u32) -> Self {
        let (latest, served) = ledger.snapshot();
        Self {
            ledger,
            lag,
            view: Mutex::new(View {
                latest,
                served,
                stale_reads: 0,
            }),
        }
    }

    fn read(&self) -> LedgerState {
        let (version, fresh) = self.ledger.snapshot();
        let mut view = self.view.lock();
        if version != view.latest {
            view.latest = version;
            view.stale_reads = self.lag;
        }
        if view.stale_reads > 0 {
            view.stale_reads -= 1;
        } else {
            view.served = fresh;
        }
        view.served.clone()
    }
}

fn offers(state: &LedgerState, keep: impl Fn(&PendingAirdrop) -> bool) -> Vec<PendingAirdrop> {
    state.airdrops.iter().filter(|o| keep(o)).cloned().collect()
}

#[async_trait]
impl LedgerStateSource for MockMirror {
    fn kind(&self) -> SourceKind {
        SourceKind::Mirror
    }

    async fn hbar_balance(&self, account_id: &str) -> Result<i64> {
        let state = self.read();
        state
            .accounts
            .get(account_id)
            .map(|a| a.balance)
            .ok_or_else(|| anyhow!("account {} not indexed", account_id))
    }

    async fn token_relationships(&self, account_id: &str) -> Result<Vec<TokenRelationship>> {
        let state = self.read();
        let account = state
            .accounts
            .get(account_id)
            .ok_or_else(|| anyhow!("account {} not indexed", account_id))?;
        Ok(account
            .tokens
            .iter()
            .filter(|(_, r)| r.balance != 0)
            .map(|(token_id, r)| TokenRelationship {
                token_id: token_id.clone(),
                balance: r.balance,
                frozen: r.frozen,
                kyc_granted: r.kyc_granted,
                automatic_association: r.automatic,
            })
            .collect())
    }

    async fn account_nfts(&self, account_id: &str) -> Result<Vec<NftRecord>> {
        let state = self.read();
        if !state.accounts.contains_key(account_id) {
            return Err(anyhow!("account {} not indexed", account_id));
        }
        Ok(state
            .nfts
            .iter()
            .filter(|(_, owner)| owner.as_str() == account_id)
            .map(|((token_id, serial), owner)| NftRecord {
                account_id: owner.clone(),
                token_id: token_id.clone(),
                serial: *serial,
            })
            .collect())
    }

    async fn nft_info(&self, token_id: &str, serial: u64) -> Result<Vec<NftRecord>> {
        let state = self.read();
        Ok(state
            .nfts
            .get(&(token_id.to_string(), serial))
            .map(|owner| NftRecord {
                account_id: owner.clone(),
                token_id: token_id.to_string(),
                serial,
            })
            .into_iter()
            .collect())
    }

    async fn outstanding_airdrops(&self, account_id: &str) -> Result<Vec<PendingAirdrop>> {
        Ok(offers(&self.read(), |o| o.sender_id == account_id))
    }

    async fn pending_airdrops(&self, account_id: &str) -> Result<Vec<PendingAirdrop>> {
        Ok(offers(&self.read(), |o| o.receiver_id == account_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::ControlRpc;
    use serde_json::json;

    #[tokio::test]
    async fn test_mirror_trails_ledger() {
        let ledger = Arc::new(MockLedger::new());
        let mirror = MockMirror::new(ledger.clone(), 2);
        let operator = ledger.operator_id();
        let before = mirror.hbar_balance(operator).await.unwrap();

        ledger
            .call(
                "setup",
                json!({
                    "operatorAccountId": operator,
                    "operatorPrivateKey": ledger.operator_key().private_der,
                }),
            )
            .await
            .unwrap();
        ledger
            .call(
                "createAccount",
                json!({ "key": ledger.operator_key().public_der, "initialBalance": "100" }),
            )
            .await
            .unwrap();

        assert_eq!(mirror.hbar_balance(operator).await.unwrap(), before);
        assert_eq!(mirror.hbar_balance(operator).await.unwrap(), before);
        assert_eq!(mirror.hbar_balance(operator).await.unwrap(), before - 100);
    }

    #[tokio::test]
    async fn test_unknown_account_is_error() {
        let ledger = Arc::new(MockLedger::new());
        let mirror = MockMirror::new(ledger, 0);
        assert!(mirror.hbar_balance("0.0.424242").await.is_err());
        assert!(mirror.nft_info("0.0.5", 1).await.unwrap().is_empty());
    }
}
