//! Dual-source state verification with bounded retry.
//!
//! After a mutation settles on the SUT, both read paths must report the
//! expected state. The strong source usually agrees within a read or two; the
//! eventual source lags by its indexing delay. Checks are therefore single
//! attempts returning [`Mismatch`], and [`retry_until_ok`] polls them under a
//! fixed-delay [`RetryPolicy`]. Only reads are retried, never the operation.

pub mod checks;
pub mod mismatch;
pub mod retry;

use std::future::Future;
use std::sync::Arc;

use log::{debug, info};

use crate::error::{Result, TckError};
use crate::identity::NftId;
use crate::sources::LedgerStateSource;

pub use checks::{check, Expectation};
pub use mismatch::{Mismatch, Observation, Observed};
pub use retry::{retry_until_ok, RetryExhausted, RetryPolicy};

/// Polls a strong and an eventual source until both match an expectation.
#[derive(Clone)]
pub struct DualSourceVerifier {
    strong: Arc<dyn LedgerStateSource>,
    eventual: Arc<dyn LedgerStateSource>,
    policy: RetryPolicy,
}

impl DualSourceVerifier {
    /// Verifier over two sources.
    pub fn new(
        strong: Arc<dyn LedgerStateSource>,
        eventual: Arc<dyn LedgerStateSource>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            strong,
            eventual,
            policy,
        }
    }

    /// Same sources, different policy.
    pub fn with_policy(&self, policy: RetryPolicy) -> Self {
        Self {
            policy,
            ..self.clone()
        }
    }

    /// Active retry policy.
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Strongly consistent source.
    pub fn strong(&self) -> &dyn LedgerStateSource {
        self.strong.as_ref()
    }

    /// Eventually consistent source.
    pub fn eventual(&self) -> &dyn LedgerStateSource {
        self.eventual.as_ref()
    }

    /// Poll an arbitrary check under this verifier's policy.
    pub async fn verify_with_retry<F, Fut>(&self, check: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<(), Mismatch>>,
    {
        retry_until_ok(self.policy, check)
            .await
            .map_err(|exhausted| TckError::ConvergenceTimeout {
                attempts: exhausted.attempts,
                last: exhausted.last,
            })
    }

    /// Poll one expectation until both sources agree with it.
    pub async fn verify(&self, expectation: &Expectation) -> Result<()> {
        debug!("verifying {}", expectation);
        self.verify_with_retry(|| check(self.strong(), self.eventual(), expectation))
            .await?;
        debug!("verified {}", expectation);
        Ok(())
    }

    /// Verify each expectation in order.
    pub async fn verify_all(&self, expectations: &[Expectation]) -> Result<()> {
        for expectation in expectations {
            self.verify(expectation).await?;
        }
        if !expectations.is_empty() {
            info!("{} state expectations converged", expectations.len());
        }
        Ok(())
    }

    /// Native balance on both sources.
    pub async fn verify_hbar_balance(&self, account_id: &str, amount: i64) -> Result<()> {
        self.verify(&Expectation::hbar(account_id, amount)).await
    }

    /// Token balance on both sources, absence counted as zero.
    pub async fn verify_token_balance(
        &self,
        account_id: &str,
        token_id: &str,
        amount: i64,
    ) -> Result<()> {
        self.verify(&Expectation::token(account_id, token_id, amount))
            .await
    }

    /// NFT possession on both sources.
    pub async fn verify_nft_possession(&self, owner: &str, nft: &NftId, held: bool) -> Result<()> {
        self.verify(&Expectation::NftPossession {
            owner: owner.to_string(),
            nft: nft.clone(),
            held,
        })
        .await
    }

    /// Presence of an unclaimed airdrop offer.
    pub async fn verify_pending_airdrop(
        &self,
        sender: &str,
        receiver: &str,
        token_id: &str,
        amount: Option<i64>,
        serial: Option<u64>,
    ) -> Result<()> {
        self.verify(&Expectation::PendingAirdrop {
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            token_id: token_id.to_string(),
            amount,
            serial,
            present: true,
        })
        .await
    }

    /// Current native balance on the strong source, retrying failed reads.
    ///
    /// Used to capture baselines for relative expectations.
    pub async fn strong_hbar_balance(&self, account_id: &str) -> Result<i64> {
        retry_until_ok(self.policy, || self.strong.hbar_balance(account_id))
            .await
            .map_err(|exhausted| {
                TckError::Other(exhausted.last.context(format!(
                    "reading baseline balance of {} ({} attempts)",
                    account_id, exhausted.attempts
                )))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{NftRecord, SourceKind, TokenRelationship};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    /// Reports `target` only after `lag` reads.
    struct Lagging {
        kind: SourceKind,
        lag: u32,
        reads: AtomicU32,
        target: i64,
    }

    impl Lagging {
        fn new(kind: SourceKind, lag: u32, target: i64) -> Arc<Self> {
            Arc::new(Self {
                kind,
                lag,
                reads: AtomicU32::new(0),
                target,
            })
        }
    }

    #[async_trait]
    impl LedgerStateSource for Lagging {
        fn kind(&self) -> SourceKind {
            self.kind
        }

        async fn hbar_balance(&self, _account_id: &str) -> anyhow::Result<i64> {
            let read = self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(if read >= self.lag { self.target } else { 0 })
        }

        async fn token_relationships(
            &self,
            _account_id: &str,
        ) -> anyhow::Result<Vec<TokenRelationship>> {
            Ok(Vec::new())
        }

        async fn account_nfts(&self, _account_id: &str) -> anyhow::Result<Vec<NftRecord>> {
            Ok(Vec::new())
        }

        async fn nft_info(&self, _token_id: &str, _serial: u64) -> anyhow::Result<Vec<NftRecord>> {
            Ok(Vec::new())
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::new(5, Duration::from_millis(1000))
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_eventual_source() {
        let strong = Lagging::new(SourceKind::Consensus, 0, 10);
        let eventual = Lagging::new(SourceKind::Mirror, 3, 10);
        let verifier = DualSourceVerifier::new(strong, eventual.clone(), policy());

        let start = Instant::now();
        verifier.verify_hbar_balance("0.0.5", 10).await.unwrap();
        assert_eq!(eventual.reads.load(Ordering::SeqCst), 4);
        assert_eq!(start.elapsed(), Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_convergence_timeout_carries_last_observations() {
        let strong = Lagging::new(SourceKind::Consensus, 0, 10);
        let eventual = Lagging::new(SourceKind::Mirror, 100, 10);
        let verifier = DualSourceVerifier::new(strong, eventual, policy());

        let err = verifier.verify_hbar_balance("0.0.5", 10).await.unwrap_err();
        let TckError::ConvergenceTimeout { attempts, last } = err else {
            panic!("expected convergence timeout, got {}", err);
        };
        assert_eq!(attempts, 5);
        assert_eq!(
            last.observed_by(SourceKind::Consensus),
            Some(&Observed::Value("10".to_string()))
        );
        assert_eq!(
            last.observed_by(SourceKind::Mirror),
            Some(&Observed::Value("0".to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_absent_token_relationship_is_zero_on_both() {
        let strong = Lagging::new(SourceKind::Consensus, 0, 0);
        let eventual = Lagging::new(SourceKind::Mirror, 0, 0);
        let verifier = DualSourceVerifier::new(strong, eventual, RetryPolicy::once());
        verifier
            .verify_token_balance("0.0.5", "0.0.9", 0)
            .await
            .unwrap();
    }
}
