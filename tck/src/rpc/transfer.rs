//! Fluent construction of `transferCrypto` requests.

use std::collections::BTreeMap;

use crate::fixtures::keys::KeyMaterial;

use super::request::{
    CommonTransactionParams, HbarTransfer, NftTransfer, TokenTransfer, TransferEntry,
    TransferLine, TransferParams,
};

/// Asset whose amounts must net to zero inside one transfer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Asset {
    /// Native currency
    Hbar,
    /// Fungible token
    Token(String),
}

/// Builder for [`TransferParams`].
///
/// ```ignore
/// let transfer = TransferBuilder::new()
///     .hbar(&sender.account_id, -10)
///     .hbar(&receiver.account_id, 10)
///     .signed_by(&sender.key)
///     .build();
/// ```
#[derive(Debug, Clone, Default)]
pub struct TransferBuilder {
    entries: Vec<TransferEntry>,
    signers: Vec<String>,
    max_transaction_fee: Option<i64>,
}

impl TransferBuilder {
    /// Empty transfer.
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, line: TransferLine, approved: bool) -> Self {
        self.entries.push(TransferEntry { line, approved });
        self
    }

    /// Hbar line.
    pub fn hbar(self, account_id: impl Into<String>, amount: i64) -> Self {
        self.push(
            TransferLine::Hbar(HbarTransfer {
                account_id: account_id.into(),
                amount,
            }),
            false,
        )
    }

    /// Hbar debit spent through an allowance.
    pub fn approved_hbar(self, account_id: impl Into<String>, amount: i64) -> Self {
        self.push(
            TransferLine::Hbar(HbarTransfer {
                account_id: account_id.into(),
                amount,
            }),
            true,
        )
    }

    /// Fungible token line.
    pub fn token(
        self,
        account_id: impl Into<String>,
        token_id: impl Into<String>,
        amount: i64,
    ) -> Self {
        self.push(
            TransferLine::Token(TokenTransfer {
                account_id: account_id.into(),
                token_id: token_id.into(),
                amount,
                decimals: None,
            }),
            false,
        )
    }

    /// Fungible token line with an expected decimals check.
    pub fn token_with_decimals(
        self,
        account_id: impl Into<String>,
        token_id: impl Into<String>,
        amount: i64,
        decimals: u32,
    ) -> Self {
        self.push(
            TransferLine::Token(TokenTransfer {
                account_id: account_id.into(),
                token_id: token_id.into(),
                amount,
                decimals: Some(decimals),
            }),
            false,
        )
    }

    /// Fungible token debit spent through an allowance.
    pub fn approved_token(
        self,
        account_id: impl Into<String>,
        token_id: impl Into<String>,
        amount: i64,
    ) -> Self {
        self.push(
            TransferLine::Token(TokenTransfer {
                account_id: account_id.into(),
                token_id: token_id.into(),
                amount,
                decimals: None,
            }),
            true,
        )
    }

    /// NFT movement.
    pub fn nft(
        self,
        sender: impl Into<String>,
        receiver: impl Into<String>,
        token_id: impl Into<String>,
        serial: u64,
    ) -> Self {
        self.push(
            TransferLine::Nft(NftTransfer {
                sender_account_id: sender.into(),
                receiver_account_id: receiver.into(),
                token_id: token_id.into(),
                serial_number: serial,
            }),
            false,
        )
    }

    /// NFT movement spent through an allowance.
    pub fn approved_nft(
        self,
        sender: impl Into<String>,
        receiver: impl Into<String>,
        token_id: impl Into<String>,
        serial: u64,
    ) -> Self {
        self.push(
            TransferLine::Nft(NftTransfer {
                sender_account_id: sender.into(),
                receiver_account_id: receiver.into(),
                token_id: token_id.into(),
                serial_number: serial,
            }),
            true,
        )
    }

    /// Add a DER-hex private key to the signer list.
    pub fn signer(mut self, private_key_der: impl Into<String>) -> Self {
        self.signers.push(private_key_der.into());
        self
    }

    /// Sign with a fixture key.
    pub fn signed_by(self, key: &KeyMaterial) -> Self {
        self.signer(key.private_der.clone())
    }

    /// Cap the transaction fee.
    pub fn max_transaction_fee(mut self, fee: i64) -> Self {
        self.max_transaction_fee = Some(fee);
        self
    }

    /// Finish the request parameters.
    pub fn build(self) -> TransferParams {
        let common = if self.signers.is_empty() && self.max_transaction_fee.is_none() {
            None
        } else {
            Some(CommonTransactionParams {
                signers: self.signers,
                max_transaction_fee: self.max_transaction_fee,
            })
        };

        TransferParams {
            transfers: self.entries,
            common_transaction_params: common,
        }
    }
}

impl TransferParams {
    /// Net amount per asset across all lines.
    pub fn net_by_asset(&self) -> BTreeMap<Asset, i128> {
        let mut net = BTreeMap::new();
        for entry in &self.transfers {
            match &entry.line {
                TransferLine::Hbar(h) => {
                    *net.entry(Asset::Hbar).or_insert(0) += i128::from(h.amount);
                }
                TransferLine::Token(t) => {
                    *net.entry(Asset::Token(t.token_id.clone())).or_insert(0) +=
                        i128::from(t.amount);
                }
                TransferLine::Nft(_) => {}
            }
        }
        net
    }

    /// Whether every asset nets to zero.
    pub fn is_balanced(&self) -> bool {
        self.net_by_asset().values().all(|n| *n == 0)
    }

    /// Signers attached to the request.
    pub fn signers(&self) -> &[String] {
        self.common_transaction_params
            .as_ref()
            .map(|c| c.signers.as_slice())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_builder_collects_lines_and_signers() {
        let transfer = TransferBuilder::new()
            .hbar("0.0.1001", -10)
            .hbar("0.0.1002", 10)
            .nft("0.0.1001", "0.0.1002", "0.0.3000", 1)
            .signer("302e")
            .build();

        assert_eq!(transfer.transfers.len(), 3);
        assert_eq!(transfer.signers(), ["302e".to_string()]);
        assert!(transfer.is_balanced());
    }

    #[test]
    fn test_unbalanced_token_detected() {
        let transfer = TransferBuilder::new()
            .token("0.0.1001", "0.0.3000", -10)
            .token("0.0.1002", "0.0.3000", 9)
            .build();
        assert!(!transfer.is_balanced());
        assert_eq!(
            transfer.net_by_asset().get(&Asset::Token("0.0.3000".to_string())),
            Some(&-1)
        );
    }

    #[test]
    fn test_no_common_params_without_signers() {
        let transfer = TransferBuilder::new().hbar("0.0.1001", 0).build();
        assert!(transfer.common_transaction_params.is_none());
        assert!(transfer.signers().is_empty());
    }

    proptest! {
        #[test]
        fn prop_mirrored_lines_balance(
            amounts in proptest::collection::vec(1i64..1_000_000, 1..8),
        ) {
            let mut builder = TransferBuilder::new();
            for (i, amount) in amounts.iter().enumerate() {
                builder = builder
                    .hbar(format!("0.0.{}", 1000 + i), -amount)
                    .hbar(format!("0.0.{}", 2000 + i), *amount)
                    .token(format!("0.0.{}", 1000 + i), "0.0.5", *amount)
                    .token(format!("0.0.{}", 2000 + i), "0.0.5", -amount);
            }
            prop_assert!(builder.build().is_balanced());
        }

        #[test]
        fn prop_single_nonzero_line_unbalanced(amount in 1i64..i64::MAX) {
            let transfer = TransferBuilder::new().hbar("0.0.1001", amount).build();
            prop_assert!(!transfer.is_balanced());
        }
    }
}
