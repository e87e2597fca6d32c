//! Account fixtures.

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TckError};
use crate::rpc::request::{
    Allowance, AllowanceKind, ApproveAllowanceParams, CommonTransactionParams,
    CreateAccountParams, DeleteAccountParams, HbarAllowance, NftAllowance, TokenAllowance,
    UpdateAccountParams,
};
use crate::rpc::OperationRequest;

use super::keys::{self, KeyMaterial, KeyScheme};
use super::Fixtures;

/// An account created for one test, with the key that controls it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestAccount {
    /// Ledger id
    pub account_id: String,
    /// Controlling key
    pub key: KeyMaterial,
}

/// `createAccount` options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountOptions {
    /// Initial balance funded by the operator
    pub initial_balance: i64,
    /// Automatic token association slots, -1 for unlimited
    pub max_auto_token_associations: Option<i64>,
    /// Set the key's EVM address as alias (secp256k1 keys only)
    pub evm_alias: bool,
    /// Credits require the receiver's signature
    pub receiver_signature_required: bool,
    /// Account memo
    pub memo: Option<String>,
}

impl Default for AccountOptions {
    fn default() -> Self {
        Self {
            initial_balance: 0,
            max_auto_token_associations: None,
            evm_alias: false,
            receiver_signature_required: false,
            memo: None,
        }
    }
}

impl AccountOptions {
    /// Options funding the account with `balance`.
    pub fn funded(balance: i64) -> Self {
        Self {
            initial_balance: balance,
            ..Default::default()
        }
    }

    /// Set the automatic association limit.
    pub fn with_auto_associations(mut self, slots: i64) -> Self {
        self.max_auto_token_associations = Some(slots);
        self
    }

    /// Use the key's EVM address as alias.
    pub fn with_evm_alias(mut self) -> Self {
        self.evm_alias = true;
        self
    }

    /// Require the receiver's signature on credits.
    pub fn with_receiver_signature_required(mut self) -> Self {
        self.receiver_signature_required = true;
        self
    }
}

fn signed_by(key: &KeyMaterial) -> Option<CommonTransactionParams> {
    Some(CommonTransactionParams::signed_by([key.private_der.clone()]))
}

impl Fixtures {
    /// Generate key material locally.
    pub fn generate_key(&self, scheme: KeyScheme) -> KeyMaterial {
        KeyMaterial::generate(scheme, self.rng())
    }

    /// Generate key material on the SUT through `generateKey`.
    pub async fn generate_key_remote(&self, scheme: KeyScheme) -> Result<KeyMaterial> {
        keys::generate_remote(self.client(), scheme).await
    }

    /// Create an account controlled by `key`.
    pub async fn create_account(
        &self,
        key: KeyMaterial,
        options: AccountOptions,
    ) -> Result<TestAccount> {
        let alias = if options.evm_alias {
            let address = key.evm_address().ok_or_else(|| {
                TckError::Other(anyhow::anyhow!(
                    "{} keys have no EVM address to use as alias",
                    key.scheme
                ))
            })?;
            Some(format!("0x{}", address))
        } else {
            None
        };

        // Aliased and receiver-signature accounts need the new key's signature.
        let common = if alias.is_some() || options.receiver_signature_required {
            signed_by(&key)
        } else {
            None
        };

        let result = self
            .require(OperationRequest::CreateAccount(CreateAccountParams {
                key: Some(key.public_der.clone()),
                initial_balance: Some(options.initial_balance),
                max_auto_token_associations: options.max_auto_token_associations,
                alias,
                receiver_signature_required: options
                    .receiver_signature_required
                    .then_some(true),
                memo: options.memo,
                common_transaction_params: common,
            }))
            .await?;

        let account_id = result
            .account_id()
            .ok_or_else(|| TckError::Other(anyhow::anyhow!("createAccount returned no accountId")))?
            .to_string();

        info!(
            "created account {} ({} key, balance {})",
            account_id, key.scheme, options.initial_balance
        );
        let account = TestAccount { account_id, key };
        self.track(&account);
        Ok(account)
    }

    /// Fresh Ed25519 account funded with `balance`.
    pub async fn create_funded_account(&self, balance: i64) -> Result<TestAccount> {
        let key = self.generate_key(KeyScheme::Ed25519);
        self.create_account(key, AccountOptions::funded(balance)).await
    }

    /// Delete `account`, moving its balance to `beneficiary` (the operator if `None`).
    pub async fn delete_account(
        &self,
        account: &TestAccount,
        beneficiary: Option<&str>,
    ) -> Result<()> {
        let beneficiary = beneficiary
            .unwrap_or(&self.operator().account_id)
            .to_string();
        self.require(OperationRequest::DeleteAccount(DeleteAccountParams {
            delete_account_id: account.account_id.clone(),
            transfer_account_id: beneficiary,
            common_transaction_params: signed_by(&account.key),
        }))
        .await?;
        self.untrack(&account.account_id);
        Ok(())
    }

    /// Change the automatic association limit of an account.
    pub async fn set_auto_associations(&self, account: &TestAccount, slots: i64) -> Result<()> {
        self.require(OperationRequest::UpdateAccount(UpdateAccountParams {
            account_id: account.account_id.clone(),
            max_auto_token_associations: Some(slots),
            common_transaction_params: signed_by(&account.key),
            ..Default::default()
        }))
        .await
        .map(|_| ())
    }

    async fn approve(&self, owner: &TestAccount, spender: &str, kind: AllowanceKind) -> Result<()> {
        self.require(OperationRequest::ApproveAllowance(ApproveAllowanceParams {
            allowances: vec![Allowance {
                owner_account_id: owner.account_id.clone(),
                spender_account_id: spender.to_string(),
                kind,
            }],
            common_transaction_params: signed_by(&owner.key),
        }))
        .await
        .map(|_| ())
    }

    /// Let `spender` move up to `amount` tinybar out of `owner`.
    pub async fn approve_hbar_allowance(
        &self,
        owner: &TestAccount,
        spender: &str,
        amount: i64,
    ) -> Result<()> {
        self.approve(owner, spender, AllowanceKind::Hbar(HbarAllowance { amount }))
            .await
    }

    /// Let `spender` move up to `amount` of `token_id` out of `owner`.
    pub async fn approve_token_allowance(
        &self,
        owner: &TestAccount,
        spender: &str,
        token_id: &str,
        amount: i64,
    ) -> Result<()> {
        self.approve(
            owner,
            spender,
            AllowanceKind::Token(TokenAllowance {
                token_id: token_id.to_string(),
                amount,
            }),
        )
        .await
    }

    /// Let `spender` move the given serials of `token_id` out of `owner`.
    pub async fn approve_nft_allowance(
        &self,
        owner: &TestAccount,
        spender: &str,
        token_id: &str,
        serials: &[u64],
    ) -> Result<()> {
        self.approve(
            owner,
            spender,
            AllowanceKind::Nft(NftAllowance {
                token_id: token_id.to_string(),
                serial_numbers: serials.to_vec(),
                approved_for_all: None,
            }),
        )
        .await
    }
}
