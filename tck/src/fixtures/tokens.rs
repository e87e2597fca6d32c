//! Token fixtures.

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TckError};
use crate::rpc::request::{
    AssociateTokenParams, CommonTransactionParams, CreateTokenParams, CustomFee,
    MintTokenParams, SupplyType, TokenAccountParams, TokenParams, TokenType,
    UpdateFeeScheduleParams, UpdateTokenParams,
};
use crate::rpc::OperationRequest;

use super::accounts::TestAccount;
use super::keys::{KeyMaterial, KeyScheme};
use super::Fixtures;

/// A token created for one test, with the keys that manage it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestToken {
    /// Ledger id
    pub token_id: String,
    /// Fungible or non-fungible
    pub token_type: TokenType,
    /// Treasury account
    pub treasury: TestAccount,
    /// Admin key
    pub admin_key: KeyMaterial,
    /// Supply key, used for minting
    pub supply_key: KeyMaterial,
    /// Freeze key, if the token is freezable
    pub freeze_key: Option<KeyMaterial>,
    /// KYC key, if the token requires KYC
    pub kyc_key: Option<KeyMaterial>,
    /// Pause key, if the token is pausable
    pub pause_key: Option<KeyMaterial>,
    /// Fee schedule key, if fees can be changed
    pub fee_schedule_key: Option<KeyMaterial>,
}

/// `createToken` options.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenOptions {
    /// Fungible or non-fungible
    pub token_type: TokenType,
    /// Decimals (fungible only)
    pub decimals: u32,
    /// Supply minted to the treasury (fungible only)
    pub initial_supply: i64,
    /// Finite maximum supply
    pub max_supply: Option<i64>,
    /// Create a freeze key
    pub freezable: bool,
    /// New associations start frozen
    pub freeze_default: bool,
    /// Create a KYC key
    pub kyc: bool,
    /// Create a pause key
    pub pausable: bool,
    /// Create a fee schedule key
    pub fee_schedule: bool,
    /// Initial custom fees
    pub custom_fees: Vec<CustomFee>,
}

impl Default for TokenOptions {
    fn default() -> Self {
        Self {
            token_type: TokenType::Fungible,
            decimals: 0,
            initial_supply: 1_000_000,
            max_supply: None,
            freezable: false,
            freeze_default: false,
            kyc: false,
            pausable: false,
            fee_schedule: false,
            custom_fees: Vec::new(),
        }
    }
}

impl TokenOptions {
    /// Fungible token with `initial_supply` in the treasury.
    pub fn fungible(initial_supply: i64) -> Self {
        Self {
            initial_supply,
            ..Default::default()
        }
    }

    /// Non-fungible token with no serials minted yet.
    pub fn non_fungible() -> Self {
        Self {
            token_type: TokenType::NonFungible,
            initial_supply: 0,
            ..Default::default()
        }
    }

    /// Add a freeze key.
    pub fn freezable(mut self) -> Self {
        self.freezable = true;
        self
    }

    /// Add a KYC key.
    pub fn with_kyc(mut self) -> Self {
        self.kyc = true;
        self
    }

    /// Add a pause key.
    pub fn pausable(mut self) -> Self {
        self.pausable = true;
        self
    }

    /// Add custom fees and a fee schedule key.
    pub fn with_fees(mut self, fees: Vec<CustomFee>) -> Self {
        self.fee_schedule = true;
        self.custom_fees = fees;
        self
    }
}

fn signed(keys: &[&KeyMaterial]) -> Option<CommonTransactionParams> {
    Some(CommonTransactionParams::signed_by(
        keys.iter().map(|k| k.private_der.clone()),
    ))
}

fn missing_key(token: &TestToken, role: &str) -> TckError {
    TckError::Other(anyhow::anyhow!(
        "token {} was created without a {} key",
        token.token_id,
        role
    ))
}

impl Fixtures {
    /// Create a token with `treasury` as treasury.
    pub async fn create_token(
        &self,
        treasury: &TestAccount,
        options: TokenOptions,
    ) -> Result<TestToken> {
        let optional_key = |enabled: bool| enabled.then(|| self.generate_key(KeyScheme::Ed25519));
        let admin_key = self.generate_key(KeyScheme::Ed25519);
        let supply_key = self.generate_key(KeyScheme::Ed25519);
        let freeze_key = optional_key(options.freezable);
        let kyc_key = optional_key(options.kyc);
        let pause_key = optional_key(options.pausable);
        let fee_schedule_key = optional_key(options.fee_schedule);

        let fungible = options.token_type == TokenType::Fungible;
        let symbol = self.rng().alphanumeric(4).to_uppercase();
        let custom_fees = (!options.custom_fees.is_empty()).then_some(options.custom_fees);

        let result = self
            .require(OperationRequest::CreateToken(CreateTokenParams {
                name: Some(format!("tck-{}", symbol.to_lowercase())),
                symbol: Some(symbol),
                decimals: fungible.then_some(options.decimals),
                initial_supply: fungible.then_some(options.initial_supply),
                treasury_account_id: Some(treasury.account_id.clone()),
                admin_key: Some(admin_key.public_der.clone()),
                kyc_key: kyc_key.as_ref().map(|k| k.public_der.clone()),
                freeze_key: freeze_key.as_ref().map(|k| k.public_der.clone()),
                supply_key: Some(supply_key.public_der.clone()),
                fee_schedule_key: fee_schedule_key.as_ref().map(|k| k.public_der.clone()),
                pause_key: pause_key.as_ref().map(|k| k.public_der.clone()),
                freeze_default: options.freeze_default.then_some(true),
                token_type: Some(options.token_type),
                supply_type: Some(if options.max_supply.is_some() {
                    SupplyType::Finite
                } else {
                    SupplyType::Infinite
                }),
                max_supply: options.max_supply,
                custom_fees,
                common_transaction_params: signed(&[&treasury.key, &admin_key]),
            }))
            .await?;

        let token_id = result
            .token_id()
            .ok_or_else(|| TckError::Other(anyhow::anyhow!("createToken returned no tokenId")))?
            .to_string();
        info!("created token {} with treasury {}", token_id, treasury.account_id);

        Ok(TestToken {
            token_id,
            token_type: options.token_type,
            treasury: treasury.clone(),
            admin_key,
            supply_key,
            freeze_key,
            kyc_key,
            pause_key,
            fee_schedule_key,
        })
    }

    /// Mint fungible supply into the treasury.
    pub async fn mint_fungible(&self, token: &TestToken, amount: i64) -> Result<()> {
        self.require(OperationRequest::MintToken(MintTokenParams {
            token_id: token.token_id.clone(),
            amount: Some(amount),
            metadata: None,
            common_transaction_params: signed(&[&token.supply_key]),
        }))
        .await
        .map(|_| ())
    }

    /// Mint `count` NFT serials into the treasury and return their serials.
    pub async fn mint_nfts(&self, token: &TestToken, count: usize) -> Result<Vec<u64>> {
        let metadata = (0..count).map(|i| format!("{:02x}", i % 256)).collect();
        let result = self
            .require(OperationRequest::MintToken(MintTokenParams {
                token_id: token.token_id.clone(),
                amount: None,
                metadata: Some(metadata),
                common_transaction_params: signed(&[&token.supply_key]),
            }))
            .await?;

        let serials = result.serial_numbers();
        if serials.len() != count {
            return Err(TckError::Other(anyhow::anyhow!(
                "mintToken returned {} serials, expected {}",
                serials.len(),
                count
            )));
        }
        Ok(serials)
    }

    /// Associate `account` with `tokens`.
    pub async fn associate(&self, account: &TestAccount, tokens: &[&TestToken]) -> Result<()> {
        self.require(OperationRequest::AssociateToken(AssociateTokenParams {
            account_id: account.account_id.clone(),
            token_ids: tokens.iter().map(|t| t.token_id.clone()).collect(),
            common_transaction_params: signed(&[&account.key]),
        }))
        .await
        .map(|_| ())
    }

    /// Freeze `account` for `token`.
    pub async fn freeze(&self, token: &TestToken, account: &TestAccount) -> Result<()> {
        let key = token.freeze_key.as_ref().ok_or_else(|| missing_key(token, "freeze"))?;
        self.require(OperationRequest::FreezeToken(TokenAccountParams {
            token_id: token.token_id.clone(),
            account_id: account.account_id.clone(),
            common_transaction_params: signed(&[key]),
        }))
        .await
        .map(|_| ())
    }

    /// Unfreeze `account` for `token`.
    pub async fn unfreeze(&self, token: &TestToken, account: &TestAccount) -> Result<()> {
        let key = token.freeze_key.as_ref().ok_or_else(|| missing_key(token, "freeze"))?;
        self.require(OperationRequest::UnfreezeToken(TokenAccountParams {
            token_id: token.token_id.clone(),
            account_id: account.account_id.clone(),
            common_transaction_params: signed(&[key]),
        }))
        .await
        .map(|_| ())
    }

    /// Grant KYC to `account` for `token`.
    pub async fn grant_kyc(&self, token: &TestToken, account: &TestAccount) -> Result<()> {
        let key = token.kyc_key.as_ref().ok_or_else(|| missing_key(token, "KYC"))?;
        self.require(OperationRequest::GrantTokenKyc(TokenAccountParams {
            token_id: token.token_id.clone(),
            account_id: account.account_id.clone(),
            common_transaction_params: signed(&[key]),
        }))
        .await
        .map(|_| ())
    }

    /// Pause `token`.
    pub async fn pause(&self, token: &TestToken) -> Result<()> {
        let key = token.pause_key.as_ref().ok_or_else(|| missing_key(token, "pause"))?;
        self.require(OperationRequest::PauseToken(TokenParams {
            token_id: token.token_id.clone(),
            common_transaction_params: signed(&[key]),
        }))
        .await
        .map(|_| ())
    }

    /// Unpause `token`.
    pub async fn unpause(&self, token: &TestToken) -> Result<()> {
        let key = token.pause_key.as_ref().ok_or_else(|| missing_key(token, "pause"))?;
        self.require(OperationRequest::UnpauseToken(TokenParams {
            token_id: token.token_id.clone(),
            common_transaction_params: signed(&[key]),
        }))
        .await
        .map(|_| ())
    }

    /// Replace the custom fee schedule of `token`.
    pub async fn update_fee_schedule(&self, token: &TestToken, fees: Vec<CustomFee>) -> Result<()> {
        let key = token
            .fee_schedule_key
            .as_ref()
            .ok_or_else(|| missing_key(token, "fee schedule"))?;
        self.require(OperationRequest::UpdateTokenFeeSchedule(UpdateFeeScheduleParams {
            token_id: token.token_id.clone(),
            custom_fees: fees,
            common_transaction_params: signed(&[key]),
        }))
        .await
        .map(|_| ())
    }

    /// Update token properties, signed by the admin key plus `extra_signers`.
    ///
    /// A new treasury must sign too, so pass its key in `extra_signers`.
    pub async fn update_token(
        &self,
        token: &TestToken,
        mut params: UpdateTokenParams,
        extra_signers: &[&KeyMaterial],
    ) -> Result<()> {
        let mut keys = vec![&token.admin_key];
        keys.extend_from_slice(extra_signers);
        params.token_id = token.token_id.clone();
        params.common_transaction_params = signed(&keys);
        self.require(OperationRequest::UpdateToken(params))
            .await
            .map(|_| ())
    }
}
