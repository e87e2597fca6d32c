//! Typed control-protocol requests.
//!
//! Each method has its own parameter struct so required fields are checked at
//! the call site. [`OperationRequest::Custom`] is the escape hatch for methods
//! or fields this crate does not model yet.

use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display as StrumDisplay, EnumIter, EnumString, IntoStaticStr};

/// Closed set of control-protocol methods.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    AsRefStr,
    IntoStaticStr,
    StrumDisplay,
    EnumString,
    EnumIter,
)]
#[strum(serialize_all = "camelCase")]
pub enum Method {
    /// Configure the operator session
    Setup,
    /// Tear down the operator session
    Reset,
    /// Generate key material on the SUT side
    GenerateKey,
    /// Create an account
    CreateAccount,
    /// Update an account
    UpdateAccount,
    /// Delete an account, moving its balance to a beneficiary
    DeleteAccount,
    /// Multi-party hbar / token / NFT transfer
    TransferCrypto,
    /// Grant spending allowances
    ApproveAllowance,
    /// Remove NFT allowances
    DeleteAllowance,
    /// Create a fungible or non-fungible token
    CreateToken,
    /// Update token properties
    UpdateToken,
    /// Replace a token's custom fee schedule
    UpdateTokenFeeSchedule,
    /// Mint fungible supply or NFT serials
    MintToken,
    /// Associate tokens with an account
    AssociateToken,
    /// Freeze an account for a token
    FreezeToken,
    /// Unfreeze an account for a token
    UnfreezeToken,
    /// Grant KYC to an account for a token
    GrantTokenKyc,
    /// Pause a token
    PauseToken,
    /// Unpause a token
    UnpauseToken,
    /// Airdrop tokens, possibly creating pending offers
    AirdropToken,
}

/// Decimal-string encoding for quantities.
///
/// The SUT exchanges every amount and serial number as a decimal string;
/// deserialization also accepts JSON numbers.
pub(crate) mod decimal_str {
    use super::*;
    use serde::de::Error as _;
    use serde::{Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Signed(i64),
        Unsigned(u64),
    }

    impl Raw {
        fn parse<T: FromStr, E: serde::de::Error>(self) -> Result<T, E>
        where
            T::Err: Display,
        {
            let text = match self {
                Raw::Str(s) => s,
                Raw::Signed(n) => n.to_string(),
                Raw::Unsigned(n) => n.to_string(),
            };
            text.trim()
                .parse()
                .map_err(|e| E::custom(format!("invalid quantity '{}': {}", text, e)))
        }
    }

    pub fn serialize<T: Display, S: Serializer>(
        value: &T,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        T: FromStr,
        T::Err: Display,
        D: Deserializer<'de>,
    {
        Raw::deserialize(deserializer)?.parse()
    }

    pub mod option {
        use super::*;

        pub fn serialize<T: Display, S: Serializer>(
            value: &Option<T>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => serializer.collect_str(v),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
        where
            T: FromStr,
            T::Err: Display,
            D: Deserializer<'de>,
        {
            match Option::<Raw>::deserialize(deserializer)? {
                Some(raw) => raw.parse().map(Some),
                None => Ok(None),
            }
        }
    }

    pub mod vec {
        use super::*;
        use serde::ser::SerializeSeq;

        pub fn serialize<T: Display, S: Serializer>(
            values: &[T],
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            let mut seq = serializer.serialize_seq(Some(values.len()))?;
            for value in values {
                seq.serialize_element(&value.to_string())?;
            }
            seq.end()
        }

        pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Vec<T>, D::Error>
        where
            T: FromStr,
            T::Err: Display,
            D: Deserializer<'de>,
        {
            Vec::<Raw>::deserialize(deserializer)?
                .into_iter()
                .map(|raw| raw.parse::<T, D::Error>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(D::Error::custom)
        }
    }
}

/// Parameters shared by every state-changing request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonTransactionParams {
    /// DER-hex private keys that sign the transaction
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signers: Vec<String>,
    /// Maximum fee the payer accepts
    #[serde(
        default,
        with = "decimal_str::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_transaction_fee: Option<i64>,
}

impl CommonTransactionParams {
    /// Parameters signed by the given keys.
    pub fn signed_by<I, S>(signers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            signers: signers.into_iter().map(Into::into).collect(),
            max_transaction_fee: None,
        }
    }
}

/// `setup` parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupParams {
    /// Funding / paying account
    pub operator_account_id: String,
    /// DER-hex private key of the operator
    pub operator_private_key: String,
    /// Consensus node endpoint the SUT should use
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_ip: Option<String>,
    /// Consensus node account
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_account_id: Option<String>,
    /// Mirror endpoint the SUT should use
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirror_network_ip: Option<String>,
}

/// Key encodings understood by `generateKey`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyType {
    /// Ed25519 private key
    #[serde(rename = "ed25519PrivateKey")]
    Ed25519Private,
    /// Ed25519 public key
    #[serde(rename = "ed25519PublicKey")]
    Ed25519Public,
    /// ECDSA secp256k1 private key
    #[serde(rename = "ecdsaSecp256k1PrivateKey")]
    EcdsaSecp256k1Private,
    /// ECDSA secp256k1 public key
    #[serde(rename = "ecdsaSecp256k1PublicKey")]
    EcdsaSecp256k1Public,
}

/// `generateKey` parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateKeyParams {
    /// Requested key encoding
    #[serde(rename = "type")]
    pub key_type: KeyType,
}

/// `createAccount` parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountParams {
    /// DER-hex key controlling the account
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Initial hbar balance, debited from the operator
    #[serde(
        default,
        with = "decimal_str::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub initial_balance: Option<i64>,
    /// Automatic token association slots (-1 for unlimited)
    #[serde(
        default,
        with = "decimal_str::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_auto_token_associations: Option<i64>,
    /// EVM address alias
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Whether credits need the receiver's signature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_signature_required: Option<bool>,
    /// Account memo
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    /// Signers and fees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_transaction_params: Option<CommonTransactionParams>,
}

/// `updateAccount` parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAccountParams {
    /// Account to update
    pub account_id: String,
    /// Replacement key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Replacement automatic association limit
    #[serde(
        default,
        with = "decimal_str::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_auto_token_associations: Option<i64>,
    /// Replacement receiver-signature flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_signature_required: Option<bool>,
    /// Replacement memo
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    /// Signers and fees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_transaction_params: Option<CommonTransactionParams>,
}

/// `deleteAccount` parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteAccountParams {
    /// Account to remove
    pub delete_account_id: String,
    /// Beneficiary of the remaining balance
    pub transfer_account_id: String,
    /// Signers and fees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_transaction_params: Option<CommonTransactionParams>,
}

/// Hbar line of a transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HbarTransfer {
    /// Account id or EVM alias
    pub account_id: String,
    /// Signed amount (negative debits)
    #[serde(with = "decimal_str")]
    pub amount: i64,
}

/// Fungible token line of a transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTransfer {
    /// Account id
    pub account_id: String,
    /// Token id
    pub token_id: String,
    /// Signed amount (negative debits)
    #[serde(with = "decimal_str")]
    pub amount: i64,
    /// Expected token decimals, checked by the SUT when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u32>,
}

/// NFT movement of a transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NftTransfer {
    /// Current owner
    pub sender_account_id: String,
    /// New owner
    pub receiver_account_id: String,
    /// Token id
    pub token_id: String,
    /// Serial number
    #[serde(with = "decimal_str")]
    pub serial_number: u64,
}

/// One line of a transfer list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransferLine {
    /// Native currency
    Hbar(HbarTransfer),
    /// Fungible token
    Token(TokenTransfer),
    /// Non-fungible item
    Nft(NftTransfer),
}

/// A transfer line plus its approval flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferEntry {
    /// The movement itself
    #[serde(flatten)]
    pub line: TransferLine,
    /// Whether the debit is spent through an allowance
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub approved: bool,
}

/// `transferCrypto` parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferParams {
    /// Transfer lines
    #[serde(default)]
    pub transfers: Vec<TransferEntry>,
    /// Signers and fees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_transaction_params: Option<CommonTransactionParams>,
}

/// `airdropToken` parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AirdropParams {
    /// Token and NFT lines
    #[serde(default)]
    pub token_transfers: Vec<TransferEntry>,
    /// Signers and fees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_transaction_params: Option<CommonTransactionParams>,
}

/// Hbar allowance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HbarAllowance {
    /// Spending limit
    #[serde(with = "decimal_str")]
    pub amount: i64,
}

/// Fungible token allowance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenAllowance {
    /// Token id
    pub token_id: String,
    /// Spending limit
    #[serde(with = "decimal_str")]
    pub amount: i64,
}

/// NFT allowance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NftAllowance {
    /// Token id
    pub token_id: String,
    /// Approved serials
    #[serde(default, with = "decimal_str::vec", skip_serializing_if = "Vec::is_empty")]
    pub serial_numbers: Vec<u64>,
    /// Approve every serial of the token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_for_all: Option<bool>,
}

/// What an allowance covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AllowanceKind {
    /// Native currency
    Hbar(HbarAllowance),
    /// Fungible token
    Token(TokenAllowance),
    /// Non-fungible items
    Nft(NftAllowance),
}

/// One allowance grant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Allowance {
    /// Account whose funds may be spent
    pub owner_account_id: String,
    /// Account allowed to spend
    pub spender_account_id: String,
    /// Covered asset
    #[serde(flatten)]
    pub kind: AllowanceKind,
}

/// `approveAllowance` parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveAllowanceParams {
    /// Grants
    #[serde(default)]
    pub allowances: Vec<Allowance>,
    /// Signers and fees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_transaction_params: Option<CommonTransactionParams>,
}

/// NFT allowance removal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NftAllowanceRemoval {
    /// Owner of the serials
    pub owner_account_id: String,
    /// Token id
    pub token_id: String,
    /// Serials whose allowances are removed
    #[serde(default, with = "decimal_str::vec")]
    pub serial_numbers: Vec<u64>,
}

/// `deleteAllowance` parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteAllowanceParams {
    /// Removals
    #[serde(default)]
    pub allowances: Vec<NftAllowanceRemoval>,
    /// Signers and fees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_transaction_params: Option<CommonTransactionParams>,
}

/// Token flavor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenType {
    /// Fungible common token
    #[default]
    #[serde(rename = "ft")]
    Fungible,
    /// Non-fungible unique token
    #[serde(rename = "nft")]
    NonFungible,
}

/// Token supply model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupplyType {
    /// No maximum supply
    #[default]
    Infinite,
    /// Bounded by `maxSupply`
    Finite,
}

/// Fixed fee charged per transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixedFee {
    /// Fee amount
    #[serde(with = "decimal_str")]
    pub amount: i64,
    /// Token the fee is paid in (hbar when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub denominating_token_id: Option<String>,
}

/// How a fractional fee is assessed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssessmentMethod {
    /// Fee is taken out of the transferred amount
    #[default]
    Inclusive,
    /// Fee is charged to the sender on top of the amount
    Exclusive,
}

/// Fee proportional to the transferred amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FractionalFee {
    /// Fraction numerator
    #[serde(with = "decimal_str")]
    pub numerator: i64,
    /// Fraction denominator
    #[serde(with = "decimal_str")]
    pub denominator: i64,
    /// Lower bound of the assessed fee
    #[serde(with = "decimal_str")]
    pub minimum_amount: i64,
    /// Upper bound of the assessed fee (0 for unbounded)
    #[serde(with = "decimal_str")]
    pub maximum_amount: i64,
    /// Assessment method
    #[serde(default)]
    pub assessment_method: AssessmentMethod,
}

/// Royalty fee on NFT transfers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoyaltyFee {
    /// Fraction numerator
    #[serde(with = "decimal_str")]
    pub numerator: i64,
    /// Fraction denominator
    #[serde(with = "decimal_str")]
    pub denominator: i64,
    /// Charged when the NFT changes hands without fungible value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_fee: Option<FixedFee>,
}

/// Fee schedule entry body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CustomFeeKind {
    /// Fixed fee
    FixedFee(FixedFee),
    /// Fractional fee (fungible tokens only)
    FractionalFee(FractionalFee),
    /// Royalty fee (NFTs only)
    RoyaltyFee(RoyaltyFee),
}

/// Fee schedule entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomFee {
    /// Receiver of the fee
    pub fee_collector_account_id: String,
    /// Whether other collectors of the same token are exempt
    #[serde(default)]
    pub fee_collectors_exempt: bool,
    /// Fee body
    #[serde(flatten)]
    pub kind: CustomFeeKind,
}

/// `createToken` parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTokenParams {
    /// Token name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Token symbol
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    /// Decimal places (fungible only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u32>,
    /// Supply minted to the treasury at creation
    #[serde(
        default,
        with = "decimal_str::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub initial_supply: Option<i64>,
    /// Treasury account
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub treasury_account_id: Option<String>,
    /// Admin key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_key: Option<String>,
    /// KYC key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kyc_key: Option<String>,
    /// Freeze key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freeze_key: Option<String>,
    /// Supply key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supply_key: Option<String>,
    /// Fee schedule key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_schedule_key: Option<String>,
    /// Pause key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause_key: Option<String>,
    /// New associations start frozen
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freeze_default: Option<bool>,
    /// Fungible or non-fungible
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<TokenType>,
    /// Supply model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supply_type: Option<SupplyType>,
    /// Maximum supply for finite tokens
    #[serde(
        default,
        with = "decimal_str::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_supply: Option<i64>,
    /// Custom fee schedule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_fees: Option<Vec<CustomFee>>,
    /// Signers and fees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_transaction_params: Option<CommonTransactionParams>,
}

/// `updateToken` parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTokenParams {
    /// Token to update
    pub token_id: String,
    /// Replacement name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Replacement symbol
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    /// Replacement treasury
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub treasury_account_id: Option<String>,
    /// Replacement admin key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_key: Option<String>,
    /// Replacement freeze key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freeze_key: Option<String>,
    /// Replacement pause key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause_key: Option<String>,
    /// Replacement supply key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supply_key: Option<String>,
    /// Replacement memo
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    /// Signers and fees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_transaction_params: Option<CommonTransactionParams>,
}

/// `updateTokenFeeSchedule` parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFeeScheduleParams {
    /// Token whose schedule is replaced
    pub token_id: String,
    /// New schedule (empty clears it)
    #[serde(default)]
    pub custom_fees: Vec<CustomFee>,
    /// Signers and fees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_transaction_params: Option<CommonTransactionParams>,
}

/// `mintToken` parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintTokenParams {
    /// Token to mint
    pub token_id: String,
    /// Fungible amount
    #[serde(
        default,
        with = "decimal_str::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub amount: Option<i64>,
    /// One metadata entry per NFT serial
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Vec<String>>,
    /// Signers and fees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_transaction_params: Option<CommonTransactionParams>,
}

/// `associateToken` parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociateTokenParams {
    /// Account gaining the associations
    pub account_id: String,
    /// Tokens to associate
    #[serde(default)]
    pub token_ids: Vec<String>,
    /// Signers and fees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_transaction_params: Option<CommonTransactionParams>,
}

/// Token + account parameters (`freezeToken`, `unfreezeToken`, `grantTokenKyc`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenAccountParams {
    /// Token id
    pub token_id: String,
    /// Account id
    pub account_id: String,
    /// Signers and fees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_transaction_params: Option<CommonTransactionParams>,
}

/// Token-only parameters (`pauseToken`, `unpauseToken`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenParams {
    /// Token id
    pub token_id: String,
    /// Signers and fees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_transaction_params: Option<CommonTransactionParams>,
}

/// A named operation plus its parameters. Built fresh per call.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum OperationRequest {
    Setup(SetupParams),
    Reset,
    GenerateKey(GenerateKeyParams),
    CreateAccount(CreateAccountParams),
    UpdateAccount(UpdateAccountParams),
    DeleteAccount(DeleteAccountParams),
    TransferCrypto(TransferParams),
    ApproveAllowance(ApproveAllowanceParams),
    DeleteAllowance(DeleteAllowanceParams),
    CreateToken(CreateTokenParams),
    UpdateToken(UpdateTokenParams),
    UpdateTokenFeeSchedule(UpdateFeeScheduleParams),
    MintToken(MintTokenParams),
    AssociateToken(AssociateTokenParams),
    FreezeToken(TokenAccountParams),
    UnfreezeToken(TokenAccountParams),
    GrantTokenKyc(TokenAccountParams),
    PauseToken(TokenParams),
    UnpauseToken(TokenParams),
    AirdropToken(AirdropParams),
    /// Forward-compatible fallback: any method with a raw parameter bag
    Custom { method: String, params: Value },
}

impl OperationRequest {
    /// Modeled method, `None` for [`OperationRequest::Custom`].
    pub fn method(&self) -> Option<Method> {
        let method = match self {
            Self::Setup(_) => Method::Setup,
            Self::Reset => Method::Reset,
            Self::GenerateKey(_) => Method::GenerateKey,
            Self::CreateAccount(_) => Method::CreateAccount,
            Self::UpdateAccount(_) => Method::UpdateAccount,
            Self::DeleteAccount(_) => Method::DeleteAccount,
            Self::TransferCrypto(_) => Method::TransferCrypto,
            Self::ApproveAllowance(_) => Method::ApproveAllowance,
            Self::DeleteAllowance(_) => Method::DeleteAllowance,
            Self::CreateToken(_) => Method::CreateToken,
            Self::UpdateToken(_) => Method::UpdateToken,
            Self::UpdateTokenFeeSchedule(_) => Method::UpdateTokenFeeSchedule,
            Self::MintToken(_) => Method::MintToken,
            Self::AssociateToken(_) => Method::AssociateToken,
            Self::FreezeToken(_) => Method::FreezeToken,
            Self::UnfreezeToken(_) => Method::UnfreezeToken,
            Self::GrantTokenKyc(_) => Method::GrantTokenKyc,
            Self::PauseToken(_) => Method::PauseToken,
            Self::UnpauseToken(_) => Method::UnpauseToken,
            Self::AirdropToken(_) => Method::AirdropToken,
            Self::Custom { .. } => return None,
        };
        Some(method)
    }

    /// Wire name of the method.
    pub fn method_name(&self) -> &str {
        match self {
            Self::Custom { method, .. } => method,
            _ => self.method().map(<&'static str>::from).unwrap_or_default(),
        }
    }

    /// Serialize the parameter bag.
    pub fn to_params(&self) -> serde_json::Result<Value> {
        match self {
            Self::Setup(p) => serde_json::to_value(p),
            Self::Reset => Ok(Value::Object(Default::default())),
            Self::GenerateKey(p) => serde_json::to_value(p),
            Self::CreateAccount(p) => serde_json::to_value(p),
            Self::UpdateAccount(p) => serde_json::to_value(p),
            Self::DeleteAccount(p) => serde_json::to_value(p),
            Self::TransferCrypto(p) => serde_json::to_value(p),
            Self::ApproveAllowance(p) => serde_json::to_value(p),
            Self::DeleteAllowance(p) => serde_json::to_value(p),
            Self::CreateToken(p) => serde_json::to_value(p),
            Self::UpdateToken(p) => serde_json::to_value(p),
            Self::UpdateTokenFeeSchedule(p) => serde_json::to_value(p),
            Self::MintToken(p) => serde_json::to_value(p),
            Self::AssociateToken(p) => serde_json::to_value(p),
            Self::FreezeToken(p) | Self::UnfreezeToken(p) | Self::GrantTokenKyc(p) => {
                serde_json::to_value(p)
            }
            Self::PauseToken(p) | Self::UnpauseToken(p) => serde_json::to_value(p),
            Self::AirdropToken(p) => serde_json::to_value(p),
            Self::Custom { params, .. } => Ok(params.clone()),
        }
    }

    /// Parse a wire call back into a typed request.
    ///
    /// Unknown methods become [`OperationRequest::Custom`]; parameter bags that
    /// do not fit the method's shape are an error.
    pub fn from_call(method: &str, params: Value) -> serde_json::Result<Self> {
        let Ok(known) = Method::from_str(method) else {
            return Ok(Self::Custom {
                method: method.to_string(),
                params,
            });
        };

        let request = match known {
            Method::Setup => Self::Setup(serde_json::from_value(params)?),
            Method::Reset => Self::Reset,
            Method::GenerateKey => Self::GenerateKey(serde_json::from_value(params)?),
            Method::CreateAccount => Self::CreateAccount(serde_json::from_value(params)?),
            Method::UpdateAccount => Self::UpdateAccount(serde_json::from_value(params)?),
            Method::DeleteAccount => Self::DeleteAccount(serde_json::from_value(params)?),
            Method::TransferCrypto => Self::TransferCrypto(serde_json::from_value(params)?),
            Method::ApproveAllowance => Self::ApproveAllowance(serde_json::from_value(params)?),
            Method::DeleteAllowance => Self::DeleteAllowance(serde_json::from_value(params)?),
            Method::CreateToken => Self::CreateToken(serde_json::from_value(params)?),
            Method::UpdateToken => Self::UpdateToken(serde_json::from_value(params)?),
            Method::UpdateTokenFeeSchedule => {
                Self::UpdateTokenFeeSchedule(serde_json::from_value(params)?)
            }
            Method::MintToken => Self::MintToken(serde_json::from_value(params)?),
            Method::AssociateToken => Self::AssociateToken(serde_json::from_value(params)?),
            Method::FreezeToken => Self::FreezeToken(serde_json::from_value(params)?),
            Method::UnfreezeToken => Self::UnfreezeToken(serde_json::from_value(params)?),
            Method::GrantTokenKyc => Self::GrantTokenKyc(serde_json::from_value(params)?),
            Method::PauseToken => Self::PauseToken(serde_json::from_value(params)?),
            Method::UnpauseToken => Self::UnpauseToken(serde_json::from_value(params)?),
            Method::AirdropToken => Self::AirdropToken(serde_json::from_value(params)?),
        };
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strum::IntoEnumIterator;

    #[test]
    fn test_method_wire_names() {
        assert_eq!(Method::TransferCrypto.as_ref(), "transferCrypto");
        assert_eq!(Method::UpdateTokenFeeSchedule.as_ref(), "updateTokenFeeSchedule");
        assert_eq!(Method::GrantTokenKyc.to_string(), "grantTokenKyc");
        assert_eq!(Method::from_str("generateKey").unwrap(), Method::GenerateKey);

        for method in Method::iter() {
            assert_eq!(Method::from_str(method.as_ref()).unwrap(), method);
        }
    }

    #[test]
    fn test_typed_request_method_name() {
        assert_eq!(OperationRequest::Reset.method_name(), "reset");
        let transfer = OperationRequest::TransferCrypto(TransferParams::default());
        assert_eq!(transfer.method_name(), "transferCrypto");
    }

    #[test]
    fn test_transfer_params_wire_shape() {
        let params = TransferParams {
            transfers: vec![
                TransferEntry {
                    line: TransferLine::Hbar(HbarTransfer {
                        account_id: "0.0.1001".to_string(),
                        amount: -10,
                    }),
                    approved: false,
                },
                TransferEntry {
                    line: TransferLine::Nft(NftTransfer {
                        sender_account_id: "0.0.1001".to_string(),
                        receiver_account_id: "0.0.1002".to_string(),
                        token_id: "0.0.2000".to_string(),
                        serial_number: 1,
                    }),
                    approved: true,
                },
            ],
            common_transaction_params: Some(CommonTransactionParams::signed_by(["302e"])),
        };

        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(
            value,
            json!({
                "transfers": [
                    { "hbar": { "accountId": "0.0.1001", "amount": "-10" } },
                    {
                        "nft": {
                            "senderAccountId": "0.0.1001",
                            "receiverAccountId": "0.0.1002",
                            "tokenId": "0.0.2000",
                            "serialNumber": "1"
                        },
                        "approved": true
                    }
                ],
                "commonTransactionParams": { "signers": ["302e"] }
            })
        );
    }

    #[test]
    fn test_from_call_roundtrip_typed() {
        let request = OperationRequest::CreateAccount(CreateAccountParams {
            key: Some("302a".to_string()),
            initial_balance: Some(10),
            max_auto_token_associations: Some(-1),
            ..Default::default()
        });
        let params = request.to_params().unwrap();
        assert_eq!(params["initialBalance"], "10");
        assert_eq!(params["maxAutoTokenAssociations"], "-1");

        let parsed = OperationRequest::from_call(request.method_name(), params).unwrap();
        assert_eq!(parsed, request);
    }

    #[test]
    fn test_numeric_quantities_accepted() {
        let params = json!({ "transfers": [{ "hbar": { "accountId": "0.0.5", "amount": 10 } }] });
        let parsed = OperationRequest::from_call("transferCrypto", params).unwrap();
        let OperationRequest::TransferCrypto(transfer) = parsed else {
            panic!("expected transfer");
        };
        assert!(matches!(
            &transfer.transfers[0].line,
            TransferLine::Hbar(HbarTransfer { amount: 10, .. })
        ));
    }

    #[test]
    fn test_non_numeric_amount_rejected() {
        let params = json!({
            "transfers": [{ "hbar": { "accountId": "0.0.5", "amount": "ten" } }]
        });
        assert!(OperationRequest::from_call("transferCrypto", params).is_err());
    }

    #[test]
    fn test_unknown_method_is_custom() {
        let parsed =
            OperationRequest::from_call("burnToken", json!({ "tokenId": "0.0.9" })).unwrap();
        assert_eq!(parsed.method(), None);
        assert_eq!(parsed.method_name(), "burnToken");
        assert_eq!(parsed.to_params().unwrap()["tokenId"], "0.0.9");
    }

    #[test]
    fn test_custom_fee_wire_shape() {
        let fee = CustomFee {
            fee_collector_account_id: "0.0.7".to_string(),
            fee_collectors_exempt: false,
            kind: CustomFeeKind::FractionalFee(FractionalFee {
                numerator: 1,
                denominator: 10,
                minimum_amount: 1,
                maximum_amount: 0,
                assessment_method: AssessmentMethod::Inclusive,
            }),
        };
        let value = serde_json::to_value(&fee).unwrap();
        assert_eq!(value["fractionalFee"]["denominator"], "10");
        assert_eq!(value["fractionalFee"]["assessmentMethod"], "inclusive");
        let back: CustomFee = serde_json::from_value(value).unwrap();
        assert_eq!(back, fee);
    }
}
