//! # Declarative transfer scenarios
//!
//! Scenarios are data: named accounts and tokens, a list of preconditions,
//! exactly one action under test, the declared outcome and the state expected
//! on both read sources afterwards. They are written in YAML.
//!
//! ## Usage
//!
//! ```ignore
//! use ledger_tck::conformance::ConformanceRunner;
//!
//! let runner = ConformanceRunner::load_from_dir(Path::new("specs/transfer_crypto"))?;
//! let report = runner.run_concurrent(&ctx, 4).await;
//! assert!(report.all_passed());
//! ```
//!
//! ## Identity placeholders
//!
//! Account and token references resolve against the names declared in the
//! scenario, plus `$operator`, `$empty` (structurally invalid id) and
//! `$nonexistent` (well formed, never allocated). Literal `shard.realm.num`
//! ids pass through unchanged.

mod execute;
mod expect;
mod runner;
mod spec;

pub use execute::execute_spec;
pub use expect::assert_outcome;
pub use runner::*;
pub use spec::*;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::fixtures::KeyScheme;
use crate::rpc::request::AssessmentMethod;

/// Scenario specification
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConformanceSpec {
    /// Specification metadata
    pub spec: SpecMetadata,
    /// Human-readable description
    #[serde(default)]
    pub description: Option<String>,
    /// Reason to skip this scenario
    #[serde(default)]
    pub skip: Option<String>,
    /// Accounts created before the action, by name
    #[serde(default)]
    pub accounts: BTreeMap<String, AccountSpec>,
    /// Tokens created after the accounts, by name
    #[serde(default)]
    pub tokens: BTreeMap<String, TokenSpec>,
    /// Further setup steps, run in order
    #[serde(default)]
    pub preconditions: Vec<Precondition>,
    /// The operation under test
    pub action: Action,
    /// Declared outcome
    #[serde(default)]
    pub expected: Expected,
    /// State both sources must report after a successful action
    #[serde(default)]
    pub postconditions: Vec<Postcondition>,
}

/// Specification metadata
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SpecMetadata {
    /// Unique scenario name
    pub name: String,
    /// Specification version
    #[serde(default = "default_version")]
    pub version: String,
    /// Scenario category
    pub category: Category,
    /// Optional subcategory
    #[serde(default)]
    pub subcategory: Option<String>,
}

fn default_version() -> String {
    TCK_VERSION.to_string()
}

/// Scenario categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Plain hbar transfers
    TransferCrypto,
    /// Fungible token transfers
    TokenTransfer,
    /// NFT transfers
    NftTransfer,
    /// Transfers spent through allowances
    ApprovedTransfer,
    /// Airdrops and pending offers
    Airdrop,
    /// Account creation and deletion
    AccountLifecycle,
}

/// Account to create
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AccountSpec {
    /// Initial balance in tinybar
    #[serde(default)]
    pub balance: i64,
    /// Key scheme
    #[serde(default)]
    pub key: KeyScheme,
    /// Automatic association slots
    #[serde(default)]
    pub auto_associations: Option<i64>,
    /// Use the key's EVM address as alias
    #[serde(default)]
    pub evm_alias: bool,
    /// Credits require this account's signature
    #[serde(default)]
    pub receiver_signature_required: bool,
}

/// Token flavor in scenarios
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Fungible
    #[default]
    Ft,
    /// Non-fungible
    Nft,
}

/// Token to create
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TokenSpec {
    /// Token flavor
    #[serde(default, rename = "type")]
    pub kind: TokenKind,
    /// Treasury account name
    pub treasury: String,
    /// Fungible supply created in the treasury
    #[serde(default)]
    pub initial_supply: i64,
    /// Decimals
    #[serde(default)]
    pub decimals: u32,
    /// NFT serials minted into the treasury
    #[serde(default)]
    pub mint: usize,
    /// Create a freeze key
    #[serde(default)]
    pub freezable: bool,
    /// Create a KYC key
    #[serde(default)]
    pub kyc: bool,
    /// Create a pause key
    #[serde(default)]
    pub pausable: bool,
    /// Custom fees
    #[serde(default)]
    pub fees: Vec<FeeSpec>,
}

/// Custom fee in scenarios; collectors are account references.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeSpec {
    /// Fixed fee in hbar or in a token
    Fixed {
        /// Fee collector
        collector: String,
        /// Amount
        amount: i64,
        /// Denominating token name, hbar when absent
        #[serde(default)]
        token: Option<String>,
    },
    /// Fraction of each transferred amount
    Fractional {
        /// Fee collector
        collector: String,
        /// Numerator
        numerator: i64,
        /// Denominator
        denominator: i64,
        /// Minimum assessed fee
        #[serde(default)]
        minimum: i64,
        /// Maximum assessed fee, 0 for none
        #[serde(default)]
        maximum: i64,
        /// Inclusive or exclusive assessment
        #[serde(default)]
        assessment: AssessmentMethod,
    },
}

/// Setup step run before the action
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum Precondition {
    /// Associate an account with tokens
    Associate { account: String, tokens: Vec<String> },
    /// Move fungible tokens between accounts
    TransferToken {
        token: String,
        from: String,
        to: String,
        amount: i64,
    },
    /// Move one NFT serial
    TransferNft {
        token: String,
        serial: u64,
        from: String,
        to: String,
    },
    /// Freeze an account for a token
    Freeze { token: String, account: String },
    /// Grant KYC for a token
    GrantKyc { token: String, account: String },
    /// Pause a token
    Pause { token: String },
    /// Hbar allowance
    ApproveHbar {
        owner: String,
        spender: String,
        amount: i64,
    },
    /// Token allowance
    ApproveToken {
        owner: String,
        spender: String,
        token: String,
        amount: i64,
    },
    /// NFT allowance
    ApproveNft {
        owner: String,
        spender: String,
        token: String,
        serials: Vec<u64>,
    },
    /// Change automatic association slots
    SetAutoAssociations { account: String, slots: i64 },
    /// Delete an account
    DeleteAccount {
        account: String,
        #[serde(default)]
        beneficiary: Option<String>,
    },
}

/// One line of a transfer action
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum TransferLineSpec {
    /// Hbar line
    Hbar {
        account: String,
        amount: i64,
        #[serde(default)]
        approved: bool,
    },
    /// Fungible token line
    Token {
        account: String,
        token: String,
        amount: i64,
        #[serde(default)]
        decimals: Option<u32>,
        #[serde(default)]
        approved: bool,
    },
    /// NFT movement
    Nft {
        from: String,
        to: String,
        token: String,
        serial: u64,
        #[serde(default)]
        approved: bool,
    },
}

/// Operation under test
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum Action {
    /// `transferCrypto`
    Transfer {
        transfers: Vec<TransferLineSpec>,
        #[serde(default)]
        signers: Vec<String>,
    },
    /// `airdropToken`
    Airdrop {
        transfers: Vec<TransferLineSpec>,
        #[serde(default)]
        signers: Vec<String>,
    },
    /// `deleteAccount`
    DeleteAccount {
        account: String,
        beneficiary: String,
        #[serde(default)]
        signers: Vec<String>,
    },
    /// Any method with literal parameters
    Raw {
        method: String,
        #[serde(default)]
        params: serde_json::Value,
    },
}

/// Declared outcome category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpectedStatus {
    /// Operation accepted (default)
    #[default]
    Success,
    /// Business rejection with a named status
    Business,
    /// Rejected before business validation
    Internal,
}

/// Declared outcome
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Expected {
    /// Outcome category
    #[serde(default)]
    pub status: ExpectedStatus,
    /// Business status for `business` outcomes
    #[serde(default)]
    pub error: Option<String>,
    /// JSON-RPC code for `internal` outcomes
    #[serde(default)]
    pub code: Option<i64>,
}

/// State checked on both sources after a successful action
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum Postcondition {
    /// Absolute hbar balance
    Hbar { account: String, balance: i64 },
    /// Hbar balance relative to the strong source before the action
    HbarDelta { account: String, delta: i64 },
    /// Fungible token balance
    Token {
        account: String,
        token: String,
        balance: i64,
    },
    /// NFT possession
    Nft {
        account: String,
        token: String,
        serial: u64,
        #[serde(default = "default_true")]
        held: bool,
    },
    /// Unclaimed airdrop offer
    PendingAirdrop {
        sender: String,
        receiver: String,
        token: String,
        #[serde(default)]
        amount: Option<i64>,
        #[serde(default)]
        serial: Option<u64>,
        #[serde(default = "default_true")]
        present: bool,
    },
}

fn default_true() -> bool {
    true
}

/// Scenario format version
pub const TCK_VERSION: &str = "1.0.0";
