//! In-process ledger double.
//!
//! [`MockLedger`] answers the control protocol and the consensus query methods
//! from one in-memory state. Each state-changing call runs against a copy of
//! the state that replaces the original only when the call succeeds, so a
//! rejected operation never leaves partial effects.
//!
//! No network fees are charged: the operator pays for the initial balances it
//! funds and nothing else. Royalty fees are stored but never assessed.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};

use crate::fixtures::{KeyMaterial, KeyScheme};
use crate::identity::{entity_id, is_entity_id};
use crate::orchestrator::TestRng;
use crate::rpc::outcome::{
    INTERNAL_ERROR_CODE, INVALID_PARAMS_CODE, METHOD_NOT_FOUND_CODE, SUCCESS_STATUS,
};
use crate::rpc::request::{
    AllowanceKind, ApproveAllowanceParams, AssociateTokenParams, CommonTransactionParams,
    CreateAccountParams, CreateTokenParams, CustomFee, CustomFeeKind, DeleteAccountParams,
    DeleteAllowanceParams, GenerateKeyParams, KeyType, MintTokenParams, NftTransfer,
    SetupParams, AssessmentMethod, TokenAccountParams, TokenParams, TokenType, TransferEntry,
    TransferLine, UpdateAccountParams, UpdateFeeScheduleParams, UpdateTokenParams,
};
use crate::rpc::{ControlRpc, Failure, OperationRequest};
use crate::sources::consensus::methods;
use crate::sources::{parse_quantity, PendingAirdrop};

macro_rules! statuses {
    ($($name:ident),* $(,)?) => {
        $(
            #[doc = stringify!($name)]
            pub const $name: &str = stringify!($name);
        )*
    };
}

/// Business statuses reported by [`MockLedger`].
pub mod status {
    statuses!(
        ACCOUNT_AMOUNT_TRANSFERS_ONLY_ALLOWED_FOR_FUNGIBLE_COMMON,
        ACCOUNT_DELETED,
        ACCOUNT_FROZEN_FOR_TOKEN,
        ACCOUNT_IS_TREASURY,
        ACCOUNT_KYC_NOT_GRANTED_FOR_TOKEN,
        ACCOUNT_REPEATED_IN_ACCOUNT_AMOUNTS,
        AIRDROP_CONTAINS_MULTIPLE_SENDERS_FOR_A_TOKEN,
        ALIAS_ALREADY_ASSIGNED,
        AMOUNT_EXCEEDS_ALLOWANCE,
        CUSTOM_FRACTIONAL_FEE_ONLY_ALLOWED_FOR_FUNGIBLE_COMMON,
        EXISTING_AUTOMATIC_ASSOCIATIONS_EXCEED_GIVEN_LIMIT,
        FRACTION_DIVIDES_BY_ZERO,
        INSUFFICIENT_ACCOUNT_BALANCE,
        INSUFFICIENT_PAYER_BALANCE,
        INSUFFICIENT_SENDER_ACCOUNT_BALANCE_FOR_CUSTOM_FEE,
        INSUFFICIENT_TOKEN_BALANCE,
        INVALID_ACCOUNT_AMOUNTS,
        INVALID_ACCOUNT_ID,
        INVALID_ALIAS_KEY,
        INVALID_ALLOWANCE_SPENDER_ID,
        INVALID_CUSTOM_FEE_COLLECTOR,
        INVALID_INITIAL_BALANCE,
        INVALID_MAX_AUTO_ASSOCIATIONS,
        INVALID_NFT_ID,
        INVALID_SIGNATURE,
        INVALID_TOKEN_DECIMALS,
        INVALID_TOKEN_ID,
        INVALID_TOKEN_INITIAL_SUPPLY,
        INVALID_TOKEN_MINT_AMOUNT,
        INVALID_TOKEN_MINT_METADATA,
        INVALID_TRANSACTION_BODY,
        INVALID_TRANSFER_ACCOUNT_ID,
        INVALID_TREASURY_ACCOUNT_FOR_TOKEN,
        KEY_REQUIRED,
        MISSING_TOKEN_NAME,
        MISSING_TOKEN_SYMBOL,
        NEGATIVE_ALLOWANCE_AMOUNT,
        SENDER_DOES_NOT_OWN_NFT_SERIAL_NO,
        SPENDER_DOES_NOT_HAVE_ALLOWANCE,
        TOKEN_ALREADY_ASSOCIATED_TO_ACCOUNT,
        TOKEN_HAS_NO_FEE_SCHEDULE_KEY,
        TOKEN_HAS_NO_FREEZE_KEY,
        TOKEN_HAS_NO_KYC_KEY,
        TOKEN_HAS_NO_PAUSE_KEY,
        TOKEN_HAS_NO_SUPPLY_KEY,
        TOKEN_ID_REPEATED_IN_TOKEN_LIST,
        TOKEN_IS_IMMUTABLE,
        TOKEN_IS_PAUSED,
        TOKEN_MAX_SUPPLY_REACHED,
        TOKEN_NOT_ASSOCIATED_TO_ACCOUNT,
        TOKEN_NOT_ASSOCIATED_TO_FEE_COLLECTOR,
        TRANSACTION_REQUIRES_ZERO_TOKEN_BALANCES,
        TRANSFER_ACCOUNT_SAME_AS_DELETE_ACCOUNT,
        TRANSFERS_NOT_ZERO_SUM_FOR_TOKEN,
        UNEXPECTED_TOKEN_DECIMALS,
    );
}

use status::*;

/// Account id of the pre-funded operator.
pub const OPERATOR_ACCOUNT_ID: &str = "0.0.2";

/// Operator balance at genesis, in tinybar.
pub const OPERATOR_GENESIS_BALANCE: i64 = 5_000_000_000_000_000;

const FIRST_ENTITY_NUM: u64 = 1000;
const DEFAULT_SEED: u64 = 0x1ed6_e75e_ed00_0001;

type Outcome = Result<Value, Failure>;

fn reject(status: &str) -> Failure {
    Failure::business(status, status.to_lowercase().replace('_', " "))
}

fn malformed(what: &str, id: &str) -> Failure {
    Failure::internal(INTERNAL_ERROR_CODE, format!("malformed {} '{}'", what, id))
}

fn shape(what: &str, id: &str) -> Result<(), Failure> {
    if is_entity_id(id) {
        Ok(())
    } else {
        Err(malformed(what, id))
    }
}

fn success() -> Value {
    json!({ "status": SUCCESS_STATUS })
}

fn narrow(value: i128) -> Result<i64, Failure> {
    i64::try_from(value).map_err(|_| reject(INVALID_ACCOUNT_AMOUNTS))
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Relationship {
    pub balance: i64,
    pub frozen: bool,
    pub kyc_granted: bool,
    pub automatic: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct AccountState {
    pub key: String,
    pub balance: i64,
    pub deleted: bool,
    pub max_auto_associations: i64,
    pub receiver_signature_required: bool,
    pub alias: Option<String>,
    pub memo: String,
    pub tokens: BTreeMap<String, Relationship>,
    pub hbar_allowances: BTreeMap<String, i64>,
    pub token_allowances: BTreeMap<(String, String), i64>,
    pub nft_allowances: BTreeMap<(String, u64), String>,
    pub nft_approved_for_all: BTreeSet<(String, String)>,
}

impl AccountState {
    fn new(key: String, balance: i64) -> Self {
        Self {
            key,
            balance,
            deleted: false,
            max_auto_associations: 0,
            receiver_signature_required: false,
            alias: None,
            memo: String::new(),
            tokens: BTreeMap::new(),
            hbar_allowances: BTreeMap::new(),
            token_allowances: BTreeMap::new(),
            nft_allowances: BTreeMap::new(),
            nft_approved_for_all: BTreeSet::new(),
        }
    }

    fn auto_associations_used(&self) -> i64 {
        self.tokens.values().filter(|r| r.automatic).count() as i64
    }

    fn has_free_slot(&self) -> bool {
        self.max_auto_associations == -1
            || self.auto_associations_used() < self.max_auto_associations
    }
}

#[derive(Debug, Clone)]
pub(crate) struct TokenState {
    pub token_type: TokenType,
    pub treasury: String,
    pub decimals: u32,
    pub total_supply: i64,
    pub max_supply: Option<i64>,
    pub admin_key: Option<String>,
    pub supply_key: Option<String>,
    pub freeze_key: Option<String>,
    pub kyc_key: Option<String>,
    pub pause_key: Option<String>,
    pub fee_schedule_key: Option<String>,
    pub freeze_default: bool,
    pub paused: bool,
    pub next_serial: u64,
    pub custom_fees: Vec<CustomFee>,
}

impl TokenState {
    fn collects(&self, account_id: &str) -> bool {
        self.custom_fees
            .iter()
            .any(|f| f.fee_collector_account_id == account_id)
    }

    fn new_relationship(&self, automatic: bool) -> Relationship {
        Relationship {
            balance: 0,
            frozen: self.freeze_default && self.freeze_key.is_some(),
            kyc_granted: false,
            automatic,
        }
    }
}

/// Complete ledger contents.
#[derive(Debug, Clone, Default)]
pub(crate) struct LedgerState {
    pub next_num: u64,
    pub accounts: BTreeMap<String, AccountState>,
    pub tokens: BTreeMap<String, TokenState>,
    pub nfts: BTreeMap<(String, u64), String>,
    pub airdrops: Vec<PendingAirdrop>,
}

impl LedgerState {
    fn allocate(&mut self) -> String {
        self.next_num += 1;
        entity_id(self.next_num)
    }

    fn live_account(&self, id: &str) -> Result<&AccountState, Failure> {
        shape("account id", id)?;
        match self.accounts.get(id) {
            None => Err(reject(INVALID_ACCOUNT_ID)),
            Some(account) if account.deleted => Err(reject(ACCOUNT_DELETED)),
            Some(account) => Ok(account),
        }
    }

    fn live_account_mut(&mut self, id: &str) -> Result<&mut AccountState, Failure> {
        shape("account id", id)?;
        match self.accounts.get_mut(id) {
            None => Err(reject(INVALID_ACCOUNT_ID)),
            Some(account) if account.deleted => Err(reject(ACCOUNT_DELETED)),
            Some(account) => Ok(account),
        }
    }

    fn token(&self, id: &str) -> Result<&TokenState, Failure> {
        shape("token id", id)?;
        self.tokens.get(id).ok_or_else(|| reject(INVALID_TOKEN_ID))
    }

    fn token_mut(&mut self, id: &str) -> Result<&mut TokenState, Failure> {
        shape("token id", id)?;
        self.tokens.get_mut(id).ok_or_else(|| reject(INVALID_TOKEN_ID))
    }

    /// Validate a fee schedule for `token_id`; returns collectors that must be
    /// associated with the token itself.
    fn check_fees(
        &self,
        token_id: &str,
        token_type: TokenType,
        fees: &[CustomFee],
    ) -> Result<Vec<String>, Failure> {
        let mut self_collectors = Vec::new();
        for fee in fees {
            let collector = &fee.fee_collector_account_id;
            shape("fee collector", collector)?;
            match self.accounts.get(collector) {
                Some(account) if !account.deleted => {}
                _ => return Err(reject(INVALID_CUSTOM_FEE_COLLECTOR)),
            }
            match &fee.kind {
                CustomFeeKind::FixedFee(fixed) => match fixed.denominating_token_id.as_deref() {
                    None => {}
                    Some(denomination) if denomination == token_id || denomination == "0.0.0" => {
                        self_collectors.push(collector.clone())
                    }
                    Some(denomination) => {
                        self.token(denomination)?;
                        let associated = self
                            .accounts
                            .get(collector)
                            .is_some_and(|a| a.tokens.contains_key(denomination));
                        if !associated {
                            return Err(reject(TOKEN_NOT_ASSOCIATED_TO_FEE_COLLECTOR));
                        }
                    }
                },
                CustomFeeKind::FractionalFee(fractional) => {
                    if token_type != TokenType::Fungible {
                        return Err(reject(CUSTOM_FRACTIONAL_FEE_ONLY_ALLOWED_FOR_FUNGIBLE_COMMON));
                    }
                    if fractional.denominator == 0 {
                        return Err(reject(FRACTION_DIVIDES_BY_ZERO));
                    }
                    self_collectors.push(collector.clone());
                }
                CustomFeeKind::RoyaltyFee(royalty) => {
                    if royalty.denominator == 0 {
                        return Err(reject(FRACTION_DIVIDES_BY_ZERO));
                    }
                }
            }
        }
        Ok(self_collectors)
    }

    fn associate_collectors(
        &mut self,
        token_id: &str,
        collectors: Vec<String>,
    ) -> Result<(), Failure> {
        let relationship = self.token(token_id)?.new_relationship(false);
        for collector in collectors {
            self.live_account_mut(&collector)?
                .tokens
                .entry(token_id.to_string())
                .or_insert_with(|| relationship.clone());
        }
        Ok(())
    }
}

/// Public keys whose private halves signed a request.
struct Signatures(BTreeSet<String>);

impl Signatures {
    fn covers(&self, key: &str) -> bool {
        self.0.contains(key)
    }

    fn require(&self, key: &str) -> Result<(), Failure> {
        if self.covers(key) {
            Ok(())
        } else {
            Err(reject(INVALID_SIGNATURE))
        }
    }
}

struct Session {
    operator_id: String,
    operator_key: String,
}

/// Net change per asset (`None` is hbar) and account.
type Nets = BTreeMap<Option<String>, BTreeMap<String, i128>>;

/// A debit line that needs the owner's signature or an allowance.
struct Debit {
    account: String,
    asset: Option<String>,
    amount: i128,
    approved: bool,
}

/// One state-changing call against a working copy of the ledger.
struct Tx<'a> {
    state: &'a mut LedgerState,
    signed: &'a Signatures,
    payer: &'a str,
}

impl Tx<'_> {
    fn require_account_key(&self, account_id: &str) -> Result<(), Failure> {
        let key = &self.state.live_account(account_id)?.key;
        self.signed.require(key)
    }

    fn create_account(&mut self, p: &CreateAccountParams) -> Outcome {
        let key = p.key.as_deref().ok_or_else(|| reject(KEY_REQUIRED))?;
        if key.is_empty() {
            return Err(malformed("key", key));
        }
        let initial = p.initial_balance.unwrap_or(0);
        if initial < 0 {
            return Err(reject(INVALID_INITIAL_BALANCE));
        }
        let max_auto = p.max_auto_token_associations.unwrap_or(0);
        if max_auto < -1 {
            return Err(reject(INVALID_MAX_AUTO_ASSOCIATIONS));
        }
        let receiver_signature_required = p.receiver_signature_required.unwrap_or(false);
        if receiver_signature_required {
            self.signed.require(key)?;
        }
        if let Some(alias) = &p.alias {
            let valid = alias
                .strip_prefix("0x")
                .is_some_and(|hex| hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()));
            if !valid {
                return Err(reject(INVALID_ALIAS_KEY));
            }
            if self
                .state
                .accounts
                .values()
                .any(|a| a.alias.as_deref() == Some(alias.as_str()))
            {
                return Err(reject(ALIAS_ALREADY_ASSIGNED));
            }
            self.signed.require(key)?;
        }

        let payer = self.state.live_account_mut(self.payer)?;
        if payer.balance < initial {
            return Err(reject(INSUFFICIENT_PAYER_BALANCE));
        }
        payer.balance -= initial;

        let id = self.state.allocate();
        let mut account = AccountState::new(key.to_string(), initial);
        account.max_auto_associations = max_auto;
        account.receiver_signature_required = receiver_signature_required;
        account.alias = p.alias.clone();
        account.memo = p.memo.clone().unwrap_or_default();
        self.state.accounts.insert(id.clone(), account);

        Ok(json!({ "accountId": id, "status": SUCCESS_STATUS }))
    }

    fn update_account(&mut self, p: &UpdateAccountParams) -> Outcome {
        self.require_account_key(&p.account_id)?;
        if let Some(key) = &p.key {
            self.signed.require(key)?;
        }
        let account = self.state.live_account_mut(&p.account_id)?;
        if let Some(slots) = p.max_auto_token_associations {
            if slots < -1 {
                return Err(reject(INVALID_MAX_AUTO_ASSOCIATIONS));
            }
            if slots != -1 && slots < account.auto_associations_used() {
                return Err(reject(EXISTING_AUTOMATIC_ASSOCIATIONS_EXCEED_GIVEN_LIMIT));
            }
            account.max_auto_associations = slots;
        }
        if let Some(key) = &p.key {
            account.key = key.clone();
        }
        if let Some(required) = p.receiver_signature_required {
            account.receiver_signature_required = required;
        }
        if let Some(memo) = &p.memo {
            account.memo = memo.clone();
        }
        Ok(success())
    }

    fn delete_account(&mut self, p: &DeleteAccountParams) -> Outcome {
        shape("account id", &p.delete_account_id)?;
        shape("account id", &p.transfer_account_id)?;
        let account = self.state.live_account(&p.delete_account_id)?;
        if p.delete_account_id == p.transfer_account_id {
            return Err(reject(TRANSFER_ACCOUNT_SAME_AS_DELETE_ACCOUNT));
        }
        match self.state.accounts.get(&p.transfer_account_id) {
            None => return Err(reject(INVALID_TRANSFER_ACCOUNT_ID)),
            Some(beneficiary) if beneficiary.deleted => return Err(reject(ACCOUNT_DELETED)),
            Some(_) => {}
        }
        self.signed.require(&account.key)?;
        if self
            .state
            .tokens
            .values()
            .any(|t| t.treasury == p.delete_account_id)
        {
            return Err(reject(ACCOUNT_IS_TREASURY));
        }
        if account.tokens.values().any(|r| r.balance != 0) {
            return Err(reject(TRANSACTION_REQUIRES_ZERO_TOKEN_BALANCES));
        }

        let account = self.state.live_account_mut(&p.delete_account_id)?;
        let balance = account.balance;
        account.balance = 0;
        account.deleted = true;
        self.state.live_account_mut(&p.transfer_account_id)?.balance += balance;
        Ok(success())
    }

    fn approve_allowance(&mut self, p: &ApproveAllowanceParams) -> Outcome {
        for allowance in &p.allowances {
            let owner_id = &allowance.owner_account_id;
            let spender_id = &allowance.spender_account_id;
            self.require_account_key(owner_id)?;
            shape("spender id", spender_id)?;
            if !self
                .state
                .accounts
                .get(spender_id)
                .is_some_and(|s| !s.deleted)
            {
                return Err(reject(INVALID_ALLOWANCE_SPENDER_ID));
            }

            match &allowance.kind {
                AllowanceKind::Hbar(hbar) => {
                    if hbar.amount < 0 {
                        return Err(reject(NEGATIVE_ALLOWANCE_AMOUNT));
                    }
                    let owner = self.state.live_account_mut(owner_id)?;
                    if hbar.amount == 0 {
                        owner.hbar_allowances.remove(spender_id);
                    } else {
                        owner.hbar_allowances.insert(spender_id.clone(), hbar.amount);
                    }
                }
                AllowanceKind::Token(token) => {
                    self.state.token(&token.token_id)?;
                    if token.amount < 0 {
                        return Err(reject(NEGATIVE_ALLOWANCE_AMOUNT));
                    }
                    let owner = self.state.live_account_mut(owner_id)?;
                    if !owner.tokens.contains_key(&token.token_id) {
                        return Err(reject(TOKEN_NOT_ASSOCIATED_TO_ACCOUNT));
                    }
                    let slot = (token.token_id.clone(), spender_id.clone());
                    if token.amount == 0 {
                        owner.token_allowances.remove(&slot);
                    } else {
                        owner.token_allowances.insert(slot, token.amount);
                    }
                }
                AllowanceKind::Nft(nft) => {
                    self.state.token(&nft.token_id)?;
                    for serial in &nft.serial_numbers {
                        match self.state.nfts.get(&(nft.token_id.clone(), *serial)) {
                            None => return Err(reject(INVALID_NFT_ID)),
                            Some(holder) if holder != owner_id => {
                                return Err(reject(SENDER_DOES_NOT_OWN_NFT_SERIAL_NO))
                            }
                            Some(_) => {}
                        }
                    }
                    let owner = self.state.live_account_mut(owner_id)?;
                    if !owner.tokens.contains_key(&nft.token_id) {
                        return Err(reject(TOKEN_NOT_ASSOCIATED_TO_ACCOUNT));
                    }
                    let all = (nft.token_id.clone(), spender_id.clone());
                    match nft.approved_for_all {
                        Some(true) => {
                            owner.nft_approved_for_all.insert(all);
                        }
                        Some(false) => {
                            owner.nft_approved_for_all.remove(&all);
                        }
                        None => {}
                    }
                    for serial in &nft.serial_numbers {
                        owner
                            .nft_allowances
                            .insert((nft.token_id.clone(), *serial), spender_id.clone());
                    }
                }
            }
        }
        Ok(success())
    }

    fn delete_allowance(&mut self, p: &DeleteAllowanceParams) -> Outcome {
        for removal in &p.allowances {
            self.require_account_key(&removal.owner_account_id)?;
            self.state.token(&removal.token_id)?;
            for serial in &removal.serial_numbers {
                match self.state.nfts.get(&(removal.token_id.clone(), *serial)) {
                    None => return Err(reject(INVALID_NFT_ID)),
                    Some(holder) if *holder != removal.owner_account_id => {
                        return Err(reject(SENDER_DOES_NOT_OWN_NFT_SERIAL_NO))
                    }
                    Some(_) => {}
                }
            }
            let owner = self.state.live_account_mut(&removal.owner_account_id)?;
            for serial in &removal.serial_numbers {
                owner
                    .nft_allowances
                    .remove(&(removal.token_id.clone(), *serial));
            }
        }
        Ok(success())
    }

    fn create_token(&mut self, p: &CreateTokenParams) -> Outcome {
        if p.name.as_deref().map_or(true, str::is_empty) {
            return Err(reject(MISSING_TOKEN_NAME));
        }
        if p.symbol.as_deref().map_or(true, str::is_empty) {
            return Err(reject(MISSING_TOKEN_SYMBOL));
        }
        let treasury = p
            .treasury_account_id
            .as_deref()
            .ok_or_else(|| reject(INVALID_TREASURY_ACCOUNT_FOR_TOKEN))?;
        shape("treasury id", treasury)?;
        let treasury_key = match self.state.accounts.get(treasury) {
            Some(account) if !account.deleted => account.key.clone(),
            _ => return Err(reject(INVALID_TREASURY_ACCOUNT_FOR_TOKEN)),
        };
        self.signed.require(&treasury_key)?;
        if let Some(admin) = &p.admin_key {
            self.signed.require(admin)?;
        }

        let token_type = p.token_type.unwrap_or(TokenType::Fungible);
        let initial_supply = p.initial_supply.unwrap_or(0);
        let decimals = p.decimals.unwrap_or(0);
        if initial_supply < 0 {
            return Err(reject(INVALID_TOKEN_INITIAL_SUPPLY));
        }
        if token_type == TokenType::NonFungible {
            if initial_supply > 0 {
                return Err(reject(INVALID_TOKEN_INITIAL_SUPPLY));
            }
            if decimals > 0 {
                return Err(reject(INVALID_TOKEN_DECIMALS));
            }
            if p.supply_key.is_none() {
                return Err(reject(TOKEN_HAS_NO_SUPPLY_KEY));
            }
        }
        if p.max_supply.is_some_and(|max| initial_supply > max) {
            return Err(reject(INVALID_TOKEN_INITIAL_SUPPLY));
        }

        let fees = p.custom_fees.clone().unwrap_or_default();
        let next_id = entity_id(self.state.next_num + 1);
        let collectors = self.state.check_fees(&next_id, token_type, &fees)?;
        let token_id = self.state.allocate();

        let token = TokenState {
            token_type,
            treasury: treasury.to_string(),
            decimals,
            total_supply: initial_supply,
            max_supply: p.max_supply,
            admin_key: p.admin_key.clone(),
            supply_key: p.supply_key.clone(),
            freeze_key: p.freeze_key.clone(),
            kyc_key: p.kyc_key.clone(),
            pause_key: p.pause_key.clone(),
            fee_schedule_key: p.fee_schedule_key.clone(),
            freeze_default: p.freeze_default.unwrap_or(false),
            paused: false,
            next_serial: 1,
            custom_fees: fees,
        };
        let treasury_relationship = Relationship {
            balance: initial_supply,
            frozen: false,
            kyc_granted: true,
            automatic: false,
        };
        self.state.tokens.insert(token_id.clone(), token);
        self.state
            .live_account_mut(treasury)?
            .tokens
            .insert(token_id.clone(), treasury_relationship);
        self.state.associate_collectors(&token_id, collectors)?;

        Ok(json!({ "tokenId": token_id, "status": SUCCESS_STATUS }))
    }

    fn update_token(&mut self, p: &UpdateTokenParams) -> Outcome {
        let token = self.state.token(&p.token_id)?;
        let admin = token.admin_key.clone().ok_or_else(|| reject(TOKEN_IS_IMMUTABLE))?;
        self.signed.require(&admin)?;
        if let Some(new_admin) = &p.admin_key {
            self.signed.require(new_admin)?;
        }
        if let Some(treasury) = &p.treasury_account_id {
            shape("treasury id", treasury)?;
            let account = match self.state.accounts.get(treasury) {
                Some(account) if !account.deleted => account,
                _ => return Err(reject(INVALID_TREASURY_ACCOUNT_FOR_TOKEN)),
            };
            self.signed.require(&account.key)?;
            if !account.tokens.contains_key(&p.token_id) {
                return Err(reject(TOKEN_NOT_ASSOCIATED_TO_ACCOUNT));
            }
        }

        let token = self.state.token_mut(&p.token_id)?;
        if let Some(treasury) = &p.treasury_account_id {
            token.treasury = treasury.clone();
        }
        if let Some(key) = &p.admin_key {
            token.admin_key = Some(key.clone());
        }
        if let Some(key) = &p.freeze_key {
            token.freeze_key = Some(key.clone());
        }
        if let Some(key) = &p.pause_key {
            token.pause_key = Some(key.clone());
        }
        if let Some(key) = &p.supply_key {
            token.supply_key = Some(key.clone());
        }
        Ok(success())
    }

    fn update_fee_schedule(&mut self, p: &UpdateFeeScheduleParams) -> Outcome {
        let token = self.state.token(&p.token_id)?;
        let key = token
            .fee_schedule_key
            .clone()
            .ok_or_else(|| reject(TOKEN_HAS_NO_FEE_SCHEDULE_KEY))?;
        self.signed.require(&key)?;
        let collectors = self
            .state
            .check_fees(&p.token_id, token.token_type, &p.custom_fees)?;
        self.state.token_mut(&p.token_id)?.custom_fees = p.custom_fees.clone();
        self.state.associate_collectors(&p.token_id, collectors)?;
        Ok(success())
    }

    fn mint(&mut self, p: &MintTokenParams) -> Outcome {
        let token = self.state.token(&p.token_id)?;
        let key = token
            .supply_key
            .clone()
            .ok_or_else(|| reject(TOKEN_HAS_NO_SUPPLY_KEY))?;
        self.signed.require(&key)?;
        let treasury = token.treasury.clone();

        let (added, serials) = match token.token_type {
            TokenType::Fungible => {
                if p.metadata.is_some() {
                    return Err(reject(INVALID_TOKEN_MINT_METADATA));
                }
                match p.amount {
                    Some(amount) if amount > 0 => (amount, Vec::new()),
                    _ => return Err(reject(INVALID_TOKEN_MINT_AMOUNT)),
                }
            }
            TokenType::NonFungible => {
                if p.amount.is_some_and(|a| a != 0) {
                    return Err(reject(INVALID_TOKEN_MINT_AMOUNT));
                }
                let count = p.metadata.as_ref().map_or(0, Vec::len);
                if count == 0 {
                    return Err(reject(INVALID_TOKEN_MINT_METADATA));
                }
                let first = token.next_serial;
                (count as i64, (first..first + count as u64).collect())
            }
        };
        if token.max_supply.is_some_and(|max| token.total_supply + added > max) {
            return Err(reject(TOKEN_MAX_SUPPLY_REACHED));
        }

        let token = self.state.token_mut(&p.token_id)?;
        token.total_supply += added;
        token.next_serial += serials.len() as u64;
        let total = token.total_supply;
        for serial in &serials {
            self.state
                .nfts
                .insert((p.token_id.clone(), *serial), treasury.clone());
        }
        self.state
            .live_account_mut(&treasury)?
            .tokens
            .entry(p.token_id.clone())
            .or_default()
            .balance += added;

        Ok(json!({
            "status": SUCCESS_STATUS,
            "newTotalSupply": total.to_string(),
            "serialNumbers": serials.iter().map(u64::to_string).collect::<Vec<_>>(),
        }))
    }

    fn associate(&mut self, p: &AssociateTokenParams) -> Outcome {
        self.require_account_key(&p.account_id)?;
        let mut seen = BTreeSet::new();
        for token_id in &p.token_ids {
            if !seen.insert(token_id) {
                return Err(reject(TOKEN_ID_REPEATED_IN_TOKEN_LIST));
            }
            let relationship = self.state.token(token_id)?.new_relationship(false);
            let account = self.state.live_account_mut(&p.account_id)?;
            if account.tokens.contains_key(token_id) {
                return Err(reject(TOKEN_ALREADY_ASSOCIATED_TO_ACCOUNT));
            }
            account.tokens.insert(token_id.clone(), relationship);
        }
        Ok(success())
    }

    fn token_account_op<K, F>(
        &mut self,
        p: &TokenAccountParams,
        key: K,
        missing: &str,
        apply: F,
    ) -> Outcome
    where
        K: Fn(&TokenState) -> Option<String>,
        F: FnOnce(&mut Relationship),
    {
        shape("token id", &p.token_id)?;
        shape("account id", &p.account_id)?;
        let token = self.state.token(&p.token_id)?;
        let key = key(token).ok_or_else(|| reject(missing))?;
        self.signed.require(&key)?;
        let account = self.state.live_account_mut(&p.account_id)?;
        let relationship = account
            .tokens
            .get_mut(&p.token_id)
            .ok_or_else(|| reject(TOKEN_NOT_ASSOCIATED_TO_ACCOUNT))?;
        apply(relationship);
        Ok(success())
    }

    fn set_paused(&mut self, p: &TokenParams, paused: bool) -> Outcome {
        let token = self.state.token(&p.token_id)?;
        let key = token
            .pause_key
            .clone()
            .ok_or_else(|| reject(TOKEN_HAS_NO_PAUSE_KEY))?;
        self.signed.require(&key)?;
        self.state.token_mut(&p.token_id)?.paused = paused;
        Ok(success())
    }

    fn signing_spenders(&self) -> Vec<String> {
        self.state
            .accounts
            .iter()
            .filter(|(_, a)| !a.deleted && self.signed.covers(&a.key))
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn spend_allowance(&mut self, debit: &Debit) -> Result<(), Failure> {
        let spenders = self.signing_spenders();
        let owner = self.state.live_account_mut(&debit.account)?;
        let found = spenders.iter().find_map(|spender| {
            let allowed = match &debit.asset {
                None => owner.hbar_allowances.get(spender),
                Some(token) => owner.token_allowances.get(&(token.clone(), spender.clone())),
            };
            allowed.map(|a| (spender.clone(), *a))
        });
        let Some((spender, allowed)) = found else {
            return Err(reject(SPENDER_DOES_NOT_HAVE_ALLOWANCE));
        };
        if debit.amount > i128::from(allowed) {
            return Err(reject(AMOUNT_EXCEEDS_ALLOWANCE));
        }
        let left = narrow(i128::from(allowed) - debit.amount)?;
        match &debit.asset {
            None if left == 0 => {
                owner.hbar_allowances.remove(&spender);
            }
            None => {
                owner.hbar_allowances.insert(spender, left);
            }
            Some(token) if left == 0 => {
                owner.token_allowances.remove(&(token.clone(), spender));
            }
            Some(token) => {
                owner.token_allowances.insert((token.clone(), spender), left);
            }
        }
        Ok(())
    }

    fn check_nft_allowance(&self, nft: &NftTransfer) -> Result<(), Failure> {
        let spenders = self.signing_spenders();
        let owner = self.state.live_account(&nft.sender_account_id)?;
        let serial = owner
            .nft_allowances
            .get(&(nft.token_id.clone(), nft.serial_number));
        let allowed = spenders.iter().any(|spender| {
            serial == Some(spender)
                || owner
                    .nft_approved_for_all
                    .contains(&(nft.token_id.clone(), spender.clone()))
        });
        if allowed {
            Ok(())
        } else {
            Err(reject(SPENDER_DOES_NOT_HAVE_ALLOWANCE))
        }
    }

    fn check_holder(&self, account_id: &str, token_id: &str) -> Result<(), Failure> {
        let token = self.state.token(token_id)?;
        let relationship = self
            .state
            .live_account(account_id)?
            .tokens
            .get(token_id)
            .ok_or_else(|| reject(TOKEN_NOT_ASSOCIATED_TO_ACCOUNT))?;
        if relationship.frozen {
            return Err(reject(ACCOUNT_FROZEN_FOR_TOKEN));
        }
        if token.kyc_key.is_some() && !relationship.kyc_granted {
            return Err(reject(ACCOUNT_KYC_NOT_GRANTED_FOR_TOKEN));
        }
        Ok(())
    }

    /// Make `account_id` able to receive `token_id`, using an automatic
    /// association slot if needed. `Ok(false)` means the credit must become
    /// a pending airdrop.
    fn reach(&mut self, account_id: &str, token_id: &str, airdrop: bool) -> Result<bool, Failure> {
        let relationship = self.state.token(token_id)?.new_relationship(true);
        let account = self.state.live_account_mut(account_id)?;
        if !account.tokens.contains_key(token_id) {
            if account.has_free_slot() {
                account.tokens.insert(token_id.to_string(), relationship);
            } else if airdrop {
                return Ok(false);
            } else {
                return Err(reject(TOKEN_NOT_ASSOCIATED_TO_ACCOUNT));
            }
        }
        self.check_holder(account_id, token_id)?;
        Ok(true)
    }

    fn check_balances(
        &self,
        nets: &Nets,
        token_status: &str,
        hbar_status: &str,
    ) -> Result<(), Failure> {
        for (asset, accounts) in nets {
            for (account_id, net) in accounts.iter().filter(|(_, n)| **n < 0) {
                let account = self.state.live_account(account_id)?;
                let held = match asset {
                    None => account.balance,
                    Some(token) => account.tokens.get(token).map_or(0, |r| r.balance),
                };
                if i128::from(held) + net < 0 {
                    return Err(reject(if asset.is_none() {
                        hbar_status
                    } else {
                        token_status
                    }));
                }
            }
        }
        Ok(())
    }

    /// Custom fee legs for the fungible debits in `nets` and the NFT moves.
    fn assess_fees(
        &self,
        nets: &mut Nets,
        nft_senders: &[(String, String)],
    ) -> Result<Nets, Failure> {
        let mut charges: Nets = BTreeMap::new();
        let mut charge = |asset: Option<String>, payer: &str, collector: &str, amount: i128| {
            let legs = charges.entry(asset).or_default();
            *legs.entry(payer.to_string()).or_default() -= amount;
            *legs.entry(collector.to_string()).or_default() += amount;
        };

        let mut payers: Vec<(String, String, i128)> = nets
            .iter()
            .filter_map(|(asset, accounts)| asset.as_ref().map(|t| (t, accounts)))
            .flat_map(|(token_id, accounts)| {
                accounts
                    .iter()
                    .filter(|(_, n)| **n < 0)
                    .map(move |(payer, n)| (token_id.clone(), payer.clone(), -n))
            })
            .collect();
        payers.extend(
            nft_senders
                .iter()
                .map(|(token_id, sender)| (token_id.clone(), sender.clone(), 0)),
        );

        for (token_id, payer, moved) in payers {
            let token = self.state.token(&token_id)?;
            if token.treasury == payer || token.collects(&payer) {
                continue;
            }
            for fee in &token.custom_fees {
                let collector = fee.fee_collector_account_id.as_str();
                match &fee.kind {
                    CustomFeeKind::FixedFee(fixed) => {
                        let asset = match fixed.denominating_token_id.as_deref() {
                            Some("0.0.0") => Some(token_id.clone()),
                            other => other.map(str::to_string),
                        };
                        charge(asset, &payer, collector, i128::from(fixed.amount));
                    }
                    CustomFeeKind::FractionalFee(fractional) if moved > 0 => {
                        let mut fee = moved * i128::from(fractional.numerator)
                            / i128::from(fractional.denominator);
                        fee = fee.max(i128::from(fractional.minimum_amount));
                        if fractional.maximum_amount > 0 {
                            fee = fee.min(i128::from(fractional.maximum_amount));
                        }
                        match fractional.assessment_method {
                            AssessmentMethod::Exclusive => {
                                charge(Some(token_id.clone()), &payer, collector, fee)
                            }
                            AssessmentMethod::Inclusive => {
                                let accounts = nets.entry(Some(token_id.clone())).or_default();
                                let mut remaining = fee;
                                for (account, n) in accounts.iter_mut() {
                                    if remaining == 0 {
                                        break;
                                    }
                                    if *n > 0 && account != collector {
                                        let take = (*n).min(remaining);
                                        *n -= take;
                                        remaining -= take;
                                    }
                                }
                                *accounts.entry(collector.to_string()).or_default() +=
                                    fee - remaining;
                            }
                        }
                    }
                    CustomFeeKind::FractionalFee(_) | CustomFeeKind::RoyaltyFee(_) => {}
                }
            }
        }
        Ok(charges)
    }

    fn apply_nets(&mut self, nets: &Nets) -> Result<(), Failure> {
        for (asset, accounts) in nets {
            for (account_id, net) in accounts.iter().filter(|(_, n)| **n != 0) {
                let account = self.state.live_account_mut(account_id)?;
                match asset {
                    None => account.balance = narrow(i128::from(account.balance) + net)?,
                    Some(token) => {
                        let relationship = account
                            .tokens
                            .get_mut(token)
                            .ok_or_else(|| reject(TOKEN_NOT_ASSOCIATED_TO_ACCOUNT))?;
                        relationship.balance = narrow(i128::from(relationship.balance) + net)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn transfer(&mut self, entries: &[TransferEntry], airdrop: bool) -> Outcome {
        if entries.is_empty() {
            return Err(reject(INVALID_TRANSACTION_BODY));
        }
        for entry in entries {
            match &entry.line {
                TransferLine::Hbar(h) => shape("account id", &h.account_id)?,
                TransferLine::Token(t) => {
                    shape("account id", &t.account_id)?;
                    shape("token id", &t.token_id)?;
                }
                TransferLine::Nft(n) => {
                    shape("account id", &n.sender_account_id)?;
                    shape("account id", &n.receiver_account_id)?;
                    shape("token id", &n.token_id)?;
                }
            }
        }

        let mut nets: Nets = BTreeMap::new();
        let mut debits = Vec::new();
        let mut nft_moves: Vec<(&NftTransfer, bool)> = Vec::new();
        let mut moved_serials = BTreeSet::new();

        for entry in entries {
            let (account_id, asset, amount) = match &entry.line {
                TransferLine::Hbar(h) => {
                    if airdrop {
                        return Err(reject(INVALID_TRANSACTION_BODY));
                    }
                    (&h.account_id, None, h.amount)
                }
                TransferLine::Token(t) => {
                    let token = self.state.token(&t.token_id)?;
                    if token.token_type != TokenType::Fungible {
                        return Err(reject(
                            ACCOUNT_AMOUNT_TRANSFERS_ONLY_ALLOWED_FOR_FUNGIBLE_COMMON,
                        ));
                    }
                    if t.decimals.is_some_and(|d| d != token.decimals) {
                        return Err(reject(UNEXPECTED_TOKEN_DECIMALS));
                    }
                    (&t.account_id, Some(t.token_id.clone()), t.amount)
                }
                TransferLine::Nft(n) => {
                    let token = self.state.token(&n.token_id)?;
                    if token.token_type != TokenType::NonFungible {
                        return Err(reject(INVALID_NFT_ID));
                    }
                    self.state.live_account(&n.sender_account_id)?;
                    self.state.live_account(&n.receiver_account_id)?;
                    if n.sender_account_id == n.receiver_account_id {
                        return Err(reject(ACCOUNT_REPEATED_IN_ACCOUNT_AMOUNTS));
                    }
                    if !moved_serials.insert((n.token_id.clone(), n.serial_number)) {
                        return Err(reject(INVALID_NFT_ID));
                    }
                    match self.state.nfts.get(&(n.token_id.clone(), n.serial_number)) {
                        None => return Err(reject(INVALID_NFT_ID)),
                        Some(owner) if *owner != n.sender_account_id => {
                            return Err(reject(SENDER_DOES_NOT_OWN_NFT_SERIAL_NO))
                        }
                        Some(_) => {}
                    }
                    nft_moves.push((n, entry.approved));
                    continue;
                }
            };
            self.state.live_account(account_id)?;
            *nets
                .entry(asset.clone())
                .or_default()
                .entry(account_id.clone())
                .or_default() += i128::from(amount);
            if amount < 0 {
                debits.push(Debit {
                    account: account_id.clone(),
                    asset,
                    amount: -i128::from(amount),
                    approved: entry.approved,
                });
            }
        }

        for (asset, accounts) in &nets {
            if accounts.values().sum::<i128>() != 0 {
                return Err(reject(if asset.is_none() {
                    INVALID_ACCOUNT_AMOUNTS
                } else {
                    TRANSFERS_NOT_ZERO_SUM_FOR_TOKEN
                }));
            }
        }

        for debit in debits.iter().filter(|d| !d.approved) {
            self.require_account_key(&debit.account)?;
        }
        for (nft, approved) in &nft_moves {
            if !approved {
                self.require_account_key(&nft.sender_account_id)?;
            }
        }
        let receivers = nets
            .values()
            .flat_map(|accounts| accounts.iter().filter(|(_, n)| **n > 0).map(|(a, _)| a))
            .chain(nft_moves.iter().map(|(n, _)| &n.receiver_account_id));
        for receiver in receivers {
            let account = self.state.live_account(receiver)?;
            if account.receiver_signature_required {
                self.signed.require(&account.key)?;
            }
        }

        for debit in debits.iter().filter(|d| d.approved) {
            self.spend_allowance(debit)?;
        }
        for (nft, approved) in &nft_moves {
            if *approved {
                self.check_nft_allowance(nft)?;
            }
        }

        let mut offers = Vec::new();
        let token_ids: Vec<String> = nets.keys().flatten().cloned().collect();
        for token_id in token_ids {
            let Some(accounts) = nets.get(&Some(token_id.clone())) else {
                continue;
            };
            if accounts.values().all(|n| *n == 0) {
                continue;
            }
            if self.state.token(&token_id)?.paused {
                return Err(reject(TOKEN_IS_PAUSED));
            }
            let senders: Vec<String> = accounts
                .iter()
                .filter(|(_, n)| **n < 0)
                .map(|(a, _)| a.clone())
                .collect();
            let receivers: Vec<String> = accounts
                .iter()
                .filter(|(_, n)| **n > 0)
                .map(|(a, _)| a.clone())
                .collect();
            for sender in &senders {
                self.check_holder(sender, &token_id)?;
            }
            for receiver in receivers {
                if self.reach(&receiver, &token_id, airdrop)? {
                    continue;
                }
                let [sender] = senders.as_slice() else {
                    return Err(reject(AIRDROP_CONTAINS_MULTIPLE_SENDERS_FOR_A_TOKEN));
                };
                let accounts = nets.entry(Some(token_id.clone())).or_default();
                let amount = accounts.remove(&receiver).unwrap_or(0);
                *accounts.entry(sender.clone()).or_default() += amount;
                offers.push(PendingAirdrop {
                    sender_id: sender.clone(),
                    receiver_id: receiver,
                    token_id: token_id.clone(),
                    amount: Some(narrow(amount)?),
                    serial: None,
                });
            }
        }

        let mut delivered = Vec::new();
        for (nft, _) in &nft_moves {
            if self.state.token(&nft.token_id)?.paused {
                return Err(reject(TOKEN_IS_PAUSED));
            }
            self.check_holder(&nft.sender_account_id, &nft.token_id)?;
            if self.reach(&nft.receiver_account_id, &nft.token_id, airdrop)? {
                delivered.push(*nft);
            } else {
                offers.push(PendingAirdrop {
                    sender_id: nft.sender_account_id.clone(),
                    receiver_id: nft.receiver_account_id.clone(),
                    token_id: nft.token_id.clone(),
                    amount: None,
                    serial: Some(nft.serial_number),
                });
            }
        }

        self.check_balances(&nets, INSUFFICIENT_TOKEN_BALANCE, INSUFFICIENT_ACCOUNT_BALANCE)?;
        let nft_senders: Vec<(String, String)> = delivered
            .iter()
            .map(|n| (n.token_id.clone(), n.sender_account_id.clone()))
            .collect();
        let charges = self.assess_fees(&mut nets, &nft_senders)?;
        for (asset, legs) in charges {
            let accounts = nets.entry(asset).or_default();
            for (account, amount) in legs {
                *accounts.entry(account).or_default() += amount;
            }
        }
        self.check_balances(
            &nets,
            INSUFFICIENT_SENDER_ACCOUNT_BALANCE_FOR_CUSTOM_FEE,
            INSUFFICIENT_SENDER_ACCOUNT_BALANCE_FOR_CUSTOM_FEE,
        )?;

        self.apply_nets(&nets)?;
        for nft in delivered {
            let slot = (nft.token_id.clone(), nft.serial_number);
            let sender = self.state.live_account_mut(&nft.sender_account_id)?;
            sender.nft_allowances.remove(&slot);
            if let Some(r) = sender.tokens.get_mut(&nft.token_id) {
                r.balance -= 1;
            }
            if let Some(r) = self
                .state
                .live_account_mut(&nft.receiver_account_id)?
                .tokens
                .get_mut(&nft.token_id)
            {
                r.balance += 1;
            }
            self.state.nfts.insert(slot, nft.receiver_account_id.clone());
        }
        for offer in offers {
            let existing = self.state.airdrops.iter_mut().find(|o| {
                o.serial.is_none()
                    && offer.serial.is_none()
                    && o.sender_id == offer.sender_id
                    && o.receiver_id == offer.receiver_id
                    && o.token_id == offer.token_id
            });
            match existing {
                Some(o) => o.amount = Some(o.amount.unwrap_or(0) + offer.amount.unwrap_or(0)),
                None => self.state.airdrops.push(offer),
            }
        }

        Ok(success())
    }

    fn apply(&mut self, request: &OperationRequest) -> Outcome {
        match request {
            OperationRequest::CreateAccount(p) => self.create_account(p),
            OperationRequest::UpdateAccount(p) => self.update_account(p),
            OperationRequest::DeleteAccount(p) => self.delete_account(p),
            OperationRequest::TransferCrypto(p) => self.transfer(&p.transfers, false),
            OperationRequest::AirdropToken(p) => self.transfer(&p.token_transfers, true),
            OperationRequest::ApproveAllowance(p) => self.approve_allowance(p),
            OperationRequest::DeleteAllowance(p) => self.delete_allowance(p),
            OperationRequest::CreateToken(p) => self.create_token(p),
            OperationRequest::UpdateToken(p) => self.update_token(p),
            OperationRequest::UpdateTokenFeeSchedule(p) => self.update_fee_schedule(p),
            OperationRequest::MintToken(p) => self.mint(p),
            OperationRequest::AssociateToken(p) => self.associate(p),
            OperationRequest::FreezeToken(p) => {
                self.token_account_op(p, |t| t.freeze_key.clone(), TOKEN_HAS_NO_FREEZE_KEY, |r| {
                    r.frozen = true
                })
            }
            OperationRequest::UnfreezeToken(p) => {
                self.token_account_op(p, |t| t.freeze_key.clone(), TOKEN_HAS_NO_FREEZE_KEY, |r| {
                    r.frozen = false
                })
            }
            OperationRequest::GrantTokenKyc(p) => {
                self.token_account_op(p, |t| t.kyc_key.clone(), TOKEN_HAS_NO_KYC_KEY, |r| {
                    r.kyc_granted = true
                })
            }
            OperationRequest::PauseToken(p) => self.set_paused(p, true),
            OperationRequest::UnpauseToken(p) => self.set_paused(p, false),
            OperationRequest::Setup(_)
            | OperationRequest::Reset
            | OperationRequest::GenerateKey(_)
            | OperationRequest::Custom { .. } => Err(Failure::internal(
                INTERNAL_ERROR_CODE,
                format!("{} is not a ledger transaction", request.method_name()),
            )),
        }
    }
}

fn common_params(request: &OperationRequest) -> Option<&CommonTransactionParams> {
    match request {
        OperationRequest::CreateAccount(p) => p.common_transaction_params.as_ref(),
        OperationRequest::UpdateAccount(p) => p.common_transaction_params.as_ref(),
        OperationRequest::DeleteAccount(p) => p.common_transaction_params.as_ref(),
        OperationRequest::TransferCrypto(p) => p.common_transaction_params.as_ref(),
        OperationRequest::AirdropToken(p) => p.common_transaction_params.as_ref(),
        OperationRequest::ApproveAllowance(p) => p.common_transaction_params.as_ref(),
        OperationRequest::DeleteAllowance(p) => p.common_transaction_params.as_ref(),
        OperationRequest::CreateToken(p) => p.common_transaction_params.as_ref(),
        OperationRequest::UpdateToken(p) => p.common_transaction_params.as_ref(),
        OperationRequest::UpdateTokenFeeSchedule(p) => p.common_transaction_params.as_ref(),
        OperationRequest::MintToken(p) => p.common_transaction_params.as_ref(),
        OperationRequest::AssociateToken(p) => p.common_transaction_params.as_ref(),
        OperationRequest::FreezeToken(p)
        | OperationRequest::UnfreezeToken(p)
        | OperationRequest::GrantTokenKyc(p) => p.common_transaction_params.as_ref(),
        OperationRequest::PauseToken(p) | OperationRequest::UnpauseToken(p) => {
            p.common_transaction_params.as_ref()
        }
        OperationRequest::Setup(_)
        | OperationRequest::Reset
        | OperationRequest::GenerateKey(_)
        | OperationRequest::Custom { .. } => None,
    }
}

fn query(state: &LedgerState, method: &str, params: &Value) -> Outcome {
    let field = |name: &str| params.get(name).and_then(Value::as_str).unwrap_or_default();

    match method {
        methods::GET_ACCOUNT_BALANCE => {
            let account_id = field("accountId");
            let account = state.live_account(account_id)?;
            let tokens: Map<String, Value> = account
                .tokens
                .iter()
                .map(|(t, r)| (t.clone(), Value::String(r.balance.to_string())))
                .collect();
            Ok(json!({
                "accountId": account_id,
                "hbars": account.balance.to_string(),
                "tokenBalances": tokens,
            }))
        }
        methods::GET_ACCOUNT_INFO => {
            let account_id = field("accountId");
            let account = state.live_account(account_id)?;
            let mut relationships = Map::new();
            for (token_id, r) in &account.tokens {
                let token = state.token(token_id)?;
                let freeze = match (&token.freeze_key, r.frozen) {
                    (None, _) => "NOT_APPLICABLE",
                    (Some(_), true) => "FROZEN",
                    (Some(_), false) => "UNFROZEN",
                };
                let kyc = match (&token.kyc_key, r.kyc_granted) {
                    (None, _) => "NOT_APPLICABLE",
                    (Some(_), true) => "GRANTED",
                    (Some(_), false) => "REVOKED",
                };
                relationships.insert(
                    token_id.clone(),
                    json!({
                        "balance": r.balance.to_string(),
                        "freezeStatus": freeze,
                        "kycStatus": kyc,
                        "automaticAssociation": r.automatic,
                    }),
                );
            }
            Ok(json!({
                "accountId": account_id,
                "balance": account.balance.to_string(),
                "maxAutomaticTokenAssociations": account.max_auto_associations,
                "tokenRelationships": relationships,
            }))
        }
        methods::GET_TOKEN_NFT_INFO => {
            let token_id = field("tokenId");
            state.token(token_id)?;
            let serial = params
                .get("serialNumber")
                .ok_or_else(|| Failure::internal(INVALID_PARAMS_CODE, "missing serialNumber"))
                .and_then(|v| {
                    parse_quantity(v)
                        .map_err(|e| Failure::internal(INVALID_PARAMS_CODE, e.to_string()))
                })?;
            let serial = u64::try_from(serial).map_err(|_| reject(INVALID_NFT_ID))?;
            let owner = state
                .nfts
                .get(&(token_id.to_string(), serial))
                .ok_or_else(|| reject(INVALID_NFT_ID))?;
            Ok(json!({
                "nfts": [{
                    "accountId": owner,
                    "tokenId": token_id,
                    "serialNumber": serial.to_string(),
                }]
            }))
        }
        other => Err(Failure::internal(
            METHOD_NOT_FOUND_CODE,
            format!("method not found: {}", other),
        )),
    }
}

struct Inner {
    state: LedgerState,
    version: u64,
    session: Option<Session>,
    injected: VecDeque<(String, Failure)>,
    calls: Vec<String>,
}

/// In-memory SUT double speaking the control protocol and the consensus
/// query methods.
///
/// ```ignore
/// let ledger = Arc::new(MockLedger::new());
/// let ctx = mock_suite(&ledger, 3).await?;
/// ```
pub struct MockLedger {
    inner: Mutex<Inner>,
    rng: TestRng,
    operator: KeyMaterial,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLedger {
    /// Ledger with a funded operator and a fixed key seed.
    pub fn new() -> Self {
        Self::with_seed(DEFAULT_SEED)
    }

    /// Ledger whose operator key and generated keys derive from `seed`.
    pub fn with_seed(seed: u64) -> Self {
        let rng = TestRng::with_seed(seed);
        let operator = KeyMaterial::generate(KeyScheme::Ed25519, &rng);
        let mut state = LedgerState {
            next_num: FIRST_ENTITY_NUM,
            ..Default::default()
        };
        state.accounts.insert(
            OPERATOR_ACCOUNT_ID.to_string(),
            AccountState::new(operator.public_der.clone(), OPERATOR_GENESIS_BALANCE),
        );

        Self {
            inner: Mutex::new(Inner {
                state,
                version: 0,
                session: None,
                injected: VecDeque::new(),
                calls: Vec::new(),
            }),
            rng,
            operator,
        }
    }

    /// Operator account id.
    pub fn operator_id(&self) -> &'static str {
        OPERATOR_ACCOUNT_ID
    }

    /// Operator key.
    pub fn operator_key(&self) -> &KeyMaterial {
        &self.operator
    }

    /// Make the next call of `method` fail with `failure`.
    pub fn fail_next(&self, method: &str, failure: Failure) {
        self.inner
            .lock()
            .injected
            .push_back((method.to_string(), failure));
    }

    /// Methods received so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().calls.clone()
    }

    /// Number of calls of `method` received so far.
    pub fn call_count(&self, method: &str) -> usize {
        self.inner.lock().calls.iter().filter(|m| *m == method).count()
    }

    /// Number of committed state changes.
    pub fn version(&self) -> u64 {
        self.inner.lock().version
    }

    /// Whether an operator session is active.
    pub fn has_session(&self) -> bool {
        self.inner.lock().session.is_some()
    }

    /// Hbar balance of a live account.
    pub fn hbar_balance(&self, account_id: &str) -> Option<i64> {
        let inner = self.inner.lock();
        inner.state.live_account(account_id).ok().map(|a| a.balance)
    }

    /// Token balance of an associated account.
    pub fn token_balance(&self, account_id: &str, token_id: &str) -> Option<i64> {
        let inner = self.inner.lock();
        inner
            .state
            .live_account(account_id)
            .ok()?
            .tokens
            .get(token_id)
            .map(|r| r.balance)
    }

    /// Current owner of an NFT serial.
    pub fn nft_owner(&self, token_id: &str, serial: u64) -> Option<String> {
        self.inner
            .lock()
            .state
            .nfts
            .get(&(token_id.to_string(), serial))
            .cloned()
    }

    /// Hbar held across all accounts, deleted ones included.
    pub fn total_hbar(&self) -> i128 {
        self.inner
            .lock()
            .state
            .accounts
            .values()
            .map(|a| i128::from(a.balance))
            .sum()
    }

    /// Whether `account_id` was deleted.
    pub fn is_deleted(&self, account_id: &str) -> bool {
        self.inner
            .lock()
            .state
            .accounts
            .get(account_id)
            .is_some_and(|a| a.deleted)
    }

    /// Unclaimed airdrop offers.
    pub fn pending_airdrops(&self) -> Vec<PendingAirdrop> {
        self.inner.lock().state.airdrops.clone()
    }

    pub(crate) fn snapshot(&self) -> (u64, LedgerState) {
        let inner = self.inner.lock();
        (inner.version, inner.state.clone())
    }

    fn generate_key(&self, p: &GenerateKeyParams) -> Outcome {
        let (scheme, public) = match p.key_type {
            KeyType::Ed25519Private => (KeyScheme::Ed25519, false),
            KeyType::Ed25519Public => (KeyScheme::Ed25519, true),
            KeyType::EcdsaSecp256k1Private => (KeyScheme::EcdsaSecp256k1, false),
            KeyType::EcdsaSecp256k1Public => (KeyScheme::EcdsaSecp256k1, true),
        };
        let key = KeyMaterial::generate(scheme, &self.rng);
        let der = if public { key.public_der } else { key.private_der };
        Ok(json!({ "key": der }))
    }

    fn setup(inner: &mut Inner, p: &SetupParams) -> Outcome {
        let account = inner.state.live_account(&p.operator_account_id)?;
        let key = KeyMaterial::from_private_der(&p.operator_private_key)
            .map_err(|e| Failure::internal(INTERNAL_ERROR_CODE, format!("operator key: {}", e)))?;
        if key.public_der != account.key {
            return Err(reject(INVALID_SIGNATURE));
        }
        inner.session = Some(Session {
            operator_id: p.operator_account_id.clone(),
            operator_key: key.public_der,
        });
        Ok(json!({ "message": "SUCCESS", "status": SUCCESS_STATUS }))
    }

    fn dispatch(&self, method: &str, params: Value) -> Outcome {
        let mut inner = self.inner.lock();
        inner.calls.push(method.to_string());
        if let Some(pos) = inner.injected.iter().position(|(m, _)| m == method) {
            if let Some((_, failure)) = inner.injected.remove(pos) {
                return Err(failure);
            }
        }

        if matches!(
            method,
            methods::GET_ACCOUNT_BALANCE | methods::GET_ACCOUNT_INFO | methods::GET_TOKEN_NFT_INFO
        ) {
            return query(&inner.state, method, &params);
        }

        let request = OperationRequest::from_call(method, params)
            .map_err(|e| Failure::internal(INVALID_PARAMS_CODE, e.to_string()))?;
        match &request {
            OperationRequest::Setup(p) => return Self::setup(&mut inner, p),
            OperationRequest::Reset => {
                inner.session = None;
                return Ok(success());
            }
            OperationRequest::GenerateKey(p) => return self.generate_key(p),
            OperationRequest::Custom { method, .. } => {
                return Err(Failure::internal(
                    METHOD_NOT_FOUND_CODE,
                    format!("method not found: {}", method),
                ))
            }
            _ => {}
        }

        let session = inner
            .session
            .as_ref()
            .ok_or_else(|| Failure::internal(INTERNAL_ERROR_CODE, "setup has not been called"))?;
        let mut keys = BTreeSet::new();
        keys.insert(session.operator_key.clone());
        for der in common_params(&request).map_or(&[][..], |c| c.signers.as_slice()) {
            let key = KeyMaterial::from_private_der(der).map_err(|e| {
                Failure::internal(INTERNAL_ERROR_CODE, format!("unusable signer key: {}", e))
            })?;
            keys.insert(key.public_der);
        }
        let signed = Signatures(keys);
        let payer = session.operator_id.clone();

        let mut working = inner.state.clone();
        let result = Tx {
            state: &mut working,
            signed: &signed,
            payer: &payer,
        }
        .apply(&request);

        match &result {
            Ok(_) => {
                inner.state = working;
                inner.version += 1;
                debug!("mock ledger: {} committed (version {})", method, inner.version);
            }
            Err(failure) => debug!("mock ledger: {} rejected: {}", method, failure),
        }
        result
    }
}

#[async_trait]
impl ControlRpc for MockLedger {
    async fn call(&self, method: &str, params: Value) -> Result<Value, Failure> {
        self.dispatch(method, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::request::{HbarTransfer, SetupParams, TransferParams};

    fn ready() -> MockLedger {
        let ledger = MockLedger::new();
        let setup = SetupParams {
            operator_account_id: OPERATOR_ACCOUNT_ID.to_string(),
            operator_private_key: ledger.operator_key().private_der.clone(),
            node_ip: None,
            node_account_id: None,
            mirror_network_ip: None,
        };
        ledger
            .dispatch("setup", serde_json::to_value(setup).unwrap())
            .unwrap();
        ledger
    }

    fn create(ledger: &MockLedger, key: &KeyMaterial, balance: i64) -> String {
        let params = CreateAccountParams {
            key: Some(key.public_der.clone()),
            initial_balance: Some(balance),
            ..Default::default()
        };
        let result = ledger
            .dispatch("createAccount", serde_json::to_value(params).unwrap())
            .unwrap();
        result["accountId"].as_str().unwrap().to_string()
    }

    fn hbar_transfer(lines: &[(&str, i64)], signers: &[&KeyMaterial]) -> Value {
        let params = TransferParams {
            transfers: lines
                .iter()
                .map(|(account, amount)| TransferEntry {
                    line: TransferLine::Hbar(HbarTransfer {
                        account_id: account.to_string(),
                        amount: *amount,
                    }),
                    approved: false,
                })
                .collect(),
            common_transaction_params: Some(CommonTransactionParams::signed_by(
                signers.iter().map(|k| k.private_der.clone()),
            )),
        };
        serde_json::to_value(params).unwrap()
    }

    #[test]
    fn test_requires_session() {
        let ledger = MockLedger::new();
        let err = ledger
            .dispatch("createAccount", json!({ "key": "302a" }))
            .unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn test_rejected_transfer_leaves_no_trace() {
        let ledger = ready();
        let rng = TestRng::with_seed(3);
        let key = KeyMaterial::generate(KeyScheme::Ed25519, &rng);
        let sender = create(&ledger, &key, 10);
        let receiver = create(&ledger, &key, 0);
        let version = ledger.version();

        let err = ledger
            .dispatch(
                "transferCrypto",
                hbar_transfer(&[(&sender, -100), (&receiver, 100)], &[&key]),
            )
            .unwrap_err();
        assert!(err.is_business(INSUFFICIENT_ACCOUNT_BALANCE));
        assert_eq!(ledger.version(), version);
        assert_eq!(ledger.hbar_balance(&sender), Some(10));
    }

    #[test]
    fn test_unsigned_debit_rejected() {
        let ledger = ready();
        let rng = TestRng::with_seed(4);
        let key = KeyMaterial::generate(KeyScheme::Ed25519, &rng);
        let sender = create(&ledger, &key, 10);
        let receiver = create(&ledger, &key, 0);

        let err = ledger
            .dispatch("transferCrypto", hbar_transfer(&[(&sender, -10), (&receiver, 10)], &[]))
            .unwrap_err();
        assert!(err.is_business(INVALID_SIGNATURE));
    }

    #[test]
    fn test_empty_id_is_internal() {
        let ledger = ready();
        let err = ledger
            .dispatch(
                "transferCrypto",
                hbar_transfer(&[("", -1), (OPERATOR_ACCOUNT_ID, 1)], &[]),
            )
            .unwrap_err();
        assert!(err.is_internal());
        assert_eq!(err.code(), INTERNAL_ERROR_CODE);
    }

    #[test]
    fn test_consensus_queries() {
        let ledger = ready();
        let rng = TestRng::with_seed(5);
        let key = KeyMaterial::generate(KeyScheme::Ed25519, &rng);
        let account = create(&ledger, &key, 25);

        let balance = ledger
            .dispatch(methods::GET_ACCOUNT_BALANCE, json!({ "accountId": account }))
            .unwrap();
        assert_eq!(balance["hbars"], "25");

        let err = ledger
            .dispatch(methods::GET_ACCOUNT_BALANCE, json!({ "accountId": "0.0.999999" }))
            .unwrap_err();
        assert!(err.is_business(INVALID_ACCOUNT_ID));
    }

    #[test]
    fn test_injected_failure_is_one_shot() {
        let ledger = ready();
        ledger.fail_next("createAccount", Failure::transport("connection reset"));
        let params = json!({ "key": ledger.operator_key().public_der });
        assert!(ledger.dispatch("createAccount", params.clone()).is_err());
        assert!(ledger.dispatch("createAccount", params).is_ok());
        assert_eq!(ledger.call_count("createAccount"), 2);
    }

    #[test]
    fn test_unknown_method() {
        let ledger = ready();
        let err = ledger.dispatch("mintMoney", json!({})).unwrap_err();
        assert_eq!(err.code(), METHOD_NOT_FOUND_CODE);
    }
}
