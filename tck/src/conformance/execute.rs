//! Scenario execution against a live suite context

use std::collections::BTreeMap;

use log::{debug, info};

use super::*;
use crate::error::{Result, TckError};
use crate::fixtures::{AccountOptions, Fixtures, KeyMaterial, TestAccount, TestToken, TokenOptions};
use crate::identity::{is_entity_id, EMPTY_ID, NONEXISTENT_ACCOUNT_ID, NONEXISTENT_TOKEN_ID};
use crate::rpc::request::{
    AirdropParams, CommonTransactionParams, CustomFee, CustomFeeKind, DeleteAccountParams,
    FixedFee, FractionalFee, HbarTransfer, NftTransfer, TokenTransfer, TransferEntry,
    TransferLine, TransferParams,
};
use crate::rpc::{OperationRequest, TransferBuilder};
use crate::suite::SuiteContext;
use crate::verifier::Expectation;

/// Named entities of one running scenario.
struct Scope {
    operator: TestAccount,
    accounts: BTreeMap<String, TestAccount>,
    tokens: BTreeMap<String, TestToken>,
}

impl Scope {
    fn account_id(&self, name: &str) -> Result<String> {
        Ok(match name {
            OPERATOR_REF => self.operator.account_id.clone(),
            EMPTY_REF => EMPTY_ID.to_string(),
            NONEXISTENT_REF => NONEXISTENT_ACCOUNT_ID.to_string(),
            literal if is_entity_id(literal) => literal.to_string(),
            declared => self.account(declared)?.account_id.clone(),
        })
    }

    fn token_id(&self, name: &str) -> Result<String> {
        Ok(match name {
            EMPTY_REF => EMPTY_ID.to_string(),
            NONEXISTENT_REF => NONEXISTENT_TOKEN_ID.to_string(),
            literal if is_entity_id(literal) => literal.to_string(),
            declared => self.token(declared)?.token_id.clone(),
        })
    }

    fn account(&self, name: &str) -> Result<&TestAccount> {
        if name == OPERATOR_REF {
            return Ok(&self.operator);
        }
        self.accounts
            .get(name)
            .ok_or_else(|| TckError::Scenario(format!("unknown account '{}'", name)))
    }

    fn token(&self, name: &str) -> Result<&TestToken> {
        self.tokens
            .get(name)
            .ok_or_else(|| TckError::Scenario(format!("unknown token '{}'", name)))
    }

    fn signers(&self, names: &[String]) -> Result<Option<CommonTransactionParams>> {
        if names.is_empty() {
            return Ok(None);
        }
        let keys = names
            .iter()
            .map(|name| Ok(self.account(name)?.key.private_der.clone()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(CommonTransactionParams::signed_by(keys)))
    }

    fn entries(&self, lines: &[TransferLineSpec]) -> Result<Vec<TransferEntry>> {
        lines
            .iter()
            .map(|line| {
                Ok(match line {
                    TransferLineSpec::Hbar {
                        account,
                        amount,
                        approved,
                    } => TransferEntry {
                        line: TransferLine::Hbar(HbarTransfer {
                            account_id: self.account_id(account)?,
                            amount: *amount,
                        }),
                        approved: *approved,
                    },
                    TransferLineSpec::Token {
                        account,
                        token,
                        amount,
                        decimals,
                        approved,
                    } => TransferEntry {
                        line: TransferLine::Token(TokenTransfer {
                            account_id: self.account_id(account)?,
                            token_id: self.token_id(token)?,
                            amount: *amount,
                            decimals: *decimals,
                        }),
                        approved: *approved,
                    },
                    TransferLineSpec::Nft {
                        from,
                        to,
                        token,
                        serial,
                        approved,
                    } => TransferEntry {
                        line: TransferLine::Nft(NftTransfer {
                            sender_account_id: self.account_id(from)?,
                            receiver_account_id: self.account_id(to)?,
                            token_id: self.token_id(token)?,
                            serial_number: *serial,
                        }),
                        approved: *approved,
                    },
                })
            })
            .collect()
    }

    fn fee(&self, fee: &FeeSpec) -> Result<CustomFee> {
        Ok(match fee {
            FeeSpec::Fixed {
                collector,
                amount,
                token,
            } => CustomFee {
                fee_collector_account_id: self.account_id(collector)?,
                fee_collectors_exempt: false,
                kind: CustomFeeKind::FixedFee(FixedFee {
                    amount: *amount,
                    denominating_token_id: token.as_deref().map(|t| self.token_id(t)).transpose()?,
                }),
            },
            FeeSpec::Fractional {
                collector,
                numerator,
                denominator,
                minimum,
                maximum,
                assessment,
            } => CustomFee {
                fee_collector_account_id: self.account_id(collector)?,
                fee_collectors_exempt: false,
                kind: CustomFeeKind::FractionalFee(FractionalFee {
                    numerator: *numerator,
                    denominator: *denominator,
                    minimum_amount: *minimum,
                    maximum_amount: *maximum,
                    assessment_method: *assessment,
                }),
            },
        })
    }

    fn expectation(
        &self,
        cond: &Postcondition,
        baselines: &BTreeMap<String, i64>,
    ) -> Result<Expectation> {
        Ok(match cond {
            Postcondition::Hbar { account, balance } => {
                Expectation::hbar(self.account_id(account)?, *balance)
            }
            Postcondition::HbarDelta { account, delta } => {
                let account_id = self.account_id(account)?;
                let baseline = baselines.get(&account_id).copied().ok_or_else(|| {
                    TckError::Scenario(format!("no baseline captured for {}", account_id))
                })?;
                Expectation::hbar(account_id, baseline + delta)
            }
            Postcondition::Token {
                account,
                token,
                balance,
            } => Expectation::token(self.account_id(account)?, self.token_id(token)?, *balance),
            Postcondition::Nft {
                account,
                token,
                serial,
                held,
            } => Expectation::nft(self.account_id(account)?, self.token_id(token)?, *serial, *held),
            Postcondition::PendingAirdrop {
                sender,
                receiver,
                token,
                amount,
                serial,
                present,
            } => Expectation::PendingAirdrop {
                sender: self.account_id(sender)?,
                receiver: self.account_id(receiver)?,
                token_id: self.token_id(token)?,
                amount: *amount,
                serial: *serial,
                present: *present,
            },
        })
    }
}

fn operator_account(fixtures: &Fixtures) -> Result<TestAccount> {
    let operator = fixtures.operator();
    let key = KeyMaterial::from_private_der(&operator.private_key)
        .map_err(|e| TckError::Config(format!("operator private key: {}", e)))?;
    Ok(TestAccount {
        account_id: operator.account_id.clone(),
        key,
    })
}

async fn create_accounts(
    fixtures: &Fixtures,
    spec: &ConformanceSpec,
    scope: &mut Scope,
) -> Result<()> {
    for (name, account) in &spec.accounts {
        let key = fixtures.generate_key(account.key);
        let mut options = AccountOptions::funded(account.balance);
        options.max_auto_token_associations = account.auto_associations;
        options.evm_alias = account.evm_alias;
        options.receiver_signature_required = account.receiver_signature_required;

        let created = fixtures.create_account(key, options).await?;
        debug!("{} is {}", name, created.account_id);
        scope.accounts.insert(name.clone(), created);
    }
    Ok(())
}

async fn create_tokens(
    fixtures: &Fixtures,
    spec: &ConformanceSpec,
    scope: &mut Scope,
) -> Result<()> {
    for (name, token) in &spec.tokens {
        let mut options = match token.kind {
            TokenKind::Ft => {
                let mut options = TokenOptions::fungible(token.initial_supply);
                options.decimals = token.decimals;
                options
            }
            TokenKind::Nft => TokenOptions::non_fungible(),
        };
        options.freezable = token.freezable;
        options.kyc = token.kyc;
        options.pausable = token.pausable;
        options.fee_schedule = !token.fees.is_empty();

        let treasury = scope.account(&token.treasury)?.clone();
        let created = fixtures.create_token(&treasury, options).await?;
        if token.kind == TokenKind::Nft && token.mint > 0 {
            fixtures.mint_nfts(&created, token.mint).await?;
        }
        debug!("{} is {}", name, created.token_id);
        scope.tokens.insert(name.clone(), created);
    }
    Ok(())
}

/// Fees are installed last so collectors can be associated first.
async fn install_fees(fixtures: &Fixtures, spec: &ConformanceSpec, scope: &Scope) -> Result<()> {
    for (name, token) in spec.tokens.iter().filter(|(_, t)| !t.fees.is_empty()) {
        let fees = token
            .fees
            .iter()
            .map(|fee| scope.fee(fee))
            .collect::<Result<Vec<_>>>()?;
        fixtures.update_fee_schedule(scope.token(name)?, fees).await?;
    }
    Ok(())
}

async fn run_precondition(fixtures: &Fixtures, scope: &Scope, step: &Precondition) -> Result<()> {
    match step {
        Precondition::Associate { account, tokens } => {
            let tokens = tokens
                .iter()
                .map(|t| scope.token(t))
                .collect::<Result<Vec<_>>>()?;
            fixtures.associate(scope.account(account)?, &tokens).await
        }
        Precondition::TransferToken {
            token,
            from,
            to,
            amount,
        } => {
            let sender = scope.account(from)?;
            let token_id = scope.token_id(token)?;
            let params = TransferBuilder::new()
                .token(&sender.account_id, &token_id, -amount)
                .token(scope.account_id(to)?, &token_id, *amount)
                .signed_by(&sender.key)
                .build();
            fixtures
                .require(OperationRequest::TransferCrypto(params))
                .await
                .map(|_| ())
        }
        Precondition::TransferNft {
            token,
            serial,
            from,
            to,
        } => {
            let sender = scope.account(from)?;
            let params = TransferBuilder::new()
                .nft(&sender.account_id, scope.account_id(to)?, scope.token_id(token)?, *serial)
                .signed_by(&sender.key)
                .build();
            fixtures
                .require(OperationRequest::TransferCrypto(params))
                .await
                .map(|_| ())
        }
        Precondition::Freeze { token, account } => {
            fixtures.freeze(scope.token(token)?, scope.account(account)?).await
        }
        Precondition::GrantKyc { token, account } => {
            fixtures.grant_kyc(scope.token(token)?, scope.account(account)?).await
        }
        Precondition::Pause { token } => fixtures.pause(scope.token(token)?).await,
        Precondition::ApproveHbar {
            owner,
            spender,
            amount,
        } => {
            fixtures
                .approve_hbar_allowance(scope.account(owner)?, &scope.account_id(spender)?, *amount)
                .await
        }
        Precondition::ApproveToken {
            owner,
            spender,
            token,
            amount,
        } => {
            fixtures
                .approve_token_allowance(
                    scope.account(owner)?,
                    &scope.account_id(spender)?,
                    &scope.token_id(token)?,
                    *amount,
                )
                .await
        }
        Precondition::ApproveNft {
            owner,
            spender,
            token,
            serials,
        } => {
            fixtures
                .approve_nft_allowance(
                    scope.account(owner)?,
                    &scope.account_id(spender)?,
                    &scope.token_id(token)?,
                    serials,
                )
                .await
        }
        Precondition::SetAutoAssociations { account, slots } => {
            fixtures.set_auto_associations(scope.account(account)?, *slots).await
        }
        Precondition::DeleteAccount {
            account,
            beneficiary,
        } => {
            let beneficiary = beneficiary.as_deref().map(|b| scope.account_id(b)).transpose()?;
            fixtures
                .delete_account(scope.account(account)?, beneficiary.as_deref())
                .await
        }
    }
}

fn build_action(scope: &Scope, action: &Action) -> Result<OperationRequest> {
    Ok(match action {
        Action::Transfer { transfers, signers } => OperationRequest::TransferCrypto(TransferParams {
            transfers: scope.entries(transfers)?,
            common_transaction_params: scope.signers(signers)?,
        }),
        Action::Airdrop { transfers, signers } => OperationRequest::AirdropToken(AirdropParams {
            token_transfers: scope.entries(transfers)?,
            common_transaction_params: scope.signers(signers)?,
        }),
        Action::DeleteAccount {
            account,
            beneficiary,
            signers,
        } => OperationRequest::DeleteAccount(DeleteAccountParams {
            delete_account_id: scope.account_id(account)?,
            transfer_account_id: scope.account_id(beneficiary)?,
            common_transaction_params: scope.signers(signers)?,
        }),
        Action::Raw { method, params } => OperationRequest::from_call(method, params.clone())
            .map_err(|e| TckError::Scenario(format!("raw {} parameters: {}", method, e)))?,
    })
}

/// Run one scenario with `fixtures`: set up, act, assert the outcome and
/// verify every postcondition on both sources.
pub async fn execute_spec(
    ctx: &SuiteContext,
    fixtures: Fixtures,
    spec: &ConformanceSpec,
) -> Result<()> {
    let mut scope = Scope {
        operator: operator_account(&fixtures)?,
        accounts: BTreeMap::new(),
        tokens: BTreeMap::new(),
    };

    create_accounts(&fixtures, spec, &mut scope).await?;
    create_tokens(&fixtures, spec, &mut scope).await?;
    for step in &spec.preconditions {
        run_precondition(&fixtures, &scope, step).await?;
    }
    install_fees(&fixtures, spec, &scope).await?;

    let mut baselines = BTreeMap::new();
    for cond in &spec.postconditions {
        if let Postcondition::HbarDelta { account, .. } = cond {
            let account_id = scope.account_id(account)?;
            let balance = ctx.verifier().strong_hbar_balance(&account_id).await?;
            baselines.insert(account_id, balance);
        }
    }

    let request = build_action(&scope, &spec.action)?;
    let operation = request.method_name().to_string();
    info!("{}: submitting {}", spec.spec.name, operation);
    let outcome = fixtures.client().submit(&request).await;
    assert_outcome(&operation, &outcome, &spec.expected)?;

    if outcome.is_success() {
        if let OperationRequest::DeleteAccount(params) = &request {
            fixtures.untrack(&params.delete_account_id);
        }
    }

    let expectations = spec
        .postconditions
        .iter()
        .map(|cond| scope.expectation(cond, &baselines))
        .collect::<Result<Vec<_>>>()?;
    ctx.verifier().verify_all(&expectations).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::KeyScheme;
    use crate::orchestrator::TestRng;
    use crate::rpc::request::TokenType;

    fn scope() -> Scope {
        let rng = TestRng::with_seed(7);
        let account = |id: &str| TestAccount {
            account_id: id.to_string(),
            key: KeyMaterial::generate(KeyScheme::Ed25519, &rng),
        };
        let mut accounts = BTreeMap::new();
        accounts.insert("alice".to_string(), account("0.0.1001"));
        Scope {
            operator: account("0.0.2"),
            accounts,
            tokens: BTreeMap::new(),
        }
    }

    #[test]
    fn test_placeholders_resolve() {
        let scope = scope();
        assert_eq!(scope.account_id("$operator").unwrap(), "0.0.2");
        assert_eq!(scope.account_id("$empty").unwrap(), "");
        assert_eq!(scope.account_id("$nonexistent").unwrap(), NONEXISTENT_ACCOUNT_ID);
        assert_eq!(scope.account_id("0.0.98").unwrap(), "0.0.98");
        assert_eq!(scope.account_id("alice").unwrap(), "0.0.1001");
        assert!(matches!(scope.account_id("bob"), Err(TckError::Scenario(_))));
        assert_eq!(scope.token_id("$nonexistent").unwrap(), NONEXISTENT_TOKEN_ID);
    }

    #[test]
    fn test_action_uses_signer_keys() {
        let scope = scope();
        let action = Action::Transfer {
            transfers: vec![
                TransferLineSpec::Hbar {
                    account: "alice".to_string(),
                    amount: -5,
                    approved: false,
                },
                TransferLineSpec::Hbar {
                    account: "$operator".to_string(),
                    amount: 5,
                    approved: false,
                },
            ],
            signers: vec!["alice".to_string()],
        };
        match build_action(&scope, &action).unwrap() {
            OperationRequest::TransferCrypto(params) => {
                assert!(params.is_balanced());
                assert_eq!(params.signers(), [scope.accounts["alice"].key.private_der.clone()]);
            }
            other => panic!("unexpected request {:?}", other),
        }
    }

    #[test]
    fn test_delta_needs_baseline() {
        let scope = scope();
        let cond = Postcondition::HbarDelta {
            account: "alice".to_string(),
            delta: 5,
        };
        assert!(scope.expectation(&cond, &BTreeMap::new()).is_err());

        let mut baselines = BTreeMap::new();
        baselines.insert("0.0.1001".to_string(), 20);
        assert_eq!(
            scope.expectation(&cond, &baselines).unwrap(),
            Expectation::hbar("0.0.1001", 25)
        );
    }

    #[test]
    fn test_token_type_mapping() {
        assert_eq!(TokenOptions::non_fungible().token_type, TokenType::NonFungible);
    }
}
