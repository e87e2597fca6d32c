//! Scenario parsing and validation

use super::*;
use crate::identity::is_entity_id;
use anyhow::{Context, Result};
use std::path::Path;
use walkdir::WalkDir;

/// Reference to the suite operator
pub const OPERATOR_REF: &str = "$operator";
/// Reference to the structurally invalid id
pub const EMPTY_REF: &str = "$empty";
/// Reference to a well-formed id that does not exist
pub const NONEXISTENT_REF: &str = "$nonexistent";

/// Load a scenario from a YAML file
pub fn load_spec(path: &Path) -> Result<ConformanceSpec> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read spec file: {}", path.display()))?;

    parse_spec(&content).with_context(|| format!("Invalid spec file: {}", path.display()))
}

/// Parse and validate a scenario from YAML text
///
/// Enum-valued entries are written as single-key maps (`- hbar: {...}`), not
/// YAML tags.
pub fn parse_spec(content: &str) -> Result<ConformanceSpec> {
    let spec: ConformanceSpec = serde_yaml::with::singleton_map_recursive::deserialize(
        serde_yaml::Deserializer::from_str(content),
    )
    .context("Failed to parse spec")?;
    validate_spec(&spec)?;
    Ok(spec)
}

/// Validate a scenario for correctness
pub fn validate_spec(spec: &ConformanceSpec) -> Result<()> {
    if spec.spec.name.is_empty() {
        anyhow::bail!("Spec name cannot be empty");
    }

    for name in spec.accounts.keys().chain(spec.tokens.keys()) {
        if name.starts_with('$') || is_entity_id(name) {
            anyhow::bail!("'{}' is reserved and cannot name an account or token", name);
        }
    }
    if let Some(name) = spec.accounts.keys().find(|n| spec.tokens.contains_key(*n)) {
        anyhow::bail!("'{}' names both an account and a token", name);
    }

    for (name, token) in &spec.tokens {
        check_account(spec, &token.treasury)
            .with_context(|| format!("treasury of token '{}'", name))?;
        match token.kind {
            TokenKind::Ft if token.mint > 0 => {
                anyhow::bail!("fungible token '{}' cannot mint serials", name)
            }
            TokenKind::Nft if token.initial_supply > 0 || token.decimals > 0 => {
                anyhow::bail!("non-fungible token '{}' has no supply or decimals", name)
            }
            _ => {}
        }
        for fee in &token.fees {
            match fee {
                FeeSpec::Fixed {
                    collector, token, ..
                } => {
                    check_account(spec, collector)?;
                    if let Some(token) = token {
                        check_token(spec, token)?;
                    }
                }
                FeeSpec::Fractional {
                    collector,
                    denominator,
                    ..
                } => {
                    check_account(spec, collector)?;
                    if *denominator == 0 {
                        anyhow::bail!("fractional fee of '{}' has a zero denominator", name);
                    }
                }
            }
        }
    }

    for (i, step) in spec.preconditions.iter().enumerate() {
        check_precondition(spec, step).with_context(|| format!("precondition {}", i))?;
    }

    check_action(spec, &spec.action).context("action")?;

    match (spec.expected.status, &spec.expected.error) {
        (ExpectedStatus::Business, None) => {
            anyhow::bail!("business outcomes must name the expected error status")
        }
        (ExpectedStatus::Success, Some(_)) | (ExpectedStatus::Internal, Some(_)) => {
            anyhow::bail!("only business outcomes carry an error status")
        }
        _ => {}
    }
    if spec.expected.code.is_some() && spec.expected.status != ExpectedStatus::Internal {
        anyhow::bail!("only internal outcomes carry an error code");
    }

    if !spec.postconditions.is_empty() && spec.expected.status != ExpectedStatus::Success {
        anyhow::bail!("postconditions require a successful action");
    }
    for (i, cond) in spec.postconditions.iter().enumerate() {
        check_postcondition(spec, cond).with_context(|| format!("postcondition {}", i))?;
    }

    Ok(())
}

fn is_placeholder(name: &str) -> bool {
    name == EMPTY_REF || name == NONEXISTENT_REF || is_entity_id(name)
}

fn check_account(spec: &ConformanceSpec, name: &str) -> Result<()> {
    if name == OPERATOR_REF || is_placeholder(name) || spec.accounts.contains_key(name) {
        Ok(())
    } else {
        anyhow::bail!("unknown account '{}'", name)
    }
}

fn check_token(spec: &ConformanceSpec, name: &str) -> Result<()> {
    if is_placeholder(name) || spec.tokens.contains_key(name) {
        Ok(())
    } else {
        anyhow::bail!("unknown token '{}'", name)
    }
}

/// Signers must be accounts whose keys the harness holds.
fn check_signer(spec: &ConformanceSpec, name: &str) -> Result<()> {
    if name == OPERATOR_REF || spec.accounts.contains_key(name) {
        Ok(())
    } else {
        anyhow::bail!("signer '{}' is not a declared account", name)
    }
}

fn check_precondition(spec: &ConformanceSpec, step: &Precondition) -> Result<()> {
    match step {
        Precondition::Associate { account, tokens } => {
            check_signer(spec, account)?;
            tokens.iter().try_for_each(|t| check_token(spec, t))
        }
        Precondition::TransferToken {
            token, from, to, ..
        }
        | Precondition::TransferNft {
            token, from, to, ..
        } => {
            check_token(spec, token)?;
            check_signer(spec, from)?;
            check_account(spec, to)
        }
        Precondition::Freeze { token, account } | Precondition::GrantKyc { token, account } => {
            check_token(spec, token)?;
            check_account(spec, account)
        }
        Precondition::Pause { token } => check_token(spec, token),
        Precondition::ApproveHbar { owner, spender, .. } => {
            check_signer(spec, owner)?;
            check_account(spec, spender)
        }
        Precondition::ApproveToken {
            owner,
            spender,
            token,
            ..
        }
        | Precondition::ApproveNft {
            owner,
            spender,
            token,
            ..
        } => {
            check_signer(spec, owner)?;
            check_account(spec, spender)?;
            check_token(spec, token)
        }
        Precondition::SetAutoAssociations { account, .. } => check_signer(spec, account),
        Precondition::DeleteAccount {
            account,
            beneficiary,
        } => {
            if !spec.accounts.contains_key(account) {
                anyhow::bail!("only declared accounts can be deleted, not '{}'", account);
            }
            beneficiary
                .as_deref()
                .map_or(Ok(()), |b| check_account(spec, b))
        }
    }
}

fn check_lines(spec: &ConformanceSpec, lines: &[TransferLineSpec]) -> Result<()> {
    if lines.is_empty() {
        anyhow::bail!("transfer has no lines");
    }
    for line in lines {
        match line {
            TransferLineSpec::Hbar { account, .. } => check_account(spec, account)?,
            TransferLineSpec::Token { account, token, .. } => {
                check_account(spec, account)?;
                check_token(spec, token)?;
            }
            TransferLineSpec::Nft {
                from, to, token, ..
            } => {
                check_account(spec, from)?;
                check_account(spec, to)?;
                check_token(spec, token)?;
            }
        }
    }
    Ok(())
}

fn check_action(spec: &ConformanceSpec, action: &Action) -> Result<()> {
    match action {
        Action::Transfer { transfers, signers } | Action::Airdrop { transfers, signers } => {
            check_lines(spec, transfers)?;
            signers.iter().try_for_each(|s| check_signer(spec, s))
        }
        Action::DeleteAccount {
            account,
            beneficiary,
            signers,
        } => {
            check_account(spec, account)?;
            check_account(spec, beneficiary)?;
            signers.iter().try_for_each(|s| check_signer(spec, s))
        }
        Action::Raw { method, .. } => {
            if method.is_empty() {
                anyhow::bail!("raw action needs a method name");
            }
            Ok(())
        }
    }
}

fn check_postcondition(spec: &ConformanceSpec, cond: &Postcondition) -> Result<()> {
    match cond {
        Postcondition::Hbar { account, .. } | Postcondition::HbarDelta { account, .. } => {
            check_account(spec, account)
        }
        Postcondition::Token { account, token, .. } | Postcondition::Nft { account, token, .. } => {
            check_account(spec, account)?;
            check_token(spec, token)
        }
        Postcondition::PendingAirdrop {
            sender,
            receiver,
            token,
            ..
        } => {
            check_account(spec, sender)?;
            check_account(spec, receiver)?;
            check_token(spec, token)
        }
    }
}

/// Load all scenarios under a directory, recursively, in path order
pub fn load_specs_from_dir(dir: &Path) -> Result<Vec<ConformanceSpec>> {
    if !dir.is_dir() {
        anyhow::bail!("Not a directory: {}", dir.display());
    }

    let mut specs = Vec::new();
    let mut broken = Vec::new();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
        let path = entry.path();
        if !entry.file_type().is_file()
            || !path
                .extension()
                .is_some_and(|ext| ext == "yaml" || ext == "yml")
        {
            continue;
        }
        match load_spec(path) {
            Ok(spec) => specs.push(spec),
            Err(e) => {
                log::warn!("Failed to load spec {}: {:#}", path.display(), e);
                broken.push(path.display().to_string());
            }
        }
    }

    if !broken.is_empty() {
        anyhow::bail!("{} invalid spec file(s): {}", broken.len(), broken.join(", "));
    }

    let mut names = std::collections::HashSet::new();
    for spec in &specs {
        if !names.insert(spec.spec.name.as_str()) {
            anyhow::bail!("Duplicate spec name: {}", spec.spec.name);
        }
    }

    Ok(specs)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HBAR_TRANSFER: &str = r#"
spec:
  name: hbar_between_fresh_accounts
  category: transfer_crypto
accounts:
  sender: { balance: 100 }
  receiver: {}
action:
  type: transfer
  transfers:
    - hbar: { account: sender, amount: -10 }
    - hbar: { account: receiver, amount: 10 }
  signers: [sender]
postconditions:
  - hbar: { account: sender, balance: 90 }
  - hbar: { account: receiver, balance: 10 }
"#;

    #[test]
    fn test_parse_valid_spec() {
        let spec = parse_spec(HBAR_TRANSFER).unwrap();
        assert_eq!(spec.spec.name, "hbar_between_fresh_accounts");
        assert_eq!(spec.spec.category, Category::TransferCrypto);
        assert_eq!(spec.spec.version, TCK_VERSION);
        assert_eq!(spec.accounts["sender"].balance, 100);
        assert_eq!(spec.accounts["receiver"].key, KeyScheme::Ed25519);
        assert_eq!(spec.expected.status, ExpectedStatus::Success);
        assert_eq!(spec.postconditions.len(), 2);
    }

    #[test]
    fn test_unknown_account_rejected() {
        let yaml =
            HBAR_TRANSFER.replace("account: receiver, amount: 10", "account: nobody, amount: 10");
        let err = parse_spec(&yaml).unwrap_err();
        assert!(format!("{:#}", err).contains("unknown account 'nobody'"));
    }

    #[test]
    fn test_placeholders_accepted() {
        let yaml = HBAR_TRANSFER
            .replace("account: receiver, amount: 10", "account: $nonexistent, amount: 10")
            .replace(
                "postconditions:\n  \
                 - hbar: { account: sender, balance: 90 }\n  \
                 - hbar: { account: receiver, balance: 10 }\n",
                "expected:\n  status: business\n  error: INVALID_ACCOUNT_ID\n",
            );
        let spec = parse_spec(&yaml).unwrap();
        assert_eq!(spec.expected.error.as_deref(), Some("INVALID_ACCOUNT_ID"));
    }

    #[test]
    fn test_business_outcome_needs_status() {
        let yaml = HBAR_TRANSFER.replace(
            "postconditions:",
            "expected:\n  status: business\npostconditions:",
        );
        assert!(parse_spec(&yaml).is_err());
    }

    #[test]
    fn test_postconditions_need_success() {
        let yaml = HBAR_TRANSFER.replace(
            "postconditions:",
            "expected:\n  status: internal\npostconditions:",
        );
        let err = parse_spec(&yaml).unwrap_err();
        assert!(format!("{:#}", err).contains("postconditions require"));
    }

    #[test]
    fn test_signer_must_be_declared() {
        let yaml = HBAR_TRANSFER.replace("signers: [sender]", "signers: [$nonexistent]");
        assert!(parse_spec(&yaml).is_err());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = HBAR_TRANSFER.replace("accounts:", "acounts:");
        assert!(parse_spec(&yaml).is_err());
    }

    #[test]
    fn test_reserved_names_rejected() {
        let yaml = HBAR_TRANSFER.replace("receiver: {}", "$operator: {}");
        assert!(parse_spec(&yaml).is_err());
    }

    #[test]
    fn test_token_spec_parses() {
        let yaml = r#"
spec:
  name: nft_move
  category: nft_transfer
accounts:
  treasury: { balance: 50 }
  holder: { auto_associations: -1 }
tokens:
  art: { type: nft, treasury: treasury, mint: 2 }
action:
  type: transfer
  transfers:
    - nft: { from: treasury, to: holder, token: art, serial: 1 }
  signers: [treasury]
postconditions:
  - nft: { account: holder, token: art, serial: 1 }
  - nft: { account: treasury, token: art, serial: 1, held: false }
"#;
        let spec = parse_spec(yaml).unwrap();
        assert_eq!(spec.tokens["art"].kind, TokenKind::Nft);
        assert_eq!(spec.accounts["holder"].auto_associations, Some(-1));
        match &spec.postconditions[1] {
            Postcondition::Nft { held, .. } => assert!(!held),
            other => panic!("unexpected postcondition {:?}", other),
        }
    }

    #[test]
    fn test_preconditions_and_fees_parse() {
        let yaml = r#"
spec:
  name: fee_after_association
  category: token_transfer
accounts:
  treasury: { balance: 50 }
  holder: { balance: 20 }
  collector: {}
tokens:
  gold:
    treasury: treasury
    initial_supply: 1000
    fees:
      - fixed: { collector: collector, amount: 5 }
      - fractional: { collector: collector, numerator: 1, denominator: 10, assessment: exclusive }
preconditions:
  - associate: { account: holder, tokens: [gold] }
  - transfer_token: { token: gold, from: treasury, to: holder, amount: 100 }
action:
  type: transfer
  transfers:
    - token: { account: holder, token: gold, amount: -10 }
    - token: { account: treasury, token: gold, amount: 10 }
  signers: [holder]
postconditions:
  - hbar_delta: { account: collector, delta: 5 }
  - token: { account: holder, token: gold, balance: 90 }
"#;
        let spec = parse_spec(yaml).unwrap();
        assert_eq!(spec.tokens["gold"].fees.len(), 2);
        assert!(matches!(
            spec.tokens["gold"].fees[1],
            FeeSpec::Fractional {
                assessment: AssessmentMethod::Exclusive,
                ..
            }
        ));
        assert!(matches!(spec.preconditions[0], Precondition::Associate { .. }));
        assert!(matches!(
            spec.preconditions[1],
            Precondition::TransferToken { amount: 100, .. }
        ));
        assert!(matches!(
            spec.postconditions[0],
            Postcondition::HbarDelta { delta: 5, .. }
        ));
    }

    #[test]
    fn test_load_shipped_specs() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("specs");
        let specs = load_specs_from_dir(&dir).unwrap();
        assert_eq!(specs.len(), 44);
        for category in [
            Category::TransferCrypto,
            Category::TokenTransfer,
            Category::NftTransfer,
            Category::ApprovedTransfer,
            Category::Airdrop,
            Category::AccountLifecycle,
        ] {
            assert!(specs.iter().any(|s| s.spec.category == category));
        }
    }
}
