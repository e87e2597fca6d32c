//! Eventual read path: the mirror node REST API.

use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use log::trace;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::rpc::client::parse_endpoint;

use super::{
    parse_quantity, LedgerStateSource, NftRecord, PendingAirdrop, SourceKind, TokenRelationship,
};

/// REST prefix of the mirror API.
const API_PREFIX: &str = "api/v1/";

/// Upper bound on followed pages per listing.
const MAX_PAGES: usize = 100;

#[derive(Debug, Default, Deserialize)]
struct Links {
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccountBalance {
    balance: Value,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    balance: AccountBalance,
}

#[derive(Debug, Deserialize)]
struct TokenRelationshipEntry {
    token_id: String,
    balance: Value,
    #[serde(default)]
    freeze_status: Option<String>,
    #[serde(default)]
    kyc_status: Option<String>,
    #[serde(default)]
    automatic_association: bool,
}

#[derive(Debug, Deserialize)]
struct TokensPage {
    #[serde(default)]
    tokens: Vec<TokenRelationshipEntry>,
    #[serde(default)]
    links: Links,
}

#[derive(Debug, Deserialize)]
struct NftEntry {
    account_id: Option<String>,
    token_id: String,
    serial_number: Value,
    #[serde(default)]
    deleted: bool,
}

#[derive(Debug, Deserialize)]
struct NftsPage {
    #[serde(default)]
    nfts: Vec<NftEntry>,
    #[serde(default)]
    links: Links,
}

#[derive(Debug, Deserialize)]
struct AirdropEntry {
    sender_id: String,
    receiver_id: String,
    token_id: String,
    #[serde(default)]
    amount: Option<Value>,
    #[serde(default)]
    serial_number: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct AirdropsPage {
    #[serde(default)]
    airdrops: Vec<AirdropEntry>,
    #[serde(default)]
    links: Links,
}

trait Page: DeserializeOwned {
    type Item;
    fn split(self) -> (Vec<Self::Item>, Option<String>);
}

impl Page for TokensPage {
    type Item = TokenRelationshipEntry;
    fn split(self) -> (Vec<Self::Item>, Option<String>) {
        (self.tokens, self.links.next)
    }
}

impl Page for NftsPage {
    type Item = NftEntry;
    fn split(self) -> (Vec<Self::Item>, Option<String>) {
        (self.nfts, self.links.next)
    }
}

impl Page for AirdropsPage {
    type Item = AirdropEntry;
    fn split(self) -> (Vec<Self::Item>, Option<String>) {
        (self.airdrops, self.links.next)
    }
}

impl NftEntry {
    fn into_record(self) -> anyhow::Result<Option<NftRecord>> {
        if self.deleted {
            return Ok(None);
        }
        let Some(account_id) = self.account_id else {
            return Ok(None);
        };
        let serial = parse_quantity(&self.serial_number)?;
        Ok(Some(NftRecord {
            account_id,
            token_id: self.token_id,
            serial: u64::try_from(serial).context("negative NFT serial")?,
        }))
    }
}

impl AirdropEntry {
    fn into_pending(self) -> anyhow::Result<PendingAirdrop> {
        let amount = self
            .amount
            .as_ref()
            .filter(|v| !v.is_null())
            .map(parse_quantity)
            .transpose()?;
        let serial = self
            .serial_number
            .as_ref()
            .filter(|v| !v.is_null())
            .map(parse_quantity)
            .transpose()?
            .map(u64::try_from)
            .transpose()
            .context("negative airdrop serial")?;

        Ok(PendingAirdrop {
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            token_id: self.token_id,
            amount,
            serial,
        })
    }
}

/// [`LedgerStateSource`] backed by the mirror REST API.
pub struct MirrorSource {
    client: Client,
    api: Url,
}

impl MirrorSource {
    /// Client for the mirror at `address`.
    ///
    /// `address` may be the node root or already end in `/api/v1`.
    pub fn new(address: &str, request_timeout: Duration) -> anyhow::Result<Self> {
        let mut base = parse_endpoint(address)?;
        let path = base.path().trim_end_matches('/').to_string();
        let api_path = if path.ends_with("/api/v1") {
            format!("{}/", path)
        } else {
            format!("{}/{}", path, API_PREFIX)
        };
        base.set_path(&api_path);

        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self { client, api: base })
    }

    /// Resolved API root, always ending in `/api/v1/`.
    pub fn api_root(&self) -> &Url {
        &self.api
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> anyhow::Result<T> {
        trace!("mirror GET {}", url);
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("mirror request to {} failed", url))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(anyhow!("mirror has no record at {} (404)", url.path()));
        }
        if !status.is_success() {
            return Err(anyhow!(
                "mirror returned HTTP {} for {}",
                status.as_u16(),
                url.path()
            ));
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("invalid mirror payload from {}", url.path()))
    }

    async fn get_all<P: Page>(&self, path: &str) -> anyhow::Result<Vec<P::Item>> {
        let mut url = self.api.join(path)?;
        let mut items = Vec::new();

        for _ in 0..MAX_PAGES {
            let page: P = self.get_json(url.clone()).await?;
            let (mut batch, next) = page.split();
            items.append(&mut batch);

            match next.filter(|n| !n.is_empty()) {
                // `links.next` is an absolute path on the mirror host
                Some(next) => url = self.api.join(&next)?,
                None => return Ok(items),
            }
        }

        Err(anyhow!(
            "mirror listing {} still had a next link after {} pages",
            path,
            MAX_PAGES
        ))
    }
}

fn status_flag(value: Option<&str>, set: &str) -> bool {
    value.is_some_and(|s| s.eq_ignore_ascii_case(set))
}

#[async_trait]
impl LedgerStateSource for MirrorSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Mirror
    }

    async fn hbar_balance(&self, account_id: &str) -> anyhow::Result<i64> {
        let url = self.api.join(&format!("accounts/{}", account_id))?;
        let account: AccountResponse = self.get_json(url).await?;
        parse_quantity(&account.balance.balance)
    }

    async fn token_relationships(
        &self,
        account_id: &str,
    ) -> anyhow::Result<Vec<TokenRelationship>> {
        self.get_all::<TokensPage>(&format!("accounts/{}/tokens", account_id))
            .await?
            .into_iter()
            .map(|entry| {
                Ok(TokenRelationship {
                    balance: parse_quantity(&entry.balance)?,
                    frozen: status_flag(entry.freeze_status.as_deref(), "FROZEN"),
                    kyc_granted: status_flag(entry.kyc_status.as_deref(), "GRANTED"),
                    automatic_association: entry.automatic_association,
                    token_id: entry.token_id,
                })
            })
            .collect()
    }

    async fn account_nfts(&self, account_id: &str) -> anyhow::Result<Vec<NftRecord>> {
        let entries = self
            .get_all::<NftsPage>(&format!("accounts/{}/nfts", account_id))
            .await?;
        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            if let Some(record) = entry.into_record()? {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn nft_info(&self, token_id: &str, serial: u64) -> anyhow::Result<Vec<NftRecord>> {
        let url = self.api.join(&format!("tokens/{}/nfts/{}", token_id, serial))?;
        let entry: NftEntry = self.get_json(url).await?;
        Ok(entry.into_record()?.into_iter().collect())
    }

    async fn outstanding_airdrops(&self, account_id: &str) -> anyhow::Result<Vec<PendingAirdrop>> {
        self.get_all::<AirdropsPage>(&format!("accounts/{}/airdrops/outstanding", account_id))
            .await?
            .into_iter()
            .map(AirdropEntry::into_pending)
            .collect()
    }

    async fn pending_airdrops(&self, account_id: &str) -> anyhow::Result<Vec<PendingAirdrop>> {
        self.get_all::<AirdropsPage>(&format!("accounts/{}/airdrops/pending", account_id))
            .await?
            .into_iter()
            .map(AirdropEntry::into_pending)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_api_root_normalized() {
        let timeout = Duration::from_secs(1);
        let plain = MirrorSource::new("localhost:5551", timeout).unwrap();
        assert_eq!(plain.api_root().as_str(), "http://localhost:5551/api/v1/");

        let prefixed = MirrorSource::new("http://localhost:5551/api/v1", timeout).unwrap();
        assert_eq!(prefixed.api_root().as_str(), "http://localhost:5551/api/v1/");
    }

    #[test]
    fn test_deleted_nft_is_skipped() {
        let entry: NftEntry = serde_json::from_value(json!({
            "account_id": "0.0.5",
            "token_id": "0.0.9",
            "serial_number": 1,
            "deleted": true
        }))
        .unwrap();
        assert!(entry.into_record().unwrap().is_none());
    }

    #[test]
    fn test_airdrop_entry_fungible() {
        let entry: AirdropEntry = serde_json::from_value(json!({
            "sender_id": "0.0.5",
            "receiver_id": "0.0.6",
            "token_id": "0.0.9",
            "amount": 25,
            "serial_number": null
        }))
        .unwrap();
        let pending = entry.into_pending().unwrap();
        assert_eq!(pending.amount, Some(25));
        assert_eq!(pending.serial, None);
    }
}
