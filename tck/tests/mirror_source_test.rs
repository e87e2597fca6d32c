//! Mirror REST client against a loopback HTTP stub.

mod common;

use std::time::Duration;

use serde_json::json;

use common::StubServer;
use ledger_tck::sources::{LedgerStateSource, MirrorSource, SourceKind};

fn mirror(server: &StubServer) -> MirrorSource {
    MirrorSource::new(&server.url(), Duration::from_secs(2)).unwrap()
}

fn not_found() -> (u16, String) {
    (404, json!({ "_status": { "messages": [{ "message": "Not found" }] } }).to_string())
}

#[tokio::test]
async fn test_account_balance() {
    let server = StubServer::start(|req| match req.path.as_str() {
        "/api/v1/accounts/0.0.1001" => (
            200,
            json!({ "account": "0.0.1001", "balance": { "balance": 1250, "timestamp": "1.0" } })
                .to_string(),
        ),
        _ => not_found(),
    })
    .await;
    let source = mirror(&server);

    assert_eq!(source.kind(), SourceKind::Mirror);
    assert_eq!(source.hbar_balance("0.0.1001").await.unwrap(), 1250);
    assert_eq!(server.requests()[0].method, "GET");
}

#[tokio::test]
async fn test_unknown_account_is_error() {
    let server = StubServer::start(|_| not_found()).await;
    let err = mirror(&server).hbar_balance("0.0.9999").await.unwrap_err();
    assert!(err.to_string().contains("404"));
}

#[tokio::test]
async fn test_token_listing_follows_next_links() {
    let server = StubServer::start(|req| {
        if req.path == "/api/v1/accounts/0.0.1001/tokens" {
            (
                200,
                json!({
                    "tokens": [{
                        "token_id": "0.0.50",
                        "balance": 10,
                        "freeze_status": "UNFROZEN",
                        "kyc_status": "NOT_APPLICABLE",
                        "automatic_association": false
                    }],
                    "links": {
                        "next": "/api/v1/accounts/0.0.1001/tokens?limit=1&token.id=gt:0.0.50"
                    }
                })
                .to_string(),
            )
        } else if req.path.starts_with("/api/v1/accounts/0.0.1001/tokens?") {
            (
                200,
                json!({
                    "tokens": [{
                        "token_id": "0.0.51",
                        "balance": 3,
                        "freeze_status": "FROZEN",
                        "kyc_status": "GRANTED",
                        "automatic_association": true
                    }],
                    "links": { "next": null }
                })
                .to_string(),
            )
        } else {
            not_found()
        }
    })
    .await;

    let relationships = mirror(&server).token_relationships("0.0.1001").await.unwrap();
    assert_eq!(relationships.len(), 2);
    assert_eq!(relationships[0].token_id, "0.0.50");
    assert_eq!(relationships[0].balance, 10);
    assert!(!relationships[0].frozen);
    assert_eq!(relationships[1].token_id, "0.0.51");
    assert!(relationships[1].frozen);
    assert!(relationships[1].kyc_granted);
    assert!(relationships[1].automatic_association);
    assert_eq!(server.requests().len(), 2);
}

#[tokio::test]
async fn test_endless_listing_is_error() {
    let server = StubServer::start(|_| {
        (
            200,
            json!({
                "tokens": [],
                "links": { "next": "/api/v1/accounts/0.0.1001/tokens?limit=1" }
            })
            .to_string(),
        )
    })
    .await;

    let err = mirror(&server).token_relationships("0.0.1001").await.unwrap_err();
    assert!(err.to_string().contains("after 100 pages"));
    assert_eq!(server.requests().len(), 100);
}

#[tokio::test]
async fn test_account_nfts_skip_deleted() {
    let server = StubServer::start(|_| {
        (
            200,
            json!({
                "nfts": [
                    {
                        "account_id": "0.0.1001",
                        "token_id": "0.0.60",
                        "serial_number": 1,
                        "deleted": false
                    },
                    {
                        "account_id": "0.0.1001",
                        "token_id": "0.0.60",
                        "serial_number": 2,
                        "deleted": true
                    }
                ],
                "links": { "next": null }
            })
            .to_string(),
        )
    })
    .await;

    let nfts = mirror(&server).account_nfts("0.0.1001").await.unwrap();
    assert_eq!(nfts.len(), 1);
    assert!(nfts[0].matches("0.0.1001", "0.0.60", 1));
}

#[tokio::test]
async fn test_nft_info_by_serial() {
    let server = StubServer::start(|req| match req.path.as_str() {
        "/api/v1/tokens/0.0.60/nfts/4" => (
            200,
            json!({
                "account_id": "0.0.1002",
                "token_id": "0.0.60",
                "serial_number": 4,
                "deleted": false
            })
            .to_string(),
        ),
        _ => not_found(),
    })
    .await;
    let source = mirror(&server);

    let records = source.nft_info("0.0.60", 4).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].account_id, "0.0.1002");
    assert!(source.nft_info("0.0.60", 5).await.is_err());
}

#[tokio::test]
async fn test_outstanding_and_pending_airdrops() {
    let offer = json!({
        "sender_id": "0.0.1001",
        "receiver_id": "0.0.1002",
        "token_id": "0.0.70",
        "amount": 25,
        "serial_number": null
    });
    let server = StubServer::start(move |req| match req.path.as_str() {
        "/api/v1/accounts/0.0.1001/airdrops/outstanding"
        | "/api/v1/accounts/0.0.1002/airdrops/pending" => (
            200,
            json!({ "airdrops": [offer.clone()], "links": { "next": null } }).to_string(),
        ),
        _ => (200, json!({ "airdrops": [], "links": { "next": null } }).to_string()),
    })
    .await;
    let source = mirror(&server);

    let outstanding = source.outstanding_airdrops("0.0.1001").await.unwrap();
    assert_eq!(outstanding.len(), 1);
    assert_eq!(outstanding[0].receiver_id, "0.0.1002");
    assert_eq!(outstanding[0].amount, Some(25));
    assert_eq!(outstanding[0].serial, None);

    let pending = source.pending_airdrops("0.0.1002").await.unwrap();
    assert_eq!(pending, outstanding);
    assert!(source.pending_airdrops("0.0.1001").await.unwrap().is_empty());
}
