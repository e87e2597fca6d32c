//! JSON-RPC transport against a loopback HTTP stub.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use common::{rpc_error, rpc_result, StubServer};
use ledger_tck::rpc::outcome::{BUSINESS_ERROR_CODE, INVALID_PARAMS_CODE, TRANSPORT_ERROR_CODE};
use ledger_tck::rpc::{
    ControlRpc, FailureKind, JsonRpcClient, OperationRequest, ProtocolClient, TransferBuilder,
};
use ledger_tck::sources::{ConsensusSource, LedgerStateSource};

fn client(server: &StubServer) -> JsonRpcClient {
    JsonRpcClient::with_timeout(&server.url(), Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn test_request_envelope_and_result() {
    let server = StubServer::start(|req| {
        rpc_result(req, json!({ "status": "SUCCESS", "accountId": "0.0.1001" }))
    })
    .await;

    let result = client(&server)
        .call("createAccount", json!({ "key": "302a" }))
        .await
        .unwrap();
    assert_eq!(result["accountId"], "0.0.1001");

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "POST");
    let envelope = requests[0].json();
    assert_eq!(envelope["jsonrpc"], "2.0");
    assert_eq!(envelope["method"], "createAccount");
    assert_eq!(envelope["params"]["key"], "302a");
    assert!(envelope["id"].is_u64());
}

#[tokio::test]
async fn test_business_rejection_normalized() {
    let server = StubServer::start(|req| {
        rpc_error(
            req,
            BUSINESS_ERROR_CODE,
            "Hiero error",
            Some(json!({ "status": "INSUFFICIENT_ACCOUNT_BALANCE", "message": "sender is short" })),
        )
    })
    .await;

    let failure = client(&server).call("transferCrypto", json!({})).await.unwrap_err();
    assert!(failure.is_business("INSUFFICIENT_ACCOUNT_BALANCE"));
    assert_eq!(failure.code(), BUSINESS_ERROR_CODE);
    assert!(failure.message.contains("sender is short"));
}

#[tokio::test]
async fn test_business_code_without_status_is_internal() {
    let server =
        StubServer::start(|req| rpc_error(req, BUSINESS_ERROR_CODE, "no detail", None)).await;

    let failure = client(&server).call("transferCrypto", json!({})).await.unwrap_err();
    assert_eq!(failure.kind, FailureKind::Internal { code: BUSINESS_ERROR_CODE });
}

#[tokio::test]
async fn test_invalid_params_is_internal() {
    let server =
        StubServer::start(|req| rpc_error(req, INVALID_PARAMS_CODE, "Invalid params", None))
            .await;

    let failure = client(&server).call("transferCrypto", json!({})).await.unwrap_err();
    assert!(failure.is_internal());
    assert_eq!(failure.code(), INVALID_PARAMS_CODE);
}

#[tokio::test]
async fn test_error_body_with_http_500_still_decides() {
    let server = StubServer::start(|req| {
        let (_, body) = rpc_error(
            req,
            BUSINESS_ERROR_CODE,
            "Hiero error",
            Some(json!({ "status": "INVALID_SIGNATURE" })),
        );
        (500, body)
    })
    .await;

    let failure = client(&server).call("transferCrypto", json!({})).await.unwrap_err();
    assert!(failure.is_business("INVALID_SIGNATURE"));
}

#[tokio::test]
async fn test_unparsable_body_is_transport_failure() {
    let server = StubServer::start(|_| (502, "<html>bad gateway</html>".to_string())).await;

    let failure = client(&server).call("reset", json!({})).await.unwrap_err();
    assert_eq!(failure.code(), TRANSPORT_ERROR_CODE);
}

#[tokio::test]
async fn test_mismatched_id_is_transport_failure() {
    let server = StubServer::start(|_| {
        (200, json!({ "jsonrpc": "2.0", "id": 999_999, "result": {} }).to_string())
    })
    .await;

    let failure = client(&server).call("reset", json!({})).await.unwrap_err();
    assert_eq!(failure.code(), TRANSPORT_ERROR_CODE);
}

#[tokio::test]
async fn test_protocol_client_sends_decimal_strings() {
    let server = StubServer::start(|req| rpc_result(req, json!({ "status": "SUCCESS" }))).await;
    let protocol = ProtocolClient::connect(&server.url(), Duration::from_secs(2)).unwrap();

    let transfer = TransferBuilder::new()
        .hbar("0.0.1001", -10)
        .hbar("0.0.1002", 10)
        .build();
    let outcome = protocol
        .submit(&OperationRequest::TransferCrypto(transfer))
        .await;
    assert!(outcome.is_success());

    let envelope = server.requests()[0].json();
    assert_eq!(envelope["method"], "transferCrypto");
    assert_eq!(envelope["params"]["transfers"][0]["hbar"]["amount"], "-10");
    assert_eq!(envelope["params"]["transfers"][1]["hbar"]["accountId"], "0.0.1002");
}

#[tokio::test]
async fn test_consensus_source_over_gateway() {
    let server = StubServer::start(|req| {
        let envelope = req.json();
        match envelope["method"].as_str() {
            Some("getAccountBalance") => rpc_result(
                req,
                json!({ "accountId": envelope["params"]["accountId"], "hbars": "4200" }),
            ),
            Some("getAccountInfo") => rpc_result(
                req,
                json!({
                    "accountId": envelope["params"]["accountId"],
                    "tokenRelationships": {
                        "0.0.77": {
                            "balance": "15",
                            "freezeStatus": "UNFROZEN",
                            "kycStatus": "GRANTED",
                            "automaticAssociation": true
                        }
                    }
                }),
            ),
            _ => rpc_error(req, -32601, "Method not found", None),
        }
    })
    .await;
    let source = ConsensusSource::new(Arc::new(client(&server)));

    assert_eq!(source.hbar_balance("0.0.1001").await.unwrap(), 4200);

    let relationships = source.token_relationships("0.0.1001").await.unwrap();
    assert_eq!(relationships.len(), 1);
    assert_eq!(relationships[0].token_id, "0.0.77");
    assert_eq!(relationships[0].balance, 15);
    assert!(!relationships[0].frozen);
    assert!(relationships[0].kyc_granted);
    assert!(relationships[0].automatic_association);

    assert!(source.nft_info("0.0.78", 1).await.is_err());
}
