//! Live run against a real SUT.
//!
//! Needs `JSON_RPC_SERVER_URL`, `MIRROR_NODE_REST_URL`, `OPERATOR_ACCOUNT_ID`
//! and `OPERATOR_ACCOUNT_PRIVATE_KEY`:
//!
//! ```text
//! cargo test -p ledger-tck --test live_sut_test -- --ignored --nocapture
//! ```

use std::path::PathBuf;

use ledger_tck::conformance::ConformanceRunner;
use ledger_tck::rpc::{OperationRequest, TransferBuilder};
use ledger_tck::{SuiteContext, TckConfig};

async fn live_suite() -> SuiteContext {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = TckConfig::from_env().expect("live configuration");
    SuiteContext::connect(config).await.expect("SUT setup")
}

#[tokio::test]
#[ignore = "requires a running SUT, consensus gateway and mirror node"]
async fn test_live_funded_transfer() {
    let ctx = live_suite().await;
    let verifier = ctx.verifier().clone();

    ctx.run_test("live funded transfer", |fx| async move {
        let sender = fx.create_funded_account(10).await?;
        let receiver = fx.create_funded_account(0).await?;
        let transfer = TransferBuilder::new()
            .hbar(&sender.account_id, -10)
            .hbar(&receiver.account_id, 10)
            .signed_by(&sender.key)
            .build();
        let outcome = fx
            .client()
            .submit(&OperationRequest::TransferCrypto(transfer))
            .await;
        assert!(outcome.is_success(), "{}", outcome);

        verifier.verify_hbar_balance(&sender.account_id, 0).await?;
        verifier.verify_hbar_balance(&receiver.account_id, 10).await
    })
    .await
    .unwrap();

    ctx.reset().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running SUT, consensus gateway and mirror node"]
async fn test_live_conformance_suite() {
    let ctx = live_suite().await;
    let specs = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("specs");
    let report = ConformanceRunner::load_from_dir(&specs)
        .unwrap()
        .run_all(&ctx)
        .await;
    report.print_summary();
    ctx.reset().await.unwrap();
    assert!(report.all_passed());
}
