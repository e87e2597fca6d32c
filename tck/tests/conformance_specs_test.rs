//! Shipped YAML scenarios against the in-process ledger.

use std::path::PathBuf;
use std::sync::Arc;

use ledger_tck::conformance::{Category, ConformanceRunner, TestStatus};
use ledger_tck::test_utils::{mock_suite, MockLedger};

fn specs_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("specs")
}

#[tokio::test]
async fn test_all_shipped_specs_pass_sequentially() {
    let runner = ConformanceRunner::load_from_dir(&specs_dir()).unwrap();
    assert!(runner.spec_count() >= 40, "only {} specs loaded", runner.spec_count());

    let ledger = Arc::new(MockLedger::new());
    let ctx = mock_suite(&ledger, 2).await.unwrap();
    let report = runner.run_all(&ctx).await;

    if !report.all_passed() {
        panic!("{}", report.summary());
    }
    assert_eq!(report.total, runner.spec_count());
    ctx.reset().await.unwrap();
    assert!(!ledger.has_session());
}

#[tokio::test]
async fn test_all_shipped_specs_pass_concurrently() {
    let runner = ConformanceRunner::load_from_dir(&specs_dir()).unwrap();
    let ledger = Arc::new(MockLedger::new());
    let ctx = mock_suite(&ledger, 2).await.unwrap();

    let report = runner.run_concurrent(&ctx, 4).await;
    if !report.all_passed() {
        panic!("{}", report.summary());
    }
    assert_eq!(report.passed, runner.spec_count());
}

#[tokio::test]
async fn test_every_category_is_covered() {
    let runner = ConformanceRunner::load_from_dir(&specs_dir()).unwrap();
    for category in [
        Category::TransferCrypto,
        Category::TokenTransfer,
        Category::NftTransfer,
        Category::ApprovedTransfer,
        Category::Airdrop,
        Category::AccountLifecycle,
    ] {
        assert!(
            runner.specs().iter().any(|s| s.spec.category == category),
            "no scenario for {:?}",
            category
        );
    }
}

#[tokio::test]
async fn test_filtered_run_and_reports() {
    let runner = ConformanceRunner::load_from_dir(&specs_dir())
        .unwrap()
        .filter_name("nft_transfer");
    assert_eq!(runner.spec_count(), 5);

    let ledger = Arc::new(MockLedger::new());
    let ctx = mock_suite(&ledger, 1).await.unwrap();
    let report = runner.run_category(&ctx, Category::NftTransfer).await;
    assert!(report.all_passed(), "{}", report.summary());
    assert!(report.results.iter().all(|r| r.status == TestStatus::Pass));

    let xml = report.to_junit_xml();
    assert!(xml.starts_with("<?xml"));
    assert!(xml.contains("tests=\"5\""));
    assert!(xml.contains("name=\"nft_transfer_self_transfer_rejected\""));
    assert!(!xml.contains("<failure"));

    let json: serde_json::Value = serde_json::from_str(&report.to_json()).unwrap();
    assert_eq!(json["passed"], 5);
}

#[tokio::test]
async fn test_sut_failure_is_reported_not_panicked() {
    let runner = ConformanceRunner::load_from_dir(&specs_dir().join("transfer_crypto"))
        .unwrap()
        .filter_name("funded_sender");
    assert_eq!(runner.spec_count(), 1);

    let ledger = Arc::new(MockLedger::new());
    let ctx = mock_suite(&ledger, 0).await.unwrap();
    ledger.fail_next(
        "transferCrypto",
        ledger_tck::rpc::Failure::business("INVALID_SIGNATURE", "injected"),
    );

    let report = runner.run_all(&ctx).await;
    assert_eq!(report.failed, 1);
    let error = report.results[0].error.as_deref().unwrap_or_default();
    assert!(error.contains("INVALID_SIGNATURE"), "{}", error);
}
