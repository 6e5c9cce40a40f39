use converge_core::testing::{InMemoryRemote, Operation};
use converge_core::{
    FailureKind, QuotaEngine, QuotaTransfer, ReconcileError, RemoteError, RetryConfig, StatusCode,
    TeamId,
};
use proptest::prelude::*;
use std::sync::Arc;

fn engine(remote: &Arc<InMemoryRemote>) -> QuotaEngine {
    QuotaEngine::new(remote.clone(), RetryConfig::none())
}

fn teams(source: f64, destination: f64) -> Arc<InMemoryRemote> {
    let remote = Arc::new(InMemoryRemote::new());
    remote.set_quota("platform", source);
    remote.set_quota("payments", destination);
    remote
}

#[tokio::test]
async fn test_transfer_conserves_total() {
    let remote = teams(10.0, 2.5);
    let source = TeamId::from("platform");
    let destination = TeamId::from("payments");

    let transfer = engine(&remote)
        .move_toward(&source, &destination, 6.0)
        .await
        .unwrap();

    assert_eq!(transfer.moved, 3.5);
    assert_eq!(transfer.source, 6.5);
    assert_eq!(transfer.destination, 6.0);
    assert_eq!(remote.quota(&source), Some(6.5));
    assert_eq!(remote.quota(&destination), Some(6.0));
    assert_eq!(remote.calls(Operation::TransferQuota), 1);
}

#[tokio::test]
async fn test_reaching_target_again_is_noop() {
    let remote = teams(10.0, 6.0);

    let transfer = engine(&remote)
        .move_toward(&"platform".into(), &"payments".into(), 6.0)
        .await
        .unwrap();

    assert_eq!(transfer.moved, 0.0);
    assert_eq!(remote.mutation_calls(), 0);
}

#[tokio::test]
async fn test_shrink_fails_and_leaves_balances() {
    let remote = teams(10.0, 6.0);

    let err = engine(&remote)
        .move_toward(&"platform".into(), &"payments".into(), 4.0)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::Unsupported);
    assert_eq!(remote.quota(&"platform".into()), Some(10.0));
    assert_eq!(remote.quota(&"payments".into()), Some(6.0));
    assert_eq!(remote.calls(Operation::TransferQuota), 0);
}

#[tokio::test]
async fn test_insufficient_source_fails_without_partial_transfer() {
    let remote = teams(1.0, 2.0);

    let err = engine(&remote)
        .move_toward(&"platform".into(), &"payments".into(), 5.0)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::InsufficientQuota);
    assert_eq!(remote.quota(&"platform".into()), Some(1.0));
    assert_eq!(remote.quota(&"payments".into()), Some(2.0));
}

#[tokio::test]
async fn test_denied_team_is_a_credentials_failure() {
    let remote = teams(10.0, 2.0);
    remote.deny_team("platform");

    let err = engine(&remote)
        .move_toward(&"platform".into(), &"payments".into(), 5.0)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::Credentials);
    assert_eq!(err.status_code(), Some(StatusCode::PermissionDenied));
}

#[tokio::test]
async fn test_self_transfer_and_bad_target_are_rejected() {
    let remote = teams(10.0, 2.0);
    let quotas = engine(&remote);

    let err = quotas
        .move_toward(&"platform".into(), &"platform".into(), 5.0)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::InvalidInput);

    let err = quotas
        .move_toward(&"platform".into(), &"payments".into(), f64::NAN)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::InvalidInput);
    assert_eq!(remote.calls(Operation::TransferQuota), 0);
}

#[tokio::test(start_paused = true)]
async fn test_lost_transfer_response_is_not_sent_again() {
    let remote = teams(10.0, 2.0);
    remote.fail_after_apply(
        Operation::TransferQuota,
        RemoteError::new(StatusCode::DeadlineExceeded, "timed out"),
    );
    let quotas = QuotaEngine::new(remote.clone(), RetryConfig::default());

    let transfer = quotas
        .move_toward(&"platform".into(), &"payments".into(), 5.0)
        .await
        .unwrap();

    assert_eq!(transfer.moved, 3.0);
    assert_eq!(transfer.destination, 5.0);
    assert_eq!(transfer.source, 7.0);
    assert_eq!(remote.quota(&"payments".into()), Some(5.0));
    assert_eq!(remote.calls(Operation::TransferQuota), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_transfer_is_recomputed_and_retried() {
    let remote = teams(10.0, 2.0);
    remote.fail_times(Operation::TransferQuota, 1, StatusCode::Unavailable);
    let quotas = QuotaEngine::new(remote.clone(), RetryConfig::default());

    let transfer = quotas
        .move_toward(&"platform".into(), &"payments".into(), 5.0)
        .await
        .unwrap();

    assert_eq!(transfer.moved, 3.0);
    assert_eq!(remote.quota(&"payments".into()), Some(5.0));
    assert_eq!(remote.calls(Operation::TransferQuota), 2);
}

#[tokio::test]
async fn test_lost_response_on_last_attempt_still_counts() {
    let remote = teams(10.0, 2.0);
    remote.fail_after_apply(
        Operation::TransferQuota,
        RemoteError::new(StatusCode::Unavailable, "connection reset"),
    );

    let transfer = engine(&remote)
        .move_toward(&"platform".into(), &"payments".into(), 5.0)
        .await
        .unwrap();

    assert_eq!(transfer.moved, 3.0);
    assert_eq!(remote.calls(Operation::TransferQuota), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transfer_budget_is_bounded() {
    let remote = teams(10.0, 2.0);
    remote.fail_times(Operation::TransferQuota, 5, StatusCode::Unavailable);
    let quotas = QuotaEngine::new(remote.clone(), RetryConfig::default());

    let err = quotas
        .move_toward(&"platform".into(), &"payments".into(), 5.0)
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::RetriesExhausted { attempts: 3, .. }));
    assert_eq!(remote.calls(Operation::TransferQuota), 3);
    assert_eq!(remote.quota(&"payments".into()), Some(2.0));
    assert_eq!(remote.quota(&"platform".into()), Some(10.0));
}

/// Balances in quarter units, so sums stay exact
fn balance() -> impl Strategy<Value = f64> {
    (0u32..400).prop_map(|quarters| f64::from(quarters) / 4.0)
}

fn run(remote: &Arc<InMemoryRemote>, desired: f64) -> converge_core::Result<QuotaTransfer> {
    let quotas = engine(remote);
    tokio_test::block_on(quotas.move_toward(&"platform".into(), &"payments".into(), desired))
}

proptest! {
    #[test]
    fn test_total_is_conserved(
        source in balance(),
        destination in balance(),
        desired in balance(),
    ) {
        let remote = teams(source, destination);

        let result = run(&remote, desired);

        let after_source = remote.quota(&"platform".into()).unwrap();
        let after_destination = remote.quota(&"payments".into()).unwrap();
        prop_assert_eq!(after_source + after_destination, source + destination);
        match result {
            Ok(transfer) => {
                prop_assert_eq!(after_destination, desired);
                prop_assert_eq!(transfer.moved, desired - destination);
            }
            Err(_) => {
                prop_assert_eq!(after_source, source);
                prop_assert_eq!(after_destination, destination);
            }
        }
    }

    #[test]
    fn test_destination_never_shrinks(
        source in balance(),
        destination in balance(),
        lower_by in 1u32..400,
    ) {
        let desired = destination - f64::from(lower_by) / 4.0;
        let remote = teams(source, destination);

        let err = run(&remote, desired).unwrap_err();

        prop_assert_eq!(err.kind(), FailureKind::Unsupported);
        prop_assert_eq!(remote.quota(&"platform".into()), Some(source));
        prop_assert_eq!(remote.quota(&"payments".into()), Some(destination));
        prop_assert_eq!(remote.calls(Operation::TransferQuota), 0);
    }
}
