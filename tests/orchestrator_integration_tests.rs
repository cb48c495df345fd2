// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0
//! End-to-end orchestrator tests against the in-memory fakes
//!
//! Every scenario runs the real Orchestrator, Submitter, ConfirmationTracker
//! and Reconciler; only the chains, the key and the clock are fake.

use alloy_chains::Chain;
use alloy_primitives::U256;
use std::sync::Arc;
use std::time::Duration;
use xchain_flashloan::testing::{FakeChain, FakeClock, FakeSigner};
use xchain_flashloan::{
    encoder, ChainRegistry, Deployment, DestinationConfig, ErrorKind, FactKind, FlashLoanError,
    Intent, IntentKind, Orchestrator, OrchestratorConfig, OverallStatus, RetryConfig, StepStatus,
    Submitter, TrackingConfig,
};

fn chain_a() -> Chain {
    Chain::from_id(901)
}

fn chain_b() -> Chain {
    Chain::from_id(902)
}

fn ether(n: u64) -> U256 {
    U256::from(n) * U256::from(10u64).pow(U256::from(18u64))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct Harness {
    chain: FakeChain,
    clock: FakeClock,
    orchestrator: Orchestrator,
    deployment: Deployment,
}

fn config() -> OrchestratorConfig {
    OrchestratorConfig::default()
        .with_tracking(
            TrackingConfig::default()
                .with_initial_interval(Duration::from_secs(1))
                .with_max_interval(Duration::from_secs(8))
                .with_max_wait(Duration::from_secs(30)),
        )
        .with_destination(
            DestinationConfig::default()
                .with_poll_interval(Duration::from_secs(1))
                .with_max_wait(Duration::from_secs(10)),
        )
}

fn harness_with(config: OrchestratorConfig) -> Harness {
    init_tracing();
    let chain = FakeChain::new();
    let clock = FakeClock::new();
    let deployment = Deployment::supersim();

    let orchestrator = Orchestrator::builder()
        .registry(ChainRegistry::supersim())
        .deployment(deployment)
        .connector(Arc::new(chain.clone()))
        .signer(Arc::new(FakeSigner::new()))
        .clock(Arc::new(clock.clone()))
        .config(config)
        .build()
        .unwrap();

    Harness {
        chain,
        clock,
        orchestrator,
        deployment,
    }
}

fn harness() -> Harness {
    harness_with(config())
}

fn flash_loan_expecting(deployment: &Deployment, amount: U256, expected: U256) -> Intent {
    Intent::builder()
        .kind(IntentKind::InitiateFlashLoan)
        .source_chain(chain_a())
        .destination_chain(chain_b())
        .amount(amount)
        .target_address(deployment.target())
        .encoded_call_data(encoder::encode_set_value(deployment.target(), deployment.token()).into_data())
        .fee(deployment.flat_fee())
        .expected_target_value(expected)
        .build()
}

#[tokio::test]
async fn test_mint_to_bridge_succeeds_and_refreshes_balance() {
    let h = harness();
    let amount = ether(1_000);

    let state = h
        .orchestrator
        .run_operation(h.deployment.mint_to_bridge(chain_a(), amount))
        .await
        .unwrap();

    assert_eq!(state.overall_status(), OverallStatus::Succeeded);
    assert!(state.last_error().is_none());
    assert_eq!(state.steps().len(), 1);
    assert_eq!(state.steps()[0].status(), StepStatus::Confirmed);

    assert_eq!(h.chain.balance(chain_a(), h.deployment.bridge()), amount);
    let fact = h
        .orchestrator
        .fact(FactKind::Balance, chain_a(), h.deployment.bridge())
        .expect("balance fact refreshed after mint");
    assert_eq!(fact.value(), amount);
    assert_eq!(h.chain.dispatch_count(), 1);
}

#[tokio::test]
async fn test_flash_loan_observes_destination_effect() {
    let h = harness();
    let amount = ether(1);

    let state = h
        .orchestrator
        .run_operation(h.deployment.flash_loan(chain_a(), chain_b(), amount))
        .await
        .unwrap();

    assert_eq!(state.overall_status(), OverallStatus::Succeeded);
    let target_value = h
        .orchestrator
        .fact(FactKind::TargetValue, chain_b(), h.deployment.target())
        .unwrap();
    assert_eq!(target_value.value(), amount);
    assert!(h
        .orchestrator
        .fact(FactKind::Balance, chain_b(), h.deployment.target())
        .is_some());
}

#[tokio::test]
async fn test_reverted_flash_loan_fails_without_touching_destination() {
    let h = harness();
    h.chain.revert_flash_loans(true);

    let state = h
        .orchestrator
        .run_operation(h.deployment.flash_loan(chain_a(), chain_b(), ether(1)))
        .await
        .unwrap();

    assert_eq!(state.overall_status(), OverallStatus::Failed);
    let error = state.last_error().expect("failed snapshot carries its error");
    assert_eq!(error.kind(), ErrorKind::ExecutionReverted);
    assert!(!error.message().is_empty());
    assert_eq!(state.steps()[0].status(), StepStatus::Failed);

    assert!(h
        .orchestrator
        .fact(FactKind::TargetValue, chain_b(), h.deployment.target())
        .is_none());
    assert_eq!(h.chain.target_value(chain_b(), h.deployment.target()), None);
    assert_eq!(h.chain.read_count(), 0);
    assert_eq!(h.chain.dispatch_count(), 1);
}

#[tokio::test]
async fn test_expected_target_value_is_the_post_condition() {
    let h = harness();
    h.chain.set_flash_loan_effect(U256::from(42u64));

    let state = h
        .orchestrator
        .run_operation(flash_loan_expecting(&h.deployment, ether(1), U256::from(42u64)))
        .await
        .unwrap();

    assert_eq!(state.overall_status(), OverallStatus::Succeeded);
}

#[tokio::test]
async fn test_unmet_post_condition_times_out() {
    let h = harness();
    h.chain.set_flash_loan_effect(U256::from(42u64));

    let state = h
        .orchestrator
        .run_operation(flash_loan_expecting(&h.deployment, ether(1), U256::from(7u64)))
        .await
        .unwrap();

    assert_eq!(state.overall_status(), OverallStatus::Failed);
    assert_eq!(
        state.last_error().unwrap().kind(),
        ErrorKind::ConfirmationTimeout
    );
    // The source step itself went through.
    assert_eq!(state.steps()[0].status(), StepStatus::Confirmed);
}

#[tokio::test]
async fn test_undelivered_flash_loan_times_out_on_destination() {
    let h = harness();
    h.chain.freeze_destination(true);

    let state = h
        .orchestrator
        .run_operation(h.deployment.flash_loan(chain_a(), chain_b(), ether(1)))
        .await
        .unwrap();

    assert_eq!(state.overall_status(), OverallStatus::Failed);
    assert_eq!(
        state.last_error().unwrap().kind(),
        ErrorKind::ConfirmationTimeout
    );
    assert!(h.clock.total_sleep_time() >= Duration::from_secs(10));
}

#[tokio::test]
async fn test_repeated_identical_flash_loan_succeeds_again() {
    let h = harness();
    let intent = h.deployment.flash_loan(chain_a(), chain_b(), ether(1));

    let first = h.orchestrator.run_operation(intent.clone()).await.unwrap();
    assert_eq!(first.overall_status(), OverallStatus::Succeeded);

    // Same amount, same target value on the destination: only the relayed
    // message tells this delivery apart from the last one.
    let second = h.orchestrator.run_operation(intent).await.unwrap();
    assert_eq!(second.overall_status(), OverallStatus::Succeeded);
    assert_ne!(second.steps()[0].tx_hash(), first.steps()[0].tx_hash());
    assert_eq!(h.chain.dispatch_count(), 2);
    assert_eq!(
        h.chain.target_value(chain_b(), h.deployment.target()),
        Some(ether(1))
    );
}

#[tokio::test]
async fn test_stale_target_value_is_not_mistaken_for_delivery() {
    let h = harness();
    h.chain
        .set_target_value(chain_b(), h.deployment.target(), U256::from(5u64));
    h.chain.freeze_destination(true);

    let state = h
        .orchestrator
        .run_operation(h.deployment.flash_loan(chain_a(), chain_b(), ether(1)))
        .await
        .unwrap();

    assert_eq!(state.overall_status(), OverallStatus::Failed);
    let error = state.last_error().unwrap();
    assert_eq!(error.kind(), ErrorKind::ConfirmationTimeout);
    assert!(error.message().contains("relay"));
    assert_eq!(state.steps()[0].status(), StepStatus::Confirmed);
}

#[tokio::test]
async fn test_overlapping_starts_share_one_operation() {
    let h = harness();
    let intent = h.deployment.mint_to_bridge(chain_a(), ether(5));

    let first = h.orchestrator.start_operation(intent.clone()).unwrap();
    let second = h.orchestrator.start_operation(intent.clone()).unwrap();
    assert_eq!(first, second);

    let state = h.orchestrator.wait_for_terminal(first).await.unwrap();
    assert_eq!(state.overall_status(), OverallStatus::Succeeded);
    assert_eq!(h.chain.dispatch_count(), 1);

    // Once terminal, the same intent is a new user action.
    let third = h.orchestrator.start_operation(intent).unwrap();
    assert_ne!(third, first);
    h.orchestrator.wait_for_terminal(third).await.unwrap();
    assert_eq!(h.chain.dispatch_count(), 2);
}

#[tokio::test]
async fn test_concurrent_submits_dispatch_once() {
    init_tracing();
    let chain = FakeChain::new();
    let submitter = Submitter::new(
        Arc::new(chain.clone()),
        Arc::new(FakeClock::new()),
        Deployment::supersim(),
        RetryConfig::default(),
    );
    let intent = Deployment::supersim().mint_to_bridge(chain_a(), ether(1));
    let signer = Arc::new(FakeSigner::new());

    let results = futures::future::join_all(
        (0..8).map(|_| submitter.submit(&intent, signer.clone(), chain_a())),
    )
    .await;

    let first = results[0].as_ref().unwrap().clone();
    for result in &results {
        assert_eq!(result.as_ref().unwrap(), &first);
    }
    assert_eq!(chain.dispatch_count(), 1);
    assert_eq!(chain.send_attempts(), 1);
}

#[tokio::test]
async fn test_status_only_moves_forward() {
    let h = harness();
    let id = h
        .orchestrator
        .start_operation(h.deployment.flash_loan(chain_a(), chain_b(), ether(1)))
        .unwrap();
    let mut rx = h.orchestrator.subscribe(id).unwrap();

    let mut seen = Vec::new();
    loop {
        let status = rx.borrow_and_update().overall_status();
        if seen.last() != Some(&status) {
            seen.push(status);
        }
        if status.is_terminal() {
            break;
        }
        rx.changed().await.unwrap();
    }

    let rank = |s: &OverallStatus| match s {
        OverallStatus::Idle => 0,
        OverallStatus::Submitting => 1,
        OverallStatus::AwaitingSourceConfirm => 2,
        OverallStatus::AwaitingDestinationEffect => 3,
        OverallStatus::Succeeded | OverallStatus::Failed => 4,
    };
    assert!(seen.windows(2).all(|w| rank(&w[0]) < rank(&w[1])), "{seen:?}");
    assert_eq!(seen.last(), Some(&OverallStatus::Succeeded));
    assert_eq!(
        h.orchestrator.get_status(id).unwrap().overall_status(),
        OverallStatus::Succeeded
    );
}

#[tokio::test]
async fn test_rejected_submission_fails_operation() {
    let h = harness();
    h.chain
        .reject_calls(chain_a(), "execution reverted: ERC20InsufficientBalance");

    let state = h
        .orchestrator
        .run_operation(h.deployment.flash_loan(chain_a(), chain_b(), ether(1)))
        .await
        .unwrap();

    assert_eq!(state.overall_status(), OverallStatus::Failed);
    let error = state.last_error().unwrap();
    assert_eq!(error.kind(), ErrorKind::SubmissionRejected);
    assert!(error.message().contains("ERC20InsufficientBalance"));
    assert!(state.steps().is_empty());
    assert_eq!(h.chain.dispatch_count(), 0);
    assert_eq!(h.clock.sleep_count(), 0);
}

#[tokio::test]
async fn test_exhausted_network_retries_fail_operation() {
    let h = harness();
    h.chain.fail_sends(chain_a(), 10);

    let state = h
        .orchestrator
        .run_operation(h.deployment.mint_to_bridge(chain_a(), ether(1)))
        .await
        .unwrap();

    assert_eq!(state.overall_status(), OverallStatus::Failed);
    assert_eq!(
        state.last_error().unwrap().kind(),
        ErrorKind::NetworkUnavailable
    );
    assert_eq!(h.chain.send_attempts(), 3);
    assert_eq!(h.clock.total_sleep_time(), Duration::from_millis(1_500));
}

#[tokio::test]
async fn test_lost_send_response_does_not_double_submit() {
    let h = harness();
    h.chain.lose_send_responses(chain_a(), 1);

    let state = h
        .orchestrator
        .run_operation(h.deployment.mint_to_bridge(chain_a(), ether(3)))
        .await
        .unwrap();

    assert_eq!(state.overall_status(), OverallStatus::Succeeded);
    assert_eq!(h.chain.send_attempts(), 2);
    assert_eq!(h.chain.dispatch_count(), 1);
    assert_eq!(h.chain.balance(chain_a(), h.deployment.bridge()), ether(3));
}

#[tokio::test]
async fn test_confirmation_timeout_leaves_step_submitted_and_reattaches() {
    let h = harness();
    h.chain.set_default_include_after(usize::MAX);
    let intent = h.deployment.mint_to_bridge(chain_a(), ether(1));

    let timed_out = h.orchestrator.run_operation(intent.clone()).await.unwrap();
    assert_eq!(timed_out.overall_status(), OverallStatus::Failed);
    assert_eq!(
        timed_out.last_error().unwrap().kind(),
        ErrorKind::ConfirmationTimeout
    );
    assert_eq!(timed_out.steps()[0].status(), StepStatus::Submitted);
    let tx_hash = timed_out.steps()[0].tx_hash();

    // Tracking again picks up the same transaction rather than sending another.
    h.chain.include_after_polls(tx_hash, 1);
    let retried = h.orchestrator.run_operation(intent).await.unwrap();

    assert_eq!(retried.overall_status(), OverallStatus::Succeeded);
    assert_ne!(retried.id(), timed_out.id());
    assert_eq!(retried.steps()[0].tx_hash(), tx_hash);
    assert_eq!(h.chain.dispatch_count(), 1);
}

#[tokio::test]
async fn test_abandon_stops_polling_but_keeps_transaction() {
    let h = harness_with(config().with_tracking(
        TrackingConfig::default().with_max_wait(Duration::from_secs(3_600)),
    ));
    h.chain.set_default_include_after(usize::MAX);
    let intent = h.deployment.mint_to_bridge(chain_a(), ether(1));

    let id = h.orchestrator.start_operation(intent.clone()).unwrap();
    let mut rx = h.orchestrator.subscribe(id).unwrap();
    rx.wait_for(|s| s.overall_status() == OverallStatus::AwaitingSourceConfirm)
        .await
        .unwrap();

    let abandoned = h.orchestrator.abandon(id).unwrap();
    assert!(abandoned.is_abandoned());
    assert_eq!(abandoned.overall_status(), OverallStatus::AwaitingSourceConfirm);
    assert_eq!(abandoned.steps()[0].status(), StepStatus::Submitted);

    let tx_hash = abandoned.steps()[0].tx_hash();
    let polls = h.chain.receipt_polls(tx_hash);
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(h.chain.receipt_polls(tx_hash), polls);
    assert!(h.orchestrator.wait_for_terminal(id).await.unwrap().is_abandoned());

    // The transaction is still out there; a new start re-attaches to it.
    h.chain.include_after_polls(tx_hash, polls + 1);
    let resumed = h.orchestrator.run_operation(intent).await.unwrap();
    assert_eq!(resumed.overall_status(), OverallStatus::Succeeded);
    assert_eq!(h.chain.dispatch_count(), 1);
}

#[tokio::test]
async fn test_mint_and_flash_loan_run_side_by_side() {
    let h = harness();

    let mint = h
        .orchestrator
        .start_operation(h.deployment.mint_to_bridge(chain_a(), ether(1_000)))
        .unwrap();
    let loan = h
        .orchestrator
        .start_operation(h.deployment.flash_loan(chain_a(), chain_b(), ether(1)))
        .unwrap();
    assert_ne!(mint, loan);

    let (mint, loan) = tokio::join!(
        h.orchestrator.wait_for_terminal(mint),
        h.orchestrator.wait_for_terminal(loan)
    );
    assert_eq!(mint.unwrap().overall_status(), OverallStatus::Succeeded);
    assert_eq!(loan.unwrap().overall_status(), OverallStatus::Succeeded);
    assert_eq!(h.chain.dispatch_count(), 2);
}

#[tokio::test]
async fn test_concurrent_fact_refreshes_coalesce() {
    let h = harness();
    h.chain
        .set_balance(chain_a(), h.deployment.bridge(), ether(9));

    h.chain.hold_reads();
    let refreshes = futures::future::join_all((0..4).map(|_| {
        h.orchestrator
            .refresh_fact(FactKind::Balance, chain_a(), h.deployment.bridge())
    }));
    let release = async {
        tokio::task::yield_now().await;
        h.chain.release_reads();
    };
    let (results, ()) = tokio::join!(refreshes, release);

    assert_eq!(h.chain.read_count(), 1);
    assert!(results.iter().all(|r| r.as_ref().unwrap().value() == ether(9)));
}

#[tokio::test]
async fn test_forget_only_drops_finished_operations() {
    let h = harness_with(config().with_tracking(
        TrackingConfig::default().with_max_wait(Duration::from_secs(3_600)),
    ));

    let done = h
        .orchestrator
        .run_operation(h.deployment.mint_to_bridge(chain_a(), ether(1)))
        .await
        .unwrap();
    let forgotten = h.orchestrator.forget(done.id()).unwrap();
    assert_eq!(forgotten.overall_status(), OverallStatus::Succeeded);
    assert!(matches!(
        h.orchestrator.get_status(done.id()),
        Err(FlashLoanError::OperationNotFound(_))
    ));

    h.chain.set_default_include_after(usize::MAX);
    let running = h
        .orchestrator
        .start_operation(h.deployment.mint_to_bridge(chain_a(), ether(2)))
        .unwrap();
    assert!(matches!(
        h.orchestrator.forget(running),
        Err(FlashLoanError::OperationInFlight(_))
    ));

    h.orchestrator.abandon(running).unwrap();
    assert!(h.orchestrator.forget(running).unwrap().is_abandoned());
}

#[tokio::test]
async fn test_oldest_finished_operations_are_pruned() {
    let h = harness_with(config().with_retained_operations(2));

    let mut ids = Vec::new();
    for n in 1..=4 {
        let state = h
            .orchestrator
            .run_operation(h.deployment.mint_to_bridge(chain_a(), ether(n)))
            .await
            .unwrap();
        ids.push(state.id());
    }

    assert!(matches!(
        h.orchestrator.get_status(ids[0]),
        Err(FlashLoanError::OperationNotFound(_))
    ));
    for id in &ids[1..] {
        assert_eq!(
            h.orchestrator.get_status(*id).unwrap().overall_status(),
            OverallStatus::Succeeded
        );
    }
}

#[tokio::test]
async fn test_invalid_intents_are_rejected_up_front() {
    let h = harness();

    let mint_with_destination = Intent::builder()
        .kind(IntentKind::Mint)
        .source_chain(chain_a())
        .destination_chain(chain_b())
        .amount(ether(1))
        .target_address(h.deployment.bridge())
        .build();
    assert!(matches!(
        h.orchestrator.start_operation(mint_with_destination),
        Err(FlashLoanError::InvalidIntent(_))
    ));

    let unknown_chain = h
        .deployment
        .flash_loan(chain_a(), Chain::from_id(10), ether(1));
    assert!(matches!(
        h.orchestrator.start_operation(unknown_chain),
        Err(FlashLoanError::ChainNotSupported { .. })
    ));
    assert_eq!(h.chain.send_attempts(), 0);
}

#[tokio::test]
async fn test_snapshot_serializes_for_presentation() {
    let h = harness();
    let state = h
        .orchestrator
        .run_operation(h.deployment.mint_to_bridge(chain_a(), ether(1)))
        .await
        .unwrap();

    let json = serde_json::to_value(&state).unwrap();
    assert_eq!(json["overall_status"], "Succeeded");
    assert_eq!(json["steps"][0]["status"], "Confirmed");
    assert_eq!(json["abandoned"], false);
}
