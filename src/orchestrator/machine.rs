// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0
//! The cross-chain operation state machine.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use alloy_chains::Chain;
use alloy_primitives::{Address, U256};
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn, Instrument};

use super::config::OrchestratorConfig;
use super::reconciler::Reconciler;
use super::submitter::Submitter;
use super::tracker::ConfirmationTracker;
use crate::chain::{Capability, ChainRegistry, Deployment};
use crate::error::{FlashLoanError, Result};
use crate::protocol::{
    ConfirmedReceipt, CrossChainMessage, DerivedFact, FactKey, FactKind, IdempotencyKey, Intent,
    IntentKind, OperationId, OperationState, OverallStatus, StepStatus,
};
use crate::providers::TokioClock;
use crate::spans;
use crate::traits::{CallSigner, ChainConnector, Clock};

/// Tracks many cross-chain operations side by side.
///
/// Each operation runs on its own task and publishes snapshots through a
/// [`watch`] channel; the orchestrator is the only writer. Operations share
/// the registry and the collaborators but no per-operation state.
///
/// Finished snapshots stay queryable until [`Orchestrator::forget`] drops
/// them or more than [`OrchestratorConfig::retained_operations`] finished
/// operations pile up, at which point the oldest are dropped first.
///
/// # Example
///
/// ```rust,no_run
/// use xchain_flashloan::{
///     ChainRegistry, Deployment, Orchestrator, OrchestratorConfig, OverallStatus,
/// };
/// use xchain_flashloan::providers::{AlloyConnector, LocalCallSigner};
/// use alloy_chains::Chain;
/// use alloy_primitives::U256;
/// use alloy_provider::ProviderBuilder;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let a = ProviderBuilder::new().connect_http("http://127.0.0.1:9545".parse()?);
/// let b = ProviderBuilder::new().connect_http("http://127.0.0.1:9546".parse()?);
/// let connector = AlloyConnector::new()
///     .with_provider(Chain::from_id(901), a)
///     .with_provider(Chain::from_id(902), b);
///
/// let orchestrator = Orchestrator::builder()
///     .registry(ChainRegistry::supersim())
///     .deployment(Deployment::supersim())
///     .connector(Arc::new(connector))
///     .signer(Arc::new(LocalCallSigner::from_private_key("0xac09...")?))
///     .config(OrchestratorConfig::local_dev())
///     .build()?;
///
/// let intent = Deployment::supersim().flash_loan(
///     Chain::from_id(901),
///     Chain::from_id(902),
///     U256::from(10u64).pow(U256::from(18u64)),
/// );
/// let state = orchestrator.run_operation(intent).await?;
/// assert_eq!(state.overall_status(), OverallStatus::Succeeded);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Arc<ChainRegistry>,
    deployment: Deployment,
    signer: Arc<dyn CallSigner>,
    clock: Arc<dyn Clock>,
    config: OrchestratorConfig,
    submitter: Submitter,
    tracker: ConfirmationTracker,
    reconciler: Reconciler,
    next_id: AtomicU64,
    operations: Mutex<HashMap<OperationId, Entry>>,
    /// Non-terminal operations by the key of their source-chain submission.
    active: Mutex<HashMap<IdempotencyKey, OperationId>>,
}

struct Entry {
    key: IdempotencyKey,
    state: Arc<watch::Sender<OperationState>>,
    task: Option<AbortHandle>,
}

impl Entry {
    fn is_finished(&self) -> bool {
        let state = self.state.borrow();
        state.is_terminal() || state.is_abandoned()
    }
}

#[bon::bon]
impl Orchestrator {
    #[builder]
    pub fn new(
        registry: ChainRegistry,
        deployment: Deployment,
        connector: Arc<dyn ChainConnector>,
        signer: Arc<dyn CallSigner>,
        clock: Option<Arc<dyn Clock>>,
        #[builder(default)] config: OrchestratorConfig,
    ) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(registry);
        let clock = clock.unwrap_or_else(|| Arc::new(TokioClock::new()));

        let submitter = Submitter::new(connector.clone(), clock.clone(), deployment, config.retry);
        let tracker = ConfirmationTracker::new(
            connector.clone(),
            clock.clone(),
            registry.clone(),
            config.tracking,
        );
        let reconciler = Reconciler::new(connector, clock.clone(), registry.clone(), deployment);

        debug!(
            chains = registry.len(),
            signer = %signer.address(),
            event = "orchestrator_initialized"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                registry,
                deployment,
                signer,
                clock,
                config,
                submitter,
                tracker,
                reconciler,
                next_id: AtomicU64::new(1),
                operations: Mutex::new(HashMap::new()),
                active: Mutex::new(HashMap::new()),
            }),
        })
    }
}

impl Orchestrator {
    pub fn registry(&self) -> &ChainRegistry {
        &self.inner.registry
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    pub fn signer_address(&self) -> Address {
        self.inner.signer.address()
    }

    /// Starts driving `intent` and returns immediately.
    ///
    /// Starting an intent identical to one still in flight returns the id of
    /// the existing operation; nothing is submitted twice.
    ///
    /// # Errors
    ///
    /// [`FlashLoanError::InvalidIntent`] or
    /// [`FlashLoanError::ChainNotSupported`] if the intent cannot run against
    /// the registry. Failures after this point are reported through the
    /// operation's status.
    pub fn start_operation(&self, intent: Intent) -> Result<OperationId> {
        intent.validate()?;
        self.check_capabilities(&intent)?;

        let source = intent.source_chain();
        let key = IdempotencyKey::derive(&intent, source, self.inner.signer.address());

        let mut active = lock(&self.inner.active);
        if let Some(&existing) = active.get(&key) {
            info!(
                operation_id = %existing,
                idempotency_key = %key,
                event = "operation_deduplicated"
            );
            return Ok(existing);
        }

        let id = OperationId::new(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let span = spans::operation(id, intent.kind(), source, intent.destination_chain());
        let (tx, _) = watch::channel(OperationState::new(id, intent));
        let tx = Arc::new(tx);

        let mut operations = lock(&self.inner.operations);
        let task = tokio::spawn(self.inner.clone().drive(key, tx.clone()).instrument(span));
        operations.insert(
            id,
            Entry {
                key,
                state: tx,
                task: Some(task.abort_handle()),
            },
        );
        active.insert(key, id);
        prune_finished(&mut operations, self.inner.config.retained_operations);

        info!(
            operation_id = %id,
            idempotency_key = %key,
            event = "operation_started"
        );
        Ok(id)
    }

    /// Read-only snapshot of an operation.
    pub fn get_status(&self, id: OperationId) -> Result<OperationState> {
        let operations = lock(&self.inner.operations);
        let entry = operations
            .get(&id)
            .ok_or(FlashLoanError::OperationNotFound(id))?;
        let snapshot = entry.state.borrow().clone();
        Ok(snapshot)
    }

    /// Snapshot stream for an operation. The receiver starts at the current
    /// state and sees every later transition's latest value.
    pub fn subscribe(&self, id: OperationId) -> Result<watch::Receiver<OperationState>> {
        let operations = lock(&self.inner.operations);
        operations
            .get(&id)
            .map(|entry| entry.state.subscribe())
            .ok_or(FlashLoanError::OperationNotFound(id))
    }

    /// Resolves once the operation is terminal or abandoned.
    pub async fn wait_for_terminal(&self, id: OperationId) -> Result<OperationState> {
        let mut rx = self.subscribe(id)?;
        let state = rx
            .wait_for(|s| s.is_terminal() || s.is_abandoned())
            .await
            .map_err(|_| FlashLoanError::OperationNotFound(id))?;
        Ok(state.clone())
    }

    /// Starts `intent` and waits for its outcome.
    ///
    /// Returns the terminal snapshot whether it `Succeeded` or `Failed`; only
    /// errors that prevent the operation from starting are returned as `Err`.
    pub async fn run_operation(&self, intent: Intent) -> Result<OperationState> {
        let id = self.start_operation(intent)?;
        self.wait_for_terminal(id).await
    }

    /// Stops local polling for an operation.
    ///
    /// A transaction already handed to the network is not revocable and may
    /// still land; the snapshot keeps its last status and is marked abandoned.
    /// Abandoning a terminal operation does nothing.
    pub fn abandon(&self, id: OperationId) -> Result<OperationState> {
        let (key, snapshot) = {
            let mut operations = lock(&self.inner.operations);
            let entry = operations
                .get_mut(&id)
                .ok_or(FlashLoanError::OperationNotFound(id))?;

            if let Some(task) = entry.task.take() {
                task.abort();
            }
            entry.state.send_if_modified(|s| {
                let was = s.is_abandoned();
                s.mark_abandoned();
                was != s.is_abandoned()
            });
            let snapshot = entry.state.borrow().clone();
            (entry.key, snapshot)
        };

        self.inner.release(key, id);
        if snapshot.is_abandoned() {
            warn!(
                operation_id = %id,
                status = %snapshot.overall_status(),
                event = "operation_abandoned"
            );
        }
        Ok(snapshot)
    }

    /// Drops the snapshot of a finished or abandoned operation.
    ///
    /// # Errors
    ///
    /// [`FlashLoanError::OperationNotFound`] for an unknown id and
    /// [`FlashLoanError::OperationInFlight`] while the operation still runs.
    pub fn forget(&self, id: OperationId) -> Result<OperationState> {
        let mut operations = lock(&self.inner.operations);
        let entry = operations
            .get(&id)
            .ok_or(FlashLoanError::OperationNotFound(id))?;
        if !entry.is_finished() {
            return Err(FlashLoanError::OperationInFlight(id));
        }

        let snapshot = entry.state.borrow().clone();
        operations.remove(&id);
        debug!(operation_id = %id, event = "operation_forgotten");
        Ok(snapshot)
    }

    /// Re-reads one fact, independent of any operation.
    pub async fn refresh_fact(
        &self,
        kind: FactKind,
        chain: Chain,
        address: Address,
    ) -> Result<DerivedFact> {
        self.inner
            .reconciler
            .refresh(FactKey::new(kind, chain, address))
            .await
    }

    /// Last known value of a fact, without a network read.
    pub fn fact(&self, kind: FactKind, chain: Chain, address: Address) -> Option<DerivedFact> {
        self.inner.reconciler.cached(FactKey::new(kind, chain, address))
    }

    fn check_capabilities(&self, intent: &Intent) -> Result<()> {
        let registry = &self.inner.registry;
        match intent.kind() {
            IntentKind::Mint => {
                registry.require(intent.source_chain(), Capability::Mint)?;
            }
            IntentKind::InitiateFlashLoan => {
                registry.require(intent.source_chain(), Capability::FlashLoanSource)?;
                if let Some(destination) = intent.destination_chain() {
                    registry.require(destination, Capability::FlashLoanDestination)?;
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.inner.config)
            .field("operations", &lock(&self.inner.operations).len())
            .finish_non_exhaustive()
    }
}

impl Inner {
    async fn drive(self: Arc<Self>, key: IdempotencyKey, state: Arc<watch::Sender<OperationState>>) {
        let id = state.borrow().id();

        if let Err(e) = self.run(&state).await {
            spans::record_error(&e);
            let failed = state.send_if_modified(|s| s.fail(&e));
            if failed {
                error!(
                    operation_id = %id,
                    error = %e,
                    error_kind = %e.kind(),
                    event = "operation_failed"
                );
            }
        }

        self.release(key, id);
    }

    async fn run(&self, state: &watch::Sender<OperationState>) -> Result<()> {
        let intent = state.borrow().intent().clone();
        let source = intent.source_chain();

        advance(state, OverallStatus::Submitting)?;
        let pending = self
            .submitter
            .submit(&intent, self.signer.clone(), source)
            .await?;
        state.send_modify(|s| s.push_step(pending.clone()));
        advance(state, OverallStatus::AwaitingSourceConfirm)?;

        let receipt = match self.tracker.await_finality(&pending).await {
            Ok(receipt) => {
                self.submitter
                    .resolve(pending.intent_key(), StepStatus::Confirmed)
                    .await;
                state.send_modify(|s| s.set_step_status(receipt.tx_hash, StepStatus::Confirmed));
                receipt
            }
            Err(e @ FlashLoanError::ExecutionReverted { .. }) => {
                self.submitter
                    .resolve(pending.intent_key(), StepStatus::Failed)
                    .await;
                state.send_modify(|s| s.set_step_status(pending.tx_hash(), StepStatus::Failed));
                return Err(e);
            }
            // Outcome unknown: the submission stays outstanding.
            Err(e) => return Err(e),
        };

        match intent.kind() {
            IntentKind::Mint => {
                self.refresh_best_effort(FactKey::new(
                    FactKind::Balance,
                    source,
                    intent.target_address(),
                ))
                .await;
            }
            IntentKind::InitiateFlashLoan => {
                advance(state, OverallStatus::AwaitingDestinationEffect)?;
                let Some(destination) = intent.destination_chain() else {
                    return Err(FlashLoanError::InvalidIntent(
                        "flash loan without a destination chain".to_string(),
                    ));
                };
                self.observe_destination(&intent, destination, &receipt)
                    .await?;

                let target = intent.target_address();
                for kind in [FactKind::TargetValue, FactKind::Balance] {
                    self.refresh_best_effort(FactKey::new(kind, destination, target))
                        .await;
                }
            }
        }

        advance(state, OverallStatus::Succeeded)
    }

    /// Polls the destination until every message the source transaction sent
    /// there has been relayed, and the target reports the expected value if
    /// the intent names one.
    ///
    /// Relay status is keyed by message hash, which includes the messenger
    /// nonce, so a repeat of an earlier loan is never mistaken for delivered
    /// and a value left behind by an earlier loan is never mistaken for this
    /// one's effect.
    async fn observe_destination(
        &self,
        intent: &Intent,
        destination: Chain,
        receipt: &ConfirmedReceipt,
    ) -> Result<()> {
        let messenger = self.deployment.messenger();
        let messages =
            CrossChainMessage::sent_to(receipt.chain, destination, messenger, &receipt.logs);
        if messages.is_empty() {
            return Err(FlashLoanError::Provider(format!(
                "transaction {} sent no message to chain {destination}",
                receipt.tx_hash
            )));
        }

        let mut unrelayed: Vec<FactKey> = messages
            .iter()
            .map(|message| FactKey::message_relayed(destination, messenger, message.hash()))
            .collect();
        let target = FactKey::new(FactKind::TargetValue, destination, intent.target_address());
        let expected = intent.expected_target_value();
        let config = self.config.destination;
        let span = spans::observe_destination(destination, target.address, expected, messages.len());

        async move {
            let started = self.clock.now();
            let mut polls: u32 = 0;

            loop {
                polls += 1;
                match self.poll_destination(&mut unrelayed, target, expected).await {
                    Ok(true) => {
                        info!(polls = polls, event = "destination_effect_observed");
                        return Ok(());
                    }
                    Ok(false) => {
                        debug!(unrelayed = unrelayed.len(), event = "destination_effect_pending");
                    }
                    Err(e) if e.is_retryable() => {
                        warn!(error = %e, polls = polls, event = "destination_read_failed");
                    }
                    Err(e) => return Err(e),
                }

                let elapsed = self.clock.now().saturating_duration_since(started);
                if elapsed >= config.max_wait {
                    let awaiting = if unrelayed.is_empty() {
                        format!("target value of {}", target.address)
                    } else {
                        format!("relay of {} message(s)", unrelayed.len())
                    };
                    let err = FlashLoanError::ConfirmationTimeout {
                        chain: destination,
                        awaiting,
                        waited: elapsed,
                    };
                    spans::record_error_with_context(
                        err.kind().as_str(),
                        &err.to_string(),
                        Some("The source transaction is confirmed; the relayer may still deliver"),
                    );
                    return Err(err);
                }
                self.clock
                    .sleep(config.poll_interval.min(config.max_wait - elapsed))
                    .await;
            }
        }
        .instrument(span)
        .await
    }

    /// One destination poll. Relayed messages drop out of `unrelayed`.
    async fn poll_destination(
        &self,
        unrelayed: &mut Vec<FactKey>,
        target: FactKey,
        expected: Option<U256>,
    ) -> Result<bool> {
        let mut still_pending = Vec::with_capacity(unrelayed.len());
        for key in unrelayed.iter().copied() {
            if self.reconciler.refresh(key).await?.value().is_zero() {
                still_pending.push(key);
            }
        }
        *unrelayed = still_pending;
        if !unrelayed.is_empty() {
            return Ok(false);
        }

        match expected {
            Some(expected) => {
                let value = self.reconciler.refresh(target).await?.value();
                debug!(value = %value, expected = %expected, event = "target_value_checked");
                Ok(value == expected)
            }
            None => Ok(true),
        }
    }

    async fn refresh_best_effort(&self, key: FactKey) {
        if let Err(e) = self.reconciler.refresh(key).await {
            warn!(fact = %key, error = %e, event = "post_operation_refresh_failed");
        }
    }

    fn release(&self, key: IdempotencyKey, id: OperationId) {
        let mut active = lock(&self.active);
        if active.get(&key) == Some(&id) {
            active.remove(&key);
        }
    }
}

/// Drops the oldest finished operations beyond `retain`.
fn prune_finished(operations: &mut HashMap<OperationId, Entry>, retain: usize) {
    let mut finished: Vec<OperationId> = operations
        .iter()
        .filter(|(_, entry)| entry.is_finished())
        .map(|(id, _)| *id)
        .collect();
    if finished.len() <= retain {
        return;
    }

    finished.sort_unstable();
    let excess = finished.len() - retain;
    for id in &finished[..excess] {
        operations.remove(id);
    }
    debug!(dropped = excess, event = "finished_operations_pruned");
}

fn advance(state: &watch::Sender<OperationState>, next: OverallStatus) -> Result<()> {
    let mut outcome = Ok(());
    state.send_if_modified(|s| match s.advance(next) {
        Ok(()) => true,
        Err(e) => {
            outcome = Err(e);
            false
        }
    });

    match outcome {
        Ok(()) => {
            info!(status = %next, event = "operation_status_changed");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Locks `mutex`, recovering the data if a panicking thread poisoned it. None
/// of the guarded maps can be left half-updated by a panic.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
