// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0
//! Idempotent transaction submission.
//!
//! Every submission is keyed by an [`IdempotencyKey`]. The key owns a slot
//! guarded by an async mutex; whoever holds the slot is the only task allowed
//! to dispatch for that key, and everyone queued behind it observes the
//! [`PendingOperation`] it recorded instead of dispatching again.
//!
//! Dispatch itself runs on a spawned task. Dropping or aborting the caller
//! therefore never loses track of a transaction that reached the network.
//!
//! # Retention
//!
//! A slot is released by [`Submitter::resolve`] once its transaction is
//! confirmed or reverted. A slot whose outcome stays unknown (a confirmation
//! timeout, an abandoned operation, exhausted broadcast retries) is kept for
//! the life of the submitter so a later submit re-attaches to it instead of
//! sending again; nothing evicts it. Nonce lanes are kept per
//! `(chain, signer)` pair and so are bounded by the registry and the signers
//! in use.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use alloy_chains::Chain;
use alloy_primitives::{Address, Bytes, TxHash};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn, Instrument};

use super::config::RetryConfig;
use crate::chain::Deployment;
use crate::encoder;
use crate::error::{FlashLoanError, Result};
use crate::protocol::{CallRequest, IdempotencyKey, Intent, PendingOperation, StepStatus};
use crate::spans;
use crate::traits::{CallSigner, ChainConnector, Clock};

/// What a key's slot remembers between submit calls.
#[derive(Debug, Default)]
struct Slot {
    /// Signed bytes whose broadcast outcome is unknown. A later submit for the
    /// same key re-broadcasts these instead of signing a new transaction.
    signed: Option<(Bytes, TxHash)>,
    /// Set once a broadcast succeeded; cleared by [`Submitter::resolve`].
    pending: Option<PendingOperation>,
}

type SlotHandle = Arc<AsyncMutex<Slot>>;

/// Sends signed calls and guarantees at most one outstanding dispatch per
/// idempotency key.
#[derive(Clone)]
pub struct Submitter {
    connector: Arc<dyn ChainConnector>,
    clock: Arc<dyn Clock>,
    deployment: Deployment,
    retry: RetryConfig,
    slots: Arc<Mutex<HashMap<IdempotencyKey, SlotHandle>>>,
    /// Nonces are assigned per sender and chain, so dispatches on the same
    /// lane must not interleave between prepare and broadcast.
    lanes: Arc<Mutex<HashMap<(Chain, Address), Arc<AsyncMutex<()>>>>>,
}

impl Submitter {
    pub fn new(
        connector: Arc<dyn ChainConnector>,
        clock: Arc<dyn Clock>,
        deployment: Deployment,
        retry: RetryConfig,
    ) -> Self {
        Self {
            connector,
            clock,
            deployment,
            retry,
            slots: Arc::new(Mutex::new(HashMap::new())),
            lanes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Submits `intent` on `chain` from `signer`.
    ///
    /// Returns the already recorded [`PendingOperation`] without touching the
    /// network if one is outstanding for the same key.
    ///
    /// # Errors
    ///
    /// - [`FlashLoanError::Encoding`] if the intent cannot be encoded
    /// - [`FlashLoanError::SubmissionRejected`] if the chain refused the call
    /// - [`FlashLoanError::NetworkUnavailable`] once transient retries are
    ///   exhausted. Calling `submit` again with the same intent is safe.
    pub async fn submit(
        &self,
        intent: &Intent,
        signer: Arc<dyn CallSigner>,
        chain: Chain,
    ) -> Result<PendingOperation> {
        if chain != intent.source_chain() {
            return Err(FlashLoanError::InvalidIntent(format!(
                "intent originates on {} but was submitted to {chain}",
                intent.source_chain()
            )));
        }

        let from = signer.address();
        let key = IdempotencyKey::derive(intent, chain, from);
        let call = encoder::call_for_intent(&self.deployment, intent, from)?;
        let span = spans::submit(key, chain, from);

        let this = self.clone();
        let slot = self.slot(key);
        let task = tokio::spawn(
            async move {
                let mut slot = slot.lock_owned().await;
                if let Some(existing) = slot.pending.clone() {
                    info!(
                        tx_hash = %existing.tx_hash(),
                        event = "submission_deduplicated"
                    );
                    return Ok(existing);
                }

                let result = this.dispatch(key, call, signer, &mut slot).await;
                if let Err(ref e) = result {
                    spans::record_error(e);
                }
                result
            }
            .instrument(span),
        );

        task.await
            .map_err(|e| FlashLoanError::Provider(format!("submission task failed: {e}")))?
    }

    /// The outstanding submission for `key`, if any.
    pub async fn pending(&self, key: IdempotencyKey) -> Option<PendingOperation> {
        let slot = self.slots.lock().ok()?.get(&key).cloned()?;
        let slot = slot.lock().await;
        slot.pending.clone()
    }

    /// Releases `key` once the orchestrator settled the step's outcome. A later
    /// submit of the same intent is a new action and dispatches again.
    pub async fn resolve(&self, key: IdempotencyKey, status: StepStatus) {
        let Some(slot) = self.slots.lock().ok().and_then(|s| s.get(&key).cloned()) else {
            return;
        };

        {
            let mut slot = slot.lock().await;
            if let Some(pending) = slot.pending.take() {
                debug!(
                    idempotency_key = %key,
                    tx_hash = %pending.tx_hash(),
                    status = ?status,
                    event = "submission_resolved"
                );
            }
            slot.signed = None;
        }
        drop(slot);

        // Only the map still referencing the slot means nobody is queued on it.
        if let Ok(mut slots) = self.slots.lock() {
            if slots.get(&key).is_some_and(|s| Arc::strong_count(s) == 1) {
                slots.remove(&key);
            }
        }
    }

    fn slot(&self, key: IdempotencyKey) -> SlotHandle {
        match self.slots.lock() {
            Ok(mut slots) => slots.entry(key).or_default().clone(),
            Err(poisoned) => poisoned.into_inner().entry(key).or_default().clone(),
        }
    }

    fn lane(&self, chain: Chain, from: Address) -> Arc<AsyncMutex<()>> {
        match self.lanes.lock() {
            Ok(mut lanes) => lanes.entry((chain, from)).or_default().clone(),
            Err(poisoned) => poisoned.into_inner().entry((chain, from)).or_default().clone(),
        }
    }

    async fn dispatch(
        &self,
        key: IdempotencyKey,
        call: CallRequest,
        signer: Arc<dyn CallSigner>,
        slot: &mut Slot,
    ) -> Result<PendingOperation> {
        let chain = call.chain;
        let lane = self.lane(chain, call.from);
        let _lane = lane.lock().await;

        let (payload, expected_hash) = match slot.signed.clone() {
            Some(signed) => {
                info!(
                    tx_hash = %signed.1,
                    event = "rebroadcasting_signed_transaction"
                );
                signed
            }
            None => {
                let connector = &self.connector;
                let request = self
                    .with_retry(chain, || connector.prepare_call(&call))
                    .await?;
                let payload = signer.sign(request).await?;
                let hash = alloy_primitives::keccak256(&payload);
                slot.signed = Some((payload.clone(), hash));
                (payload, hash)
            }
        };

        let connector = &self.connector;
        let sent = self
            .with_retry(chain, || connector.send_signed(chain, payload.clone()))
            .await;

        let tx_hash = match sent {
            Ok(tx_hash) => tx_hash,
            Err(e) => {
                // A definitive refusal means these bytes will never land.
                if !e.is_retryable() {
                    slot.signed = None;
                }
                return Err(e);
            }
        };

        if tx_hash != expected_hash {
            warn!(
                expected = %expected_hash,
                reported = %tx_hash,
                event = "tx_hash_mismatch"
            );
        }

        tracing::Span::current().record("tx_hash", tracing::field::display(tx_hash));
        info!(
            tx_hash = %tx_hash,
            chain = %chain,
            event = "transaction_submitted"
        );

        let pending = PendingOperation::submitted(key, tx_hash, chain, self.clock.now());
        slot.signed = None;
        slot.pending = Some(pending.clone());
        Ok(pending)
    }

    /// Runs `op` until it succeeds, fails with a non-transient error, or the
    /// attempt budget is spent.
    async fn with_retry<T, F, Fut>(&self, chain: Chain, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let result = op()
                .instrument(spans::dispatch_attempt(chain, attempt, max_attempts))
                .await;

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let backoff = self.retry.backoff_for(attempt);
                    warn!(
                        error = %e,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        event = "dispatch_retry_scheduled"
                    );
                    self.clock.sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_retryable() {
                        error!(
                            error = %e,
                            attempts = attempt,
                            event = "dispatch_retries_exhausted"
                        );
                    } else {
                        error!(error = %e, event = "dispatch_failed");
                    }
                    return Err(e);
                }
            }
        }
    }
}

impl std::fmt::Debug for Submitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Submitter")
            .field("deployment", &self.deployment)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeChain, FakeClock, FakeSigner};
    use alloy_primitives::U256;
    use std::time::Duration;

    fn a() -> Chain {
        Chain::from_id(901)
    }

    fn submitter(chain: &FakeChain, clock: &FakeClock) -> Submitter {
        Submitter::new(
            Arc::new(chain.clone()),
            Arc::new(clock.clone()),
            Deployment::supersim(),
            RetryConfig::default(),
        )
    }

    fn mint() -> Intent {
        Deployment::supersim().mint_to_bridge(a(), U256::from(1_000u64))
    }

    #[tokio::test]
    async fn test_second_submit_returns_existing_operation() {
        let chain = FakeChain::new();
        let clock = FakeClock::new();
        let submitter = submitter(&chain, &clock);
        let signer: Arc<dyn CallSigner> = Arc::new(FakeSigner::new());

        let first = submitter.submit(&mint(), signer.clone(), a()).await.unwrap();
        let second = submitter.submit(&mint(), signer, a()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(chain.dispatch_count(), 1);
    }

    #[tokio::test]
    async fn test_resolve_allows_a_new_action() {
        let chain = FakeChain::new();
        let clock = FakeClock::new();
        let submitter = submitter(&chain, &clock);
        let signer: Arc<dyn CallSigner> = Arc::new(FakeSigner::new());

        let first = submitter.submit(&mint(), signer.clone(), a()).await.unwrap();
        submitter
            .resolve(first.intent_key(), StepStatus::Confirmed)
            .await;
        assert!(submitter.pending(first.intent_key()).await.is_none());

        submitter.submit(&mint(), signer, a()).await.unwrap();
        assert_eq!(chain.dispatch_count(), 2);
    }

    #[tokio::test]
    async fn test_transient_send_failures_rebroadcast_same_bytes() {
        let chain = FakeChain::new();
        chain.fail_sends(a(), 2);
        let clock = FakeClock::new();
        let submitter = submitter(&chain, &clock);
        let signer = FakeSigner::new();

        let pending = submitter
            .submit(&mint(), Arc::new(signer.clone()), a())
            .await
            .unwrap();

        assert_eq!(chain.send_attempts(), 3);
        assert_eq!(chain.dispatch_count(), 1);
        assert_eq!(signer.sign_count(), 1);
        assert_eq!(clock.total_sleep_time(), Duration::from_millis(1500));
        assert_eq!(pending.status(), StepStatus::Submitted);
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_network_unavailable() {
        let chain = FakeChain::new();
        chain.fail_sends(a(), 10);
        let clock = FakeClock::new();
        let submitter = submitter(&chain, &clock);
        let fake_signer = FakeSigner::new();
        let signer: Arc<dyn CallSigner> = Arc::new(fake_signer.clone());

        let err = submitter.submit(&mint(), signer.clone(), a()).await.unwrap_err();
        assert!(matches!(err, FlashLoanError::NetworkUnavailable { .. }));
        assert_eq!(chain.send_attempts(), 3);
        assert_eq!(chain.dispatch_count(), 0);

        // The caller retries the whole submit; the same signed bytes go out.
        chain.fail_sends(a(), 0);
        submitter.submit(&mint(), signer, a()).await.unwrap();
        assert_eq!(fake_signer.sign_count(), 1);
        assert_eq!(chain.dispatch_count(), 1);
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let chain = FakeChain::new();
        chain.reject_calls(a(), "execution reverted: insufficient balance");
        let clock = FakeClock::new();
        let submitter = submitter(&chain, &clock);

        let err = submitter
            .submit(&mint(), Arc::new(FakeSigner::new()), a())
            .await
            .unwrap_err();

        assert!(matches!(err, FlashLoanError::SubmissionRejected { .. }));
        assert_eq!(clock.sleep_count(), 0);
        assert_eq!(chain.dispatch_count(), 0);
    }

    #[tokio::test]
    async fn test_wrong_chain_is_invalid_intent() {
        let chain = FakeChain::new();
        let clock = FakeClock::new();
        let submitter = submitter(&chain, &clock);

        let err = submitter
            .submit(&mint(), Arc::new(FakeSigner::new()), Chain::from_id(902))
            .await
            .unwrap_err();
        assert!(matches!(err, FlashLoanError::InvalidIntent(_)));
    }
}
