// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0
//! Confirmation tracking with bounded exponential backoff.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn, Instrument};

use super::config::TrackingConfig;
use crate::chain::ChainRegistry;
use crate::error::{FlashLoanError, Result};
use crate::protocol::{ChainReceipt, ConfirmedReceipt, PendingOperation};
use crate::spans;
use crate::traits::{ChainConnector, Clock};

/// Outcome of a single poll.
enum Poll {
    Pending,
    Included { receipt: ChainReceipt, block_number: u64, confirmations: u64 },
}

/// Waits for dispatched transactions to reach their chain's confirmation depth.
///
/// Tracking never resubmits. A [`FlashLoanError::ConfirmationTimeout`] leaves
/// the pending operation exactly as it was so the caller can track it again.
#[derive(Clone)]
pub struct ConfirmationTracker {
    connector: Arc<dyn ChainConnector>,
    clock: Arc<dyn Clock>,
    registry: Arc<ChainRegistry>,
    config: TrackingConfig,
}

impl ConfirmationTracker {
    pub fn new(
        connector: Arc<dyn ChainConnector>,
        clock: Arc<dyn Clock>,
        registry: Arc<ChainRegistry>,
        config: TrackingConfig,
    ) -> Self {
        Self {
            connector,
            clock,
            registry,
            config,
        }
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    /// Suspends until `pending` is final on its chain.
    ///
    /// # Errors
    ///
    /// - [`FlashLoanError::ExecutionReverted`] if the transaction was included
    ///   but reverted
    /// - [`FlashLoanError::ConfirmationTimeout`] once `max_wait` elapses
    /// - [`FlashLoanError::ChainNotSupported`] for an unregistered chain
    pub async fn await_finality(&self, pending: &PendingOperation) -> Result<ConfirmedReceipt> {
        let chain = pending.chain();
        let required = self.registry.get(chain)?.confirmations();
        let span = spans::await_finality(pending.tx_hash(), chain, required, self.config.max_wait);

        let result = self.track(pending, required).instrument(span.clone()).await;
        if let Err(ref e) = result {
            let _guard = span.enter();
            spans::record_error(e);
        }
        result
    }

    async fn track(&self, pending: &PendingOperation, required: u64) -> Result<ConfirmedReceipt> {
        let chain = pending.chain();
        let tx_hash = pending.tx_hash();
        let started = self.clock.now();
        let mut interval = self.config.initial_interval;
        let mut attempt: u32 = 0;

        info!(
            required_confirmations = required,
            event = "finality_tracking_started"
        );

        loop {
            attempt += 1;
            let poll = self
                .poll(pending, required)
                .instrument(spans::poll_receipt(tx_hash, chain, attempt))
                .await;

            match poll {
                Ok(Poll::Included {
                    receipt,
                    block_number,
                    confirmations,
                }) if confirmations >= required => {
                    if !receipt.success {
                        error!(
                            block_number = block_number,
                            attempts = attempt,
                            event = "transaction_reverted"
                        );
                        return Err(FlashLoanError::ExecutionReverted { chain, tx_hash });
                    }

                    info!(
                        block_number = block_number,
                        confirmations = confirmations,
                        attempts = attempt,
                        elapsed_ms = self.elapsed(started).as_millis() as u64,
                        event = "transaction_confirmed"
                    );
                    return Ok(ConfirmedReceipt {
                        chain,
                        tx_hash,
                        block_number,
                        confirmations,
                        logs: receipt.logs,
                    });
                }
                Ok(Poll::Included { confirmations, .. }) => {
                    debug!(
                        confirmations = confirmations,
                        required = required,
                        event = "awaiting_confirmations"
                    );
                }
                Ok(Poll::Pending) => debug!(event = "receipt_pending"),
                // Read failures while waiting count as a miss; the bound still applies.
                Err(e) if e.is_retryable() => {
                    warn!(error = %e, attempt = attempt, event = "receipt_poll_failed");
                }
                Err(e) => return Err(e),
            }

            let elapsed = self.elapsed(started);
            if elapsed >= self.config.max_wait {
                error!(
                    attempts = attempt,
                    waited_ms = elapsed.as_millis() as u64,
                    event = "confirmation_timeout"
                );
                return Err(FlashLoanError::ConfirmationTimeout {
                    chain,
                    awaiting: format!("transaction {tx_hash}"),
                    waited: elapsed,
                });
            }

            let remaining = self.config.max_wait - elapsed;
            self.clock.sleep(interval.min(remaining)).await;
            interval = self.config.next_interval(interval);
        }
    }

    async fn poll(&self, pending: &PendingOperation, required: u64) -> Result<Poll> {
        let chain = pending.chain();
        let Some(receipt) = self.connector.get_receipt(chain, pending.tx_hash()).await? else {
            return Ok(Poll::Pending);
        };
        let Some(block_number) = receipt.block_number else {
            return Ok(Poll::Pending);
        };

        let confirmations = if required <= 1 {
            1
        } else {
            let head = self.connector.block_number(chain).await?;
            head.saturating_sub(block_number).saturating_add(1)
        };

        Ok(Poll::Included {
            receipt,
            block_number,
            confirmations,
        })
    }

    fn elapsed(&self, since: Instant) -> Duration {
        self.clock.now().saturating_duration_since(since)
    }
}

impl std::fmt::Debug for ConfirmationTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfirmationTracker")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ChainDescriptor, Deployment};
    use crate::orchestrator::{RetryConfig, Submitter};
    use crate::testing::{FakeChain, FakeClock, FakeSigner};
    use alloy_chains::Chain;
    use alloy_primitives::U256;
    use rstest::rstest;

    fn a() -> Chain {
        Chain::from_id(901)
    }

    struct Harness {
        chain: FakeChain,
        clock: FakeClock,
        tracker: ConfirmationTracker,
        pending: PendingOperation,
    }

    fn tracking() -> TrackingConfig {
        TrackingConfig::default()
            .with_initial_interval(Duration::from_secs(1))
            .with_max_interval(Duration::from_secs(8))
            .with_max_wait(Duration::from_secs(30))
    }

    async fn harness(confirmations: u64) -> Harness {
        let chain = FakeChain::new();
        let clock = FakeClock::new();
        let registry = ChainRegistry::new(vec![ChainDescriptor::builder()
            .id(a())
            .endpoint("http://127.0.0.1:9545".parse().unwrap())
            .display_name("OPChainA")
            .confirmations(confirmations)
            .build()])
        .unwrap();

        let submitter = Submitter::new(
            Arc::new(chain.clone()),
            Arc::new(clock.clone()),
            Deployment::supersim(),
            RetryConfig::default(),
        );
        let intent = Deployment::supersim().mint_to_bridge(a(), U256::from(1u64));
        let pending = submitter
            .submit(&intent, Arc::new(FakeSigner::new()), a())
            .await
            .unwrap();

        let tracker = ConfirmationTracker::new(
            Arc::new(chain.clone()),
            Arc::new(clock.clone()),
            Arc::new(registry),
            tracking(),
        );
        Harness {
            chain,
            clock,
            tracker,
            pending,
        }
    }

    // Polls land at t = 0, 1, 3, 7, 15, 23 and 30 seconds.
    #[rstest]
    #[case(1)]
    #[case(4)]
    #[case(7)]
    #[tokio::test]
    async fn test_confirms_within_bound(#[case] polls: usize) {
        let h = harness(1).await;
        h.chain.include_after_polls(h.pending.tx_hash(), polls);

        let receipt = h.tracker.await_finality(&h.pending).await.unwrap();

        assert_eq!(receipt.tx_hash, h.pending.tx_hash());
        assert_eq!(h.chain.receipt_polls(h.pending.tx_hash()), polls);
        assert!(h.clock.total_sleep_time() <= Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_times_out_without_resubmitting() {
        let h = harness(1).await;
        h.chain.include_after_polls(h.pending.tx_hash(), 8);

        let err = h.tracker.await_finality(&h.pending).await.unwrap_err();

        assert!(matches!(err, FlashLoanError::ConfirmationTimeout { .. }));
        assert_eq!(h.chain.receipt_polls(h.pending.tx_hash()), 7);
        assert_eq!(h.clock.total_sleep_time(), Duration::from_secs(30));
        assert_eq!(h.chain.dispatch_count(), 1);
    }

    #[tokio::test]
    async fn test_backoff_schedule() {
        let h = harness(1).await;
        h.chain.include_after_polls(h.pending.tx_hash(), 100);

        let _ = h.tracker.await_finality(&h.pending).await;

        let secs: Vec<u64> = h.clock.sleep_log().iter().map(Duration::as_secs).collect();
        assert_eq!(secs, vec![1, 2, 4, 8, 8, 7]);
    }

    #[tokio::test]
    async fn test_reverted_receipt_is_execution_reverted() {
        let h = harness(1).await;
        h.chain.include_after_polls(h.pending.tx_hash(), 2);
        h.chain.revert_transaction(h.pending.tx_hash());

        let err = h.tracker.await_finality(&h.pending).await.unwrap_err();
        assert!(matches!(
            err,
            FlashLoanError::ExecutionReverted { tx_hash, .. } if tx_hash == h.pending.tx_hash()
        ));
    }

    #[tokio::test]
    async fn test_waits_for_confirmation_depth() {
        let h = harness(3).await;
        h.chain.include_after_polls(h.pending.tx_hash(), 1);

        let receipt = h.tracker.await_finality(&h.pending).await.unwrap();
        assert!(receipt.confirmations >= 3);
        assert!(h.chain.receipt_polls(h.pending.tx_hash()) > 1);
    }

    #[tokio::test]
    async fn test_transient_read_failures_are_tolerated() {
        let h = harness(1).await;
        h.chain.include_after_polls(h.pending.tx_hash(), 1);
        h.chain.fail_receipts(a(), 2);

        let receipt = h.tracker.await_finality(&h.pending).await.unwrap();
        assert_eq!(receipt.tx_hash, h.pending.tx_hash());
        assert_eq!(h.clock.sleep_count(), 2);
    }
}
