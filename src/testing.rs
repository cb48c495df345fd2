// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0
//! Test utilities and fake implementations of the collaborator traits
//!
//! These fakes let the orchestrator be exercised end to end, including the
//! failure modes that matter for exactly-once submission, without a running
//! chain:
//!
//! - [`FakeChain`]: any number of chains behind one [`ChainConnector`], with
//!   scripted rejections, dropped connections, slow inclusion and reverts.
//!   Confirmed mints credit balances and confirmed flash loans emit a
//!   `SentMessage` log whose relay sets the destination target value, so
//!   reads observe the effects of writes.
//! - [`FakeSigner`]: deterministic "signatures" the fake chain can decode.
//! - [`FakeClock`]: fast-forwarding time for polling loops and timeouts.

use alloy_chains::Chain;
use alloy_primitives::{keccak256, Address, Bytes, Log, TxHash, B256, U256};
use alloy_network::TransactionBuilder;
use alloy_rpc_types::TransactionRequest;
use alloy_sol_types::{SolCall, SolEvent, SolValue};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;

use crate::chain::addresses::L2_TO_L2_CROSS_DOMAIN_MESSENGER_ADDRESS;
use crate::contracts::{
    CrosschainFlashLoanBridge, CrosschainFlashLoanToken, L2ToL2CrossDomainMessenger, TargetContract,
};
use crate::error::{FlashLoanError, Result};
use crate::protocol::{CallRequest, ChainReceipt, CrossChainMessage};
use crate::traits::{CallSigner, ChainConnector, Clock};

/// What [`FakeSigner`] produces and [`FakeChain`] accepts:
/// `(chain_id, from, to, value, input, nonce)`.
type FakeEnvelope = (u64, Address, Address, U256, Bytes, u64);

const GENESIS_BLOCK: u64 = 100;

// ============================================================================
// Fake Chain
// ============================================================================

#[derive(Debug)]
struct FakeTx {
    chain: Chain,
    to: Address,
    input: Bytes,
    polls: usize,
    block_number: Option<u64>,
    success: bool,
    logs: Vec<Log>,
}

/// A relayed flash loan waiting for the destination to accept it.
#[derive(Debug)]
struct Delivery {
    destination: Chain,
    message: B256,
    target: Address,
    value: U256,
}

#[derive(Debug)]
struct ChainState {
    txs: HashMap<TxHash, FakeTx>,
    nonces: HashMap<(Chain, Address), u64>,
    heads: HashMap<Chain, u64>,
    rejections: HashMap<Chain, String>,
    send_failures: HashMap<Chain, usize>,
    lost_responses: HashMap<Chain, usize>,
    receipt_failures: HashMap<Chain, usize>,
    read_failures: HashMap<Chain, usize>,
    include_after: HashMap<TxHash, usize>,
    default_include_after: usize,
    reverted: HashSet<TxHash>,
    revert_flash_loans: bool,
    destination_frozen: bool,
    flash_loan_effect: Option<U256>,
    balances: HashMap<(Chain, Address), U256>,
    target_values: HashMap<(Chain, Address), U256>,
    message_nonces: HashMap<Chain, u64>,
    relayed: HashSet<(Chain, B256)>,
    undelivered: Vec<Delivery>,
    send_attempts: usize,
    dispatches: usize,
    reads: usize,
}

impl Default for ChainState {
    fn default() -> Self {
        Self {
            txs: HashMap::new(),
            nonces: HashMap::new(),
            heads: HashMap::new(),
            rejections: HashMap::new(),
            send_failures: HashMap::new(),
            lost_responses: HashMap::new(),
            receipt_failures: HashMap::new(),
            read_failures: HashMap::new(),
            include_after: HashMap::new(),
            default_include_after: 1,
            reverted: HashSet::new(),
            revert_flash_loans: false,
            destination_frozen: false,
            flash_loan_effect: None,
            balances: HashMap::new(),
            target_values: HashMap::new(),
            message_nonces: HashMap::new(),
            relayed: HashSet::new(),
            undelivered: Vec::new(),
            send_attempts: 0,
            dispatches: 0,
            reads: 0,
        }
    }
}

/// Takes one scripted failure for `chain`, if any are left.
fn take_failure(failures: &mut HashMap<Chain, usize>, chain: Chain) -> bool {
    match failures.get_mut(&chain) {
        Some(remaining) if *remaining > 0 => {
            *remaining -= 1;
            true
        }
        _ => false,
    }
}

fn unavailable(chain: Chain) -> FlashLoanError {
    FlashLoanError::NetworkUnavailable {
        chain,
        reason: "simulated connection reset".to_string(),
    }
}

/// An in-memory stand-in for every chain the orchestrator talks to.
///
/// Transactions are included on their Nth receipt poll (1 by default) and
/// take effect at that moment:
/// - `mint(to, amount)` credits `to`'s token balance on the same chain
/// - `initiateCrosschainFlashLoan(dest, amount, target, data)` emits a
///   `SentMessage` log with a fresh messenger nonce. Unless the destination is
///   frozen the message is relayed at once: the destination messenger records
///   its hash and the target's `getValue()` on `dest` becomes `amount` (or the
///   configured effect).
#[derive(Clone, Debug)]
pub struct FakeChain {
    state: Arc<Mutex<ChainState>>,
    reads_open: Arc<watch::Sender<bool>>,
}

impl Default for FakeChain {
    fn default() -> Self {
        Self {
            state: Arc::default(),
            reads_open: Arc::new(watch::Sender::new(true)),
        }
    }
}

impl FakeChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park every `read_call` until [`FakeChain::release_reads`].
    pub fn hold_reads(&self) {
        self.reads_open.send_replace(false);
    }

    pub fn release_reads(&self) {
        self.reads_open.send_replace(true);
    }

    /// Make `prepare_call` on `chain` fail with `SubmissionRejected`.
    pub fn reject_calls(&self, chain: Chain, reason: &str) {
        self.state
            .lock()
            .unwrap()
            .rejections
            .insert(chain, reason.to_string());
    }

    pub fn accept_calls(&self, chain: Chain) {
        self.state.lock().unwrap().rejections.remove(&chain);
    }

    /// The next `count` broadcasts on `chain` fail before reaching the node.
    pub fn fail_sends(&self, chain: Chain, count: usize) {
        self.state.lock().unwrap().send_failures.insert(chain, count);
    }

    /// The next `count` broadcasts on `chain` are accepted but the response
    /// is lost, so the caller sees a network error.
    pub fn lose_send_responses(&self, chain: Chain, count: usize) {
        self.state.lock().unwrap().lost_responses.insert(chain, count);
    }

    pub fn fail_receipts(&self, chain: Chain, count: usize) {
        self.state
            .lock()
            .unwrap()
            .receipt_failures
            .insert(chain, count);
    }

    pub fn fail_reads(&self, chain: Chain, count: usize) {
        self.state.lock().unwrap().read_failures.insert(chain, count);
    }

    /// Include `tx_hash` on its `polls`-th receipt poll.
    pub fn include_after_polls(&self, tx_hash: TxHash, polls: usize) {
        self.state
            .lock()
            .unwrap()
            .include_after
            .insert(tx_hash, polls);
    }

    /// Include every transaction without its own schedule on its `polls`-th
    /// receipt poll.
    pub fn set_default_include_after(&self, polls: usize) {
        self.state.lock().unwrap().default_include_after = polls;
    }

    pub fn revert_transaction(&self, tx_hash: TxHash) {
        self.state.lock().unwrap().reverted.insert(tx_hash);
    }

    /// Every flash-loan initiation reverts on inclusion.
    pub fn revert_flash_loans(&self, revert: bool) {
        self.state.lock().unwrap().revert_flash_loans = revert;
    }

    /// While frozen, confirmed flash loans are not relayed. Unfreezing
    /// relays everything that queued up.
    pub fn freeze_destination(&self, frozen: bool) {
        let mut state = self.state.lock().unwrap();
        state.destination_frozen = frozen;
        if !frozen {
            for delivery in std::mem::take(&mut state.undelivered) {
                state.deliver(delivery);
            }
        }
    }

    /// Record `message` as relayed on `chain` without any other effect.
    pub fn mark_relayed(&self, chain: Chain, message: B256) {
        self.state.lock().unwrap().relayed.insert((chain, message));
    }

    pub fn is_relayed(&self, chain: Chain, message: B256) -> bool {
        self.state.lock().unwrap().relayed.contains(&(chain, message))
    }

    /// The value the target reports after a delivered flash loan.
    pub fn set_flash_loan_effect(&self, value: U256) {
        self.state.lock().unwrap().flash_loan_effect = Some(value);
    }

    pub fn set_balance(&self, chain: Chain, account: Address, value: U256) {
        self.state
            .lock()
            .unwrap()
            .balances
            .insert((chain, account), value);
    }

    pub fn set_target_value(&self, chain: Chain, target: Address, value: U256) {
        self.state
            .lock()
            .unwrap()
            .target_values
            .insert((chain, target), value);
    }

    pub fn balance(&self, chain: Chain, account: Address) -> U256 {
        self.state
            .lock()
            .unwrap()
            .balances
            .get(&(chain, account))
            .copied()
            .unwrap_or_default()
    }

    pub fn target_value(&self, chain: Chain, target: Address) -> Option<U256> {
        self.state
            .lock()
            .unwrap()
            .target_values
            .get(&(chain, target))
            .copied()
    }

    /// Distinct transactions accepted by any chain.
    pub fn dispatch_count(&self) -> usize {
        self.state.lock().unwrap().dispatches
    }

    /// Every `send_signed` call, including failed and duplicate ones.
    pub fn send_attempts(&self) -> usize {
        self.state.lock().unwrap().send_attempts
    }

    pub fn read_count(&self) -> usize {
        self.state.lock().unwrap().reads
    }

    /// Successful receipt polls for `tx_hash`.
    pub fn receipt_polls(&self, tx_hash: TxHash) -> usize {
        self.state
            .lock()
            .unwrap()
            .txs
            .get(&tx_hash)
            .map(|tx| tx.polls)
            .unwrap_or(0)
    }
}

impl ChainState {
    fn head(&self, chain: Chain) -> u64 {
        self.heads.get(&chain).copied().unwrap_or(GENESIS_BLOCK)
    }

    /// Applies an included transaction and returns the logs it emitted.
    fn apply(&mut self, chain: Chain, to: Address, input: &Bytes) -> Vec<Log> {
        if let Ok(call) = CrosschainFlashLoanToken::mintCall::abi_decode(input) {
            *self.balances.entry((chain, call.to)).or_default() += call.amount;
            return Vec::new();
        }
        let Ok(call) = CrosschainFlashLoanBridge::initiateCrosschainFlashLoanCall::abi_decode(input)
        else {
            return Vec::new();
        };

        let nonce = self.message_nonces.entry(chain).or_default();
        let event = L2ToL2CrossDomainMessenger::SentMessage {
            destination: call.destinationChain,
            target: call.target,
            messageNonce: U256::from(*nonce),
            sender: to,
            message: input.clone(),
        };
        *nonce += 1;
        let log = Log {
            address: L2_TO_L2_CROSS_DOMAIN_MESSENGER_ADDRESS,
            data: event.encode_log_data(),
        };

        if let Some(message) =
            CrossChainMessage::from_log(chain, L2_TO_L2_CROSS_DOMAIN_MESSENGER_ADDRESS, &log)
        {
            let delivery = Delivery {
                destination: message.destination(),
                message: message.hash(),
                target: call.target,
                value: self.flash_loan_effect.unwrap_or(call.amount),
            };
            if self.destination_frozen {
                self.undelivered.push(delivery);
            } else {
                self.deliver(delivery);
            }
        }
        vec![log]
    }

    fn deliver(&mut self, delivery: Delivery) {
        self.relayed.insert((delivery.destination, delivery.message));
        self.target_values
            .insert((delivery.destination, delivery.target), delivery.value);
    }
}

#[async_trait]
impl ChainConnector for FakeChain {
    async fn prepare_call(&self, call: &CallRequest) -> Result<TransactionRequest> {
        let state = self.state.lock().unwrap();
        if let Some(reason) = state.rejections.get(&call.chain) {
            return Err(FlashLoanError::SubmissionRejected {
                chain: call.chain,
                reason: reason.clone(),
            });
        }
        let nonce = state
            .nonces
            .get(&(call.chain, call.from))
            .copied()
            .unwrap_or_default();

        Ok(TransactionRequest::default()
            .with_from(call.from)
            .with_to(call.to)
            .with_input(call.data.clone())
            .with_value(call.value)
            .with_chain_id(call.chain.id())
            .with_nonce(nonce))
    }

    async fn send_signed(&self, chain: Chain, payload: Bytes) -> Result<TxHash> {
        let mut state = self.state.lock().unwrap();
        state.send_attempts += 1;
        if take_failure(&mut state.send_failures, chain) {
            return Err(unavailable(chain));
        }

        let (_, from, to, _, input, nonce) = <FakeEnvelope as SolValue>::abi_decode(&payload)
            .map_err(|e| FlashLoanError::SubmissionRejected {
                chain,
                reason: format!("undecodable transaction: {e}"),
            })?;
        let tx_hash = keccak256(&payload);

        if !state.txs.contains_key(&tx_hash) {
            let expected = state.nonces.get(&(chain, from)).copied().unwrap_or_default();
            if nonce != expected {
                return Err(FlashLoanError::SubmissionRejected {
                    chain,
                    reason: format!("nonce too low: expected {expected}, got {nonce}"),
                });
            }
            state.nonces.insert((chain, from), expected + 1);
            state.dispatches += 1;

            let is_flash_loan = input.starts_with(
                &CrosschainFlashLoanBridge::initiateCrosschainFlashLoanCall::SELECTOR,
            );
            let success = !(state.reverted.contains(&tx_hash)
                || (state.revert_flash_loans && is_flash_loan));
            state.txs.insert(
                tx_hash,
                FakeTx {
                    chain,
                    to,
                    input,
                    polls: 0,
                    block_number: None,
                    success,
                    logs: Vec::new(),
                },
            );
        }

        if take_failure(&mut state.lost_responses, chain) {
            return Err(unavailable(chain));
        }
        Ok(tx_hash)
    }

    async fn get_receipt(&self, chain: Chain, tx_hash: TxHash) -> Result<Option<ChainReceipt>> {
        let mut state = self.state.lock().unwrap();
        if take_failure(&mut state.receipt_failures, chain) {
            return Err(unavailable(chain));
        }

        let required = state
            .include_after
            .get(&tx_hash)
            .copied()
            .unwrap_or(state.default_include_after);
        let reverted = state.reverted.contains(&tx_hash);
        let head = state.head(chain);

        let Some(tx) = state.txs.get_mut(&tx_hash).filter(|tx| tx.chain == chain) else {
            return Ok(None);
        };
        tx.polls += 1;
        if tx.polls < required {
            return Ok(None);
        }

        let newly_included = tx.block_number.is_none();
        if newly_included {
            tx.block_number = Some(head);
            tx.success &= !reverted;
        }
        let effect = (newly_included && tx.success).then(|| (tx.to, tx.input.clone()));

        if let Some((to, input)) = effect {
            let logs = state.apply(chain, to, &input);
            if let Some(tx) = state.txs.get_mut(&tx_hash) {
                tx.logs = logs;
            }
        }

        let Some(tx) = state.txs.get(&tx_hash) else {
            return Ok(None);
        };
        Ok(Some(ChainReceipt {
            tx_hash,
            block_number: tx.block_number,
            success: tx.success,
            logs: tx.logs.clone(),
        }))
    }

    async fn block_number(&self, chain: Chain) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        let head = state.head(chain) + 1;
        state.heads.insert(chain, head);
        Ok(head)
    }

    async fn read_call(&self, chain: Chain, to: Address, data: Bytes) -> Result<Bytes> {
        let mut gate = self.reads_open.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        let mut state = self.state.lock().unwrap();
        state.reads += 1;
        if take_failure(&mut state.read_failures, chain) {
            return Err(unavailable(chain));
        }

        let value = if let Ok(call) = CrosschainFlashLoanToken::balanceOfCall::abi_decode(&data) {
            state
                .balances
                .get(&(chain, call.account))
                .copied()
                .unwrap_or_default()
        } else if TargetContract::getValueCall::abi_decode(&data).is_ok() {
            state
                .target_values
                .get(&(chain, to))
                .copied()
                .unwrap_or_default()
        } else if let Ok(call) =
            L2ToL2CrossDomainMessenger::successfulMessagesCall::abi_decode(&data)
        {
            U256::from(state.relayed.contains(&(chain, call.msgHash)))
        } else {
            return Err(FlashLoanError::Provider(format!(
                "fake chain cannot answer call to {to}"
            )));
        };

        Ok(value.abi_encode().into())
    }
}

// ============================================================================
// Fake Signer
// ============================================================================

/// Produces a deterministic envelope of the request's fields instead of a
/// real signature.
#[derive(Clone, Debug)]
pub struct FakeSigner {
    address: Address,
    signs: Arc<AtomicUsize>,
}

impl Default for FakeSigner {
    fn default() -> Self {
        Self::with_address(Address::repeat_byte(0xa1))
    }
}

impl FakeSigner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_address(address: Address) -> Self {
        Self {
            address,
            signs: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn sign_count(&self) -> usize {
        self.signs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CallSigner for FakeSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign(&self, request: TransactionRequest) -> Result<Bytes> {
        self.signs.fetch_add(1, Ordering::SeqCst);

        let to = request
            .to
            .and_then(|kind| kind.to().copied())
            .ok_or_else(|| FlashLoanError::Provider("request has no recipient".to_string()))?;
        let envelope: FakeEnvelope = (
            request.chain_id.unwrap_or_default(),
            request.from.unwrap_or(self.address),
            to,
            request.value.unwrap_or_default(),
            request.input.input().cloned().unwrap_or_default(),
            request.nonce.unwrap_or_default(),
        );
        Ok(envelope.abi_encode().into())
    }
}

// ============================================================================
// Fake Clock
// ============================================================================

/// A fake clock that allows fast-forwarding time in tests.
///
/// Sleeping advances the clock instantly and yields to the scheduler, so
/// timeouts can be tested without actually waiting while other tasks still
/// get to run.
#[derive(Clone, Debug)]
pub struct FakeClock {
    current_time: Arc<Mutex<Instant>>,
    sleep_log: Arc<Mutex<Vec<Duration>>>,
}

impl Default for FakeClock {
    fn default() -> Self {
        Self {
            current_time: Arc::new(Mutex::new(Instant::now())),
            sleep_log: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl FakeClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fast-forward the clock by the given duration
    pub fn advance(&self, duration: Duration) {
        let mut time = self.current_time.lock().unwrap();
        *time += duration;
    }

    /// Get the total time "slept" by this clock
    pub fn total_sleep_time(&self) -> Duration {
        self.sleep_log.lock().unwrap().iter().sum()
    }

    /// Get the number of times sleep was called
    pub fn sleep_count(&self) -> usize {
        self.sleep_log.lock().unwrap().len()
    }

    /// Every sleep, in call order
    pub fn sleep_log(&self) -> Vec<Duration> {
        self.sleep_log.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for FakeClock {
    async fn sleep(&self, duration: Duration) {
        self.sleep_log.lock().unwrap().push(duration);
        self.advance(duration);
        tokio::task::yield_now().await;
    }

    fn now(&self) -> Instant {
        *self.current_time.lock().unwrap()
    }
}
