// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0
//! Core trait abstractions for the external collaborators.
//!
//! The orchestrator never talks to a node, a key or the wall clock directly.
//! Chain connectivity, signing and time are reached through the traits below,
//! so production code plugs in Alloy providers and a local key while tests
//! plug in the fakes from [`crate::testing`] and drive failure modes such as
//! rejected simulations, dropped connections, reverted receipts and slow
//! finality without a running chain.
//!
//! # Example: a read-only connector
//!
//! ```rust,ignore
//! #[async_trait::async_trait]
//! impl ChainConnector for CachedReads {
//!     async fn read_call(&self, chain: Chain, to: Address, data: Bytes) -> Result<Bytes> {
//!         Ok(self.answers.get(&(chain, to, data)).cloned().unwrap_or_default())
//!     }
//!     // ...
//! }
//! ```

use alloy_chains::Chain;
use alloy_primitives::{Address, Bytes, TxHash};
use alloy_rpc_types::TransactionRequest;
use async_trait::async_trait;
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::protocol::{CallRequest, ChainReceipt};

/// Trait for blockchain RPC operations across every registered chain.
///
/// # Errors
///
/// Implementations classify failures so callers can react to them:
/// - [`FlashLoanError::SubmissionRejected`](crate::FlashLoanError::SubmissionRejected)
///   when the node refused the call (reverted simulation, insufficient funds)
/// - [`FlashLoanError::NetworkUnavailable`](crate::FlashLoanError::NetworkUnavailable)
///   when the node could not be reached
#[async_trait]
pub trait ChainConnector: Send + Sync {
    /// Simulates `call` and fills in everything needed to sign it (nonce, gas,
    /// fees, chain id).
    async fn prepare_call(&self, call: &CallRequest) -> Result<TransactionRequest>;

    /// Broadcasts an already-signed transaction and returns its hash.
    ///
    /// Broadcasting the same bytes twice yields the same hash and at most one
    /// inclusion.
    async fn send_signed(&self, chain: Chain, payload: Bytes) -> Result<TxHash>;

    /// Fetches the receipt for `tx_hash`, or `None` if it is not yet included.
    async fn get_receipt(&self, chain: Chain, tx_hash: TxHash) -> Result<Option<ChainReceipt>>;

    /// Gets the current block number.
    async fn block_number(&self, chain: Chain) -> Result<u64>;

    /// Executes a read-only call against the latest state.
    async fn read_call(&self, chain: Chain, to: Address, data: Bytes) -> Result<Bytes>;
}

/// Trait for producing signed transactions.
///
/// The orchestrator only ever sees the signer's address and the signed bytes;
/// key material stays behind this trait.
#[async_trait]
pub trait CallSigner: Send + Sync {
    /// The account transactions are sent from.
    fn address(&self) -> Address;

    /// Signs a fully prepared request and returns the raw EIP-2718 envelope.
    async fn sign(&self, request: TransactionRequest) -> Result<Bytes>;
}

/// Trait for time-based operations.
///
/// This trait abstracts sleep and time queries, enabling fast-forward testing
/// where tests can instantly advance through polling loops and timeouts without
/// actually waiting.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Asynchronously sleeps for the given duration.
    async fn sleep(&self, duration: Duration);

    /// Returns the current instant in time.
    ///
    /// Used for calculating timeouts and measuring elapsed time.
    fn now(&self) -> Instant;
}
