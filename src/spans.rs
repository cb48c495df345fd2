// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0
//! OpenTelemetry span helpers for flash-loan operations
//!
//! Span names are static and prefixed with `xchain_flashloan.`; everything
//! variable is carried as a structured attribute. Error attributes follow the
//! OpenTelemetry semantic conventions (`error.type`, `error.message`,
//! `otel.status_code`).
//!
//! # Usage
//!
//! The [`Orchestrator`](crate::Orchestrator) and its components attach these
//! spans to their futures. They are public so embedders can wrap their own
//! calls in the same hierarchy.
//!
//! # Example
//!
//! ```rust,no_run
//! use xchain_flashloan::spans;
//! use alloy_chains::Chain;
//! use alloy_primitives::TxHash;
//! use std::time::Duration;
//! use tracing::Instrument;
//!
//! # async fn example() {
//! let span = spans::await_finality(
//!     TxHash::ZERO,
//!     Chain::from_id(901),
//!     1,
//!     Duration::from_secs(30),
//! );
//! async {
//!     // custom confirmation logic
//! }
//! .instrument(span)
//! .await;
//! # }
//! ```

use std::time::Duration;

use alloy_chains::Chain;
use alloy_primitives::{Address, TxHash, U256};
use tracing::Span;

use crate::error::FlashLoanError;
use crate::protocol::{FactKind, IdempotencyKey, IntentKind, OperationId};

/// Create span for one orchestrated operation, from start to terminal status.
///
/// Parent: Caller's span (captured when the operation is started)
/// Children: submit, await_finality, observe_destination, refresh_fact
#[inline]
pub fn operation(
    id: OperationId,
    kind: IntentKind,
    source_chain: Chain,
    destination_chain: Option<Chain>,
) -> Span {
    tracing::info_span!(
        "xchain_flashloan.operation",
        operation_id = %id,
        intent_kind = %kind,
        source_chain = %source_chain,
        destination_chain = destination_chain.map(|c| c.id()),
        error.type = tracing::field::Empty,
        error.message = tracing::field::Empty,
        error.context = tracing::field::Empty,
        otel.status_code = "OK",
    )
}

/// Create span for an idempotent submission.
///
/// Parent: xchain_flashloan.operation
/// Children: xchain_flashloan.dispatch_attempt (one per retry)
#[inline]
pub fn submit(key: IdempotencyKey, chain: Chain, signer: Address) -> Span {
    tracing::info_span!(
        "xchain_flashloan.submit",
        idempotency_key = %key,
        chain = %chain,
        signer = %signer,
        tx_hash = tracing::field::Empty,
        error.type = tracing::field::Empty,
        error.message = tracing::field::Empty,
        error.context = tracing::field::Empty,
        otel.status_code = "OK",
    )
}

/// Create span for a single broadcast attempt.
///
/// Parent: xchain_flashloan.submit
/// Children: Provider RPC calls
#[inline]
pub fn dispatch_attempt(chain: Chain, attempt: u32, max_attempts: u32) -> Span {
    tracing::debug_span!(
        "xchain_flashloan.dispatch_attempt",
        chain = %chain,
        attempt = attempt,
        max_attempts = max_attempts,
    )
}

/// Create span for waiting until a dispatched transaction is final.
///
/// Parent: xchain_flashloan.operation
/// Children: xchain_flashloan.poll_receipt (multiple attempts)
#[inline]
pub fn await_finality(
    tx_hash: TxHash,
    chain: Chain,
    required_confirmations: u64,
    max_wait: Duration,
) -> Span {
    tracing::info_span!(
        "xchain_flashloan.await_finality",
        tx_hash = %tx_hash,
        chain = %chain,
        required_confirmations = required_confirmations,
        max_wait_ms = max_wait.as_millis() as u64,
        error.type = tracing::field::Empty,
        error.message = tracing::field::Empty,
        error.context = tracing::field::Empty,
        otel.status_code = "OK",
    )
}

/// Create span for a single receipt poll.
///
/// Parent: xchain_flashloan.await_finality
/// Children: Provider RPC calls
#[inline]
pub fn poll_receipt(tx_hash: TxHash, chain: Chain, attempt: u32) -> Span {
    tracing::debug_span!(
        "xchain_flashloan.poll_receipt",
        tx_hash = %tx_hash,
        chain = %chain,
        attempt = attempt,
    )
}

/// Create span for a read-state refresh that actually hits the chain.
///
/// Parent: Whichever task started the fetch
/// Children: Provider RPC calls
#[inline]
pub fn refresh_fact(kind: FactKind, chain: Chain, address: Address) -> Span {
    tracing::debug_span!(
        "xchain_flashloan.refresh_fact",
        fact_kind = ?kind,
        chain = %chain,
        address = %address,
        value = tracing::field::Empty,
        error.type = tracing::field::Empty,
        error.message = tracing::field::Empty,
        otel.status_code = "OK",
    )
}

/// Create span for waiting on the destination-side effect of a flash loan.
///
/// Parent: xchain_flashloan.operation
/// Children: xchain_flashloan.refresh_fact
#[inline]
pub fn observe_destination(
    chain: Chain,
    target: Address,
    expected: Option<U256>,
    messages: usize,
) -> Span {
    tracing::info_span!(
        "xchain_flashloan.observe_destination",
        chain = %chain,
        target = %target,
        expected_value = expected.map(|v| v.to_string()),
        messages = messages,
        error.type = tracing::field::Empty,
        error.message = tracing::field::Empty,
        error.context = tracing::field::Empty,
        otel.status_code = "OK",
    )
}

/// Record error attributes on the current span.
///
/// `error.type` is the error's [`ErrorKind`](crate::ErrorKind) so spans group
/// by taxonomy bucket rather than by message text.
///
/// # Example
///
/// ```rust,no_run
/// use xchain_flashloan::{spans, FlashLoanError};
///
/// # fn example() -> Result<(), FlashLoanError> {
/// let span = tracing::info_span!("xchain_flashloan.custom");
/// let _guard = span.enter();
///
/// let result = some_operation();
/// if let Err(ref e) = result {
///     spans::record_error(e);
/// }
/// result
/// # }
/// # fn some_operation() -> Result<(), FlashLoanError> { Ok(()) }
/// ```
pub fn record_error(error: &FlashLoanError) {
    let current_span = tracing::Span::current();
    current_span.record("error.type", error.kind().as_str());
    current_span.record("error.message", error.to_string());
    current_span.record("otel.status_code", "ERROR");
}

/// Record error attributes with custom context on the current span.
///
/// # Example
///
/// ```rust,no_run
/// use xchain_flashloan::spans;
///
/// # fn example() {
/// let span = tracing::info_span!("xchain_flashloan.custom");
/// let _guard = span.enter();
///
/// spans::record_error_with_context(
///     "ConfirmationTimeout",
///     "No receipt after 30s",
///     Some("Transaction may still be in the mempool"),
/// );
/// # }
/// ```
pub fn record_error_with_context(
    error_type: &str,
    error_message: &str,
    additional_context: Option<&str>,
) {
    let current_span = tracing::Span::current();
    current_span.record("error.type", error_type);
    current_span.record("error.message", error_message);
    current_span.record("otel.status_code", "ERROR");

    if let Some(context) = additional_context {
        current_span.record("error.context", context);
    }
}
