// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0
//! Pending operations and the cross-chain operation state machine.

use std::fmt;
use std::time::Instant;

use alloy_chains::Chain;
use alloy_primitives::TxHash;
use serde::Serialize;

use super::intent::{IdempotencyKey, Intent};
use crate::error::{ErrorKind, FlashLoanError, Result};

/// Process-local identifier handed out by `start_operation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct OperationId(u64);

impl OperationId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op-{}", self.0)
    }
}

/// Status of a single dispatched transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StepStatus {
    Submitted,
    Confirmed,
    Failed,
}

/// A transaction that has been dispatched to one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingOperation {
    intent_key: IdempotencyKey,
    tx_hash: TxHash,
    chain: Chain,
    status: StepStatus,
    #[serde(skip)]
    created_at: Instant,
}

impl PendingOperation {
    pub(crate) fn submitted(
        intent_key: IdempotencyKey,
        tx_hash: TxHash,
        chain: Chain,
        created_at: Instant,
    ) -> Self {
        Self {
            intent_key,
            tx_hash,
            chain,
            status: StepStatus::Submitted,
            created_at,
        }
    }

    pub fn intent_key(&self) -> IdempotencyKey {
        self.intent_key
    }

    /// The submission handle: the hash of the signed transaction.
    pub fn tx_hash(&self) -> TxHash {
        self.tx_hash
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }

    pub fn status(&self) -> StepStatus {
        self.status
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub(crate) fn set_status(&mut self, status: StepStatus) {
        self.status = status;
    }
}

/// Aggregate status of a cross-chain operation.
///
/// ```text
/// Idle -> Submitting -> AwaitingSourceConfirm -> AwaitingDestinationEffect -> Succeeded
///                                              \-> Succeeded (source-only intents)
/// any non-terminal state -> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OverallStatus {
    Idle,
    Submitting,
    AwaitingSourceConfirm,
    AwaitingDestinationEffect,
    Succeeded,
    Failed,
}

impl OverallStatus {
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, OverallStatus::Succeeded | OverallStatus::Failed)
    }

    /// The transition table. Terminal states have no outgoing edges.
    pub const fn can_transition_to(self, next: OverallStatus) -> bool {
        use OverallStatus::*;

        match (self, next) {
            (Succeeded | Failed, _) => false,
            (_, Failed) => true,
            (Idle, Submitting) => true,
            (Submitting, AwaitingSourceConfirm) => true,
            (AwaitingSourceConfirm, AwaitingDestinationEffect | Succeeded) => true,
            (AwaitingDestinationEffect, Succeeded) => true,
            _ => false,
        }
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OverallStatus::Idle => "Idle",
            OverallStatus::Submitting => "Submitting",
            OverallStatus::AwaitingSourceConfirm => "AwaitingSourceConfirm",
            OverallStatus::AwaitingDestinationEffect => "AwaitingDestinationEffect",
            OverallStatus::Succeeded => "Succeeded",
            OverallStatus::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// The error that moved an operation to [`OverallStatus::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationError {
    kind: ErrorKind,
    message: String,
}

impl OperationError {
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Human-readable summary, suitable for display.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&FlashLoanError> for OperationError {
    fn from(err: &FlashLoanError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Snapshot of one logical user action in flight.
///
/// Only the orchestrator mutates this; observers receive clones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationState {
    id: OperationId,
    intent: Intent,
    steps: Vec<PendingOperation>,
    overall_status: OverallStatus,
    last_error: Option<OperationError>,
    abandoned: bool,
}

impl OperationState {
    pub(crate) fn new(id: OperationId, intent: Intent) -> Self {
        Self {
            id,
            intent,
            steps: Vec::new(),
            overall_status: OverallStatus::Idle,
            last_error: None,
            abandoned: false,
        }
    }

    pub fn id(&self) -> OperationId {
        self.id
    }

    pub fn intent(&self) -> &Intent {
        &self.intent
    }

    pub fn steps(&self) -> &[PendingOperation] {
        &self.steps
    }

    pub fn overall_status(&self) -> OverallStatus {
        self.overall_status
    }

    pub fn last_error(&self) -> Option<&OperationError> {
        self.last_error.as_ref()
    }

    pub fn is_terminal(&self) -> bool {
        self.overall_status.is_terminal()
    }

    /// True once the caller stopped observing this operation. Any submitted
    /// transaction may still land on chain.
    pub fn is_abandoned(&self) -> bool {
        self.abandoned
    }

    pub(crate) fn advance(&mut self, next: OverallStatus) -> Result<()> {
        if !self.overall_status.can_transition_to(next) {
            return Err(FlashLoanError::InvalidTransition {
                from: self.overall_status,
                to: next,
            });
        }
        self.overall_status = next;
        Ok(())
    }

    /// Moves to `Failed`, recording the cause. A terminal operation keeps its
    /// outcome.
    pub(crate) fn fail(&mut self, err: &FlashLoanError) -> bool {
        if self.overall_status.is_terminal() {
            return false;
        }
        self.overall_status = OverallStatus::Failed;
        self.last_error = Some(err.into());
        true
    }

    pub(crate) fn push_step(&mut self, step: PendingOperation) {
        self.steps.push(step);
    }

    pub(crate) fn set_step_status(&mut self, tx_hash: TxHash, status: StepStatus) {
        if let Some(step) = self.steps.iter_mut().find(|s| s.tx_hash == tx_hash) {
            step.set_status(status);
        }
    }

    pub(crate) fn mark_abandoned(&mut self) {
        if !self.overall_status.is_terminal() {
            self.abandoned = true;
        }
    }
}
