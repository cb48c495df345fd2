// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0
//! Core data model
//!
//! Intents, pending operations, the aggregate operation state machine, derived
//! facts, receipts and the cross-chain messages they carry.

mod call;
mod fact;
mod intent;
mod message;
mod operation;
mod receipt;

pub use call::CallRequest;
pub use fact::{DerivedFact, FactKey, FactKind};
pub use intent::{IdempotencyKey, Intent, IntentKind};
pub use message::CrossChainMessage;
pub use operation::{
    OperationError, OperationId, OperationState, OverallStatus, PendingOperation, StepStatus,
};
pub use receipt::{ChainReceipt, ConfirmedReceipt};
