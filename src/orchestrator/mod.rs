// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0
//! Cross-chain operation orchestration
//!
//! The [`Orchestrator`] sequences one logical user action across the source
//! and destination chains. It is built from three components that can also be
//! used on their own:
//!
//! - [`Submitter`]: idempotent, single-flight transaction dispatch
//! - [`ConfirmationTracker`]: bounded backoff until a receipt is final
//! - [`Reconciler`]: coalesced, replace-whole-entry read state

mod config;
mod machine;
mod reconciler;
mod submitter;
mod tracker;

pub use config::{DestinationConfig, OrchestratorConfig, RetryConfig, TrackingConfig};
pub use machine::Orchestrator;
pub use reconciler::Reconciler;
pub use submitter::Submitter;
pub use tracker::ConfirmationTracker;
