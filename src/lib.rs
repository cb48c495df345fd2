// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0
//! # xchain-flashloan
//!
//! Orchestration for cross-chain flash loans between independently finalizing
//! EVM chains.
//!
//! A caller borrows on a source chain, the bridge relays the loan to a target
//! contract call on a destination chain, and the loan plus a flat fee must be
//! repaid. This crate is the part that sequences that lifecycle:
//!
//! - submits each on-chain call exactly once, even across retries and
//!   overlapping start requests for the same intent
//! - tracks source-chain finality with bounded exponential backoff
//! - observes the destination-side effect through coalesced, consistent reads
//! - exposes the whole thing as one [`OperationState`] per user action
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use xchain_flashloan::{ChainRegistry, Deployment, Orchestrator, OverallStatus};
//! use xchain_flashloan::providers::{AlloyConnector, LocalCallSigner};
//! use alloy_chains::Chain;
//! use alloy_primitives::U256;
//! use alloy_provider::ProviderBuilder;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let a = ProviderBuilder::new().connect_http("http://127.0.0.1:9545".parse()?);
//! let b = ProviderBuilder::new().connect_http("http://127.0.0.1:9546".parse()?);
//!
//! let orchestrator = Orchestrator::builder()
//!     .registry(ChainRegistry::supersim())
//!     .deployment(Deployment::supersim())
//!     .connector(Arc::new(
//!         AlloyConnector::new()
//!             .with_provider(Chain::from_id(901), a)
//!             .with_provider(Chain::from_id(902), b),
//!     ))
//!     .signer(Arc::new(LocalCallSigner::from_private_key("0xac09...")?))
//!     .build()?;
//!
//! let deployment = Deployment::supersim();
//! let amount = U256::from(1_000u64) * U256::from(10u64).pow(U256::from(18u64));
//!
//! // Give the bridge liquidity, then borrow against it.
//! let minted = orchestrator
//!     .run_operation(deployment.mint_to_bridge(Chain::from_id(901), amount))
//!     .await?;
//! assert_eq!(minted.overall_status(), OverallStatus::Succeeded);
//!
//! let id = orchestrator.start_operation(deployment.flash_loan(
//!     Chain::from_id(901),
//!     Chain::from_id(902),
//!     U256::from(10u64).pow(U256::from(18u64)),
//! ))?;
//! let mut updates = orchestrator.subscribe(id)?;
//! let state = updates.wait_for(|s| s.is_terminal()).await?.clone();
//! println!("{} {:?}", state.overall_status(), state.last_error());
//! # Ok(())
//! # }
//! ```
//!
//! ## Public API
//!
//! - [`Orchestrator`] - the state machine, with [`Submitter`],
//!   [`ConfirmationTracker`] and [`Reconciler`] usable on their own
//! - [`Intent`], [`OperationState`], [`PendingOperation`], [`DerivedFact`] -
//!   the data model
//! - [`ChainRegistry`] and [`Deployment`] - which chains and contracts to use
//! - [`encoder`] - signature-driven calldata encoding and decoding
//! - [`traits`] - collaborator seams, implemented by [`providers`] for
//!   production and [`testing`] for tests
//! - [`FlashLoanError`] and [`Result`] - error handling
//! - [`spans`] - tracing span constructors

mod chain;
mod contracts;
mod error;
mod orchestrator;
mod protocol;

pub mod encoder;
pub mod providers;
pub mod testing;
pub mod traits;

pub use chain::addresses;
pub use chain::{Capability, ChainDescriptor, ChainRegistry, Deployment};
pub use contracts::{
    CrosschainFlashLoanBridge, CrosschainFlashLoanToken, L2ToL2CrossDomainMessenger, TargetContract,
};
pub use encoder::{DecodedCall, EncodedCall};
pub use error::{EncodingError, ErrorKind, FlashLoanError, Result};
pub use orchestrator::{
    ConfirmationTracker, DestinationConfig, Orchestrator, OrchestratorConfig, Reconciler,
    RetryConfig, Submitter, TrackingConfig,
};
pub use protocol::{
    CallRequest, ChainReceipt, ConfirmedReceipt, CrossChainMessage, DerivedFact, FactKey, FactKind,
    IdempotencyKey, Intent, IntentKind, OperationError, OperationId, OperationState,
    OverallStatus, PendingOperation, StepStatus,
};

// Public module for advanced users who need custom instrumentation
pub mod spans;
