// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0
//! Contract bindings
//!
//! Alloy-generated bindings for the flash-loan contracts and the interop
//! messenger that relays loans between chains. The contracts themselves are
//! external; only their ABI is described here.

pub mod flash_loan_bridge;
pub mod messenger;
pub mod target;
pub mod token;

pub use flash_loan_bridge::CrosschainFlashLoanBridge;
pub use messenger::L2ToL2CrossDomainMessenger;
pub use target::TargetContract;
pub use token::CrosschainFlashLoanToken;
