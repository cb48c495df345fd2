// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0
//! Well-known endpoints and contract addresses of the local supersim network
//!
//! Supersim runs two OP Stack L2s side by side with interop enabled. The
//! flash-loan contracts are deployed with CREATE2, so each address is the same
//! on both chains.

use alloy_primitives::{address, Address, U256};

/// Chain id of the first supersim L2.
pub const SUPERSIM_L2A_CHAIN_ID: u64 = 901;

/// Chain id of the second supersim L2.
pub const SUPERSIM_L2B_CHAIN_ID: u64 = 902;

pub const SUPERSIM_L2A_RPC: &str = "http://127.0.0.1:9545";
pub const SUPERSIM_L2B_RPC: &str = "http://127.0.0.1:9546";

/// `CrosschainFlashLoanToken`
pub const SUPERSIM_TOKEN_ADDRESS: Address = address!("e4daa736fe50442bf8547e4e6ac874cc31db3d5a");

/// `CrosschainFlashLoanBridge`
pub const SUPERSIM_FLASH_LOAN_BRIDGE_ADDRESS: Address =
    address!("ea2372bde315a464c3fff6247de28d210006bf50");

/// `TargetContract`
pub const SUPERSIM_TARGET_CONTRACT_ADDRESS: Address =
    address!("7815113a5444666f64afa0193a6a4003a2c5b413");

/// OP Stack `L2ToL2CrossDomainMessenger` predeploy, present on every interop chain.
pub const L2_TO_L2_CROSS_DOMAIN_MESSENGER_ADDRESS: Address =
    address!("4200000000000000000000000000000000000023");

/// 0.01 ether, charged per flash loan by the bridge.
pub const DEFAULT_FLAT_FEE: U256 = U256::from_limbs([10_000_000_000_000_000, 0, 0, 0]);
