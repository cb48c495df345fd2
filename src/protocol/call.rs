// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0
use alloy_chains::Chain;
use alloy_primitives::{Address, Bytes, U256};

/// An unsigned contract call bound to a chain and sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub chain: Chain,
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
}
