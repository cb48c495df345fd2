// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0
use alloy_chains::Chain;
use alloy_primitives::{Log, TxHash};
use serde::Serialize;

/// Inclusion data reported by a chain for one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainReceipt {
    pub tx_hash: TxHash,
    /// `None` while the node reports the receipt without a block (pending).
    pub block_number: Option<u64>,
    /// `false` when the transaction was included but reverted.
    pub success: bool,
    pub logs: Vec<Log>,
}

/// A receipt that reached the chain's finality depth and did not revert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmedReceipt {
    pub chain: Chain,
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub confirmations: u64,
    #[serde(skip)]
    pub logs: Vec<Log>,
}
