// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0
//! Cross-chain messages emitted by a confirmed source transaction.

use alloy_chains::Chain;
use alloy_primitives::{keccak256, Address, Bytes, Log, B256, U256};
use alloy_sol_types::{SolEvent, SolValue};
use serde::Serialize;

use crate::contracts::L2ToL2CrossDomainMessenger;

/// One message the source-chain messenger committed to relay.
///
/// Every send gets a fresh messenger nonce, so two otherwise identical flash
/// loans produce different messages and different hashes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrossChainMessage {
    source: Chain,
    destination: Chain,
    nonce: U256,
    sender: Address,
    target: Address,
    message: Bytes,
}

impl CrossChainMessage {
    /// Decodes a `SentMessage` log, ignoring logs from any other emitter.
    pub fn from_log(source: Chain, messenger: Address, log: &Log) -> Option<Self> {
        if log.address != messenger {
            return None;
        }
        let event = L2ToL2CrossDomainMessenger::SentMessage::decode_log(log).ok()?;
        let destination: u64 = event.data.destination.try_into().ok()?;

        Some(Self {
            source,
            destination: Chain::from_id(destination),
            nonce: event.data.messageNonce,
            sender: event.data.sender,
            target: event.data.target,
            message: event.data.message.clone(),
        })
    }

    /// Every message in `logs` sent by `messenger` towards `destination`.
    pub fn sent_to(source: Chain, destination: Chain, messenger: Address, logs: &[Log]) -> Vec<Self> {
        logs.iter()
            .filter_map(|log| Self::from_log(source, messenger, log))
            .filter(|message| message.destination == destination)
            .collect()
    }

    pub fn source(&self) -> Chain {
        self.source
    }

    pub fn destination(&self) -> Chain {
        self.destination
    }

    pub fn nonce(&self) -> U256 {
        self.nonce
    }

    pub fn sender(&self) -> Address {
        self.sender
    }

    pub fn target(&self) -> Address {
        self.target
    }

    /// The hash the destination messenger records once the relay executed:
    /// keccak256 of `abi.encode(destination, source, nonce, sender, target, message)`.
    pub fn hash(&self) -> B256 {
        let encoded = (
            U256::from(self.destination.id()),
            U256::from(self.source.id()),
            self.nonce,
            self.sender,
            self.target,
            self.message.clone(),
        )
            .abi_encode_params();
        keccak256(encoded)
    }
}
