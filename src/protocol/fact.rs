// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0
//! Derived read-state facts.

use std::fmt;
use std::time::Instant;

use alloy_chains::Chain;
use alloy_primitives::{Address, B256, U256};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FactKind {
    /// Flash-loan token balance held by an address.
    Balance,
    /// `getValue()` of a target contract.
    TargetValue,
    /// Whether the messenger at the key's address executed the relay of the
    /// key's message: 1 once relayed, 0 before.
    MessageRelayed,
}

impl fmt::Display for FactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactKind::Balance => f.write_str("balance"),
            FactKind::TargetValue => f.write_str("target_value"),
            FactKind::MessageRelayed => f.write_str("message_relayed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FactKey {
    pub kind: FactKind,
    pub chain: Chain,
    pub address: Address,
    /// Message hash, for [`FactKind::MessageRelayed`] only.
    pub message: Option<B256>,
}

impl FactKey {
    pub const fn new(kind: FactKind, chain: Chain, address: Address) -> Self {
        Self {
            kind,
            chain,
            address,
            message: None,
        }
    }

    /// Relay status of `message` on the `messenger` of `chain`.
    pub const fn message_relayed(chain: Chain, messenger: Address, message: B256) -> Self {
        Self {
            kind: FactKind::MessageRelayed,
            chain,
            address: messenger,
            message: Some(message),
        }
    }
}

impl fmt::Display for FactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.kind, self.chain, self.address)?;
        if let Some(message) = self.message {
            write!(f, "/{message}")?;
        }
        Ok(())
    }
}

/// A fetched value, always replaced as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DerivedFact {
    key: FactKey,
    value: U256,
    #[serde(skip)]
    fetched_at: Instant,
}

impl DerivedFact {
    pub(crate) fn new(key: FactKey, value: U256, fetched_at: Instant) -> Self {
        Self {
            key,
            value,
            fetched_at,
        }
    }

    pub fn key(&self) -> FactKey {
        self.key
    }

    pub fn kind(&self) -> FactKind {
        self.key.kind
    }

    pub fn chain(&self) -> Chain {
        self.key.chain
    }

    pub fn address(&self) -> Address {
        self.key.address
    }

    pub fn value(&self) -> U256 {
        self.value
    }

    pub fn fetched_at(&self) -> Instant {
        self.fetched_at
    }
}
