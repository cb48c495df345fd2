// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0
//! The set of participating networks.

use alloy_chains::Chain;
use bon::Builder;
use tracing::debug;
use url::Url;

use super::addresses::{
    SUPERSIM_L2A_CHAIN_ID, SUPERSIM_L2A_RPC, SUPERSIM_L2B_CHAIN_ID, SUPERSIM_L2B_RPC,
};
use crate::error::{FlashLoanError, Result};

/// What a chain can take part in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// The flash-loan token can be minted here.
    Mint,
    /// The bridge can originate flash loans here.
    FlashLoanSource,
    /// The bridge delivers flash loans here.
    FlashLoanDestination,
}

impl Capability {
    pub const ALL: [Capability; 3] = [
        Capability::Mint,
        Capability::FlashLoanSource,
        Capability::FlashLoanDestination,
    ];
}

/// Static description of one participating network.
///
/// # Example
///
/// ```rust
/// use xchain_flashloan::ChainDescriptor;
/// use alloy_chains::Chain;
///
/// let chain = ChainDescriptor::builder()
///     .id(Chain::from_id(901))
///     .endpoint("http://127.0.0.1:9545".parse().unwrap())
///     .display_name("OPChainA")
///     .build();
///
/// assert_eq!(chain.confirmations(), 1);
/// ```
#[derive(Builder, Debug, Clone, PartialEq, Eq)]
pub struct ChainDescriptor {
    id: Chain,
    endpoint: Url,
    #[builder(into)]
    display_name: String,
    /// Blocks (including the inclusion block) before a receipt counts as final.
    #[builder(default = 1)]
    confirmations: u64,
    #[builder(default = Capability::ALL.to_vec())]
    capabilities: Vec<Capability>,
}

impl ChainDescriptor {
    pub fn id(&self) -> Chain {
        self.id
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn confirmations(&self) -> u64 {
        self.confirmations
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Immutable, process-wide set of [`ChainDescriptor`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainRegistry {
    chains: Vec<ChainDescriptor>,
}

impl ChainRegistry {
    /// Builds a registry, rejecting empty sets, duplicate ids and a zero
    /// confirmation depth.
    pub fn new(mut chains: Vec<ChainDescriptor>) -> Result<Self> {
        if chains.is_empty() {
            return Err(FlashLoanError::InvalidConfig(
                "chain registry is empty".to_string(),
            ));
        }

        chains.sort_by_key(|c| c.id.id());
        if let Some(pair) = chains.windows(2).find(|w| w[0].id == w[1].id) {
            return Err(FlashLoanError::InvalidConfig(format!(
                "chain {} registered twice",
                pair[0].id
            )));
        }
        if let Some(chain) = chains.iter().find(|c| c.confirmations == 0) {
            return Err(FlashLoanError::InvalidConfig(format!(
                "chain {} needs at least one confirmation",
                chain.id
            )));
        }

        debug!(
            chains = chains.len(),
            event = "chain_registry_loaded"
        );
        Ok(Self { chains })
    }

    /// The two local L2s started by supersim.
    pub fn supersim() -> Self {
        let chains = [
            (SUPERSIM_L2A_CHAIN_ID, SUPERSIM_L2A_RPC, "OPChainA"),
            (SUPERSIM_L2B_CHAIN_ID, SUPERSIM_L2B_RPC, "OPChainB"),
        ]
        .into_iter()
        .filter_map(|(id, rpc, name)| {
            let endpoint = Url::parse(rpc).ok()?;
            Some(
                ChainDescriptor::builder()
                    .id(Chain::from_id(id))
                    .endpoint(endpoint)
                    .display_name(name)
                    .build(),
            )
        })
        .collect();

        Self { chains }
    }

    pub fn get(&self, chain: Chain) -> Result<&ChainDescriptor> {
        self.chains
            .iter()
            .find(|c| c.id == chain)
            .ok_or(FlashLoanError::ChainNotSupported { chain })
    }

    /// Looks up `chain` and checks it offers `capability`.
    pub fn require(&self, chain: Chain, capability: Capability) -> Result<&ChainDescriptor> {
        let descriptor = self.get(chain)?;
        if !descriptor.supports(capability) {
            return Err(FlashLoanError::InvalidIntent(format!(
                "chain {} ({}) does not support {:?}",
                chain, descriptor.display_name, capability
            )));
        }
        Ok(descriptor)
    }

    pub fn contains(&self, chain: Chain) -> bool {
        self.chains.iter().any(|c| c.id == chain)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChainDescriptor> {
        self.chains.iter()
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}
