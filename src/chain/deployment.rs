// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0
//! Addresses of the flash-loan contracts and the default fee.

use alloy_chains::Chain;
use alloy_primitives::{Address, U256};
use bon::Builder;

use super::addresses::{
    DEFAULT_FLAT_FEE, L2_TO_L2_CROSS_DOMAIN_MESSENGER_ADDRESS, SUPERSIM_FLASH_LOAN_BRIDGE_ADDRESS,
    SUPERSIM_TARGET_CONTRACT_ADDRESS, SUPERSIM_TOKEN_ADDRESS,
};
use crate::encoder;
use crate::protocol::{Intent, IntentKind};

/// Where the flash-loan contracts live.
///
/// The same addresses are used on every registered chain.
#[derive(Builder, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deployment {
    token: Address,
    bridge: Address,
    target: Address,
    /// Messenger that relays flash loans between chains.
    #[builder(default = L2_TO_L2_CROSS_DOMAIN_MESSENGER_ADDRESS)]
    messenger: Address,
    #[builder(default = DEFAULT_FLAT_FEE)]
    flat_fee: U256,
}

impl Deployment {
    pub fn supersim() -> Self {
        Self {
            token: SUPERSIM_TOKEN_ADDRESS,
            bridge: SUPERSIM_FLASH_LOAN_BRIDGE_ADDRESS,
            target: SUPERSIM_TARGET_CONTRACT_ADDRESS,
            messenger: L2_TO_L2_CROSS_DOMAIN_MESSENGER_ADDRESS,
            flat_fee: DEFAULT_FLAT_FEE,
        }
    }

    pub fn token(&self) -> Address {
        self.token
    }

    pub fn bridge(&self) -> Address {
        self.bridge
    }

    pub fn target(&self) -> Address {
        self.target
    }

    pub fn messenger(&self) -> Address {
        self.messenger
    }

    pub fn flat_fee(&self) -> U256 {
        self.flat_fee
    }

    /// Mint `amount` tokens to the bridge so it has liquidity to lend.
    pub fn mint_to_bridge(&self, chain: Chain, amount: U256) -> Intent {
        Intent::builder()
            .kind(IntentKind::Mint)
            .source_chain(chain)
            .amount(amount)
            .target_address(self.bridge)
            .build()
    }

    /// Borrow `amount` on `source` and have the target contract record the
    /// token on `destination`, paying the flat fee.
    pub fn flash_loan(&self, source: Chain, destination: Chain, amount: U256) -> Intent {
        let call = encoder::encode_set_value(self.target, self.token);
        Intent::builder()
            .kind(IntentKind::InitiateFlashLoan)
            .source_chain(source)
            .destination_chain(destination)
            .amount(amount)
            .target_address(self.target)
            .encoded_call_data(call.data().clone())
            .fee(self.flat_fee)
            .build()
    }
}
