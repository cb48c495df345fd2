// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0
//! Caller intents and the idempotency keys derived from them.

use std::fmt;

use alloy_chains::Chain;
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::SolValue;
use bon::Builder;
use serde::Serialize;

use crate::error::{FlashLoanError, Result};

/// The on-chain action an [`Intent`] asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum IntentKind {
    /// Mint tokens to a recipient on the source chain. Source-chain only.
    Mint,
    /// Borrow from the bridge on the source chain and have the loan delivered to
    /// a target contract call on the destination chain.
    InitiateFlashLoan,
}

impl IntentKind {
    /// Stable discriminant hashed into [`Intent::content_hash`].
    #[inline]
    const fn discriminant(self) -> u64 {
        match self {
            IntentKind::Mint => 0,
            IntentKind::InitiateFlashLoan => 1,
        }
    }

    /// Whether completing this intent requires observing an effect on a second chain.
    #[inline]
    pub const fn is_cross_chain(self) -> bool {
        matches!(self, IntentKind::InitiateFlashLoan)
    }
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntentKind::Mint => f.write_str("Mint"),
            IntentKind::InitiateFlashLoan => f.write_str("InitiateFlashLoan"),
        }
    }
}

/// A caller's declared desire to perform one on-chain action.
///
/// Intents are immutable once built. For [`IntentKind::Mint`] the
/// `target_address` is the mint recipient; for
/// [`IntentKind::InitiateFlashLoan`] it is the contract invoked on the
/// destination chain with `encoded_call_data`.
///
/// # Example
///
/// ```rust
/// use xchain_flashloan::{Intent, IntentKind};
/// use alloy_chains::Chain;
/// use alloy_primitives::{Address, U256};
///
/// let intent = Intent::builder()
///     .kind(IntentKind::Mint)
///     .source_chain(Chain::from_id(901))
///     .amount(U256::from(1_000u64))
///     .target_address(Address::repeat_byte(0x11))
///     .build();
///
/// assert!(intent.validate().is_ok());
/// ```
#[derive(Builder, Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Intent {
    kind: IntentKind,
    source_chain: Chain,
    destination_chain: Option<Chain>,
    amount: U256,
    target_address: Address,
    #[builder(default)]
    encoded_call_data: Bytes,
    /// Flat fee paid alongside the call, in the source chain's native token.
    #[builder(default)]
    fee: U256,
    /// Destination `getValue()` the target contract must report, once the
    /// loan's message has been relayed, before the operation counts as
    /// settled. When absent, the relay alone settles it.
    expected_target_value: Option<U256>,
}

impl Intent {
    pub fn kind(&self) -> IntentKind {
        self.kind
    }

    pub fn source_chain(&self) -> Chain {
        self.source_chain
    }

    pub fn destination_chain(&self) -> Option<Chain> {
        self.destination_chain
    }

    pub fn amount(&self) -> U256 {
        self.amount
    }

    pub fn target_address(&self) -> Address {
        self.target_address
    }

    pub fn encoded_call_data(&self) -> &Bytes {
        &self.encoded_call_data
    }

    pub fn fee(&self) -> U256 {
        self.fee
    }

    pub fn expected_target_value(&self) -> Option<U256> {
        self.expected_target_value
    }

    /// Checks the structural rules every intent must satisfy before submission.
    pub fn validate(&self) -> Result<()> {
        if self.amount.is_zero() {
            return Err(FlashLoanError::InvalidIntent(
                "amount must be non-zero".to_string(),
            ));
        }
        if self.target_address.is_zero() {
            return Err(FlashLoanError::InvalidIntent(
                "target address is the zero address".to_string(),
            ));
        }

        match (self.kind, self.destination_chain) {
            (IntentKind::Mint, Some(destination)) => Err(FlashLoanError::InvalidIntent(format!(
                "mint is a source-chain action but names destination {destination}"
            ))),
            (IntentKind::Mint, None) => Ok(()),
            (IntentKind::InitiateFlashLoan, None) => Err(FlashLoanError::InvalidIntent(
                "flash loan requires a destination chain".to_string(),
            )),
            (IntentKind::InitiateFlashLoan, Some(destination))
                if destination == self.source_chain =>
            {
                Err(FlashLoanError::InvalidIntent(format!(
                    "flash loan source and destination are both {destination}"
                )))
            }
            (IntentKind::InitiateFlashLoan, Some(_)) => Ok(()),
        }
    }

    /// Deterministic hash over every field of the intent.
    ///
    /// keccak256 of the ABI parameter encoding of
    /// `(uint64 kind, uint64 source, uint64 destination, uint256 amount,
    /// address target, bytes data, uint256 fee, bool has_expected,
    /// uint256 expected)`, with an absent destination encoded as 0.
    pub fn content_hash(&self) -> B256 {
        let encoded = (
            self.kind.discriminant(),
            self.source_chain.id(),
            self.destination_chain.map(|c| c.id()).unwrap_or_default(),
            self.amount,
            self.target_address,
            self.encoded_call_data.clone(),
            self.fee,
            self.expected_target_value.is_some(),
            self.expected_target_value.unwrap_or_default(),
        )
            .abi_encode_params();
        keccak256(encoded)
    }
}

/// Identifies one logical submission: the same intent, on the same chain, from
/// the same signer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct IdempotencyKey(B256);

impl IdempotencyKey {
    pub fn derive(intent: &Intent, chain: Chain, signer: Address) -> Self {
        let encoded = (intent.content_hash(), chain.id(), signer).abi_encode_params();
        Self(keccak256(encoded))
    }

    pub fn as_b256(&self) -> B256 {
        self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::b256;
    use rstest::rstest;

    fn flash_loan() -> Intent {
        Intent::builder()
            .kind(IntentKind::InitiateFlashLoan)
            .source_chain(Chain::from_id(901))
            .destination_chain(Chain::from_id(902))
            .amount(U256::from(10u64).pow(U256::from(18u64)))
            .target_address(Address::repeat_byte(0x78))
            .encoded_call_data(Bytes::from_static(&[0x55, 0x24, 0x10, 0x77]))
            .fee(U256::from(10u64).pow(U256::from(16u64)))
            .build()
    }

    #[test]
    fn test_content_hash_is_deterministic() {
        assert_eq!(flash_loan().content_hash(), flash_loan().content_hash());
    }

    #[test]
    fn test_content_hash_is_pinned() {
        assert_eq!(
            flash_loan().content_hash(),
            b256!("3247061e32e6e0ea3dad76823ff59c2de14e3418f0713c9cef11205664c5bc32")
        );
        assert_eq!(
            IdempotencyKey::derive(&flash_loan(), Chain::from_id(901), Address::repeat_byte(1))
                .as_b256(),
            b256!("82ce1d949fe1f57ebf1fe4f1233ebd398f11edbaeab88dc807a9e3811e3e84c9")
        );
    }

    #[test]
    fn test_content_hash_covers_fee() {
        let cheaper = Intent::builder()
            .kind(IntentKind::InitiateFlashLoan)
            .source_chain(Chain::from_id(901))
            .destination_chain(Chain::from_id(902))
            .amount(flash_loan().amount())
            .target_address(flash_loan().target_address())
            .encoded_call_data(flash_loan().encoded_call_data().clone())
            .build();
        assert_ne!(cheaper.content_hash(), flash_loan().content_hash());
    }

    #[test]
    fn test_idempotency_key_depends_on_chain_and_signer() {
        let intent = flash_loan();
        let a = Address::repeat_byte(1);
        let b = Address::repeat_byte(2);

        let base = IdempotencyKey::derive(&intent, Chain::from_id(901), a);
        assert_eq!(base, IdempotencyKey::derive(&intent, Chain::from_id(901), a));
        assert_ne!(base, IdempotencyKey::derive(&intent, Chain::from_id(902), a));
        assert_ne!(base, IdempotencyKey::derive(&intent, Chain::from_id(901), b));
    }

    #[rstest]
    #[case(IntentKind::Mint, Some(902), 1, false)]
    #[case(IntentKind::Mint, None, 0, false)]
    #[case(IntentKind::Mint, None, 1, true)]
    #[case(IntentKind::InitiateFlashLoan, None, 1, false)]
    #[case(IntentKind::InitiateFlashLoan, Some(901), 1, false)]
    #[case(IntentKind::InitiateFlashLoan, Some(902), 1, true)]
    fn test_validate(
        #[case] kind: IntentKind,
        #[case] destination: Option<u64>,
        #[case] amount: u64,
        #[case] valid: bool,
    ) {
        let intent = Intent::builder()
            .kind(kind)
            .source_chain(Chain::from_id(901))
            .maybe_destination_chain(destination.map(Chain::from_id))
            .amount(U256::from(amount))
            .target_address(Address::repeat_byte(0x42))
            .build();
        assert_eq!(intent.validate().is_ok(), valid);
    }
}
