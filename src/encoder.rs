// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0
//! Contract call encoding
//!
//! Turns a target address, a human-readable function signature and dynamic
//! argument values into calldata, and back. Encoding is pure and deterministic:
//! identical inputs always produce identical bytes, which is what submission
//! idempotency keys are built on.
//!
//! # Example
//!
//! ```rust
//! use xchain_flashloan::encoder;
//! use alloy_dyn_abi::DynSolValue;
//! use alloy_primitives::{Address, U256};
//!
//! let token = Address::repeat_byte(0xe4);
//! let call = encoder::encode(
//!     token,
//!     "mint(address, uint256)",
//!     &[
//!         DynSolValue::Address(Address::repeat_byte(0xea)),
//!         DynSolValue::Uint(U256::from(1000u64), 256),
//!     ],
//! )
//! .unwrap();
//!
//! assert_eq!(call.signature(), "mint(address,uint256)");
//! let decoded = encoder::decode(token, call.signature(), call.data()).unwrap();
//! assert_eq!(decoded.args().len(), 2);
//! ```

use alloy_chains::Chain;
use alloy_dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::{keccak256, Address, Bytes, Selector, U256};
use alloy_sol_types::SolCall;

use crate::chain::Deployment;
use crate::contracts::{CrosschainFlashLoanBridge, CrosschainFlashLoanToken, TargetContract};
use crate::error::EncodingError;
use crate::protocol::{CallRequest, Intent, IntentKind};

/// Calldata bound to the contract it is meant for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedCall {
    target: Address,
    signature: String,
    selector: Selector,
    data: Bytes,
}

impl EncodedCall {
    pub fn target(&self) -> Address {
        self.target
    }

    /// Canonical signature, e.g. `mint(address,uint256)`.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn selector(&self) -> Selector {
        self.selector
    }

    /// Selector followed by the ABI-encoded arguments.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn into_data(self) -> Bytes {
        self.data
    }
}

/// The inverse of [`encode`].
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedCall {
    target: Address,
    signature: String,
    args: Vec<DynSolValue>,
}

impl DecodedCall {
    pub fn target(&self) -> Address {
        self.target
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn args(&self) -> &[DynSolValue] {
        &self.args
    }
}

struct ParsedSignature {
    canonical: String,
    params: Vec<DynSolType>,
    selector: Selector,
}

fn parse_signature(signature: &str) -> Result<ParsedSignature, EncodingError> {
    let compact: String = signature.chars().filter(|c| !c.is_whitespace()).collect();
    let invalid = |reason: &str| EncodingError::InvalidSignature {
        signature: signature.to_string(),
        reason: reason.to_string(),
    };

    let open = compact
        .find('(')
        .ok_or_else(|| invalid("missing parameter list"))?;
    let (name, params) = compact.split_at(open);

    let mut chars = name.chars();
    let starts_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$');
    if !starts_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$') {
        return Err(invalid("function name is not a valid identifier"));
    }

    let params = match DynSolType::parse(params) {
        Ok(DynSolType::Tuple(types)) => types,
        Ok(_) => return Err(invalid("parameters must be a parenthesised list")),
        Err(e) => return Err(invalid(&e.to_string())),
    };

    let canonical = format!(
        "{name}{}",
        DynSolType::Tuple(params.clone()).sol_type_name()
    );
    let selector = Selector::from_slice(&keccak256(canonical.as_bytes())[..4]);

    Ok(ParsedSignature {
        canonical,
        params,
        selector,
    })
}

/// Encodes a call of `signature` with `args`, bound for `target`.
///
/// Fails when the signature cannot be parsed or the arguments do not match it
/// in number or type.
pub fn encode(
    target: Address,
    signature: &str,
    args: &[DynSolValue],
) -> Result<EncodedCall, EncodingError> {
    let parsed = parse_signature(signature)?;

    if parsed.params.len() != args.len() {
        return Err(EncodingError::ArityMismatch {
            signature: parsed.canonical,
            expected: parsed.params.len(),
            actual: args.len(),
        });
    }
    if let Some((index, ty)) = parsed
        .params
        .iter()
        .zip(args)
        .enumerate()
        .find_map(|(i, (ty, value))| (!ty.matches(value)).then_some((i, ty)))
    {
        return Err(EncodingError::TypeMismatch {
            signature: parsed.canonical.clone(),
            index,
            expected: ty.sol_type_name().into_owned(),
        });
    }

    let encoded_args = DynSolValue::Tuple(args.to_vec()).abi_encode_params();
    let mut data = Vec::with_capacity(4 + encoded_args.len());
    data.extend_from_slice(parsed.selector.as_slice());
    data.extend_from_slice(&encoded_args);

    Ok(EncodedCall {
        target,
        signature: parsed.canonical,
        selector: parsed.selector,
        data: data.into(),
    })
}

/// Decodes calldata produced for `signature`, checking the selector first.
pub fn decode(target: Address, signature: &str, data: &[u8]) -> Result<DecodedCall, EncodingError> {
    let parsed = parse_signature(signature)?;

    if data.len() < 4 {
        return Err(EncodingError::Malformed(format!(
            "{} bytes is shorter than a selector",
            data.len()
        )));
    }
    let (selector, body) = data.split_at(4);
    let selector = Selector::from_slice(selector);
    if selector != parsed.selector {
        return Err(EncodingError::SelectorMismatch {
            expected: parsed.selector,
            actual: selector,
        });
    }

    let args = match DynSolType::Tuple(parsed.params).abi_decode_params(body) {
        Ok(DynSolValue::Tuple(values)) => values,
        Ok(other) => vec![other],
        Err(e) => return Err(EncodingError::Malformed(e.to_string())),
    };

    Ok(DecodedCall {
        target,
        signature: parsed.canonical,
        args,
    })
}

fn typed<C: SolCall>(target: Address, call: C) -> EncodedCall {
    EncodedCall {
        target,
        signature: C::SIGNATURE.to_string(),
        selector: Selector::from(C::SELECTOR),
        data: call.abi_encode().into(),
    }
}

/// `token.mint(recipient, amount)`
pub fn encode_mint(token: Address, recipient: Address, amount: U256) -> EncodedCall {
    typed(
        token,
        CrosschainFlashLoanToken::mintCall {
            to: recipient,
            amount,
        },
    )
}

/// `bridge.initiateCrosschainFlashLoan(destination, amount, target, data)`
pub fn encode_initiate_flash_loan(
    bridge: Address,
    destination: Chain,
    amount: U256,
    target: Address,
    data: Bytes,
) -> EncodedCall {
    typed(
        bridge,
        CrosschainFlashLoanBridge::initiateCrosschainFlashLoanCall {
            destinationChain: U256::from(destination.id()),
            amount,
            target,
            data,
        },
    )
}

/// `target.setValue(token)`
pub fn encode_set_value(target: Address, token: Address) -> EncodedCall {
    typed(target, TargetContract::setValueCall { token })
}

/// Builds the source-chain call that carries out `intent`, sent from `from`.
pub fn call_for_intent(
    deployment: &Deployment,
    intent: &Intent,
    from: Address,
) -> Result<CallRequest, EncodingError> {
    let (call, value) = match intent.kind() {
        IntentKind::Mint => (
            encode_mint(deployment.token(), intent.target_address(), intent.amount()),
            U256::ZERO,
        ),
        IntentKind::InitiateFlashLoan => {
            let destination = intent.destination_chain().ok_or_else(|| {
                EncodingError::Malformed("flash loan without a destination chain".to_string())
            })?;
            if intent.encoded_call_data().len() < 4 {
                return Err(EncodingError::Malformed(format!(
                    "target call data is {} bytes, shorter than a selector",
                    intent.encoded_call_data().len()
                )));
            }
            (
                encode_initiate_flash_loan(
                    deployment.bridge(),
                    destination,
                    intent.amount(),
                    intent.target_address(),
                    intent.encoded_call_data().clone(),
                ),
                intent.fee(),
            )
        }
    };

    Ok(CallRequest {
        chain: intent.source_chain(),
        from,
        to: call.target(),
        data: call.into_data(),
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn ether(n: u64) -> U256 {
        U256::from(n) * U256::from(10u64).pow(U256::from(18u64))
    }

    #[test]
    fn test_encode_is_deterministic() {
        let target = Address::repeat_byte(1);
        let args = [DynSolValue::Address(Address::repeat_byte(2))];
        let a = encode(target, "setValue(address)", &args).unwrap();
        let b = encode(target, "setValue( address )", &args).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_dynamic_encoding_matches_typed_bindings() {
        let token = Address::repeat_byte(0xe4);
        let bridge = Address::repeat_byte(0xea);

        let dynamic = encode(
            token,
            "mint(address,uint256)",
            &[
                DynSolValue::Address(bridge),
                DynSolValue::Uint(ether(1000), 256),
            ],
        )
        .unwrap();

        assert_eq!(dynamic, encode_mint(token, bridge, ether(1000)));
    }

    #[test]
    fn test_flash_loan_round_trip() {
        let bridge = Address::repeat_byte(0xea);
        let target = Address::repeat_byte(0x78);
        let inner = encode_set_value(target, Address::repeat_byte(0xe4));
        let call = encode_initiate_flash_loan(
            bridge,
            Chain::from_id(902),
            ether(1),
            target,
            inner.data().clone(),
        );

        let decoded = decode(bridge, call.signature(), call.data()).unwrap();
        assert_eq!(decoded.target(), bridge);
        assert_eq!(
            decoded.signature(),
            "initiateCrosschainFlashLoan(uint256,uint256,address,bytes)"
        );
        assert_eq!(
            decoded.args(),
            &[
                DynSolValue::Uint(U256::from(902u64), 256),
                DynSolValue::Uint(ether(1), 256),
                DynSolValue::Address(target),
                DynSolValue::Bytes(inner.data().to_vec()),
            ]
        );
    }

    #[rstest]
    #[case("getValue()", vec![])]
    #[case("transfer(address,uint256)", vec![
        DynSolValue::Address(Address::repeat_byte(9)),
        DynSolValue::Uint(U256::MAX, 256),
    ])]
    #[case("batch(uint256[],bool,string)", vec![
        DynSolValue::Array(vec![
            DynSolValue::Uint(U256::from(1u64), 256),
            DynSolValue::Uint(U256::from(2u64), 256),
        ]),
        DynSolValue::Bool(true),
        DynSolValue::String("loan".to_string()),
    ])]
    fn test_round_trip(#[case] signature: &str, #[case] args: Vec<DynSolValue>) {
        let target = Address::repeat_byte(3);
        let call = encode(target, signature, &args).unwrap();
        let decoded = decode(target, signature, call.data()).unwrap();

        assert_eq!(decoded.target(), target);
        assert_eq!(decoded.signature(), signature);
        assert_eq!(decoded.args(), args.as_slice());
    }

    #[test]
    fn test_arity_mismatch() {
        let err = encode(Address::ZERO, "mint(address,uint256)", &[]).unwrap_err();
        assert!(matches!(
            err,
            EncodingError::ArityMismatch {
                expected: 2,
                actual: 0,
                ..
            }
        ));
    }

    #[test]
    fn test_type_mismatch_reports_index() {
        let err = encode(
            Address::ZERO,
            "mint(address,uint256)",
            &[
                DynSolValue::Address(Address::ZERO),
                DynSolValue::Bool(true),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, EncodingError::TypeMismatch { index: 1, .. }));
    }

    #[rstest]
    #[case("mint")]
    #[case("(address)")]
    #[case("1mint(address)")]
    #[case("mint(adress)")]
    fn test_invalid_signature(#[case] signature: &str) {
        let err = encode(Address::ZERO, signature, &[]).unwrap_err();
        assert!(matches!(err, EncodingError::InvalidSignature { .. }));
    }

    #[test]
    fn test_decode_rejects_foreign_selector() {
        let call = encode_set_value(Address::ZERO, Address::repeat_byte(1));
        let err = decode(Address::ZERO, "getValue()", call.data()).unwrap_err();
        assert!(matches!(err, EncodingError::SelectorMismatch { .. }));
    }

    #[test]
    fn test_flash_loan_call_carries_fee_as_value() {
        let deployment = Deployment::supersim();
        let intent =
            deployment.flash_loan(Chain::from_id(901), Chain::from_id(902), ether(1));
        let from = Address::repeat_byte(0xf3);

        let call = call_for_intent(&deployment, &intent, from).unwrap();
        assert_eq!(call.to, deployment.bridge());
        assert_eq!(call.value, deployment.flat_fee());
        assert_eq!(call.chain, Chain::from_id(901));
        assert_eq!(
            Selector::from_slice(&call.data[..4]),
            Selector::from(CrosschainFlashLoanBridge::initiateCrosschainFlashLoanCall::SELECTOR)
        );
    }

    #[test]
    fn test_flash_loan_with_empty_target_call_is_an_encoding_error() {
        let deployment = Deployment::supersim();
        let intent = Intent::builder()
            .kind(IntentKind::InitiateFlashLoan)
            .source_chain(Chain::from_id(901))
            .destination_chain(Chain::from_id(902))
            .amount(ether(1))
            .target_address(deployment.target())
            .build();

        let err = call_for_intent(&deployment, &intent, Address::ZERO).unwrap_err();
        assert!(matches!(err, EncodingError::Malformed(_)));
    }
}
