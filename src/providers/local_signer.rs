// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0
//! Local private-key signer.

use alloy_eips::eip2718::Encodable2718;
use alloy_network::{Ethereum, EthereumWallet, TransactionBuilder};
use alloy_primitives::{Address, Bytes};
use alloy_rpc_types::TransactionRequest;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use tracing::debug;

use crate::error::{FlashLoanError, Result};
use crate::traits::CallSigner;

/// Signs prepared requests with an in-process private key.
///
/// # Examples
///
/// ```rust
/// use xchain_flashloan::providers::LocalCallSigner;
/// use alloy_signer_local::PrivateKeySigner;
///
/// let signer = LocalCallSigner::new(PrivateKeySigner::random());
/// ```
#[derive(Clone)]
pub struct LocalCallSigner {
    wallet: EthereumWallet,
    address: Address,
}

impl LocalCallSigner {
    pub fn new(signer: PrivateKeySigner) -> Self {
        let address = signer.address();
        Self {
            wallet: EthereumWallet::from(signer),
            address,
        }
    }

    /// Parses a hex-encoded secp256k1 private key.
    pub fn from_private_key(key: &str) -> Result<Self> {
        let signer: PrivateKeySigner = key
            .trim()
            .parse()
            .map_err(|e| FlashLoanError::InvalidConfig(format!("invalid private key: {e}")))?;
        Ok(Self::new(signer))
    }
}

impl std::fmt::Debug for LocalCallSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCallSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CallSigner for LocalCallSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign(&self, request: TransactionRequest) -> Result<Bytes> {
        let envelope =
            <TransactionRequest as TransactionBuilder<Ethereum>>::build(request, &self.wallet)
                .await
                .map_err(|e| FlashLoanError::Provider(format!("failed to sign transaction: {e}")))?;

        debug!(
            tx_hash = %envelope.tx_hash(),
            event = "transaction_signed"
        );
        Ok(envelope.encoded_2718().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_hides_key_material() {
        let signer = LocalCallSigner::new(PrivateKeySigner::random());
        let rendered = format!("{signer:?}");
        assert!(rendered.contains(&format!("{:?}", signer.address())));
        assert!(!rendered.contains("wallet"));
    }

    #[test]
    fn test_invalid_private_key_is_config_error() {
        let err = LocalCallSigner::from_private_key("not-a-key").unwrap_err();
        assert!(matches!(err, FlashLoanError::InvalidConfig(_)));
    }
}
