// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0
//! Alloy-based chain connector implementation.

use std::collections::HashMap;

use alloy_chains::Chain;
use alloy_json_rpc::RpcError;
use alloy_network::{Ethereum, ReceiptResponse, TransactionBuilder};
use alloy_primitives::{keccak256, Address, Bytes, TxHash};
use alloy_provider::Provider;
use alloy_rpc_types::TransactionRequest;
use async_trait::async_trait;
use tracing::{debug, instrument, trace};

use crate::error::{FlashLoanError, Result};
use crate::protocol::{CallRequest, ChainReceipt};
use crate::traits::ChainConnector;

/// Node messages meaning the exact transaction is already in the pool.
const ALREADY_KNOWN: [&str; 2] = ["already known", "known transaction"];

/// Production chain connector wrapping one Alloy [`Provider`] per chain.
///
/// # Examples
///
/// ```rust,no_run
/// use xchain_flashloan::providers::AlloyConnector;
/// use alloy_chains::Chain;
/// use alloy_provider::ProviderBuilder;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let a = ProviderBuilder::new().connect_http("http://127.0.0.1:9545".parse()?);
/// let b = ProviderBuilder::new().connect_http("http://127.0.0.1:9546".parse()?);
///
/// let connector = AlloyConnector::new()
///     .with_provider(Chain::from_id(901), a)
///     .with_provider(Chain::from_id(902), b);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct AlloyConnector<P>
where
    P: Provider<Ethereum> + Clone,
{
    providers: HashMap<Chain, P>,
}

impl<P> Default for AlloyConnector<P>
where
    P: Provider<Ethereum> + Clone,
{
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }
}

impl<P> AlloyConnector<P>
where
    P: Provider<Ethereum> + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the provider used for `chain`.
    pub fn with_provider(mut self, chain: Chain, provider: P) -> Self {
        self.providers.insert(chain, provider);
        self
    }

    /// Returns the provider for `chain`.
    pub fn provider(&self, chain: Chain) -> Result<&P> {
        self.providers
            .get(&chain)
            .ok_or(FlashLoanError::ChainNotSupported { chain })
    }
}

#[async_trait]
impl<P> ChainConnector for AlloyConnector<P>
where
    P: Provider<Ethereum> + Clone + Send + Sync,
{
    #[instrument(skip(self, call), fields(chain = %call.chain, to = %call.to))]
    async fn prepare_call(&self, call: &CallRequest) -> Result<TransactionRequest> {
        let provider = self.provider(call.chain)?;
        let dispatch_err = |e| FlashLoanError::from_dispatch(call.chain, e);

        let request = TransactionRequest::default()
            .with_from(call.from)
            .with_to(call.to)
            .with_input(call.data.clone())
            .with_value(call.value)
            .with_chain_id(call.chain.id());

        // Gas estimation doubles as the simulation: a revert here is a rejection.
        let gas_limit = provider
            .estimate_gas(request.clone())
            .await
            .map_err(dispatch_err)?;
        let nonce = provider
            .get_transaction_count(call.from)
            .pending()
            .await
            .map_err(dispatch_err)?;
        let fees = provider
            .estimate_eip1559_fees()
            .await
            .map_err(dispatch_err)?;

        debug!(
            gas_limit = gas_limit,
            nonce = nonce,
            event = "call_prepared"
        );

        Ok(request
            .with_nonce(nonce)
            .with_gas_limit(gas_limit)
            .with_max_fee_per_gas(fees.max_fee_per_gas)
            .with_max_priority_fee_per_gas(fees.max_priority_fee_per_gas))
    }

    #[instrument(skip(self, payload), fields(chain = %chain, payload_len = payload.len()))]
    async fn send_signed(&self, chain: Chain, payload: Bytes) -> Result<TxHash> {
        let provider = self.provider(chain)?;

        match provider.send_raw_transaction(&payload).await {
            Ok(pending) => {
                let tx_hash = *pending.tx_hash();
                debug!(tx_hash = %tx_hash, event = "raw_transaction_sent");
                Ok(tx_hash)
            }
            Err(RpcError::ErrorResp(resp))
                if ALREADY_KNOWN.iter().any(|m| resp.message.contains(m)) =>
            {
                let tx_hash = keccak256(&payload);
                debug!(tx_hash = %tx_hash, event = "raw_transaction_already_known");
                Ok(tx_hash)
            }
            Err(e) => Err(FlashLoanError::from_dispatch(chain, e)),
        }
    }

    #[instrument(skip(self), fields(chain = %chain, tx_hash = %tx_hash))]
    async fn get_receipt(&self, chain: Chain, tx_hash: TxHash) -> Result<Option<ChainReceipt>> {
        trace!("Fetching transaction receipt");
        let receipt = self
            .provider(chain)?
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| FlashLoanError::from_read(chain, e))?;

        if receipt.is_some() {
            debug!("Transaction receipt found");
        } else {
            debug!("Transaction receipt not found");
        }

        Ok(receipt.map(|r| ChainReceipt {
            tx_hash,
            block_number: r.block_number(),
            success: r.status(),
            logs: r.inner.logs().iter().map(|log| log.inner.clone()).collect(),
        }))
    }

    #[instrument(skip(self), fields(chain = %chain))]
    async fn block_number(&self, chain: Chain) -> Result<u64> {
        trace!("Fetching current block number");
        let block_number = self
            .provider(chain)?
            .get_block_number()
            .await
            .map_err(|e| FlashLoanError::from_read(chain, e))?;

        debug!(
            block_number = block_number,
            "Current block number retrieved"
        );
        Ok(block_number)
    }

    #[instrument(skip(self, data), fields(chain = %chain, to = %to))]
    async fn read_call(&self, chain: Chain, to: Address, data: Bytes) -> Result<Bytes> {
        let request = TransactionRequest::default().with_to(to).with_input(data);
        self.provider(chain)?
            .call(request)
            .await
            .map_err(|e| FlashLoanError::from_read(chain, e))
    }
}
