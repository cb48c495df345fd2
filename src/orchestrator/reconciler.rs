// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0
//! Read-state reconciliation.
//!
//! Facts are keyed by `(kind, chain, address)`, plus a message hash for relay
//! status, and always replaced whole.
//! Concurrent refreshes of one key share a single in-flight read; a failed read
//! leaves the previous fact in place.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, warn, Instrument};

use crate::chain::{ChainRegistry, Deployment};
use crate::contracts::{CrosschainFlashLoanToken, L2ToL2CrossDomainMessenger, TargetContract};
use crate::error::{FlashLoanError, Result};
use crate::protocol::{DerivedFact, FactKey, FactKind};
use crate::spans;
use crate::traits::{ChainConnector, Clock};

type InFlight = Shared<BoxFuture<'static, Result<DerivedFact>>>;

/// Owns every [`DerivedFact`] and coalesces refreshes.
#[derive(Clone)]
pub struct Reconciler {
    connector: Arc<dyn ChainConnector>,
    clock: Arc<dyn Clock>,
    registry: Arc<ChainRegistry>,
    deployment: Deployment,
    facts: Arc<RwLock<HashMap<FactKey, DerivedFact>>>,
    in_flight: Arc<std::sync::Mutex<HashMap<FactKey, InFlight>>>,
}

impl Reconciler {
    pub fn new(
        connector: Arc<dyn ChainConnector>,
        clock: Arc<dyn Clock>,
        registry: Arc<ChainRegistry>,
        deployment: Deployment,
    ) -> Self {
        Self {
            connector,
            clock,
            registry,
            deployment,
            facts: Arc::new(RwLock::new(HashMap::new())),
            in_flight: Arc::new(std::sync::Mutex::new(HashMap::new())),
        }
    }

    /// Last successfully fetched fact for `key`, without touching the network.
    pub fn cached(&self, key: FactKey) -> Option<DerivedFact> {
        self.facts.read().ok()?.get(&key).cloned()
    }

    /// Re-reads `key` from its chain and replaces the stored fact.
    ///
    /// A call arriving while a read for the same key is in flight joins it and
    /// receives the same result.
    ///
    /// # Errors
    ///
    /// - [`FlashLoanError::ChainNotSupported`] for an unregistered chain
    /// - [`FlashLoanError::NetworkUnavailable`] or
    ///   [`FlashLoanError::Provider`] if the read fails. The previous fact is
    ///   kept.
    pub async fn refresh(&self, key: FactKey) -> Result<DerivedFact> {
        self.registry.get(key.chain)?;
        let (to, data) = self.read_call_for(key)?;

        let (fetch, leader) = {
            let mut in_flight = self
                .in_flight
                .lock()
                .map_err(|_| FlashLoanError::Provider("reconciler lock poisoned".to_string()))?;
            match in_flight.get(&key) {
                Some(existing) => (existing.clone(), false),
                None => {
                    let fetch = self.fetch(key, to, data).shared();
                    in_flight.insert(key, fetch.clone());
                    (fetch, true)
                }
            }
        };

        if !leader {
            debug!(fact = %key, event = "refresh_coalesced");
        }

        let result = fetch.clone().await;

        if let Ok(mut in_flight) = self.in_flight.lock() {
            if in_flight
                .get(&key)
                .is_some_and(|current| Shared::ptr_eq(current, &fetch))
            {
                in_flight.remove(&key);
            }
        }

        result
    }

    /// Builds the one network read for `key`. The future owns everything it
    /// touches so any waiter can drive it to completion.
    fn fetch(&self, key: FactKey, to: Address, data: Bytes) -> BoxFuture<'static, Result<DerivedFact>> {
        let connector = self.connector.clone();
        let clock = self.clock.clone();
        let facts = self.facts.clone();
        let span = spans::refresh_fact(key.kind, key.chain, key.address);

        async move {
            let result = async {
                let raw = connector.read_call(key.chain, to, data).await?;
                decode_value(key.kind, &raw)
            }
            .await;

            match result {
                Ok(value) => {
                    let fact = DerivedFact::new(key, value, clock.now());
                    match facts.write() {
                        Ok(mut facts) => {
                            facts.insert(key, fact.clone());
                        }
                        Err(poisoned) => {
                            poisoned.into_inner().insert(key, fact.clone());
                        }
                    }
                    tracing::Span::current().record("value", tracing::field::display(value));
                    debug!(fact = %key, value = %value, event = "fact_refreshed");
                    Ok(fact)
                }
                Err(e) => {
                    spans::record_error(&e);
                    warn!(fact = %key, error = %e, event = "fact_refresh_failed");
                    Err(e)
                }
            }
        }
        .instrument(span)
        .boxed()
    }

    fn read_call_for(&self, key: FactKey) -> Result<(Address, Bytes)> {
        let call: (Address, Bytes) = match key.kind {
            FactKind::Balance => (
                self.deployment.token(),
                CrosschainFlashLoanToken::balanceOfCall {
                    account: key.address,
                }
                .abi_encode()
                .into(),
            ),
            FactKind::TargetValue => (
                key.address,
                TargetContract::getValueCall {}.abi_encode().into(),
            ),
            FactKind::MessageRelayed => {
                let msg_hash = key.message.ok_or_else(|| {
                    FlashLoanError::InvalidIntent(format!("{key} names no message"))
                })?;
                (
                    key.address,
                    L2ToL2CrossDomainMessenger::successfulMessagesCall { msgHash: msg_hash }
                        .abi_encode()
                        .into(),
                )
            }
        };
        Ok(call)
    }
}

fn decode_value(kind: FactKind, raw: &[u8]) -> Result<U256> {
    let value = match kind {
        FactKind::Balance => CrosschainFlashLoanToken::balanceOfCall::abi_decode_returns(raw)?,
        FactKind::TargetValue => TargetContract::getValueCall::abi_decode_returns(raw)?,
        FactKind::MessageRelayed => U256::from(
            L2ToL2CrossDomainMessenger::successfulMessagesCall::abi_decode_returns(raw)?,
        ),
    };
    Ok(value)
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("deployment", &self.deployment)
            .finish_non_exhaustive()
    }
}
