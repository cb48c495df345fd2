// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0
use std::fmt;
use std::time::Duration;

use alloy_chains::Chain;
use alloy_json_rpc::RpcError;
use alloy_primitives::{Selector, TxHash};
use alloy_transport::TransportErrorKind;
use serde::Serialize;
use thiserror::Error;

use crate::protocol::{OperationId, OverallStatus};

/// Errors raised while turning a function signature and arguments into calldata,
/// or back.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    #[error("Invalid function signature `{signature}`: {reason}")]
    InvalidSignature { signature: String, reason: String },

    #[error("`{signature}` takes {expected} arguments, got {actual}")]
    ArityMismatch {
        signature: String,
        expected: usize,
        actual: usize,
    },

    #[error("Argument {index} of `{signature}` is not a valid `{expected}`")]
    TypeMismatch {
        signature: String,
        index: usize,
        expected: String,
    },

    #[error("Selector mismatch: expected {expected}, found {actual}")]
    SelectorMismatch { expected: Selector, actual: Selector },

    #[error("Malformed call payload: {0}")]
    Malformed(String),
}

#[derive(Error, Debug, Clone)]
pub enum FlashLoanError {
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("Submission rejected on chain {chain}: {reason}")]
    SubmissionRejected { chain: Chain, reason: String },

    #[error("Network unavailable for chain {chain}: {reason}")]
    NetworkUnavailable { chain: Chain, reason: String },

    #[error("Timed out after {waited:?} waiting for {awaiting} on chain {chain}")]
    ConfirmationTimeout {
        chain: Chain,
        awaiting: String,
        waited: Duration,
    },

    #[error("Execution reverted on chain {chain} in transaction {tx_hash}")]
    ExecutionReverted { chain: Chain, tx_hash: TxHash },

    #[error("Chain not supported: {chain}")]
    ChainNotSupported { chain: Chain },

    #[error("Invalid intent: {0}")]
    InvalidIntent(String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: OverallStatus,
        to: OverallStatus,
    },

    #[error("Operation {0} not found")]
    OperationNotFound(OperationId),

    #[error("Operation {0} is still in flight")]
    OperationInFlight(OperationId),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("ABI encoding/decoding error: {0}")]
    Abi(String),
}

impl From<alloy_sol_types::Error> for FlashLoanError {
    fn from(err: alloy_sol_types::Error) -> Self {
        FlashLoanError::Abi(err.to_string())
    }
}

impl FlashLoanError {
    /// Maps an RPC failure raised while dispatching a call.
    ///
    /// A JSON-RPC error response means the node looked at the call and refused
    /// it (failed simulation, insufficient funds, bad nonce). A transport error
    /// means we never got an answer.
    pub fn from_dispatch(chain: Chain, err: RpcError<TransportErrorKind>) -> Self {
        match err {
            RpcError::ErrorResp(payload) => FlashLoanError::SubmissionRejected {
                chain,
                reason: payload.message.to_string(),
            },
            RpcError::Transport(kind) => FlashLoanError::NetworkUnavailable {
                chain,
                reason: kind.to_string(),
            },
            other => FlashLoanError::Provider(other.to_string()),
        }
    }

    /// Maps an RPC failure raised by a read-only request.
    pub fn from_read(chain: Chain, err: RpcError<TransportErrorKind>) -> Self {
        match err {
            RpcError::Transport(kind) => FlashLoanError::NetworkUnavailable {
                chain,
                reason: kind.to_string(),
            },
            other => FlashLoanError::Provider(other.to_string()),
        }
    }

    /// Returns the taxonomy bucket of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FlashLoanError::Encoding(_) | FlashLoanError::Abi(_) => ErrorKind::Encoding,
            FlashLoanError::SubmissionRejected { .. } => ErrorKind::SubmissionRejected,
            FlashLoanError::NetworkUnavailable { .. } => ErrorKind::NetworkUnavailable,
            FlashLoanError::ConfirmationTimeout { .. } => ErrorKind::ConfirmationTimeout,
            FlashLoanError::ExecutionReverted { .. } => ErrorKind::ExecutionReverted,
            FlashLoanError::ChainNotSupported { .. }
            | FlashLoanError::InvalidIntent(_)
            | FlashLoanError::InvalidConfig(_)
            | FlashLoanError::OperationInFlight(_) => ErrorKind::InvalidRequest,
            FlashLoanError::InvalidTransition { .. }
            | FlashLoanError::OperationNotFound(_)
            | FlashLoanError::Provider(_) => ErrorKind::Internal,
        }
    }

    /// Only transient network failures are worth retrying. Everything else is
    /// either deterministic or has an ambiguous on-chain outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FlashLoanError::NetworkUnavailable { .. })
    }
}

/// Copyable discriminant of [`FlashLoanError`], recorded in snapshots and spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    Encoding,
    SubmissionRejected,
    NetworkUnavailable,
    ConfirmationTimeout,
    ExecutionReverted,
    InvalidRequest,
    Internal,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Encoding => "EncodingError",
            ErrorKind::SubmissionRejected => "SubmissionRejected",
            ErrorKind::NetworkUnavailable => "NetworkUnavailable",
            ErrorKind::ConfirmationTimeout => "ConfirmationTimeout",
            ErrorKind::ExecutionReverted => "ExecutionReverted",
            ErrorKind::InvalidRequest => "InvalidRequest",
            ErrorKind::Internal => "Internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type Result<T> = std::result::Result<T, FlashLoanError>;

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_transport::TransportError;

    #[test]
    fn test_only_network_errors_are_retryable() {
        let chain = Chain::from_id(901);
        assert!(FlashLoanError::NetworkUnavailable {
            chain,
            reason: "connection refused".to_string(),
        }
        .is_retryable());
        assert!(!FlashLoanError::SubmissionRejected {
            chain,
            reason: "execution reverted".to_string(),
        }
        .is_retryable());
        assert!(!FlashLoanError::ConfirmationTimeout {
            chain,
            awaiting: "transaction".to_string(),
            waited: Duration::from_secs(1),
        }
        .is_retryable());
    }

    #[test]
    fn test_transport_failure_maps_to_network_unavailable() {
        let chain = Chain::from_id(902);
        let err: TransportError = TransportErrorKind::custom_str("connection reset");
        let mapped = FlashLoanError::from_dispatch(chain, err);
        assert_eq!(mapped.kind(), ErrorKind::NetworkUnavailable);
    }

    #[test]
    fn test_encoding_error_converts() {
        let err: FlashLoanError = EncodingError::Malformed("short".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::Encoding);
        assert_eq!(err.to_string(), "Encoding error: Malformed call payload: short");
    }
}
