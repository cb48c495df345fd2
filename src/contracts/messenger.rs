// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0
//! Bindings for the OP Stack interop messenger predeploy.
//!
//! The flash-loan bridge relays every loan through this contract. Each sent
//! message is identified by its hash, and the destination messenger records
//! the hash once the relay has executed.

use alloy_sol_types::sol;

sol!(
    #[allow(missing_docs)]
    contract L2ToL2CrossDomainMessenger {
        event SentMessage(
            uint256 indexed destination,
            address indexed target,
            uint256 indexed messageNonce,
            address sender,
            bytes message
        );

        function successfulMessages(bytes32 msgHash) external view returns (bool);
    }
);
