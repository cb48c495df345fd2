// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0
//! Bindings for the bridge that lends on the source chain and relays the
//! borrowed tokens plus a target call to the destination chain.
//!
//! The flat fee travels as `msg.value` of `initiateCrosschainFlashLoan`.

use alloy_sol_types::sol;

sol!(
    #[allow(missing_docs)]
    contract CrosschainFlashLoanBridge {
        function initiateCrosschainFlashLoan(
            uint256 destinationChain,
            uint256 amount,
            address target,
            bytes calldata data
        ) external payable;
    }
);
