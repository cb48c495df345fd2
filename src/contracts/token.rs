// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0
//! Bindings for the mintable flash-loan token.

use alloy_sol_types::sol;

sol!(
    #[allow(missing_docs)]
    contract CrosschainFlashLoanToken {
        function mint(address to, uint256 amount) external;
        function balanceOf(address account) external view returns (uint256);
    }
);
