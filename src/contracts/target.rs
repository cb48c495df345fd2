// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0
//! Bindings for the destination-side contract the flash loan invokes.

use alloy_sol_types::sol;

sol!(
    #[allow(missing_docs)]
    contract TargetContract {
        function setValue(address token) external;
        function getValue() external view returns (uint256);
    }
);
