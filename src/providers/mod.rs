// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0
//! Production implementations of the collaborator traits.
//!
//! This module provides the "real" implementations of the traits defined in
//! [`crate::traits`]: Alloy providers for chain access, a local private-key
//! signer and the Tokio clock. Test code uses [`crate::testing`] instead.

mod alloy;
mod local_signer;
mod tokio_clock;

pub use self::alloy::AlloyConnector;
pub use self::local_signer::LocalCallSigner;
pub use self::tokio_clock::TokioClock;
