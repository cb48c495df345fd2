// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0
//! Chain registry and contract deployment configuration
//!
//! Chain identifiers and contract addresses are configuration inputs. The
//! supersim presets describe the local two-L2 development network.

pub mod addresses;
mod deployment;
mod registry;

pub use deployment::Deployment;
pub use registry::{Capability, ChainDescriptor, ChainRegistry};
