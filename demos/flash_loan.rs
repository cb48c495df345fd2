// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0
//! Mint liquidity and run a cross-chain flash loan on a local supersim network
//!
//! Start supersim with the flash-loan contracts deployed, then run:
//!
//! `cargo run --example flash_loan`
//!
//! Environment (read from `.env` if present):
//! - `L2A_RPC_URL`, `L2B_RPC_URL`: override the default supersim endpoints
//! - `DEV_PRIVATE_KEY`: funded key, defaults to the first anvil dev account
//! - `RUST_LOG`: log filter, e.g. `xchain_flashloan=debug`

use alloy_chains::Chain;
use alloy_primitives::U256;
use alloy_provider::ProviderBuilder;
use dotenvy::dotenv;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use xchain_flashloan::addresses::{
    SUPERSIM_L2A_CHAIN_ID, SUPERSIM_L2A_RPC, SUPERSIM_L2B_CHAIN_ID, SUPERSIM_L2B_RPC,
};
use xchain_flashloan::providers::{AlloyConnector, LocalCallSigner};
use xchain_flashloan::{
    ChainRegistry, Deployment, FactKind, FlashLoanError, Orchestrator, OrchestratorConfig,
    OverallStatus,
};

/// First account of the anvil/supersim test mnemonic.
const ANVIL_DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

fn format_token(amount: U256) -> String {
    let whole = amount / U256::from(10u64).pow(U256::from(18u64));
    format!("{whole}")
}

fn env_url(key: &str, default: &str) -> Result<url::Url, FlashLoanError> {
    let raw = std::env::var(key).unwrap_or_else(|_| default.to_string());
    raw.parse()
        .map_err(|e| FlashLoanError::InvalidConfig(format!("{key}={raw}: {e}")))
}

#[tokio::main]
async fn main() -> Result<(), FlashLoanError> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("⚡ Cross-chain flash loan: OPChainA → OPChainB");
    println!("==============================================\n");

    let chain_a = Chain::from_id(SUPERSIM_L2A_CHAIN_ID);
    let chain_b = Chain::from_id(SUPERSIM_L2B_CHAIN_ID);

    let connector = AlloyConnector::new()
        .with_provider(
            chain_a,
            ProviderBuilder::new().connect_http(env_url("L2A_RPC_URL", SUPERSIM_L2A_RPC)?),
        )
        .with_provider(
            chain_b,
            ProviderBuilder::new().connect_http(env_url("L2B_RPC_URL", SUPERSIM_L2B_RPC)?),
        );

    let key = std::env::var("DEV_PRIVATE_KEY").unwrap_or_else(|_| ANVIL_DEV_KEY.to_string());
    let signer = LocalCallSigner::from_private_key(&key)?;

    let deployment = Deployment::supersim();
    let orchestrator = Orchestrator::builder()
        .registry(ChainRegistry::supersim())
        .deployment(deployment)
        .connector(Arc::new(connector))
        .signer(Arc::new(signer))
        .config(OrchestratorConfig::local_dev())
        .build()?;

    println!("📍 Configuration:");
    println!("   Signer: {}", orchestrator.signer_address());
    println!("   Token:  {}", deployment.token());
    println!("   Bridge: {}", deployment.bridge());
    println!("   Target: {}", deployment.target());
    println!("   Fee:    {} wei\n", deployment.flat_fee());

    // Step 1: give the bridge something to lend
    let liquidity = U256::from(1_000u64) * U256::from(10u64).pow(U256::from(18u64));
    println!("1️⃣ Minting {} tokens to the bridge...", format_token(liquidity));
    let minted = orchestrator
        .run_operation(deployment.mint_to_bridge(chain_a, liquidity))
        .await?;
    report(&minted);
    if minted.overall_status() != OverallStatus::Succeeded {
        return Ok(());
    }

    let balance = orchestrator
        .refresh_fact(FactKind::Balance, chain_a, deployment.bridge())
        .await?;
    println!("   Bridge balance: {}\n", format_token(balance.value()));

    // Step 2: borrow on A, have the target record the token on B
    let amount = U256::from(10u64).pow(U256::from(18u64));
    println!("2️⃣ Initiating flash loan of {} token...", format_token(amount));
    let id = orchestrator.start_operation(deployment.flash_loan(chain_a, chain_b, amount))?;

    let mut updates = orchestrator.subscribe(id)?;
    loop {
        let status = updates.borrow_and_update().overall_status();
        println!("   → {status}");
        if status.is_terminal() {
            break;
        }
        if updates.changed().await.is_err() {
            break;
        }
    }

    let loan = orchestrator.get_status(id)?;
    report(&loan);

    if let Some(value) = orchestrator.fact(FactKind::TargetValue, chain_b, deployment.target()) {
        println!("   Target value on {chain_b}: {}", value.value());
    }

    Ok(())
}

fn report(state: &xchain_flashloan::OperationState) {
    for step in state.steps() {
        println!(
            "   tx {} on {}: {:?}",
            step.tx_hash(),
            step.chain(),
            step.status()
        );
    }
    match state.last_error() {
        Some(error) => println!("   ❌ {}: {}", state.overall_status(), error),
        None => println!("   ✅ {}", state.overall_status()),
    }
}
