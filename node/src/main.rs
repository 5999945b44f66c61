// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # COSIGN Operator CLI
//!
//! Entry point for the `cosign-node` binary. Parses CLI arguments,
//! initializes logging, and runs one subcommand against the local ledger.
//!
//! The binary supports these subcommands:
//!
//! - `sign`              sign the typed-data approval for an action
//! - `withdraw-calldata` build a `withdrawKToken` action
//! - `propose`           open a proposal at the current nonce
//! - `approve`           add an owner's approval
//! - `show`              print one or all proposals
//! - `is-approved`       check an account's approval
//! - `finalize`          print `executeTransaction` calldata
//! - `version`           print build version information
//!
//! Results go to stdout as JSON. Logs go to stderr.

mod cli;
mod commands;
mod logging;
mod offline;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;

use cli::{Commands, CosignCli};
use logging::LogFormat;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = CosignCli::parse();

    if let Commands::Version = cli.command {
        print_version();
        return Ok(());
    }

    logging::init_logging(
        &cli.global.log_level,
        LogFormat::from_str_lossy(&cli.global.log_format),
    );

    let output = run(cli).await?;
    let rendered = serde_json::to_string_pretty(&output).context("failed to render output")?;
    println!("{rendered}");
    Ok(())
}

async fn run(cli: CosignCli) -> Result<Value> {
    let global = cli.global;
    let config = commands::load_config(&global)?;
    tracing::debug!(
        contract = %config.domain.verifying_contract,
        chain_id = config.domain.chain_id,
        threshold = config.confirmations_required,
        "configuration loaded"
    );

    match cli.command {
        Commands::Sign(args) => commands::sign(&config, &args).await,
        Commands::WithdrawCalldata(args) => Ok(commands::withdraw(&config, &args)),
        Commands::Propose(args) => {
            let coordinator = commands::open_coordinator(&global, config, Some(args.chain_nonce))?;
            commands::propose(&coordinator, &args).await
        }
        Commands::Approve(args) => {
            let coordinator = commands::open_coordinator(&global, config, None)?;
            commands::approve(&coordinator, &args)
        }
        Commands::Show(args) => {
            let coordinator = commands::open_coordinator(&global, config, None)?;
            commands::show(&coordinator, &args)
        }
        Commands::IsApproved(args) => {
            let coordinator = commands::open_coordinator(&global, config, None)?;
            commands::is_approved(&coordinator, &args)
        }
        Commands::Finalize(args) => {
            let coordinator = commands::open_coordinator(&global, config, None)?;
            commands::finalize(&coordinator, &args)
        }
        Commands::Version => {
            print_version();
            Ok(Value::Null)
        }
    }
}

/// Prints version information to stdout.
fn print_version() {
    println!("cosign-node {}", env!("CARGO_PKG_VERSION"));
    println!(
        "eip712      {} v{}",
        cosign_protocol::config::DOMAIN_NAME,
        cosign_protocol::config::DOMAIN_VERSION
    );
    println!("rustc       {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}
