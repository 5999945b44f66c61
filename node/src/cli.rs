//! # CLI Interface
//!
//! Defines the command-line argument structure for `cosign-node` using
//! `clap` derive. Every subcommand works against a local sled ledger in
//! `--data-dir`; nothing here talks to a chain.

use alloy_primitives::{Address, Bytes, U256};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use cosign_protocol::crypto::Signature;

/// COSIGN operator CLI.
///
/// Collects owner signatures for an EVM multisig, tracks them in a local
/// ledger until the quorum is met, and prints the `executeTransaction`
/// calldata to broadcast.
#[derive(Parser, Debug)]
#[command(
    name = "cosign-node",
    about = "COSIGN multisig coordination CLI",
    version,
    propagate_version = true
)]
pub struct CosignCli {
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Directory holding the proposal ledger. Created on first use.
    #[arg(long, short = 'd', env = "COSIGN_DATA_DIR", default_value = ".cosign", global = true)]
    pub data_dir: PathBuf,

    /// Coordinator config file (JSON). Flags below override its values.
    #[arg(long, short = 'c', env = "COSIGN_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Address of the multisig contract (the EIP-712 verifying contract).
    #[arg(long, env = "COSIGN_CONTRACT", global = true)]
    pub contract: Option<Address>,

    /// Chain id of the EIP-712 domain.
    #[arg(long, env = "COSIGN_CHAIN_ID", global = true)]
    pub chain_id: Option<u64>,

    /// Confirmations required before a proposal can execute.
    #[arg(long, env = "COSIGN_THRESHOLD", global = true)]
    pub threshold: Option<usize>,

    /// Log format: pretty or json.
    #[arg(long, env = "COSIGN_LOG_FORMAT", default_value = "pretty", global = true)]
    pub log_format: String,

    /// Default log level when RUST_LOG is unset.
    #[arg(long, env = "COSIGN_LOG_LEVEL", default_value = "warn", global = true)]
    pub log_level: String,
}

/// Top-level subcommands for the COSIGN binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sign the typed-data approval for an action at a nonce.
    Sign(SignArgs),
    /// Build `withdrawKToken` calldata and the action that carries it.
    WithdrawCalldata(WithdrawArgs),
    /// Open a proposal with the proposer's signature.
    Propose(ProposeArgs),
    /// Add an owner's approval to a pending proposal.
    Approve(ApproveArgs),
    /// Print one proposal, or all of them.
    Show(ShowArgs),
    /// Check whether an account has approved a proposal.
    IsApproved(IsApprovedArgs),
    /// Print the `executeTransaction` calldata for a confirmed proposal.
    Finalize(FinalizeArgs),
    /// Print version information and exit.
    Version,
}

/// The `(to, value, data)` triple a proposal executes.
#[derive(Args, Debug, Clone)]
pub struct ActionArgs {
    /// Call target.
    #[arg(long)]
    pub to: Address,

    /// Wei to send, decimal or 0x-prefixed hex.
    #[arg(long, default_value = "0")]
    pub value: U256,

    /// Calldata, 0x-prefixed hex.
    #[arg(long, default_value = "0x")]
    pub data: Bytes,
}

/// Arguments for the `sign` subcommand.
#[derive(Args, Debug)]
pub struct SignArgs {
    #[command(flatten)]
    pub action: ActionArgs,

    /// Multisig nonce the approval is for.
    #[arg(long)]
    pub nonce: u64,

    /// Hex-encoded secp256k1 private key.
    ///
    /// **Never pass this flag on a shared machine**. Use the environment
    /// variable or, better, a hardware wallet.
    #[arg(long, env = "COSIGN_SIGNER_KEY", hide_env_values = true)]
    pub key: String,
}

/// Arguments for the `withdraw-calldata` subcommand.
#[derive(Args, Debug)]
pub struct WithdrawArgs {
    /// Token contract to withdraw.
    #[arg(long)]
    pub token: Address,

    /// Recipient of the tokens.
    #[arg(long)]
    pub recipient: Address,

    /// Amount in the token's smallest unit.
    #[arg(long)]
    pub amount: U256,
}

/// Arguments for the `propose` subcommand.
#[derive(Args, Debug)]
pub struct ProposeArgs {
    #[command(flatten)]
    pub action: ActionArgs,

    /// Nonce to propose for.
    #[arg(long)]
    pub nonce: u64,

    /// The contract's current nonce, as read from the chain.
    #[arg(long)]
    pub chain_nonce: u64,

    /// Account claiming to have signed.
    #[arg(long)]
    pub proposer: Address,

    /// 65-byte signature, 0x-prefixed hex.
    #[arg(long)]
    pub signature: Signature,
}

/// Arguments for the `approve` subcommand.
#[derive(Args, Debug)]
pub struct ApproveArgs {
    /// Nonce of the proposal.
    #[arg(long)]
    pub nonce: u64,

    /// Account claiming to have signed.
    #[arg(long)]
    pub account: Address,

    /// 65-byte signature, 0x-prefixed hex.
    #[arg(long)]
    pub signature: Signature,
}

/// Arguments for the `show` subcommand.
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Nonce to show. Omit to list every proposal.
    #[arg(long)]
    pub nonce: Option<u64>,
}

/// Arguments for the `is-approved` subcommand.
#[derive(Args, Debug)]
pub struct IsApprovedArgs {
    #[arg(long)]
    pub nonce: u64,

    #[arg(long)]
    pub account: Address,
}

/// Arguments for the `finalize` subcommand.
#[derive(Args, Debug)]
pub struct FinalizeArgs {
    #[arg(long)]
    pub nonce: u64,
}
