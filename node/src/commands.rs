//! Subcommand implementations.
//!
//! Each command returns the JSON it wants printed; `main` owns stdout.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::{json, Value};

use cosign_protocol::action::{withdraw_calldata, Action, Withdrawal};
use cosign_protocol::config::{CoordinatorConfig, DomainConfig};
use cosign_protocol::coordinator::Coordinator;
use cosign_protocol::crypto::SignerKey;
use cosign_protocol::ledger::{Proposal, SledStore};
use cosign_protocol::signing::{LocalSigner, TypedDataCodec, TypedDataSigner};

use crate::cli::{
    ActionArgs, ApproveArgs, FinalizeArgs, GlobalArgs, IsApprovedArgs, ProposeArgs, ShowArgs,
    SignArgs, WithdrawArgs,
};
use crate::offline::OfflineChain;

/// A coordinator over the on-disk ledger.
pub type LedgerCoordinator = Coordinator<SledStore, OfflineChain>;

/// Resolve the coordinator config: the JSON file if given, then flags on top.
pub fn load_config(global: &GlobalArgs) -> Result<CoordinatorConfig> {
    let mut config = match &global.config {
        Some(path) => CoordinatorConfig::from_json_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => {
            let contract = global
                .contract
                .context("either --config or --contract is required")?;
            CoordinatorConfig::new(DomainConfig::new(contract))
        }
    };

    if let Some(contract) = global.contract {
        config.domain.verifying_contract = contract;
    }
    if let Some(chain_id) = global.chain_id {
        config.domain.chain_id = chain_id;
    }
    if let Some(threshold) = global.threshold {
        config.confirmations_required = threshold;
    }
    config.validate().context("invalid coordinator configuration")?;
    Ok(config)
}

/// Open the ledger in `--data-dir` behind a coordinator.
pub fn open_coordinator(
    global: &GlobalArgs,
    config: CoordinatorConfig,
    chain_nonce: Option<u64>,
) -> Result<LedgerCoordinator> {
    let path = global.data_dir.join("ledger");
    std::fs::create_dir_all(&path)
        .with_context(|| format!("failed to create ledger directory: {}", path.display()))?;
    let store = SledStore::open(&path)
        .with_context(|| format!("failed to open ledger at {}", path.display()))?;
    tracing::debug!(path = %path.display(), "ledger opened");

    Coordinator::new(config, store, Arc::new(OfflineChain::new(chain_nonce)))
        .context("failed to build coordinator")
}

fn action_from(args: &ActionArgs) -> Action {
    Action::new(args.to, args.value, args.data.clone())
}

// ---------------------------------------------------------------------------
// Signing
// ---------------------------------------------------------------------------

pub async fn sign(config: &CoordinatorConfig, args: &SignArgs) -> Result<Value> {
    let key = SignerKey::from_hex(&args.key).context("invalid signer key")?;
    let signer = LocalSigner::new(key);
    let action = action_from(&args.action);

    let message = TypedDataCodec::new(&config.domain).build_message(&action, args.nonce);
    let signature = signer
        .sign_typed_data(&message)
        .await
        .context("signing failed")?;

    Ok(json!({
        "signer": signer.address().to_string(),
        "nonce": args.nonce,
        "digest": message.signing_hash().to_string(),
        "signature": signature.to_hex(),
        "typed_data": message.typed_data_json(),
    }))
}

pub fn withdraw(config: &CoordinatorConfig, args: &WithdrawArgs) -> Value {
    let withdrawal = Withdrawal {
        token: args.token,
        recipient: args.recipient,
        amount: args.amount,
    };
    let action = withdrawal.into_action(config.domain.verifying_contract);
    json!({
        "calldata": withdraw_calldata(&withdrawal).to_string(),
        "action": {
            "to": action.to.to_string(),
            "value": action.value.to_string(),
            "data": action.data.to_string(),
        },
    })
}

// ---------------------------------------------------------------------------
// Ledger commands
// ---------------------------------------------------------------------------

pub async fn propose(coordinator: &LedgerCoordinator, args: &ProposeArgs) -> Result<Value> {
    let action = action_from(&args.action);
    let proposal = coordinator
        .propose(&action, args.nonce, args.proposer, args.signature)
        .await
        .with_context(|| format!("failed to propose nonce {}", args.nonce))?;
    Ok(proposal_json(&proposal))
}

pub fn approve(coordinator: &LedgerCoordinator, args: &ApproveArgs) -> Result<Value> {
    let proposal = coordinator
        .approve(args.nonce, args.account, args.signature)
        .with_context(|| format!("failed to approve nonce {}", args.nonce))?;
    Ok(proposal_json(&proposal))
}

pub fn show(coordinator: &LedgerCoordinator, args: &ShowArgs) -> Result<Value> {
    match args.nonce {
        Some(nonce) => Ok(proposal_json(&coordinator.get_proposal(nonce)?)),
        None => Ok(Value::Array(
            coordinator.list()?.iter().map(proposal_json).collect(),
        )),
    }
}

pub fn is_approved(coordinator: &LedgerCoordinator, args: &IsApprovedArgs) -> Result<Value> {
    let approved = coordinator.is_approved_by(args.nonce, &args.account)?;
    Ok(json!({
        "nonce": args.nonce,
        "account": args.account.to_string(),
        "approved": approved,
    }))
}

pub fn finalize(coordinator: &LedgerCoordinator, args: &FinalizeArgs) -> Result<Value> {
    let finalized = coordinator
        .finalize(args.nonce)
        .with_context(|| format!("nonce {} cannot be finalized", args.nonce))?;
    Ok(json!({
        "nonce": finalized.nonce,
        "to": coordinator.config().domain.verifying_contract.to_string(),
        "calldata": finalized.calldata().to_string(),
        "signers": finalized.signers.iter().map(ToString::to_string).collect::<Vec<_>>(),
        "signatures": finalized.signatures.iter().map(|s| s.to_hex()).collect::<Vec<_>>(),
    }))
}

/// Operator-facing view of a proposal.
pub fn proposal_json(proposal: &Proposal) -> Value {
    let action = match Action::decode(proposal.action()) {
        Ok(action) => json!({
            "to": action.to.to_string(),
            "value": action.value.to_string(),
            "data": action.data.to_string(),
        }),
        Err(e) => json!({ "raw": proposal.action().to_string(), "error": e.to_string() }),
    };
    let confirmations: Vec<Value> = proposal
        .confirmations()
        .iter()
        .map(|c| {
            json!({
                "account": c.account.to_string(),
                "signature": c.signature.to_hex(),
                "confirmed_at": c.confirmed_at.to_rfc3339(),
            })
        })
        .collect();

    json!({
        "nonce": proposal.nonce(),
        "status": proposal.status().as_str(),
        "approvals": format!("{}/{}", proposal.approvals(), proposal.confirmations_required()),
        "progress": proposal.progress().to_string(),
        "action": action,
        "confirmations": confirmations,
        "created_at": proposal.created_at().to_rfc3339(),
        "tx_hash": proposal.receipt().map(|r| r.tx_hash.to_string()),
    })
}
