//! Turning a confirmed proposal into something the contract can run.

use alloy_primitives::{Address, Bytes};

use super::error::CoordinatorError;
use crate::action::{execute_calldata, Action};
use crate::config::SignatureOrder;
use crate::crypto::Signature;
use crate::ledger::{Proposal, ProposalStatus};

/// The aggregated payload for `executeTransaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedExecution {
    /// Nonce slot this execution consumes.
    pub nonce: u64,
    /// The decoded action.
    pub action: Action,
    /// Signatures in submission order.
    pub signatures: Vec<Signature>,
    /// Signer of each entry in `signatures`, same order.
    pub signers: Vec<Address>,
}

impl FinalizedExecution {
    /// ABI calldata for `executeTransaction(signatures, to, value, data)`.
    pub fn calldata(&self) -> Bytes {
        execute_calldata(&self.signatures, &self.action)
    }
}

/// Build the execution payload for a `Confirmed` proposal.
pub fn finalize_proposal(
    proposal: &Proposal,
    order: SignatureOrder,
) -> Result<FinalizedExecution, CoordinatorError> {
    match proposal.status() {
        ProposalStatus::Confirmed => {}
        ProposalStatus::Pending => {
            return Err(CoordinatorError::InvalidState {
                nonce: proposal.nonce(),
                status: proposal.status(),
                remaining: proposal.remaining(),
                detail: proposal.progress().to_string(),
            })
        }
        ProposalStatus::Executed => {
            return Err(CoordinatorError::InvalidState {
                nonce: proposal.nonce(),
                status: proposal.status(),
                remaining: 0,
                detail: "already executed".into(),
            })
        }
    }

    let action = Action::decode(proposal.action())?;

    // `ecrecover` only takes v = 27/28.
    let mut pairs: Vec<(Address, Signature)> = proposal
        .confirmations()
        .iter()
        .map(|c| (c.account, c.signature.normalized()))
        .collect();
    if order == SignatureOrder::AscendingSigner {
        pairs.sort_by_key(|(account, _)| *account);
    }
    let (signers, signatures): (Vec<Address>, Vec<Signature>) = pairs.into_iter().unzip();

    Ok(FinalizedExecution {
        nonce: proposal.nonce(),
        action,
        signatures,
        signers,
    })
}
