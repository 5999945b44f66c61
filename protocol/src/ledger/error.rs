//! Error types for the approval ledger.

use alloy_primitives::Address;
use thiserror::Error;

use super::proposal::ProposalStatus;
use super::store::StoreError;

/// Errors from ledger reads and mutations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// No proposal exists for this nonce.
    #[error("no proposal for nonce {nonce}")]
    NotFound { nonce: u64 },

    /// The account has already confirmed this proposal.
    #[error("account {account} already approved nonce {nonce}")]
    DuplicateApproval {
        /// Proposal nonce.
        nonce: u64,
        /// The account that tried to approve twice.
        account: Address,
    },

    /// The proposal is past `Pending` and takes no more confirmations.
    #[error("proposal {nonce} is {status} and no longer accepts approvals")]
    ClosedForApproval {
        nonce: u64,
        status: ProposalStatus,
    },

    /// A status change the lifecycle doesn't allow.
    #[error("proposal {nonce}: invalid transition {from} -> {to}: {reason}")]
    InvalidTransition {
        nonce: u64,
        from: ProposalStatus,
        to: ProposalStatus,
        reason: String,
    },

    /// A proposal needs at least one confirmation to ever execute.
    #[error("proposal {nonce}: confirmations_required must be at least 1")]
    InvalidThreshold { nonce: u64 },

    /// The backing store failed.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}
