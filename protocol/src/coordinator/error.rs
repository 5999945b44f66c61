//! Error types for the quorum coordinator.
//!
//! Every coordinator operation that can fail returns a
//! [`CoordinatorError`]. Callers mostly care about three questions, and
//! the variants are grouped to answer them:
//!
//! 1. Was the request wrong? (`NotFound`, `DuplicateApproval`,
//!    `InvalidState`, `SignatureInvalid`, `StaleNonce`, `UnknownSigner`,
//!    `Action`)
//! 2. Did the chain refuse? (`ExecutionFailed`, with a [`FailureKind`];
//!    `SlotConsumed` when the chain moved on without us recording it)
//! 3. Is our own house on fire? (`Config`, `Storage`)

use alloy_primitives::Address;
use thiserror::Error;

use crate::action::ActionError;
use crate::config::ConfigError;
use crate::execution::{FailureKind, ServiceError};
use crate::ledger::{LedgerError, ProposalStatus};

#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// No proposal exists for this nonce.
    #[error("no proposal for nonce {nonce}")]
    NotFound { nonce: u64 },

    /// The account has already approved this proposal.
    #[error("account {account} already approved nonce {nonce}")]
    DuplicateApproval { nonce: u64, account: Address },

    /// The operation doesn't apply to a proposal in its current state.
    #[error("proposal {nonce} is {status}: {detail}")]
    InvalidState {
        nonce: u64,
        /// Status at the time of the call.
        status: ProposalStatus,
        /// Approvals still missing, zero unless the proposal is pending.
        remaining: usize,
        detail: String,
    },

    /// The signature doesn't recover to the claimed account.
    #[error("invalid signature from {claimed}: {reason}")]
    SignatureInvalid { claimed: Address, reason: String },

    /// The proposal targets a nonce other than the contract's current one.
    #[error("stale nonce: proposed {proposed}, on-chain nonce is {onchain}")]
    StaleNonce { proposed: u64, onchain: u64 },

    /// The execution service failed or the call reverted.
    #[error("execution of nonce {nonce} failed ({kind}): {cause}")]
    ExecutionFailed {
        nonce: u64,
        kind: FailureKind,
        cause: String,
    },

    /// The contract's nonce moved past the proposal before a receipt was
    /// recorded. An earlier attempt may have landed with its response lost,
    /// or someone else used the slot; only a transaction lookup can say.
    #[error(
        "nonce slot {nonce} consumed (on-chain nonce is {onchain}); \
         outcome unknown, reconcile by tx lookup"
    )]
    SlotConsumed { nonce: u64, onchain: u64 },

    /// The account isn't in the configured owner set.
    #[error("account {account} is not an owner of this multisig")]
    UnknownSigner { account: Address },

    /// The stored or submitted action payload is malformed.
    #[error("action error: {0}")]
    Action(#[from] ActionError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("storage error: {0}")]
    Storage(String),
}

impl CoordinatorError {
    /// Wrap an execution service failure for `nonce`.
    pub fn execution(nonce: u64, err: ServiceError) -> Self {
        Self::ExecutionFailed {
            nonce,
            kind: err.kind,
            cause: err.cause,
        }
    }

    /// `true` for failures where retrying later might succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ExecutionFailed {
                kind: FailureKind::Transient,
                ..
            }
        )
    }

    /// Short stable label, used as a metrics dimension.
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::DuplicateApproval { .. } => "duplicate_approval",
            Self::InvalidState { .. } => "invalid_state",
            Self::SignatureInvalid { .. } => "signature_invalid",
            Self::StaleNonce { .. } => "stale_nonce",
            Self::ExecutionFailed { .. } => "execution_failed",
            Self::SlotConsumed { .. } => "slot_consumed",
            Self::UnknownSigner { .. } => "unknown_signer",
            Self::Action(_) => "action",
            Self::Config(_) => "config",
            Self::Storage(_) => "storage",
        }
    }
}

impl From<LedgerError> for CoordinatorError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound { nonce } => Self::NotFound { nonce },
            LedgerError::DuplicateApproval { nonce, account } => {
                Self::DuplicateApproval { nonce, account }
            }
            LedgerError::ClosedForApproval { nonce, status } => Self::InvalidState {
                nonce,
                status,
                remaining: 0,
                detail: "no longer accepts approvals".into(),
            },
            LedgerError::InvalidTransition {
                nonce, from, reason, ..
            } => Self::InvalidState {
                nonce,
                status: from,
                remaining: 0,
                detail: reason,
            },
            LedgerError::InvalidThreshold { .. } => Self::Config(ConfigError::ZeroThreshold),
            LedgerError::Store(e) => Self::Storage(e.to_string()),
        }
    }
}
