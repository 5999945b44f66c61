//! # Proposals and Their Lifecycle
//!
//! A [`Proposal`] is one candidate action for one on-chain nonce, together
//! with the confirmations collected for it so far.
//!
//! ```text
//!              confirm (count < required)
//!                  ┌──────┐
//!                  ▼      │
//!  propose ──▶ Pending ───┘
//!                  │
//!                  │ confirm (count == required)
//!                  ▼
//!              Confirmed ◀──┐
//!                  │        │ execution reverts
//!                  │        │
//!                  ├────────┘
//!                  │ execution succeeds
//!                  ▼
//!              Executed
//! ```
//!
//! Status only moves down that picture. [`Proposal::apply_confirmation`] is
//! the one place a confirmation lands and the one place `Pending` becomes
//! `Confirmed`; [`Proposal::mark_executed`] is the one place `Executed` is
//! reached. The ledger calls both from inside its atomic update path, so no
//! reader ever sees a proposal with enough confirmations still marked
//! `Pending`.

use std::fmt;

use alloy_primitives::{Address, Bytes, B256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::LedgerError;
use crate::crypto::Signature;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Where a proposal is in its lifecycle. Ordered: a proposal's status only
/// ever increases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProposalStatus {
    /// Collecting confirmations.
    Pending,
    /// Quorum reached, waiting for someone to submit it.
    Confirmed,
    /// Executed on chain. Terminal.
    Executed,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Executed => "executed",
        }
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One owner's verified approval of a proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    /// The owner who signed. Always the recovered signer, never a claim.
    pub account: Address,
    /// Their signature over the proposal's typed-data digest.
    pub signature: Signature,
    /// When the coordinator accepted it.
    pub confirmed_at: DateTime<Utc>,
}

impl Confirmation {
    pub fn new(account: Address, signature: Signature) -> Self {
        Self {
            account,
            signature,
            confirmed_at: Utc::now(),
        }
    }
}

/// Proof that a proposal ran on chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Hash of the transaction that executed the action.
    pub tx_hash: B256,
    /// Nonce slot the execution consumed.
    pub nonce: u64,
    /// Number of signatures submitted.
    pub signatures: usize,
    /// When the reconciler observed success.
    pub executed_at: DateTime<Utc>,
}

/// What a proposal needs next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// More owners need to sign.
    AwaitingApprovals { approvals: usize, required: usize },
    /// Quorum is in; someone needs to submit it.
    AwaitingExecution,
    /// Done.
    Executed { tx_hash: B256 },
}

impl Progress {
    /// Approvals still missing, zero once quorum is reached.
    pub fn remaining(&self) -> usize {
        match self {
            Self::AwaitingApprovals { approvals, required } => required.saturating_sub(*approvals),
            _ => 0,
        }
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwaitingApprovals { approvals, required } => write!(
                f,
                "awaiting approvals ({approvals}/{required}, {} remaining)",
                self.remaining()
            ),
            Self::AwaitingExecution => write!(f, "awaiting execution"),
            Self::Executed { tx_hash } => write!(f, "executed in {tx_hash}"),
        }
    }
}

/// Result of landing a confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Appended; still short of quorum.
    Unchanged,
    /// Appended, and this confirmation completed the quorum.
    QuorumReached,
}

// ---------------------------------------------------------------------------
// Proposal
// ---------------------------------------------------------------------------

/// A candidate action for one nonce and its approvals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    nonce: u64,
    action: Bytes,
    status: ProposalStatus,
    confirmations_required: usize,
    confirmations: Vec<Confirmation>,
    created_at: DateTime<Utc>,
    receipt: Option<Receipt>,
}

impl Proposal {
    /// Create a proposal carrying its proposer's confirmation.
    ///
    /// With `confirmations_required == 1` the proposal is born `Confirmed`.
    pub fn new(
        nonce: u64,
        action: Bytes,
        confirmations_required: usize,
        first: Confirmation,
    ) -> Result<Self, LedgerError> {
        if confirmations_required == 0 {
            return Err(LedgerError::InvalidThreshold { nonce });
        }
        let mut proposal = Self {
            nonce,
            action,
            status: ProposalStatus::Pending,
            confirmations_required,
            confirmations: Vec::new(),
            created_at: Utc::now(),
            receipt: None,
        };
        proposal.apply_confirmation(first)?;
        Ok(proposal)
    }

    /// Rebuild a proposal from stored parts. Only the storage layer should
    /// call this; the parts are trusted to satisfy the lifecycle invariants.
    pub(crate) fn from_parts(
        nonce: u64,
        action: Bytes,
        status: ProposalStatus,
        confirmations_required: usize,
        confirmations: Vec<Confirmation>,
        created_at: DateTime<Utc>,
        receipt: Option<Receipt>,
    ) -> Self {
        Self {
            nonce,
            action,
            status,
            confirmations_required,
            confirmations,
            created_at,
            receipt,
        }
    }

    // -- Accessors ----------------------------------------------------------

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// The ABI-encoded action payload.
    pub fn action(&self) -> &Bytes {
        &self.action
    }

    pub fn status(&self) -> ProposalStatus {
        self.status
    }

    pub fn confirmations_required(&self) -> usize {
        self.confirmations_required
    }

    /// Confirmations in arrival order.
    pub fn confirmations(&self) -> &[Confirmation] {
        &self.confirmations
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Set exactly when the proposal is `Executed`.
    pub fn receipt(&self) -> Option<&Receipt> {
        self.receipt.as_ref()
    }

    pub fn approvals(&self) -> usize {
        self.confirmations.len()
    }

    pub fn remaining(&self) -> usize {
        self.confirmations_required
            .saturating_sub(self.confirmations.len())
    }

    pub fn is_approved_by(&self, account: &Address) -> bool {
        self.confirmations.iter().any(|c| c.account == *account)
    }

    pub fn progress(&self) -> Progress {
        match (self.status, &self.receipt) {
            (ProposalStatus::Executed, Some(receipt)) => Progress::Executed {
                tx_hash: receipt.tx_hash,
            },
            (ProposalStatus::Executed, None) => Progress::Executed {
                tx_hash: B256::ZERO,
            },
            (ProposalStatus::Confirmed, _) => Progress::AwaitingExecution,
            (ProposalStatus::Pending, _) => Progress::AwaitingApprovals {
                approvals: self.approvals(),
                required: self.confirmations_required,
            },
        }
    }

    // -- Transitions --------------------------------------------------------

    /// Land a confirmation, flipping to `Confirmed` when it completes the
    /// quorum.
    ///
    /// Fails without modifying anything if the proposal is no longer
    /// `Pending` or the account has already confirmed.
    pub fn apply_confirmation(
        &mut self,
        confirmation: Confirmation,
    ) -> Result<Transition, LedgerError> {
        if self.status != ProposalStatus::Pending {
            return Err(LedgerError::ClosedForApproval {
                nonce: self.nonce,
                status: self.status,
            });
        }
        if self.is_approved_by(&confirmation.account) {
            return Err(LedgerError::DuplicateApproval {
                nonce: self.nonce,
                account: confirmation.account,
            });
        }

        self.confirmations.push(confirmation);
        if self.confirmations.len() >= self.confirmations_required {
            self.status = ProposalStatus::Confirmed;
            Ok(Transition::QuorumReached)
        } else {
            Ok(Transition::Unchanged)
        }
    }

    /// Explicit status change.
    ///
    /// Same-status is a no-op. Backward moves fail. `Pending -> Confirmed`
    /// is only allowed once quorum is actually there, and `Executed` can't
    /// be reached here at all: it needs a receipt, see
    /// [`Proposal::mark_executed`].
    pub fn set_status(&mut self, next: ProposalStatus) -> Result<(), LedgerError> {
        if next == self.status {
            return Ok(());
        }
        if next < self.status {
            return Err(self.invalid_transition(next, "status never moves backwards"));
        }
        match next {
            ProposalStatus::Confirmed if self.remaining() > 0 => Err(self.invalid_transition(
                next,
                &format!("{} more approvals needed", self.remaining()),
            )),
            ProposalStatus::Confirmed => {
                self.status = next;
                Ok(())
            }
            ProposalStatus::Executed => {
                Err(self.invalid_transition(next, "execution must be recorded with a receipt"))
            }
            ProposalStatus::Pending => Err(self.invalid_transition(next, "status never moves backwards")),
        }
    }

    /// `Confirmed -> Executed`, recording the receipt.
    pub fn mark_executed(&mut self, receipt: Receipt) -> Result<(), LedgerError> {
        if self.status != ProposalStatus::Confirmed {
            return Err(self.invalid_transition(
                ProposalStatus::Executed,
                "only confirmed proposals can be executed",
            ));
        }
        self.status = ProposalStatus::Executed;
        self.receipt = Some(receipt);
        Ok(())
    }

    fn invalid_transition(&self, to: ProposalStatus, reason: &str) -> LedgerError {
        LedgerError::InvalidTransition {
            nonce: self.nonce,
            from: self.status,
            to,
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SignerKey;
    use alloy_primitives::keccak256;

    fn confirmation(key: &SignerKey) -> Confirmation {
        Confirmation::new(key.address(), key.sign_digest(&keccak256(b"proposal")))
    }

    fn receipt(nonce: u64) -> Receipt {
        Receipt {
            tx_hash: B256::repeat_byte(0xee),
            nonce,
            signatures: 2,
            executed_at: Utc::now(),
        }
    }

    fn pending(required: usize) -> (Proposal, SignerKey) {
        let proposer = SignerKey::generate();
        let proposal =
            Proposal::new(5, Bytes::from_static(b"action"), required, confirmation(&proposer))
                .unwrap();
        (proposal, proposer)
    }

    #[test]
    fn new_proposal_counts_proposer() {
        let (proposal, proposer) = pending(2);
        assert_eq!(proposal.status(), ProposalStatus::Pending);
        assert_eq!(proposal.approvals(), 1);
        assert_eq!(proposal.remaining(), 1);
        assert!(proposal.is_approved_by(&proposer.address()));
        assert!(proposal.receipt().is_none());
        assert_eq!(
            proposal.progress(),
            Progress::AwaitingApprovals {
                approvals: 1,
                required: 2
            }
        );
    }

    #[test]
    fn threshold_of_one_is_born_confirmed() {
        let (proposal, _) = pending(1);
        assert_eq!(proposal.status(), ProposalStatus::Confirmed);
        assert_eq!(proposal.progress(), Progress::AwaitingExecution);
    }

    #[test]
    fn zero_threshold_rejected() {
        let key = SignerKey::generate();
        assert!(matches!(
            Proposal::new(1, Bytes::new(), 0, confirmation(&key)),
            Err(LedgerError::InvalidThreshold { nonce: 1 })
        ));
    }

    #[test]
    fn second_confirmation_reaches_quorum() {
        let (mut proposal, _) = pending(2);
        let second = SignerKey::generate();
        assert_eq!(
            proposal.apply_confirmation(confirmation(&second)).unwrap(),
            Transition::QuorumReached
        );
        assert_eq!(proposal.status(), ProposalStatus::Confirmed);
        assert_eq!(proposal.remaining(), 0);
    }

    #[test]
    fn below_quorum_stays_pending() {
        let (mut proposal, _) = pending(3);
        assert_eq!(
            proposal
                .apply_confirmation(confirmation(&SignerKey::generate()))
                .unwrap(),
            Transition::Unchanged
        );
        assert_eq!(proposal.status(), ProposalStatus::Pending);
        assert_eq!(proposal.progress().remaining(), 1);
    }

    #[test]
    fn duplicate_account_rejected_without_append() {
        let (mut proposal, proposer) = pending(3);
        let err = proposal
            .apply_confirmation(confirmation(&proposer))
            .unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateApproval { nonce: 5, .. }));
        assert_eq!(proposal.approvals(), 1);
    }

    #[test]
    fn confirmed_proposal_closed_for_approval() {
        let (mut proposal, _) = pending(1);
        let err = proposal
            .apply_confirmation(confirmation(&SignerKey::generate()))
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::ClosedForApproval {
                status: ProposalStatus::Confirmed,
                ..
            }
        ));
        assert_eq!(proposal.approvals(), 1);
    }

    #[test]
    fn confirmations_keep_arrival_order() {
        let (mut proposal, proposer) = pending(3);
        let b = SignerKey::generate();
        let c = SignerKey::generate();
        proposal.apply_confirmation(confirmation(&b)).unwrap();
        proposal.apply_confirmation(confirmation(&c)).unwrap();
        let order: Vec<Address> = proposal.confirmations().iter().map(|c| c.account).collect();
        assert_eq!(order, vec![proposer.address(), b.address(), c.address()]);
    }

    #[test]
    fn status_never_moves_backwards() {
        let (mut proposal, _) = pending(1);
        assert!(matches!(
            proposal.set_status(ProposalStatus::Pending),
            Err(LedgerError::InvalidTransition { .. })
        ));

        proposal.mark_executed(receipt(5)).unwrap();
        for status in [ProposalStatus::Pending, ProposalStatus::Confirmed] {
            assert!(proposal.set_status(status).is_err());
        }
        assert_eq!(proposal.status(), ProposalStatus::Executed);
    }

    #[test]
    fn same_status_is_noop() {
        let (mut proposal, _) = pending(2);
        proposal.set_status(ProposalStatus::Pending).unwrap();
        assert_eq!(proposal.status(), ProposalStatus::Pending);
    }

    #[test]
    fn confirmed_requires_quorum() {
        let (mut proposal, _) = pending(2);
        assert!(matches!(
            proposal.set_status(ProposalStatus::Confirmed),
            Err(LedgerError::InvalidTransition { .. })
        ));
        assert_eq!(proposal.status(), ProposalStatus::Pending);
    }

    #[test]
    fn executed_requires_receipt_path() {
        let (mut proposal, _) = pending(1);
        assert!(proposal.set_status(ProposalStatus::Executed).is_err());
        assert_eq!(proposal.status(), ProposalStatus::Confirmed);
    }

    #[test]
    fn pending_cannot_be_marked_executed() {
        let (mut proposal, _) = pending(2);
        assert!(proposal.mark_executed(receipt(5)).is_err());
        assert!(proposal.receipt().is_none());
    }

    #[test]
    fn executed_reports_tx_hash() {
        let (mut proposal, _) = pending(1);
        proposal.mark_executed(receipt(5)).unwrap();
        assert_eq!(
            proposal.progress(),
            Progress::Executed {
                tx_hash: B256::repeat_byte(0xee)
            }
        );
        assert_eq!(proposal.progress().remaining(), 0);
        assert!(proposal
            .apply_confirmation(confirmation(&SignerKey::generate()))
            .is_err());
    }

    #[test]
    fn status_display() {
        assert_eq!(ProposalStatus::Pending.to_string(), "pending");
        assert_eq!(ProposalStatus::Executed.to_string(), "executed");
        assert!(ProposalStatus::Pending < ProposalStatus::Confirmed);
        assert!(ProposalStatus::Confirmed < ProposalStatus::Executed);
    }
}
