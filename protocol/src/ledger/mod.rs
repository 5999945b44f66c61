//! # Approval Ledger
//!
//! The durable record of who approved what. One [`Proposal`] per nonce,
//! each carrying its confirmations and its lifecycle status.
//!
//! The ledger doesn't verify signatures (the coordinator does that before
//! calling in) and it doesn't talk to the chain (the reconciler does). What
//! it does own is consistency: every mutation runs inside the store's
//! atomic update, so the duplicate check, the append, and the quorum
//! transition happen as one step or not at all.

pub mod error;
pub mod proposal;
pub mod sled_store;
pub mod store;

use alloy_primitives::Address;
use tracing::{debug, info};

pub use error::LedgerError;
pub use proposal::{Confirmation, Progress, Proposal, ProposalStatus, Receipt, Transition};
pub use sled_store::SledStore;
pub use store::{MemoryStore, RecordStore, StoreError};

/// Outcome of [`ApprovalLedger::create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// The nonce was free and the proposal was stored.
    Created(Proposal),
    /// The nonce was taken; this is what's stored there.
    Existing(Proposal),
}

impl Admission {
    pub fn proposal(&self) -> &Proposal {
        match self {
            Self::Created(p) | Self::Existing(p) => p,
        }
    }

    pub fn into_proposal(self) -> Proposal {
        match self {
            Self::Created(p) | Self::Existing(p) => p,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Keyed store of proposals with lifecycle-checked mutations.
#[derive(Debug)]
pub struct ApprovalLedger<S> {
    store: S,
}

impl<S: RecordStore> ApprovalLedger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The proposal for `nonce`, or [`LedgerError::NotFound`].
    pub fn get(&self, nonce: u64) -> Result<Proposal, LedgerError> {
        self.find(nonce)?.ok_or(LedgerError::NotFound { nonce })
    }

    /// The proposal for `nonce`, if there is one.
    pub fn find(&self, nonce: u64) -> Result<Option<Proposal>, LedgerError> {
        Ok(self.store.load(nonce)?)
    }

    /// Store a new proposal unless its nonce is already taken.
    pub fn create(&self, proposal: Proposal) -> Result<Admission, LedgerError> {
        match self.store.create(&proposal)? {
            None => {
                info!(
                    nonce = proposal.nonce(),
                    status = %proposal.status(),
                    approvals = proposal.approvals(),
                    required = proposal.confirmations_required(),
                    "proposal created"
                );
                Ok(Admission::Created(proposal))
            }
            Some(existing) => {
                debug!(nonce = existing.nonce(), "nonce already has a proposal");
                Ok(Admission::Existing(existing))
            }
        }
    }

    /// Append a confirmation, flipping the proposal to `Confirmed` if it
    /// completes the quorum.
    ///
    /// The only way a confirmation gets into the ledger after creation.
    pub fn upsert_confirmation(
        &self,
        nonce: u64,
        confirmation: Confirmation,
    ) -> Result<(Proposal, Transition), LedgerError> {
        let account = confirmation.account;
        let mut transition = Transition::Unchanged;
        let proposal = self.store.update(nonce, &mut |p: &mut Proposal| {
            transition = p.apply_confirmation(confirmation.clone())?;
            Ok(())
        })?;

        match transition {
            Transition::QuorumReached => info!(
                nonce,
                %account,
                approvals = proposal.approvals(),
                "quorum reached, proposal confirmed"
            ),
            Transition::Unchanged => info!(
                nonce,
                %account,
                approvals = proposal.approvals(),
                required = proposal.confirmations_required(),
                "approval recorded"
            ),
        }
        Ok((proposal, transition))
    }

    /// Explicit forward status change. See [`Proposal::set_status`].
    pub fn set_status(&self, nonce: u64, status: ProposalStatus) -> Result<Proposal, LedgerError> {
        self.store
            .update(nonce, &mut |p: &mut Proposal| p.set_status(status))
    }

    /// Record a successful execution.
    pub fn mark_executed(&self, nonce: u64, receipt: Receipt) -> Result<Proposal, LedgerError> {
        let tx_hash = receipt.tx_hash;
        let proposal = self
            .store
            .update(nonce, &mut |p: &mut Proposal| p.mark_executed(receipt.clone()))?;
        info!(nonce, %tx_hash, "proposal executed");
        Ok(proposal)
    }

    /// Whether `account` has confirmed the proposal at `nonce`. An unknown
    /// nonce has no approvals, so it answers `false` rather than erroring.
    pub fn is_approved_by(&self, nonce: u64, account: &Address) -> Result<bool, LedgerError> {
        Ok(self
            .find(nonce)?
            .map(|p| p.is_approved_by(account))
            .unwrap_or(false))
    }

    pub fn highest_nonce(&self) -> Result<Option<u64>, LedgerError> {
        Ok(self.store.highest_nonce()?)
    }

    /// All proposals, ascending by nonce.
    pub fn list(&self) -> Result<Vec<Proposal>, LedgerError> {
        Ok(self.store.list()?)
    }
}
