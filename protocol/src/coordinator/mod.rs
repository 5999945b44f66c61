//! # Quorum Coordinator
//!
//! The state machine that turns signatures into executions. Every public
//! operation here is something an owner (or their tooling) asks for:
//!
//! ```text
//!  propose ──► Pending ──approve──► Pending ──approve──► Confirmed ──execute──► Executed
//!                                    (count < required)  (count == required)  │
//!                                                             ▲                │ revert
//!                                                             └────────────────┘
//! ```
//!
//! ## Trust model
//!
//! The coordinator trusts nobody's word about who signed what. Every
//! proposal and approval carries a claimed account and a signature; the
//! signature is recovered against the typed-data digest for that exact
//! action and nonce, and if it doesn't come back as the claimed account,
//! nothing gets written. There is no path that appends a confirmation
//! without passing through the [`Verifier`].
//!
//! ## Nonces
//!
//! A proposal is only accepted for the contract's *current* nonce. Signing
//! for a future slot would produce signatures that can't execute until
//! every earlier slot is consumed, and signing for a past slot produces
//! signatures that can never execute at all. Either way, `StaleNonce`.

pub mod error;
pub mod finalize;

use std::sync::Arc;

use alloy_primitives::Address;
use tracing::{debug, info, warn};

use crate::action::Action;
use crate::config::CoordinatorConfig;
use crate::crypto::Signature;
use crate::execution::{ExecutionService, Reconciler, RetryPolicy};
use crate::ledger::{
    Admission, ApprovalLedger, Confirmation, Proposal, ProposalStatus, Receipt, RecordStore,
    Transition,
};
use crate::metrics::CoordinatorMetrics;
use crate::signing::{RecoveringVerifier, StructuredMessage, TypedDataCodec, Verifier};

pub use error::CoordinatorError;
pub use finalize::{finalize_proposal, FinalizedExecution};

/// Coordinates proposals, approvals and execution for one multisig.
///
/// Generic over the record store, the execution service and the signature
/// verifier so each can be swapped independently. All methods take
/// `&self`; wrap the coordinator in an `Arc` to share it.
pub struct Coordinator<S, E, V = RecoveringVerifier> {
    config: CoordinatorConfig,
    codec: TypedDataCodec,
    ledger: Arc<ApprovalLedger<S>>,
    chain: Arc<E>,
    verifier: V,
    reconciler: Reconciler<S, E>,
    metrics: Option<CoordinatorMetrics>,
}

impl<S: RecordStore, E: ExecutionService> Coordinator<S, E> {
    /// A coordinator that verifies signatures by ECDSA recovery.
    ///
    /// Fails if `config` doesn't validate.
    pub fn new(config: CoordinatorConfig, store: S, chain: Arc<E>) -> Result<Self, CoordinatorError> {
        Self::with_verifier(config, store, chain, RecoveringVerifier)
    }
}

impl<S: RecordStore, E: ExecutionService, V: Verifier> Coordinator<S, E, V> {
    pub fn with_verifier(
        config: CoordinatorConfig,
        store: S,
        chain: Arc<E>,
        verifier: V,
    ) -> Result<Self, CoordinatorError> {
        config.validate()?;
        let codec = TypedDataCodec::new(&config.domain);
        let ledger = Arc::new(ApprovalLedger::new(store));
        let reconciler = Reconciler::new(ledger.clone(), chain.clone(), config.signature_order);
        Ok(Self {
            config,
            codec,
            ledger,
            chain,
            verifier,
            reconciler,
            metrics: None,
        })
    }

    /// Count operations into `metrics`.
    pub fn with_metrics(mut self, metrics: CoordinatorMetrics) -> Self {
        self.reconciler = self.reconciler.with_metrics(metrics.clone());
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn codec(&self) -> &TypedDataCodec {
        &self.codec
    }

    pub fn ledger(&self) -> &ApprovalLedger<S> {
        &self.ledger
    }

    /// The message owners sign to approve `action` at `nonce`.
    pub fn message_for(&self, action: &Action, nonce: u64) -> StructuredMessage {
        self.codec.build_message(action, nonce)
    }

    // -----------------------------------------------------------------------
    // Propose / approve
    // -----------------------------------------------------------------------

    /// Open a proposal for `action` at `nonce`, carrying the proposer's
    /// confirmation.
    ///
    /// `nonce` must be the contract's current nonce. If the nonce already
    /// has a proposal, that proposal is returned unchanged.
    pub async fn propose(
        &self,
        action: &Action,
        nonce: u64,
        proposer: Address,
        signature: Signature,
    ) -> Result<Proposal, CoordinatorError> {
        let result = self.try_propose(action, nonce, proposer, signature).await;
        self.observe("propose", nonce, result)
    }

    async fn try_propose(
        &self,
        action: &Action,
        nonce: u64,
        proposer: Address,
        signature: Signature,
    ) -> Result<Proposal, CoordinatorError> {
        self.check_owner(&proposer)?;

        let onchain = self
            .chain
            .read_nonce()
            .await
            .map_err(|e| CoordinatorError::execution(nonce, e))?;
        if nonce != onchain {
            return Err(CoordinatorError::StaleNonce {
                proposed: nonce,
                onchain,
            });
        }

        let message = self.codec.build_message(action, nonce);
        self.check_signature(&message, &signature, &proposer)?;

        let proposal = Proposal::new(
            nonce,
            action.encode(),
            self.config.confirmations_required,
            Confirmation::new(proposer, signature.normalized()),
        )?;

        match self.ledger.create(proposal)? {
            Admission::Created(proposal) => {
                if let Some(metrics) = &self.metrics {
                    metrics.proposals_created_total.inc();
                    if proposal.status() == ProposalStatus::Confirmed {
                        metrics.quorum_reached_total.inc();
                    }
                }
                Ok(proposal)
            }
            Admission::Existing(existing) => {
                if existing.action() != &action.encode() {
                    warn!(
                        nonce,
                        %proposer,
                        "nonce already has a proposal for a different action, returning it"
                    );
                } else {
                    debug!(nonce, %proposer, "re-proposal of an existing proposal");
                }
                Ok(existing)
            }
        }
    }

    /// Add `account`'s confirmation to the pending proposal at `nonce`.
    pub fn approve(
        &self,
        nonce: u64,
        account: Address,
        signature: Signature,
    ) -> Result<Proposal, CoordinatorError> {
        let result = self.try_approve(nonce, account, signature);
        self.observe("approve", nonce, result)
    }

    fn try_approve(
        &self,
        nonce: u64,
        account: Address,
        signature: Signature,
    ) -> Result<Proposal, CoordinatorError> {
        self.check_owner(&account)?;

        let proposal = self.ledger.get(nonce)?;
        if proposal.status() != ProposalStatus::Pending {
            return Err(CoordinatorError::InvalidState {
                nonce,
                status: proposal.status(),
                remaining: 0,
                detail: format!("no longer accepts approvals ({})", proposal.progress()),
            });
        }

        let action = Action::decode(proposal.action())?;
        let message = self.codec.build_message(&action, nonce);
        self.check_signature(&message, &signature, &account)?;

        let (proposal, transition) = self
            .ledger
            .upsert_confirmation(nonce, Confirmation::new(account, signature.normalized()))?;

        if let Some(metrics) = &self.metrics {
            metrics.approvals_accepted_total.inc();
            if transition == Transition::QuorumReached {
                metrics.quorum_reached_total.inc();
            }
        }
        Ok(proposal)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// The proposal at `nonce`.
    pub fn get_proposal(&self, nonce: u64) -> Result<Proposal, CoordinatorError> {
        Ok(self.ledger.get(nonce)?)
    }

    /// Whether `account` has confirmed the proposal at `nonce`. `false` for
    /// a nonce with no proposal.
    pub fn is_approved_by(&self, nonce: u64, account: &Address) -> Result<bool, CoordinatorError> {
        Ok(self.ledger.is_approved_by(nonce, account)?)
    }

    /// All proposals, ascending by nonce.
    pub fn list(&self) -> Result<Vec<Proposal>, CoordinatorError> {
        Ok(self.ledger.list()?)
    }

    // -----------------------------------------------------------------------
    // Finalize / execute
    // -----------------------------------------------------------------------

    /// The action and signatures for a `Confirmed` proposal, signatures in
    /// the configured order.
    pub fn finalize(&self, nonce: u64) -> Result<FinalizedExecution, CoordinatorError> {
        let result = self
            .ledger
            .get(nonce)
            .map_err(CoordinatorError::from)
            .and_then(|proposal| finalize_proposal(&proposal, self.config.signature_order));
        self.observe("finalize", nonce, result)
    }

    /// Execute the `Confirmed` proposal at `nonce` through the execution
    /// service, retrying transient failures under `policy`.
    ///
    /// Already executed proposals return their stored receipt.
    pub async fn execute(&self, nonce: u64, policy: &RetryPolicy) -> Result<Receipt, CoordinatorError> {
        let result = self.reconciler.execute(nonce, policy).await;
        let receipt = self.observe("execute", nonce, result)?;
        info!(nonce, tx_hash = %receipt.tx_hash, "execution reconciled");
        Ok(receipt)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn check_owner(&self, account: &Address) -> Result<(), CoordinatorError> {
        if self.config.is_owner(account) {
            Ok(())
        } else {
            Err(CoordinatorError::UnknownSigner { account: *account })
        }
    }

    fn check_signature(
        &self,
        message: &StructuredMessage,
        signature: &Signature,
        claimed: &Address,
    ) -> Result<(), CoordinatorError> {
        match self.verifier.recover(message, signature) {
            Ok(signer) if signer == *claimed => Ok(()),
            Ok(signer) => Err(CoordinatorError::SignatureInvalid {
                claimed: *claimed,
                reason: format!("signature recovers to {signer}"),
            }),
            Err(e) => Err(CoordinatorError::SignatureInvalid {
                claimed: *claimed,
                reason: e.to_string(),
            }),
        }
    }

    fn observe<T>(
        &self,
        operation: &'static str,
        nonce: u64,
        result: Result<T, CoordinatorError>,
    ) -> Result<T, CoordinatorError> {
        if let Err(err) = &result {
            warn!(operation, nonce, reason = err.label(), error = %err, "request rejected");
            if let Some(metrics) = &self.metrics {
                metrics.reject(err.label());
            }
        }
        result
    }
}
