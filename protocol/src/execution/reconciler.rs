//! # Execution Reconciler
//!
//! Submits finalized proposals and makes the ledger reflect what the chain
//! actually did. The ledger says `Executed` only after the service reports
//! a mined, successful transaction, never on the strength of having sent
//! one.
//!
//! ## Double submission
//!
//! Two guards keep a proposal from being sent twice:
//!
//! 1. Executions of the same nonce are serialized through a per-nonce
//!    async mutex. The second caller waits, then reloads the proposal.
//! 2. A proposal that is already `Executed` short-circuits to its stored
//!    receipt without touching the chain.
//!
//! Together these mean N concurrent `execute(5)` calls produce one
//! submission and N identical receipts.
//!
//! ## Nonce check
//!
//! Before every attempt the contract's nonce is re-read. If it has moved
//! past the proposal, the slot has been consumed (by us on an earlier
//! attempt whose response got lost, or by someone else). Retrying can't
//! fix that, and the ledger can't tell which of the two happened, so it's
//! reported as [`CoordinatorError::SlotConsumed`] for an operator to
//! reconcile against the chain.
//!
//! Lock entries live only while some caller holds or waits on them; the
//! last one out removes the entry.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::retry::{retry_transient, RetryPolicy};
use super::{ExecutionOutcome, ExecutionService, ServiceError};
use crate::config::SignatureOrder;
use crate::coordinator::{finalize_proposal, CoordinatorError, FinalizedExecution};
use crate::ledger::{ApprovalLedger, Receipt, RecordStore};
use crate::metrics::CoordinatorMetrics;

/// Drives `Confirmed -> Executed`.
pub struct Reconciler<S, E> {
    ledger: Arc<ApprovalLedger<S>>,
    chain: Arc<E>,
    order: SignatureOrder,
    in_flight: DashMap<u64, Arc<Mutex<()>>>,
    metrics: Option<CoordinatorMetrics>,
}

impl<S: RecordStore, E: ExecutionService> Reconciler<S, E> {
    pub fn new(ledger: Arc<ApprovalLedger<S>>, chain: Arc<E>, order: SignatureOrder) -> Self {
        Self {
            ledger,
            chain,
            order,
            in_flight: DashMap::new(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: CoordinatorMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Execute the proposal at `nonce` and record the receipt.
    ///
    /// Returns the stored receipt if the proposal already executed. A
    /// revert leaves the proposal `Confirmed` and comes back as
    /// [`CoordinatorError::ExecutionFailed`] with
    /// [`FailureKind::Terminal`](super::FailureKind::Terminal). A nonce that
    /// moved past the proposal comes back as
    /// [`CoordinatorError::SlotConsumed`].
    pub async fn execute(&self, nonce: u64, policy: &RetryPolicy) -> Result<Receipt, CoordinatorError> {
        // Unknown nonces never get a lock entry.
        self.ledger.get(nonce)?;

        let slot = self.slot(nonce);
        let result = {
            let _guard = slot.lock().await;
            self.execute_locked(nonce, policy).await
        };
        // Held by the map and by `slot`: nobody else is waiting.
        self.in_flight
            .remove_if(&nonce, |_, held| Arc::strong_count(held) <= 2);
        result
    }

    async fn execute_locked(&self, nonce: u64, policy: &RetryPolicy) -> Result<Receipt, CoordinatorError> {
        let proposal = self.ledger.get(nonce)?;
        if let Some(receipt) = proposal.receipt() {
            debug!(nonce, tx_hash = %receipt.tx_hash, "already executed, returning stored receipt");
            return Ok(receipt.clone());
        }

        let payload = finalize_proposal(&proposal, self.order)?;
        let consumed = SyncMutex::new(None);
        let result =
            retry_transient(policy, |attempt| self.attempt(&payload, attempt, &consumed)).await;

        if let Some(onchain) = consumed.into_inner() {
            return Err(self.slot_consumed(nonce, onchain));
        }

        match result {
            Ok(outcome) if outcome.success => {
                let receipt = Receipt {
                    tx_hash: outcome.tx_hash,
                    nonce,
                    signatures: payload.signatures.len(),
                    executed_at: Utc::now(),
                };
                self.ledger.mark_executed(nonce, receipt.clone())?;
                if let Some(metrics) = &self.metrics {
                    metrics.executions_succeeded_total.inc();
                }
                Ok(receipt)
            }
            Ok(outcome) => {
                let err = ServiceError::terminal(format!("transaction {} reverted", outcome.tx_hash));
                Err(self.failed(nonce, err))
            }
            Err(err) => Err(self.failed(nonce, err)),
        }
    }

    async fn attempt(
        &self,
        payload: &FinalizedExecution,
        attempt: u32,
        consumed: &SyncMutex<Option<u64>>,
    ) -> Result<ExecutionOutcome, ServiceError> {
        let onchain = self.chain.read_nonce().await?;
        if onchain > payload.nonce {
            *consumed.lock() = Some(onchain);
            return Err(ServiceError::terminal(format!(
                "nonce slot {} consumed (on-chain nonce is {onchain})",
                payload.nonce
            )));
        }
        if onchain < payload.nonce {
            return Err(ServiceError::terminal(format!(
                "nonce slot {} is not current yet (on-chain nonce is {onchain})",
                payload.nonce
            )));
        }

        if let Some(metrics) = &self.metrics {
            metrics.execution_attempts_total.inc();
        }
        info!(
            nonce = payload.nonce,
            attempt,
            signatures = payload.signatures.len(),
            "submitting execution"
        );
        self.chain.execute(payload).await
    }

    fn failed(&self, nonce: u64, err: ServiceError) -> CoordinatorError {
        warn!(nonce, kind = %err.kind, cause = %err.cause, "execution failed, proposal stays confirmed");
        if let Some(metrics) = &self.metrics {
            metrics
                .executions_failed_total
                .with_label_values(&[err.kind.as_str()])
                .inc();
        }
        CoordinatorError::execution(nonce, err)
    }

    fn slot_consumed(&self, nonce: u64, onchain: u64) -> CoordinatorError {
        warn!(
            nonce,
            onchain,
            "nonce slot consumed without a recorded receipt, reconcile by tx lookup"
        );
        if let Some(metrics) = &self.metrics {
            metrics
                .executions_failed_total
                .with_label_values(&["slot_consumed"])
                .inc();
        }
        CoordinatorError::SlotConsumed { nonce, onchain }
    }

    fn slot(&self, nonce: u64) -> Arc<Mutex<()>> {
        self.in_flight.entry(nonce).or_default().clone()
    }
}
