//! An in-process stand-in for the multisig contract.
//!
//! [`SimulatedMultisig`] checks a submission the way the contract does:
//! it rebuilds the typed-data digest from its own nonce, recovers every
//! signature, requires distinct owners up to its threshold, and bumps its
//! nonce on success. Anything that would revert on chain comes back as a
//! mined-but-failed [`ExecutionOutcome`].
//!
//! Like `ecrecover`, it only accepts a recovery byte of 27 or 28.
//!
//! It can also be told to misbehave: fail the next N calls at the transport
//! level, lose the response to a submission that did execute, or revert the
//! next submission outright. That's how the retry and revert paths get
//! exercised without a chain.

use std::time::Duration;

use alloy_primitives::{keccak256, Address, B256};
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::{ExecutionOutcome, ExecutionService, ServiceError};
use crate::config::DomainConfig;
use crate::coordinator::FinalizedExecution;
use crate::signing::TypedDataCodec;

#[derive(Debug, Default)]
struct ChainState {
    nonce: u64,
    submissions: usize,
    transient_failures: u32,
    lose_next_response: bool,
    revert_next: bool,
}

/// Simulated multisig contract implementing [`ExecutionService`].
#[derive(Debug)]
pub struct SimulatedMultisig {
    codec: TypedDataCodec,
    owners: Vec<Address>,
    threshold: usize,
    ascending_signers: bool,
    latency: Duration,
    state: Mutex<ChainState>,
}

impl SimulatedMultisig {
    /// A contract at `domain.verifying_contract` with the given owners and
    /// threshold, currently at `nonce`.
    pub fn new(domain: &DomainConfig, owners: Vec<Address>, threshold: usize, nonce: u64) -> Self {
        Self {
            codec: TypedDataCodec::new(domain),
            owners,
            threshold,
            ascending_signers: false,
            latency: Duration::ZERO,
            state: Mutex::new(ChainState {
                nonce,
                ..ChainState::default()
            }),
        }
    }

    /// Reject submissions whose signers aren't strictly ascending, like
    /// contracts that dedupe owners that way.
    pub fn requiring_ascending_signers(mut self) -> Self {
        self.ascending_signers = true;
        self
    }

    /// Delay every `execute` call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail the next `times` execute calls with a transient error.
    pub fn fail_transiently(&self, times: u32) {
        self.state.lock().transient_failures = times;
    }

    /// Execute the next submission but report a transport error to the
    /// caller, as when a node times out after broadcasting.
    pub fn lose_next_response(&self) {
        self.state.lock().lose_next_response = true;
    }

    /// Revert the next submission regardless of its contents.
    pub fn revert_next(&self) {
        self.state.lock().revert_next = true;
    }

    /// Submissions that reached the contract (mined, successful or not).
    pub fn submissions(&self) -> usize {
        self.state.lock().submissions
    }

    pub fn nonce(&self) -> u64 {
        self.state.lock().nonce
    }

    /// Move the contract's nonce, e.g. to simulate someone else executing.
    pub fn set_nonce(&self, nonce: u64) {
        self.state.lock().nonce = nonce;
    }

    fn process(&self, payload: &FinalizedExecution) -> Result<ExecutionOutcome, ServiceError> {
        let mut state = self.state.lock();
        if state.transient_failures > 0 {
            state.transient_failures -= 1;
            return Err(ServiceError::transient("simulated RPC timeout"));
        }

        state.submissions += 1;
        let calldata = payload.calldata();
        let mut preimage = calldata.to_vec();
        preimage.extend_from_slice(&state.nonce.to_be_bytes());
        preimage.extend_from_slice(&(state.submissions as u64).to_be_bytes());
        let tx_hash = keccak256(&preimage);

        if state.revert_next {
            state.revert_next = false;
            return Ok(reverted(tx_hash, "forced revert"));
        }
        if let Err(reason) = self.check_signatures(payload, state.nonce) {
            return Ok(reverted(tx_hash, &reason));
        }

        state.nonce += 1;
        debug!(nonce = payload.nonce, %tx_hash, "simulated execution succeeded");
        if state.lose_next_response {
            state.lose_next_response = false;
            return Err(ServiceError::transient("simulated timeout after broadcast"));
        }
        Ok(ExecutionOutcome {
            tx_hash,
            success: true,
        })
    }

    fn check_signatures(&self, payload: &FinalizedExecution, nonce: u64) -> Result<(), String> {
        let digest = self
            .codec
            .build_message(&payload.action, nonce)
            .signing_hash();

        let mut seen: Vec<Address> = Vec::with_capacity(payload.signatures.len());
        for signature in &payload.signatures {
            if !signature.has_ethereum_v() {
                return Err(format!("invalid signature v value {}", signature.v()));
            }
            let signer = signature
                .recover(&digest)
                .map_err(|e| format!("bad signature: {e}"))?;
            if !self.owners.contains(&signer) {
                return Err(format!("{signer} is not an owner"));
            }
            if seen.contains(&signer) {
                return Err(format!("{signer} signed twice"));
            }
            if self.ascending_signers {
                if let Some(last) = seen.last() {
                    if signer <= *last {
                        return Err("signers not in ascending order".into());
                    }
                }
            }
            seen.push(signer);
        }

        if seen.len() < self.threshold {
            return Err(format!(
                "{} signatures, threshold is {}",
                seen.len(),
                self.threshold
            ));
        }
        Ok(())
    }
}

fn reverted(tx_hash: B256, reason: &str) -> ExecutionOutcome {
    debug!(%tx_hash, reason, "simulated execution reverted");
    ExecutionOutcome {
        tx_hash,
        success: false,
    }
}

#[async_trait]
impl ExecutionService for SimulatedMultisig {
    async fn read_nonce(&self) -> Result<u64, ServiceError> {
        Ok(self.nonce())
    }

    async fn execute(&self, payload: &FinalizedExecution) -> Result<ExecutionOutcome, ServiceError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.process(payload)
    }
}
