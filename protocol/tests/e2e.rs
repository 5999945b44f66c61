//! End-to-end integration tests for COSIGN.
//!
//! These tests drive a full coordinator against a simulated multisig
//! contract: owners sign typed data, the coordinator collects and verifies
//! approvals, and the reconciler executes once quorum is reached. The
//! contract double recovers every signature itself, so a digest mismatch
//! anywhere in the pipeline fails the execution, not just a unit test.
//!
//! Each test stands alone with its own store and contract. No shared
//! state, no ordering dependencies.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{address, Address, U256};
use futures::future::join_all;

use cosign_protocol::action::{decode_withdraw, Withdrawal};
use cosign_protocol::config::{CoordinatorConfig, DomainConfig, SignatureOrder};
use cosign_protocol::coordinator::{Coordinator, CoordinatorError};
use cosign_protocol::crypto::{Signature, SignerKey};
use cosign_protocol::execution::{FailureKind, RetryPolicy, SimulatedMultisig};
use cosign_protocol::ledger::{MemoryStore, ProposalStatus, RecordStore, SledStore};
use cosign_protocol::signing::{LocalSigner, TypedDataSigner};
use cosign_protocol::Action;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

const MULTISIG: Address = address!("17C47F4E087B6c8f5DE0EAcf87fFD5fEe45a90e6");

/// Three owners, threshold two, contract at `nonce`.
struct Harness<S> {
    owners: Vec<SignerKey>,
    chain: Arc<SimulatedMultisig>,
    coordinator: Arc<Coordinator<S, SimulatedMultisig>>,
}

fn harness_with<S: RecordStore>(
    store: S,
    nonce: u64,
    order: SignatureOrder,
    chain: impl FnOnce(SimulatedMultisig) -> SimulatedMultisig,
) -> Harness<S> {
    let owners: Vec<SignerKey> = (0..3).map(|_| SignerKey::generate()).collect();
    let addresses: Vec<Address> = owners.iter().map(SignerKey::address).collect();
    let domain = DomainConfig::new(MULTISIG);

    let chain = Arc::new(chain(SimulatedMultisig::new(
        &domain,
        addresses.clone(),
        2,
        nonce,
    )));
    let config = CoordinatorConfig::new(domain)
        .with_owners(addresses)
        .with_signature_order(order);
    let coordinator =
        Coordinator::new(config, store, chain.clone()).expect("valid coordinator config");

    Harness {
        owners,
        chain,
        coordinator: Arc::new(coordinator),
    }
}

fn harness(nonce: u64) -> Harness<MemoryStore> {
    harness_with(MemoryStore::new(), nonce, SignatureOrder::Insertion, |c| c)
}

fn sample_action() -> Action {
    Action::new(
        address!("0000000000000000000000000000000000000abc"),
        U256::ZERO,
        vec![0x12u8, 0x34],
    )
}

impl<S: RecordStore> Harness<S> {
    fn sign(&self, owner: usize, action: &Action, nonce: u64) -> Signature {
        let digest = self.coordinator.message_for(action, nonce).signing_hash();
        self.owners[owner].sign_digest(&digest)
    }

    fn address(&self, owner: usize) -> Address {
        self.owners[owner].address()
    }

    async fn propose(&self, owner: usize, action: &Action, nonce: u64) {
        self.coordinator
            .propose(action, nonce, self.address(owner), self.sign(owner, action, nonce))
            .await
            .expect("propose");
    }

    fn approve(&self, owner: usize, action: &Action, nonce: u64) {
        self.coordinator
            .approve(nonce, self.address(owner), self.sign(owner, action, nonce))
            .expect("approve");
    }

    /// Propose with owner 0 and approve with owner 1.
    async fn confirm(&self, action: &Action, nonce: u64) {
        self.propose(0, action, nonce).await;
        self.approve(1, action, nonce);
    }
}

// ---------------------------------------------------------------------------
// Full lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn propose_approve_finalize_execute() {
    let h = harness(5);
    let action = sample_action();

    h.propose(0, &action, 5).await;
    let pending = h.coordinator.get_proposal(5).unwrap();
    assert_eq!(pending.status(), ProposalStatus::Pending);
    assert_eq!(pending.approvals(), 1);

    h.approve(1, &action, 5);
    let confirmed = h.coordinator.get_proposal(5).unwrap();
    assert_eq!(confirmed.status(), ProposalStatus::Confirmed);

    let finalized = h.coordinator.finalize(5).unwrap();
    assert_eq!(finalized.action, action);
    assert_eq!(finalized.signers, vec![h.address(0), h.address(1)]);
    assert_eq!(
        finalized.signatures,
        vec![h.sign(0, &action, 5), h.sign(1, &action, 5)]
    );

    let receipt = h.coordinator.execute(5, &RetryPolicy::none()).await.unwrap();
    assert_eq!(receipt.nonce, 5);
    assert_eq!(receipt.signatures, 2);

    let executed = h.coordinator.get_proposal(5).unwrap();
    assert_eq!(executed.status(), ProposalStatus::Executed);
    assert_eq!(executed.receipt(), Some(&receipt));
    assert_eq!(h.chain.nonce(), 6);
}

#[tokio::test]
async fn proposing_ahead_of_chain_is_stale() {
    let h = harness(5);
    let action = sample_action();

    let err = h
        .coordinator
        .propose(&action, 7, h.address(0), h.sign(0, &action, 7))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoordinatorError::StaleNonce {
            proposed: 7,
            onchain: 5
        }
    ));
    assert!(h.coordinator.list().unwrap().is_empty());
}

#[tokio::test]
async fn next_nonce_opens_after_execution() {
    let h = harness(5);
    let action = sample_action();
    h.confirm(&action, 5).await;
    h.coordinator.execute(5, &RetryPolicy::none()).await.unwrap();

    // Slot 5 is gone, slot 6 is open.
    let err = h
        .coordinator
        .propose(&action, 5, h.address(2), h.sign(2, &action, 5))
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::StaleNonce { .. }));
    h.confirm(&action, 6).await;
    h.coordinator.execute(6, &RetryPolicy::none()).await.unwrap();
    assert_eq!(h.chain.nonce(), 7);
}

// ---------------------------------------------------------------------------
// Approval safety
// ---------------------------------------------------------------------------

/// Four owners, threshold three, contract at nonce 5: a proposal stays
/// open long enough for requests to race on it.
fn race_harness<S: RecordStore>(store: S) -> Harness<S> {
    let owners: Vec<SignerKey> = (0..4).map(|_| SignerKey::generate()).collect();
    let addresses: Vec<Address> = owners.iter().map(SignerKey::address).collect();
    let domain = DomainConfig::new(MULTISIG);
    let chain = Arc::new(SimulatedMultisig::new(&domain, addresses.clone(), 3, 5));
    let config = CoordinatorConfig::new(domain)
        .with_owners(addresses)
        .with_confirmations_required(3);
    let coordinator = Coordinator::new(config, store, chain.clone()).unwrap();
    Harness {
        owners,
        chain,
        coordinator: Arc::new(coordinator),
    }
}

async fn duplicate_approvals_admit_one<S: RecordStore + 'static>(store: S) {
    let h = race_harness(store);
    let action = sample_action();
    h.propose(0, &action, 5).await;

    let signature = h.sign(1, &action, 5);
    let account = h.address(1);
    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let coordinator = h.coordinator.clone();
            tokio::task::spawn_blocking(move || coordinator.approve(5, account, signature))
        })
        .collect();

    let mut accepted = 0;
    let mut duplicates = 0;
    for result in join_all(tasks).await {
        match result.unwrap() {
            Ok(_) => accepted += 1,
            Err(CoordinatorError::DuplicateApproval { .. }) => duplicates += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(accepted, 1);
    assert_eq!(duplicates, 7);

    let proposal = h.coordinator.get_proposal(5).unwrap();
    assert_eq!(proposal.approvals(), 2);
    assert_eq!(proposal.status(), ProposalStatus::Pending);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_duplicate_approvals_admit_one() {
    duplicate_approvals_admit_one(MemoryStore::new()).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_duplicate_approvals_admit_one_on_sled() {
    duplicate_approvals_admit_one(SledStore::open_temporary().unwrap()).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_proposals_for_one_nonce_agree_on_sled() {
    let h = race_harness(SledStore::open_temporary().unwrap());
    let action = sample_action();

    let tasks: Vec<_> = (0..4)
        .map(|owner| {
            let coordinator = h.coordinator.clone();
            let action = action.clone();
            let account = h.address(owner);
            let signature = h.sign(owner, &action, 5);
            tokio::spawn(async move { coordinator.propose(&action, 5, account, signature).await })
        })
        .collect();
    let proposals: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

    // One insert wins; every caller gets that proposal back.
    let stored = h.coordinator.get_proposal(5).unwrap();
    assert_eq!(stored.approvals(), 1);
    assert!(proposals.iter().all(|p| *p == stored));
    assert_eq!(h.coordinator.list().unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_distinct_approvals_count_exactly() {
    let h = harness(5);
    let action = sample_action();
    h.propose(0, &action, 5).await;

    let tasks: Vec<_> = [1usize, 2]
        .into_iter()
        .map(|owner| {
            let coordinator = h.coordinator.clone();
            let account = h.address(owner);
            let signature = h.sign(owner, &action, 5);
            tokio::task::spawn_blocking(move || coordinator.approve(5, account, signature))
        })
        .collect();
    let results: Vec<_> = join_all(tasks).await.into_iter().map(|r| r.unwrap()).collect();

    // Quorum is 2: one approval lands and confirms, the other finds the
    // proposal closed.
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().any(|r| matches!(
        r,
        Err(CoordinatorError::InvalidState {
            status: ProposalStatus::Confirmed,
            ..
        })
    )));
    let proposal = h.coordinator.get_proposal(5).unwrap();
    assert_eq!(proposal.status(), ProposalStatus::Confirmed);
    assert_eq!(proposal.approvals(), 2);
}

#[tokio::test]
async fn forged_approval_is_rejected() {
    let h = harness(5);
    let action = sample_action();
    h.propose(0, &action, 5).await;

    // Owner 2 signs, the request claims owner 1.
    let err = h
        .coordinator
        .approve(5, h.address(1), h.sign(2, &action, 5))
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::SignatureInvalid { .. }));

    let proposal = h.coordinator.get_proposal(5).unwrap();
    assert_eq!(proposal.approvals(), 1);
    assert!(!h.coordinator.is_approved_by(5, &h.address(1)).unwrap());
}

#[tokio::test]
async fn approval_for_a_different_action_is_rejected() {
    let h = harness(5);
    let action = sample_action();
    h.propose(0, &action, 5).await;

    let other = Action::new(Address::repeat_byte(0xee), U256::from(1), vec![0u8]);
    let err = h
        .coordinator
        .approve(5, h.address(1), h.sign(1, &other, 5))
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::SignatureInvalid { .. }));
}

#[tokio::test]
async fn non_owner_is_rejected() {
    let h = harness(5);
    let action = sample_action();
    let outsider = SignerKey::generate();
    let digest = h.coordinator.message_for(&action, 5).signing_hash();

    let err = h
        .coordinator
        .propose(&action, 5, outsider.address(), outsider.sign_digest(&digest))
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::UnknownSigner { .. }));
}

#[tokio::test]
async fn approving_executed_proposal_is_invalid_state() {
    let h = harness(5);
    let action = sample_action();
    h.confirm(&action, 5).await;
    h.coordinator.execute(5, &RetryPolicy::none()).await.unwrap();

    let err = h
        .coordinator
        .approve(5, h.address(2), h.sign(2, &action, 5))
        .unwrap_err();
    assert!(matches!(
        err,
        CoordinatorError::InvalidState {
            status: ProposalStatus::Executed,
            ..
        }
    ));
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

#[tokio::test]
async fn execute_twice_submits_once() {
    let h = harness(5);
    let action = sample_action();
    h.confirm(&action, 5).await;

    let first = h.coordinator.execute(5, &RetryPolicy::none()).await.unwrap();
    let second = h.coordinator.execute(5, &RetryPolicy::none()).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(h.chain.submissions(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_executes_submit_once() {
    let h = harness_with(MemoryStore::new(), 5, SignatureOrder::Insertion, |c| {
        c.with_latency(Duration::from_millis(20))
    });
    let action = sample_action();
    h.confirm(&action, 5).await;

    let tasks: Vec<_> = (0..6)
        .map(|_| {
            let coordinator = h.coordinator.clone();
            tokio::spawn(async move { coordinator.execute(5, &RetryPolicy::none()).await })
        })
        .collect();
    let receipts: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

    assert!(receipts.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(h.chain.submissions(), 1);
}

#[tokio::test]
async fn execute_before_quorum_is_invalid_state() {
    let h = harness(5);
    let action = sample_action();
    h.propose(0, &action, 5).await;

    let err = h
        .coordinator
        .execute(5, &RetryPolicy::none())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoordinatorError::InvalidState {
            status: ProposalStatus::Pending,
            remaining: 1,
            ..
        }
    ));
    assert_eq!(h.chain.submissions(), 0);
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let h = harness(5);
    let action = sample_action();
    h.confirm(&action, 5).await;
    h.chain.fail_transiently(2);

    h.coordinator
        .execute(5, &RetryPolicy::immediate(3))
        .await
        .unwrap();
    assert_eq!(
        h.coordinator.get_proposal(5).unwrap().status(),
        ProposalStatus::Executed
    );
}

#[tokio::test]
async fn revert_leaves_proposal_confirmed() {
    let h = harness(5);
    let action = sample_action();
    h.confirm(&action, 5).await;
    h.chain.revert_next();

    let err = h
        .coordinator
        .execute(5, &RetryPolicy::immediate(3))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoordinatorError::ExecutionFailed {
            kind: FailureKind::Terminal,
            ..
        }
    ));
    let proposal = h.coordinator.get_proposal(5).unwrap();
    assert_eq!(proposal.status(), ProposalStatus::Confirmed);
    assert!(proposal.receipt().is_none());
    assert_eq!(h.chain.submissions(), 1);
}

#[tokio::test]
async fn ascending_order_satisfies_strict_contract() {
    let h = harness_with(
        MemoryStore::new(),
        5,
        SignatureOrder::AscendingSigner,
        SimulatedMultisig::requiring_ascending_signers,
    );
    let action = sample_action();

    // Propose with the higher address so arrival order is descending.
    let (high, low) = if h.address(0) > h.address(1) { (0, 1) } else { (1, 0) };
    h.propose(high, &action, 5).await;
    h.approve(low, &action, 5);

    let finalized = h.coordinator.finalize(5).unwrap();
    assert_eq!(finalized.signers, vec![h.address(low), h.address(high)]);
    h.coordinator.execute(5, &RetryPolicy::none()).await.unwrap();
}

// ---------------------------------------------------------------------------
// Persistence and signing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ledger_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let action = sample_action();

    let h = harness_with(
        SledStore::open(dir.path()).unwrap(),
        5,
        SignatureOrder::Insertion,
        |c| c,
    );
    h.propose(0, &action, 5).await;
    h.coordinator.ledger().store().flush().unwrap();
    let owner0 = h.address(0);
    drop(h);

    let reopened = SledStore::open(dir.path()).unwrap();
    let proposal = reopened.load(5).unwrap().expect("proposal persisted");
    assert_eq!(proposal.status(), ProposalStatus::Pending);
    assert!(proposal.is_approved_by(&owner0));
    assert_eq!(Action::decode(proposal.action()).unwrap(), action);
}

#[tokio::test]
async fn local_signers_drive_a_withdrawal() {
    let h = harness(0);
    let token = address!("4a4a7CdF79bF88d20618f23647CC3fD4A0bea2f7");
    let withdrawal = Withdrawal {
        token,
        recipient: Address::repeat_byte(0x42),
        amount: U256::from(1_000_000u64),
    };
    let action = withdrawal.into_action(MULTISIG);

    let signers: Vec<LocalSigner> = h.owners.iter().cloned().map(LocalSigner::new).collect();
    let message = h.coordinator.message_for(&action, 0);

    let s0 = signers[0].sign_typed_data(&message).await.unwrap();
    h.coordinator
        .propose(&action, 0, signers[0].address(), s0)
        .await
        .unwrap();
    let s2 = signers[2].sign_typed_data(&message).await.unwrap();
    h.coordinator.approve(0, signers[2].address(), s2).unwrap();

    let finalized = h.coordinator.finalize(0).unwrap();
    assert_eq!(finalized.action.to, MULTISIG);
    assert_eq!(decode_withdraw(&finalized.action.data[..]).unwrap(), withdrawal);
    h.coordinator.execute(0, &RetryPolicy::none()).await.unwrap();
}
