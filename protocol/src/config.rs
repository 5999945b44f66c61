//! # Coordinator Configuration & Constants
//!
//! Every magic number in COSIGN lives here. If you're hardcoding a constant
//! somewhere else, you're doing it wrong and you owe the team coffee.
//!
//! Two kinds of things live in this file:
//!
//! - **Constants** that define the defaults of the deployment we started
//!   from (the "Multisig" contract on chain 25925, 2-of-N).
//! - **[`CoordinatorConfig`]**, the runtime policy a coordinator is built
//!   with. The quorum threshold is policy, not code: it is read from here
//!   when a proposal is created and then frozen on the proposal.

use std::path::Path;
use std::time::Duration;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// EIP-712 Domain
// ---------------------------------------------------------------------------

/// Domain name the multisig contract hashes into its EIP-712 separator.
pub const DOMAIN_NAME: &str = "Multisig";

/// Domain version. Bumping this on the contract side invalidates every
/// outstanding signature, which is exactly the point.
pub const DOMAIN_VERSION: &str = "1.0.0";

/// Chain id of the network the reference deployment lives on.
pub const DEFAULT_CHAIN_ID: u64 = 25925;

// ---------------------------------------------------------------------------
// Quorum Policy
// ---------------------------------------------------------------------------

/// Default number of distinct confirmations required before execution.
/// Matches the 2-of-N contract the coordinator was first deployed against.
pub const DEFAULT_CONFIRMATIONS_REQUIRED: usize = 2;

/// Length of a recoverable ECDSA signature: `r (32) || s (32) || v (1)`.
pub const SIGNATURE_LENGTH: usize = 65;

// ---------------------------------------------------------------------------
// Execution Retry
// ---------------------------------------------------------------------------

/// Default number of attempts for a transient execution failure.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// First backoff between execution attempts. Doubles on each retry.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Ceiling on the backoff between execution attempts.
pub const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// How many times the sled store retries a compare-and-swap before giving
/// up on a contended proposal. Contention only happens between approvers of
/// the same nonce, so this is never reached in practice.
pub const STORE_CAS_MAX_ATTEMPTS: usize = 64;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while loading or validating a [`CoordinatorConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A quorum of zero would let anyone execute anything.
    #[error("confirmations_required must be at least 1")]
    ZeroThreshold,

    /// The threshold can never be met by the configured owner set.
    #[error("confirmations_required ({required}) exceeds the number of owners ({owners})")]
    ThresholdExceedsOwners {
        /// Configured threshold.
        required: usize,
        /// Number of configured owners.
        owners: usize,
    },

    /// The same owner is listed twice.
    #[error("duplicate owner in configuration: {0}")]
    DuplicateOwner(Address),

    /// The verifying contract is the zero address.
    #[error("verifying_contract must not be the zero address")]
    MissingVerifyingContract,

    /// The configuration file could not be read.
    #[error("failed to read config file: {0}")]
    Io(String),

    /// The configuration file is not valid JSON for this schema.
    #[error("failed to parse config file: {0}")]
    Parse(String),
}

// ---------------------------------------------------------------------------
// Configuration Types
// ---------------------------------------------------------------------------

/// The EIP-712 domain of the multisig contract.
///
/// Every field feeds the domain separator, so a signature produced for one
/// deployment (or one chain, or one contract version) never verifies
/// against another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainConfig {
    /// Contract name, as passed to its EIP-712 constructor.
    #[serde(default = "default_domain_name")]
    pub name: String,
    /// Contract version string.
    #[serde(default = "default_domain_version")]
    pub version: String,
    /// Chain the contract is deployed on.
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    /// Address of the multisig contract.
    pub verifying_contract: Address,
}

impl DomainConfig {
    /// Domain for `verifying_contract` with the default name, version, and chain.
    pub fn new(verifying_contract: Address) -> Self {
        Self {
            name: DOMAIN_NAME.to_string(),
            version: DOMAIN_VERSION.to_string(),
            chain_id: DEFAULT_CHAIN_ID,
            verifying_contract,
        }
    }

    /// Override the chain id.
    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }
}

/// Order in which finalized signatures are handed to the contract.
///
/// The contract's verifier decides this, not us. Contracts that dedupe
/// signers by requiring strictly increasing addresses need
/// `AscendingSigner`; contracts that just count distinct owners accept the
/// arrival order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureOrder {
    /// Order in which confirmations arrived.
    #[default]
    Insertion,
    /// Ascending by recovered signer address.
    AscendingSigner,
}

/// Runtime policy for a coordinator instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// EIP-712 domain the signatures are bound to.
    pub domain: DomainConfig,
    /// Threshold stamped onto every proposal created by this coordinator.
    #[serde(default = "default_confirmations_required")]
    pub confirmations_required: usize,
    /// Order of signatures in the finalized payload.
    #[serde(default)]
    pub signature_order: SignatureOrder,
    /// Accounts allowed to propose and approve. `None` accepts any account
    /// with a valid signature and leaves authorization to the contract.
    #[serde(default)]
    pub owners: Option<Vec<Address>>,
}

impl CoordinatorConfig {
    /// Config for `domain` with the default 2-confirmation policy.
    pub fn new(domain: DomainConfig) -> Self {
        Self {
            domain,
            confirmations_required: DEFAULT_CONFIRMATIONS_REQUIRED,
            signature_order: SignatureOrder::default(),
            owners: None,
        }
    }

    /// Override the confirmation threshold.
    pub fn with_confirmations_required(mut self, required: usize) -> Self {
        self.confirmations_required = required;
        self
    }

    /// Override the signature ordering.
    pub fn with_signature_order(mut self, order: SignatureOrder) -> Self {
        self.signature_order = order;
        self
    }

    /// Restrict proposers and approvers to `owners`.
    pub fn with_owners(mut self, owners: Vec<Address>) -> Self {
        self.owners = Some(owners);
        self
    }

    /// Load and validate a JSON config file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw =
            std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;
        let config: Self =
            serde_json::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the policy is satisfiable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.confirmations_required == 0 {
            return Err(ConfigError::ZeroThreshold);
        }
        if self.domain.verifying_contract == Address::ZERO {
            return Err(ConfigError::MissingVerifyingContract);
        }
        if let Some(owners) = &self.owners {
            for (i, owner) in owners.iter().enumerate() {
                if owners[..i].contains(owner) {
                    return Err(ConfigError::DuplicateOwner(*owner));
                }
            }
            if self.confirmations_required > owners.len() {
                return Err(ConfigError::ThresholdExceedsOwners {
                    required: self.confirmations_required,
                    owners: owners.len(),
                });
            }
        }
        Ok(())
    }

    /// Returns `true` if `account` may propose or approve.
    pub fn is_owner(&self, account: &Address) -> bool {
        match &self.owners {
            Some(owners) => owners.contains(account),
            None => true,
        }
    }
}

fn default_domain_name() -> String {
    DOMAIN_NAME.to_string()
}

fn default_domain_version() -> String {
    DOMAIN_VERSION.to_string()
}

fn default_chain_id() -> u64 {
    DEFAULT_CHAIN_ID
}

fn default_confirmations_required() -> usize {
    DEFAULT_CONFIRMATIONS_REQUIRED
}
