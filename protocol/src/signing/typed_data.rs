//! EIP-712 typed data for `TransactionRequest`.
//!
//! The message an owner signs is
//!
//! ```text
//! TransactionRequest(address to,uint256 value,bytes data,uint256 nonce)
//! ```
//!
//! under the domain
//!
//! ```text
//! EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)
//! ```
//!
//! and the digest is `keccak256(0x19 0x01 || domainSeparator || hashStruct)`.
//! The contract computes exactly the same digest before `ecrecover`, so any
//! byte of difference between us and it shows up as "wrong signer".

use std::borrow::Cow;

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{sol, Eip712Domain, SolStruct};
use serde_json::{json, Value};

use crate::action::Action;
use crate::config::DomainConfig;

sol! {
    struct TransactionRequest {
        address to;
        uint256 value;
        bytes data;
        uint256 nonce;
    }
}

/// Builds [`StructuredMessage`]s for one multisig deployment.
#[derive(Debug, Clone)]
pub struct TypedDataCodec {
    domain: Eip712Domain,
}

impl TypedDataCodec {
    pub fn new(config: &DomainConfig) -> Self {
        let domain = Eip712Domain::new(
            Some(Cow::Owned(config.name.clone())),
            Some(Cow::Owned(config.version.clone())),
            Some(U256::from(config.chain_id)),
            Some(config.verifying_contract),
            None,
        );
        Self { domain }
    }

    /// The EIP-712 domain messages are bound to.
    pub fn domain(&self) -> &Eip712Domain {
        &self.domain
    }

    /// Build the message an owner signs to approve `action` at `nonce`.
    ///
    /// Pure function of its inputs: same action, same nonce, same domain,
    /// same digest.
    pub fn build_message(&self, action: &Action, nonce: u64) -> StructuredMessage {
        StructuredMessage {
            domain: self.domain.clone(),
            to: action.to,
            value: action.value,
            data: action.data.clone(),
            nonce,
        }
    }
}

/// A `TransactionRequest` bound to its domain, ready to hash or sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredMessage {
    domain: Eip712Domain,
    to: Address,
    value: U256,
    data: Bytes,
    nonce: u64,
}

impl StructuredMessage {
    pub fn domain(&self) -> &Eip712Domain {
        &self.domain
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// The action this message approves.
    pub fn action(&self) -> Action {
        Action::new(self.to, self.value, self.data.clone())
    }

    /// The `sol!` struct the hashes are computed over.
    pub fn request(&self) -> TransactionRequest {
        TransactionRequest {
            to: self.to,
            value: self.value,
            data: self.data.clone(),
            nonce: U256::from(self.nonce),
        }
    }

    pub fn domain_separator(&self) -> B256 {
        self.domain.separator()
    }

    pub fn struct_hash(&self) -> B256 {
        self.request().eip712_hash_struct()
    }

    /// The 32-byte digest that gets signed and recovered against.
    pub fn signing_hash(&self) -> B256 {
        self.request().eip712_signing_hash(&self.domain)
    }

    /// The `eth_signTypedData_v4` payload for this message, for handing to
    /// an external wallet.
    pub fn typed_data_json(&self) -> Value {
        let mut domain = serde_json::Map::new();
        if let Some(name) = &self.domain.name {
            domain.insert("name".into(), json!(name));
        }
        if let Some(version) = &self.domain.version {
            domain.insert("version".into(), json!(version));
        }
        if let Some(chain_id) = &self.domain.chain_id {
            domain.insert("chainId".into(), json!(chain_id.to_string()));
        }
        if let Some(contract) = &self.domain.verifying_contract {
            domain.insert("verifyingContract".into(), json!(contract.to_checksum(None)));
        }

        json!({
            "types": {
                "EIP712Domain": [
                    { "name": "name", "type": "string" },
                    { "name": "version", "type": "string" },
                    { "name": "chainId", "type": "uint256" },
                    { "name": "verifyingContract", "type": "address" },
                ],
                "TransactionRequest": [
                    { "name": "to", "type": "address" },
                    { "name": "value", "type": "uint256" },
                    { "name": "data", "type": "bytes" },
                    { "name": "nonce", "type": "uint256" },
                ],
            },
            "primaryType": "TransactionRequest",
            "domain": Value::Object(domain),
            "message": {
                "to": self.to.to_checksum(None),
                "value": self.value.to_string(),
                "data": format!("0x{}", hex::encode(&self.data)),
                "nonce": self.nonce.to_string(),
            },
        })
    }
}
