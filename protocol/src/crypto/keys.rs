//! # Key Management
//!
//! secp256k1 signing keys and Ethereum-style addresses.
//!
//! COSIGN never stores keys: key custody belongs to the wallets of the
//! multisig owners. This module exists for the signer side of the flow
//! (the local typed-data signer, the CLI `sign` command) and for tests,
//! which need real keys to produce real signatures.
//!
//! ## Addresses
//!
//! An owner is identified by the last 20 bytes of the Keccak-256 hash of
//! its uncompressed public key (without the `0x04` prefix). That is the
//! same identity the contract recovers with `ecrecover`, so an address
//! derived here is directly comparable with what the chain sees.
//!
//! ## Security considerations
//!
//! - Secret keys come from `OsRng`. A candidate outside the curve order
//!   is discarded and redrawn.
//! - Key bytes are never logged, and `Debug` prints only the address.

use std::fmt;

use alloy_primitives::{keccak256, Address, B256};
use rand::rngs::OsRng;
use rand::RngCore;
use secp256k1::{Message, PublicKey, SecretKey, SECP256K1};
use thiserror::Error;

use super::signature::Signature;

/// Errors that can occur during key operations.
///
/// Deliberately says nothing about the key material itself.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid secret key: expected 32 bytes inside the secp256k1 curve order")]
    InvalidSecretKey,

    #[error("invalid secret key hex encoding")]
    InvalidHex,
}

/// A secp256k1 signing key belonging to one multisig owner.
///
/// Intentionally does NOT implement `Serialize`. Exporting a secret should
/// be a deliberate call to [`SignerKey::secret_bytes`], not a side effect of
/// shoving a struct into a JSON response.
pub struct SignerKey {
    secret: SecretKey,
}

impl SignerKey {
    /// Generate a fresh key from the OS cryptographic RNG.
    pub fn generate() -> Self {
        loop {
            let mut candidate = [0u8; 32];
            OsRng.fill_bytes(&mut candidate);
            if let Ok(secret) = SecretKey::from_slice(&candidate) {
                return Self { secret };
            }
        }
    }

    /// Build a key from raw 32-byte secret material.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, KeyError> {
        let secret = SecretKey::from_slice(bytes).map_err(|_| KeyError::InvalidSecretKey)?;
        Ok(Self { secret })
    }

    /// Parse a hex-encoded secret key, with or without a `0x` prefix.
    ///
    /// For devnets and tests. Production owners sign in their own wallets.
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        let stripped = hex_str.trim().trim_start_matches("0x");
        let bytes = hex::decode(stripped).map_err(|_| KeyError::InvalidHex)?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidSecretKey)?;
        Self::from_bytes(&arr)
    }

    /// The secp256k1 public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_secret_key(SECP256K1, &self.secret)
    }

    /// The owner address this key signs for.
    pub fn address(&self) -> Address {
        address_from_public_key(&self.public_key())
    }

    /// Sign a 32-byte digest and return a 65-byte recoverable signature.
    ///
    /// `v` is encoded as 27/28, the form wallets return from
    /// `eth_signTypedData_v4` and the form `ecrecover` expects. libsecp256k1
    /// always produces low-s signatures, so the result passes the
    /// canonical-s check in [`Signature::recover`].
    pub fn sign_digest(&self, digest: &B256) -> Signature {
        let message = Message::from_digest(digest.0);
        let recoverable = SECP256K1.sign_ecdsa_recoverable(&message, &self.secret);
        let (recovery_id, compact) = recoverable.serialize_compact();

        let mut bytes = [0u8; 65];
        bytes[..64].copy_from_slice(&compact);
        bytes[64] = 27 + recovery_id.to_i32() as u8;
        Signature::from_bytes(bytes)
    }

    /// Exports the raw secret key. Handle with extreme care.
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.secret_bytes()
    }
}

impl Clone for SignerKey {
    fn clone(&self) -> Self {
        Self {
            secret: self.secret,
        }
    }
}

impl fmt::Debug for SignerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print secret key material, not even partially.
        write!(f, "SignerKey(address={})", self.address())
    }
}

/// Derive the Ethereum address of a secp256k1 public key.
pub fn address_from_public_key(public_key: &PublicKey) -> Address {
    let uncompressed = public_key.serialize_uncompressed();
    let hash = keccak256(&uncompressed[1..]);
    Address::from_slice(&hash[12..])
}
