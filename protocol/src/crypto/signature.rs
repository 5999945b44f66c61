//! # Recoverable ECDSA Signatures
//!
//! The 65-byte `r || s || v` signatures that wallets return from
//! `eth_signTypedData_v4` and that the multisig contract feeds to
//! `ecrecover`.
//!
//! The one operation that matters here is [`Signature::recover`]: given
//! the digest that was supposedly signed, work out *who* signed it. The
//! coordinator never takes an approver's word for their identity; it
//! recovers the signer and compares.
//!
//! ## Strictness
//!
//! We reject everything the contract would reject, and a bit more:
//!
//! - wrong length (anything but 65 bytes),
//! - a recovery byte other than 0, 1, 27, or 28,
//! - high-s signatures (EIP-2 malleability; OpenZeppelin's `ECDSA`
//!   refuses them too),
//! - `r`/`s` values that do not parse or do not recover to a point.
//!
//! Hardware wallets sometimes hand back `v` as 0/1. Recovery accepts that,
//! but `ecrecover` does not, so anything that ends up in calldata goes
//! through [`Signature::normalized`] first.

use std::fmt;

use alloy_primitives::{Address, B256};
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, SECP256K1};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use super::keys::address_from_public_key;
use crate::config::SIGNATURE_LENGTH;

/// Why a signature could not be turned into a signer address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("signature must be {expected} bytes, got {actual}")]
    WrongLength { expected: usize, actual: usize },

    #[error("invalid signature hex encoding")]
    InvalidHex,

    #[error("invalid recovery id {0} (expected 0, 1, 27, or 28)")]
    InvalidRecoveryId(u8),

    #[error("non-canonical signature: s is in the upper half of the curve order")]
    NonCanonical,

    #[error("malformed signature: {0}")]
    Malformed(String),

    #[error("signer could not be recovered: {0}")]
    Unrecoverable(String),
}

/// A 65-byte recoverable ECDSA signature.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature {
    bytes: [u8; SIGNATURE_LENGTH],
}

impl Signature {
    /// Wrap raw `r || s || v` bytes.
    pub fn from_bytes(bytes: [u8; SIGNATURE_LENGTH]) -> Self {
        Self { bytes }
    }

    /// Copy a signature out of a slice, checking its length.
    pub fn try_from_slice(slice: &[u8]) -> Result<Self, SignatureError> {
        let bytes: [u8; SIGNATURE_LENGTH] =
            slice.try_into().map_err(|_| SignatureError::WrongLength {
                expected: SIGNATURE_LENGTH,
                actual: slice.len(),
            })?;
        Ok(Self { bytes })
    }

    /// Parse a hex signature, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, SignatureError> {
        let stripped = s.trim().trim_start_matches("0x");
        let bytes = hex::decode(stripped).map_err(|_| SignatureError::InvalidHex)?;
        Self::try_from_slice(&bytes)
    }

    /// `0x`-prefixed hex, the form wallets and explorers display.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.bytes))
    }

    /// Raw signature bytes.
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.bytes
    }

    /// The recovery byte as it was submitted.
    pub fn v(&self) -> u8 {
        self.bytes[SIGNATURE_LENGTH - 1]
    }

    /// `true` if `v` is 27 or 28, the only values `ecrecover` accepts.
    pub fn has_ethereum_v(&self) -> bool {
        matches!(self.v(), 27 | 28)
    }

    /// The same signature with a 0/1 recovery byte rewritten to 27/28.
    /// Any other `v` is left alone.
    pub fn normalized(&self) -> Self {
        let mut bytes = self.bytes;
        if let v @ (0 | 1) = bytes[SIGNATURE_LENGTH - 1] {
            bytes[SIGNATURE_LENGTH - 1] = v + 27;
        }
        Self { bytes }
    }

    /// Recover the address that produced this signature over `digest`.
    pub fn recover(&self, digest: &B256) -> Result<Address, SignatureError> {
        let recoverable = self.to_recoverable()?;

        let mut standard = recoverable.to_standard();
        let submitted = standard.serialize_compact();
        standard.normalize_s();
        if standard.serialize_compact() != submitted {
            return Err(SignatureError::NonCanonical);
        }

        let message = Message::from_digest(digest.0);
        let public_key = SECP256K1
            .recover_ecdsa(&message, &recoverable)
            .map_err(|e| SignatureError::Unrecoverable(e.to_string()))?;
        Ok(address_from_public_key(&public_key))
    }

    fn to_recoverable(&self) -> Result<RecoverableSignature, SignatureError> {
        let v = self.v();
        let normalized = match v {
            27 | 28 => v - 27,
            0 | 1 => v,
            other => return Err(SignatureError::InvalidRecoveryId(other)),
        };
        let recovery_id = RecoveryId::from_i32(i32::from(normalized))
            .map_err(|_| SignatureError::InvalidRecoveryId(v))?;
        RecoverableSignature::from_compact(&self.bytes[..64], recovery_id)
            .map_err(|e| SignatureError::Malformed(e.to_string()))
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex_str = hex::encode(self.bytes);
        write!(f, "Signature(0x{}...{})", &hex_str[..8], &hex_str[122..])
    }
}

impl std::str::FromStr for Signature {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

// Hex in JSON, raw bytes in bincode.
impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            serializer.serialize_bytes(&self.bytes)
        }
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Self::from_hex(&s).map_err(D::Error::custom)
        } else {
            let bytes = Vec::<u8>::deserialize(deserializer)?;
            Self::try_from_slice(&bytes).map_err(D::Error::custom)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::SignerKey;
    use alloy_primitives::keccak256;

    #[test]
    fn recover_returns_signer_address() {
        let key = SignerKey::generate();
        let digest = keccak256(b"approve nonce 5");
        let sig = key.sign_digest(&digest);
        assert_eq!(sig.recover(&digest).unwrap(), key.address());
    }

    #[test]
    fn recover_over_other_digest_yields_other_address() {
        let key = SignerKey::generate();
        let sig = key.sign_digest(&keccak256(b"nonce 5"));
        let recovered = sig.recover(&keccak256(b"nonce 6")).unwrap();
        assert_ne!(recovered, key.address());
    }

    #[test]
    fn zero_one_recovery_bytes_accepted() {
        let key = SignerKey::generate();
        let digest = keccak256(b"legacy v");
        let mut bytes = *key.sign_digest(&digest).as_bytes();
        bytes[64] -= 27;
        let sig = Signature::from_bytes(bytes);
        assert_eq!(sig.recover(&digest).unwrap(), key.address());
    }

    #[test]
    fn normalized_rewrites_legacy_v_only() {
        let key = SignerKey::generate();
        let digest = keccak256(b"normalize");
        let sig = key.sign_digest(&digest);
        assert!(sig.has_ethereum_v());
        assert_eq!(sig.normalized(), sig);

        let mut bytes = *sig.as_bytes();
        bytes[64] -= 27;
        let legacy = Signature::from_bytes(bytes);
        assert!(!legacy.has_ethereum_v());
        assert_eq!(legacy.normalized(), sig);
        assert_eq!(legacy.normalized().recover(&digest).unwrap(), key.address());

        bytes[64] = 29;
        assert_eq!(Signature::from_bytes(bytes).normalized().v(), 29);
    }

    #[test]
    fn bad_recovery_byte_rejected() {
        let key = SignerKey::generate();
        let digest = keccak256(b"bad v");
        let mut bytes = *key.sign_digest(&digest).as_bytes();
        bytes[64] = 29;
        assert_eq!(
            Signature::from_bytes(bytes).recover(&digest),
            Err(SignatureError::InvalidRecoveryId(29))
        );
    }

    #[test]
    fn high_s_rejected() {
        // secp256k1 group order n. Flipping s -> n - s (and v) yields a
        // second valid signature for the same key; we refuse it.
        const N: [u8; 32] = [
            0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
            0xFF, 0xFE, 0xBA, 0xAE, 0xDC, 0xE6, 0xAF, 0x48, 0xA0, 0x3B, 0xBF, 0xD2, 0x5E, 0x8C,
            0xD0, 0x36, 0x41, 0x41,
        ];
        let key = SignerKey::generate();
        let digest = keccak256(b"malleable");
        let mut bytes = *key.sign_digest(&digest).as_bytes();

        let mut borrow = 0i16;
        for i in (0..32).rev() {
            let diff = N[i] as i16 - bytes[32 + i] as i16 - borrow;
            borrow = if diff < 0 { 1 } else { 0 };
            bytes[32 + i] = (diff + if diff < 0 { 256 } else { 0 }) as u8;
        }
        bytes[64] = if bytes[64] == 27 { 28 } else { 27 };

        assert_eq!(
            Signature::from_bytes(bytes).recover(&digest),
            Err(SignatureError::NonCanonical)
        );
    }

    #[test]
    fn wrong_length_rejected() {
        assert_eq!(
            Signature::try_from_slice(&[0u8; 64]),
            Err(SignatureError::WrongLength {
                expected: 65,
                actual: 64
            })
        );
        assert_eq!(
            Signature::from_hex("0xzz"),
            Err(SignatureError::InvalidHex)
        );
    }

    #[test]
    fn zeroed_signature_does_not_recover() {
        let mut bytes = [0u8; 65];
        bytes[64] = 27;
        assert!(Signature::from_bytes(bytes)
            .recover(&keccak256(b"x"))
            .is_err());
    }

    #[test]
    fn hex_and_json_forms_roundtrip() {
        let key = SignerKey::generate();
        let sig = key.sign_digest(&keccak256(b"serde"));

        assert!(sig.to_hex().starts_with("0x"));
        assert_eq!(sig.to_hex().len(), 2 + 130);
        assert_eq!(Signature::from_hex(&sig.to_hex()).unwrap(), sig);

        let json = serde_json::to_string(&sig).unwrap();
        assert_eq!(json, format!("\"{}\"", sig.to_hex()));
        let back: Signature = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sig);

        let bin = bincode::serialize(&sig).unwrap();
        let back: Signature = bincode::deserialize(&bin).unwrap();
        assert_eq!(back, sig);
    }
}
