//! ECDSA P-256 primitives for signing and verification.

use crate::hash::{decode_hex, encode_hex, hex_bytes, Hash};
use p256::ecdsa::signature::{RandomizedSigner, Signer, Verifier};
use p256::ecdsa::{DerSignature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// An address on the blockchain: the SEC1 uncompressed encoding of the
/// owner's public key.
///
/// The empty address marks a spent output (tombstone).
#[derive(Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Address(#[serde(with = "hex_bytes")] pub Vec<u8>);

impl Address {
    /// The cleared owner field of a spent output.
    pub const TOMBSTONE: Self = Self(Vec::new());

    /// Create an address from raw bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Get the underlying bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Whether this is the tombstone marker of a spent output.
    pub fn is_tombstone(&self) -> bool {
        self.0.is_empty()
    }

    /// Convert to a lowercase hex string.
    pub fn to_hex(&self) -> String {
        encode_hex(&self.0)
    }

    /// Parse from a hex string (with or without 0x prefix).
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = decode_hex(s).map_err(|_| CryptoError::InvalidAddress)?;
        Ok(Self(bytes))
    }

    /// Recover the public key this address encodes.
    pub fn to_public_key(&self) -> Result<PublicKey, CryptoError> {
        PublicKey::from_sec1_bytes(&self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_tombstone() {
            return f.write_str("Address(<spent>)");
        }
        let hex = self.to_hex();
        write!(f, "Address({}..)", &hex[..hex.len().min(16)])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// An ASN.1 DER encoded ECDSA signature.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Signature(#[serde(with = "hex_bytes")] pub Vec<u8>);

impl Signature {
    /// Create a signature from raw bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Get the underlying bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Whether the signature field is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Convert to a hex string.
    pub fn to_hex(&self) -> String {
        encode_hex(&self.0)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "Signature({}...)", &hex[..hex.len().min(16)])
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Errors that can occur during cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid signature encoding")]
    InvalidSignature,
    #[error("invalid public key")]
    InvalidPublicKey,
    #[error("invalid private key")]
    InvalidPrivateKey,
    #[error("invalid address format")]
    InvalidAddress,
    #[error("signature verification failed")]
    VerificationFailed,
}

/// A public key for signature verification.
#[derive(Clone)]
pub struct PublicKey(pub VerifyingKey);

impl PublicKey {
    /// Parse a SEC1 encoded point.
    pub fn from_sec1_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        VerifyingKey::from_sec1_bytes(bytes)
            .map(Self)
            .map_err(|_| CryptoError::InvalidPublicKey)
    }

    /// Derive the address from this public key.
    pub fn to_address(&self) -> Address {
        Address(self.0.to_encoded_point(false).as_bytes().to_vec())
    }

    /// Verify a DER signature over `message` against this public key.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), CryptoError> {
        let sig = DerSignature::from_bytes(signature.as_bytes())
            .map_err(|_| CryptoError::InvalidSignature)?;
        self.0
            .verify(message, &sig)
            .map_err(|_| CryptoError::VerificationFailed)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({:?})", self.to_address())
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.to_address() == other.to_address()
    }
}

impl Eq for PublicKey {}

/// A keypair for signing and verification.
pub struct Keypair {
    signing_key: SigningKey,
    pub public_key: PublicKey,
}

impl Keypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::random(&mut OsRng))
    }

    /// Create a keypair from a private scalar (32 bytes).
    pub fn from_private_key(bytes: &[u8]) -> Result<Self, CryptoError> {
        let signing_key =
            SigningKey::from_slice(bytes).map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(Self::from_signing_key(signing_key))
    }

    /// Parse a hex encoded private scalar.
    pub fn from_private_key_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = decode_hex(s).map_err(|_| CryptoError::InvalidPrivateKey)?;
        Self::from_private_key(&bytes)
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let public_key = PublicKey(signing_key.verifying_key().clone());
        Self {
            signing_key,
            public_key,
        }
    }

    /// Get the private key bytes.
    pub fn private_key(&self) -> Vec<u8> {
        self.signing_key.to_bytes().to_vec()
    }

    /// Get the address derived from the public key.
    pub fn address(&self) -> Address {
        self.public_key.to_address()
    }

    /// Sign a message (SHA-256 digest, DER output).
    pub fn sign(&self, message: &[u8]) -> Signature {
        let sig: DerSignature = self.signing_key.sign(message);
        Signature(sig.as_bytes().to_vec())
    }

    /// Sign with a fresh random nonce, so signing the same message twice
    /// yields different signatures.
    pub fn sign_randomized(&self, message: &[u8]) -> Signature {
        let sig: DerSignature = self.signing_key.sign_with_rng(&mut OsRng, message);
        Signature(sig.as_bytes().to_vec())
    }

    /// Sign a hash directly.
    pub fn sign_hash(&self, hash: &Hash) -> Signature {
        self.sign(hash.as_bytes())
    }

    /// Verify a signature against our public key.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), CryptoError> {
        self.public_key.verify(message, signature)
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("address", &self.address())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_generation() {
        let kp = Keypair::generate();
        let addr = kp.address();
        assert_eq!(addr.as_bytes().len(), 65);
        assert_eq!(addr.as_bytes()[0], 0x04);
    }

    #[test]
    fn test_sign_and_verify() {
        let kp = Keypair::generate();
        let sig = kp.sign(b"hello world");
        assert!(kp.verify(b"hello world", &sig).is_ok());
    }

    #[test]
    fn test_randomized_signatures_differ() {
        let keypair = Keypair::generate();
        let a = keypair.sign_randomized(b"mint");
        let b = keypair.sign_randomized(b"mint");

        assert_ne!(a, b);
        assert!(keypair.verify(b"mint", &a).is_ok());
        assert!(keypair.verify(b"mint", &b).is_ok());
        assert_eq!(keypair.sign(b"mint"), keypair.sign(b"mint"));
    }

    #[test]
    fn test_wrong_message_fails() {
        let kp = Keypair::generate();
        let sig = kp.sign(b"hello");
        assert!(matches!(
            kp.verify(b"world", &sig),
            Err(CryptoError::VerificationFailed)
        ));
    }

    #[test]
    fn test_wrong_key_fails() {
        let kp1 = Keypair::generate();
        let kp2 = Keypair::generate();
        let sig = kp1.sign(b"hello");
        assert!(kp2.verify(b"hello", &sig).is_err());
    }

    #[test]
    fn test_garbage_signature_rejected() {
        let kp = Keypair::generate();
        let sig = Signature::from_bytes(b"not a der signature".to_vec());
        assert!(matches!(
            kp.verify(b"hello", &sig),
            Err(CryptoError::InvalidSignature)
        ));
    }

    #[test]
    fn test_address_roundtrips_to_public_key() {
        let kp = Keypair::generate();
        let pk = kp.address().to_public_key().unwrap();
        assert_eq!(pk, kp.public_key);
    }

    #[test]
    fn test_tombstone_is_not_a_key() {
        assert!(Address::TOMBSTONE.is_tombstone());
        assert!(Address::TOMBSTONE.to_public_key().is_err());
    }

    #[test]
    fn test_address_hex_roundtrip() {
        let addr = Keypair::generate().address();
        let parsed = Address::from_hex(&addr.to_hex()).unwrap();
        assert_eq!(addr, parsed);

        let prefixed = Address::from_hex(&format!("0x{}", addr.to_hex())).unwrap();
        assert_eq!(addr, prefixed);
    }

    #[test]
    fn test_keypair_from_private_key() {
        let kp1 = Keypair::generate();
        let kp2 = Keypair::from_private_key(&kp1.private_key()).unwrap();
        assert_eq!(kp1.address(), kp2.address());

        let kp3 = Keypair::from_private_key_hex(&hex::encode(kp1.private_key())).unwrap();
        assert_eq!(kp1.address(), kp3.address());
    }

    #[test]
    fn test_invalid_private_key() {
        assert!(Keypair::from_private_key(&[0u8; 32]).is_err());
        assert!(Keypair::from_private_key(&[1u8; 7]).is_err());
    }

    #[test]
    fn test_address_json_is_hex() {
        let addr = Address::from_bytes(vec![0xde, 0xad]);
        assert_eq!(serde_json::to_string(&addr).unwrap(), "\"dead\"");
    }
}
