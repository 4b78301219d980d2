//! Cryptographic primitives for transaction admission
//!
//! This module provides:
//! - Ed25519 key pairs, signing, and verification against account keys
//! - The message hasher producing the digest a transaction signs, a circom
//!   Poseidon sponge over BN254 scalar-field elements
//! - Name digests for account lookups

use crate::constants::NFT_CONTENT_HASH_LEN;
use crate::types::Signature;
use crate::{Error, Result};
use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField, Zero};
use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use light_poseidon::{Poseidon, PoseidonHasher};
use num_bigint::{BigInt, Sign};

/// Largest magnitude of an amount element in bytes, below the field modulus
pub const ELEMENT_LEN: usize = 31;

/// Most inputs one circom Poseidon permutation absorbs
const POSEIDON_WIDTH: usize = 12;

/// Ed25519 key pair for signing
#[derive(Debug)]
pub struct KeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        Self::from_seed(&rand::random::<[u8; 32]>())
    }

    /// Create from seed (32 bytes) - deterministic generation
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        let verifying_key = signing_key.verifying_key();

        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Get public key bytes
    pub fn public_key(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Public key in the hex form stored on accounts
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key())
    }

    /// Sign a message digest
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature::from_bytes(self.signing_key.sign(message).to_bytes())
    }
}

/// Parse an account's hex public key
pub fn parse_public_key(public_key: &str) -> Result<VerifyingKey> {
    let mut bytes = [0u8; 32];
    hex::decode_to_slice(public_key, &mut bytes)
        .map_err(|e| Error::MalformedSnapshot(format!("invalid public key hex: {}", e)))?;
    VerifyingKey::from_bytes(&bytes)
        .map_err(|e| Error::MalformedSnapshot(format!("invalid public key: {}", e)))
}

/// Verify `signature` over `msg_hash` with an account's hex public key
pub fn verify_signature(public_key: &str, msg_hash: &[u8; 32], signature: &Signature) -> Result<()> {
    let verifying_key = parse_public_key(public_key)?;
    let dalek_sig = DalekSignature::from_bytes(signature.as_bytes());
    verifying_key
        .verify(msg_hash, &dalek_sig)
        .map_err(|e| Error::InvalidSignature(format!("Verification failed: {}", e)))
}

/// Accumulates field elements and digests them into a message hash
///
/// Integers and amounts map to BN254 scalars, negatives as their field
/// negation. Up to twelve elements hash in one permutation; longer messages
/// chain, each round absorbing the previous digest followed by the next
/// eleven elements. Amounts above [`ELEMENT_LEN`] bytes make
/// [`MsgHasher::finalize`] fail.
#[derive(Debug, Default)]
pub struct MsgHasher {
    elements: Vec<Fr>,
    overflow: Option<String>,
}

impl MsgHasher {
    /// Empty hasher
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an integer field
    pub fn write_i64(&mut self, value: i64) -> &mut Self {
        let magnitude = Fr::from(value.unsigned_abs());
        self.elements.push(if value < 0 { -magnitude } else { magnitude });
        self
    }

    /// Append an amount field
    pub fn write_bigint(&mut self, value: &BigInt) -> &mut Self {
        let (sign, bytes) = value.to_bytes_be();
        if bytes.len() > ELEMENT_LEN {
            if self.overflow.is_none() {
                self.overflow = Some(format!("amount {} exceeds {} bytes", value, ELEMENT_LEN));
            }
            return self;
        }
        let magnitude = Fr::from_be_bytes_mod_order(&bytes);
        self.elements.push(if sign == Sign::Minus { -magnitude } else { magnitude });
        self
    }

    /// Append a 32-byte digest field, reduced into the scalar field
    pub fn write_digest(&mut self, digest: &[u8; 32]) -> &mut Self {
        self.elements.push(Fr::from_be_bytes_mod_order(digest));
        self
    }

    /// Finish and return the big-endian digest
    pub fn finalize(&self) -> Result<[u8; 32]> {
        if let Some(reason) = &self.overflow {
            return Err(Error::MalformedInput(reason.clone()));
        }
        let empty = [Fr::zero()];
        let elements = if self.elements.is_empty() { &empty[..] } else { &self.elements[..] };
        let (first, mut rest) = elements.split_at(elements.len().min(POSEIDON_WIDTH));
        let mut state = poseidon(first)?;
        while !rest.is_empty() {
            let (chunk, tail) = rest.split_at(rest.len().min(POSEIDON_WIDTH - 1));
            let mut inputs = Vec::with_capacity(chunk.len() + 1);
            inputs.push(state);
            inputs.extend_from_slice(chunk);
            state = poseidon(&inputs)?;
            rest = tail;
        }

        let bytes = state.into_bigint().to_bytes_be();
        let mut digest = [0u8; 32];
        digest[32 - bytes.len()..].copy_from_slice(&bytes);
        Ok(digest)
    }
}

fn poseidon(inputs: &[Fr]) -> Result<Fr> {
    let mut hasher = Poseidon::<Fr>::new_circom(inputs.len())
        .map_err(|e| Error::InvariantViolation(format!("poseidon setup: {}", e)))?;
    hasher
        .hash(inputs)
        .map_err(|e| Error::InvariantViolation(format!("poseidon hash: {}", e)))
}

/// Hash arbitrary bytes into a 32-byte digest field (used for name hashes)
pub fn digest_field(data: &[u8]) -> [u8; 32] {
    blake3::hash(data).into()
}

/// Decode an NFT content hash, which must be exactly 32 bytes of hex
pub fn parse_content_hash(content_hash: &str) -> Result<[u8; NFT_CONTENT_HASH_LEN]> {
    let bytes = hex::decode(content_hash)
        .map_err(|e| Error::MalformedInput(format!("invalid content hash hex: {}", e)))?;
    bytes.as_slice().try_into().map_err(|_| {
        Error::MalformedInput(format!(
            "content hash must be {} bytes, got {}",
            NFT_CONTENT_HASH_LEN,
            bytes.len()
        ))
    })
}

/// Random id for failure records
pub fn generate_uuid_v4() -> uuid::Uuid {
    uuid::Uuid::new_v4()
}
