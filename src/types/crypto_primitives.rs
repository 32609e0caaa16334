/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Cryptographic primitives.
//!
//! The definitions and re-exports in this module provide three categories of cryptographic primitives:
//! 1. **Cryptographic Hashes**: provided by the [`sha2`] crate.
//! 2. **Group and Scalar Arithmetic** for collective Schnorr signatures: provided by the
//!    [`curve25519_dalek`] crate's Ristretto group.
//! 3. **Transport Identities** of servers: Ed25519 keys provided by the [`ed25519_dalek`] crate.

use borsh::{BorshDeserialize, BorshSerialize};
use std::fmt::{self, Debug, Display, Formatter};

use super::basic::CryptoHash;

// re-exports below.
pub use sha2::Digest;
pub use sha2::Sha256 as CryptoHasher;
pub use sha2::Sha512 as ChallengeHasher;

pub use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT as GENERATOR;
pub use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
pub use curve25519_dalek::scalar::Scalar;
pub use curve25519_dalek::traits::Identity;

pub use ed25519_dalek::{SigningKey, VerifyingKey};

pub use rand_core::{OsRng, RngCore};

/// Hash an arbitrary byte sequence with [`CryptoHasher`].
pub fn hash(bytes: &[u8]) -> CryptoHash {
    let mut hasher = CryptoHasher::new();
    hasher.update(bytes);
    CryptoHash::new(hasher.finalize().into())
}

/// Hash a sequence of byte slices as if they were concatenated.
pub fn hash_all<'a>(parts: impl IntoIterator<Item = &'a [u8]>) -> CryptoHash {
    let mut hasher = CryptoHasher::new();
    for part in parts {
        hasher.update(part);
    }
    CryptoHash::new(hasher.finalize().into())
}

/// A collective signing public key: a compressed Ristretto point.
///
/// Public keys are ordered by their compressed encoding. This ordering is what gives children of a
/// signing tree node their "strict order".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn from_point(point: &RistrettoPoint) -> Self {
        Self(point.compress().to_bytes())
    }

    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }

    /// Decompress the key into a group element. Returns `None` if the bytes are not a valid encoding.
    pub fn point(&self) -> Option<RistrettoPoint> {
        CompressedRistretto(self.0).decompress()
    }
}

impl Display for PublicKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&CryptoHash::new(self.0), f)
    }
}

impl Debug for PublicKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

/// A collective signing keypair: a secret scalar `x` and the public point `X = x * G`.
#[derive(Clone)]
pub struct Keypair {
    secret: Scalar,
    public: RistrettoPoint,
}

impl Keypair {
    pub fn generate<R: RngCore + rand_core::CryptoRng>(csprng: &mut R) -> Keypair {
        Keypair::from_secret(Scalar::random(csprng))
    }

    pub fn from_secret(secret: Scalar) -> Keypair {
        Keypair {
            secret,
            public: secret * GENERATOR,
        }
    }

    pub(crate) fn secret(&self) -> &Scalar {
        &self.secret
    }

    pub fn public_point(&self) -> RistrettoPoint {
        self.public
    }

    pub fn public(&self) -> PublicKey {
        PublicKey::from_point(&self.public)
    }
}
