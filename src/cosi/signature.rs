/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [CollectiveSignature] type: a Schnorr signature produced jointly by a roster.
//!
//! A collective signature over a message `m` by a roster with keys `X_1..X_n` is a pair `(c, r)` and
//! an exception list `E` of keys that did not take part. Let `X' = sum(X_i) - sum(E)`. The signature
//! is correct iff `c == H(r*G + c*X' || X' || m)`.

use borsh::{BorshDeserialize, BorshSerialize};
use std::collections::HashSet;

use crate::types::{
    crypto_primitives::{ChallengeHasher, Digest, PublicKey, RistrettoPoint, Scalar, GENERATOR},
    roster::Roster,
};

#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct CollectiveSignature {
    challenge: [u8; 32],
    response: [u8; 32],
    exceptions: Vec<PublicKey>,
}

impl CollectiveSignature {
    pub(crate) fn new(challenge: Scalar, response: Scalar, exceptions: Vec<PublicKey>) -> Self {
        CollectiveSignature {
            challenge: challenge.to_bytes(),
            response: response.to_bytes(),
            exceptions,
        }
    }

    /// Keys of the servers that did not contribute to this signature.
    pub fn exceptions(&self) -> &Vec<PublicKey> {
        &self.exceptions
    }

    /// Checks the signature over `message` against the aggregate key of `roster`, minus the keys in
    /// the exception list.
    ///
    /// Fails if the exception list names a key outside the roster, names a key twice, or excludes
    /// every server in the roster.
    pub fn is_correct(&self, roster: &Roster, message: &[u8]) -> bool {
        let (challenge, response) = match (
            Option::<Scalar>::from(Scalar::from_canonical_bytes(self.challenge)),
            Option::<Scalar>::from(Scalar::from_canonical_bytes(self.response)),
        ) {
            (Some(c), Some(r)) => (c, r),
            _ => return false,
        };

        let mut seen = HashSet::new();
        if self.exceptions.len() >= roster.len()
            || !self
                .exceptions
                .iter()
                .all(|key| roster.contains(key) && seen.insert(*key))
        {
            return false;
        }

        let aggregate_key = match effective_key(roster, &self.exceptions) {
            Some(key) => key,
            None => return false,
        };

        let commit = response * GENERATOR + challenge * aggregate_key;
        compute_challenge(&commit, &aggregate_key, message) == challenge
    }
}

/// `H(commit || aggregate_key || message)` reduced into a scalar.
pub(crate) fn compute_challenge(
    commit: &RistrettoPoint,
    aggregate_key: &RistrettoPoint,
    message: &[u8],
) -> Scalar {
    let mut hasher = ChallengeHasher::new();
    hasher.update(commit.compress().as_bytes());
    hasher.update(aggregate_key.compress().as_bytes());
    hasher.update(message);
    Scalar::from_hash(hasher)
}

/// Aggregate key of `roster` with the keys in `exceptions` taken out.
pub(crate) fn effective_key(roster: &Roster, exceptions: &[PublicKey]) -> Option<RistrettoPoint> {
    let mut key = roster.aggregate()?;
    for exception in exceptions {
        key -= exception.point()?;
    }
    Some(key)
}
