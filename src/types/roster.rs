/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the [ServerIdentity] and [Roster] types and their associated methods.

use borsh::{BorshDeserialize, BorshSerialize};
use std::{
    io::{self, Read, Write},
    slice,
};

use super::{
    basic::CryptoHash,
    crypto_primitives::{hash, Identity, PublicKey, RistrettoPoint, VerifyingKey},
};

/// Internal type used for serializing and deserializing values of type [VerifyingKey].
type VerifyingKeyBytes = [u8; 32];

/// The identity of a participating server.
///
/// A server has two keys:
/// 1. Its `address`, an Ed25519 [`VerifyingKey`] that the [network](crate::networking::Network)
///    uses to route messages to it, and
/// 2. Its `public` collective signing key, which it contributes to aggregate signatures.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ServerIdentity {
    pub address: VerifyingKey,
    pub public: PublicKey,
}

impl ServerIdentity {
    pub fn new(address: VerifyingKey, public: PublicKey) -> ServerIdentity {
        ServerIdentity { address, public }
    }
}

/// Intermediate representation of [ServerIdentity] for safe serialization and deserialization.
#[derive(Clone, BorshSerialize, BorshDeserialize)]
struct ServerIdentityBytes {
    address: VerifyingKeyBytes,
    public: PublicKey,
}

impl From<&ServerIdentity> for ServerIdentityBytes {
    fn from(value: &ServerIdentity) -> Self {
        ServerIdentityBytes {
            address: value.address.to_bytes(),
            public: value.public,
        }
    }
}

impl TryFrom<ServerIdentityBytes> for ServerIdentity {
    type Error = ed25519_dalek::SignatureError;

    fn try_from(value: ServerIdentityBytes) -> Result<Self, Self::Error> {
        Ok(ServerIdentity {
            address: VerifyingKey::from_bytes(&value.address)?,
            public: value.public,
        })
    }
}

/// The ordered list of servers responsible for signing and propagating a segment of a skipchain.
///
/// The order of the roster is meaningful: the first server is the root of the signing
/// [tree](crate::cosi::tree::Tree) built over the roster.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Roster {
    list: Vec<ServerIdentity>,
}

impl Roster {
    pub fn new(list: Vec<ServerIdentity>) -> Roster {
        Roster { list }
    }

    pub fn list(&self) -> &Vec<ServerIdentity> {
        &self.list
    }

    pub fn iter(&self) -> slice::Iter<ServerIdentity> {
        self.list.iter()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn get(&self, pos: usize) -> Option<&ServerIdentity> {
        self.list.get(pos)
    }

    pub fn position(&self, public: &PublicKey) -> Option<usize> {
        self.list.iter().position(|si| si.public == *public)
    }

    pub fn contains(&self, public: &PublicKey) -> bool {
        self.position(public).is_some()
    }

    /// Sum of the collective signing keys of every server in the roster.
    ///
    /// Returns `None` if any key in the roster is not a valid group element.
    pub fn aggregate(&self) -> Option<RistrettoPoint> {
        self.list
            .iter()
            .try_fold(RistrettoPoint::identity(), |acc, si| Some(acc + si.public.point()?))
    }

    /// Content hash of the roster.
    pub fn id(&self) -> CryptoHash {
        hash(&self.try_to_vec().expect("serializing into a Vec cannot fail"))
    }
}

impl BorshSerialize for Roster {
    fn serialize<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let bytes: Vec<ServerIdentityBytes> = self.list.iter().map(ServerIdentityBytes::from).collect();
        bytes.serialize(writer)
    }
}

impl BorshDeserialize for Roster {
    fn deserialize_reader<R: Read>(reader: &mut R) -> io::Result<Self> {
        let bytes = Vec::<ServerIdentityBytes>::deserialize_reader(reader)?;
        let list = bytes
            .into_iter()
            .map(ServerIdentity::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))?;
        Ok(Roster { list })
    }
}
