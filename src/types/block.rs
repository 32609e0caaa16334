/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the [SkipBlock] and [BlockLink] types and their associated methods.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::cosi::signature::CollectiveSignature;
use crate::types::basic::*;
use crate::types::crypto_primitives::{CryptoHasher, Digest};
use crate::types::roster::Roster;

/// A block of a skipchain.
///
/// Only the fields that go into [SkipBlock::calculate_hash] are fixed when the block is created.
/// `forward_link`, `parent_block`, `child_skip_list`, and `signature` are attached afterwards.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct SkipBlock {
    pub index: BlockIndex,
    pub height: u32,
    pub maximum_height: u32,
    /// Per-level hashes of the predecessors of this block. Level 0 is the direct predecessor.
    pub back_link: Vec<SkipBlockID>,
    /// Per-level links to the successors of this block. Empty until a successor is sealed.
    pub forward_link: Vec<BlockLink>,
    pub verifier_id: VerifierID,
    pub parent_block: Option<SkipBlockID>,
    pub child_skip_list: Option<BlockLink>,
    pub roster: Roster,
    pub data: Data,
    pub signature: Option<CollectiveSignature>,
    pub hash: SkipBlockID,
}

impl SkipBlock {
    /// Create a block to be proposed. Linkage, index, and hash are filled in when the block is
    /// finalized by the [skipchain service](crate::skipchain::service::SkipchainService).
    pub fn new(roster: Roster, data: Data) -> SkipBlock {
        SkipBlock {
            index: BlockIndex::genesis(),
            height: 0,
            maximum_height: 1,
            back_link: Vec::new(),
            forward_link: Vec::new(),
            verifier_id: VerifierID::default(),
            parent_block: None,
            child_skip_list: None,
            roster,
            data,
            signature: None,
            hash: SkipBlockID::zero(),
        }
    }

    /// SHA-256 over the Borsh encoding of the fields fixed at creation.
    pub fn calculate_hash(&self) -> SkipBlockID {
        let mut hasher = CryptoHasher::new();
        hasher.update(self.index.try_to_vec().expect("serializing into a Vec cannot fail"));
        hasher.update(self.height.try_to_vec().expect("serializing into a Vec cannot fail"));
        hasher.update(self.maximum_height.try_to_vec().expect("serializing into a Vec cannot fail"));
        hasher.update(self.back_link.try_to_vec().expect("serializing into a Vec cannot fail"));
        hasher.update(self.verifier_id.try_to_vec().expect("serializing into a Vec cannot fail"));
        hasher.update(self.roster.try_to_vec().expect("serializing into a Vec cannot fail"));
        hasher.update(self.data.try_to_vec().expect("serializing into a Vec cannot fail"));
        SkipBlockID::new(hasher.finalize().into())
    }

    pub fn is_genesis(&self) -> bool {
        self.index == BlockIndex::genesis()
    }

    /// Checks that the block carries a collective signature of its roster over its recomputed hash.
    pub fn verify_signature(&self) -> bool {
        self.is_sealed_by(&self.roster)
    }

    /// Checks that the block carries a collective signature of `roster` over its recomputed hash.
    pub fn is_sealed_by(&self, roster: &Roster) -> bool {
        match &self.signature {
            Some(signature) => signature.is_correct(roster, &self.calculate_hash().bytes()),
            None => false,
        }
    }

    /// The level-0 forward link, if a successor has been sealed.
    pub fn next(&self) -> Option<&BlockLink> {
        self.forward_link.first()
    }
}

/// A link to another block, optionally carrying the collective signature that vouches for it.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct BlockLink {
    pub hash: SkipBlockID,
    pub signature: Option<CollectiveSignature>,
}

impl BlockLink {
    pub fn new(hash: SkipBlockID) -> BlockLink {
        BlockLink { hash, signature: None }
    }

    /// Checks that the link from `from` carries a collective signature of `roster` over
    /// [forward_link_message].
    pub fn verify(&self, from: &SkipBlockID, roster: &Roster) -> bool {
        match &self.signature {
            Some(signature) => signature.is_correct(roster, &forward_link_message(from, &self.hash)),
            None => false,
        }
    }
}

/// The message signed to vouch for the link from `from` to `to`: the two hashes, concatenated.
pub fn forward_link_message(from: &SkipBlockID, to: &SkipBlockID) -> Vec<u8> {
    let mut message = Vec::with_capacity(64);
    message.extend_from_slice(&from.bytes());
    message.extend_from_slice(&to.bytes());
    message
}
