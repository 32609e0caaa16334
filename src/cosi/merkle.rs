/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Binary Merkle trees over [`CryptoHash`] leaves, and inclusion proofs.
//!
//! Inner nodes are `H(0x01 || left || right)`. When a level has an odd number of nodes, the last node
//! is promoted to the next level unchanged. The root of an empty tree is the zero hash.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{basic::CryptoHash, crypto_primitives::hash_all};

const INNER_NODE_PREFIX: [u8; 1] = [0x01];

/// One step of a [`MerkleProof`]: the sibling to combine with, and which side it is on.
#[derive(Clone, Copy, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct ProofStep {
    pub sibling: CryptoHash,
    pub sibling_on_left: bool,
}

/// Path from a leaf up to a root, leaf-side first.
#[derive(Clone, PartialEq, Eq, Debug, Default, BorshSerialize, BorshDeserialize)]
pub struct MerkleProof(Vec<ProofStep>);

impl MerkleProof {
    pub fn new(steps: Vec<ProofStep>) -> Self {
        Self(steps)
    }

    pub fn steps(&self) -> &Vec<ProofStep> {
        &self.0
    }

    pub fn push(&mut self, step: ProofStep) {
        self.0.push(step)
    }

    /// Append the steps of `upper`, which proves the root of this proof into a higher root.
    pub fn extend(&mut self, upper: &MerkleProof) {
        self.0.extend(upper.0.iter().copied())
    }

    /// Fold `leaf` through the proof, returning the root it implies.
    pub fn root_of(&self, leaf: CryptoHash) -> CryptoHash {
        self.0.iter().fold(leaf, |acc, step| {
            if step.sibling_on_left {
                inner_node(&step.sibling, &acc)
            } else {
                inner_node(&acc, &step.sibling)
            }
        })
    }

    pub fn verify(&self, leaf: CryptoHash, root: CryptoHash) -> bool {
        self.root_of(leaf) == root
    }
}

pub fn inner_node(left: &CryptoHash, right: &CryptoHash) -> CryptoHash {
    hash_all([
        INNER_NODE_PREFIX.as_slice(),
        left.bytes().as_slice(),
        right.bytes().as_slice(),
    ])
}

pub fn root(leaves: &[CryptoHash]) -> CryptoHash {
    if leaves.is_empty() {
        return CryptoHash::zero();
    }
    let mut level = leaves.to_vec();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => inner_node(left, right),
                [single] => *single,
                _ => unreachable!(),
            })
            .collect();
    }
    level[0]
}

/// Inclusion proof for `leaves[index]`. Returns `None` if `index` is out of bounds.
pub fn proof(leaves: &[CryptoHash], index: usize) -> Option<MerkleProof> {
    if index >= leaves.len() {
        return None;
    }
    let mut steps = Vec::new();
    let mut level = leaves.to_vec();
    let mut pos = index;
    while level.len() > 1 {
        let sibling = pos ^ 1;
        if sibling < level.len() {
            steps.push(ProofStep {
                sibling: level[sibling],
                sibling_on_left: sibling < pos,
            });
        }
        level = level
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => inner_node(left, right),
                [single] => *single,
                _ => unreachable!(),
            })
            .collect();
        pos /= 2;
    }
    Some(MerkleProof(steps))
}
