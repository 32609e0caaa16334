/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Per-round aggregation state of the collective signing protocol at one tree node.
//!
//! A [Round] accumulates, bottom-up, the commitments and responses of the node's subtree:
//! - Commit points and public keys are folded into the [commit](Round::commit_aggregate) and
//!   [key](Round::key_aggregate) aggregates, and remembered per child for exception accounting.
//! - Children that do not answer are not folded in; instead, the keys of their whole subtree are
//!   added to the [exception list](Round::exception_list).
//! - The Merkle roots of the children's subtrees become the leaves of this node's own Merkle
//!   subtree, whose root is passed upwards in this node's commitment.
//!
//! Group element accumulators are `Option<RistrettoPoint>`: `None` is the identity, so folding a
//! contribution that may be absent never needs special casing. See [add] and [sub].

use borsh::{BorshDeserialize, BorshSerialize};
use std::{
    collections::BTreeMap,
    fmt::{self, Display, Formatter},
};

use crate::types::{
    basic::{CryptoHash, RoundNumber, ViewNumber},
    crypto_primitives::{hash, hash_all, Identity, PublicKey, RistrettoPoint, Scalar},
    roster::ServerIdentity,
};

use super::merkle::{self, MerkleProof, ProofStep};

/// Fold `b` into the accumulator `acc`. A `None` accumulator is treated as the identity element; a
/// `None` operand is skipped.
pub fn add(acc: &mut Option<RistrettoPoint>, b: Option<&RistrettoPoint>) {
    let sum = acc.get_or_insert_with(RistrettoPoint::identity);
    if let Some(b) = b {
        *sum += b;
    }
}

/// Take `b` out of the accumulator `acc`. A `None` accumulator is treated as the identity element; a
/// `None` operand is skipped.
pub fn sub(acc: &mut Option<RistrettoPoint>, b: Option<&RistrettoPoint>) {
    let difference = acc.get_or_insert_with(RistrettoPoint::identity);
    if let Some(b) = b {
        *difference -= b;
    }
}

/// A reconfiguration vote riding on a round.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub enum Vote {
    ViewChange { view: ViewNumber },
    Add { server: PublicKey },
    Remove { server: PublicKey },
    Shutdown,
    NoOp,
}

impl Vote {
    pub fn is_view_change(&self) -> bool {
        matches!(self, Vote::ViewChange { .. })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum RoundType {
    #[default]
    Empty,
    Signing,
    ViewChange,
    Add,
    Remove,
    Shutdown,
    NoOp,
}

impl RoundType {
    /// A round without a vote is a signing round; otherwise it has the type the vote declares.
    pub fn from_vote(vote: Option<&Vote>) -> RoundType {
        match vote {
            None => RoundType::Signing,
            Some(Vote::ViewChange { .. }) => RoundType::ViewChange,
            Some(Vote::Add { .. }) => RoundType::Add,
            Some(Vote::Remove { .. }) => RoundType::Remove,
            Some(Vote::Shutdown) => RoundType::Shutdown,
            Some(Vote::NoOp) => RoundType::NoOp,
        }
    }
}

impl Display for RoundType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoundType::Empty => "empty",
            RoundType::Signing => "signing",
            RoundType::ViewChange => "viewchange",
            RoundType::Add => "add",
            RoundType::Remove => "remove",
            RoundType::Shutdown => "shutdown",
            RoundType::NoOp => "noop",
        };
        write!(f, "{}", name)
    }
}

/// The message a root sends down the tree to start a round.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct Announcement {
    pub round: RoundNumber,
    pub msg: Vec<u8>,
    pub vote: Option<Vote>,
}

/// The message a node sends to its parent once its subtree has committed.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct Commitment {
    pub from: PublicKey,
    /// Aggregate commit point of the sender's subtree, compressed.
    pub commit: PublicKey,
    /// Aggregate public key of the sender's subtree (exceptions excluded), compressed.
    pub key: PublicKey,
    pub merkle_root: CryptoHash,
    pub exceptions: Vec<PublicKey>,
}

/// The message a node sends to its parent once its subtree has responded.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct Response {
    pub from: PublicKey,
    pub response: [u8; 32],
}

#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub enum LogEntry {
    Announce { round: RoundNumber, view: ViewNumber },
    Commit { from: PublicKey, commit: PublicKey },
    Missing { child: PublicKey },
    Challenge { challenge: [u8; 32] },
    Respond { from: PublicKey },
}

/// Append-only structural log of a round's protocol messages.
#[derive(Clone, PartialEq, Eq, Debug, Default, BorshSerialize, BorshDeserialize)]
pub struct RoundLog(Vec<LogEntry>);

impl RoundLog {
    pub fn entries(&self) -> &Vec<LogEntry> {
        &self.0
    }

    pub(crate) fn append(&mut self, entry: LogEntry) {
        self.0.push(entry)
    }

    pub fn hash(&self) -> CryptoHash {
        hash(&self.try_to_vec().expect("serializing into a Vec cannot fail"))
    }
}

#[derive(Clone, Debug, Default)]
pub struct Round {
    /// Message chosen by the root for this round. May be empty.
    pub msg: Vec<u8>,
    pub challenge: Option<Scalar>,
    /// This node's own response.
    pub response: Option<Scalar>,

    pub log: RoundLog,
    pub hashed_log: CryptoHash,

    pub response_aggregate: Option<Scalar>,
    pub key_aggregate: Option<RistrettoPoint>,
    pub commit_aggregate: Option<RistrettoPoint>,

    pub commits: Vec<Commitment>,
    pub responses: Vec<Response>,

    pub merkle_root: CryptoHash,
    pub leaves: Vec<CryptoHash>,
    pub leaves_from: Vec<PublicKey>,
    /// Merkle root over `leaves`, before `hashed_log` is folded in.
    pub local_merkle_root: CryptoHash,

    pub child_merkle_roots: Vec<CryptoHash>,
    pub child_merkle_root_names: Vec<PublicKey>,
    pub proofs: BTreeMap<PublicKey, MerkleProof>,
    /// Path from this node's `merkle_root` up to the root's `merkle_root`.
    pub proof: MerkleProof,

    pub exception_list: Vec<PublicKey>,
    pub child_commit_aggregate: BTreeMap<PublicKey, RistrettoPoint>,
    pub child_key_aggregate: BTreeMap<PublicKey, RistrettoPoint>,

    pub back_link: CryptoHash,
    pub accountable_round: CryptoHash,

    pub vote: Option<Vote>,
    pub children: BTreeMap<PublicKey, ServerIdentity>,
    pub parent: Option<ServerIdentity>,
    pub view: ViewNumber,

    /// Secret commit scalar `v` of this node. Never leaves the node.
    pub(crate) secret_commit: Option<Scalar>,
}

impl Round {
    pub fn new() -> Round {
        Round::default()
    }

    /// See [add].
    pub fn add(acc: &mut Option<RistrettoPoint>, b: Option<&RistrettoPoint>) {
        add(acc, b)
    }

    /// See [sub].
    pub fn sub(acc: &mut Option<RistrettoPoint>, b: Option<&RistrettoPoint>) {
        sub(acc, b)
    }

    /// Fold this node's own commit point and public key into the aggregates.
    pub(crate) fn commit_own(&mut self, me: PublicKey, secret_commit: Scalar, commit: &RistrettoPoint, key: &RistrettoPoint) {
        self.secret_commit = Some(secret_commit);
        add(&mut self.commit_aggregate, Some(commit));
        add(&mut self.key_aggregate, Some(key));
        self.log.append(LogEntry::Commit {
            from: me,
            commit: PublicKey::from_point(commit),
        });
    }

    /// Fold a child's commitment into the aggregates. Returns `false`, without folding anything in, if
    /// the commitment carries points that are not valid group elements.
    pub(crate) fn fold_commitment(&mut self, commitment: Commitment) -> bool {
        let (commit, key) = match (commitment.commit.point(), commitment.key.point()) {
            (Some(commit), Some(key)) => (commit, key),
            _ => return false,
        };
        add(&mut self.commit_aggregate, Some(&commit));
        add(&mut self.key_aggregate, Some(&key));
        self.child_commit_aggregate.insert(commitment.from, commit);
        self.child_key_aggregate.insert(commitment.from, key);
        self.exception_list.extend(commitment.exceptions.iter().copied());
        self.log.append(LogEntry::Commit {
            from: commitment.from,
            commit: commitment.commit,
        });
        self.commits.push(commitment);
        true
    }

    /// Account for a child that did not commit: every key in its subtree becomes an exception.
    pub(crate) fn mark_missing(&mut self, child: PublicKey, subtree: impl IntoIterator<Item = PublicKey>) {
        self.exception_list.extend(subtree);
        self.log.append(LogEntry::Missing { child });
    }

    /// Take a child that committed but did not respond back out of the aggregates.
    pub(crate) fn withdraw(&mut self, child: &PublicKey) {
        let commit = self.child_commit_aggregate.remove(child);
        let key = self.child_key_aggregate.remove(child);
        sub(&mut self.commit_aggregate, commit.as_ref());
        sub(&mut self.key_aggregate, key.as_ref());
        self.log.append(LogEntry::Missing { child: *child });
    }

    /// Build this node's Merkle subtree from the roots its children committed, plus `own_leaf`.
    ///
    /// Children's roots are ordered by child identifier; this node's own leaf comes last.
    pub(crate) fn build_merkle_subtree(&mut self, me: PublicKey, own_leaf: CryptoHash) {
        let mut child_roots: Vec<(PublicKey, CryptoHash)> = self
            .commits
            .iter()
            .map(|commitment| (commitment.from, commitment.merkle_root))
            .collect();
        child_roots.sort_by_key(|(name, _)| *name);

        self.child_merkle_root_names = child_roots.iter().map(|(name, _)| *name).collect();
        self.child_merkle_roots = child_roots.iter().map(|(_, root)| *root).collect();

        self.leaves = self.child_merkle_roots.clone();
        self.leaves.push(own_leaf);
        self.leaves_from = self.child_merkle_root_names.clone();
        self.leaves_from.push(me);

        self.local_merkle_root = merkle::root(&self.leaves);
        self.proofs = self
            .child_merkle_root_names
            .iter()
            .enumerate()
            .filter_map(|(i, name)| merkle::proof(&self.leaves, i).map(|proof| (*name, proof)))
            .collect();

        self.hashed_log = self.log.hash();
        self.merkle_root = merkle::inner_node(&self.local_merkle_root, &self.hashed_log);
    }

    /// The proof a child needs to show that its `merkle_root` is included in the root's `merkle_root`:
    /// its inclusion in this node's local tree, the step that folds in this node's log hash, and then
    /// this node's own proof.
    pub(crate) fn proof_for_child(&self, child: &PublicKey) -> Option<MerkleProof> {
        let mut proof = self.proofs.get(child)?.clone();
        proof.push(ProofStep {
            sibling: self.hashed_log,
            sibling_on_left: false,
        });
        proof.extend(&self.proof);
        Some(proof)
    }

    pub(crate) fn fold_response(&mut self, response: Response) -> bool {
        let Some(r) = Option::<Scalar>::from(Scalar::from_canonical_bytes(response.response)) else {
            return false;
        };
        *self.response_aggregate.get_or_insert(Scalar::ZERO) += r;
        self.log.append(LogEntry::Respond { from: response.from });
        self.responses.push(response);
        true
    }

    /// `H(back_link || merkle_root)`: what the next round's back link commits to.
    pub(crate) fn seal_accountable_round(&mut self) {
        self.accountable_round = hash_all([
            self.back_link.bytes().as_slice(),
            self.merkle_root.bytes().as_slice(),
        ]);
    }
}
