/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The signing-round engine.
//!
//! [CollectiveSigner] is what the [skipchain service](crate::skipchain::service) needs from the
//! collective signing subsystem: given a roster and a message, produce a [CollectiveSignature].
//!
//! [LocalCosi] implements it by running every phase of the protocol over a signing [Tree] of
//! in-process [CosiNode]s:
//! 1. **Announcement**: the root picks a round number and every reachable node passes it through
//!    [NodeContext::round_setup].
//! 2. **Commitment**: bottom-up, each node commits to a random `v` and folds in its children's
//!    commitments. Children that are unreachable or refuse the round are accounted for in the
//!    exception list, together with their whole subtree.
//! 3. **Challenge**: the root computes `c = H(V || X || msg)` and sends it down with each child's
//!    Merkle inclusion proof.
//! 4. **Response**: bottom-up, each node answers `r = v - c*x` and folds in its children's responses.
//!
//! If a node that committed goes silent in the response phase, the aggregate no longer matches the
//! challenge. The root then starts over with a fresh round number, leaving the silent node out.

use std::{
    collections::{BTreeSet, HashMap},
    fmt::{self, Display, Formatter},
    sync::{mpsc::Sender, Mutex},
    time::SystemTime,
};

use crate::{
    config::CosiConfiguration,
    events::*,
    types::{
        basic::{CryptoHash, RoundNumber, ViewNumber},
        crypto_primitives::{hash, Keypair, OsRng, PublicKey, Scalar, GENERATOR},
        roster::{Roster, ServerIdentity},
    },
};

use super::{
    merkle::MerkleProof,
    round::{Announcement, Commitment, LogEntry, Response, Vote},
    setup::{NodeContext, RoundSetupError},
    signature::{compute_challenge, CollectiveSignature},
    tree::{Tree, TreeTopology},
};

/// Produces collective signatures for a roster.
pub trait CollectiveSigner: Send + Sync {
    fn sign(&self, roster: &Roster, message: &[u8]) -> Result<CollectiveSignature, CosiError>;
}

/// How an in-process node behaves when asked to take part in a round.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Behaviour {
    Honest,
    /// Does not answer the announcement.
    Offline,
    /// Commits, but does not answer the challenge.
    SilentOnChallenge,
}

pub struct CosiNode {
    identity: ServerIdentity,
    keypair: Keypair,
    context: NodeContext<TreeTopology>,
    behaviour: Mutex<Behaviour>,
}

impl CosiNode {
    pub fn new(identity: ServerIdentity, keypair: Keypair) -> CosiNode {
        CosiNode {
            identity,
            context: NodeContext::new(identity.public, TreeTopology::new(identity.public)),
            keypair,
            behaviour: Mutex::new(Behaviour::Honest),
        }
    }

    pub fn identity(&self) -> &ServerIdentity {
        &self.identity
    }

    pub fn context(&self) -> &NodeContext<TreeTopology> {
        &self.context
    }

    pub fn behaviour(&self) -> Behaviour {
        *self.behaviour.lock().expect("behaviour lock poisoned")
    }

    pub fn set_behaviour(&self, behaviour: Behaviour) {
        *self.behaviour.lock().expect("behaviour lock poisoned") = behaviour;
    }
}

struct Views {
    by_roster: HashMap<CryptoHash, ViewNumber>,
    next: ViewNumber,
}

/// Why a node did not commit.
enum Refusal {
    Unreachable,
    Rejected(RoundSetupError),
}

/// Result of one execution of the protocol at the root.
enum Attempt {
    Signed(CollectiveSignature),
    /// These nodes committed but did not respond.
    Silent(Vec<PublicKey>),
    /// Some node has already seen this round number.
    Stale(RoundNumber),
}

/// A [CollectiveSigner] that runs the protocol over in-process nodes.
pub struct LocalCosi {
    nodes: HashMap<PublicKey, CosiNode>,
    views: Mutex<Views>,
    signing: Mutex<()>,
    config: CosiConfiguration,
    event_sink: EventSink,
}

impl LocalCosi {
    pub fn new(config: CosiConfiguration, nodes: Vec<CosiNode>) -> LocalCosi {
        LocalCosi {
            nodes: nodes.into_iter().map(|node| (node.identity.public, node)).collect(),
            views: Mutex::new(Views {
                by_roster: HashMap::new(),
                next: ViewNumber::init(),
            }),
            signing: Mutex::new(()),
            event_sink: EventSink::new(config.log_events, None),
            config,
        }
    }

    /// Publish the engine's events on `publisher`, in addition to logging them.
    pub fn with_event_publisher(mut self, publisher: Sender<Event>) -> LocalCosi {
        self.event_sink = EventSink::new(self.config.log_events, Some(publisher));
        self
    }

    pub fn node(&self, public: &PublicKey) -> Option<&CosiNode> {
        self.nodes.get(public)
    }

    /// The view that signing rounds over `roster` execute under, if one was set up.
    pub fn view_of(&self, roster: &Roster) -> Option<ViewNumber> {
        self.views
            .lock()
            .expect("views lock poisoned")
            .by_roster
            .get(&roster.id())
            .copied()
    }

    /// Move the nodes of `roster` to a new view over `roster`.
    ///
    /// Every node first enters the view changing state, in which it only admits the round carrying the
    /// view change vote. That round is then run over the new tree; once it completes, every node leaves
    /// the view changing state.
    pub fn change_view(&self, roster: &Roster) -> Result<ViewNumber, CosiError> {
        let _signing = self.signing.lock().expect("signing lock poisoned");
        self.check_roster(roster)?;
        let view = self.install_view(roster, true);

        for si in roster.iter() {
            self.nodes[&si.public].context.start_view_change();
        }
        let vote = Vote::ViewChange { view };
        let result = self.run(roster, view, &roster.id().bytes(), Some(vote));
        for si in roster.iter() {
            self.nodes[&si.public].context.finish_view_change(view);
        }
        result.map(|_| view)
    }

    fn check_roster(&self, roster: &Roster) -> Result<(), CosiError> {
        if roster.is_empty() {
            return Err(CosiError::EmptyRoster);
        }
        match roster.iter().find(|si| !self.nodes.contains_key(&si.public)) {
            Some(si) => Err(CosiError::UnknownParticipant { public: si.public }),
            None => Ok(()),
        }
    }

    /// Get the view for `roster`, setting up a new one (and its tree on every node) if there is none, or
    /// if `fresh` is set.
    fn install_view(&self, roster: &Roster, fresh: bool) -> ViewNumber {
        let mut views = self.views.lock().expect("views lock poisoned");
        if !fresh {
            if let Some(view) = views.by_roster.get(&roster.id()) {
                return *view;
            }
        }
        let view = views.next;
        views.next = view + 1;
        views.by_roster.insert(roster.id(), view);

        let tree = Tree::new(roster.clone(), self.config.branching_factor);
        for si in roster.iter() {
            self.nodes[&si.public].context.topology().set_view(view, tree.clone());
        }
        view
    }

    /// Run rounds over `roster` under `view` until one produces a signature, or attempts run out.
    fn run(
        &self,
        roster: &Roster,
        view: ViewNumber,
        message: &[u8],
        vote: Option<Vote>,
    ) -> Result<CollectiveSignature, CosiError> {
        let tree = Tree::new(roster.clone(), self.config.branching_factor);
        let root = *tree.root().ok_or(CosiError::EmptyRoster)?;
        let root_node = &self.nodes[&root.public];

        let mut excluded: BTreeSet<PublicKey> = BTreeSet::new();
        let mut round_number = next_round(root_node.context.last_seen_round())?;

        for _ in 0..self.config.max_signing_attempts.max(1) {
            let announcement = Announcement {
                round: round_number,
                msg: message.to_vec(),
                vote: vote.clone(),
            };
            self.event_sink.emit(Event::StartRound(StartRoundEvent {
                timestamp: SystemTime::now(),
                root: root.public,
                view,
                round: round_number,
            }));

            match self.attempt(&tree, view, &announcement, &excluded)? {
                Attempt::Signed(signature) => {
                    self.event_sink.emit(Event::CollectSignature(CollectSignatureEvent {
                        timestamp: SystemTime::now(),
                        root: root.public,
                        round: round_number,
                        exceptions: signature.exceptions().len(),
                    }));
                    return Ok(signature);
                }
                Attempt::Silent(silent) => {
                    for public in &silent {
                        self.event_sink.emit(Event::Exception(ExceptionEvent {
                            timestamp: SystemTime::now(),
                            round: round_number,
                            server: *public,
                        }));
                    }
                    excluded.extend(silent);
                    round_number = next_round(root_node.context.last_seen_round())?;
                }
                Attempt::Stale(last_seen) => {
                    round_number = next_round(last_seen.max(root_node.context.last_seen_round()))?;
                }
            }
        }
        Err(CosiError::AttemptsExhausted)
    }

    fn attempt(
        &self,
        tree: &Tree,
        view: ViewNumber,
        announcement: &Announcement,
        excluded: &BTreeSet<PublicKey>,
    ) -> Result<Attempt, CosiError> {
        let root = *tree.root().ok_or(CosiError::EmptyRoster)?;
        let mut newest_seen = RoundNumber::init();

        let commitment = match self.commit_phase(tree, view, announcement, excluded, &root.public, &mut newest_seen) {
            Ok(commitment) => commitment,
            Err(Refusal::Unreachable) => return Err(CosiError::RootUnavailable),
            Err(Refusal::Rejected(RoundSetupError::PastRound { last_seen, .. })) => {
                return Ok(Attempt::Stale(last_seen))
            }
            Err(Refusal::Rejected(err)) => return Err(CosiError::RoundSetup(err)),
        };
        if newest_seen >= announcement.round {
            // A child has already moved past this round number.
            return Ok(Attempt::Stale(newest_seen));
        }

        let root_node = &self.nodes[&root.public];
        let (commit, key) = match (commitment.commit.point(), commitment.key.point()) {
            (Some(commit), Some(key)) => (commit, key),
            _ => return Err(CosiError::RootUnavailable),
        };
        let challenge = compute_challenge(&commit, &key, &announcement.msg);

        let mut silent = Vec::new();
        let response = self.respond_phase(root_node, announcement.round, challenge, MerkleProof::default(), &mut silent);
        if !silent.is_empty() {
            return Ok(Attempt::Silent(silent));
        }
        let Some(response) = response else {
            return Err(CosiError::RootUnavailable);
        };
        let response = Option::<Scalar>::from(Scalar::from_canonical_bytes(response.response))
            .ok_or(CosiError::RootUnavailable)?;

        let mut exceptions = commitment.exceptions;
        exceptions.sort();
        exceptions.dedup();
        Ok(Attempt::Signed(CollectiveSignature::new(challenge, response, exceptions)))
    }

    /// Announce the round to the subtree rooted at `public` and collect its commitment.
    fn commit_phase(
        &self,
        tree: &Tree,
        view: ViewNumber,
        announcement: &Announcement,
        excluded: &BTreeSet<PublicKey>,
        public: &PublicKey,
        newest_seen: &mut RoundNumber,
    ) -> Result<Commitment, Refusal> {
        let node = self.nodes.get(public).ok_or(Refusal::Unreachable)?;
        if excluded.contains(public) || node.behaviour() == Behaviour::Offline {
            return Err(Refusal::Unreachable);
        }
        if let Err(err) = node.context.round_setup(view, announcement) {
            self.event_sink.emit(Event::RejectRound(RejectRoundEvent {
                timestamp: SystemTime::now(),
                server: *public,
                round: announcement.round,
                reason: err,
            }));
            if let RoundSetupError::PastRound { last_seen, .. } = err {
                *newest_seen = (*newest_seen).max(last_seen);
            }
            return Err(Refusal::Rejected(err));
        }

        let children: Vec<PublicKey> = node
            .context
            .round(announcement.round)
            .map(|round| round.children.keys().copied().collect())
            .unwrap_or_default();

        let mut committed = Vec::new();
        let mut missing = Vec::new();
        for child in children {
            match self.commit_phase(tree, view, announcement, excluded, &child, newest_seen) {
                Ok(commitment) => committed.push(commitment),
                Err(_) => missing.push(child),
            }
        }

        let secret_commit = Scalar::random(&mut OsRng);
        let own_commit = secret_commit * GENERATOR;
        let own_key = node.keypair.public_point();
        let own_leaf = hash(&announcement.msg);

        node.context
            .with_round_mut(announcement.round, |round| {
                round.commit_own(*public, secret_commit, &own_commit, &own_key);
                for commitment in committed {
                    let from = commitment.from;
                    if !round.fold_commitment(commitment) {
                        round.mark_missing(from, tree.subtree_of(&from));
                    }
                }
                for child in missing {
                    round.mark_missing(child, tree.subtree_of(&child));
                }
                round.build_merkle_subtree(*public, own_leaf);

                Commitment {
                    from: *public,
                    commit: round.commit_aggregate.map(|p| PublicKey::from_point(&p)).unwrap_or(PublicKey::from_point(&own_commit)),
                    key: round.key_aggregate.map(|p| PublicKey::from_point(&p)).unwrap_or(PublicKey::from_point(&own_key)),
                    merkle_root: round.merkle_root,
                    exceptions: round.exception_list.clone(),
                }
            })
            .ok_or(Refusal::Unreachable)
    }

    /// Send the challenge down the subtree rooted at `node` and collect its response. Nodes that do not
    /// respond are added to `silent`.
    fn respond_phase(
        &self,
        node: &CosiNode,
        round_number: RoundNumber,
        challenge: Scalar,
        proof: MerkleProof,
        silent: &mut Vec<PublicKey>,
    ) -> Option<Response> {
        if node.behaviour() != Behaviour::Honest {
            return None;
        }
        let me = node.identity.public;
        let secret = *node.keypair.secret();

        let committed_children = node.context.with_round_mut(round_number, |round| {
            round.challenge = Some(challenge);
            round.proof = proof;
            round.log.append(LogEntry::Challenge {
                challenge: challenge.to_bytes(),
            });
            round.seal_accountable_round();

            let own_response = round.secret_commit.take().map(|v| v - challenge * secret)?;
            round.response = Some(own_response);
            round.response_aggregate = Some(own_response);

            Some(
                round
                    .commits
                    .iter()
                    .filter_map(|commitment| {
                        round
                            .proof_for_child(&commitment.from)
                            .map(|proof| (commitment.from, proof))
                    })
                    .collect::<Vec<_>>(),
            )
        })??;

        for (child, child_proof) in committed_children {
            let response = self
                .nodes
                .get(&child)
                .and_then(|child_node| self.respond_phase(child_node, round_number, challenge, child_proof, silent));
            node.context.with_round_mut(round_number, |round| match response {
                Some(response) if round.fold_response(response.clone()) => (),
                _ => {
                    round.withdraw(&child);
                    silent.push(child);
                }
            });
        }

        node.context.with_round_mut(round_number, |round| {
            round.response_aggregate.map(|r| Response {
                from: me,
                response: r.to_bytes(),
            })
        })?
    }
}

impl CollectiveSigner for LocalCosi {
    fn sign(&self, roster: &Roster, message: &[u8]) -> Result<CollectiveSignature, CosiError> {
        let _signing = self.signing.lock().expect("signing lock poisoned");
        self.check_roster(roster)?;
        let view = self.install_view(roster, false);
        self.run(roster, view, message, None)
    }
}

fn next_round(last_seen: RoundNumber) -> Result<RoundNumber, CosiError> {
    last_seen.checked_add(1).ok_or(CosiError::RoundNumbersExhausted)
}

/// The different ways producing a collective signature can fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CosiError {
    EmptyRoster,

    /// The roster names a server this signer cannot reach.
    UnknownParticipant { public: PublicKey },

    /// The root of the signing tree did not take part in the round.
    RootUnavailable,

    /// The root refused to admit the round.
    RoundSetup(RoundSetupError),

    /// Every attempt ended with a node going silent, or with a stale round number.
    AttemptsExhausted,

    /// The root has seen the highest possible round number.
    RoundNumbersExhausted,
}

impl From<RoundSetupError> for CosiError {
    fn from(value: RoundSetupError) -> Self {
        CosiError::RoundSetup(value)
    }
}

impl Display for CosiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CosiError::EmptyRoster => write!(f, "cannot sign with an empty roster"),
            CosiError::UnknownParticipant { public } => write!(f, "unknown participant {}", public),
            CosiError::RootUnavailable => write!(f, "root of the signing tree is unavailable"),
            CosiError::RoundSetup(err) => write!(f, "root refused round: {}", err),
            CosiError::AttemptsExhausted => write!(f, "no signing attempt succeeded"),
            CosiError::RoundNumbersExhausted => write!(f, "no round number left to announce"),
        }
    }
}

impl std::error::Error for CosiError {}
