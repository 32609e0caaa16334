/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Round admission.
//!
//! Every node keeps a [NodeContext]: its round bookkeeping (the rounds it takes part in, their types,
//! and the highest round number it has seen) and its view status. [NodeContext::round_setup] is the
//! gate every announcement has to pass before the node takes part in a round:
//! 1. While a view change is in progress, only the round carrying the view change vote is admitted.
//! 2. A round is admitted only if its number is strictly greater than every round number this node
//!    has seen before.
//!
//! ## Locking
//!
//! View status and round bookkeeping are guarded by two distinct mutexes. Each is held only around a
//! check-then-mutate sequence, and never while talking to another node.

use std::{
    collections::{BTreeMap, HashMap},
    fmt::{self, Display, Formatter},
    sync::Mutex,
};

use crate::types::{
    basic::{CryptoHash, RoundNumber, ViewNumber},
    crypto_primitives::{hash_all, PublicKey},
};

use super::{
    round::{Announcement, LogEntry, Round, RoundType},
    tree::Topology,
};

struct ViewStatus {
    view: ViewNumber,
    changing_view: bool,
}

struct RoundBook {
    rounds: HashMap<RoundNumber, Round>,
    // Rounds that were skipped over have no entry, and are of type `RoundType::Empty`.
    round_types: BTreeMap<RoundNumber, RoundType>,
    last_seen_round: RoundNumber,
    // Only advanced on the root of a view.
    rounds_as_root: u64,
    round: RoundNumber,
    last_root_round: Option<RoundNumber>,
}

/// Per-node round admission state, created once at node start up.
pub struct NodeContext<T: Topology> {
    me: PublicKey,
    topology: T,
    view_status: Mutex<ViewStatus>,
    round_book: Mutex<RoundBook>,
}

impl<T: Topology> NodeContext<T> {
    pub fn new(me: PublicKey, topology: T) -> NodeContext<T> {
        NodeContext {
            me,
            topology,
            view_status: Mutex::new(ViewStatus {
                view: ViewNumber::init(),
                changing_view: false,
            }),
            round_book: Mutex::new(RoundBook {
                rounds: HashMap::new(),
                round_types: BTreeMap::new(),
                last_seen_round: RoundNumber::init(),
                rounds_as_root: 0,
                round: RoundNumber::init(),
                last_root_round: None,
            }),
        }
    }

    pub fn me(&self) -> PublicKey {
        self.me
    }

    pub fn topology(&self) -> &T {
        &self.topology
    }

    /// Admit or reject the round announced by `announcement` under `view`.
    ///
    /// On success, a fresh [Round] bound to this node's children and parent in `view` is stored
    /// under the announced round number. If this node is the root of `view`, its root round counter
    /// is advanced and the new round is back-linked to the previous round it led.
    pub fn round_setup(&self, view: ViewNumber, announcement: &Announcement) -> Result<(), RoundSetupError> {
        {
            let view_status = self.view_status.lock().expect("view status lock poisoned");
            let concludes_view_change = announcement
                .vote
                .as_ref()
                .map_or(false, |vote| vote.is_view_change());
            if view_status.changing_view && !concludes_view_change {
                log::debug!("{} rejects round {}: currently changing view", self.me, announcement.round);
                return Err(RoundSetupError::ChangingView);
            }
        }

        let mut round = Round::new();
        round.msg = announcement.msg.clone();
        round.vote = announcement.vote.clone();
        round.view = view;
        round.children = self
            .topology
            .children(view)
            .into_iter()
            .map(|child| (child.public, child))
            .collect();
        round.parent = self.topology.parent(view);
        round.log.append(LogEntry::Announce {
            round: announcement.round,
            view,
        });
        let is_root = self.topology.is_root(view);

        let mut book = self.round_book.lock().expect("round book lock poisoned");
        let round_number = announcement.round;
        if round_number <= book.last_seen_round {
            return Err(RoundSetupError::PastRound {
                round: round_number,
                last_seen: book.last_seen_round,
            });
        }

        let round_type = RoundType::from_vote(announcement.vote.as_ref());
        book.round_types.insert(round_number, round_type);
        log::trace!("{} admits round {} of type {}", self.me, round_number, round_type);

        if is_root {
            book.rounds_as_root += 1;
            book.round = round_number;
            round.back_link = match book.last_root_round.and_then(|prev| book.rounds.get(&prev).map(|r| (prev, r))) {
                Some((prev, prev_round)) => hash_all([
                    prev.to_le_bytes().as_slice(),
                    prev_round.accountable_round.bytes().as_slice(),
                    prev_round.hashed_log.bytes().as_slice(),
                ]),
                None => CryptoHash::zero(),
            };
            book.last_root_round = Some(round_number);
        }

        book.rounds.insert(round_number, round);
        book.last_seen_round = book.last_seen_round.max(round_number);
        Ok(())
    }

    /// Get a copy of the round stored under `round_number`.
    pub fn round(&self, round_number: RoundNumber) -> Option<Round> {
        self.round_book
            .lock()
            .expect("round book lock poisoned")
            .rounds
            .get(&round_number)
            .cloned()
    }

    /// Run `f` on the round stored under `round_number`, under the round bookkeeping lock.
    pub(crate) fn with_round_mut<R>(&self, round_number: RoundNumber, f: impl FnOnce(&mut Round) -> R) -> Option<R> {
        self.round_book
            .lock()
            .expect("round book lock poisoned")
            .rounds
            .get_mut(&round_number)
            .map(f)
    }

    pub fn round_type(&self, round_number: RoundNumber) -> RoundType {
        self.round_book
            .lock()
            .expect("round book lock poisoned")
            .round_types
            .get(&round_number)
            .copied()
            .unwrap_or_default()
    }

    /// Number of rounds this node has admitted.
    pub fn admitted_rounds(&self) -> usize {
        self.round_book.lock().expect("round book lock poisoned").round_types.len()
    }

    pub fn last_seen_round(&self) -> RoundNumber {
        self.round_book.lock().expect("round book lock poisoned").last_seen_round
    }

    pub fn rounds_as_root(&self) -> u64 {
        self.round_book.lock().expect("round book lock poisoned").rounds_as_root
    }

    /// The last round this node led as root.
    pub fn current_round(&self) -> RoundNumber {
        self.round_book.lock().expect("round book lock poisoned").round
    }

    pub fn view(&self) -> ViewNumber {
        self.view_status.lock().expect("view status lock poisoned").view
    }

    pub fn is_changing_view(&self) -> bool {
        self.view_status.lock().expect("view status lock poisoned").changing_view
    }

    pub fn start_view_change(&self) {
        self.view_status.lock().expect("view status lock poisoned").changing_view = true;
    }

    pub fn finish_view_change(&self, new_view: ViewNumber) {
        let mut view_status = self.view_status.lock().expect("view status lock poisoned");
        view_status.changing_view = false;
        view_status.view = new_view;
    }
}

/// Reasons why [NodeContext::round_setup] may reject a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundSetupError {
    /// A view change is in progress and the announcement does not carry the view change vote.
    ChangingView,

    /// The round number is not greater than the highest round number seen so far.
    PastRound { round: RoundNumber, last_seen: RoundNumber },
}

impl Display for RoundSetupError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RoundSetupError::ChangingView => write!(f, "currently changing view"),
            RoundSetupError::PastRound { round, last_seen } => {
                write!(f, "round {} is not newer than last seen round {}", round, last_seen)
            }
        }
    }
}

impl std::error::Error for RoundSetupError {}
