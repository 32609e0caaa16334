/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Signing tree topology.
//!
//! A collective signing round runs over a tree: announcements and challenges flow from the root to
//! the leaves, commitments and responses flow back up. Which tree a node is part of depends on the
//! membership [view](crate::types::basic::ViewNumber) the round executes under.
//!
//! The [Topology] trait is what the [round coordinator](crate::cosi::setup) needs to know about the
//! tree. [TreeTopology] is the implementation used by this crate, backed by one [Tree] per view.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use crate::types::{basic::ViewNumber, crypto_primitives::PublicKey, roster::{Roster, ServerIdentity}};

/// Provides, for a given view, the calling node's place in the signing tree.
pub trait Topology: Send + Sync {
    /// The children of this node in `view`, in ascending order of their public keys.
    fn children(&self, view: ViewNumber) -> Vec<ServerIdentity>;

    /// The parent of this node in `view`, or `None` if this node is the root or not in the view.
    fn parent(&self, view: ViewNumber) -> Option<ServerIdentity>;

    fn is_root(&self, view: ViewNumber) -> bool;
}

/// A complete `branching_factor`-ary tree laid over a roster in roster order: the server at position 0
/// is the root, and the children of position `i` are positions `b*i + 1 ..= b*i + b`.
#[derive(Clone, Debug)]
pub struct Tree {
    roster: Roster,
    branching_factor: usize,
}

impl Tree {
    /// Build a tree over `roster`. A `branching_factor` of 0 is treated as 1.
    pub fn new(roster: Roster, branching_factor: usize) -> Tree {
        Tree {
            roster,
            branching_factor: branching_factor.max(1),
        }
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn root(&self) -> Option<&ServerIdentity> {
        self.roster.get(0)
    }

    pub fn children_of(&self, public: &PublicKey) -> Vec<ServerIdentity> {
        let Some(pos) = self.roster.position(public) else {
            return Vec::new();
        };
        let first = self.branching_factor * pos + 1;
        let mut children: Vec<ServerIdentity> = (first..first + self.branching_factor)
            .filter_map(|child| self.roster.get(child).copied())
            .collect();
        children.sort_by_key(|si| si.public);
        children
    }

    pub fn parent_of(&self, public: &PublicKey) -> Option<ServerIdentity> {
        match self.roster.position(public) {
            Some(0) | None => None,
            Some(pos) => self.roster.get((pos - 1) / self.branching_factor).copied(),
        }
    }

    /// Every server in the subtree rooted at `public`, including `public` itself.
    pub fn subtree_of(&self, public: &PublicKey) -> Vec<PublicKey> {
        let mut subtree = Vec::new();
        let mut pending = vec![*public];
        while let Some(next) = pending.pop() {
            if !self.roster.contains(&next) {
                continue;
            }
            subtree.push(next);
            pending.extend(self.children_of(&next).iter().map(|si| si.public));
        }
        subtree
    }
}

/// [Topology] of a single node, over one [Tree] per view.
#[derive(Clone)]
pub struct TreeTopology {
    me: PublicKey,
    views: Arc<Mutex<BTreeMap<ViewNumber, Tree>>>,
}

impl TreeTopology {
    pub fn new(me: PublicKey) -> TreeTopology {
        TreeTopology {
            me,
            views: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    pub fn set_view(&self, view: ViewNumber, tree: Tree) {
        self.views.lock().expect("topology lock poisoned").insert(view, tree);
    }

    pub fn tree(&self, view: ViewNumber) -> Option<Tree> {
        self.views.lock().expect("topology lock poisoned").get(&view).cloned()
    }
}

impl Topology for TreeTopology {
    fn children(&self, view: ViewNumber) -> Vec<ServerIdentity> {
        self.tree(view)
            .map(|tree| tree.children_of(&self.me))
            .unwrap_or_default()
    }

    fn parent(&self, view: ViewNumber) -> Option<ServerIdentity> {
        self.tree(view).and_then(|tree| tree.parent_of(&self.me))
    }

    fn is_root(&self, view: ViewNumber) -> bool {
        self.tree(view)
            .and_then(|tree| tree.root().map(|root| root.public == self.me))
            .unwrap_or(false)
    }
}
