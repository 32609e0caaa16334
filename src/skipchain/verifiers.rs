/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Verifier policies decide whether a proposed block may extend a given predecessor.
//!
//! Every block names, through its [VerifierID], the policy that governs blocks extending it. Policies
//! are looked up in a [VerifierRegistry]. The [default registry](VerifierRegistry::default) only knows
//! [VERIFY_NONE]; an id the registry does not know always rejects.

use std::collections::HashMap;

use crate::types::{basic::VerifierID, block::SkipBlock};

/// Accept iff the predecessor has no forward link yet: the first proposal to extend a block wins.
pub const VERIFY_NONE: VerifierID = VerifierID::new(0);

pub trait Verifier: Send + Sync {
    fn verify(&self, predecessor: &SkipBlock, proposed: &SkipBlock) -> bool;
}

impl<F> Verifier for F
where
    F: Fn(&SkipBlock, &SkipBlock) -> bool + Send + Sync,
{
    fn verify(&self, predecessor: &SkipBlock, proposed: &SkipBlock) -> bool {
        self(predecessor, proposed)
    }
}

pub fn verify_none(predecessor: &SkipBlock, _proposed: &SkipBlock) -> bool {
    predecessor.forward_link.is_empty()
}

pub struct VerifierRegistry {
    verifiers: HashMap<VerifierID, Box<dyn Verifier>>,
}

impl VerifierRegistry {
    /// A registry that knows no policy at all.
    pub fn empty() -> VerifierRegistry {
        VerifierRegistry {
            verifiers: HashMap::new(),
        }
    }

    /// Register `verifier` under `id`, returning the policy it replaces, if any.
    pub fn register(&mut self, id: VerifierID, verifier: impl Verifier + 'static) -> Option<Box<dyn Verifier>> {
        self.verifiers.insert(id, Box::new(verifier))
    }

    pub fn contains(&self, id: VerifierID) -> bool {
        self.verifiers.contains_key(&id)
    }

    pub fn verify(&self, id: VerifierID, predecessor: &SkipBlock, proposed: &SkipBlock) -> bool {
        match self.verifiers.get(&id) {
            Some(verifier) => verifier.verify(predecessor, proposed),
            None => {
                log::warn!("no verifier registered under id {}, rejecting", id);
                false
            }
        }
    }
}

impl Default for VerifierRegistry {
    fn default() -> Self {
        let mut registry = VerifierRegistry::empty();
        registry.register(VERIFY_NONE, verify_none);
        registry
    }
}
