/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The skipchain service: block proposal, chain traversal, forward-link extension, and propagation.
//!
//! ## Block lifecycle
//!
//! A block is created by [proposal](SkipchainService::propose_skip_block). At that point it is
//! finalized: its index and back link are derived from its
//! predecessor, its hash is computed, it is sealed by its roster, and it is stored keyed by its hash.
//! In the same step the predecessor gets a forward link pointing at the new block, signed by the
//! predecessor's roster. Blocks are never deleted.
//!
//! ## Locking
//!
//! The block table sits behind its own mutex, which is only held for single reads and writes. Every
//! sequence that reads the state of a forward-link slot and then writes it is serialized by a second,
//! outer mutex (`proposals`). This is what makes [VERIFY_NONE](super::verifiers::VERIFY_NONE) a
//! "first writer wins" policy when several proposals race to extend the same block. Neither mutex is
//! held while sending messages.
//!
//! ## Propagation failures
//!
//! A block is stored locally before it is propagated. If propagation fails, the error is returned, but
//! the block stays: servers that missed it catch up through
//! [get_update_chain](SkipchainService::get_update_chain).
//!
//! A service never sends blocks to itself. Its own table is always at least as recent as anything it
//! has sent, and a copy waiting in its inbox would overwrite later changes once polled.

use std::{
    collections::{HashMap, HashSet},
    fmt::{self, Display, Formatter},
    sync::{mpsc::Sender, Arc, Mutex},
    time::SystemTime,
};

use crate::{
    config::Configuration,
    cosi::engine::{CollectiveSigner, CosiError},
    events::*,
    networking::{Network, NetworkError},
    types::{
        basic::{BlockIndex, SkipBlockID, VerifierID},
        block::{forward_link_message, BlockLink, SkipBlock},
        crypto_primitives::{OsRng, RngCore, VerifyingKey},
    },
};

use super::{
    messages::*,
    verifiers::{VerifierRegistry, VERIFY_NONE},
};

pub struct SkipchainService<N: Network, S: CollectiveSigner> {
    me: VerifyingKey,
    blocks: Mutex<HashMap<SkipBlockID, SkipBlock>>,
    proposals: Mutex<()>,
    verifiers: VerifierRegistry,
    signer: Arc<S>,
    network: Mutex<N>,
    log_events: bool,
    event_sink: EventSink,
}

impl<N: Network, S: CollectiveSigner> SkipchainService<N, S> {
    pub fn new(config: Configuration, network: N, signer: Arc<S>) -> SkipchainService<N, S> {
        SkipchainService {
            me: config.me.verifying_key(),
            blocks: Mutex::new(HashMap::new()),
            proposals: Mutex::new(()),
            verifiers: VerifierRegistry::default(),
            signer,
            network: Mutex::new(network),
            log_events: config.log_events,
            event_sink: EventSink::new(config.log_events, None),
        }
    }

    /// Replace the default verifier registry.
    pub fn with_verifiers(mut self, verifiers: VerifierRegistry) -> Self {
        self.verifiers = verifiers;
        self
    }

    /// Publish the service's events on `publisher`, in addition to logging them.
    pub fn with_event_publisher(mut self, publisher: Sender<Event>) -> Self {
        self.event_sink = EventSink::new(self.log_events, Some(publisher));
        self
    }

    pub fn me(&self) -> VerifyingKey {
        self.me
    }

    /// Get a copy of the block stored under `id`.
    pub fn skip_block(&self, id: &SkipBlockID) -> Option<SkipBlock> {
        self.blocks.lock().expect("block table lock poisoned").get(id).cloned()
    }

    /// Number of blocks in the block table.
    pub fn len(&self) -> usize {
        self.blocks.lock().expect("block table lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append `proposed` to the chain whose tip is `latest`, or start a new chain with it if `latest`
    /// is `None` or the zero hash.
    ///
    /// On success, the updated predecessor and then the new block are propagated to their rosters, and
    /// both are returned. Propagating the new block is attempted even if propagating the predecessor
    /// failed; the first failure is returned. Either way, both stay stored locally.
    pub fn propose_skip_block(
        &self,
        latest: Option<SkipBlockID>,
        mut proposed: SkipBlock,
    ) -> Result<ProposedSkipBlockReply, SkipchainError> {
        let (previous, latest) = {
            let _proposals = self.proposals.lock().expect("proposals lock poisoned");
            match latest.filter(|id| !id.is_zero()) {
                None => {
                    log::debug!("{:?} creates a new skipchain", self.me);
                    proposed.verifier_id = VERIFY_NONE;
                    self.update_new_skip_block(None, proposed)?
                }
                Some(id) => {
                    let predecessor = self
                        .skip_block(&id)
                        .ok_or(SkipchainError::PredecessorNotFound { id })?;
                    proposed.verifier_id = predecessor.verifier_id;
                    if !self.verifiers.verify(predecessor.verifier_id, &predecessor, &proposed) {
                        return Err(SkipchainError::VerificationFailed {
                            verifier: predecessor.verifier_id,
                        });
                    }
                    self.update_new_skip_block(Some(predecessor), proposed)?
                }
            }
        };

        let previous_sent = match &previous {
            Some(previous) => self.start_propagation(previous),
            None => Ok(()),
        };
        let latest_sent = self.start_propagation(&latest);
        previous_sent.and(latest_sent)?;
        Ok(ProposedSkipBlockReply { previous, latest })
    }

    /// The peer-facing entry point for proposals. The proposal inherits the maximum height, the parent
    /// block, and the verifier of the block it extends, whatever it claims itself.
    pub fn handle_propose_skip_block(&self, request: ProposeSkipBlock) -> Result<ProposedSkipBlockReply, SkipchainError> {
        let ProposeSkipBlock { latest, mut proposed } = request;
        let latest = latest.filter(|id| !id.is_zero());
        if let Some(id) = latest {
            let latest_block = self.skip_block(&id).ok_or(SkipchainError::LatestNotFound { id })?;
            proposed.maximum_height = latest_block.maximum_height;
            proposed.parent_block = latest_block.parent_block;
            proposed.verifier_id = latest_block.verifier_id;
        }
        self.propose_skip_block(latest, proposed)
    }

    /// Finalize `proposed` as the successor of `predecessor` (or as a genesis block), seal it, link the
    /// predecessor to it, and store both. Returns the updated predecessor and the new block.
    ///
    /// Nothing is stored if signing fails.
    fn update_new_skip_block(
        &self,
        predecessor: Option<SkipBlock>,
        mut proposed: SkipBlock,
    ) -> Result<(Option<SkipBlock>, SkipBlock), SkipchainError> {
        proposed.height = 1;
        proposed.forward_link = Vec::new();
        proposed.child_skip_list = None;
        proposed.signature = None;
        match &predecessor {
            None => {
                let mut filler = [0u8; 32];
                OsRng.fill_bytes(&mut filler);
                proposed.index = BlockIndex::genesis();
                proposed.back_link = vec![SkipBlockID::new(filler)];
            }
            Some(predecessor) => {
                proposed.index = predecessor
                    .index
                    .checked_add(1)
                    .ok_or(SkipchainError::IndexOverflow { id: predecessor.hash })?;
                proposed.back_link = vec![predecessor.hash];
            }
        }
        proposed.hash = proposed.calculate_hash();
        proposed.signature = Some(self.signer.sign(&proposed.roster, &proposed.hash.bytes())?);

        let predecessor = match predecessor {
            Some(mut predecessor) => {
                let signature = self
                    .signer
                    .sign(&predecessor.roster, &forward_link_message(&predecessor.hash, &proposed.hash))?;
                predecessor.forward_link = vec![BlockLink {
                    hash: proposed.hash,
                    signature: Some(signature),
                }];
                Some(predecessor)
            }
            None => None,
        };

        {
            let mut blocks = self.blocks.lock().expect("block table lock poisoned");
            blocks.insert(proposed.hash, proposed.clone());
            if let Some(predecessor) = &predecessor {
                blocks.insert(predecessor.hash, predecessor.clone());
            }
        }

        self.event_sink.emit(Event::InsertBlock(InsertBlockEvent {
            timestamp: SystemTime::now(),
            block: proposed.hash,
            index: proposed.index,
        }));
        if let Some(predecessor) = &predecessor {
            self.event_sink.emit(Event::ForwardLink(ForwardLinkEvent {
                timestamp: SystemTime::now(),
                from: predecessor.hash,
                to: proposed.hash,
            }));
        }
        Ok((predecessor, proposed))
    }

    /// The blocks from `latest_known` up to the tip of its chain, following level-0 forward links.
    pub fn get_update_chain(&self, latest_known: &SkipBlockID) -> Result<Vec<SkipBlock>, SkipchainError> {
        let blocks = self.blocks.lock().expect("block table lock poisoned");
        let mut block = blocks
            .get(latest_known)
            .ok_or(SkipchainError::UnknownBlock { id: *latest_known })?;

        let mut visited = HashSet::from([block.hash]);
        let mut update = vec![block.clone()];
        while let Some(link) = block.next() {
            block = blocks
                .get(&link.hash)
                .ok_or(SkipchainError::MissingForwardLink { hash: link.hash })?;
            if !visited.insert(block.hash) {
                return Err(SkipchainError::ForwardLinkCycle { hash: block.hash });
            }
            update.push(block.clone());
        }
        Ok(update)
    }

    /// Make `child` the head of a child chain of `parent`, and propagate both.
    ///
    /// Neither block's chain is re-verified.
    pub fn set_children_skip_block(
        &self,
        parent: &SkipBlockID,
        child: &SkipBlockID,
    ) -> Result<SetChildrenSkipBlockReply, SkipchainError> {
        let (parent, child) = {
            let _proposals = self.proposals.lock().expect("proposals lock poisoned");
            let mut blocks = self.blocks.lock().expect("block table lock poisoned");
            let mut parent_block = blocks
                .get(parent)
                .cloned()
                .ok_or(SkipchainError::ParentNotFound { id: *parent })?;
            let mut child_block = blocks
                .get(child)
                .cloned()
                .ok_or(SkipchainError::ChildNotFound { id: *child })?;

            child_block.parent_block = Some(parent_block.hash);
            parent_block.child_skip_list = Some(BlockLink::new(child_block.hash));
            blocks.insert(child_block.hash, child_block.clone());
            blocks.insert(parent_block.hash, parent_block.clone());
            (parent_block, child_block)
        };

        self.start_propagation(&child)?;
        self.start_propagation(&parent)?;
        Ok(SetChildrenSkipBlockReply { parent, child })
    }

    /// Point the forward link of the block stored under `to_update` at `latest`.
    ///
    /// `latest` has to list the target among its back links and carry a valid signature of the target's
    /// roster.
    /// If the target has no forward link yet, the target's verifier decides. Otherwise `latest` has to
    /// be reachable from the target through existing forward links. The new link is signed by the
    /// target's roster.
    pub fn forward_signature(&self, to_update: &SkipBlockID, mut latest: SkipBlock) -> Result<SkipBlock, SkipchainError> {
        latest.hash = latest.calculate_hash();

        let _proposals = self.proposals.lock().expect("proposals lock poisoned");
        let mut target = self
            .skip_block(to_update)
            .ok_or(SkipchainError::UnknownBlock { id: *to_update })?;
        if !latest.back_link.contains(&target.hash) {
            return Err(SkipchainError::NotInBackLinks { target: target.hash });
        }
        if !latest.is_sealed_by(&target.roster) {
            return Err(SkipchainError::SignatureInvalid { hash: latest.hash });
        }

        if target.forward_link.is_empty() {
            if !self.verifiers.verify(target.verifier_id, &target, &latest) {
                return Err(SkipchainError::VerificationFailed {
                    verifier: target.verifier_id,
                });
            }
        } else if !self.verify_linked_skip_block(&target, &latest) {
            return Err(SkipchainError::NoValidUpdatePath { target: target.hash });
        }

        let signature = self
            .signer
            .sign(&target.roster, &forward_link_message(&target.hash, &latest.hash))?;
        target.forward_link = vec![BlockLink {
            hash: latest.hash,
            signature: Some(signature),
        }];
        self.blocks
            .lock()
            .expect("block table lock poisoned")
            .insert(target.hash, target.clone());

        self.event_sink.emit(Event::ForwardLink(ForwardLinkEvent {
            timestamp: SystemTime::now(),
            from: target.hash,
            to: latest.hash,
        }));
        Ok(target)
    }

    /// Check `candidate` against its level-0 predecessor with the predecessor's verifier, and attach a
    /// collective signature of the candidate's roster. The signed block is neither stored nor sent.
    pub fn sign_block(&self, mut candidate: SkipBlock) -> Result<SkipBlock, SkipchainError> {
        candidate.hash = candidate.calculate_hash();
        let predecessor_id = candidate.back_link.first().copied().unwrap_or_default();
        {
            let _proposals = self.proposals.lock().expect("proposals lock poisoned");
            let predecessor = self
                .skip_block(&predecessor_id)
                .ok_or(SkipchainError::PredecessorNotFound { id: predecessor_id })?;
            if !self.verifiers.verify(predecessor.verifier_id, &predecessor, &candidate) {
                return Err(SkipchainError::Refused {
                    verifier: predecessor.verifier_id,
                });
            }
        }
        candidate.signature = Some(self.signer.sign(&candidate.roster, &candidate.hash.bytes())?);
        Ok(candidate)
    }

    /// Whether `candidate` can be reached from `target` by following stored level-0 forward links.
    pub fn verify_linked_skip_block(&self, target: &SkipBlock, candidate: &SkipBlock) -> bool {
        let blocks = self.blocks.lock().expect("block table lock poisoned");
        let mut link = target.next();
        for _ in 0..=blocks.len() {
            match link {
                Some(link) if link.hash == candidate.hash => return true,
                Some(next) => link = blocks.get(&next.hash).and_then(|block| block.next()),
                None => return false,
            }
        }
        false
    }

    /// Send `block` to every other server in its roster, in roster order. Stops at the first failed
    /// send.
    pub fn start_propagation(&self, block: &SkipBlock) -> Result<(), SkipchainError> {
        let mut network = self.network.lock().expect("network lock poisoned").clone();
        let mut recipients = 0;
        for si in block.roster.iter().filter(|si| si.address != self.me) {
            network.send(si.address, PropagateSkipBlock { block: block.clone() }.into())?;
            recipients += 1;
        }
        self.event_sink.emit(Event::PropagateBlock(PropagateBlockEvent {
            timestamp: SystemTime::now(),
            block: block.hash,
            recipients,
        }));
        Ok(())
    }

    /// Store `block` as received from `origin`, overwriting any local copy.
    pub fn propagate_skip_block(&self, origin: VerifyingKey, block: SkipBlock) {
        let hash = block.hash;
        self.blocks
            .lock()
            .expect("block table lock poisoned")
            .insert(hash, block);
        self.event_sink.emit(Event::ReceiveBlock(ReceiveBlockEvent {
            timestamp: SystemTime::now(),
            origin,
            block: hash,
        }));
    }

    pub fn handle_request(&self, request: Request) -> Result<Reply, SkipchainError> {
        match request {
            Request::ProposeSkipBlock(request) => self.handle_propose_skip_block(request).map(Reply::ProposedSkipBlock),
            Request::GetUpdateChain(GetUpdateChain { latest_known }) => self
                .get_update_chain(&latest_known)
                .map(|update| Reply::UpdateChain(GetUpdateChainReply { update })),
            Request::SetChildrenSkipBlock(SetChildrenSkipBlock { parent, child }) => self
                .set_children_skip_block(&parent, &child)
                .map(Reply::SetChildrenSkipBlock),
            Request::ForwardSignature(ForwardSignature { to_update, latest }) => {
                self.forward_signature(&to_update, latest).map(Reply::ForwardSignature)
            }
            Request::SignBlock(SignBlock { block }) => self.sign_block(block).map(Reply::SignBlock),
        }
    }

    /// Handle every message waiting in the inbox. Requests are answered over the network; replies
    /// received from other services are returned to the caller.
    pub fn poll_network(&self) -> Vec<(VerifyingKey, Reply)> {
        let mut network = self.network.lock().expect("network lock poisoned").clone();
        let mut replies = Vec::new();
        while let Some((origin, message)) = network.recv() {
            match message {
                Message::PropagateSkipBlock(PropagateSkipBlock { block }) => self.propagate_skip_block(origin, block),
                Message::Request(request) => match self.handle_request(request) {
                    Ok(reply) => {
                        if let Err(err) = network.send(origin, reply.into()) {
                            log::warn!("could not reply to {:?}: {}", origin, err);
                        }
                    }
                    Err(err) => log::debug!("request from {:?} failed: {}", origin, err),
                },
                Message::Reply(reply) => replies.push((origin, reply)),
            }
        }
        replies
    }
}

/// The different ways a skipchain operation can fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipchainError {
    /// The block a proposal or a candidate claims to extend is not stored here.
    PredecessorNotFound { id: SkipBlockID },

    /// The chain tip a peer claims is not stored here.
    LatestNotFound { id: SkipBlockID },

    /// The verifier policy rejected the extension.
    VerificationFailed { verifier: VerifierID },

    UnknownBlock { id: SkipBlockID },

    /// A forward link points at a block that is not stored here.
    MissingForwardLink { hash: SkipBlockID },

    /// Following forward links led back to a block already visited.
    ForwardLinkCycle { hash: SkipBlockID },

    ParentNotFound { id: SkipBlockID },

    ChildNotFound { id: SkipBlockID },

    /// The block does not carry a valid collective signature of the roster it was checked against.
    SignatureInvalid { hash: SkipBlockID },

    /// The predecessor already has the highest possible index.
    IndexOverflow { id: SkipBlockID },

    /// The candidate does not list the target among its back links.
    NotInBackLinks { target: SkipBlockID },

    /// The target already has a forward link, and the candidate cannot be reached from it.
    NoValidUpdatePath { target: SkipBlockID },

    /// The verifier policy refused to sign the candidate.
    Refused { verifier: VerifierID },

    Propagation(NetworkError),

    Signing(CosiError),
}

impl From<NetworkError> for SkipchainError {
    fn from(value: NetworkError) -> Self {
        SkipchainError::Propagation(value)
    }
}

impl From<CosiError> for SkipchainError {
    fn from(value: CosiError) -> Self {
        SkipchainError::Signing(value)
    }
}

impl Display for SkipchainError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SkipchainError::PredecessorNotFound { id } => write!(f, "predecessor {} not found", id),
            SkipchainError::LatestNotFound { id } => write!(f, "latest block {} not found", id),
            SkipchainError::VerificationFailed { verifier } => write!(f, "verifier {} rejected the block", verifier),
            SkipchainError::UnknownBlock { id } => write!(f, "unknown block {}", id),
            SkipchainError::MissingForwardLink { hash } => write!(f, "forward link target {} not found", hash),
            SkipchainError::ForwardLinkCycle { hash } => write!(f, "forward links loop back to {}", hash),
            SkipchainError::ParentNotFound { id } => write!(f, "parent block {} not found", id),
            SkipchainError::ChildNotFound { id } => write!(f, "child block {} not found", id),
            SkipchainError::SignatureInvalid { hash } => write!(f, "invalid signature on block {}", hash),
            SkipchainError::IndexOverflow { id } => write!(f, "block {} cannot be extended any further", id),
            SkipchainError::NotInBackLinks { target } => write!(f, "block {} not found in back links", target),
            SkipchainError::NoValidUpdatePath { target } => write!(f, "no forward link path from {}", target),
            SkipchainError::Refused { verifier } => write!(f, "verifier {} refused to sign", verifier),
            SkipchainError::Propagation(err) => write!(f, "propagation failed: {}", err),
            SkipchainError::Signing(err) => write!(f, "signing failed: {}", err),
        }
    }
}

impl std::error::Error for SkipchainError {}
