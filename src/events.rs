/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of skipchain events for event handling and logging.
//!
//! Note: an event for a given action indicates that the action has been completed.
//!
//! Events are [logged](crate::logging) if the component that emits them was configured with
//! `log_events` set, and are sent to the component's event publisher if it has one.

use std::{
    sync::{mpsc::Sender, Mutex},
    time::SystemTime,
};

use crate::{
    cosi::setup::RoundSetupError,
    logging::log_event,
    types::{
        basic::{BlockIndex, RoundNumber, SkipBlockID, ViewNumber},
        crypto_primitives::{PublicKey, VerifyingKey},
    },
};

pub enum Event {
    // Events that change the local block table.
    InsertBlock(InsertBlockEvent),
    ForwardLink(ForwardLinkEvent),
    ReceiveBlock(ReceiveBlockEvent),
    // Events that involve sending blocks to a roster.
    PropagateBlock(PropagateBlockEvent),
    // Collective signing events.
    StartRound(StartRoundEvent),
    RejectRound(RejectRoundEvent),
    Exception(ExceptionEvent),
    CollectSignature(CollectSignatureEvent),
}

/// A new block was stored under its hash.
pub struct InsertBlockEvent {
    pub timestamp: SystemTime,
    pub block: SkipBlockID,
    pub index: BlockIndex,
}

/// The forward link of `from` was set to point at `to`.
pub struct ForwardLinkEvent {
    pub timestamp: SystemTime,
    pub from: SkipBlockID,
    pub to: SkipBlockID,
}

/// A block sent by `origin` overwrote the local copy.
pub struct ReceiveBlockEvent {
    pub timestamp: SystemTime,
    pub origin: VerifyingKey,
    pub block: SkipBlockID,
}

/// A block was sent to every server in its roster.
pub struct PropagateBlockEvent {
    pub timestamp: SystemTime,
    pub block: SkipBlockID,
    pub recipients: usize,
}

pub struct StartRoundEvent {
    pub timestamp: SystemTime,
    pub root: PublicKey,
    pub view: ViewNumber,
    pub round: RoundNumber,
}

pub struct RejectRoundEvent {
    pub timestamp: SystemTime,
    pub server: PublicKey,
    pub round: RoundNumber,
    pub reason: RoundSetupError,
}

/// `server` committed in `round` but did not respond, and will be left out of the next attempt.
pub struct ExceptionEvent {
    pub timestamp: SystemTime,
    pub round: RoundNumber,
    pub server: PublicKey,
}

pub struct CollectSignatureEvent {
    pub timestamp: SystemTime,
    pub root: PublicKey,
    pub round: RoundNumber,
    pub exceptions: usize,
}

/// Where a component sends the events it emits.
pub(crate) struct EventSink {
    log_events: bool,
    publisher: Option<Mutex<Sender<Event>>>,
}

impl EventSink {
    pub(crate) fn new(log_events: bool, publisher: Option<Sender<Event>>) -> EventSink {
        EventSink {
            log_events,
            publisher: publisher.map(Mutex::new),
        }
    }

    pub(crate) fn emit(&self, event: Event) {
        if self.log_events {
            log_event(&event);
        }
        if let Some(publisher) = &self.publisher {
            // A dropped receiver only means nobody is listening anymore.
            let _ = publisher.lock().expect("event publisher lock poisoned").send(event);
        }
    }
}
