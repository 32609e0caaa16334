/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [Network] trait: what a skipchain service needs from its transport.
//!
//! Peers are addressed by the Ed25519 [VerifyingKey] in their
//! [server identity](crate::types::roster::ServerIdentity). Sending is point-to-point; a failed send is
//! reported to the caller instead of being retried.
//!
//! Clones of a network handle share the same inbox: the service clones its handle before sending or
//! receiving, so that no lock is held while messages are in flight.

use std::fmt::{self, Display, Formatter};

use crate::{skipchain::messages::Message, types::crypto_primitives::VerifyingKey};

pub trait Network: Clone + Send {
    /// Send a message to the specified peer without blocking.
    fn send(&mut self, peer: VerifyingKey, message: Message) -> Result<(), NetworkError>;

    /// Receive a message from any peer. Returns immediately with a None if no message is available now.
    fn recv(&mut self) -> Option<(VerifyingKey, Message)>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// The transport does not know how to reach this peer.
    UnknownPeer(VerifyingKey),

    /// The peer is known, but the connection to it is down.
    Disconnected(VerifyingKey),
}

impl Display for NetworkError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::UnknownPeer(peer) => write!(f, "unknown peer {:?}", peer),
            NetworkError::Disconnected(peer) => write!(f, "disconnected from peer {:?}", peer),
        }
    }
}

impl std::error::Error for NetworkError {}
