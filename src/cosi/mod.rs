/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Tree-based collective signing (CoSi).
//!
//! A roster of servers is arranged into a signing [tree](tree::Tree). To sign a message, the root of
//! the tree runs a round of the four-phase Schnorr protocol implemented by the [engine]:
//! announcement, commitment, challenge, and response. Every node in the tree keeps one
//! [Round](round::Round) per round it takes part in, admitted through its
//! [NodeContext](setup::NodeContext). The result is a single [CollectiveSignature](signature::CollectiveSignature)
//! that verifies against the aggregate key of the roster, minus the keys of servers that did not take
//! part.

pub mod engine;

pub mod merkle;

pub mod round;

pub mod setup;

pub mod signature;

pub mod tree;
