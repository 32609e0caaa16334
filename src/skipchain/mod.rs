/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The skipchain: a chain of [skip blocks](crate::types::block::SkipBlock) sealed by collective
//! signatures and traversed through forward links.
//!
//! The [SkipchainService](service::SkipchainService) of every server in a roster keeps a table of
//! the blocks it knows about. Any of them can propose a new block; the proposal is checked by the
//! [verifier policy](verifiers) of the chain, linked into the chain, signed by the roster, and then
//! propagated to every server in the roster as a [message](messages::Message).

pub mod messages;

pub mod service;

pub mod verifiers;
