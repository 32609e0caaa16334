/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A Rust library for building skipchains: hash-linked chains of blocks that are sealed by
//! collective signatures and traversed through forward links.
//!
//! The crate is made of two coupled building blocks:
//! 1. [Collective signing](cosi): a roster of servers, arranged in a tree, jointly produces a single
//!    Schnorr signature over a message. Servers that do not take part are accounted for in an
//!    exception list instead of making the round fail.
//! 2. The [skipchain service](skipchain::service::SkipchainService): proposal, verification, linking,
//!    and propagation of [skip blocks](types::block::SkipBlock), each sealed by its roster through a
//!    [collective signer](cosi::engine::CollectiveSigner).
//!
//! The transport between services is left to the user, who provides it by implementing the
//! [Network](networking::Network) trait.
//!
//! ## Logging
//!
//! Events are [logged](logging) through the [log](https://docs.rs/log/latest/log/) facade if the
//! `log_events` flag of the [configuration](config) is set.

pub mod config;

pub mod cosi;

pub mod events;

pub mod logging;

pub mod networking;

pub mod skipchain;

pub mod types;
