//! Types and traits that are used across multiple components of the crate.
//!
//! Types specific to the collective signing protocol can be found in [`crate::cosi`]; the messages
//! exchanged by skipchain services can be found in [`crate::skipchain::messages`].

pub mod basic;

pub mod block;

pub mod crypto_primitives;

pub mod roster;
