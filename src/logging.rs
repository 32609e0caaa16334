/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The logs defined in this module are printed if the user enabled them via the `log_events` flag of
//! the [service](crate::config::Configuration) or [engine](crate::config::CosiConfiguration)
//! configuration.
//!
//! This crate logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
//! printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two values are
//! always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event. For example, the following snippet
//! is how an [InsertBlock](crate::events::InsertBlockEvent) is printed:
//!
//! ```text
//! InsertBlock, 1701329264, fNGCJyk, 3
//! ```
//!
//! In the snippet:
//! - The third value is the first seven characters of the Base64 encoding of the hash of the block.
//! - The fourth value is the index of the block.

use crate::events::*;
use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use std::time::SystemTime;

// Names of each event in PascalCase for printing:
pub const INSERT_BLOCK: &str = "InsertBlock";
pub const FORWARD_LINK: &str = "ForwardLink";
pub const RECEIVE_BLOCK: &str = "ReceiveBlock";
pub const PROPAGATE_BLOCK: &str = "PropagateBlock";

pub const START_ROUND: &str = "StartRound";
pub const REJECT_ROUND: &str = "RejectRound";
pub const EXCEPTION: &str = "Exception";
pub const COLLECT_SIGNATURE: &str = "CollectSignature";

/// Implemented by event types. Used to get a closure that logs the event.
pub(crate) trait Logger {
    /// Returns a pointer to the default logging handler for a given event type.
    fn get_logger() -> Box<dyn Fn(&Self) + Send>;
}

impl Logger for InsertBlockEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |insert_block_event: &InsertBlockEvent| {
            log::info!(
                "{}, {}, {}, {}",
                INSERT_BLOCK,
                secs_since_unix_epoch(insert_block_event.timestamp),
                first_seven_base64_chars(&insert_block_event.block.bytes()),
                insert_block_event.index
            )
        };
        Box::new(logger)
    }
}

impl Logger for ForwardLinkEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |forward_link_event: &ForwardLinkEvent| {
            log::info!(
                "{}, {}, {}, {}",
                FORWARD_LINK,
                secs_since_unix_epoch(forward_link_event.timestamp),
                first_seven_base64_chars(&forward_link_event.from.bytes()),
                first_seven_base64_chars(&forward_link_event.to.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveBlockEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_block_event: &ReceiveBlockEvent| {
            log::info!(
                "{}, {}, {}, {}",
                RECEIVE_BLOCK,
                secs_since_unix_epoch(receive_block_event.timestamp),
                first_seven_base64_chars(&receive_block_event.origin.to_bytes()),
                first_seven_base64_chars(&receive_block_event.block.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for PropagateBlockEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |propagate_block_event: &PropagateBlockEvent| {
            log::info!(
                "{}, {}, {}, {}",
                PROPAGATE_BLOCK,
                secs_since_unix_epoch(propagate_block_event.timestamp),
                first_seven_base64_chars(&propagate_block_event.block.bytes()),
                propagate_block_event.recipients
            )
        };
        Box::new(logger)
    }
}

impl Logger for StartRoundEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |start_round_event: &StartRoundEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                START_ROUND,
                secs_since_unix_epoch(start_round_event.timestamp),
                first_seven_base64_chars(&start_round_event.root.bytes()),
                start_round_event.view,
                start_round_event.round
            )
        };
        Box::new(logger)
    }
}

impl Logger for RejectRoundEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |reject_round_event: &RejectRoundEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                REJECT_ROUND,
                secs_since_unix_epoch(reject_round_event.timestamp),
                first_seven_base64_chars(&reject_round_event.server.bytes()),
                reject_round_event.round,
                reject_round_event.reason
            )
        };
        Box::new(logger)
    }
}

impl Logger for ExceptionEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |exception_event: &ExceptionEvent| {
            log::info!(
                "{}, {}, {}, {}",
                EXCEPTION,
                secs_since_unix_epoch(exception_event.timestamp),
                exception_event.round,
                first_seven_base64_chars(&exception_event.server.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for CollectSignatureEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |collect_signature_event: &CollectSignatureEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                COLLECT_SIGNATURE,
                secs_since_unix_epoch(collect_signature_event.timestamp),
                first_seven_base64_chars(&collect_signature_event.root.bytes()),
                collect_signature_event.round,
                collect_signature_event.exceptions
            )
        };
        Box::new(logger)
    }
}

pub(crate) fn log_event(event: &Event) {
    match event {
        Event::InsertBlock(e) => InsertBlockEvent::get_logger()(e),
        Event::ForwardLink(e) => ForwardLinkEvent::get_logger()(e),
        Event::ReceiveBlock(e) => ReceiveBlockEvent::get_logger()(e),
        Event::PropagateBlock(e) => PropagateBlockEvent::get_logger()(e),
        Event::StartRound(e) => StartRoundEvent::get_logger()(e),
        Event::RejectRound(e) => RejectRoundEvent::get_logger()(e),
        Event::Exception(e) => ExceptionEvent::get_logger()(e),
        Event::CollectSignature(e) => CollectSignatureEvent::get_logger()(e),
    }
}

// Get a more readable representation of a bytesequence by base64-encoding it and taking the first 7 characters.
pub(crate) fn first_seven_base64_chars(bytes: &[u8]) -> String {
    let encoded = STANDARD_NO_PAD.encode(bytes);
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}

pub(crate) fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}
