/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Requests and replies of the skipchain service, and the messages services send each other over the
//! [network](crate::networking::Network).

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{basic::SkipBlockID, block::SkipBlock};

/// A message sent between skipchain services.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub enum Message {
    PropagateSkipBlock(PropagateSkipBlock),
    Request(Request),
    Reply(Reply),
}

impl From<PropagateSkipBlock> for Message {
    fn from(value: PropagateSkipBlock) -> Self {
        Message::PropagateSkipBlock(value)
    }
}

impl From<Request> for Message {
    fn from(value: Request) -> Self {
        Message::Request(value)
    }
}

impl From<Reply> for Message {
    fn from(value: Reply) -> Self {
        Message::Reply(value)
    }
}

#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub enum Request {
    ProposeSkipBlock(ProposeSkipBlock),
    GetUpdateChain(GetUpdateChain),
    SetChildrenSkipBlock(SetChildrenSkipBlock),
    ForwardSignature(ForwardSignature),
    SignBlock(SignBlock),
}

#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub enum Reply {
    ProposedSkipBlock(ProposedSkipBlockReply),
    UpdateChain(GetUpdateChainReply),
    SetChildrenSkipBlock(SetChildrenSkipBlockReply),
    /// The target block, with its forward link updated.
    ForwardSignature(SkipBlock),
    /// The candidate block, with its signature attached.
    SignBlock(SkipBlock),
}

/// Ask for `proposed` to be appended to the chain whose tip is `latest`. A `latest` of `None` asks for a
/// new chain with `proposed` as its genesis block.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct ProposeSkipBlock {
    pub latest: Option<SkipBlockID>,
    pub proposed: SkipBlock,
}

#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct ProposedSkipBlockReply {
    pub previous: Option<SkipBlock>,
    pub latest: SkipBlock,
}

#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct GetUpdateChain {
    pub latest_known: SkipBlockID,
}

/// Blocks from the requested block up to the tip of its chain, in index order.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct GetUpdateChainReply {
    pub update: Vec<SkipBlock>,
}

#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct SetChildrenSkipBlock {
    pub parent: SkipBlockID,
    pub child: SkipBlockID,
}

#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct SetChildrenSkipBlockReply {
    pub parent: SkipBlock,
    pub child: SkipBlock,
}

/// Overwrite the receiver's copy of `block`.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct PropagateSkipBlock {
    pub block: SkipBlock,
}

/// Ask for the forward link of `to_update` to point at `latest`.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct ForwardSignature {
    pub to_update: SkipBlockID,
    pub latest: SkipBlock,
}

/// Ask for `block` to be checked against its predecessor and signed.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct SignBlock {
    pub block: SkipBlock,
}
