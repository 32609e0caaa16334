/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! "Inert" types shared by the collective signing rounds and the skipchain service.
//!
//! These types follow the newtype pattern: they are sent around and inspected, but have no active
//! behavior beyond simple arithmetic and conversions.

use borsh::{BorshDeserialize, BorshSerialize};
use std::{
    fmt::{self, Debug, Display, Formatter},
    ops::Add,
};

/// A 32-byte SHA-256 digest.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, BorshDeserialize, BorshSerialize)]
pub struct CryptoHash([u8; 32]);

impl CryptoHash {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl Display for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for byte in &self.0[0..8] {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl Debug for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

/// Identifier of a [skip block](crate::types::block::SkipBlock). Given a block, the id is obtained
/// [like this](crate::types::block::SkipBlock::calculate_hash).
///
/// The level-0 back link of a genesis block is also a `SkipBlockID`, filled with random bytes since
/// there is no real predecessor.
pub type SkipBlockID = CryptoHash;

/// 1-based position of a block within its skipchain. The genesis block has index 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, BorshDeserialize, BorshSerialize)]
pub struct BlockIndex(u64);

impl BlockIndex {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn genesis() -> Self {
        Self(1)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }

    /// The index `rhs` positions further down the chain, or `None` on overflow.
    pub const fn checked_add(self, rhs: u64) -> Option<Self> {
        match self.0.checked_add(rhs) {
            Some(int) => Some(Self(int)),
            None => None,
        }
    }
}

impl Display for BlockIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Number of a collective signing round. Round numbers start at [`RoundNumber::FIRST`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, BorshDeserialize, BorshSerialize)]
pub struct RoundNumber(u64);

impl RoundNumber {
    pub const FIRST: RoundNumber = RoundNumber(1);

    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// The watermark of a node that has not seen any round yet.
    pub const fn init() -> Self {
        Self(0)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }

    pub fn to_le_bytes(&self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    pub const fn checked_add(self, rhs: u64) -> Option<Self> {
        match self.0.checked_add(rhs) {
            Some(int) => Some(Self(int)),
            None => None,
        }
    }
}

impl Display for RoundNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Number of a membership view, i.e., a specific configuration of the signing tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, BorshDeserialize, BorshSerialize)]
pub struct ViewNumber(u64);

impl ViewNumber {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn init() -> Self {
        Self(0)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Display for ViewNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Add<u64> for ViewNumber {
    type Output = ViewNumber;

    fn add(self, rhs: u64) -> Self::Output {
        ViewNumber(self.0 + rhs)
    }
}

/// Identifies the [verifier policy](crate::skipchain::verifiers) that governs which blocks may extend
/// a given block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize)]
pub struct VerifierID(u32);

impl VerifierID {
    pub const fn new(int: u32) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u32 {
        self.0
    }
}

impl Default for VerifierID {
    fn default() -> Self {
        crate::skipchain::verifiers::VERIFY_NONE
    }
}

impl Display for VerifierID {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Application payload stored in a [skip block](crate::types::block::SkipBlock). May be empty.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default, BorshDeserialize, BorshSerialize)]
pub struct Data(Vec<u8>);

impl Data {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> &Vec<u8> {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
