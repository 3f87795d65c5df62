//! Chain-building harness.
//!
//! [`ChainBuilder`] wraps the block-index arena with the bookkeeping tests
//! repeat constantly: tracking a tip, minting unique hashes, and stamping
//! versions from algorithm tags.

use crate::generators::next_block_hash;
use helix_consensus::{version_for_algo, AlgoType, BlockId, ChainIndex};

/// Incrementally builds a chain (or a tree of forks) in a [`ChainIndex`].
#[derive(Debug, Default)]
pub struct ChainBuilder {
    chain: ChainIndex,
    tip: Option<BlockId>,
}

impl ChainBuilder {
    /// Start with an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// The underlying arena.
    pub fn chain(&self) -> &ChainIndex {
        &self.chain
    }

    /// Current tip, or `None` before genesis.
    pub fn tip(&self) -> Option<BlockId> {
        self.tip
    }

    /// Timestamp of the current tip; panics before genesis.
    pub fn tip_time(&self) -> i64 {
        self.chain.block(self.tip.expect("chain has a tip")).time
    }

    /// Append a block for an algorithm tag and advance the tip.
    pub fn push_block(&mut self, algo: AlgoType, time: i64, bits: u32) -> BlockId {
        self.push_version(version_for_algo(algo), time, bits)
    }

    /// Append a block with a raw version word and advance the tip.
    pub fn push_version(&mut self, version: i32, time: i64, bits: u32) -> BlockId {
        let id = self
            .chain
            .push(self.tip, time, bits, version, next_block_hash())
            .expect("builder tip is always valid");
        self.tip = Some(id);
        id
    }

    /// Append a block under an arbitrary parent without moving the tip.
    pub fn fork_block(
        &mut self,
        parent: Option<BlockId>,
        algo: AlgoType,
        time: i64,
        bits: u32,
    ) -> BlockId {
        self.chain
            .push(parent, time, bits, version_for_algo(algo), next_block_hash())
            .expect("fork parent is valid")
    }

    /// Append `count` blocks for one algorithm at a fixed spacing.
    pub fn extend(&mut self, algo: AlgoType, count: u32, spacing: i64, bits: u32) -> BlockId {
        let mut time = match self.tip {
            Some(id) => self.chain.block(id).time,
            None => crate::generators::block_time(0, spacing) - spacing,
        };
        let mut last = self.tip;
        for _ in 0..count {
            time += spacing;
            last = Some(self.push_block(algo, time, bits));
        }
        last.expect("count is nonzero")
    }
}
