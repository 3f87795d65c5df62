//! Block index records and the chain index arena.
//!
//! The engine never owns chain storage. It borrows a [`ChainIndex`], an
//! append-only arena of [`BlockIndex`] records addressed by [`BlockId`],
//! and walks parent links read-only. Records never change once inserted,
//! which is what lets retargeting run from multiple validation threads
//! without further synchronization.

use crate::chain_params::{algo_type, is_proof_of_stake_version, AlgoType};
use crate::error::{ConsensusError, ConsensusResult};

/// 256-bit block content hash.
pub type BlockHash = [u8; 32];

/// Handle to a block record inside a [`ChainIndex`].
///
/// Only ever minted by [`ChainIndex::push`], so a handle is always valid
/// for the arena that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(u32);

/// One block's index record.
#[derive(Debug, Clone)]
pub struct BlockIndex {
    /// Height in the chain; genesis is 0.
    pub height: u32,
    /// Parent record, or `None` for genesis.
    pub prev: Option<BlockId>,
    /// Block timestamp, unix seconds.
    pub time: i64,
    /// Compact difficulty target this block was accepted under.
    pub bits: u32,
    /// Header version; the low bits carry the algorithm tag.
    pub version: i32,
    /// Proof-of-work blocks up to and including this one.
    pub height_pow: u32,
    /// Proof-of-stake blocks up to and including this one.
    pub height_pos: u32,
    /// Content hash identifying the block.
    pub block_hash: BlockHash,
}

impl BlockIndex {
    /// Whether this is a proof-of-stake block.
    #[inline]
    pub fn is_proof_of_stake(&self) -> bool {
        is_proof_of_stake_version(self.version)
    }

    /// Algorithm tag, or `None` when the version carries no recognized tag.
    #[inline]
    pub fn algo_type(&self) -> Option<AlgoType> {
        algo_type(self.version)
    }
}

/// Append-only arena of block index records.
///
/// Forks are first-class: any record can be extended, so the arena holds a
/// tree of which each validated chain is a path.
#[derive(Debug, Default)]
pub struct ChainIndex {
    entries: Vec<BlockIndex>,
}

impl ChainIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a block under `prev`.
    ///
    /// Height and the per-algorithm counters are derived from the parent
    /// record; `prev = None` starts a new root at height 0.
    pub fn push(
        &mut self,
        prev: Option<BlockId>,
        time: i64,
        bits: u32,
        version: i32,
        block_hash: BlockHash,
    ) -> ConsensusResult<BlockId> {
        let (height, mut height_pow, mut height_pos) = match prev {
            Some(id) => {
                let parent = self
                    .entries
                    .get(id.0 as usize)
                    .ok_or(ConsensusError::UnknownParent(id.0))?;
                (parent.height + 1, parent.height_pow, parent.height_pos)
            }
            None => (0, 0, 0),
        };
        if is_proof_of_stake_version(version) {
            height_pos += 1;
        } else {
            height_pow += 1;
        }

        let id = BlockId(self.entries.len() as u32);
        self.entries.push(BlockIndex {
            height,
            prev,
            time,
            bits,
            version,
            height_pow,
            height_pos,
            block_hash,
        });
        Ok(id)
    }

    /// The record behind a handle.
    #[inline]
    pub fn block(&self, id: BlockId) -> &BlockIndex {
        &self.entries[id.0 as usize]
    }

    /// Number of records in the arena.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the arena holds no records.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Walk parent links from `from` down to the ancestor at `height`.
    ///
    /// Returns `None` when `height` is above the starting block.
    pub fn ancestor(&self, from: BlockId, height: u32) -> Option<BlockId> {
        let mut cursor = from;
        loop {
            let block = self.block(cursor);
            if block.height == height {
                return Some(cursor);
            }
            if block.height < height {
                return None;
            }
            cursor = block.prev?;
        }
    }
}
