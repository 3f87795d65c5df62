//! Read-only walks over the chain index.
//!
//! Every retarget algorithm sees the interleaved PoW/PoS history through
//! one of these filters. The walks never mutate and degrade gracefully at
//! genesis: a walk that runs out of predecessors returns the genesis-most
//! record it reached even when that record does not match the filter, and
//! callers detect the situation through the record's missing parent.

use crate::block_index::{BlockId, ChainIndex};
use crate::chain_params::AlgoType;

/// Last block at or before `start` whose stake-ness matches `want_pos`.
pub fn last_block(chain: &ChainIndex, start: Option<BlockId>, want_pos: bool) -> Option<BlockId> {
    let mut cursor = start?;
    loop {
        let block = chain.block(cursor);
        if block.is_proof_of_stake() == want_pos {
            return Some(cursor);
        }
        match block.prev {
            Some(prev) => cursor = prev,
            None => return Some(cursor),
        }
    }
}

/// Last block at or before `start` carrying the given algorithm tag.
pub fn last_block_for_algo(
    chain: &ChainIndex,
    start: Option<BlockId>,
    algo: AlgoType,
) -> Option<BlockId> {
    let mut cursor = start?;
    loop {
        let block = chain.block(cursor);
        if block.algo_type() == Some(algo) {
            return Some(cursor);
        }
        match block.prev {
            Some(prev) => cursor = prev,
            None => return Some(cursor),
        }
    }
}

/// Tag-filtered walk when the tag is known, stake-ness fallback otherwise.
pub(crate) fn last_block_filtered(
    chain: &ChainIndex,
    start: Option<BlockId>,
    algo: Option<AlgoType>,
    want_pos: bool,
) -> Option<BlockId> {
    match algo {
        Some(algo) => last_block_for_algo(chain, start, algo),
        None => last_block(chain, start, want_pos),
    }
}

/// Anchor block for an algorithm's ASERT schedule.
///
/// Steps to the previous same-algorithm block for as long as the cursor
/// sits at or above `start_height` and such a predecessor exists. With a
/// start height of zero this is the earliest in-algorithm block reachable
/// from `start`.
pub fn asert_reference(
    chain: &ChainIndex,
    start: Option<BlockId>,
    start_height: u32,
    algo: AlgoType,
) -> Option<BlockId> {
    let mut cursor = start?;
    while chain.block(cursor).height >= start_height {
        match last_block_for_algo(chain, chain.block(cursor).prev, algo) {
            Some(prev) => cursor = prev,
            None => break,
        }
    }
    Some(cursor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_index::BlockHash;
    use crate::chain_params::{version_for_algo, VERSION_STAKE_FLAG};

    fn hash(seed: u8) -> BlockHash {
        let mut h = [0u8; 32];
        h[0] = seed;
        h
    }

    /// genesis(PoW) -> PoS -> PoW -> PoS -> untagged-stake
    fn mixed_chain() -> (ChainIndex, Vec<BlockId>) {
        let mut chain = ChainIndex::new();
        let pow = version_for_algo(AlgoType::PowSha256);
        let pos = version_for_algo(AlgoType::Pos);
        let mut ids = Vec::new();
        let mut tip = None;
        for (i, version) in [pow, pos, pow, pos, VERSION_STAKE_FLAG].into_iter().enumerate() {
            let id = chain
                .push(tip, i as i64 * 80, 0x1e00ffff, version, hash(i as u8))
                .unwrap();
            ids.push(id);
            tip = Some(id);
        }
        (chain, ids)
    }

    #[test]
    fn last_block_filters_by_stakeness() {
        let (chain, ids) = mixed_chain();
        let tip = Some(ids[4]);
        // ids[4] is stake-marked (untagged), so it matches want_pos.
        assert_eq!(last_block(&chain, tip, true), Some(ids[4]));
        assert_eq!(last_block(&chain, tip, false), Some(ids[2]));
        assert_eq!(last_block(&chain, None, true), None);
    }

    #[test]
    fn last_block_stops_at_genesis_without_match() {
        let mut chain = ChainIndex::new();
        let pow = version_for_algo(AlgoType::PowSha256);
        let genesis = chain.push(None, 0, 0x1e00ffff, pow, hash(0)).unwrap();
        // No stake block exists; the walk ends on genesis anyway.
        assert_eq!(last_block(&chain, Some(genesis), true), Some(genesis));
    }

    #[test]
    fn last_block_for_algo_skips_other_tags() {
        let (chain, ids) = mixed_chain();
        let tip = Some(ids[4]);
        assert_eq!(last_block_for_algo(&chain, tip, AlgoType::Pos), Some(ids[3]));
        assert_eq!(
            last_block_for_algo(&chain, tip, AlgoType::PowSha256),
            Some(ids[2])
        );
        // The untagged block never matches a tag filter.
        assert_ne!(
            last_block_for_algo(&chain, tip, AlgoType::Pos),
            Some(ids[4])
        );
    }

    #[test]
    fn asert_reference_finds_earliest_in_algo_block() {
        let (chain, ids) = mixed_chain();
        assert_eq!(
            asert_reference(&chain, Some(ids[4]), 0, AlgoType::PowSha256),
            Some(ids[0])
        );
        assert_eq!(
            asert_reference(&chain, Some(ids[4]), 0, AlgoType::Pos),
            Some(ids[1])
        );
        assert_eq!(asert_reference(&chain, None, 0, AlgoType::Pos), None);
    }

    #[test]
    fn asert_reference_respects_start_height() {
        let mut chain = ChainIndex::new();
        let pow = version_for_algo(AlgoType::PowSha256);
        let mut tip = None;
        let mut ids = Vec::new();
        for i in 0..6u8 {
            let id = chain
                .push(tip, i64::from(i) * 600, 0x1e00ffff, pow, hash(i))
                .unwrap();
            ids.push(id);
            tip = Some(id);
        }
        // The walk keeps stepping while the cursor is at or above the
        // start height, so it lands on the first block below it.
        let reference = asert_reference(&chain, tip, 3, AlgoType::PowSha256);
        assert_eq!(reference, Some(ids[2]));
    }
}
