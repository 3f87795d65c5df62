//! Proof-of-work verification.

use crate::block_index::BlockHash;
use crate::chain_params::{AlgoType, ChainParams};
use helix_arith::{decode_compact, U256};

/// Interpret a block hash as a 256-bit integer.
///
/// Hashes compare little-endian: the byte layout is part of the consensus
/// wire protocol.
#[inline]
fn hash_to_u256(hash: &BlockHash) -> U256 {
    U256::from_little_endian(hash)
}

/// Check that a header hash meets the claimed compact target.
///
/// Range checks run before the hash comparison: negative or zero targets,
/// mantissa overflow, the stake pseudo-algorithm (stake blocks are not
/// proof-of-work), and targets looser than the per-algorithm limit are all
/// rejected outright. A missing algorithm tag is checked against the
/// SHA-256 limit.
pub fn check_proof_of_work(
    hash: &BlockHash,
    bits: u32,
    algo: Option<AlgoType>,
    params: &ChainParams,
) -> bool {
    let decoded = decode_compact(bits);

    // Check range
    if decoded.is_negative
        || decoded.value.is_zero()
        || decoded.is_overflow
        || algo == Some(AlgoType::Pos)
        || decoded.value > *params.limit_for(algo)
    {
        return false;
    }

    // Check proof of work matches claimed amount
    hash_to_u256(hash) <= decoded.value
}

/// Expected work for a block accepted at this target.
///
/// Work is `floor(2^256 / (target + 1))`, computed as
/// `(!target / (target + 1)) + 1` to stay inside 256 bits. Out-of-range
/// encodings contribute zero work.
pub fn block_proof(bits: u32) -> U256 {
    let decoded = decode_compact(bits);
    if decoded.is_negative || decoded.is_overflow || decoded.value.is_zero() {
        return U256::zero();
    }
    let target = decoded.value;
    (!target / (target + U256::one())) + U256::one()
}
