//! Test data generators.
//!
//! Deterministic helpers for block hashes and timestamps so tests are
//! reproducible while every generated block stays unique.

use helix_consensus::BlockHash;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global counter for unique hash generation.
static HASH_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a unique block hash.
///
/// Hashes only need identity in these tests, not preimage resistance; a
/// tagged counter keeps them unique across every chain a test builds.
pub fn next_block_hash() -> BlockHash {
    let counter = HASH_COUNTER.fetch_add(1, Ordering::SeqCst);
    let mut hash = [0u8; 32];
    hash[0] = 0xB1; // block marker
    hash[1..9].copy_from_slice(&counter.to_be_bytes());
    hash[31] = (counter % 251) as u8;
    hash
}

/// Deterministic block hash from a seed, for tests that need to rebuild
/// the same block identity twice.
pub fn seeded_block_hash(seed: u64) -> BlockHash {
    let mut hash = [0u8; 32];
    hash[0] = 0xB2;
    hash[1..9].copy_from_slice(&seed.to_be_bytes());
    hash
}

/// Timestamp for a block at `height` on a fixed schedule.
///
/// Uses a fixed, mask-aligned base so stake schedules start on a valid
/// timestamp.
pub fn block_time(height: u32, spacing: i64) -> i64 {
    const BASE_TIME: i64 = 1_600_000_000; // divisible by 16
    BASE_TIME + i64::from(height) * spacing
}
