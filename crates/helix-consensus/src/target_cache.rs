//! Windowed-average target cache.
//!
//! Recomputing the ASERT reference target walks up to a full averaging
//! window of records and sums their decoded targets, so the engine
//! memoizes the last result behind a single mutex. The key must pin the
//! window-end block hash: height and algorithm alone go stale the moment a
//! reorganization replaces the window contents.

use crate::block_index::BlockHash;
use crate::chain_params::AlgoType;
use helix_arith::U256;
use parking_lot::{Mutex, MutexGuard};

/// The one cached reference target, keyed by how it was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CachedTarget {
    /// Average over a full window ending at the keyed block.
    Window {
        height: u32,
        algo: AlgoType,
        hash: BlockHash,
        target: U256,
    },
    /// Chain shorter than a window: the anchor block's own target.
    Anchor {
        algo: AlgoType,
        hash: BlockHash,
        target: U256,
    },
}

impl CachedTarget {
    /// Stored window average, if the slot matches the key exactly.
    pub fn window_hit(&self, height: u32, algo: AlgoType, hash: &BlockHash) -> Option<U256> {
        match self {
            CachedTarget::Window {
                height: h,
                algo: a,
                hash: k,
                target,
            } if *h == height && *a == algo && k == hash && !target.is_zero() => Some(*target),
            _ => None,
        }
    }

    /// Stored anchor target, if the slot matches the key exactly.
    pub fn anchor_hit(&self, algo: AlgoType, hash: &BlockHash) -> Option<U256> {
        match self {
            CachedTarget::Anchor {
                algo: a,
                hash: k,
                target,
            } if *a == algo && k == hash && !target.is_zero() => Some(*target),
            _ => None,
        }
    }
}

/// Single-slot cache behind one mutex.
///
/// The lock is held across the whole lookup-or-recompute block; the
/// critical section is bounded by one window walk plus a big-integer sum.
#[derive(Debug, Default)]
pub(crate) struct TargetCache {
    slot: Mutex<Option<CachedTarget>>,
}

impl TargetCache {
    pub fn lock(&self) -> MutexGuard<'_, Option<CachedTarget>> {
        self.slot.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_hit_requires_full_key() {
        let hash = [7u8; 32];
        let slot = CachedTarget::Window {
            height: 100,
            algo: AlgoType::PowSha256,
            hash,
            target: U256::from(42u64),
        };
        assert_eq!(
            slot.window_hit(100, AlgoType::PowSha256, &hash),
            Some(U256::from(42u64))
        );
        assert_eq!(slot.window_hit(101, AlgoType::PowSha256, &hash), None);
        assert_eq!(slot.window_hit(100, AlgoType::Pos, &hash), None);
        assert_eq!(slot.window_hit(100, AlgoType::PowSha256, &[8u8; 32]), None);
        // An anchor slot never answers a window lookup.
        let anchor = CachedTarget::Anchor {
            algo: AlgoType::PowSha256,
            hash,
            target: U256::from(42u64),
        };
        assert_eq!(anchor.window_hit(100, AlgoType::PowSha256, &hash), None);
    }

    #[test]
    fn zero_target_never_hits() {
        let hash = [7u8; 32];
        let slot = CachedTarget::Window {
            height: 100,
            algo: AlgoType::PowSha256,
            hash,
            target: U256::zero(),
        };
        assert_eq!(slot.window_hit(100, AlgoType::PowSha256, &hash), None);
        let anchor = CachedTarget::Anchor {
            algo: AlgoType::Pos,
            hash,
            target: U256::zero(),
        };
        assert_eq!(anchor.anchor_hit(AlgoType::Pos, &hash), None);
    }
}
