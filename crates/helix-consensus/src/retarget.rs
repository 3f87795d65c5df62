//! Difficulty retargeting for the interleaved PoW/PoS chain.
//!
//! Three algorithms cooperate, selected by height and network flags:
//!
//! - a legacy fixed-interval retarget for the single-algorithm SHA-256 era
//!   ([`RetargetEngine::next_work_required_interval`]);
//! - a weighted target exponential moving average used while an algorithm
//!   bootstraps ([`RetargetEngine::weighted_target_ema`]);
//! - ASERT against an anchored per-algorithm reference block, with the
//!   reference target replaced by a windowed average once the chain is
//!   long enough ([`RetargetEngine::average_target_asert`]).
//!
//! All arithmetic is fixed-width: multiplications run in 512 bits strictly
//! before the matching division, and results are clamped to the
//! per-algorithm limit. Identical inputs yield byte-identical outputs; the
//! windowed-average cache is invisible in results.

use crate::block_index::{BlockId, ChainIndex};
use crate::chain_params::{
    algo_type, is_proof_of_stake_version, AlgoType, ChainParams, POW_BLOCK_SPACING,
};
use crate::chain_view::{asert_reference, last_block_filtered, last_block_for_algo};
use crate::target_cache::{CachedTarget, TargetCache};
use helix_arith::{decode_compact, encode_compact, encode_compact_rounded, U256, U512};
use tracing::debug;

/// Height at which ASERT anchoring begins.
const ASERT_START_HEIGHT: u32 = 0;

/// Gap after which a test-network block may be mined at minimum difficulty.
const MIN_DIFFICULTY_GAP_SECS: i64 = 30 * 60;

/// The candidate header fields retargeting reads.
#[derive(Debug, Clone, Copy)]
pub struct CandidateHeader {
    /// Header version; the low bits carry the algorithm tag.
    pub version: i32,
    /// Claimed block timestamp, unix seconds.
    pub time: i64,
}

impl CandidateHeader {
    /// Algorithm tag, or `None` for an unrecognized version.
    #[inline]
    pub fn algo_type(&self) -> Option<AlgoType> {
        algo_type(self.version)
    }

    /// Whether the candidate claims to be proof-of-stake.
    #[inline]
    pub fn is_proof_of_stake(&self) -> bool {
        is_proof_of_stake_version(self.version)
    }
}

/// Difficulty retargeting engine.
///
/// Holds the injected [`ChainParams`] and the windowed-average cache.
/// Every method is a pure function of `(tip, header, params)` and the
/// chain prefix reachable from the tip; the cache cannot alter results.
/// Safe to share across validation threads.
#[derive(Debug)]
pub struct RetargetEngine {
    params: ChainParams,
    cache: TargetCache,
}

impl RetargetEngine {
    /// Create an engine for a network.
    pub fn new(params: ChainParams) -> Self {
        Self {
            params,
            cache: TargetCache::default(),
        }
    }

    /// The network parameters this engine was built with.
    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    /// Required compact target for a candidate block extending `tip`.
    ///
    /// Returns the per-algorithm limit at genesis or when retargeting is
    /// frozen, applies the test-network min-difficulty override, and
    /// otherwise defers to [`Self::average_target_asert`].
    pub fn next_work_required(
        &self,
        chain: &ChainIndex,
        tip: Option<BlockId>,
        header: &CandidateHeader,
    ) -> u32 {
        let algo = header.algo_type();
        let pow_limit_compact = self.params.limit_compact_for(algo);
        let Some(tip) = tip else {
            return pow_limit_compact;
        };
        if self.params.pow_no_retargeting {
            return pow_limit_compact;
        }

        if self.params.pow_allow_min_difficulty_blocks {
            if let Some(algo) = algo {
                if let Some(bits) =
                    self.min_difficulty_override(chain, tip, header, algo, pow_limit_compact)
                {
                    return bits;
                }
            }
        }

        self.average_target_asert(chain, Some(tip), header)
    }

    /// Test-network special rule: a block arriving more than thirty
    /// minutes late may be mined at minimum difficulty, and once such
    /// blocks are on the chain, difficulty resumes from the last normal
    /// same-algorithm block instead of the easy ones.
    fn min_difficulty_override(
        &self,
        chain: &ChainIndex,
        tip: BlockId,
        header: &CandidateHeader,
        algo: AlgoType,
        pow_limit_compact: u32,
    ) -> Option<u32> {
        let special = pow_limit_compact - 1;

        let prev_id = last_block_for_algo(chain, Some(tip), algo)?;
        let prev = chain.block(prev_id);
        if prev.height > 10 && header.time > prev.time + MIN_DIFFICULTY_GAP_SECS {
            return Some(special);
        }

        if prev.prev.is_some() && prev.bits == special {
            // Walk back across consecutive min-difficulty or off-algorithm
            // blocks to the first normal ancestor.
            let mut cursor = prev_id;
            loop {
                let block = chain.block(cursor);
                match block.prev {
                    Some(parent)
                        if block.bits == special || block.algo_type() != Some(algo) =>
                    {
                        cursor = parent;
                    }
                    _ => break,
                }
            }
            let pindex = chain.block(cursor);
            if let Some(pprev_id) = last_block_for_algo(chain, pindex.prev, algo) {
                let pprev = chain.block(pprev_id);
                if pprev.height > 10 {
                    // A min-difficulty block must not become the baseline.
                    return Some(if pprev.bits != special {
                        pprev.bits
                    } else {
                        pindex.bits
                    });
                }
            }
        }

        None
    }

    /// Legacy fixed-interval retarget for the single-algorithm SHA-256 era.
    ///
    /// Difficulty only moves at heights divisible by the adjustment
    /// interval; between boundaries the tip's target carries over, with the
    /// usual test-network escape hatch for badly delayed blocks.
    pub fn next_work_required_interval(
        &self,
        chain: &ChainIndex,
        tip: BlockId,
        header: &CandidateHeader,
    ) -> u32 {
        let pow_limit_compact =
            encode_compact(&self.params.pow_limit[AlgoType::PowSha256.index()]);
        let interval = self.params.difficulty_adjustment_interval();
        let last = chain.block(tip);

        // Only change once per difficulty adjustment interval.
        if i64::from(last.height + 1) % interval != 0 {
            if self.params.pow_allow_min_difficulty_blocks {
                if header.time > last.time + self.params.pow_target_spacing * 2 {
                    return pow_limit_compact;
                }
                // Resume from the last block that was not mined under the
                // min-difficulty rule.
                let mut cursor = tip;
                loop {
                    let block = chain.block(cursor);
                    match block.prev {
                        Some(parent)
                            if i64::from(block.height) % interval != 0
                                && block.bits == pow_limit_compact =>
                        {
                            cursor = parent;
                        }
                        _ => break,
                    }
                }
                return chain.block(cursor).bits;
            }
            return last.bits;
        }

        let first_height = i64::from(last.height) - (interval - 1);
        assert!(first_height >= 0, "retarget interval reaches below genesis");
        let first = chain
            .ancestor(tip, first_height as u32)
            .expect("retarget ancestor must exist");

        self.calculate_next_work_required(chain, tip, chain.block(first).time)
    }

    /// Interval retarget step: scale the tip target by the clamped actual
    /// timespan over the scheduled timespan.
    pub fn calculate_next_work_required(
        &self,
        chain: &ChainIndex,
        tip: BlockId,
        first_block_time: i64,
    ) -> u32 {
        let last = chain.block(tip);
        if self.params.pow_no_retargeting {
            return last.bits;
        }

        let timespan = self.params.pow_target_timespan;
        let actual = (last.time - first_block_time).clamp(timespan / 4, timespan * 4);

        let pow_limit = &self.params.pow_limit[AlgoType::PowSha256.index()];
        let (scaled, _) =
            decode_compact(last.bits).value.overflowing_mul(U256::from(actual as u64));
        let mut new_target = scaled / U256::from(timespan as u64);
        if new_target > *pow_limit {
            new_target = *pow_limit;
        }

        debug!(
            height = last.height,
            actual_timespan = actual,
            nbits = format!("{:#010x}", encode_compact(&new_target)),
            "interval retarget"
        );

        encode_compact(&new_target)
    }

    /// Weighted target exponential moving average.
    ///
    /// First-order filter whose interval matches the center of mass of a
    /// simple moving average over `timespan / spacing` blocks. PoW and PoS
    /// difficulties move independently; a negative solve time is allowed
    /// and pulls the target down.
    pub fn weighted_target_ema(
        &self,
        chain: &ChainIndex,
        tip: Option<BlockId>,
        header: &CandidateHeader,
    ) -> u32 {
        let algo = header.algo_type();
        let want_pos = header.is_proof_of_stake();
        let pow_limit = *self.limit_for_header(algo, want_pos);
        let pow_limit_compact = encode_compact(&pow_limit);

        let Some(tip) = tip else {
            return pow_limit_compact; // genesis block
        };
        let Some(prev_id) = last_block_filtered(chain, Some(tip), algo, want_pos) else {
            return pow_limit_compact;
        };
        let prev = chain.block(prev_id);
        let Some(prev_parent) = prev.prev else {
            return pow_limit_compact; // first block
        };
        let Some(prev_prev_id) = last_block_filtered(chain, Some(prev_parent), algo, want_pos)
        else {
            return pow_limit_compact;
        };
        let prev_prev = chain.block(prev_prev_id);
        if prev_prev.prev.is_none() {
            return pow_limit_compact; // second block
        }

        let actual_spacing = prev.time - prev_prev.time;

        let target_spacing = self.effective_spacing(want_pos);
        let interval = self.params.pow_target_timespan / (target_spacing * 2);

        let numerator = ((interval - 1) * target_spacing + actual_spacing).max(1) as u64;
        let denominator = (interval * target_spacing) as u64;

        // next = prev * (N - 1 + solvetime/spacing) / N, multiplied out in
        // 512 bits so the product cannot truncate before the division.
        let prev_target = decode_compact(prev.bits).value;
        let wide = U512::from(prev_target) * U512::from(numerator) / U512::from(denominator);
        let new_target = wide.trim256();

        if wide > U512::from(pow_limit) || new_target.is_zero() {
            return pow_limit_compact;
        }

        let rounded = encode_compact_rounded(&new_target);
        // Rounding can carry a value just under the limit past it.
        if decode_compact(rounded).value > pow_limit {
            return pow_limit_compact;
        }

        debug!(
            algo = ?algo,
            actual_spacing,
            numerator,
            denominator,
            nbits = format!("{:#010x}", rounded),
            "wtema retarget"
        );

        rounded
    }

    /// ASERT retarget against the algorithm's anchored reference block.
    ///
    /// The ideal schedule is `next = ref * 2^((observed - scheduled) /
    /// half_life)`. The integer part of the exponent becomes a shift; the
    /// fractional part goes through a cubic rational approximation of
    /// `2^x` that is exact at both ends of the unit interval. Once the
    /// chain carries a full averaging window, the reference target is the
    /// window average rather than the anchor's own bits.
    #[allow(unused_comparisons, clippy::absurd_extreme_comparisons)]
    pub fn average_target_asert(
        &self,
        chain: &ChainIndex,
        tip: Option<BlockId>,
        header: &CandidateHeader,
    ) -> u32 {
        let algo = header.algo_type();
        let want_pos = header.is_proof_of_stake();
        let pow_limit = *self.limit_for_header(algo, want_pos);
        let pow_limit_compact = encode_compact(&pow_limit);
        let target_spacing = self.effective_spacing(want_pos);

        let Some(tip) = tip else {
            return pow_limit_compact; // genesis block
        };
        let Some(prev_id) = last_block_filtered(chain, Some(tip), algo, want_pos) else {
            return pow_limit_compact;
        };
        let prev = chain.block(prev_id);
        let Some(prev_parent) = prev.prev else {
            return pow_limit_compact; // first block
        };
        let Some(prev_prev_id) = last_block_filtered(chain, Some(prev_parent), algo, want_pos)
        else {
            return pow_limit_compact;
        };
        if chain.block(prev_prev_id).prev.is_none() {
            return pow_limit_compact; // second block
        }

        // Four timespans' worth of block targets at the effective spacing.
        let asert_window = (4 * self.params.pow_target_timespan / target_spacing) as u32;

        let tip_block = chain.block(tip);
        let next_height = tip_block.height + 1;
        if next_height < ASERT_START_HEIGHT {
            return self.weighted_target_ema(chain, Some(tip), header);
        }

        // Same-class blocks since the reference block, inclusive.
        let blocks_passed = if want_pos {
            tip_block.height_pos
        } else {
            tip_block.height_pow
        } + 1;

        // The reference is re-resolved on every call; a reorganization can
        // move it, and a latched anchor would serve stale schedules.
        let limit_algo = algo.unwrap_or(if want_pos {
            AlgoType::Pos
        } else {
            AlgoType::PowSha256
        });
        let Some(ref_id) = asert_reference(chain, Some(prev_id), ASERT_START_HEIGHT, limit_algo)
        else {
            return pow_limit_compact;
        };
        let ref_block = chain.block(ref_id);
        let ref_prev_id = last_block_filtered(chain, ref_block.prev, algo, want_pos);

        // Use the reference parent's timestamp unless the reference is the
        // genesis; scheduling from the reference's own timestamp would run
        // permanently one block behind.
        let mut ref_timestamp = match ref_prev_id {
            Some(id) => chain.block(id).time,
            None => ref_block.time - target_spacing,
        };
        // Stake emission only lands on mask-aligned timestamps, so the
        // schedule origin must be aligned too.
        if want_pos {
            while ref_timestamp & self.params.stake_timestamp_mask != 0 {
                ref_timestamp += 1;
            }
        }

        let time_diff = prev.time - ref_timestamp;
        let height_diff = blocks_passed;

        let ref_target = self.windowed_reference_target(
            chain,
            prev_id,
            ref_id,
            algo,
            want_pos,
            next_height,
            height_diff,
            asert_window,
            pow_limit_compact,
        );

        let dividend = time_diff - target_spacing * i64::from(height_diff);
        let positive = dividend >= 0;
        let divisor = self.params.pow_target_timespan; // must be positive
        // Truncating division rounds toward zero either way; the dropped
        // fractional part is handled by the approximation below.
        let exponent = dividend / divisor;
        let remainder = (if positive { dividend } else { -dividend } % divisor) as u64;

        let mut numerator = U512::one();
        let mut denominator = U512::one();
        if positive {
            if exponent > 0 {
                // Left-shifting the numerator multiplies it by a power of 2.
                numerator = numerator << (exponent as usize);
            }
            if remainder != 0 {
                let (poly, scale) = unit_exponential(remainder, divisor as u64);
                let (n, _) = numerator.overflowing_mul(poly);
                numerator = n;
                denominator = denominator * scale;
            }
        } else {
            if exponent < 0 {
                denominator = denominator << ((-exponent) as usize);
            }
            if remainder != 0 {
                let (poly, scale) = unit_exponential(remainder, divisor as u64);
                numerator = numerator * scale;
                let (d, _) = denominator.overflowing_mul(poly);
                denominator = d;
            }
        }
        if denominator.is_zero() {
            // The exponent shifted the denominator past 512 bits; the true
            // quotient is beyond any representable target.
            return pow_limit_compact;
        }

        // Multiply strictly before dividing; the product wraps mod 2^512
        // like the fixed-width arithmetic it must stay bit-exact with.
        let (scaled, _) = U512::from(ref_target).overflowing_mul(numerator);
        let wide = scaled / denominator;
        let new_target = wide.trim256();

        if wide > U512::from(pow_limit) || new_target.is_zero() {
            return pow_limit_compact;
        }

        let rounded = encode_compact_rounded(&new_target);
        // Rounding can carry a value just under the limit past it.
        if decode_compact(rounded).value > pow_limit {
            return pow_limit_compact;
        }

        debug!(
            algo = ?limit_algo,
            height = next_height,
            time_diff,
            height_diff,
            exponent,
            nbits = format!("{:#010x}", rounded),
            "asert retarget"
        );

        rounded
    }

    /// Reference target for the ASERT step: the windowed average when the
    /// chain carries a full window, the anchor's own target otherwise.
    ///
    /// The cache mutex is held across the whole lookup-or-recompute block.
    /// Unrecognized-algorithm lookups bypass the cache entirely: their
    /// stake-ness fallback walk can sample a different block sequence.
    #[allow(clippy::too_many_arguments)]
    fn windowed_reference_target(
        &self,
        chain: &ChainIndex,
        prev: BlockId,
        reference: BlockId,
        algo: Option<AlgoType>,
        want_pos: bool,
        next_height: u32,
        height_diff: u32,
        asert_window: u32,
        pow_limit_compact: u32,
    ) -> U256 {
        let mut slot = self.cache.lock();

        // Skip the remainder of a partially filled window so that full
        // windows tile the schedule exactly.
        let blocks_to_skip = height_diff % asert_window;
        let mut cursor = Some(prev);
        for _ in 0..blocks_to_skip {
            cursor = match cursor {
                Some(id) => last_block_filtered(chain, chain.block(id).prev, algo, want_pos),
                None => None,
            };
            if cursor.is_none() {
                break;
            }
        }

        let have_window = asert_window > 0
            && next_height >= ASERT_START_HEIGHT + asert_window
            && height_diff >= asert_window;

        match cursor {
            Some(window_end_id) if have_window => {
                let window_end = chain.block(window_end_id);
                if let Some(algo) = algo {
                    if let Some(target) = slot.as_ref().and_then(|s| {
                        s.window_hit(window_end.height, algo, &window_end.block_hash)
                    }) {
                        return target;
                    }
                }
                let target = self.average_window(
                    chain,
                    window_end_id,
                    algo,
                    want_pos,
                    asert_window,
                    pow_limit_compact,
                );
                if let Some(algo) = algo {
                    *slot = Some(CachedTarget::Window {
                        height: window_end.height,
                        algo,
                        hash: window_end.block_hash,
                        target,
                    });
                }
                target
            }
            _ => {
                let ref_block = chain.block(reference);
                match algo {
                    Some(algo) => {
                        if let Some(target) = slot
                            .as_ref()
                            .and_then(|s| s.anchor_hit(algo, &ref_block.block_hash))
                        {
                            return target;
                        }
                        let target = decode_compact(ref_block.bits).value;
                        *slot = Some(CachedTarget::Anchor {
                            algo,
                            hash: ref_block.block_hash,
                            target,
                        });
                        target
                    }
                    None => decode_compact(ref_block.bits).value,
                }
            }
        }
    }

    /// Average `asert_window` same-class targets ending at `window_end`.
    ///
    /// Min-difficulty markers are skipped without consuming a window slot.
    /// Running out of chain leaves the remaining slots at zero, which only
    /// lowers the average target and so raises difficulty.
    fn average_window(
        &self,
        chain: &ChainIndex,
        window_end: BlockId,
        algo: Option<AlgoType>,
        want_pos: bool,
        asert_window: u32,
        pow_limit_compact: u32,
    ) -> U256 {
        let window = U256::from(asert_window);
        let mut sum = U256::zero();
        let mut sampled: u32 = 0;
        let mut cursor = window_end;
        while sampled < asert_window {
            let block = chain.block(cursor);
            if block.bits != pow_limit_compact - 1 || !self.params.pow_allow_min_difficulty_blocks
            {
                sum += decode_compact(block.bits).value / window;
                sampled += 1;
            }
            match last_block_filtered(chain, block.prev, algo, want_pos) {
                Some(next) => cursor = next,
                None => break,
            }
        }
        sum
    }

    /// Per-algorithm limit, with the stake-ness fallback for unrecognized
    /// tags.
    fn limit_for_header(&self, algo: Option<AlgoType>, want_pos: bool) -> &U256 {
        match algo {
            Some(algo) => &self.params.pow_limit[algo.index()],
            None => {
                let fallback = if want_pos {
                    AlgoType::Pos
                } else {
                    AlgoType::PowSha256
                };
                &self.params.pow_limit[fallback.index()]
            }
        }
    }

    /// Effective spacing: stake blocks follow the configured spacing, work
    /// blocks are pinned to [`POW_BLOCK_SPACING`].
    #[inline]
    fn effective_spacing(&self, want_pos: bool) -> i64 {
        if want_pos {
            self.params.pow_target_spacing
        } else {
            POW_BLOCK_SPACING
        }
    }
}

/// Cubic rational approximation of `2^x` on the unit interval:
/// `(4r³ + 11r²d + 35rd² + 50d³) / (50d³)` for `x = r/d`, `0 < x < 1`.
/// Equal to 1 at `x = 0` and 2 at `x = 1`, so the result is continuous
/// across integer exponent boundaries.
fn unit_exponential(remainder: u64, divisor: u64) -> (U512, U512) {
    let r = U512::from(remainder);
    let d = U512::from(divisor);
    let poly = U512::from(4u64) * r * r * r
        + U512::from(11u64) * r * r * d
        + U512::from(35u64) * r * d * d
        + U512::from(50u64) * d * d * d;
    let scale = U512::from(50u64) * d * d * d;
    (poly, scale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain_params::version_for_algo;

    fn header(algo: AlgoType, time: i64) -> CandidateHeader {
        CandidateHeader {
            version: version_for_algo(algo),
            time,
        }
    }

    #[test]
    fn genesis_returns_limit() {
        let engine = RetargetEngine::new(ChainParams::mainnet());
        let chain = ChainIndex::new();
        assert_eq!(
            engine.next_work_required(&chain, None, &header(AlgoType::PowSha256, 0)),
            0x1e00ffff
        );
        assert_eq!(
            engine.next_work_required(&chain, None, &header(AlgoType::Pos, 0)),
            0x1e0fffff
        );
    }

    #[test]
    fn unrecognized_algo_uses_sha256_limit() {
        let engine = RetargetEngine::new(ChainParams::mainnet());
        let chain = ChainIndex::new();
        let candidate = CandidateHeader {
            version: 0,
            time: 0,
        };
        assert_eq!(engine.next_work_required(&chain, None, &candidate), 0x1e00ffff);
    }

    #[test]
    fn no_retargeting_freezes_at_limit() {
        let engine = RetargetEngine::new(ChainParams::regtest());
        let mut chain = ChainIndex::new();
        let version = version_for_algo(AlgoType::PowSha256);
        let mut tip = chain.push(None, 0, 0x207fffff, version, [0u8; 32]).unwrap();
        for i in 1..5u8 {
            tip = chain
                .push(Some(tip), i64::from(i) * 600, 0x207fffff, version, [i; 32])
                .unwrap();
        }
        assert_eq!(
            engine.next_work_required(&chain, Some(tip), &header(AlgoType::PowSha256, 3000)),
            0x207fffff
        );
    }

    #[test]
    fn unit_exponential_endpoints() {
        // x -> 1: poly/scale -> 2 exactly at r = d.
        let (poly, scale) = unit_exponential(100, 100);
        assert_eq!(poly, scale * U512::from(2u64));
        // Small x stays close to 1 and strictly above it.
        let (poly, scale) = unit_exponential(1, 1_000_000);
        assert!(poly > scale);
        assert!(poly < scale * U512::from(2u64));
    }

    #[test]
    fn unit_exponential_monotone_on_unit_interval() {
        let divisor = 43_200u64;
        let mut last = U512::zero();
        for remainder in (1..divisor).step_by(4_320) {
            let (poly, scale) = unit_exponential(remainder, divisor);
            // Compare poly/scale fractions via cross-multiplication with a
            // fixed scale: scale is constant for a fixed divisor.
            assert!(poly > last);
            last = poly;
            assert!(poly <= scale * U512::from(2u64));
        }
    }
}
