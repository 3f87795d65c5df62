//! Network consensus parameters for the Helix hybrid chain.
//!
//! Helix interleaves proof-of-stake blocks with proof-of-work blocks mined
//! under one of a small closed set of algorithms. Each algorithm carries its
//! own minimum-difficulty target; stake and work difficulties retarget
//! independently.
//!
//! Use [`ChainParams::mainnet`] (or `testnet`/`regtest`) for the shipped
//! networks and [`ChainParams::from_config`] for private networks; the
//! config path validates every field and names the offender on error.

use helix_arith::{encode_compact, U256};
use serde::Deserialize;
use thiserror::Error;

/// Mining algorithm tag carried in the header version bits.
///
/// The stake tag is a pseudo-algorithm: stake blocks are not proof-of-work,
/// but they occupy a slot in the per-algorithm tables so stake difficulty
/// retargets through the same machinery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlgoType {
    /// Proof-of-stake pseudo-algorithm.
    Pos = 0,
    /// SHA-256d proof-of-work.
    PowSha256 = 1,
}

/// Number of recognized algorithm tags, the stake pseudo-algorithm included.
pub const ALGO_COUNT: usize = 2;

impl AlgoType {
    /// Position in per-algorithm tables such as [`ChainParams::pow_limit`].
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Whether this tag is the stake pseudo-algorithm.
    #[inline]
    pub fn is_proof_of_stake(self) -> bool {
        matches!(self, AlgoType::Pos)
    }
}

/// Algorithm tag code field: `(version >> 16) & 0xf`.
pub const VERSION_ALGO_SHIFT: i32 = 16;
/// Mask for the tag code field after shifting.
pub const VERSION_ALGO_MASK: i32 = 0xf;
/// Stake marker bit, independent of the tag code.
pub const VERSION_STAKE_FLAG: i32 = 1 << 28;

/// Extract the algorithm tag from a header version.
///
/// Returns `None` when the version carries no recognized tag; such headers
/// are served through the stake-ness fallback walks.
pub fn algo_type(version: i32) -> Option<AlgoType> {
    match (version >> VERSION_ALGO_SHIFT) & VERSION_ALGO_MASK {
        1 => Some(AlgoType::Pos),
        2 => Some(AlgoType::PowSha256),
        _ => None,
    }
}

/// Whether a header version marks a proof-of-stake block.
///
/// The stake marker is a dedicated bit so that a header with an
/// unrecognized tag still reports its stake-ness.
#[inline]
pub fn is_proof_of_stake_version(version: i32) -> bool {
    version & VERSION_STAKE_FLAG != 0
}

/// Build a well-formed header version for an algorithm tag.
pub fn version_for_algo(algo: AlgoType) -> i32 {
    let code = match algo {
        AlgoType::Pos => 1,
        AlgoType::PowSha256 => 2,
    };
    let mut version = code << VERSION_ALGO_SHIFT;
    if algo.is_proof_of_stake() {
        version |= VERSION_STAKE_FLAG;
    }
    version
}

/// Proof-of-work block spacing in seconds.
///
/// Pinned to ten minutes no matter what [`ChainParams::pow_target_spacing`]
/// says; the deployed network's difficulty schedule depends on it.
pub const POW_BLOCK_SPACING: i64 = 600;

/// Error constructing [`ChainParams`] from configuration.
#[derive(Error, Debug, Clone)]
#[error("chain params field '{field}': {message}")]
pub struct ChainParamsError {
    /// The field that is missing or invalid.
    pub field: &'static str,
    /// Description of the problem.
    pub message: String,
}

impl ChainParamsError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Configuration for loading [`ChainParams`] from TOML/JSON.
///
/// All fields are optional so partial configs validate with clear errors.
/// Targets are hex strings with an optional `0x` prefix.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChainParamsConfig {
    /// Minimum-difficulty target for stake blocks, big-endian hex.
    pub pow_limit_pos_hex: Option<String>,
    /// Minimum-difficulty target for SHA-256 blocks, big-endian hex.
    pub pow_limit_sha256_hex: Option<String>,
    /// Nominal spacing between stake blocks, seconds.
    pub pow_target_spacing: Option<i64>,
    /// Retarget window in seconds, also the ASERT half-life.
    pub pow_target_timespan: Option<i64>,
    /// Freeze difficulty at the limit (regression networks).
    pub pow_no_retargeting: Option<bool>,
    /// Allow min-difficulty blocks after a long gap (test networks).
    pub pow_allow_min_difficulty_blocks: Option<bool>,
    /// Stake timestamps must be zero modulo `mask + 1`.
    pub stake_timestamp_mask: Option<i64>,
}

/// Immutable network consensus parameters.
///
/// Injected into the retarget engine and the proof-of-work verifier;
/// nothing here changes at runtime.
#[derive(Debug, Clone)]
pub struct ChainParams {
    /// Per-algorithm minimum-difficulty targets, indexed by [`AlgoType`].
    pub pow_limit: [U256; ALGO_COUNT],
    /// Nominal spacing between stake blocks, in seconds. Proof-of-work
    /// spacing is [`POW_BLOCK_SPACING`] regardless of this value.
    pub pow_target_spacing: i64,
    /// Retarget window in seconds, also the ASERT half-life denominator.
    pub pow_target_timespan: i64,
    /// Freeze difficulty at the limit (regression networks).
    pub pow_no_retargeting: bool,
    /// Allow min-difficulty blocks after a long gap (test networks).
    pub pow_allow_min_difficulty_blocks: bool,
    /// Stake timestamps must be zero modulo `mask + 1`.
    pub stake_timestamp_mask: i64,
}

impl ChainParams {
    /// Mainnet parameters.
    pub fn mainnet() -> Self {
        Self {
            pow_limit: [
                // 20 leading zero bits, compact 0x1e0fffff
                (U256::one() << 236) - U256::one(),
                // 24 leading zero bits, compact 0x1e00ffff
                (U256::one() << 232) - U256::one(),
            ],
            pow_target_spacing: 80,
            pow_target_timespan: 12 * 60 * 60,
            pow_no_retargeting: false,
            pow_allow_min_difficulty_blocks: false,
            stake_timestamp_mask: 0xf,
        }
    }

    /// Testnet parameters: easier limits, min-difficulty rule enabled.
    pub fn testnet() -> Self {
        let limit = (U256::one() << 240) - U256::one(); // compact 0x1f00ffff
        Self {
            pow_limit: [limit, limit],
            pow_target_spacing: 80,
            pow_target_timespan: 12 * 60 * 60,
            pow_no_retargeting: false,
            pow_allow_min_difficulty_blocks: true,
            stake_timestamp_mask: 0xf,
        }
    }

    /// Regression-test parameters: trivial limits, difficulty frozen.
    pub fn regtest() -> Self {
        let limit = (U256::one() << 255) - U256::one(); // compact 0x207fffff
        Self {
            pow_limit: [limit, limit],
            pow_target_spacing: 80,
            pow_target_timespan: 12 * 60 * 60,
            pow_no_retargeting: true,
            pow_allow_min_difficulty_blocks: true,
            stake_timestamp_mask: 0xf,
        }
    }

    /// Build parameters from configuration, naming the field on error.
    pub fn from_config(config: &ChainParamsConfig) -> Result<Self, ChainParamsError> {
        let pow_limit_pos = parse_target(
            "pow_limit_pos_hex",
            config.pow_limit_pos_hex.as_deref(),
        )?;
        let pow_limit_sha256 = parse_target(
            "pow_limit_sha256_hex",
            config.pow_limit_sha256_hex.as_deref(),
        )?;

        let pow_target_spacing = config
            .pow_target_spacing
            .ok_or_else(|| ChainParamsError::new("pow_target_spacing", "required field missing"))?;
        if pow_target_spacing <= 0 {
            return Err(ChainParamsError::new(
                "pow_target_spacing",
                "must be positive",
            ));
        }

        let pow_target_timespan = config
            .pow_target_timespan
            .ok_or_else(|| ChainParamsError::new("pow_target_timespan", "required field missing"))?;
        // Every derived divisor (adjustment interval, WTEMA interval for
        // both effective spacings) must stay nonzero.
        if pow_target_timespan < 2 * pow_target_spacing
            || pow_target_timespan < 2 * POW_BLOCK_SPACING
        {
            return Err(ChainParamsError::new(
                "pow_target_timespan",
                "must be at least twice the block spacing",
            ));
        }

        let stake_timestamp_mask = config
            .stake_timestamp_mask
            .ok_or_else(|| ChainParamsError::new("stake_timestamp_mask", "required field missing"))?;
        if stake_timestamp_mask < 0 {
            return Err(ChainParamsError::new(
                "stake_timestamp_mask",
                "must be non-negative",
            ));
        }

        Ok(Self {
            pow_limit: [pow_limit_pos, pow_limit_sha256],
            pow_target_spacing,
            pow_target_timespan,
            pow_no_retargeting: config.pow_no_retargeting.unwrap_or(false),
            pow_allow_min_difficulty_blocks: config
                .pow_allow_min_difficulty_blocks
                .unwrap_or(false),
            stake_timestamp_mask,
        })
    }

    /// Blocks between legacy interval retargets.
    #[inline]
    pub fn difficulty_adjustment_interval(&self) -> i64 {
        self.pow_target_timespan / self.pow_target_spacing
    }

    /// Minimum-difficulty target for an algorithm tag; a missing tag maps
    /// to the SHA-256 limit.
    #[inline]
    pub fn limit_for(&self, algo: Option<AlgoType>) -> &U256 {
        &self.pow_limit[algo.unwrap_or(AlgoType::PowSha256).index()]
    }

    /// Compact encoding of [`Self::limit_for`].
    #[inline]
    pub fn limit_compact_for(&self, algo: Option<AlgoType>) -> u32 {
        encode_compact(self.limit_for(algo))
    }
}

/// Parse a big-endian hex target, with hex hygiene (trim, optional 0x).
fn parse_target(field: &'static str, hex_str: Option<&str>) -> Result<U256, ChainParamsError> {
    let hex_str =
        hex_str.ok_or_else(|| ChainParamsError::new(field, "required field missing"))?;
    let cleaned = hex_str.trim();
    let cleaned = cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
        .unwrap_or(cleaned);

    if cleaned.is_empty() || cleaned.len() > 64 || cleaned.len() % 2 != 0 {
        return Err(ChainParamsError::new(
            field,
            format!("invalid hex target: '{hex_str}'"),
        ));
    }
    let bytes = hex::decode(cleaned)
        .map_err(|_| ChainParamsError::new(field, format!("invalid hex target: '{hex_str}'")))?;

    let target = U256::from_big_endian(&bytes);
    if target.is_zero() {
        return Err(ChainParamsError::new(field, "target cannot be zero"));
    }
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use helix_arith::decode_compact;

    fn full_config() -> ChainParamsConfig {
        ChainParamsConfig {
            pow_limit_pos_hex: Some(
                "00000fffffffffffffffffffffffffffffffffffffffffffffffffffffffffff".into(),
            ),
            pow_limit_sha256_hex: Some(
                "000000ffffffffffffffffffffffffffffffffffffffffffffffffffffffffff".into(),
            ),
            pow_target_spacing: Some(80),
            pow_target_timespan: Some(43_200),
            pow_no_retargeting: Some(false),
            pow_allow_min_difficulty_blocks: Some(false),
            stake_timestamp_mask: Some(0xf),
        }
    }

    #[test]
    fn version_roundtrip() {
        for algo in [AlgoType::Pos, AlgoType::PowSha256] {
            let version = version_for_algo(algo);
            assert_eq!(algo_type(version), Some(algo));
            assert_eq!(is_proof_of_stake_version(version), algo.is_proof_of_stake());
        }
        // Unrecognized tag codes map to None.
        assert_eq!(algo_type(0), None);
        assert_eq!(algo_type(0x7 << VERSION_ALGO_SHIFT), None);
        // Stake marker without a recognized tag.
        assert!(is_proof_of_stake_version(VERSION_STAKE_FLAG));
        assert_eq!(algo_type(VERSION_STAKE_FLAG), None);
    }

    #[test]
    fn mainnet_limit_encodings() {
        let params = ChainParams::mainnet();
        assert_eq!(params.limit_compact_for(Some(AlgoType::Pos)), 0x1e0fffff);
        assert_eq!(
            params.limit_compact_for(Some(AlgoType::PowSha256)),
            0x1e00ffff
        );
        // Missing tag falls back to the SHA-256 limit.
        assert_eq!(params.limit_compact_for(None), 0x1e00ffff);
        // Compact forms decode back to the exact limits.
        for algo in [AlgoType::Pos, AlgoType::PowSha256] {
            let compact = params.limit_compact_for(Some(algo));
            assert_eq!(decode_compact(compact).value, params.pow_limit[algo.index()]);
        }
    }

    #[test]
    fn testnet_and_regtest_limit_encodings() {
        assert_eq!(
            ChainParams::testnet().limit_compact_for(Some(AlgoType::PowSha256)),
            0x1f00ffff
        );
        assert_eq!(
            ChainParams::regtest().limit_compact_for(Some(AlgoType::Pos)),
            0x207fffff
        );
    }

    #[test]
    fn adjustment_interval_derivation() {
        let params = ChainParams::mainnet();
        assert_eq!(params.difficulty_adjustment_interval(), 540);
    }

    #[test]
    fn from_config_matches_mainnet() {
        let params = ChainParams::from_config(&full_config()).expect("valid config");
        let mainnet = ChainParams::mainnet();
        assert_eq!(params.pow_limit, mainnet.pow_limit);
        assert_eq!(params.pow_target_spacing, mainnet.pow_target_spacing);
        assert_eq!(params.pow_target_timespan, mainnet.pow_target_timespan);
    }

    #[test]
    fn from_config_hex_hygiene() {
        let mut config = full_config();
        config.pow_limit_pos_hex = Some(
            " 0x00000fffffffffffffffffffffffffffffffffffffffffffffffffffffffffff ".into(),
        );
        let params = ChainParams::from_config(&config).expect("hex hygiene");
        assert_eq!(params.pow_limit[0], ChainParams::mainnet().pow_limit[0]);
    }

    #[test]
    fn from_config_errors_name_fields() {
        let mut config = full_config();
        config.pow_limit_sha256_hex = None;
        let err = ChainParams::from_config(&config).unwrap_err();
        assert_eq!(err.field, "pow_limit_sha256_hex");

        let mut config = full_config();
        config.pow_limit_pos_hex = Some("not hex".into());
        let err = ChainParams::from_config(&config).unwrap_err();
        assert_eq!(err.field, "pow_limit_pos_hex");

        let mut config = full_config();
        config.pow_limit_pos_hex = Some("00".into());
        let err = ChainParams::from_config(&config).unwrap_err();
        assert!(err.message.contains("zero"));

        let mut config = full_config();
        config.pow_target_spacing = Some(0);
        let err = ChainParams::from_config(&config).unwrap_err();
        assert_eq!(err.field, "pow_target_spacing");

        let mut config = full_config();
        config.pow_target_timespan = Some(600);
        let err = ChainParams::from_config(&config).unwrap_err();
        assert_eq!(err.field, "pow_target_timespan");
    }
}
