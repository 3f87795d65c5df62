//! # helix-consensus
//!
//! Difficulty retargeting and proof-of-work verification for the Helix
//! hybrid chain.
//!
//! This crate provides:
//! - The retarget engine: given the chain tip and a candidate header,
//!   the required compact target the candidate's hash must not exceed
//!   ([`RetargetEngine`]).
//! - Proof-of-work verification against a compact target
//!   ([`check_proof_of_work`]) and per-block expected work
//!   ([`block_proof`]).
//! - The chain-index arena the engine walks ([`ChainIndex`]) and the
//!   network parameter sets ([`ChainParams`]).
//!
//! ## Retargeting
//!
//! Helix interleaves proof-of-stake blocks with SHA-256 proof-of-work
//! blocks and retargets each class independently. The main path is an
//! ASERT schedule anchored at each algorithm's earliest block, averaging
//! the last four timespans' worth of same-class targets; a weighted target
//! EMA covers algorithm bootstrap, and the classic fixed-interval
//! retarget covers the single-algorithm era. All results are clamped to
//! per-algorithm minimum-difficulty limits and encoded as 32-bit compact
//! base-256 words.
//!
//! Determinism is absolute: identical `(tip, header, params)` inputs yield
//! byte-identical targets on every platform, regardless of cache state.

mod block_index;
mod chain_params;
mod chain_view;
mod error;
mod pow;
mod retarget;
mod target_cache;

pub use block_index::{BlockHash, BlockId, BlockIndex, ChainIndex};
pub use chain_params::{
    algo_type, is_proof_of_stake_version, version_for_algo, AlgoType, ChainParams,
    ChainParamsConfig, ChainParamsError, ALGO_COUNT, POW_BLOCK_SPACING, VERSION_ALGO_MASK,
    VERSION_ALGO_SHIFT, VERSION_STAKE_FLAG,
};
pub use chain_view::{asert_reference, last_block, last_block_for_algo};
pub use error::{ConsensusError, ConsensusResult};
pub use pow::{block_proof, check_proof_of_work};
pub use retarget::{CandidateHeader, RetargetEngine};
