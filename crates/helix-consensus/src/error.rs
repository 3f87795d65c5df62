//! Error types for consensus code.

use crate::chain_params::ChainParamsError;
use thiserror::Error;

/// Consensus-layer errors.
///
/// Retargeting itself never produces these: its entry points recover
/// locally by returning the proof-of-work limit. Errors surface where the
/// environment hands us data, at chain-index insertion and parameter
/// construction.
#[derive(Error, Debug)]
pub enum ConsensusError {
    /// A block was appended under a parent the index does not contain.
    #[error("unknown parent block id {0}")]
    UnknownParent(u32),

    /// Invalid network parameters.
    #[error(transparent)]
    Params(#[from] ChainParamsError),
}

/// Result type for consensus operations.
pub type ConsensusResult<T> = Result<T, ConsensusError>;
