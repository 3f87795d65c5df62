//! # helix-arith
//!
//! Fixed-width unsigned integer arithmetic for Helix consensus code.
//!
//! Retargeting multiplies a 256-bit target by rational factors before
//! dividing, and the multiplication must happen first, so intermediates need
//! up to 512 bits. [`U256`] holds targets and hashes, [`U512`] holds the
//! intermediates, and [`U512::trim256`] narrows a quotient back down once
//! the division is done.
//!
//! The compact base-256 target encoding (`nBits`) lives in [`compact`]; its
//! bit layout is part of the consensus wire protocol.

// Allow clippy warnings from the uint crate's construct_uint macro
#![allow(clippy::assign_op_pattern)]
#![allow(clippy::manual_div_ceil)]

mod compact;

pub use compact::{decode_compact, encode_compact, encode_compact_rounded, CompactDecoded};

use uint::construct_uint;

construct_uint! {
    /// 256-bit unsigned integer.
    ///
    /// Used for difficulty targets, block hashes treated as integers, and
    /// per-block work.
    pub struct U256(4);
}

construct_uint! {
    /// 512-bit unsigned integer for multiply-then-divide sequences that
    /// would overflow 256 bits.
    pub struct U512(8);
}

impl From<U256> for U512 {
    fn from(value: U256) -> Self {
        let U256(words) = value;
        U512([words[0], words[1], words[2], words[3], 0, 0, 0, 0])
    }
}

impl U512 {
    /// Truncate to the low 256 bits.
    pub fn trim256(&self) -> U256 {
        let U512(words) = self;
        U256([words[0], words[1], words[2], words[3]])
    }
}
