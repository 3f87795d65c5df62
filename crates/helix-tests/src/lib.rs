//! # helix-tests
//!
//! Integration tests for the Helix consensus engine.
//!
//! This crate provides:
//! - Deterministic test-data helpers ([`generators`])
//! - A chain builder over the block-index arena ([`harness`])
//! - Scenario tests for every retarget path
//! - Property-based tests for the consensus invariants

pub mod generators;
pub mod harness;



pub use generators::*;
pub use harness::*;
