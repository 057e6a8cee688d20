//! Shared types for the meta-transaction relay system.
//!
//! This crate holds the bundle model, the nonce encoding used by the wallet
//! contract, meta-transaction identifier derivation and the chain data types
//! exchanged between the chain, confirmation and delivery crates.

pub mod abi;
pub mod bundle;
pub mod chain;
pub mod errors;
pub mod meta_txn;

pub use bundle::*;
pub use chain::*;
pub use errors::*;
pub use meta_txn::*;

/// Re-export of the primitive types used across the workspace.
pub use alloy::primitives::{Address, Bytes, B256, U160, U256};
