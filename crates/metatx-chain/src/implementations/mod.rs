//! Chain reader implementations.
//!
//! Available implementations:
//! - `evm::alloy`: JSON-RPC access to EVM chains through an Alloy provider

pub mod evm;
