//! Chain-related types shared by the chain reader and the confirmation engine.

use alloy::primitives::{Address, Bytes, B256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Chain identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainId(pub u64);

impl ChainId {
	pub const ETHEREUM: Self = Self(1);
	pub const ARBITRUM: Self = Self(42161);
	pub const OPTIMISM: Self = Self(10);
	pub const POLYGON: Self = Self(137);
	pub const BASE: Self = Self(8453);
}

impl fmt::Display for ChainId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for ChainId {
	type Err = std::num::ParseIntError;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		Ok(ChainId(s.parse()?))
	}
}

/// Block number
pub type BlockNumber = u64;

/// Transaction hash
pub type TxHash = B256;

/// Event log as returned by the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
	pub address: Address,
	pub topics: Vec<B256>,
	pub data: Bytes,
	pub block_number: BlockNumber,
	pub transaction_hash: TxHash,
	pub log_index: u64,
}

/// Receipt of a mined native transaction, including its logs in emission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
	pub transaction_hash: TxHash,
	pub block_number: BlockNumber,
	pub success: bool,
	pub gas_used: u64,
	pub logs: Vec<Log>,
}

/// Log query over an inclusive block range, filtered on the first topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
	pub from_block: BlockNumber,
	pub to_block: BlockNumber,
	/// Restrict to logs emitted by this contract.
	pub address: Option<Address>,
	pub topic0: B256,
}
