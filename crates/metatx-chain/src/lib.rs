//! Read-only chain access for the meta-transaction relay system.
//!
//! The confirmation engine only needs three queries: the current head, a log
//! filter over a block range, and a receipt lookup. [`ChainReader`] captures
//! exactly that so the engine can run against a JSON-RPC node or a fake.

use async_trait::async_trait;
use metatx_types::{BlockNumber, Log, LogFilter, TransactionReceipt, TxHash};
use thiserror::Error;

pub mod implementations;

pub use implementations::evm::alloy::{create_chain_reader, AlloyChainReader};

/// Errors returned by chain queries.
///
/// All of these may be transient from the caller's point of view; the
/// confirmation engine retries them until its deadline.
#[derive(Debug, Error)]
pub enum ChainError {
	/// Error that occurs talking to the node.
	#[error("Network error: {0}")]
	Network(String),
	/// Error that occurs when the node answer cannot be interpreted.
	#[error("Invalid response: {0}")]
	InvalidResponse(String),
}

/// Read-only view of a chain.
#[async_trait]
pub trait ChainReader: Send + Sync {
	/// Current head block number.
	async fn block_number(&self) -> Result<BlockNumber, ChainError>;

	/// Logs matching the filter, in any order.
	async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<Log>, ChainError>;

	/// Receipt of a mined transaction, `None` when the node does not know it.
	async fn transaction_receipt(
		&self,
		tx_hash: TxHash,
	) -> Result<Option<TransactionReceipt>, ChainError>;
}
