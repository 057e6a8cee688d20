//! Alloy-based chain reader for EVM chains.

use crate::{ChainError, ChainReader};
use alloy::network::ReceiptResponse as _;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log as RpcLog, TransactionReceipt as RpcReceipt};
use async_trait::async_trait;
use metatx_types::{BlockNumber, Log, LogFilter, TransactionReceipt, TxHash};
use std::sync::Arc;

/// Chain reader backed by an Alloy provider.
#[derive(Clone)]
pub struct AlloyChainReader {
	provider: DynProvider,
}

impl AlloyChainReader {
	/// Connects to the node at the http(s) endpoint `rpc_url`.
	pub async fn new(rpc_url: &str) -> Result<Self, ChainError> {
		let provider = ProviderBuilder::new()
			.connect(rpc_url)
			.await
			.map_err(|e| ChainError::Network(format!("Failed to connect to {}: {}", rpc_url, e)))?;

		Ok(Self {
			provider: provider.erased(),
		})
	}

	/// Wraps an already configured provider.
	pub fn from_provider(provider: DynProvider) -> Self {
		Self { provider }
	}
}

/// Converts an RPC log, skipping logs that are not mined yet.
fn convert_log(log: &RpcLog) -> Option<Log> {
	Some(Log {
		address: log.address(),
		topics: log.topics().to_vec(),
		data: log.data().data.clone(),
		block_number: log.block_number?,
		transaction_hash: log.transaction_hash?,
		log_index: log.log_index.unwrap_or_default(),
	})
}

fn convert_receipt(receipt: &RpcReceipt) -> Result<TransactionReceipt, ChainError> {
	let block_number = receipt.block_number.ok_or_else(|| {
		ChainError::InvalidResponse(format!(
			"receipt for {} has no block number",
			receipt.transaction_hash
		))
	})?;

	Ok(TransactionReceipt {
		transaction_hash: receipt.transaction_hash,
		block_number,
		success: receipt.status(),
		gas_used: receipt.gas_used,
		logs: receipt.inner.logs().iter().filter_map(convert_log).collect(),
	})
}

#[async_trait]
impl ChainReader for AlloyChainReader {
	async fn block_number(&self) -> Result<BlockNumber, ChainError> {
		self.provider
			.get_block_number()
			.await
			.map_err(|e| ChainError::Network(format!("Failed to get block number: {}", e)))
	}

	async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<Log>, ChainError> {
		let mut query = Filter::new()
			.from_block(filter.from_block)
			.to_block(filter.to_block)
			.event_signature(filter.topic0);
		if let Some(address) = filter.address {
			query = query.address(address);
		}

		let logs = self
			.provider
			.get_logs(&query)
			.await
			.map_err(|e| ChainError::Network(format!("Failed to get logs: {}", e)))?;

		tracing::trace!(
			from_block = filter.from_block,
			to_block = filter.to_block,
			count = logs.len(),
			"Fetched logs"
		);

		Ok(logs.iter().filter_map(convert_log).collect())
	}

	async fn transaction_receipt(
		&self,
		tx_hash: TxHash,
	) -> Result<Option<TransactionReceipt>, ChainError> {
		let receipt = self
			.provider
			.get_transaction_receipt(tx_hash)
			.await
			.map_err(|e| ChainError::Network(format!("Failed to get receipt: {}", e)))?;

		receipt.as_ref().map(convert_receipt).transpose()
	}
}

/// Factory function to create a chain reader for an RPC endpoint.
pub async fn create_chain_reader(rpc_url: &str) -> Result<Arc<dyn ChainReader>, ChainError> {
	Ok(Arc::new(AlloyChainReader::new(rpc_url).await?))
}
