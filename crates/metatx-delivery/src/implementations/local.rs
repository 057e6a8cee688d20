//! Local relayer backed by an Alloy provider.
//!
//! The relayer pays for the carrier transaction itself: it calls `execute` on
//! the wallet from a locally held key. Useful for development chains and for
//! wallets whose owner wants to self-relay.

use crate::{Relayer, RelayerError, RelayerSubmission, SignedBundle};
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::U256;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{BlockId, TransactionRequest};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use alloy::sol_types::{SolCall, SolValue};
use async_trait::async_trait;
use metatx_chain::AlloyChainReader;
use metatx_confirm::{ConfirmationConfig, MetaTxnWaiter};
use metatx_types::abi::IMainModule;
use metatx_types::{
	space_to_u256, Address, BlockNumber, Bytes, Call, ChainId, MetaTxnId, MetaTxnReceipt, Nonce,
	U160,
};
use std::sync::Arc;
use std::time::Duration;

/// Utility function to truncate a transaction hash for display.
fn truncate_hash(hash: &[u8]) -> String {
	let hash_str = hex::encode(hash);
	if hash_str.len() <= 8 {
		hash_str
	} else {
		format!("{}..", &hash_str[..8])
	}
}

/// Calldata of the wallet `execute` call for a signed bundle.
pub fn execute_calldata(signed: &SignedBundle) -> Bytes {
	IMainModule::executeCall {
		_txs: signed.bundle.abi_calls(),
		_nonce: signed.bundle.nonce.encode(),
		_signature: signed.signature.clone(),
	}
	.abi_encode()
	.into()
}

/// Relayer that submits bundles from its own account.
pub struct LocalRelayer {
	provider: DynProvider,
	chain_id: ChainId,
	waiter: MetaTxnWaiter,
}

impl LocalRelayer {
	/// Connects to `rpc_url` with `signer` as the paying account.
	pub async fn new(
		rpc_url: &str,
		chain_id: ChainId,
		signer: PrivateKeySigner,
		confirmation: ConfirmationConfig,
	) -> Result<Self, RelayerError> {
		let signer = signer.with_chain_id(Some(chain_id.0));
		let wallet = EthereumWallet::from(signer);

		let provider = ProviderBuilder::new()
			.wallet(wallet)
			.connect(rpc_url)
			.await
			.map_err(|e| RelayerError::Network(format!("Invalid RPC URL {}: {}", rpc_url, e)))?
			.erased();

		let reader = Arc::new(AlloyChainReader::from_provider(provider.clone()));
		let waiter = MetaTxnWaiter::new(reader, confirmation)?;

		Ok(Self {
			provider,
			chain_id,
			waiter,
		})
	}
}

#[async_trait]
impl Relayer for LocalRelayer {
	fn name(&self) -> &str {
		"local"
	}

	fn chain_id(&self) -> ChainId {
		self.chain_id
	}

	async fn get_nonce(
		&self,
		wallet: Address,
		space: U160,
		block: Option<BlockNumber>,
	) -> Result<Nonce, RelayerError> {
		let call = IMainModule::readNonceCall {
			_space: space_to_u256(space),
		};
		let request = TransactionRequest::default()
			.with_to(wallet)
			.with_input(call.abi_encode());

		let mut eth_call = self.provider.call(request);
		if let Some(block) = block {
			eth_call = eth_call.block(BlockId::number(block));
		}

		let output = eth_call
			.await
			.map_err(|e| RelayerError::Network(format!("Failed to read nonce: {}", e)))?;
		let counter = U256::abi_decode(&output).map_err(|e| {
			RelayerError::Network(format!("Failed to decode readNonce output: {}", e))
		})?;

		Ok(Nonce::new(space, counter)?)
	}

	async fn estimate_gas_limits(
		&self,
		wallet: Address,
		calls: Vec<Call>,
	) -> Result<Vec<Call>, RelayerError> {
		let mut estimated = Vec::with_capacity(calls.len());

		for call in calls {
			// Delegate calls run in the wallet's context and cannot be simulated from outside
			if !call.gas_limit.is_zero() || call.delegate_call {
				estimated.push(call);
				continue;
			}

			let request = TransactionRequest::default()
				.with_from(wallet)
				.with_to(call.target)
				.with_value(call.value)
				.with_input(call.data.clone());

			let gas = self.provider.estimate_gas(request).await.map_err(|e| {
				RelayerError::Network(format!("Failed to estimate gas for {}: {}", call.target, e))
			})?;

			estimated.push(call.with_gas_limit(U256::from(gas)));
		}

		Ok(estimated)
	}

	async fn relay(&self, signed: &SignedBundle) -> Result<RelayerSubmission, RelayerError> {
		let meta_txn_id = signed.meta_txn_id()?;

		let request = TransactionRequest::default()
			.with_to(signed.wallet)
			.with_input(execute_calldata(signed));

		let pending = self
			.provider
			.send_transaction(request)
			.await
			.map_err(|e| RelayerError::Network(format!("Failed to send transaction: {}", e)))?;

		let tx_hash = *pending.tx_hash();
		tracing::info!(
			meta_txn_id = %meta_txn_id,
			tx_hash = %truncate_hash(tx_hash.as_slice()),
			"Submitted carrier transaction"
		);

		Ok(RelayerSubmission {
			meta_txn_id,
			tx_hash,
		})
	}

	async fn wait(
		&self,
		id: &MetaTxnId,
		timeout: Option<Duration>,
	) -> Result<MetaTxnReceipt, RelayerError> {
		Ok(self.waiter.wait(id, timeout).await?)
	}
}

/// Factory function to create a local relayer from configuration values.
pub async fn create_local_relayer(
	rpc_url: &str,
	chain_id: ChainId,
	private_key: &str,
	confirmation: ConfirmationConfig,
) -> Result<Box<dyn Relayer>, RelayerError> {
	let signer: PrivateKeySigner = private_key
		.parse()
		.map_err(|e| RelayerError::Config(format!("Invalid private key: {}", e)))?;

	Ok(Box::new(
		LocalRelayer::new(rpc_url, chain_id, signer, confirmation).await?,
	))
}
