//! Bundle delivery through relayers.
//!
//! A [`Relayer`] broadcasts signed bundles on behalf of a wallet. Relayers are
//! not trusted: [`RelayService`] derives the meta-transaction id client-side,
//! refuses acknowledgments that report a different id, and confirmation is
//! always done against the chain.

use async_trait::async_trait;
use metatx_confirm::ConfirmationError;
use metatx_types::{
	Address, BlockNumber, Call, ChainId, MetaTxnError, MetaTxnId, MetaTxnReceipt, Nonce, U160,
};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

pub mod implementations;
pub mod types;

pub use implementations::local::{create_local_relayer, LocalRelayer};
pub use types::{RelayerSubmission, SignedBundle};

/// Errors that can occur while talking to a relayer.
#[derive(Debug, Error)]
pub enum RelayerError {
	#[error("Invalid bundle: {0}")]
	InvalidBundle(String),

	#[error("Network error: {0}")]
	Network(String),

	#[error("Configuration error: {0}")]
	Config(String),

	#[error("Relayer rejected bundle: {0}")]
	Rejected(String),

	#[error("Relayer reported meta txn id {reported}, expected {expected}")]
	IdMismatch {
		expected: MetaTxnId,
		reported: MetaTxnId,
	},

	#[error(transparent)]
	MetaTxn(#[from] MetaTxnError),

	#[error(transparent)]
	Confirmation(#[from] ConfirmationError),
}

/// A relay backend.
///
/// `relay` returns as soon as the relayer accepts the bundle; it never waits
/// for the carrier transaction to be mined. Implementations decide their own
/// retry policy.
#[async_trait]
pub trait Relayer: Send + Sync {
	/// Human readable backend name, used in logs.
	fn name(&self) -> &str;

	fn chain_id(&self) -> ChainId;

	/// Current nonce of `wallet` in `space`, at `block` or the latest block.
	async fn get_nonce(
		&self,
		wallet: Address,
		space: U160,
		block: Option<BlockNumber>,
	) -> Result<Nonce, RelayerError>;

	/// Fills in gas limits for calls that do not carry one.
	async fn estimate_gas_limits(
		&self,
		wallet: Address,
		calls: Vec<Call>,
	) -> Result<Vec<Call>, RelayerError>;

	async fn relay(&self, signed: &SignedBundle) -> Result<RelayerSubmission, RelayerError>;

	/// Waits for the outcome of a relayed bundle.
	async fn wait(
		&self,
		id: &MetaTxnId,
		timeout: Option<Duration>,
	) -> Result<MetaTxnReceipt, RelayerError>;
}

/// Client-side front for a relayer backend.
pub struct RelayService {
	relayer: Box<dyn Relayer>,
}

impl RelayService {
	pub fn new(relayer: Box<dyn Relayer>) -> Self {
		Self { relayer }
	}

	pub fn relayer(&self) -> &dyn Relayer {
		self.relayer.as_ref()
	}

	pub async fn get_nonce(
		&self,
		wallet: Address,
		space: U160,
		block: Option<BlockNumber>,
	) -> Result<Nonce, RelayerError> {
		self.relayer.get_nonce(wallet, space, block).await
	}

	pub async fn estimate_gas_limits(
		&self,
		wallet: Address,
		calls: Vec<Call>,
	) -> Result<Vec<Call>, RelayerError> {
		self.relayer.estimate_gas_limits(wallet, calls).await
	}

	/// Hands a signed bundle to the relayer.
	///
	/// Fails before contacting the relayer if the bundle is empty or targets
	/// another chain. Relayer errors are returned as is.
	pub async fn submit(&self, signed: &SignedBundle) -> Result<RelayerSubmission, RelayerError> {
		if signed.chain_id != self.relayer.chain_id() {
			return Err(RelayerError::InvalidBundle(format!(
				"bundle is for chain {} but relayer {} serves chain {}",
				signed.chain_id,
				self.relayer.name(),
				self.relayer.chain_id()
			)));
		}

		let expected = signed.meta_txn_id()?;
		debug!(
			meta_txn_id = %expected,
			wallet = %signed.wallet,
			calls = signed.bundle.calls.len(),
			relayer = self.relayer.name(),
			"Submitting bundle"
		);

		let submission = self.relayer.relay(signed).await?;
		if submission.meta_txn_id != expected {
			return Err(RelayerError::IdMismatch {
				expected,
				reported: submission.meta_txn_id,
			});
		}

		info!(
			meta_txn_id = %expected,
			tx_hash = %submission.tx_hash,
			relayer = self.relayer.name(),
			"Bundle relayed"
		);
		Ok(submission)
	}

	pub async fn wait(
		&self,
		id: &MetaTxnId,
		timeout: Option<Duration>,
	) -> Result<MetaTxnReceipt, RelayerError> {
		self.relayer.wait(id, timeout).await
	}

	/// Submits a bundle and waits for its outcome under the client-side id.
	pub async fn submit_and_wait(
		&self,
		signed: &SignedBundle,
		timeout: Option<Duration>,
	) -> Result<(RelayerSubmission, MetaTxnReceipt), RelayerError> {
		let submission = self.submit(signed).await?;
		let receipt = self.wait(&submission.meta_txn_id, timeout).await?;
		Ok((submission, receipt))
	}
}
