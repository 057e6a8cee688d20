//! Confirmation engine for relayed meta-transactions.
//!
//! Given a meta-transaction id, the engine scans the chain for the wallet's
//! `NonceChange` events, loads the receipts of the carrier transactions and
//! classifies the outcome from the logs the wallet emitted for that id. The
//! relayer is never consulted, so a misbehaving relay cannot fake a result.

pub mod cancel;
pub mod classify;
pub mod waiter;

pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use classify::{classify_log, classify_receipt};
pub use waiter::MetaTxnWaiter;

use metatx_types::abi::{NONCE_CHANGE_EVENT_SIG, TX_FAILED_EVENT_SIG};
use metatx_types::{Address, MetaTxnId, B256};
use std::time::Duration;
use thiserror::Error;

/// Timeout applied when the caller does not supply one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Blocks behind the head covered by the first scan window.
pub const DEFAULT_INITIAL_LOOKBACK_BLOCKS: u64 = 1024;

/// Blocks re-scanned behind the previous window on every iteration.
pub const DEFAULT_REORG_OVERLAP_BLOCKS: u64 = 12;

/// Pause between scan iterations and after a failed chain query.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Errors surfaced by a wait.
///
/// Chain query failures are retried internally and never show up here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfirmationError {
	#[error("Timed out after {}s waiting for meta transaction {id}", .timeout.as_secs_f64())]
	DeadlineExceeded { id: MetaTxnId, timeout: Duration },

	#[error("Cancelled waiting for meta transaction {id}")]
	Cancelled { id: MetaTxnId },

	#[error("Invalid confirmation settings: {0}")]
	InvalidConfig(String),
}

/// Tunables for the confirmation engine.
///
/// The two block constants encode an assumption about reorg depth on the
/// target chain and are kept separate on purpose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationConfig {
	pub default_timeout: Duration,
	pub initial_lookback_blocks: u64,
	pub reorg_overlap_blocks: u64,
	pub poll_interval: Duration,
	/// Topic every wallet execution emits.
	pub nonce_changed_topic: B256,
	/// Topic of the per-call failure event.
	pub tx_failed_topic: B256,
	/// When set, only logs emitted by this wallet are considered.
	pub wallet: Option<Address>,
}

impl Default for ConfirmationConfig {
	fn default() -> Self {
		Self {
			default_timeout: DEFAULT_TIMEOUT,
			initial_lookback_blocks: DEFAULT_INITIAL_LOOKBACK_BLOCKS,
			reorg_overlap_blocks: DEFAULT_REORG_OVERLAP_BLOCKS,
			poll_interval: DEFAULT_POLL_INTERVAL,
			nonce_changed_topic: NONCE_CHANGE_EVENT_SIG,
			tx_failed_topic: TX_FAILED_EVENT_SIG,
			wallet: None,
		}
	}
}

impl ConfirmationConfig {
	pub fn with_wallet(mut self, wallet: Address) -> Self {
		self.wallet = Some(wallet);
		self
	}

	pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
		self.poll_interval = poll_interval;
		self
	}

	pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
		self.default_timeout = timeout;
		self
	}

	pub fn validate(&self) -> Result<(), ConfirmationError> {
		if self.poll_interval.is_zero() {
			return Err(ConfirmationError::InvalidConfig(
				"poll interval must be greater than zero".to_string(),
			));
		}
		if self.default_timeout.is_zero() {
			return Err(ConfirmationError::InvalidConfig(
				"default timeout must be greater than zero".to_string(),
			));
		}
		if self.reorg_overlap_blocks > self.initial_lookback_blocks {
			return Err(ConfirmationError::InvalidConfig(format!(
				"reorg overlap ({}) cannot exceed initial lookback ({})",
				self.reorg_overlap_blocks, self.initial_lookback_blocks
			)));
		}
		Ok(())
	}
}
