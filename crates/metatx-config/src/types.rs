//! Configuration file types.

use metatx_confirm::{
	ConfirmationConfig, DEFAULT_INITIAL_LOOKBACK_BLOCKS, DEFAULT_REORG_OVERLAP_BLOCKS,
};
use metatx_types::abi::{NONCE_CHANGE_EVENT_SIG, TX_FAILED_EVENT_SIG};
use metatx_types::{Address, ChainId, B256};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ConfigError;

/// Complete configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Chain to talk to
	pub network: NetworkConfig,
	/// Confirmation engine tunables
	#[serde(default)]
	pub confirmation: ConfirmationSettings,
	/// Local relayer account, only needed to relay bundles
	#[serde(default)]
	pub relayer: Option<RelayerSettings>,
	#[serde(default)]
	pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
	pub chain_id: u64,
	/// RPC endpoint URL
	pub rpc_url: String,
}

impl NetworkConfig {
	pub fn chain_id(&self) -> ChainId {
		ChainId(self.chain_id)
	}
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConfirmationSettings {
	#[serde(default = "default_timeout_secs")]
	pub default_timeout_secs: u64,
	#[serde(default = "default_initial_lookback_blocks")]
	pub initial_lookback_blocks: u64,
	#[serde(default = "default_reorg_overlap_blocks")]
	pub reorg_overlap_blocks: u64,
	#[serde(default = "default_poll_interval_ms")]
	pub poll_interval_ms: u64,
	/// Override for the `NonceChange` topic, 32-byte hex
	pub nonce_changed_topic: Option<String>,
	/// Override for the `TxFailed` topic, 32-byte hex
	pub tx_failed_topic: Option<String>,
	/// Only accept logs emitted by this wallet
	pub wallet: Option<String>,
}

fn default_timeout_secs() -> u64 {
	120
}

fn default_initial_lookback_blocks() -> u64 {
	DEFAULT_INITIAL_LOOKBACK_BLOCKS
}

fn default_reorg_overlap_blocks() -> u64 {
	DEFAULT_REORG_OVERLAP_BLOCKS
}

fn default_poll_interval_ms() -> u64 {
	1000
}

impl Default for ConfirmationSettings {
	fn default() -> Self {
		Self {
			default_timeout_secs: default_timeout_secs(),
			initial_lookback_blocks: default_initial_lookback_blocks(),
			reorg_overlap_blocks: default_reorg_overlap_blocks(),
			poll_interval_ms: default_poll_interval_ms(),
			nonce_changed_topic: None,
			tx_failed_topic: None,
			wallet: None,
		}
	}
}

impl ConfirmationSettings {
	/// Builds the engine configuration, parsing topic and wallet overrides.
	pub fn to_confirmation_config(&self) -> Result<ConfirmationConfig, ConfigError> {
		let nonce_changed_topic = match &self.nonce_changed_topic {
			Some(topic) => parse_topic("nonce_changed_topic", topic)?,
			None => NONCE_CHANGE_EVENT_SIG,
		};
		let tx_failed_topic = match &self.tx_failed_topic {
			Some(topic) => parse_topic("tx_failed_topic", topic)?,
			None => TX_FAILED_EVENT_SIG,
		};
		let wallet = self
			.wallet
			.as_deref()
			.map(|w| {
				w.parse::<Address>().map_err(|e| {
					ConfigError::ValidationError(format!("Invalid wallet address {}: {}", w, e))
				})
			})
			.transpose()?;

		let config = ConfirmationConfig {
			default_timeout: Duration::from_secs(self.default_timeout_secs),
			initial_lookback_blocks: self.initial_lookback_blocks,
			reorg_overlap_blocks: self.reorg_overlap_blocks,
			poll_interval: Duration::from_millis(self.poll_interval_ms),
			nonce_changed_topic,
			tx_failed_topic,
			wallet,
		};
		config
			.validate()
			.map_err(|e| ConfigError::ValidationError(e.to_string()))?;
		Ok(config)
	}
}

fn parse_topic(field: &str, value: &str) -> Result<B256, ConfigError> {
	let hex_str = value.strip_prefix("0x").unwrap_or(value);
	if hex_str.len() != 64 {
		return Err(ConfigError::ValidationError(format!(
			"{} must be 32 bytes of hex",
			field
		)));
	}
	let bytes = hex::decode(hex_str)
		.map_err(|e| ConfigError::ValidationError(format!("{} is not valid hex: {}", field, e)))?;
	Ok(B256::from_slice(&bytes))
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelayerSettings {
	/// Private key of the paying account, hex with or without 0x
	pub private_key: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingSettings {
	#[serde(default = "default_log_level")]
	pub level: String,
	#[serde(default)]
	pub json: bool,
}

fn default_log_level() -> String {
	"info".to_string()
}

impl Default for LoggingSettings {
	fn default() -> Self {
		Self {
			level: default_log_level(),
			json: false,
		}
	}
}
